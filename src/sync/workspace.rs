//! Workspace (client spec) front-end and client path resolution.

use crate::core::error::Result;
use crate::state::{
    CachedState, ClientLocalServerState, FileUpdateAction, P4FileUpdateState,
    P4WorkspaceViewState, NEVER_LOADED,
};
use crate::state::workspace_view::NULL_ROOT;
use crate::sync::alerts::AlertSink;
use crate::sync::exec::{Interruptible, OpenedFile, ViewMapping};
use crate::sync::front_end::{CacheFrontEnd, ServerContext};
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct WorkspaceCache {
    last_refreshed: DateTime<Utc>,
    interval: Duration,
    view_changed: bool,
}

impl WorkspaceCache {
    pub fn new(state: &ClientLocalServerState, interval: Duration) -> Self {
        Self {
            last_refreshed: state.server.workspace.last_updated(),
            interval,
            view_changed: false,
        }
    }

    /// True once after a load found different roots or view mappings. The rest
    /// of the server state must then be reloaded.
    pub fn take_view_changed(&mut self) -> bool {
        std::mem::take(&mut self.view_changed)
    }
}

impl CacheFrontEnd for WorkspaceCache {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn last_refresh_date(&self) -> DateTime<Utc> {
        self.last_refreshed
    }

    fn refresh_interval(&self) -> Duration {
        self.interval
    }

    /// The client spec is loaded once; later changes arrive through an explicit
    /// workspace query.
    fn needs_refresh(&self) -> bool {
        self.last_refreshed <= NEVER_LOADED
    }

    fn inner_load_server_cache(
        &mut self,
        ctx: &ServerContext<'_>,
        state: &mut ClientLocalServerState,
    ) -> Result<()> {
        let cached_name = cached_client_name(state);
        let spec = match ctx.exec().get_client().interruptible()? {
            Ok(spec) => spec,
            Err(err) => {
                ctx.alerts().add_critical_error(
                    &format!("Could not load client {cached_name}"),
                    &err.to_string(),
                );
                return Ok(());
            }
        };

        if spec.name != cached_name {
            ctx.alerts().add_critical_error(
                "Client name mismatch",
                &format!(
                    "Server returned client {} but the cache belongs to {cached_name}",
                    spec.name
                ),
            );
        }
        if spec.root.is_none() {
            ctx.alerts().add_notice(
                "No client root",
                &format!("Client {} has no primary root", spec.name),
                Vec::new(),
            );
        }

        let roots = spec.roots();
        let workspace = &mut state.server.workspace;
        let roots_changed = !is_subsequence(&workspace.roots, &roots);
        let view_changed = views_differ(&workspace.view, &spec.view);

        workspace.name = spec.name.clone();
        workspace.roots = roots.clone();
        workspace.view = spec.view.clone();
        workspace.set_updated();
        self.last_refreshed = workspace.last_updated();

        if roots_changed || view_changed {
            debug!(
                "Client {} changed (roots: {roots_changed}, view: {view_changed})",
                spec.name
            );
            if state.has_pending_updates() {
                ctx.alerts().add_warning(
                    &format!("Client {} was updated", spec.name),
                    "The client spec changed on the server; pending changes are checked against the new view",
                    roots.iter().map(PathBuf::from).collect(),
                );
            }
            self.view_changed = true;
        }
        Ok(())
    }
}

fn cached_client_name(state: &ClientLocalServerState) -> String {
    let name = &state.server.workspace.name;
    if name.is_empty() {
        state.id().client_name.clone()
    } else {
        name.clone()
    }
}

/// True when every old root still appears, in order, among the new roots.
fn is_subsequence(old_roots: &[String], new_roots: &[String]) -> bool {
    let mut remaining = new_roots.iter();
    old_roots
        .iter()
        .all(|old| remaining.by_ref().any(|new| new == old))
}

/// Mappings must match one for one, in order.
fn views_differ(old: &[ViewMapping], new: &[ViewMapping]) -> bool {
    old.len() != new.len()
        || old
            .iter()
            .zip(new)
            .any(|(old, new)| old.depot != new.depot || old.client != new.client)
}

/// Turns the client path of an opened file into a local file path.
///
/// A path in `//client/...` syntax is resolved against the first existing root.
/// When no root exists, the last one is used and a notice is raised.
pub fn client_spec_to_file_path(
    view: &P4WorkspaceViewState,
    alerts: &dyn AlertSink,
    client_path: &str,
) -> Option<PathBuf> {
    let client_path = client_path
        .strip_prefix('"')
        .and_then(|path| path.strip_suffix('"'))
        .unwrap_or(client_path);

    let prefix = format!("//{}/", view.name);
    let is_client_syntax = client_path.len() >= prefix.len()
        && client_path.is_char_boundary(prefix.len())
        && client_path[..prefix.len()].eq_ignore_ascii_case(&prefix);
    if !is_client_syntax {
        return Some(PathBuf::from(client_path));
    }
    let relative = &client_path[prefix.len()..];

    let Some(last_root) = view.roots.last() else {
        alerts.add_critical_error(
            "No valid roots",
            &format!("Client {} has no root directories", view.name),
        );
        return None;
    };

    for root in &view.roots {
        if root == NULL_ROOT {
            // The view spells out the full local path.
            return Some(PathBuf::from(relative));
        }
        let root = Path::new(root);
        if root.exists() {
            return Some(root.join(relative));
        }
    }

    let root = PathBuf::from(last_root);
    alerts.add_notice(
        "Client root does not exist",
        &format!("Using {} for client {}", root.display(), view.name),
        vec![root.clone()],
    );
    Some(root.join(relative))
}

/// Maps opened files to server file states, registering their mappings.
pub fn from_opened_to_action(
    state: &ClientLocalServerState,
    alerts: &dyn AlertSink,
    opened: &[OpenedFile],
) -> Vec<P4FileUpdateState> {
    let view = &state.server.workspace;
    let mut updates = Vec::with_capacity(opened.len());
    for file in opened {
        let client_path = file
            .client_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned());
        let Some(local) = client_path
            .as_deref()
            .and_then(|path| client_spec_to_file_path(view, alerts, path))
        else {
            error!(
                "Opened file {} has no usable client path ({client_path:?})",
                file.depot_path
            );
            continue;
        };

        let mapping = state
            .repo()
            .get_by_depot_location(&file.depot_path, Some(&local));
        match FileUpdateAction::from_opened(&file.action) {
            Some(action) => {
                let mut update = P4FileUpdateState::new(mapping, file.changelist, action);
                update.set_updated();
                debug!("Mapped {} to {action} in {}", file.depot_path, file.changelist);
                updates.push(update);
            }
            None => alerts.add_notice(
                "Unknown open action",
                &format!("{} is open for {}", file.depot_path, file.action),
                vec![local],
            ),
        }
    }
    updates
}

/// Workspace roots that contain, or are contained in, one of `reference_dirs`.
///
/// Each root is tried in order and the first one with matches wins. A `null`
/// root falls back to the simple directory matches of the view mappings.
/// Raises a critical alert when nothing matches.
pub fn get_client_roots(
    view: &P4WorkspaceViewState,
    alerts: &dyn AlertSink,
    reference_dirs: &[PathBuf],
) -> Vec<PathBuf> {
    debug!(
        "Finding client roots for {}; references {reference_dirs:?}, roots {:?}",
        view.name, view.roots
    );
    for root in &view.roots {
        if root == NULL_ROOT {
            let matched = find_client_mappings_under(view, reference_dirs);
            if !matched.is_empty() {
                return matched;
            }
            continue;
        }

        let root = PathBuf::from(root);
        if !root.is_dir() {
            continue;
        }
        let mut matched = Vec::new();
        for reference in reference_dirs {
            if reference.starts_with(&root) {
                matched.push(reference.clone());
            } else if root.starts_with(reference) {
                matched.push(root.clone());
                break;
            }
        }
        if !matched.is_empty() {
            return matched;
        }
    }

    alerts.add_critical_error(
        "No valid roots",
        &format!("No root of client {} matches the working directories", view.name),
    );
    Vec::new()
}

fn find_client_mappings_under(
    view: &P4WorkspaceViewState,
    reference_dirs: &[PathBuf],
) -> Vec<PathBuf> {
    let mut matched = Vec::new();
    for mapping in &view.view {
        let Some(base) = get_simple_match_directory(&mapping.client) else {
            continue;
        };
        for reference in reference_dirs {
            if base.starts_with(reference) {
                matched.push(base.clone());
                break;
            } else if reference.starts_with(&base) {
                matched.push(reference.clone());
            }
        }
    }
    matched
}

/// The most specific directory shared by `reference` and one of `roots`.
///
/// A reference inside a root yields the reference itself; a root inside the
/// reference yields the root. The deepest candidate wins, ties going to the
/// first root.
pub fn get_best_client_root(roots: &[PathBuf], reference: &Path) -> Option<PathBuf> {
    let mut best: Option<&Path> = None;
    for root in roots {
        let candidate = if reference.starts_with(root) {
            reference
        } else if root.starts_with(reference) {
            root.as_path()
        } else {
            continue;
        };
        let deeper = best.map_or(true, |current| {
            candidate.components().count() > current.components().count()
        });
        if deeper {
            best = Some(candidate);
        }
    }
    if best.is_none() {
        info!("No client root matches {}", reference.display());
    }
    best.map(Path::to_path_buf)
}

/// The local directory of a `//client/dir/...` view entry, if it is that simple.
///
/// `dir` must be non-empty and free of wildcards.
pub fn get_simple_match_directory(client_spec: &str) -> Option<PathBuf> {
    let rest = client_spec.strip_prefix("//")?;
    let slash = rest.find('/')?;
    let after_client = &rest[slash + 1..];
    let dots = after_client.find("/...")?;
    let dir = &after_client[..dots];
    if dir.is_empty() || dir.contains('*') || dir.contains("...") {
        return None;
    }
    Some(PathBuf::from(unescape_p4_path(dir)))
}

/// Reverses the escaping of `@`, `#`, `*` and `%` in server paths.
pub fn unescape_p4_path(path: &str) -> String {
    path.replace("%40", "@")
        .replace("%23", "#")
        .replace("%2A", "*")
        .replace("%2a", "*")
        .replace("%25", "%")
}
