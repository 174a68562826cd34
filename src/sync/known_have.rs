//! Synced revisions ("have" list) of files the cache was asked about.

use crate::core::error::Result;
use crate::state::cached_state::max_last_updated;
use crate::state::{CachedState, ClientLocalServerState, P4FileSyncState, NEVER_LOADED};
use crate::sync::exec::Interruptible;
use crate::sync::front_end::{is_stale, CacheFrontEnd, ServerContext};
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use std::path::PathBuf;

#[derive(Debug)]
pub struct KnownHaveCache {
    last_refreshed: DateTime<Utc>,
    interval: Duration,
}

impl KnownHaveCache {
    pub fn new(state: &ClientLocalServerState, interval: Duration) -> Self {
        Self {
            last_refreshed: max_last_updated(state.server.have_files.iter()),
            interval,
        }
    }

    /// Have states for `files`. Unknown files get an empty record and force
    /// the next load to query the server.
    pub fn get_have_files(
        &mut self,
        state: &mut ClientLocalServerState,
        files: &[PathBuf],
    ) -> Vec<P4FileSyncState> {
        let mut result = Vec::with_capacity(files.len());
        for file in files {
            let mapping = state.repo().get_by_location(file);
            if let Some(have) = state.server.have_state_for(&mapping) {
                result.push(have.clone());
                continue;
            }
            let have = P4FileSyncState::new(mapping);
            state.server.have_files.push(have.clone());
            result.push(have);
            self.last_refreshed = NEVER_LOADED;
        }
        result
    }

    /// Refreshes only the entries for `files` that are stale.
    pub fn load_for(
        &mut self,
        ctx: &ServerContext<'_>,
        state: &mut ClientLocalServerState,
        files: &[PathBuf],
    ) -> Result<()> {
        let stale: Vec<PathBuf> = files
            .iter()
            .filter(|file| {
                let mapping = state.repo().get_by_location(file);
                state
                    .server
                    .have_state_for(&mapping)
                    .map_or(true, |have| is_stale(have.last_updated(), self.interval))
            })
            .cloned()
            .collect();
        if stale.is_empty() {
            debug!("Have list for {} file(s) is current", files.len());
            return Ok(());
        }
        self.refresh(ctx, state, &stale)
    }

    fn refresh(
        &mut self,
        ctx: &ServerContext<'_>,
        state: &mut ClientLocalServerState,
        files: &[PathBuf],
    ) -> Result<()> {
        let entries = match ctx.exec().get_have_list(files).interruptible()? {
            Ok(entries) => entries,
            Err(err) => {
                ctx.alerts()
                    .add_warning("Could not load the have list", &err.to_string(), files.to_vec());
                forget(state, files);
                return Ok(());
            }
        };
        if entries.len() != files.len() {
            ctx.alerts().add_warning(
                "Have list mismatch",
                &format!(
                    "Asked for {} file(s) but the server returned {}",
                    files.len(),
                    entries.len()
                ),
                files.to_vec(),
            );
            forget(state, files);
            return Ok(());
        }

        for entry in entries {
            let mapping = state
                .repo()
                .get_by_depot_location(&entry.depot_path, Some(&entry.local_path));
            // Placeholders made before the depot path was known.
            state.server.have_files.retain(|have| {
                have.mapping().same_record(&mapping) || !have.mapping().is_at(&entry.local_path)
            });
            if state.server.have_state_for(&mapping).is_none() {
                state.server.have_files.push(P4FileSyncState::new(mapping.clone()));
            }
            if let Some(have) = state.server.have_state_for_mut(&mapping) {
                have.update_from_have(entry.revision);
                if let Err(err) = have.refresh_digest() {
                    warn!("Could not digest {}: {err}", entry.local_path.display());
                }
            }
        }
        self.last_refreshed = Utc::now();
        Ok(())
    }
}

/// Drops the have entries for `files` so the next request reloads them.
/// Entries for other files are left alone.
fn forget(state: &mut ClientLocalServerState, files: &[PathBuf]) {
    state.server.have_files.retain(|have| {
        !have
            .mapping()
            .local_path()
            .is_some_and(|path| files.contains(&path))
    });
}

impl CacheFrontEnd for KnownHaveCache {
    fn name(&self) -> &'static str {
        "have list"
    }

    fn last_refresh_date(&self) -> DateTime<Utc> {
        self.last_refreshed
    }

    fn refresh_interval(&self) -> Duration {
        self.interval
    }

    fn inner_load_server_cache(
        &mut self,
        ctx: &ServerContext<'_>,
        state: &mut ClientLocalServerState,
    ) -> Result<()> {
        let files: Vec<PathBuf> = state
            .server
            .have_files
            .iter()
            .filter_map(|have| have.mapping().local_path())
            .collect();
        if files.is_empty() {
            self.last_refreshed = Utc::now();
            return Ok(());
        }
        self.refresh(ctx, state, &files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClientServerId, REV_NONE};

    #[test]
    fn test_unknown_files_force_a_load() {
        let mut state = ClientLocalServerState::new(ClientServerId::new("p4:1666", "ws"), false);
        let mut have = KnownHaveCache::new(&state, Duration::minutes(1));
        let files = vec![PathBuf::from("/ws/a.txt")];

        let result = have.get_have_files(&mut state, &files);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].revision(), REV_NONE);
        assert!(have.needs_refresh());
        assert_eq!(state.server.have_files.len(), 1);

        have.get_have_files(&mut state, &files);
        assert_eq!(state.server.have_files.len(), 1);
    }

    #[test]
    fn test_forget_only_touches_requested_files() {
        let mut state = ClientLocalServerState::new(ClientServerId::new("p4:1666", "ws"), false);
        let mut have = KnownHaveCache::new(&state, Duration::minutes(1));
        let a = PathBuf::from("/ws/a.txt");
        let b = PathBuf::from("/ws/b.txt");
        have.get_have_files(&mut state, &[a.clone(), b.clone()]);

        forget(&mut state, &[a]);

        assert_eq!(state.server.have_files.len(), 1);
        assert!(state.server.have_files[0].mapping().is_at(&b));
    }
}
