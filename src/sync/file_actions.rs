//! Opened-file front-end and the server execution of file update groups.

use crate::core::error::Result;
use crate::state::cached_state::max_last_updated;
use crate::state::workspace_view::NULL_ROOT;
use crate::state::{
    CachedState, ClientLocalServerState, FileMapping, FileUpdateAction, P4FileUpdateState,
    ParamValue, PendingUpdateState, UpdateAction, UpdateParameterName, NEVER_LOADED, P4_DEFAULT,
};
use crate::sync::action::{AddEditDecision, ExecutionStatus, FileCategory, ServerUpdateAction, StatusTally};
use crate::sync::exec::{ExecResult, FileMessage, FileStatus, Interruptible, ServerExec};
use crate::sync::front_end::{CacheFrontEnd, ServerContext};
use crate::sync::manager::ClientCacheManager;
use crate::sync::workspace;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct FileActionsCache {
    last_refreshed: DateTime<Utc>,
    interval: Duration,
    /// Mapping ids whose local state must go at the next load.
    committed: BTreeSet<u64>,
}

impl FileActionsCache {
    pub fn new(state: &ClientLocalServerState, interval: Duration) -> Self {
        Self {
            last_refreshed: max_last_updated(state.server.updated_files.iter()),
            interval,
            committed: BTreeSet::new(),
        }
    }

    /// Open files as the user should see them: the server list overlaid with
    /// local pending changes. Files pending a revert are left out.
    pub fn get_open_files(&self, state: &ClientLocalServerState) -> Vec<P4FileUpdateState> {
        let mut files = state.server.updated_files.clone();
        for local in &state.local.updated_files {
            match files.iter_mut().find(|file| file.mapping() == local.mapping()) {
                Some(existing) => *existing = local.clone(),
                None => files.push(local.clone()),
            }
        }
        files.retain(|file| file.action.is_open());
        files
    }

    pub fn add_or_edit_file(
        &mut self,
        state: &mut ClientLocalServerState,
        file: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        open_single_file(state, file, changelist, FileUpdateAction::AddEditFile)
    }

    pub fn edit_file(
        &mut self,
        state: &mut ClientLocalServerState,
        file: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        open_single_file(state, file, changelist, FileUpdateAction::EditFile)
    }

    pub fn delete_file(
        &mut self,
        state: &mut ClientLocalServerState,
        file: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        open_single_file(state, file, changelist, FileUpdateAction::DeleteFile)
    }

    pub fn revert_file(
        &mut self,
        state: &mut ClientLocalServerState,
        file: &Path,
    ) -> Result<Option<PendingUpdateState>> {
        let mapping = state.repo().get_by_location(file);
        let changelist = state
            .local
            .update_state_for(&mapping)
            .or_else(|| state.server.update_state_for(&mapping))
            .map_or(P4_DEFAULT, |open| open.changelist);
        open_single_file(state, file, changelist, FileUpdateAction::RevertFile)
    }

    /// Moves `source` to `target`. Both files are tracked by one update.
    pub fn move_file(
        &mut self,
        state: &mut ClientLocalServerState,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        self.open_with_source(state, source, target, changelist, FileUpdateAction::MoveFile)
    }

    pub fn integrate_file(
        &mut self,
        state: &mut ClientLocalServerState,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        self.open_with_source(
            state,
            source,
            target,
            changelist,
            FileUpdateAction::IntegrateFile,
        )
    }

    fn open_with_source(
        &mut self,
        state: &mut ClientLocalServerState,
        source: &Path,
        target: &Path,
        changelist: i32,
        action: FileUpdateAction,
    ) -> Result<Option<PendingUpdateState>> {
        let Some(target_mapping) = prepare_file_update(state, target, action, changelist) else {
            return Ok(None);
        };
        let source_mapping = state.repo().get_by_location(source);

        let mut params = file_params(&target_mapping, target, changelist, action);
        params.insert(
            UpdateParameterName::FileSource.key_name().to_string(),
            ParamValue::from(path_text(source)),
        );
        if let Some(depot) = source_mapping.depot_path() {
            params.insert(
                UpdateParameterName::DepotSource.key_name().to_string(),
                ParamValue::from(depot),
            );
        }

        let mut ids = vec![path_text(target)];
        if action == FileUpdateAction::MoveFile {
            ids.push(path_text(source));
        }
        let update = PendingUpdateState::new(action.update_action(), ids, params)?;

        let mut local = P4FileUpdateState::new(target_mapping, changelist, action);
        local.source = Some(source_mapping.clone());
        put_local(state, local, update.ref_id());
        if action == FileUpdateAction::MoveFile {
            state.local.remove_update_state(&source_mapping);
            let deleted =
                P4FileUpdateState::new(source_mapping, changelist, FileUpdateAction::MoveDeleteFile);
            put_local(state, deleted, update.ref_id());
        }
        debug!("Created {update}");
        Ok(Some(update))
    }

    /// Forgets the local state of `mapping` at the next load, once the server
    /// reports the real state.
    pub fn mark_committed(&mut self, mapping: &FileMapping) {
        self.committed.insert(mapping.id());
    }

    /// Forces the next load to query the server.
    pub fn invalidate(&mut self) {
        self.last_refreshed = NEVER_LOADED;
    }
}

impl CacheFrontEnd for FileActionsCache {
    fn name(&self) -> &'static str {
        "file actions"
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
        let roots: Vec<PathBuf> = state
            .server
            .workspace
            .roots
            .iter()
            .filter(|root| root.as_str() != NULL_ROOT)
            .map(PathBuf::from)
            .collect();

        let opened = match ctx.exec().get_opened_files(&roots).interruptible()? {
            Ok(opened) => opened,
            Err(err) => {
                ctx.alerts()
                    .add_warning("Could not load opened files", &err.to_string(), roots);
                return Ok(());
            }
        };

        let (valid, unsupported): (Vec<_>, Vec<_>) = opened
            .into_iter()
            .partition(|file| FileUpdateAction::from_opened(&file.action).is_some());
        if !unsupported.is_empty() {
            let listing: Vec<String> = unsupported
                .iter()
                .map(|file| format!("{} ({})", file.depot_path, file.action))
                .collect();
            ctx.alerts().add_notice(
                "Unsupported open actions",
                &listing.join(", "),
                unsupported
                    .iter()
                    .filter_map(|file| file.client_path.clone())
                    .collect(),
            );
        }

        state.server.updated_files = workspace::from_opened_to_action(state, ctx.alerts(), &valid);
        let committed = std::mem::take(&mut self.committed);
        let queued = queued_refs(state);
        state.local.updated_files.retain(|file| {
            !committed.contains(&file.mapping().id())
                || file.pending_ref.is_some_and(|ref_id| queued.contains(&ref_id))
        });
        self.last_refreshed = Utc::now();
        debug!(
            "Loaded {} opened file(s) for {}",
            state.server.updated_files.len(),
            state.id()
        );
        Ok(())
    }

    fn check_local_integrity(&mut self, state: &mut ClientLocalServerState) {
        let queued = queued_refs(state);
        state.local.updated_files.retain(|file| {
            let keep = file.pending_ref.is_some_and(|ref_id| queued.contains(&ref_id));
            if !keep {
                warn!("Dropping local state of {} with no pending update", file.mapping());
            }
            keep
        });
    }
}

pub(crate) fn queued_refs(state: &ClientLocalServerState) -> BTreeSet<u32> {
    state
        .pending_updates()
        .iter()
        .map(PendingUpdateState::ref_id)
        .collect()
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// True when an existing open state already does what `requested` asks for.
fn satisfies(existing: FileUpdateAction, requested: FileUpdateAction) -> bool {
    use FileUpdateAction as A;
    existing == requested
        || matches!(
            (existing, requested),
            (A::AddFile | A::EditFile | A::AddEditFile, A::AddEditFile)
                | (A::EditFile | A::AddEditFile, A::EditFile)
        )
}

/// Returns the mapping to update, or `None` when the file is already in the
/// requested state. Any older local state of the file is dropped.
fn prepare_file_update(
    state: &mut ClientLocalServerState,
    file: &Path,
    action: FileUpdateAction,
    changelist: i32,
) -> Option<FileMapping> {
    let mapping = state.repo().get_by_location(file);
    let existing = state
        .local
        .update_state_for(&mapping)
        .or_else(|| state.server.update_state_for(&mapping));
    if let Some(existing) = existing {
        if satisfies(existing.action, action) && existing.changelist == changelist {
            info!(
                "{} is already open for {} in changelist {changelist}",
                file.display(),
                existing.action
            );
            return None;
        }
    }
    state.local.remove_update_state(&mapping);
    Some(mapping)
}

fn file_params(
    mapping: &FileMapping,
    file: &Path,
    changelist: i32,
    action: FileUpdateAction,
) -> BTreeMap<String, ParamValue> {
    let update_action = action.update_action();
    let mut params = BTreeMap::new();
    params.insert(
        UpdateParameterName::File.key_name().to_string(),
        ParamValue::from(path_text(file)),
    );
    let changelist_key = UpdateParameterName::Changelist.key_name();
    if update_action.is_valid_parameter_name(changelist_key) {
        params.insert(changelist_key.to_string(), ParamValue::from(changelist));
    }
    let depot_key = UpdateParameterName::Depot.key_name();
    if let Some(depot) = mapping.depot_path() {
        if update_action.is_valid_parameter_name(depot_key) {
            params.insert(depot_key.to_string(), ParamValue::from(depot));
        }
    }
    params
}

fn put_local(state: &mut ClientLocalServerState, mut local: P4FileUpdateState, ref_id: u32) {
    local.pending_ref = Some(ref_id);
    local.set_updated();
    state.local.put_update_state(local);
}

fn open_single_file(
    state: &mut ClientLocalServerState,
    file: &Path,
    changelist: i32,
    action: FileUpdateAction,
) -> Result<Option<PendingUpdateState>> {
    let Some(mapping) = prepare_file_update(state, file, action, changelist) else {
        return Ok(None);
    };
    let params = file_params(&mapping, file, changelist, action);
    let update = PendingUpdateState::new(action.update_action(), [path_text(file)], params)?;
    put_local(
        state,
        P4FileUpdateState::new(mapping, changelist, action),
        update.ref_id(),
    );
    debug!("Created {update}");
    Ok(Some(update))
}

// Server execution.

/// One unresolved update with the server status of its selected file.
struct SplitEntry {
    update: PendingUpdateState,
    file: PathBuf,
    category: FileCategory,
    /// Changelist the file is open in on the server.
    current_changelist: i32,
    head_rev: i64,
}

impl SplitEntry {
    fn ref_id(&self) -> u32 {
        self.update.ref_id()
    }

    fn changelist(&self) -> i32 {
        self.update.changelist().unwrap_or(P4_DEFAULT)
    }
}

enum Split {
    Entries(Vec<SplitEntry>),
    Abort(ExecutionStatus),
}

/// Queries the server status of the file `select` picks from each unresolved
/// update.
fn split_by_status(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    select: fn(&PendingUpdateState) -> Option<PathBuf>,
) -> Result<Split> {
    let mut candidates = Vec::new();
    for update in batch.unresolved() {
        match select(&update) {
            Some(file) => candidates.push((update, file)),
            None => {
                error!("{update} names no file");
                batch.mark_failed(update.ref_id());
            }
        }
    }
    if candidates.is_empty() {
        return Ok(Split::Entries(Vec::new()));
    }

    let files: Vec<PathBuf> = candidates.iter().map(|(_, file)| file.clone()).collect();
    let statuses = match ctx.exec().get_file_status(&files).interruptible()? {
        Ok(statuses) => statuses,
        Err(err) if err.is_disconnected() => {
            info!("Lost the connection while checking file status: {err}");
            return Ok(Split::Abort(ExecutionStatus::Retry));
        }
        Err(err) => {
            ctx.alerts()
                .add_warning("Could not check file status", &err.to_string(), files);
            for (update, _) in &candidates {
                batch.mark_failed(update.ref_id());
            }
            return Ok(Split::Abort(ExecutionStatus::Fail));
        }
    };

    let mut statuses = statuses
        .iter()
        .filter_map(|status| FileCategory::classify(status).map(|category| (category, status)));
    let mut entries = Vec::with_capacity(candidates.len());
    for (update, file) in candidates {
        let Some((category, status)) = statuses.next() else {
            warn!("Server returned no status for {}", file.display());
            batch.mark_failed(update.ref_id());
            continue;
        };
        let (current_changelist, head_rev) = match status {
            FileStatus::Valid {
                changelist,
                head_rev,
                ..
            } => (*changelist, *head_rev),
            _ => (P4_DEFAULT, 0),
        };
        entries.push(SplitEntry {
            update,
            file,
            category,
            current_changelist,
            head_rev,
        });
    }
    Ok(Split::Entries(entries))
}

/// Files handed to one server call, with the updates that own them.
#[derive(Debug, Default)]
struct FileBatch {
    refs: Vec<u32>,
    files: Vec<PathBuf>,
}

impl FileBatch {
    fn of(ref_id: u32, file: PathBuf) -> Self {
        Self {
            refs: vec![ref_id],
            files: vec![file],
        }
    }

    fn push(&mut self, ref_id: u32, file: PathBuf) {
        self.refs.push(ref_id);
        self.files.push(file);
    }

    fn unresolved(&self, batch: &ServerUpdateAction) -> FileBatch {
        let mut live = FileBatch::default();
        for (ref_id, file) in self.refs.iter().zip(&self.files) {
            if !batch.is_resolved(*ref_id) {
                live.push(*ref_id, file.clone());
            }
        }
        live
    }
}

/// Runs one server call over the unresolved part of `work`.
///
/// Files the server rejects fail their owning update. With `resolve`, the rest
/// succeed. Returns `Some(Retry)` when the connection dropped.
fn run_group<F>(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    tally: &mut StatusTally,
    title: &str,
    work: &FileBatch,
    resolve: bool,
    call: F,
) -> Result<Option<ExecutionStatus>>
where
    F: FnOnce(&dyn ServerExec, &[PathBuf]) -> ExecResult<Vec<FileMessage>>,
{
    let live = work.unresolved(batch);
    if live.files.is_empty() {
        return Ok(None);
    }

    let messages = match call(ctx.exec(), &live.files).interruptible()? {
        Ok(messages) => messages,
        Err(err) if err.is_disconnected() => {
            info!("Lost the connection during '{title}': {err}");
            return Ok(Some(ExecutionStatus::Retry));
        }
        Err(err) => {
            ctx.alerts()
                .add_warning(title, &err.to_string(), live.files.clone());
            for ref_id in &live.refs {
                batch.mark_failed(*ref_id);
            }
            tally.failure();
            return Ok(None);
        }
    };

    let mut errors = Vec::new();
    let mut error_files = Vec::new();
    let mut failed = BTreeSet::new();
    for message in &messages {
        if !message.is_error {
            debug!("{}", message.message);
            continue;
        }
        warn!("{title}: {}", message.message);
        errors.push(message.message.clone());
        if let Some(file) = &message.file {
            if let Some(owner) = batch.owner_of(file) {
                batch.mark_failed(owner);
                failed.insert(owner);
            }
            error_files.push(file.clone());
        }
    }
    if !errors.is_empty() {
        ctx.alerts().add_warning(title, &errors.join("\n"), error_files);
    }

    let any_accepted = live.refs.iter().any(|ref_id| !failed.contains(ref_id));
    if any_accepted {
        tally.success();
    } else {
        tally.failure();
    }
    if resolve {
        for ref_id in &live.refs {
            batch.mark_success(*ref_id);
        }
    }
    Ok(None)
}

/// Settles entries whose status makes the request impossible. Files outside
/// the view and server errors fail; an open action the cache cannot reconcile
/// keeps the update queued. Returns false when the entry still needs work.
fn settle_unusable(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    entry: &SplitEntry,
) -> bool {
    match &entry.category {
        FileCategory::NotInClientView => {
            ctx.alerts().add_notice(
                "File not in client view",
                &format!("{} is outside the client view", entry.file.display()),
                vec![entry.file.clone()],
            );
            batch.mark_failed(entry.ref_id());
            true
        }
        FileCategory::ServerError(message) => {
            ctx.alerts()
                .add_warning("Server error", message, vec![entry.file.clone()]);
            batch.mark_failed(entry.ref_id());
            true
        }
        FileCategory::Unhandled(action) => {
            error!(
                "Cannot handle {} open for {action} in {}",
                entry.file.display(),
                entry.update.action()
            );
            ctx.alerts().add_warning(
                "Unsupported open action",
                &format!(
                    "{} is open for {action}; the change stays queued",
                    entry.file.display()
                ),
                vec![entry.file.clone()],
            );
            batch.mark_retained(entry.ref_id());
            true
        }
        _ => false,
    }
}

macro_rules! retry_on_disconnect {
    ($call:expr) => {
        if let Some(status) = $call? {
            return Ok(status);
        }
    };
}

fn revert_call(exec: &dyn ServerExec, files: &[PathBuf]) -> ExecResult<Vec<FileMessage>> {
    exec.revert_files(files)
}

pub(crate) fn execute_add_edit(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    _manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let entries = match split_by_status(batch, ctx, PendingUpdateState::file)? {
        Split::Entries(entries) => entries,
        Split::Abort(status) => return Ok(status),
    };

    let mut reverts = FileBatch::default();
    let mut adds: BTreeMap<i32, FileBatch> = BTreeMap::new();
    let mut reopens: BTreeMap<i32, FileBatch> = BTreeMap::new();
    let mut edits: BTreeMap<i32, FileBatch> = BTreeMap::new();
    for entry in &entries {
        let edit_only = entry.update.action() == UpdateAction::EditFile;
        let same_changelist = entry.current_changelist == entry.changelist();
        let (ref_id, file) = (entry.ref_id(), entry.file.clone());
        match AddEditDecision::decide(&entry.category, edit_only, same_changelist) {
            AddEditDecision::Skip => {
                debug!("Nothing to do for {}", entry.file.display());
                batch.mark_success(ref_id);
            }
            AddEditDecision::Reopen => reopens.entry(entry.changelist()).or_default().push(ref_id, file),
            AddEditDecision::RevertThenEdit => {
                reverts.push(ref_id, file.clone());
                edits.entry(entry.changelist()).or_default().push(ref_id, file);
            }
            AddEditDecision::Add => adds.entry(entry.changelist()).or_default().push(ref_id, file),
            AddEditDecision::Edit => edits.entry(entry.changelist()).or_default().push(ref_id, file),
            AddEditDecision::NotifyNotInView
            | AddEditDecision::ReportError
            | AddEditDecision::Unhandled => {
                settle_unusable(batch, ctx, entry);
            }
        }
    }

    let mut tally = StatusTally::default();
    retry_on_disconnect!(run_group(
        batch, ctx, &mut tally, "Could not revert files", &reverts, false, revert_call
    ));
    for (changelist, work) in &adds {
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not add files", work, true,
            |exec, files| exec.add_files(files, *changelist)
        ));
    }
    for (changelist, work) in &reopens {
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not reopen files", work, true,
            |exec, files| exec.reopen_files(files, *changelist)
        ));
    }
    for (changelist, work) in &edits {
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not edit files", work, true,
            |exec, files| exec.edit_files(files, *changelist)
        ));
    }
    Ok(tally.status())
}

pub(crate) fn execute_delete(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    _manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let entries = match split_by_status(batch, ctx, PendingUpdateState::file)? {
        Split::Entries(entries) => entries,
        Split::Abort(status) => return Ok(status),
    };

    let mut reverts = FileBatch::default();
    let mut revert_only = FileBatch::default();
    let mut deletes: BTreeMap<i32, FileBatch> = BTreeMap::new();
    for entry in &entries {
        if settle_unusable(batch, ctx, entry) {
            continue;
        }
        let (ref_id, file) = (entry.ref_id(), entry.file.clone());
        match entry.category {
            FileCategory::NotInPerforce | FileCategory::Deleted | FileCategory::MoveDeleted => {
                debug!("{} is already gone from the server view", entry.file.display());
                batch.mark_success(ref_id);
            }
            // A file opened for add has nothing to delete on the server.
            FileCategory::Edited if entry.head_rev <= 0 => revert_only.push(ref_id, file),
            FileCategory::Edited | FileCategory::Integrated => {
                reverts.push(ref_id, file.clone());
                deletes.entry(entry.changelist()).or_default().push(ref_id, file);
            }
            _ => deletes.entry(entry.changelist()).or_default().push(ref_id, file),
        }
    }

    let mut tally = StatusTally::default();
    retry_on_disconnect!(run_group(
        batch, ctx, &mut tally, "Could not revert files", &revert_only, true, revert_call
    ));
    retry_on_disconnect!(run_group(
        batch, ctx, &mut tally, "Could not revert files", &reverts, false, revert_call
    ));
    for (changelist, work) in &deletes {
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not delete files", work, true,
            |exec, files| exec.delete_files(files, *changelist)
        ));
    }
    Ok(tally.status())
}

/// Moves are classified by their source file, which is what the server opens.
pub(crate) fn execute_move(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    _manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let entries = match split_by_status(batch, ctx, PendingUpdateState::source_file)? {
        Split::Entries(entries) => entries,
        Split::Abort(status) => return Ok(status),
    };

    let mut reverts = FileBatch::default();
    let mut edits: BTreeMap<i32, FileBatch> = BTreeMap::new();
    let mut adds: BTreeMap<i32, FileBatch> = BTreeMap::new();
    let mut moves = Vec::new();
    for entry in &entries {
        if settle_unusable(batch, ctx, entry) {
            continue;
        }
        let Some(target) = entry.update.file() else {
            error!("{} names no target file", entry.update);
            batch.mark_failed(entry.ref_id());
            continue;
        };
        let (ref_id, source) = (entry.ref_id(), entry.file.clone());
        match entry.category {
            FileCategory::NotInPerforce => {
                adds.entry(entry.changelist()).or_default().push(ref_id, target);
                continue;
            }
            FileCategory::NotOpened => {
                edits.entry(entry.changelist()).or_default().push(ref_id, source.clone());
            }
            FileCategory::Edited => {}
            _ => {
                reverts.push(ref_id, source.clone());
                edits.entry(entry.changelist()).or_default().push(ref_id, source.clone());
            }
        }
        moves.push((ref_id, source, target, entry.changelist()));
    }

    let mut tally = StatusTally::default();
    retry_on_disconnect!(run_group(
        batch, ctx, &mut tally, "Could not revert files", &reverts, false, revert_call
    ));
    for (changelist, work) in &edits {
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not edit files", work, false,
            |exec, files| exec.edit_files(files, *changelist)
        ));
    }
    for (changelist, work) in &adds {
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not add files", work, true,
            |exec, files| exec.add_files(files, *changelist)
        ));
    }
    for (ref_id, source, target, changelist) in moves {
        let work = FileBatch::of(ref_id, source.clone());
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not move file", &work, true,
            |exec, _| exec.move_file(&source, &target, changelist)
        ));
    }
    Ok(tally.status())
}

pub(crate) fn execute_integrate(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    _manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let entries = match split_by_status(batch, ctx, PendingUpdateState::file)? {
        Split::Entries(entries) => entries,
        Split::Abort(status) => return Ok(status),
    };

    let mut reverts = FileBatch::default();
    let mut integrates = Vec::new();
    for entry in &entries {
        if settle_unusable(batch, ctx, entry) {
            continue;
        }
        let Some(source) = entry.update.source_file() else {
            error!("{} names no source file", entry.update);
            batch.mark_failed(entry.ref_id());
            continue;
        };
        let (ref_id, target) = (entry.ref_id(), entry.file.clone());
        match entry.category {
            FileCategory::Integrated => {
                debug!("{} is already open for integrate", target.display());
                batch.mark_success(ref_id);
                continue;
            }
            FileCategory::NotInPerforce | FileCategory::NotOpened => {}
            _ => reverts.push(ref_id, target.clone()),
        }
        integrates.push((ref_id, source, target, entry.changelist()));
    }

    let mut tally = StatusTally::default();
    retry_on_disconnect!(run_group(
        batch, ctx, &mut tally, "Could not revert files", &reverts, false, revert_call
    ));
    for (ref_id, source, target, changelist) in integrates {
        let work = FileBatch::of(ref_id, target.clone());
        retry_on_disconnect!(run_group(
            batch, ctx, &mut tally, "Could not integrate file", &work, true,
            |exec, _| exec.integrate_file(&source, &target, changelist)
        ));
    }
    Ok(tally.status())
}

pub(crate) fn execute_revert(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    _manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let entries = match split_by_status(batch, ctx, PendingUpdateState::file)? {
        Split::Entries(entries) => entries,
        Split::Abort(status) => return Ok(status),
    };

    let mut reverts = FileBatch::default();
    for entry in &entries {
        if settle_unusable(batch, ctx, entry) {
            continue;
        }
        match entry.category {
            FileCategory::NotInPerforce | FileCategory::NotOpened => {
                debug!("{} is not open", entry.file.display());
                batch.mark_success(entry.ref_id());
            }
            _ => reverts.push(entry.ref_id(), entry.file.clone()),
        }
    }

    let mut tally = StatusTally::default();
    retry_on_disconnect!(run_group(
        batch, ctx, &mut tally, "Could not revert files", &reverts, true, revert_call
    ));
    Ok(tally.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ClientServerId;

    fn new_state() -> ClientLocalServerState {
        ClientLocalServerState::new(ClientServerId::new("p4:1666", "ws"), false)
    }

    fn cache(state: &ClientLocalServerState) -> FileActionsCache {
        FileActionsCache::new(state, Duration::minutes(1))
    }

    #[test]
    fn test_add_or_edit_creates_local_state() {
        let mut state = new_state();
        let mut files = cache(&state);
        let update = files
            .add_or_edit_file(&mut state, Path::new("/ws/a.txt"), 3)
            .unwrap()
            .unwrap();

        assert_eq!(update.action(), UpdateAction::AddEditFile);
        assert_eq!(update.changelist(), Some(3));
        assert_eq!(update.file(), Some(PathBuf::from("/ws/a.txt")));

        let open = files.get_open_files(&state);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].pending_ref, Some(update.ref_id()));
        assert_eq!(open[0].action, FileUpdateAction::AddEditFile);
    }

    #[test]
    fn test_request_matching_server_state_is_skipped() {
        let mut state = new_state();
        let mapping = state
            .repo()
            .get_by_depot_location("//depot/a.txt", Some(Path::new("/ws/a.txt")));
        state
            .server
            .put_update_state(P4FileUpdateState::new(mapping, 3, FileUpdateAction::EditFile));
        let mut files = cache(&state);

        assert!(files
            .edit_file(&mut state, Path::new("/ws/a.txt"), 3)
            .unwrap()
            .is_none());
        let moved = files
            .edit_file(&mut state, Path::new("/ws/a.txt"), 4)
            .unwrap()
            .unwrap();
        assert_eq!(moved.changelist(), Some(4));
        // The edit schema carries no depot path.
        assert!(moved.get(UpdateParameterName::Depot).is_none());

        let deleted = files
            .delete_file(&mut state, Path::new("/ws/a.txt"), 3)
            .unwrap()
            .unwrap();
        assert_eq!(
            deleted.get_str(UpdateParameterName::Depot),
            Some("//depot/a.txt")
        );
    }

    #[test]
    fn test_move_tracks_both_files() {
        let mut state = new_state();
        let mut files = cache(&state);
        let update = files
            .move_file(&mut state, Path::new("/ws/old.txt"), Path::new("/ws/new.txt"), 0)
            .unwrap()
            .unwrap();

        assert_eq!(update.ids().len(), 2);
        assert_eq!(update.source_file(), Some(PathBuf::from("/ws/old.txt")));
        let actions: Vec<_> = state.local.updated_files.iter().map(|f| f.action).collect();
        assert_eq!(
            actions,
            vec![FileUpdateAction::MoveFile, FileUpdateAction::MoveDeleteFile]
        );
    }

    #[test]
    fn test_revert_hides_open_file() {
        let mut state = new_state();
        let mapping = state.repo().get_by_location(Path::new("/ws/a.txt"));
        state
            .server
            .put_update_state(P4FileUpdateState::new(mapping, 7, FileUpdateAction::EditFile));
        let mut files = cache(&state);

        let update = files
            .revert_file(&mut state, Path::new("/ws/a.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(update.action(), UpdateAction::RevertFile);
        assert!(files.get_open_files(&state).is_empty());
        assert_eq!(state.local.updated_files[0].changelist, 7);
    }

    #[test]
    fn test_check_local_integrity_drops_orphans() {
        let mut state = new_state();
        let mut files = cache(&state);
        let kept = files
            .add_or_edit_file(&mut state, Path::new("/ws/a.txt"), 0)
            .unwrap()
            .unwrap();
        files
            .add_or_edit_file(&mut state, Path::new("/ws/b.txt"), 0)
            .unwrap()
            .unwrap();
        state.add_pending_update(kept);

        files.check_local_integrity(&mut state);
        assert_eq!(state.local.updated_files.len(), 1);
        assert!(state.local.updated_files[0]
            .mapping()
            .is_at(Path::new("/ws/a.txt")));
    }

    #[test]
    fn test_satisfies() {
        use FileUpdateAction as A;
        assert!(satisfies(A::AddFile, A::AddEditFile));
        assert!(satisfies(A::AddEditFile, A::EditFile));
        assert!(!satisfies(A::AddFile, A::EditFile));
        assert!(!satisfies(A::EditFile, A::DeleteFile));
    }
}
