//! Pending changelist front-end and the server execution of changelist groups.

use crate::core::error::Result;
use crate::state::cached_state::max_last_updated;
use crate::state::changelist::is_local_id;
use crate::state::{
    CachedState, ClientLocalServerState, P4ChangeListState, ParamValue, PendingUpdateState,
    UpdateAction, UpdateParameterName, NEVER_LOADED, P4_DEFAULT, P4_LOCAL, P4_UNKNOWN,
};
use crate::sync::action::{ExecutionStatus, ServerUpdateAction, StatusTally};
use crate::sync::exec::{ExecResult, FileMessage, FileStatus, Interruptible, ServerExec};
use crate::sync::file_actions::queued_refs;
use crate::sync::front_end::{CacheFrontEnd, ServerContext};
use crate::sync::jobs;
use crate::sync::manager::ClientCacheManager;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug)]
pub struct ChangeListCache {
    last_refreshed: DateTime<Utc>,
    interval: Duration,
    committed: BTreeSet<i32>,
    previous_local_id: i32,
}

impl ChangeListCache {
    pub fn new(state: &ClientLocalServerState, interval: Duration) -> Self {
        let lowest_local = state
            .local
            .changes
            .iter()
            .map(|change| change.id)
            .chain(
                state
                    .pending_updates()
                    .iter()
                    .filter_map(PendingUpdateState::changelist),
            )
            .filter(|id| is_local_id(*id))
            .min()
            .unwrap_or(P4_LOCAL);
        Self {
            last_refreshed: max_last_updated(state.server.changes.iter()),
            interval,
            committed: BTreeSet::new(),
            previous_local_id: lowest_local.min(P4_LOCAL),
        }
    }

    /// A fresh id for a changelist that only exists locally until it is
    /// created on the server.
    pub fn allocate_local_id(&mut self) -> i32 {
        self.previous_local_id -= 1;
        self.previous_local_id
    }

    /// Pending changelists as the user should see them, default first. Local
    /// changes override the server copies and locally deleted ones are hidden.
    pub fn get_opened_change_lists(&self, state: &ClientLocalServerState) -> Vec<P4ChangeListState> {
        let mut changes = vec![state
            .server
            .change(P4_DEFAULT)
            .cloned()
            .unwrap_or_else(|| P4ChangeListState::new(P4_DEFAULT))];
        changes.extend(
            state
                .server
                .changes
                .iter()
                .filter(|change| !change.is_default())
                .cloned(),
        );
        for local in &state.local.changes {
            match changes.iter_mut().find(|change| change.id == local.id) {
                Some(existing) => *existing = local.clone(),
                None => changes.push(local.clone()),
            }
        }
        changes.retain(|change| !change.deleted);
        changes
    }

    pub fn delete_changelist(
        &mut self,
        state: &mut ClientLocalServerState,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        if changelist == P4_DEFAULT || changelist == P4_UNKNOWN {
            info!("Changelist {changelist} cannot be deleted");
            return Ok(None);
        }
        let update = PendingUpdateState::new(
            UpdateAction::DeleteChangelist,
            [changelist.to_string()],
            changelist_params(changelist),
        )?;
        let change = get_or_add_change_state(state, changelist);
        change.deleted = true;
        change.pending_ref = Some(update.ref_id());
        change.set_updated();
        Ok(Some(update))
    }

    /// Moves `files` into `changelist`, or into a new changelist with
    /// `description` when `changelist` is `None`.
    ///
    /// A move into a changelist that already has one queued replaces it, so the
    /// new update carries the files of the queued one as well.
    pub fn move_files_to_changelist(
        &mut self,
        state: &mut ClientLocalServerState,
        files: &[PathBuf],
        description: &str,
        changelist: Option<i32>,
    ) -> Result<Option<PendingUpdateState>> {
        let changelist = match changelist {
            Some(P4_UNKNOWN) => {
                info!("Cannot move files into an unknown changelist");
                return Ok(None);
            }
            Some(id) => id,
            None => self.allocate_local_id(),
        };

        let queued = queued_move(state, changelist);
        let mut all_files = Vec::new();
        let mut description = description.to_string();
        if let Some(queued) = &queued {
            all_files.extend(queued.files.iter().cloned());
            if description.is_empty() {
                description = queued.description.clone();
            }
        }
        for file in files {
            if !all_files.contains(file) {
                all_files.push(file.clone());
            }
        }

        let mut params = changelist_params(changelist);
        params.insert(
            UpdateParameterName::Description.key_name().to_string(),
            ParamValue::from(description.as_str()),
        );
        for (index, file) in all_files.iter().enumerate() {
            params.insert(
                UpdateParameterName::Field.indexed_key(index),
                ParamValue::from(file.to_string_lossy().into_owned()),
            );
        }
        let update = PendingUpdateState::new(
            UpdateAction::ReopenFilesIntoChangelist,
            [changelist.to_string()],
            params,
        )?;

        let change = get_or_add_change_state(state, changelist);
        if !description.is_empty() {
            change.comment = description;
        }
        change.deleted = false;
        change.pending_ref = Some(update.ref_id());
        change.set_updated();

        if let Some(queued) = queued {
            debug!("{update} takes over the files of #{}", queued.ref_id);
            for open in &mut state.local.updated_files {
                if open.pending_ref == Some(queued.ref_id) {
                    open.pending_ref = Some(update.ref_id());
                }
            }
        }

        for file in files {
            let mapping = state.repo().get_by_location(file);
            let open = state
                .local
                .update_state_for(&mapping)
                .or_else(|| state.server.update_state_for(&mapping))
                .cloned();
            if let Some(mut open) = open {
                open.changelist = changelist;
                open.pending_ref = Some(update.ref_id());
                open.set_updated();
                state.local.put_update_state(open);
            }
        }
        debug!("Created {update}");
        Ok(Some(update))
    }

    pub fn rename_changelist(
        &mut self,
        state: &mut ClientLocalServerState,
        changelist: i32,
        description: &str,
    ) -> Result<Option<PendingUpdateState>> {
        if changelist == P4_DEFAULT || changelist == P4_UNKNOWN {
            info!("Changelist {changelist} has no description to change");
            return Ok(None);
        }
        let mut params = changelist_params(changelist);
        params.insert(
            UpdateParameterName::Description.key_name().to_string(),
            ParamValue::from(description),
        );
        let update = PendingUpdateState::new(
            UpdateAction::ChangeChangelistDescription,
            [changelist.to_string()],
            params,
        )?;
        let change = get_or_add_change_state(state, changelist);
        change.comment = description.to_string();
        change.pending_ref = Some(update.ref_id());
        change.set_updated();
        Ok(Some(update))
    }

    pub fn add_job(
        &mut self,
        state: &mut ClientLocalServerState,
        changelist: i32,
        job: &str,
    ) -> Result<Option<PendingUpdateState>> {
        self.change_job(state, changelist, job, UpdateAction::AddJobToChangelist)
    }

    pub fn remove_job(
        &mut self,
        state: &mut ClientLocalServerState,
        changelist: i32,
        job: &str,
    ) -> Result<Option<PendingUpdateState>> {
        self.change_job(state, changelist, job, UpdateAction::RemoveJobFromChangelist)
    }

    fn change_job(
        &mut self,
        state: &mut ClientLocalServerState,
        changelist: i32,
        job: &str,
        action: UpdateAction,
    ) -> Result<Option<PendingUpdateState>> {
        if changelist == P4_DEFAULT || changelist == P4_UNKNOWN {
            info!("Jobs cannot be attached to changelist {changelist}");
            return Ok(None);
        }
        let mut params = changelist_params(changelist);
        params.insert(
            UpdateParameterName::Job.key_name().to_string(),
            ParamValue::from(job),
        );
        let update =
            PendingUpdateState::new(action, [format!("{changelist}:job:{job}")], params)?;
        let change = get_or_add_change_state(state, changelist);
        if action == UpdateAction::AddJobToChangelist {
            change.jobs.insert(job.to_string());
        } else {
            change.jobs.remove(job);
        }
        change.pending_ref = Some(update.ref_id());
        change.set_updated();
        Ok(Some(update))
    }

    /// Forgets the local copy of `changelist` at the next load.
    pub fn mark_committed(&mut self, changelist: i32) {
        self.committed.insert(changelist);
    }

    /// Forces the next load to query the server.
    pub fn invalidate(&mut self) {
        self.last_refreshed = NEVER_LOADED;
    }
}

/// The last queued move into one changelist.
struct QueuedMove {
    ref_id: u32,
    description: String,
    /// Files no later queued move takes elsewhere.
    files: Vec<PathBuf>,
}

fn queued_move(state: &ClientLocalServerState, changelist: i32) -> Option<QueuedMove> {
    let pending = state.pending_updates();
    let index = pending.iter().rposition(|update| {
        update.action() == UpdateAction::ReopenFilesIntoChangelist
            && update.changelist() == Some(changelist)
    })?;
    let moved_later: BTreeSet<&str> = pending[index + 1..]
        .iter()
        .filter(|update| update.action() == UpdateAction::ReopenFilesIntoChangelist)
        .flat_map(PendingUpdateState::field_values)
        .collect();
    let queued = &pending[index];
    Some(QueuedMove {
        ref_id: queued.ref_id(),
        description: queued
            .get_str(UpdateParameterName::Description)
            .unwrap_or_default()
            .to_string(),
        files: queued
            .field_values()
            .into_iter()
            .filter(|file| !moved_later.contains(file))
            .map(PathBuf::from)
            .collect(),
    })
}

impl CacheFrontEnd for ChangeListCache {
    fn name(&self) -> &'static str {
        "changelists"
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
        let summaries = match ctx.exec().get_pending_changelists().interruptible()? {
            Ok(summaries) => summaries,
            Err(err) => {
                ctx.alerts().add_warning(
                    "Could not load pending changelists",
                    &err.to_string(),
                    Vec::new(),
                );
                return Ok(());
            }
        };

        let mut changes = Vec::with_capacity(summaries.len() + 1);
        for summary in &summaries {
            let mut change = P4ChangeListState::from_summary(summary);
            match ctx
                .exec()
                .get_job_ids_for_changelist(summary.id)
                .interruptible()?
            {
                Ok(ids) => change.jobs = ids.into_iter().collect(),
                Err(err) => ctx.alerts().add_notice(
                    &format!("Could not load jobs for changelist {}", summary.id),
                    &err.to_string(),
                    Vec::new(),
                ),
            }
            changes.push(change);
        }

        let job_ids: BTreeSet<String> = changes
            .iter()
            .flat_map(|change| change.jobs.iter().cloned())
            .collect();
        let job_ids: Vec<String> = job_ids.into_iter().collect();
        jobs::refresh_job_states(ctx, state, &job_ids)?;

        if !changes.iter().any(P4ChangeListState::is_default) {
            let mut default = P4ChangeListState::new(P4_DEFAULT);
            default.set_updated();
            changes.insert(0, default);
        }
        state.server.changes = changes;

        let committed = std::mem::take(&mut self.committed);
        let queued = queued_refs(state);
        state.local.changes.retain(|change| {
            !committed.contains(&change.id)
                || change.pending_ref.is_some_and(|ref_id| queued.contains(&ref_id))
        });
        self.last_refreshed = Utc::now();
        debug!(
            "Loaded {} pending changelist(s) for {}",
            state.server.changes.len(),
            state.id()
        );
        Ok(())
    }

    fn check_local_integrity(&mut self, state: &mut ClientLocalServerState) {
        let queued = queued_refs(state);
        state.local.changes.retain(|change| {
            let keep = change.pending_ref.is_some_and(|ref_id| queued.contains(&ref_id));
            if !keep {
                warn!(
                    "Dropping local changelist {} with no pending update",
                    change.id
                );
            }
            keep
        });
    }
}

fn changelist_params(changelist: i32) -> BTreeMap<String, ParamValue> {
    let mut params = BTreeMap::new();
    params.insert(
        UpdateParameterName::Changelist.key_name().to_string(),
        ParamValue::from(changelist),
    );
    params
}

/// The local copy of `changelist`, created from the server copy when missing.
fn get_or_add_change_state(
    state: &mut ClientLocalServerState,
    changelist: i32,
) -> &mut P4ChangeListState {
    if state.local.change(changelist).is_none() {
        let copy = state
            .server
            .change(changelist)
            .cloned()
            .unwrap_or_else(|| P4ChangeListState::new(changelist));
        state.local.put_change(copy);
    }
    let index = state
        .local
        .changes
        .iter()
        .position(|change| change.id == changelist)
        .unwrap_or(state.local.changes.len() - 1);
    &mut state.local.changes[index]
}

// Server execution.

/// Outcome of one server call that is not a batch file command.
enum CallResult<T> {
    Done(T),
    Failed,
    Retry,
}

fn settle_call<T>(
    ctx: &ServerContext<'_>,
    title: &str,
    result: ExecResult<T>,
) -> Result<CallResult<T>> {
    match result.interruptible()? {
        Ok(value) => Ok(CallResult::Done(value)),
        Err(err) if err.is_disconnected() => {
            info!("Lost the connection during '{title}': {err}");
            Ok(CallResult::Retry)
        }
        Err(err) => {
            ctx.alerts().add_warning(title, &err.to_string(), Vec::new());
            Ok(CallResult::Failed)
        }
    }
}

impl<T> CallResult<T> {
    fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }

    fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Runs a batch file command and reports rejected files. Empty batches are
/// skipped. The call counts as failed when the server rejects every file.
fn run_file_call<F>(
    ctx: &ServerContext<'_>,
    title: &str,
    files: &[PathBuf],
    call: F,
) -> Result<CallResult<()>>
where
    F: FnOnce(&dyn ServerExec, &[PathBuf]) -> ExecResult<Vec<FileMessage>>,
{
    if files.is_empty() {
        return Ok(CallResult::Done(()));
    }
    Ok(match settle_call(ctx, title, call(ctx.exec(), files))? {
        CallResult::Done(messages) => {
            report_file_messages(ctx, title, &messages);
            let rejected: BTreeSet<&PathBuf> = messages
                .iter()
                .filter(|message| message.is_error)
                .filter_map(|message| message.file.as_ref())
                .collect();
            if files.iter().all(|file| rejected.contains(file)) {
                CallResult::Failed
            } else {
                CallResult::Done(())
            }
        }
        CallResult::Failed => CallResult::Failed,
        CallResult::Retry => CallResult::Retry,
    })
}

fn report_file_messages(ctx: &ServerContext<'_>, title: &str, messages: &[FileMessage]) {
    let errors: Vec<&FileMessage> = messages.iter().filter(|m| m.is_error).collect();
    if errors.is_empty() {
        return;
    }
    let text: Vec<&str> = errors.iter().map(|m| m.message.as_str()).collect();
    ctx.alerts().add_warning(
        title,
        &text.join("\n"),
        errors.iter().filter_map(|m| m.file.clone()).collect(),
    );
}

pub(crate) fn execute_delete(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let mut tally = StatusTally::default();
    for update in batch.unresolved() {
        let ref_id = update.ref_id();
        let changelist = match update.changelist() {
            Some(id) if id != P4_DEFAULT && id != P4_UNKNOWN => id,
            other => {
                error!("Cannot delete changelist {other:?}");
                batch.mark_failed(ref_id);
                tally.failure();
                continue;
            }
        };

        let restored = manager
            .state()
            .local
            .change(changelist)
            .is_some_and(|change| !change.deleted);
        if is_local_id(changelist) || restored {
            ctx.alerts().add_notice(
                "Changelist delete ignored",
                &format!("Changelist {changelist} is not deleted on the server"),
                Vec::new(),
            );
            batch.mark_success(ref_id);
            continue;
        }

        let title = format!("Could not delete changelist {changelist}");
        let result = ctx.exec().delete_pending_changelist(changelist);
        match settle_call(ctx, &title, result)? {
            CallResult::Done(()) => {
                batch.mark_success(ref_id);
                tally.success();
            }
            CallResult::Failed => {
                batch.mark_failed(ref_id);
                tally.failure();
            }
            CallResult::Retry => return Ok(ExecutionStatus::Retry),
        }
    }
    Ok(tally.status())
}

/// Creates local changelists on the server, updates descriptions and reopens
/// each listed file into its changelist.
pub(crate) fn execute_move_files(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let mut tally = StatusTally::default();
    let refs: Vec<u32> = batch
        .unresolved()
        .iter()
        .map(PendingUpdateState::ref_id)
        .collect();

    for ref_id in refs {
        // Re-read each time; creating a changelist rewrites the later items.
        let Some(update) = batch
            .updates()
            .iter()
            .find(|update| update.ref_id() == ref_id)
            .cloned()
        else {
            continue;
        };
        let Some(mut changelist) = update.changelist() else {
            error!("{update} names no changelist");
            batch.mark_failed(ref_id);
            tally.failure();
            continue;
        };
        let description = update
            .get_str(UpdateParameterName::Description)
            .unwrap_or_default()
            .to_string();

        if is_local_id(changelist) {
            let result = ctx.exec().create_changelist(&description);
            match settle_call(ctx, "Could not create changelist", result)? {
                CallResult::Done(created) => {
                    manager.remap_changelist(changelist, created);
                    batch.remap_changelist(changelist, created);
                    tally.success();
                    changelist = created;
                }
                CallResult::Failed => {
                    batch.mark_failed(ref_id);
                    tally.failure();
                    continue;
                }
                CallResult::Retry => return Ok(ExecutionStatus::Retry),
            }
        } else if changelist != P4_DEFAULT && !description.is_empty() {
            let stale = manager
                .state()
                .server
                .change(changelist)
                .is_some_and(|change| change.comment != description);
            if stale {
                let title = format!("Could not update changelist {changelist}");
                let result = ctx
                    .exec()
                    .update_changelist_description(changelist, &description);
                match settle_call(ctx, &title, result)? {
                    CallResult::Done(()) => tally.success(),
                    CallResult::Failed => tally.failure(),
                    CallResult::Retry => return Ok(ExecutionStatus::Retry),
                }
            }
        }

        let files: Vec<PathBuf> = update.field_values().into_iter().map(PathBuf::from).collect();
        if !files.is_empty() {
            let title = format!("Could not move files to changelist {changelist}");
            let result = ctx.exec().get_file_status(&files);
            let statuses = match settle_call(ctx, &title, result)? {
                CallResult::Done(statuses) => statuses,
                CallResult::Failed => {
                    batch.mark_failed(ref_id);
                    tally.failure();
                    continue;
                }
                CallResult::Retry => return Ok(ExecutionStatus::Retry),
            };

            let mut reopen = Vec::new();
            let mut add = Vec::new();
            let mut edit = Vec::new();
            let statuses = statuses
                .iter()
                .filter(|status| !matches!(status, FileStatus::Info { .. }));
            for (file, status) in files.iter().zip(statuses) {
                match status {
                    FileStatus::Valid {
                        open_action: Some(_),
                        changelist: current,
                        ..
                    } => {
                        if *current != changelist {
                            reopen.push(file.clone());
                        }
                    }
                    FileStatus::Valid { head_rev, .. } if *head_rev <= 0 => add.push(file.clone()),
                    FileStatus::Valid { .. } => edit.push(file.clone()),
                    FileStatus::NotOnServer => add.push(file.clone()),
                    FileStatus::NotInClientView { .. } => ctx.alerts().add_notice(
                        "File not in client view",
                        &format!("{} is outside the client view", file.display()),
                        vec![file.clone()],
                    ),
                    FileStatus::Error { message } => {
                        ctx.alerts()
                            .add_warning(&title, message, vec![file.clone()]);
                    }
                    FileStatus::Info { .. } => {}
                }
            }

            let reopened = run_file_call(ctx, &title, &reopen, |exec, files| {
                exec.reopen_files(files, changelist)
            })?;
            let added = run_file_call(ctx, &title, &add, |exec, files| {
                exec.add_files(files, changelist)
            })?;
            let edited = run_file_call(ctx, &title, &edit, |exec, files| {
                exec.edit_files(files, changelist)
            })?;
            let results = [reopened, added, edited];
            if results.iter().any(CallResult::is_retry) {
                return Ok(ExecutionStatus::Retry);
            }
            if results.iter().any(CallResult::is_failed) {
                batch.mark_failed(ref_id);
                tally.failure();
                continue;
            }
        }

        batch.mark_success(ref_id);
        tally.success();
    }
    Ok(tally.status())
}

/// Description and job changes, applied per changelist.
pub(crate) fn execute_update(
    batch: &mut ServerUpdateAction,
    ctx: &ServerContext<'_>,
    _manager: &mut ClientCacheManager,
) -> Result<ExecutionStatus> {
    let mut by_changelist: BTreeMap<i32, Vec<PendingUpdateState>> = BTreeMap::new();
    let mut tally = StatusTally::default();
    for update in batch.unresolved() {
        match update.changelist() {
            None => {
                ctx.alerts().add_notice(
                    "Missing changelist",
                    &format!("{update} names no changelist"),
                    Vec::new(),
                );
                batch.mark_failed(update.ref_id());
                tally.failure();
            }
            Some(id) if id <= P4_DEFAULT => {
                error!("Changelist {id} cannot be updated on the server ({update})");
                batch.mark_failed(update.ref_id());
                tally.failure();
            }
            Some(id) => by_changelist.entry(id).or_default().push(update),
        }
    }

    for (changelist, updates) in by_changelist {
        let mut description = None;
        let mut add_jobs = Vec::new();
        let mut remove_jobs = Vec::new();
        let mut ok = true;
        for update in &updates {
            match update.action() {
                UpdateAction::ChangeChangelistDescription => {
                    description = update.get_str(UpdateParameterName::Description);
                }
                action => match update.get_str(UpdateParameterName::Job) {
                    Some(job) if action == UpdateAction::AddJobToChangelist => {
                        add_jobs.push(job.to_string());
                    }
                    Some(job) => remove_jobs.push(job.to_string()),
                    None => {
                        error!("{update} names no job");
                        ok = false;
                    }
                },
            }
        }

        let title = format!("Could not update changelist {changelist}");
        if let Some(description) = description {
            let result = ctx
                .exec()
                .update_changelist_description(changelist, description);
            match settle_call(ctx, &title, result)? {
                CallResult::Done(()) => {}
                CallResult::Failed => ok = false,
                CallResult::Retry => return Ok(ExecutionStatus::Retry),
            }
        }
        if !add_jobs.is_empty() {
            let result = ctx.exec().add_jobs_to_changelist(changelist, &add_jobs);
            match settle_call(ctx, &title, result)? {
                CallResult::Done(()) => {}
                CallResult::Failed => ok = false,
                CallResult::Retry => return Ok(ExecutionStatus::Retry),
            }
        }
        if !remove_jobs.is_empty() {
            let result = ctx
                .exec()
                .remove_jobs_from_changelist(changelist, &remove_jobs);
            match settle_call(ctx, &title, result)? {
                CallResult::Done(()) => {}
                CallResult::Failed => ok = false,
                CallResult::Retry => return Ok(ExecutionStatus::Retry),
            }
        }

        for update in &updates {
            if ok {
                batch.mark_success(update.ref_id());
            } else {
                batch.mark_failed(update.ref_id());
            }
        }
        if ok {
            tally.success();
        } else {
            tally.failure();
        }
    }
    Ok(tally.status())
}
