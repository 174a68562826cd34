//! Execution of queued pending updates against the server.
//!
//! A [`ServerUpdateAction`] is a batch of pending updates of one [`UpdateGroup`].
//! Performing it runs the group's server-side execution, which marks each item as
//! succeeded or failed, and then settles the batch according to the returned
//! [`ExecutionStatus`].

use crate::core::error::Result;
use crate::state::{ClientLocalServerState, PendingUpdateState, UpdateGroup};
use crate::sync::change_lists;
use crate::sync::exec::{FileStatus, OpenAction};
use crate::sync::file_actions;
use crate::sync::front_end::ServerContext;
use crate::sync::manager::{ClientCacheManager, ServerQuery};
use log::{debug, info};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Nothing changed on the server.
    NoOp,
    /// The server changed; the group's cache must be reloaded.
    ReloadCache,
    /// Terminal failure; the remaining items are failed.
    Fail,
    /// Lost the connection; the remaining items must run again.
    Retry,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoOp => "no-op",
            Self::ReloadCache => "reload-cache",
            Self::Fail => "fail",
            Self::Retry => "retry",
        };
        f.write_str(text)
    }
}

/// Server-observed state of one file, as reported by a file status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCategory {
    NotInPerforce,
    NotOpened,
    /// Open for add or edit, including the add side of a move.
    Edited,
    Deleted,
    /// Open for integrate or branch, not for edit.
    Integrated,
    /// The delete side of a move.
    MoveDeleted,
    NotInClientView,
    ServerError(String),
    /// An open action the cache does not know how to reconcile.
    Unhandled(OpenAction),
}

impl FileCategory {
    /// `None` for informational results, which do not belong to a requested file.
    pub fn classify(status: &FileStatus) -> Option<Self> {
        let category = match status {
            FileStatus::Info { .. } => return None,
            FileStatus::NotOnServer => Self::NotInPerforce,
            FileStatus::NotInClientView { .. } => Self::NotInClientView,
            FileStatus::Error { message } => Self::ServerError(message.clone()),
            FileStatus::Valid { open_action, .. } => match open_action {
                None => Self::NotOpened,
                Some(
                    OpenAction::Add
                    | OpenAction::AddEdit
                    | OpenAction::Added
                    | OpenAction::Edit
                    | OpenAction::EditFrom
                    | OpenAction::MoveAdd,
                ) => Self::Edited,
                Some(OpenAction::Integrate | OpenAction::Branch) => Self::Integrated,
                Some(OpenAction::MoveDelete) => Self::MoveDeleted,
                Some(OpenAction::Delete | OpenAction::Deleted) => Self::Deleted,
                Some(other) => Self::Unhandled(other.clone()),
            },
        };
        Some(category)
    }
}

/// What an add-or-edit request does with a file in a given category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddEditDecision {
    /// Already open as requested.
    Skip,
    /// Open for add or edit in another changelist; move it over.
    Reopen,
    /// Open for delete; revert, then open for edit.
    RevertThenEdit,
    Add,
    Edit,
    NotifyNotInView,
    ReportError,
    /// Logged and alerted; the file is left as it is.
    Unhandled,
}

impl AddEditDecision {
    /// `edit_only` requests never add files the server does not know.
    /// `same_changelist` tells whether an opened file is already in the requested
    /// changelist.
    pub fn decide(category: &FileCategory, edit_only: bool, same_changelist: bool) -> Self {
        match category {
            FileCategory::NotInPerforce if edit_only => Self::Skip,
            FileCategory::NotInPerforce => Self::Add,
            FileCategory::NotOpened | FileCategory::Integrated | FileCategory::MoveDeleted => {
                Self::Edit
            }
            FileCategory::Deleted => Self::RevertThenEdit,
            FileCategory::Edited if same_changelist => Self::Skip,
            FileCategory::Edited => Self::Reopen,
            FileCategory::NotInClientView => Self::NotifyNotInView,
            FileCategory::ServerError(_) => Self::ReportError,
            FileCategory::Unhandled(_) => Self::Unhandled,
        }
    }
}

/// Running summary of the server calls made for one batch.
#[derive(Debug, Default)]
pub(crate) struct StatusTally {
    succeeded: bool,
    failed: bool,
}

impl StatusTally {
    pub(crate) fn success(&mut self) {
        self.succeeded = true;
    }

    pub(crate) fn failure(&mut self) {
        self.failed = true;
    }

    pub(crate) fn status(&self) -> ExecutionStatus {
        match (self.succeeded, self.failed) {
            (true, _) => ExecutionStatus::ReloadCache,
            (false, true) => ExecutionStatus::Fail,
            (false, false) => ExecutionStatus::NoOp,
        }
    }
}

/// Result of performing one batch.
#[derive(Debug)]
pub struct ActionOutcome {
    pub status: ExecutionStatus,
    /// Items settled without failure, removed from the queue.
    pub completed: Vec<PendingUpdateState>,
    /// Items that failed, removed from the queue.
    pub failed: Vec<PendingUpdateState>,
    /// Items the server state made ambiguous. They stay queued, with their
    /// local state, for a later pass.
    pub retained: Vec<PendingUpdateState>,
    /// Items still to run after a lost connection.
    pub retry: Option<ServerUpdateAction>,
}

#[derive(Debug, Clone)]
pub struct ServerUpdateAction {
    group: UpdateGroup,
    updates: Vec<PendingUpdateState>,
    succeeded: BTreeSet<u32>,
    failed: BTreeSet<u32>,
    retained: BTreeSet<u32>,
}

impl ServerUpdateAction {
    pub fn new(group: UpdateGroup, updates: Vec<PendingUpdateState>) -> Self {
        Self {
            group,
            updates,
            succeeded: BTreeSet::new(),
            failed: BTreeSet::new(),
            retained: BTreeSet::new(),
        }
    }

    /// Splits updates into batches of consecutive updates sharing a group.
    pub fn group_consecutive<I>(updates: I) -> Vec<ServerUpdateAction>
    where
        I: IntoIterator<Item = PendingUpdateState>,
    {
        let mut actions: Vec<ServerUpdateAction> = Vec::new();
        for update in updates {
            match actions.last_mut() {
                Some(action) if action.group == update.group() => action.updates.push(update),
                _ => actions.push(Self::new(update.group(), vec![update])),
            }
        }
        actions
    }

    pub fn group(&self) -> UpdateGroup {
        self.group
    }

    pub fn updates(&self) -> &[PendingUpdateState] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn is_resolved(&self, ref_id: u32) -> bool {
        self.succeeded.contains(&ref_id)
            || self.failed.contains(&ref_id)
            || self.retained.contains(&ref_id)
    }

    /// Items not yet marked either way, in queue order.
    pub(crate) fn unresolved(&self) -> Vec<PendingUpdateState> {
        self.updates
            .iter()
            .filter(|update| !self.is_resolved(update.ref_id()))
            .cloned()
            .collect()
    }

    pub(crate) fn mark_success(&mut self, ref_id: u32) {
        if !self.failed.contains(&ref_id) && !self.retained.contains(&ref_id) {
            self.succeeded.insert(ref_id);
        }
    }

    pub(crate) fn mark_failed(&mut self, ref_id: u32) {
        self.succeeded.remove(&ref_id);
        self.retained.remove(&ref_id);
        self.failed.insert(ref_id);
    }

    /// Leaves `ref_id` in the pending queue without running it.
    pub(crate) fn mark_retained(&mut self, ref_id: u32) {
        if !self.failed.contains(&ref_id) {
            self.succeeded.remove(&ref_id);
            self.retained.insert(ref_id);
        }
    }

    /// The unresolved item whose file or source file is `path`.
    pub(crate) fn owner_of(&self, path: &Path) -> Option<u32> {
        self.updates
            .iter()
            .filter(|update| !self.is_resolved(update.ref_id()))
            .find(|update| {
                update.file().as_deref() == Some(path)
                    || update.source_file().as_deref() == Some(path)
            })
            .map(PendingUpdateState::ref_id)
    }

    /// Follows a local changelist that the server just created.
    pub(crate) fn remap_changelist(&mut self, old_id: i32, new_id: i32) {
        for update in &mut self.updates {
            if let Some(remapped) = update.with_changelist(old_id, new_id) {
                *update = remapped;
            }
        }
    }

    /// Picks up changes made to the queued copies since this batch was built, and
    /// drops items that left the queue.
    fn refresh_from(&mut self, state: &ClientLocalServerState) {
        self.updates = self
            .updates
            .iter()
            .filter_map(|update| state.pending_update(update.ref_id()).cloned())
            .collect();
    }

    fn execute(
        &mut self,
        ctx: &ServerContext<'_>,
        manager: &mut ClientCacheManager,
    ) -> Result<ExecutionStatus> {
        match self.group {
            UpdateGroup::FileAddEdit => file_actions::execute_add_edit(self, ctx, manager),
            UpdateGroup::FileDelete => file_actions::execute_delete(self, ctx, manager),
            UpdateGroup::FileMove => file_actions::execute_move(self, ctx, manager),
            UpdateGroup::FileIntegrate => file_actions::execute_integrate(self, ctx, manager),
            UpdateGroup::FileRevert => file_actions::execute_revert(self, ctx, manager),
            UpdateGroup::Changelist => change_lists::execute_update(self, ctx, manager),
            UpdateGroup::ChangelistFiles => change_lists::execute_move_files(self, ctx, manager),
            UpdateGroup::ChangelistDelete => change_lists::execute_delete(self, ctx, manager),
        }
    }

    /// Caches to reload after the server accepted changes of this group.
    fn refresh_queries(&self) -> Vec<ServerQuery> {
        match self.group {
            UpdateGroup::ChangelistFiles => vec![ServerQuery::ChangeLists, ServerQuery::FileActions],
            group if group.is_file_group() => vec![ServerQuery::FileActions],
            _ => vec![ServerQuery::ChangeLists],
        }
    }

    /// Runs the batch and settles it against the pending update queue.
    ///
    /// An interruption is returned as an error before anything is settled; the
    /// items stay queued in the persisted state.
    pub fn perform(
        mut self,
        ctx: &ServerContext<'_>,
        manager: &mut ClientCacheManager,
    ) -> Result<ActionOutcome> {
        self.refresh_from(manager.state());
        if self.updates.is_empty() {
            debug!("Nothing left to perform for {:?}", self.group);
            return Ok(ActionOutcome {
                status: ExecutionStatus::NoOp,
                completed: Vec::new(),
                failed: Vec::new(),
                retained: Vec::new(),
                retry: None,
            });
        }

        debug!(
            "Performing {:?} action with {} update(s)",
            self.group,
            self.updates.len()
        );
        let status = self.execute(ctx, manager)?;
        debug!("{:?} action finished with {status}", self.group);

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut retained = Vec::new();
        let mut remaining = Vec::new();
        for update in std::mem::take(&mut self.updates) {
            let ref_id = update.ref_id();
            if self.failed.contains(&ref_id) {
                failed.push(update);
            } else if self.retained.contains(&ref_id) {
                retained.push(update);
            } else if self.succeeded.contains(&ref_id) {
                completed.push(update);
            } else {
                match status {
                    ExecutionStatus::Retry => remaining.push(update),
                    ExecutionStatus::Fail => failed.push(update),
                    ExecutionStatus::NoOp | ExecutionStatus::ReloadCache => completed.push(update),
                }
            }
        }

        for update in completed.iter().chain(failed.iter()) {
            manager.remove_pending_update(update.ref_id());
            manager.mark_update_committed(update);
        }
        if !failed.is_empty() {
            info!("{} update(s) failed in {:?} action", failed.len(), self.group);
        }
        if !retained.is_empty() {
            info!(
                "{} update(s) stay queued after {:?} action",
                retained.len(),
                self.group
            );
        }

        if status == ExecutionStatus::ReloadCache {
            for query in self.refresh_queries() {
                manager.run_query(ctx, &query)?;
            }
        } else if !remaining.is_empty() && !completed.is_empty() {
            // The server is gone; reload the settled part once it is back.
            for query in self.refresh_queries() {
                manager.mark_stale(&query);
            }
        }

        let retry = if remaining.is_empty() {
            None
        } else {
            Some(Self::new(self.group, remaining))
        };

        Ok(ActionOutcome {
            status,
            completed,
            failed,
            retained,
            retry,
        })
    }
}
