//! One client's cache: the persisted state plus the front-ends that keep each
//! slice of it fresh.

use crate::core::config::CacheConfig;
use crate::core::error::Result;
use crate::state::workspace_view::NULL_ROOT;
use crate::state::{
    ClientLocalServerState, ClientServerId, P4ChangeListState, P4FileSyncState,
    P4FileUpdateState, P4JobState, P4WorkspaceViewState, PendingUpdateState, UpdateAction,
};
use crate::sync::alerts::AlertSink;
use crate::sync::change_lists::ChangeListCache;
use crate::sync::exec::UserSummary;
use crate::sync::file_actions::FileActionsCache;
use crate::sync::front_end::{CacheFrontEnd, ServerContext};
use crate::sync::job_status_list::JobStatusListCache;
use crate::sync::jobs::{self, JobCache};
use crate::sync::known_have::KnownHaveCache;
use crate::sync::user_list::UserListCache;
use crate::sync::workspace::{self, WorkspaceCache};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// A request to reload part of the cache from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerQuery {
    Workspace,
    FileActions,
    ChangeLists,
    Jobs,
    /// Reload the named jobs only.
    JobIds(Vec<String>),
    /// Reload the stale have entries for these files.
    KnownHave(Vec<PathBuf>),
    JobStatusList,
    UserList,
    /// Every front-end that is stale.
    All,
}

#[derive(Debug)]
pub struct ClientCacheManager {
    state: ClientLocalServerState,
    config: CacheConfig,
    workspace: WorkspaceCache,
    file_actions: FileActionsCache,
    change_lists: ChangeListCache,
    jobs: JobCache,
    known_have: KnownHaveCache,
    users: UserListCache,
    job_statuses: JobStatusListCache,
}

impl ClientCacheManager {
    pub fn new(state: ClientLocalServerState, config: CacheConfig) -> Self {
        let min = config.min_refresh_interval();
        let daily = config.daily_refresh_interval();
        Self {
            workspace: WorkspaceCache::new(&state, min),
            file_actions: FileActionsCache::new(&state, min),
            change_lists: ChangeListCache::new(&state, min),
            jobs: JobCache::new(&state, min),
            known_have: KnownHaveCache::new(&state, min),
            users: UserListCache::new(&state, daily),
            job_statuses: JobStatusListCache::new(&state, daily),
            state,
            config,
        }
    }

    pub fn state(&self) -> &ClientLocalServerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ClientLocalServerState {
        &mut self.state
    }

    pub fn into_state(self) -> ClientLocalServerState {
        self.state
    }

    pub fn id(&self) -> &ClientServerId {
        self.state.id()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // Queries against the cached state.

    pub fn workspace(&self) -> &P4WorkspaceViewState {
        &self.state.server.workspace
    }

    pub fn get_client_roots(
        &self,
        alerts: &dyn AlertSink,
        reference_dirs: &[PathBuf],
    ) -> Vec<PathBuf> {
        workspace::get_client_roots(self.workspace(), alerts, reference_dirs)
    }

    pub fn get_best_client_root(&self, reference: &Path) -> Option<PathBuf> {
        let roots: Vec<PathBuf> = self
            .workspace()
            .roots
            .iter()
            .filter(|root| root.as_str() != NULL_ROOT)
            .map(PathBuf::from)
            .collect();
        workspace::get_best_client_root(&roots, reference)
    }

    pub fn get_open_files(&self) -> Vec<P4FileUpdateState> {
        self.file_actions.get_open_files(&self.state)
    }

    pub fn get_opened_change_lists(&self) -> Vec<P4ChangeListState> {
        self.change_lists.get_opened_change_lists(&self.state)
    }

    pub fn get_job(&self, id: &str) -> Option<&P4JobState> {
        self.jobs.get_job(&self.state, id)
    }

    pub fn get_have_files(&mut self, files: &[PathBuf]) -> Vec<P4FileSyncState> {
        self.known_have.get_have_files(&mut self.state, files)
    }

    pub fn get_users(&self) -> &[UserSummary] {
        &self.state.server.users.users
    }

    pub fn get_job_statuses(&self) -> &[String] {
        &self.state.server.job_status.statuses
    }

    /// Last refresh of each front-end, for display.
    pub fn refresh_dates(&self) -> Vec<(&'static str, DateTime<Utc>)> {
        let front_ends: [&dyn CacheFrontEnd; 7] = [
            &self.workspace,
            &self.file_actions,
            &self.change_lists,
            &self.jobs,
            &self.known_have,
            &self.users,
            &self.job_statuses,
        ];
        front_ends
            .iter()
            .map(|front_end| (front_end.name(), front_end.last_refresh_date()))
            .collect()
    }

    // Pending update creation. Each returns `None` when nothing needs to change
    // on the server.

    pub fn add_or_edit_file(
        &mut self,
        file: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        self.file_actions
            .add_or_edit_file(&mut self.state, file, changelist)
    }

    pub fn edit_file(&mut self, file: &Path, changelist: i32) -> Result<Option<PendingUpdateState>> {
        self.file_actions.edit_file(&mut self.state, file, changelist)
    }

    pub fn delete_file(
        &mut self,
        file: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        self.file_actions.delete_file(&mut self.state, file, changelist)
    }

    pub fn revert_file(&mut self, file: &Path) -> Result<Option<PendingUpdateState>> {
        self.file_actions.revert_file(&mut self.state, file)
    }

    pub fn move_file(
        &mut self,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        self.file_actions
            .move_file(&mut self.state, source, target, changelist)
    }

    pub fn integrate_file(
        &mut self,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> Result<Option<PendingUpdateState>> {
        self.file_actions
            .integrate_file(&mut self.state, source, target, changelist)
    }

    pub fn delete_changelist(&mut self, changelist: i32) -> Result<Option<PendingUpdateState>> {
        self.change_lists
            .delete_changelist(&mut self.state, changelist)
    }

    pub fn move_files_to_changelist(
        &mut self,
        files: &[PathBuf],
        description: &str,
        changelist: Option<i32>,
    ) -> Result<Option<PendingUpdateState>> {
        self.change_lists
            .move_files_to_changelist(&mut self.state, files, description, changelist)
    }

    pub fn rename_changelist(
        &mut self,
        changelist: i32,
        description: &str,
    ) -> Result<Option<PendingUpdateState>> {
        self.change_lists
            .rename_changelist(&mut self.state, changelist, description)
    }

    pub fn add_job(&mut self, changelist: i32, job: &str) -> Result<Option<PendingUpdateState>> {
        self.change_lists.add_job(&mut self.state, changelist, job)
    }

    pub fn remove_job(&mut self, changelist: i32, job: &str) -> Result<Option<PendingUpdateState>> {
        self.change_lists.remove_job(&mut self.state, changelist, job)
    }

    // Pending update queue.

    pub fn add_pending_update(&mut self, update: PendingUpdateState) {
        self.state.add_pending_update(update);
    }

    pub fn remove_pending_update(&mut self, ref_id: u32) -> Option<PendingUpdateState> {
        self.state.remove_pending_update(ref_id)
    }

    /// Drops local speculative state that no queued update accounts for.
    pub fn check_local_integrity(&mut self) {
        self.file_actions.check_local_integrity(&mut self.state);
        self.change_lists.check_local_integrity(&mut self.state);
    }

    /// Reloads what `query` names. Specific queries always go to the server;
    /// [`ServerQuery::All`] only reloads stale front-ends.
    pub fn run_query(&mut self, ctx: &ServerContext<'_>, query: &ServerQuery) -> Result<()> {
        debug!("Running {query:?} for {}", self.state.id());
        match query {
            ServerQuery::Workspace => {
                self.workspace
                    .inner_load_server_cache(ctx, &mut self.state)?;
                self.after_workspace_load(ctx)?;
            }
            ServerQuery::FileActions => self
                .file_actions
                .inner_load_server_cache(ctx, &mut self.state)?,
            ServerQuery::ChangeLists => self
                .change_lists
                .inner_load_server_cache(ctx, &mut self.state)?,
            ServerQuery::Jobs => self.jobs.inner_load_server_cache(ctx, &mut self.state)?,
            ServerQuery::JobIds(ids) => jobs::refresh_job_states(ctx, &mut self.state, ids)?,
            ServerQuery::KnownHave(files) => {
                self.known_have.load_for(ctx, &mut self.state, files)?
            }
            ServerQuery::JobStatusList => self
                .job_statuses
                .inner_load_server_cache(ctx, &mut self.state)?,
            ServerQuery::UserList => self.users.inner_load_server_cache(ctx, &mut self.state)?,
            ServerQuery::All => {
                self.workspace.load_server_cache(ctx, &mut self.state)?;
                self.after_workspace_load(ctx)?;
                self.file_actions.load_server_cache(ctx, &mut self.state)?;
                self.change_lists.load_server_cache(ctx, &mut self.state)?;
                self.jobs.load_server_cache(ctx, &mut self.state)?;
                self.known_have.load_server_cache(ctx, &mut self.state)?;
                self.users.load_server_cache(ctx, &mut self.state)?;
                self.job_statuses.load_server_cache(ctx, &mut self.state)?;
            }
        }
        Ok(())
    }

    fn after_workspace_load(&mut self, ctx: &ServerContext<'_>) -> Result<()> {
        if self.workspace.take_view_changed() {
            info!("Client view of {} changed; reloading", self.state.id());
            self.refresh_server_state(ctx)?;
        }
        Ok(())
    }

    /// Reloads everything that depends on the client view.
    pub fn refresh_server_state(&mut self, ctx: &ServerContext<'_>) -> Result<()> {
        self.file_actions
            .inner_load_server_cache(ctx, &mut self.state)?;
        self.change_lists
            .inner_load_server_cache(ctx, &mut self.state)?;
        self.jobs.inner_load_server_cache(ctx, &mut self.state)
    }

    /// Marks what `query` names as stale, so the next pass reloads it without
    /// asking the server now.
    pub(crate) fn mark_stale(&mut self, query: &ServerQuery) {
        match query {
            ServerQuery::FileActions => self.file_actions.invalidate(),
            ServerQuery::ChangeLists => self.change_lists.invalidate(),
            other => debug!("{other:?} has no staleness to reset"),
        }
    }

    /// Schedules the local copies an update touched for removal at the next
    /// load of their front-end.
    pub(crate) fn mark_update_committed(&mut self, update: &PendingUpdateState) {
        if update.group().is_file_group() {
            for file in update.file().into_iter().chain(update.source_file()) {
                let mapping = self.state.repo().get_by_location(&file);
                self.file_actions.mark_committed(&mapping);
            }
            return;
        }
        if let Some(changelist) = update.changelist() {
            self.change_lists.mark_committed(changelist);
        }
        if update.action() == UpdateAction::ReopenFilesIntoChangelist {
            for file in update.field_values() {
                let mapping = self.state.repo().get_by_location(Path::new(file));
                self.file_actions.mark_committed(&mapping);
            }
        }
    }

    /// The server created `new_id` for the local changelist `old_id`.
    pub(crate) fn remap_changelist(&mut self, old_id: i32, new_id: i32) {
        self.state.remap_changelist(old_id, new_id);
        self.change_lists.mark_committed(new_id);
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.state.save(path)
    }
}
