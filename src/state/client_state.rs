//! One side ("local" or "server") of a client's cached state.

use crate::core::encoding::StateElement;
use crate::core::error::Result;
use crate::state::cached_state::CachedState;
use crate::state::changelist::{self, P4ChangeListState};
use crate::state::identity::{FileMapping, IdentityKey};
use crate::state::job::P4JobState;
use crate::state::lists::{self, JobStatusListState, UserSummaryListState};
use crate::state::references::{DecodeReferences, EncodeReferences};
use crate::state::sync_state::{self, P4FileSyncState};
use crate::state::update_state::{self, P4FileUpdateState};
use crate::state::workspace_view::{self, P4WorkspaceViewState};
use log::{debug, warn};
use std::collections::BTreeMap;

pub const LOCAL_TAG: &str = "local";
pub const SERVER_TAG: &str = "server";

const JOB_REF_TAG: &str = "j";

#[derive(Debug, Clone)]
pub struct P4ClientState {
    pub case_insensitive: bool,
    pub workspace: P4WorkspaceViewState,
    pub changes: Vec<P4ChangeListState>,
    pub have_files: Vec<P4FileSyncState>,
    pub updated_files: Vec<P4FileUpdateState>,
    pub job_status: JobStatusListState,
    pub jobs: BTreeMap<String, P4JobState>,
    pub users: UserSummaryListState,
}

impl P4ClientState {
    pub fn new(case_insensitive: bool, client_name: impl Into<String>) -> Self {
        Self {
            case_insensitive,
            workspace: P4WorkspaceViewState::new(client_name),
            changes: Vec::new(),
            have_files: Vec::new(),
            updated_files: Vec::new(),
            job_status: JobStatusListState::default(),
            jobs: BTreeMap::new(),
            users: UserSummaryListState::default(),
        }
    }

    pub fn change(&self, id: i32) -> Option<&P4ChangeListState> {
        self.changes.iter().find(|change| change.id == id)
    }

    pub fn change_mut(&mut self, id: i32) -> Option<&mut P4ChangeListState> {
        self.changes.iter_mut().find(|change| change.id == id)
    }

    /// Inserts the changelist, replacing one with the same id.
    pub fn put_change(&mut self, change: P4ChangeListState) {
        match self.change_mut(change.id) {
            Some(existing) => *existing = change,
            None => self.changes.push(change),
        }
    }

    pub fn remove_change(&mut self, id: i32) -> Option<P4ChangeListState> {
        let index = self.changes.iter().position(|change| change.id == id)?;
        Some(self.changes.remove(index))
    }

    pub fn update_state_for(&self, mapping: &FileMapping) -> Option<&P4FileUpdateState> {
        self.updated_files
            .iter()
            .find(|state| state.mapping() == mapping)
    }

    /// Inserts the update state, replacing the one for the same file.
    pub fn put_update_state(&mut self, update: P4FileUpdateState) {
        match self
            .updated_files
            .iter_mut()
            .find(|state| state.mapping() == update.mapping())
        {
            Some(existing) => *existing = update,
            None => self.updated_files.push(update),
        }
    }

    pub fn remove_update_state(&mut self, mapping: &FileMapping) -> Option<P4FileUpdateState> {
        let index = self
            .updated_files
            .iter()
            .position(|state| state.mapping() == mapping)?;
        Some(self.updated_files.remove(index))
    }

    pub fn have_state_for(&self, mapping: &FileMapping) -> Option<&P4FileSyncState> {
        self.have_files.iter().find(|state| state.mapping() == mapping)
    }

    pub fn have_state_for_mut(&mut self, mapping: &FileMapping) -> Option<&mut P4FileSyncState> {
        self.have_files
            .iter_mut()
            .find(|state| state.mapping() == mapping)
    }

    pub fn serialize(&self, tag: &str, refs: &EncodeReferences) -> StateElement {
        let mut wrapper = StateElement::new(tag);
        wrapper.set_bool("ci", self.case_insensitive);

        let mut workspace = StateElement::new(workspace_view::TAG);
        self.workspace.serialize(&mut workspace, refs);
        wrapper.add_child(workspace);

        for change in &self.changes {
            let mut element = StateElement::new(changelist::TAG);
            change.serialize(&mut element, refs);
            wrapper.add_child(element);
        }
        for have in self.have_files.iter().filter(|h| is_bound(h.mapping())) {
            let mut element = StateElement::new(sync_state::TAG);
            have.serialize(&mut element, refs);
            wrapper.add_child(element);
        }
        for update in &self.updated_files {
            if !is_bound(update.mapping()) {
                continue;
            }
            let mut element = StateElement::new(update_state::TAG);
            update.serialize(&mut element, refs);
            wrapper.add_child(element);
        }

        let mut job_status = StateElement::new(lists::JOB_STATUS_TAG);
        self.job_status.serialize(&mut job_status, refs);
        wrapper.add_child(job_status);

        let mut users = StateElement::new(lists::USER_LIST_TAG);
        self.users.serialize(&mut users, refs);
        wrapper.add_child(users);

        for id in self.jobs.keys() {
            let mut job_ref = StateElement::new(JOB_REF_TAG);
            job_ref.set_attr("id", id.as_str());
            wrapper.add_child(job_ref);
        }
        wrapper
    }

    pub fn deserialize(wrapper: &StateElement, tag: &str, refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(tag)?;
        let workspace = match wrapper.child(workspace_view::TAG) {
            Some(element) => P4WorkspaceViewState::deserialize(element, refs)?,
            None => P4WorkspaceViewState::new(""),
        };
        let mut state = Self::new(wrapper.get_bool("ci"), "");
        state.workspace = workspace;

        for element in wrapper.children_named(changelist::TAG) {
            state.put_change(P4ChangeListState::deserialize(element, refs)?);
        }
        for element in wrapper.children_named(sync_state::TAG) {
            state
                .have_files
                .push(P4FileSyncState::deserialize(element, refs)?);
        }
        for element in wrapper.children_named(update_state::TAG) {
            state.put_update_state(P4FileUpdateState::deserialize(element, refs)?);
        }
        if let Some(element) = wrapper.child(lists::JOB_STATUS_TAG) {
            state.job_status = JobStatusListState::deserialize(element, refs)?;
        }
        if let Some(element) = wrapper.child(lists::USER_LIST_TAG) {
            state.users = UserSummaryListState::deserialize(element, refs)?;
        }
        for element in wrapper.children_named(JOB_REF_TAG) {
            let id = element.require_attr("id")?;
            match refs.job(id) {
                Some(job) => {
                    state.jobs.insert(id.to_string(), job);
                }
                None => warn!("Dropping reference to unknown job {id}"),
            }
        }
        Ok(state)
    }
}

/// A mapping with neither path can no longer be persisted.
fn is_bound(mapping: &FileMapping) -> bool {
    if let IdentityKey::Unbound(id) = mapping.identity_key() {
        debug!("Not persisting state for unbound file mapping #{id}");
        false
    } else {
        true
    }
}
