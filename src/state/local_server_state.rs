//! The persisted unit for one client: local and server views, the pending update
//! queue and the file mapping repo they share.

use crate::core::config::DEFAULT_CACHE_MISS_THRESHOLD;
use crate::core::encoding::StateElement;
use crate::core::error::{CacheError, Result};
use crate::state::client_state::{P4ClientState, LOCAL_TAG, SERVER_TAG};
use crate::state::mapping_repo::FileMappingRepo;
use crate::state::pending_update::{self, PendingUpdateState};
use crate::state::references::{DecodeReferences, EncodeReferences};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const ROOT_TAG: &str = "client";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientServerId {
    pub server_id: String,
    pub client_name: String,
}

impl ClientServerId {
    pub fn new(server_id: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            client_name: client_name.into(),
        }
    }
}

impl fmt::Display for ClientServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client_name, self.server_id)
    }
}

#[derive(Debug)]
pub struct ClientLocalServerState {
    id: ClientServerId,
    pub local: P4ClientState,
    pub server: P4ClientState,
    pending: Vec<PendingUpdateState>,
    repo: Arc<FileMappingRepo>,
}

impl ClientLocalServerState {
    pub fn new(id: ClientServerId, case_insensitive: bool) -> Self {
        Self::with_repo(
            id,
            Arc::new(FileMappingRepo::with_threshold(
                case_insensitive,
                DEFAULT_CACHE_MISS_THRESHOLD,
            )),
        )
    }

    pub fn with_repo(id: ClientServerId, repo: Arc<FileMappingRepo>) -> Self {
        let case_insensitive = repo.is_case_insensitive();
        Self {
            local: P4ClientState::new(case_insensitive, id.client_name.clone()),
            server: P4ClientState::new(case_insensitive, id.client_name.clone()),
            id,
            pending: Vec::new(),
            repo,
        }
    }

    pub fn id(&self) -> &ClientServerId {
        &self.id
    }

    pub fn repo(&self) -> &Arc<FileMappingRepo> {
        &self.repo
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.repo.is_case_insensitive()
    }

    pub fn pending_updates(&self) -> &[PendingUpdateState] {
        &self.pending
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_update(&self, ref_id: u32) -> Option<&PendingUpdateState> {
        self.pending.iter().find(|update| update.ref_id() == ref_id)
    }

    pub fn has_pending_ref(&self, ref_id: u32) -> bool {
        self.pending_update(ref_id).is_some()
    }

    /// Queues `update` at the end. Older updates of the same group that share an
    /// object id with it are dropped.
    pub fn add_pending_update(&mut self, update: PendingUpdateState) {
        let before = self.pending.len();
        self.pending.retain(|existing| !existing.overlaps(&update));
        let replaced = before - self.pending.len();
        if replaced > 0 {
            debug!("{update} replaces {replaced} older pending update(s)");
        }
        self.pending.push(update);
    }

    pub fn remove_pending_update(&mut self, ref_id: u32) -> Option<PendingUpdateState> {
        let index = self
            .pending
            .iter()
            .position(|update| update.ref_id() == ref_id)?;
        Some(self.pending.remove(index))
    }

    /// Points everything that used the local changelist `old_id` at `new_id`,
    /// once the server has created the real changelist.
    pub fn remap_changelist(&mut self, old_id: i32, new_id: i32) {
        for update in &mut self.pending {
            if let Some(remapped) = update.with_changelist(old_id, new_id) {
                *update = remapped;
            }
        }
        if let Some(mut change) = self.local.remove_change(old_id) {
            change.id = new_id;
            self.local.put_change(change);
        }
        for file in &mut self.local.updated_files {
            if file.changelist == old_id {
                file.changelist = new_id;
            }
        }
        info!("Local changelist {old_id} is now {new_id} on {}", self.id);
    }

    pub fn serialize(&self) -> Result<StateElement> {
        let mut refs = EncodeReferences::new();
        refs.collect(&self.local);
        refs.collect(&self.server);

        let mut root = StateElement::new(ROOT_TAG);
        root.set_attr("sid", self.id.server_id.as_str());
        root.set_attr("c", self.id.client_name.as_str());
        root.set_bool("ci", self.is_case_insensitive());
        refs.serialize(&mut root);
        root.add_child(self.local.serialize(LOCAL_TAG, &refs));
        root.add_child(self.server.serialize(SERVER_TAG, &refs));
        for update in &self.pending {
            root.add_child(update.serialize()?);
        }
        Ok(root)
    }

    pub fn deserialize(root: &StateElement, miss_threshold: usize) -> Result<Self> {
        root.expect_tag(ROOT_TAG)?;
        let id = ClientServerId::new(root.require_attr("sid")?, root.require_attr("c")?);
        let repo = Arc::new(FileMappingRepo::with_threshold(
            root.get_bool("ci"),
            miss_threshold,
        ));

        let refs = DecodeReferences::deserialize(root, &repo)?;
        let local = P4ClientState::deserialize(root.require_child(LOCAL_TAG)?, LOCAL_TAG, &refs)?;
        let server =
            P4ClientState::deserialize(root.require_child(SERVER_TAG)?, SERVER_TAG, &refs)?;
        let mut pending = Vec::new();
        for element in root.children_named(pending_update::TAG) {
            pending.push(PendingUpdateState::deserialize(element)?);
        }

        Ok(Self {
            id,
            local,
            server,
            pending,
            repo,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CacheError::directory_creation_failed(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.serialize()?)?;
        fs::write(path, json).map_err(|e| CacheError::state_write_failed(path, e))?;
        debug!("Saved state for {} to {}", self.id, path.display());
        Ok(())
    }

    pub fn load(path: &Path, miss_threshold: usize) -> Result<Self> {
        if !path.exists() {
            return Err(CacheError::state_file_not_found(path));
        }
        let content =
            fs::read_to_string(path).map_err(|e| CacheError::state_read_failed(path, e))?;
        let root: StateElement =
            serde_json::from_str(&content).map_err(|e| CacheError::state_parse_failed(path, e))?;
        let state = Self::deserialize(&root, miss_threshold)?;
        debug!(
            "Loaded state for {} with {} pending update(s)",
            state.id,
            state.pending.len()
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::update_action::{ParamValue, UpdateAction};
    use std::collections::BTreeMap;

    fn description_update(changelist: i32, text: &str) -> PendingUpdateState {
        let mut params = BTreeMap::new();
        params.insert("changelist".to_string(), ParamValue::from(changelist));
        params.insert("description".to_string(), ParamValue::from(text));
        PendingUpdateState::new(
            UpdateAction::ChangeChangelistDescription,
            [changelist.to_string()],
            params,
        )
        .unwrap()
    }

    #[test]
    fn test_add_pending_update_replaces_same_object() {
        let mut state = ClientLocalServerState::new(ClientServerId::new("p4:1666", "ws"), false);
        state.add_pending_update(description_update(5, "one"));
        state.add_pending_update(description_update(6, "other"));
        state.add_pending_update(description_update(5, "two"));

        let updates = state.pending_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].changelist(), Some(6));
        assert_eq!(
            updates[1].get_str(crate::state::update_action::UpdateParameterName::Description),
            Some("two")
        );
    }

    #[test]
    fn test_remove_pending_update() {
        let mut state = ClientLocalServerState::new(ClientServerId::new("p4:1666", "ws"), false);
        let update = description_update(5, "one");
        let ref_id = update.ref_id();
        state.add_pending_update(update);
        assert!(state.has_pending_ref(ref_id));
        assert!(state.remove_pending_update(ref_id).is_some());
        assert!(!state.has_pending_updates());
        assert!(state.remove_pending_update(ref_id).is_none());
    }

    #[test]
    fn test_remap_changelist() {
        let mut state = ClientLocalServerState::new(ClientServerId::new("p4:1666", "ws"), false);
        state
            .local
            .put_change(crate::state::changelist::P4ChangeListState::with_comment(-3, "new"));
        state.add_pending_update(description_update(-3, "new"));

        state.remap_changelist(-3, 42);
        assert!(state.local.change(-3).is_none());
        assert_eq!(state.local.change(42).unwrap().comment, "new");
        assert_eq!(state.pending_updates()[0].changelist(), Some(42));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientLocalServerState::load(&dir.path().join("state.json"), 10).unwrap_err();
        assert!(matches!(err, CacheError::StateFileNotFound { .. }));
    }
}
