use p4ic_cache::core::encoding::StateElement;
use p4ic_cache::state::{
    CachedState, ClientLocalServerState, ClientServerId, FileUpdateAction, P4ChangeListState,
    P4FileSyncState, P4FileUpdateState, P4JobState, ParamValue, PendingUpdateState, UpdateAction,
};
use p4ic_cache::sync::ViewMapping;
use p4ic_cache::CacheError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

mod common;
use common::fixtures::{CLIENT_NAME, SERVER_ID};

fn new_state() -> ClientLocalServerState {
    ClientLocalServerState::new(ClientServerId::new(SERVER_ID, CLIENT_NAME), false)
}

fn description_update(changelist: i32, text: &str) -> anyhow::Result<PendingUpdateState> {
    let mut params = BTreeMap::new();
    params.insert("changelist".to_string(), ParamValue::from(changelist));
    params.insert("description".to_string(), ParamValue::from(text));
    Ok(PendingUpdateState::new(
        UpdateAction::ChangeChangelistDescription,
        [changelist.to_string()],
        params,
    )?)
}

/// Server side: changelist 5 fixing JOB001 with `/ws/src/main.c` synced at #3
/// and open for edit in it.
fn populated_state() -> ClientLocalServerState {
    let mut state = new_state();
    let main = PathBuf::from("/ws/src/main.c");

    let mut change = P4ChangeListState::with_comment(5, "fix bug");
    change.jobs.insert("JOB001".to_string());
    change.set_updated();
    state.server.put_change(change);

    let mut job = P4JobState::new("JOB001", "Crash on start");
    job.set_updated();
    state.server.jobs.insert(job.id.clone(), job);

    let mapping = state
        .repo()
        .get_by_depot_location("//depot/src/main.c", Some(main.as_path()));
    let mut have = P4FileSyncState::new(mapping.clone());
    have.update_from_have(3);
    state.server.have_files.push(have);

    let mut open = P4FileUpdateState::new(mapping, 5, FileUpdateAction::EditFile);
    open.set_updated();
    state.server.put_update_state(open);
    state
}

fn save_and_load(
    state: &ClientLocalServerState,
    dir: &TempDir,
) -> anyhow::Result<ClientLocalServerState> {
    let path = dir.path().join("cache").join("state.json");
    state.save(&path)?;
    Ok(ClientLocalServerState::load(&path, 100)?)
}

#[cfg(test)]
mod round_trip_tests {
    use super::*;

    #[test]
    fn test_server_state_survives_reload() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let loaded = save_and_load(&populated_state(), &dir)?;

        assert_eq!(loaded.id(), &ClientServerId::new(SERVER_ID, CLIENT_NAME));
        let change = loaded.server.change(5).expect("changelist 5");
        assert_eq!(change.comment, "fix bug");
        assert!(change.jobs.contains("JOB001"));
        assert!(!change.is_never_loaded());

        let job = loaded.server.jobs.get("JOB001").expect("job");
        assert_eq!(job.description, "Crash on start");

        assert_eq!(loaded.server.have_files.len(), 1);
        let have = &loaded.server.have_files[0];
        assert_eq!(have.revision(), 3);
        assert_eq!(
            have.mapping().depot_path().as_deref(),
            Some("//depot/src/main.c")
        );

        assert_eq!(loaded.server.updated_files.len(), 1);
        let open = &loaded.server.updated_files[0];
        assert_eq!(open.action, FileUpdateAction::EditFile);
        assert_eq!(open.changelist, 5);
        Ok(())
    }

    #[test]
    fn test_reloaded_records_share_one_identity() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let loaded = save_and_load(&populated_state(), &dir)?;

        let have = loaded.server.have_files[0].mapping();
        let open = loaded.server.updated_files[0].mapping();
        assert!(have.same_record(open));

        let by_path = loaded
            .repo()
            .get_by_local_file_path(Path::new("/ws/src/main.c"))
            .expect("mapping indexed by path");
        assert!(by_path.same_record(have));
        Ok(())
    }

    #[test]
    fn test_workspace_survives_reload() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut state = new_state();
        state.server.workspace.roots = vec!["/ws".to_string(), "/alt/ws".to_string()];
        state
            .server
            .workspace
            .view
            .push(ViewMapping::new("//depot/...", "//ws/..."));
        state.server.workspace.set_updated();

        let loaded = save_and_load(&state, &dir)?;

        let workspace = &loaded.server.workspace;
        assert_eq!(workspace.name, CLIENT_NAME);
        assert_eq!(workspace.roots, state.server.workspace.roots);
        assert_eq!(workspace.view, state.server.workspace.view);
        assert!(!workspace.is_never_loaded());
        Ok(())
    }

    #[test]
    fn test_pending_updates_keep_local_links() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut state = populated_state();
        let update = description_update(5, "better description")?;
        let ref_id = update.ref_id();

        let mut local = P4ChangeListState::with_comment(5, "better description");
        local.pending_ref = Some(ref_id);
        state.local.put_change(local);
        state.add_pending_update(update);

        let loaded = save_and_load(&state, &dir)?;

        assert_eq!(loaded.pending_updates().len(), 1);
        let reloaded = loaded.pending_update(ref_id).expect("pending update");
        assert_eq!(reloaded.action(), UpdateAction::ChangeChangelistDescription);
        assert_eq!(reloaded.changelist(), Some(5));
        let local = loaded.local.change(5).expect("local changelist");
        assert_eq!(local.pending_ref, Some(ref_id));
        assert_eq!(local.comment, "better description");
        Ok(())
    }

    #[test]
    fn test_new_updates_never_reuse_loaded_ref_ids() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut state = new_state();
        state.add_pending_update(description_update(7, "one")?);

        // Pretend the file came from a long-running session.
        let mut root = state.serialize()?;
        for child in root.children.iter_mut().filter(|c| c.tag == "update") {
            child.set_int("r", 900_000);
        }
        let path = dir.path().join("state.json");
        fs::write(&path, serde_json::to_string(&root)?)?;

        let loaded = ClientLocalServerState::load(&path, 100)?;
        assert!(loaded.has_pending_ref(900_000));

        let fresh = description_update(8, "two")?;
        assert!(fresh.ref_id() > 900_000);
        Ok(())
    }
}

#[cfg(test)]
mod load_error_tests {
    use super::*;

    #[test]
    fn test_missing_state_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let result = ClientLocalServerState::load(&dir.path().join("nope.json"), 100);
        assert!(matches!(result, Err(CacheError::StateFileNotFound { .. })));
        Ok(())
    }

    #[test]
    fn test_corrupt_state_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json")?;

        let result = ClientLocalServerState::load(&path, 100);
        assert!(matches!(result, Err(CacheError::StateParseFailed { .. })));
        Ok(())
    }

    #[test]
    fn test_wrong_root_tag() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("state.json");
        fs::write(&path, serde_json::to_string(&StateElement::new("other"))?)?;

        let result = ClientLocalServerState::load(&path, 100);
        assert!(matches!(result, Err(CacheError::UnexpectedElement { .. })));
        Ok(())
    }
}
