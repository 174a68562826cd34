//! Test clients and predefined cache scenarios
//!
//! A [`TestClient`] pairs a temporary client root with a [`FakeServer`] that maps
//! `//depot/...` under it, so every scenario starts from a known server state.

#![allow(dead_code)]

use super::fake_server::FakeServer;
use p4ic_cache::core::config::CacheConfig;
use p4ic_cache::state::{ClientLocalServerState, ClientServerId};
use p4ic_cache::sync::{AlertLog, ClientCacheManager, ServerConnection, ServerQuery};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const SERVER_ID: &str = "perforce:1666";
pub const CLIENT_NAME: &str = "ws";

pub struct TestClient {
    pub dir: TempDir,
    pub root: PathBuf,
    pub server: Arc<FakeServer>,
    pub alerts: Arc<AlertLog>,
}

impl TestClient {
    /// Path of `name` under the client root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates `name` under the client root with `content`.
    pub fn write_file(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.file(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Where scenarios persist the client state.
    pub fn state_file(&self) -> PathBuf {
        self.dir.path().join("state").join("state.json")
    }

    pub fn new_state(&self) -> ClientLocalServerState {
        ClientLocalServerState::new(ClientServerId::new(SERVER_ID, CLIENT_NAME), false)
    }

    /// Connection over `state`, online.
    pub fn connect(&self, state: ClientLocalServerState) -> ServerConnection {
        let manager = ClientCacheManager::new(state, CacheConfig::default());
        ServerConnection::new(self.server.clone(), self.alerts.clone(), manager)
    }

    /// Connection over a fresh state with everything loaded from the server.
    pub fn connect_loaded(&self) -> anyhow::Result<ServerConnection> {
        let connection = self.connect(self.new_state());
        connection.query(&ServerQuery::All)?;
        Ok(connection)
    }
}

/// Empty client whose root exists on disk.
pub fn setup_test_client() -> anyhow::Result<TestClient> {
    let dir = TempDir::new()?;
    let root = dir.path().join("root");
    fs::create_dir_all(&root)?;
    let server = Arc::new(FakeServer::new(CLIENT_NAME, &root));
    Ok(TestClient {
        dir,
        root,
        server,
        alerts: Arc::new(AlertLog::new()),
    })
}

/// Scenario: two submitted files, one already open for edit in changelist 5
/// ("fix bug", fixing JOB001).
///
/// - `src/main.c`: head #3, synced #3, open for edit in 5
/// - `src/util.c`: head #2, synced #2, not open
pub fn setup_client_with_changelist() -> anyhow::Result<TestClient> {
    let client = setup_test_client()?;
    let main = client.write_file("src/main.c", "int main() { return 0; }\n")?;
    let util = client.write_file("src/util.c", "void util() {}\n")?;
    client.server.add_depot_file(&main, 3, 3);
    client.server.add_depot_file(&util, 2, 2);
    client.server.add_job("JOB001", "Crash on start");
    client.server.add_changelist(5, "fix bug", &["JOB001"]);
    client
        .server
        .open_file(&main, p4ic_cache::sync::OpenAction::Edit, 5);
    Ok(client)
}

/// Writes a config file that keeps state files under `state_dir`.
pub fn write_config(dir: &Path, state_dir: &Path) -> anyhow::Result<PathBuf> {
    let config = CacheConfig {
        state_dir: Some(state_dir.to_path_buf()),
        ..CacheConfig::default()
    };
    let path = dir.join("config.json");
    config.save_to(&path)?;
    Ok(path)
}
