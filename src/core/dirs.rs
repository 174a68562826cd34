use crate::core::error::{CacheError, Result};
use std::path::PathBuf;

const APP_DIR: &str = "p4ic-cache";
const STATE_FILE: &str = "state.json";

pub fn get_config_directory() -> Result<PathBuf> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config"))),
        "macos" => dirs::home_dir().map(|home| home.join("Library/Application Support")),
        _ => dirs::config_dir(),
    };

    base.map(|dir| dir.join(APP_DIR))
        .ok_or(CacheError::ConfigDirectoryNotFound)
}

pub fn get_cache_directory() -> Result<PathBuf> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache"))),
        "macos" => dirs::home_dir().map(|home| home.join("Library/Caches")),
        _ => dirs::cache_dir(),
    };

    base.map(|dir| dir.join(APP_DIR))
        .ok_or(CacheError::CacheDirectoryNotFound)
}

/// Directory name for one client on one server.
///
/// Server ids and client names may contain characters that are not valid in a
/// path, so the pair is hashed.
pub fn client_state_key(server_id: &str, client_name: &str) -> String {
    let digest = md5::compute(format!("{server_id}\u{0}{client_name}"));
    format!("{digest:x}")
}

/// Location of the persisted state for one client, rooted at `base` (usually the
/// cache directory or a configured override).
pub fn client_state_file(base: &std::path::Path, server_id: &str, client_name: &str) -> PathBuf {
    base.join(client_state_key(server_id, client_name))
        .join(STATE_FILE)
}
