//! Shared setup for commands that work on a persisted client state.
//!
//! Every command needs the same steps before it can show anything:
//! 1. **Configuration**: load the given config file, or the default one
//! 2. **State location**: an explicit file, or the file derived from server and client
//! 3. **State loading**: read the state and wrap it in a cache manager

use crate::core::config::CacheConfig;
use crate::core::dirs::client_state_file;
use crate::core::error::{CacheError, Result};
use crate::state::ClientLocalServerState;
use crate::sync::manager::ClientCacheManager;
use std::path::{Path, PathBuf};

/// Where the persisted state of the selected client lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLocation {
    File(PathBuf),
    Client { server: String, client: String },
}

impl StateLocation {
    /// Builds the location from the global command line options.
    pub fn from_args(
        state: Option<PathBuf>,
        server: Option<String>,
        client: Option<String>,
    ) -> Result<Self> {
        match (state, server, client) {
            (Some(path), _, _) => Ok(Self::File(path)),
            (None, Some(server), Some(client)) => Ok(Self::Client { server, client }),
            _ => Err(CacheError::NoClientSelected),
        }
    }

    pub fn resolve(&self, config: &CacheConfig) -> Result<PathBuf> {
        match self {
            Self::File(path) => Ok(path.clone()),
            Self::Client { server, client } => Ok(client_state_file(
                &config.state_directory()?,
                server,
                client,
            )),
        }
    }
}

/// Everything a command needs once initialization succeeded.
pub struct StateCommandContext {
    pub config: CacheConfig,
    pub state_file: PathBuf,
    pub manager: ClientCacheManager,
}

pub struct StateCommandInit;

impl StateCommandInit {
    /// Loads the configuration from `config_file`, or the default location when
    /// `None`, then the selected state.
    pub fn initialize(
        location: &StateLocation,
        config_file: Option<&Path>,
    ) -> Result<StateCommandContext> {
        let config = match config_file {
            Some(path) => CacheConfig::load_from(path)?,
            None => CacheConfig::load_or_create()?,
        };
        Self::initialize_with_config(location, config)
    }

    pub fn initialize_with_config(
        location: &StateLocation,
        config: CacheConfig,
    ) -> Result<StateCommandContext> {
        let state_file = location.resolve(&config)?;
        log::debug!("Loading client state from {}", state_file.display());
        let state = ClientLocalServerState::load(&state_file, config.cache_miss_threshold)?;
        let manager = ClientCacheManager::new(state, config.clone());
        Ok(StateCommandContext {
            config,
            state_file,
            manager,
        })
    }
}
