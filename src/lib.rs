//! p4ic-cache - an offline-capable cache of Perforce client state.
//!
//! The library keeps a per-client mirror of the server (workspace view, opened
//! files, pending changelists, jobs, have revisions, users), a local speculative
//! overlay, and a queue of pending updates that are replayed against the server
//! once it is reachable.
//!
//! # Public API
//! - [`state`]: cached records, file identities and persistence
//! - [`sync`]: cache front-ends, update execution and the server connection
//! - [`core`]: errors, configuration and output helpers

pub mod commands;
pub mod core;
pub mod state;
pub mod sync;

pub use core::{CacheConfig, CacheError, ExecError, Result};

pub use state::{
    ClientLocalServerState, ClientServerId, FileMapping, FileMappingRepo, FileUpdateAction,
    P4ChangeListState, P4FileSyncState, P4FileUpdateState, P4JobState, PendingUpdateState,
    UpdateAction, UpdateGroup,
};

pub use sync::{
    AlertLog, AlertSink, ClientCacheManager, ServerConnection, ServerExec, ServerQuery,
    ServerUpdateAction,
};
