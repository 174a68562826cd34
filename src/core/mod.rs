//! Core building blocks: errors, configuration, directories, the persisted
//! element encoding and CLI output helpers.

pub mod command_init;
pub mod config;
pub mod dirs;
pub mod encoding;
pub mod error;
pub mod output;

// === Error handling ===
pub use error::{CacheError, ExecError, Result};

// === Configuration ===
pub use config::CacheConfig;

// === Persistence encoding ===
pub use encoding::StateElement;

// === Command initialization ===
pub use command_init::{StateCommandContext, StateCommandInit, StateLocation};

// === Output formatting ===
pub use output::{
    print_entry, print_error, print_info, print_item, print_notice, print_section_header,
    print_success, print_warning,
};
