//! Common assertion helpers for cache state and CLI output
//!
//! Provides predicates for p4ic-cache command output and checks over the merged
//! view of opened files.

#![allow(dead_code)]

use p4ic_cache::state::{FileUpdateAction, P4FileUpdateState};
use predicates::prelude::*;
use std::path::Path;

/// Creates a predicate that checks for a section header
pub fn has_section(header: &str) -> impl Predicate<str> {
    predicates::str::contains(format!("{header}:"))
}

/// Creates a predicate that checks for the missing state file error
pub fn state_not_found() -> impl Predicate<str> {
    predicates::str::contains("State file does not exist")
}

/// Creates a predicate that checks for the client selection error
pub fn no_client_selected() -> impl Predicate<str> {
    predicates::str::contains("No client selected")
}

/// Creates a predicate that checks for a listed pending update action
pub fn has_pending_action(action: &str) -> impl Predicate<str> {
    predicates::str::contains(format!(" {action} ("))
}

/// The open state of `path` in `files`, if any.
pub fn find_open<'a>(files: &'a [P4FileUpdateState], path: &Path) -> Option<&'a P4FileUpdateState> {
    files.iter().find(|file| file.mapping().is_at(path))
}

/// Asserts that `path` is open for `action` in `changelist`.
pub fn assert_open(
    files: &[P4FileUpdateState],
    path: &Path,
    action: FileUpdateAction,
    changelist: i32,
) {
    let open = find_open(files, path)
        .unwrap_or_else(|| panic!("{} is not open; open files: {files:?}", path.display()));
    assert_eq!(open.action, action, "action of {}", path.display());
    assert_eq!(open.changelist, changelist, "changelist of {}", path.display());
}

/// Asserts that `path` is not among the open files.
pub fn assert_not_open(files: &[P4FileUpdateState], path: &Path) {
    assert!(
        find_open(files, path).is_none(),
        "{} should not be open",
        path.display()
    );
}
