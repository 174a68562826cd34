use crate::core::{
    command_init::{StateCommandInit, StateLocation},
    error::Result,
    print_entry, print_info, print_section_header, print_success,
};
use std::path::Path;

/// Checks that every local speculative record belongs to a pending update. With
/// `fix`, the orphans are dropped and the state is saved.
pub fn execute_verify(
    location: &StateLocation,
    config_file: Option<&Path>,
    fix: bool,
) -> Result<()> {
    let mut context = StateCommandInit::initialize(location, config_file)?;
    let manager = &mut context.manager;

    let files_before = manager.state().local.updated_files.len();
    let changes_before = manager.state().local.changes.len();
    manager.check_local_integrity();
    let dropped_files = files_before - manager.state().local.updated_files.len();
    let dropped_changes = changes_before - manager.state().local.changes.len();

    if dropped_files == 0 && dropped_changes == 0 {
        print_success("Local state is consistent with the pending updates.");
        return Ok(());
    }

    print_section_header("Orphaned local state");
    print_entry("Files", &dropped_files.to_string());
    print_entry("Changelists", &dropped_changes.to_string());

    if fix {
        manager.save(&context.state_file)?;
        print_success("Removed orphaned local state.");
    } else {
        print_info("Run again with --fix to remove it.");
    }
    Ok(())
}
