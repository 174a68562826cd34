use crate::core::{
    command_init::{StateCommandInit, StateLocation},
    error::Result,
    print_info, print_item, print_section_header,
};
use colored::*;
use std::path::Path;

/// Lists pending changelists and the files open in each, local changes included.
pub fn execute_opened(location: &StateLocation, config_file: Option<&Path>) -> Result<()> {
    let context = StateCommandInit::initialize(location, config_file)?;
    let manager = &context.manager;
    let changes = manager.get_opened_change_lists();
    let files = manager.get_open_files();

    if files.is_empty() && changes.iter().all(|change| change.is_default()) {
        print_info("No opened files.");
        return Ok(());
    }

    for change in &changes {
        let header = if change.is_default() {
            "Default changelist".to_string()
        } else if change.is_local() {
            format!("New changelist ({})", change.comment)
        } else {
            format!("Changelist {} ({})", change.id, change.comment)
        };
        print_section_header(&header);
        for job in &change.jobs {
            print_item(&format!("{} {job}", "job".bright_black()));
        }
        for file in files.iter().filter(|file| file.changelist == change.id) {
            let marker = if file.pending_ref.is_some() {
                "*".yellow().to_string()
            } else {
                " ".to_string()
            };
            print_item(&format!(
                "{marker} {:<12} {}",
                file.action.as_str(),
                file.mapping()
            ));
        }
    }
    Ok(())
}
