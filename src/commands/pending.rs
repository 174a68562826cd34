use crate::core::{
    command_init::{StateCommandInit, StateLocation},
    error::Result,
    print_entry, print_info, print_item, print_section_header,
};
use crate::state::PendingUpdateState;
use std::path::Path;

pub fn execute_pending(location: &StateLocation, config_file: Option<&Path>) -> Result<()> {
    let context = StateCommandInit::initialize(location, config_file)?;
    let updates = context.manager.state().pending_updates();

    if updates.is_empty() {
        print_info("No pending updates.");
        return Ok(());
    }

    print_section_header("Pending updates");
    for update in updates {
        print_item(&describe_update(update));
        for (key, value) in update.parameters() {
            print_entry(&format!("  {key}"), &value.to_string());
        }
    }
    Ok(())
}

/// One-line summary: ref id, action, group and object ids.
pub fn describe_update(update: &PendingUpdateState) -> String {
    let ids: Vec<&str> = update.ids().iter().map(String::as_str).collect();
    format!(
        "#{} {} ({:?}) [{}]",
        update.ref_id(),
        update.action(),
        update.group(),
        ids.join(", ")
    )
}
