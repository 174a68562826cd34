use crate::core::{
    command_init::{StateCommandInit, StateLocation},
    error::Result,
    print_entry, print_section_header,
};
use crate::state::NEVER_LOADED;
use chrono::{DateTime, Utc};
use std::path::Path;

pub fn execute_status(location: &StateLocation, config_file: Option<&Path>) -> Result<()> {
    let context = StateCommandInit::initialize(location, config_file)?;
    let manager = &context.manager;
    let state = manager.state();

    print_section_header("Client");
    print_entry("Client", &state.id().client_name);
    print_entry("Server", &state.id().server_id);
    print_entry("State file", &context.state_file.display().to_string());
    print_entry(
        "Case-insensitive",
        if state.is_case_insensitive() { "yes" } else { "no" },
    );
    let roots = &manager.workspace().roots;
    print_entry(
        "Roots",
        &if roots.is_empty() {
            "-none-".to_string()
        } else {
            roots.join(", ")
        },
    );

    print_section_header("Cache");
    print_entry("Open files", &manager.get_open_files().len().to_string());
    print_entry(
        "Pending changelists",
        &manager.get_opened_change_lists().len().to_string(),
    );
    print_entry(
        "Pending updates",
        &state.pending_updates().len().to_string(),
    );
    print_entry("Known files", &state.repo().len().to_string());

    print_section_header("Last refresh");
    for (name, date) in manager.refresh_dates() {
        print_entry(name, &format_refresh_date(date));
    }
    Ok(())
}

pub fn format_refresh_date(date: DateTime<Utc>) -> String {
    if date <= NEVER_LOADED {
        "never".to_string()
    } else {
        date.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_refresh_date() {
        assert_eq!(format_refresh_date(NEVER_LOADED), "never");
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_refresh_date(date), "2024-03-01 12:30:00 UTC");
    }
}
