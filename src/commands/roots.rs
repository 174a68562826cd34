use crate::commands::print_alerts;
use crate::core::{
    command_init::{StateCommandInit, StateLocation},
    error::Result,
    print_info, print_item, print_section_header,
};
use crate::sync::alerts::AlertLog;
use colored::*;
use std::path::{Path, PathBuf};

/// Without a reference, lists the client roots. With one, prints the best
/// matching root and the roots that overlap it.
pub fn execute_roots(
    location: &StateLocation,
    config_file: Option<&Path>,
    reference: Option<PathBuf>,
) -> Result<()> {
    let context = StateCommandInit::initialize(location, config_file)?;
    let manager = &context.manager;

    let Some(reference) = reference else {
        print_section_header("Client roots");
        for root in &manager.workspace().roots {
            let status = if Path::new(root).is_dir() {
                "ok".green()
            } else {
                "missing".red()
            };
            print_item(&format!("{root} {status}"));
        }
        return Ok(());
    };

    match manager.get_best_client_root(&reference) {
        Some(best) => {
            print_section_header("Best client root");
            print_item(&best.display().to_string());
        }
        None => print_info(&format!(
            "No client root contains {}",
            reference.display()
        )),
    }

    let alerts = AlertLog::new();
    let matched = manager.get_client_roots(&alerts, &[reference]);
    if !matched.is_empty() {
        print_section_header("Matching directories");
        for dir in matched {
            print_item(&dir.display().to_string());
        }
    }
    print_alerts(&alerts.drain());
    Ok(())
}
