//! Output helpers shared by the CLI commands.
//!
//! Every command prints through these functions so that errors, alerts and
//! listings look the same regardless of which slice of the cache is shown.
//!
//! - Errors and critical alerts in red, warnings in yellow, notices in blue
//! - Section headers followed by indented `label: value` rows

use colored::*;

/// Prints an error message.
///
/// ```text
///
/// ✕ Error: <message>
///
/// ```
pub fn print_error(message: &str) {
    println!("\n{} {}\n", "✕ Error:".red(), message.white());
}

/// Prints a warning line, used for cache alerts of warning severity.
pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow(), message.white());
}

/// Prints a notice line, used for cache alerts of notice severity.
pub fn print_notice(message: &str) {
    println!("{} {}", "i".blue(), message.white());
}

pub fn print_success(message: &str) {
    println!("\n{} {}", "✓".green(), message.white());
}

pub fn print_info(message: &str) {
    println!("\n{}\n", message.white());
}

/// Prints a section header followed by a blank line.
pub fn print_section_header(header: &str) {
    println!("\n{}:\n", header.white());
}

/// Prints one `label: value` row inside a section, label muted.
pub fn print_entry(label: &str, value: &str) {
    println!("  {} {}", format!("{label}:").bright_black(), value.white());
}

/// Prints an indented list item inside a section.
pub fn print_item(text: &str) {
    println!("  {}", text.white());
}
