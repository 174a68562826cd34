pub mod opened;
pub mod pending;
pub mod roots;
pub mod status;
pub mod verify;

pub use opened::*;
pub use pending::*;
pub use roots::*;
pub use status::*;
pub use verify::*;

use crate::core::{print_error, print_notice, print_warning};
use crate::sync::alerts::{Alert, AlertLevel};

/// Prints alerts collected while a command ran, most severe style per level.
pub fn print_alerts(alerts: &[Alert]) {
    for alert in alerts {
        match alert.level {
            AlertLevel::Critical => print_error(&alert.to_string()),
            AlertLevel::Warning => print_warning(&alert.to_string()),
            AlertLevel::Notice => print_notice(&alert.to_string()),
        }
    }
}
