//! User-facing notifications raised by the cache core.
//!
//! Server failures never leave the core as errors. They are turned into alerts
//! and handed to an [`AlertSink`] which the embedding application renders.

use log::{info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Notice,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub files: Vec<PathBuf>,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)?;
        for file in &self.files {
            write!(f, "\n  {}", file.display())?;
        }
        Ok(())
    }
}

pub trait AlertSink: Send + Sync {
    fn add_alert(&self, alert: Alert);

    fn add_notice(&self, title: &str, message: &str, files: Vec<PathBuf>) {
        self.add_alert(Alert {
            level: AlertLevel::Notice,
            title: title.to_string(),
            message: message.to_string(),
            files,
        });
    }

    fn add_warning(&self, title: &str, message: &str, files: Vec<PathBuf>) {
        self.add_alert(Alert {
            level: AlertLevel::Warning,
            title: title.to_string(),
            message: message.to_string(),
            files,
        });
    }

    fn add_critical_error(&self, title: &str, message: &str) {
        self.add_alert(Alert {
            level: AlertLevel::Critical,
            title: title.to_string(),
            message: message.to_string(),
            files: Vec::new(),
        });
    }
}

/// Collects alerts in memory until the caller drains them.
#[derive(Debug, Default)]
pub struct AlertLog {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn drain(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn has_level(&self, level: AlertLevel) -> bool {
        self.alerts().iter().any(|a| a.level == level)
    }
}

impl AlertSink for AlertLog {
    fn add_alert(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Notice => info!("{alert}"),
            AlertLevel::Warning | AlertLevel::Critical => warn!("{alert}"),
        }
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_log_collects_and_drains() {
        let log = AlertLog::new();
        log.add_notice("Skipped", "file not in view", vec![PathBuf::from("/x/a.txt")]);
        log.add_critical_error("No roots", "client has no usable root");

        assert!(log.has_level(AlertLevel::Critical));
        assert_eq!(log.alerts().len(), 2);
        assert_eq!(log.drain().len(), 2);
        assert!(log.alerts().is_empty());
    }

    #[test]
    fn test_alert_display_lists_files() {
        let alert = Alert {
            level: AlertLevel::Warning,
            title: "Revert failed".into(),
            message: "server error".into(),
            files: vec![PathBuf::from("/ws/a.txt")],
        };
        assert_eq!(alert.to_string(), "Revert failed: server error\n  /ws/a.txt");
    }
}
