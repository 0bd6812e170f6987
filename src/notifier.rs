use serde::{Deserialize, Serialize};
use tracing::warn;

/// Mirrors the browser's notification permission states.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    Granted,
    Denied,
    #[default]
    Default,
}

impl NotificationPermission {
    pub fn is_granted(&self) -> bool {
        matches!(self, NotificationPermission::Granted)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Desktop notification stand-in: surfaces the alert in the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        warn!(target: "notification", "{} {}", title, body);
    }
}
