//! User-facing notifications.
//!
//! Every failure is caught at the operation boundary and turned into a
//! [`Notification`]; nothing propagates far enough to take a view down.

use std::sync::Mutex;

use tracing::{error, info};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

/// One dismissible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            level: Level::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            level: Level::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Receiver of notifications.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the `tracing` log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            Level::Success => info!(title = %n.title, "{}", n.message),
            Level::Error => error!(title = %n.title, "{}", n.message),
        }
    }
}

/// Keeps notifications until they are dismissed.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    items: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.all()
            .into_iter()
            .filter(|n| n.level == Level::Error)
            .collect()
    }

    /// Remove one notification; out-of-range indexes are ignored.
    pub fn dismiss(&self, index: usize) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if index < items.len() {
            items.remove(index);
        }
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_and_dismiss() {
        let n = CollectingNotifier::new();
        n.notify(Notification::error("Failed to update task", "Task not found"));
        n.notify(Notification::success("Task created", "TKT-0001"));
        assert_eq!(n.errors().len(), 1);
        n.dismiss(0);
        n.dismiss(9);
        assert_eq!(n.all(), vec![Notification::success("Task created", "TKT-0001")]);
        assert_eq!(n.take().len(), 1);
        assert!(n.all().is_empty());
    }
}
