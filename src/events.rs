//! Push notifications for observers (a GUI, or the CLI's `run` command).
//!
//! Every event is tagged with the package id so a multi-package view can route it.

use serde::Serialize;
use tokio::sync::broadcast;

/// Broadcast channel capacity for package events
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PackageEvent {
    /// A line of standard output (also used for installer/compiler output).
    #[serde(rename_all = "camelCase")]
    Output { package_id: String, line: String },

    /// A line of standard error.
    #[serde(rename_all = "camelCase")]
    Error { package_id: String, line: String },

    /// A non-fatal problem during an operation.
    #[serde(rename_all = "camelCase")]
    Warning { package_id: String, message: String },

    /// The package's process exited. `code` is `None` when killed by a signal.
    #[serde(rename_all = "camelCase")]
    Stopped { package_id: String, code: Option<i32> },
}

impl PackageEvent {
    pub fn package_id(&self) -> &str {
        match self {
            PackageEvent::Output { package_id, .. }
            | PackageEvent::Error { package_id, .. }
            | PackageEvent::Warning { package_id, .. }
            | PackageEvent::Stopped { package_id, .. } => package_id,
        }
    }

    /// Whether this reports the exit of package `id`.
    pub fn is_stop_of(&self, id: &str) -> bool {
        matches!(self, PackageEvent::Stopped { package_id, .. } if package_id == id)
    }
}

/// Fan-out of [`PackageEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PackageEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Dropped silently when nobody is listening.
    pub fn emit(&self, event: PackageEvent) {
        let _ = self.sender.send(event);
    }

    pub fn output(&self, package_id: &str, line: impl Into<String>) {
        self.emit(PackageEvent::Output {
            package_id: package_id.to_string(),
            line: line.into(),
        });
    }

    /// Log and publish a warning.
    pub fn warn(&self, package_id: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(package_id = %package_id, "{}", message);
        self.emit(PackageEvent::Warning {
            package_id: package_id.to_string(),
            message,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PackageEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
