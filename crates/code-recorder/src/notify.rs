//! Lifecycle events and user-facing notices.

use std::fmt;

use edit_log::ExportSummary;

use crate::session::SessionId;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational.
    Info,
    /// Something failed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Error => "error",
        })
    }
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub severity: Severity,
    /// Message text.
    pub message: String,
}

impl Notification {
    /// Create an informational notice.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    /// Create an error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Events emitted by a recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// A session started.
    Started {
        /// Session identifier.
        id: SessionId,
    },
    /// A session stopped and its exports were written.
    Stopped {
        /// Session identifier.
        id: SessionId,
        /// Export outcome.
        summary: ExportSummary,
    },
    /// A session was cancelled; its row log stays on disk.
    Cancelled {
        /// Session identifier.
        id: SessionId,
    },
    /// A notice for the user.
    Notice(Notification),
}

/// Callback invoked for every recorder event.
pub type Listener = Box<dyn Fn(&RecorderEvent) + Send + Sync>;

/// Fan-out of recorder events to registered listeners.
#[derive(Default)]
pub struct Listeners {
    listeners: Vec<Listener>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

impl Listeners {
    /// Register a listener.
    pub fn push(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Check if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver an event to every listener in registration order.
    pub fn emit(&self, event: &RecorderEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    /// Deliver a notice.
    pub fn notify(&self, notification: Notification) {
        self.emit(&RecorderEvent::Notice(notification));
    }
}
