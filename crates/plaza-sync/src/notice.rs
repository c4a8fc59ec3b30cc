use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Error,
}

/// A short-lived, user-visible message. The presentation layer shows it for
/// `dismiss_after` and then drops it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
    pub dismiss_after: Duration,
}

/// Sending half of the notice stream. Cloned into every reconciler.
#[derive(Debug, Clone)]
pub struct NoticeSink {
    tx: mpsc::UnboundedSender<Notice>,
    dismiss_after: Duration,
}

impl NoticeSink {
    pub fn channel(dismiss_after: Duration) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, dismiss_after }, rx)
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(message.into(), Severity::Success);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(message.into(), Severity::Info);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("notice: {}", message);
        self.push(message, Severity::Error);
    }

    fn push(&self, message: String, severity: Severity) {
        let notice = Notice {
            message,
            severity,
            dismiss_after: self.dismiss_after,
        };
        // Nobody listening is fine; the UI may not be mounted yet.
        if self.tx.send(notice).is_err() {
            debug!("notice dropped, no receiver");
        }
    }
}
