use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::error;

/// A failure notification for operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Pipeline stage that failed, e.g. `push` or `verify`.
    pub context: String,
    /// Username of the uploading principal.
    pub user: String,
    pub message: String,
    /// Short error code; `N/A` when there is none.
    pub code: String,
    /// `<user>-<file name>` of the affected part.
    pub origin: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        context: impl Into<String>,
        user: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            user: user.into(),
            message: message.into(),
            code: code.into(),
            origin: origin.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Fire-and-forget failure notification.
///
/// `notify` is synchronous and infallible. Implementations must hand the
/// alert off without blocking; a lost alert never changes an upload's
/// outcome.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Writes alerts to the `tracing` error log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, alert: &Alert) {
        error!(
            context = %alert.context,
            user = %alert.user,
            code = %alert.code,
            origin = %alert.origin,
            "{}",
            alert.message
        );
    }
}

/// Forwards alerts to a receiver that delivers them elsewhere.
#[derive(Clone, Debug)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn notify(&self, alert: &Alert) {
        // Receiver gone: nobody is delivering, drop it.
        let _ = self.tx.send(alert.clone());
    }
}

/// Keeps every alert in memory.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().expect("alert lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().expect("alert lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for MemoryAlertSink {
    fn notify(&self, alert: &Alert) {
        self.alerts
            .lock()
            .expect("alert lock poisoned")
            .push(alert.clone());
    }
}
