//! Events an adapter reports to its observer

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use super::TvStatePatch;

/// Event pushed from an adapter to the host UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TvEvent {
    /// Partial state update, already merged into the adapter's snapshot
    StateChanged(TvStatePatch),

    /// Adapter is ready for commands
    Connected,

    /// Connection was lost or closed
    Disconnected,

    /// Protocol-level failure worth showing to the user
    Error(String),

    /// Diagnostic line for the live connection log
    Log(String),
}

impl TvEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::Log(message.into())
    }
}

/// Single-observer event outlet
///
/// The most recent [`EventHub::subscribe`] call wins; earlier receivers stop
/// getting events. Emitting with no observer is a no-op.
#[derive(Debug, Default)]
pub struct EventHub {
    label: &'static str,
    observer: Mutex<Option<mpsc::UnboundedSender<TvEvent>>>,
}

impl EventHub {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            observer: Mutex::new(None),
        }
    }

    /// Replace the observer and return its receiving end
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<TvEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.observer.lock().await = Some(tx);
        rx
    }

    pub async fn emit(&self, event: TvEvent) {
        let observer = self.observer.lock().await;
        if let Some(tx) = observer.as_ref() {
            // Receiver dropped: the UI went away, nothing to do
            let _ = tx.send(event);
        }
    }

    /// Emit a diagnostic log line, mirrored to tracing
    pub async fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(adapter = self.label, "{}", message);
        self.emit(TvEvent::Log(format!("[{}] {}", self.label, message)))
            .await;
    }

    /// Emit a user-facing error, mirrored to tracing
    pub async fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(adapter = self.label, "{}", message);
        self.emit(TvEvent::Error(message)).await;
    }
}
