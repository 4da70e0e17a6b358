//! Protocol adapters, one per TV family

pub mod android;
pub mod lg;
pub mod samsung;

pub use android::AndroidAdapter;
pub use lg::{LgAdapter, LgOptions};
pub use samsung::{SamsungAdapter, SamsungOptions};

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::store::ConfigStore;
use crate::types::{ConnectionConfig, ConnectionState, EventHub, TvEvent, TvState, TvStatePatch};

/// State every adapter owns: observer outlet, TV snapshot, lifecycle
pub(crate) struct AdapterShared {
    pub events: Arc<EventHub>,
    state: Mutex<TvState>,
    connection: Mutex<ConnectionState>,
    store: Option<Arc<dyn ConfigStore>>,
}

impl AdapterShared {
    pub fn new(label: &'static str, store: Option<Arc<dyn ConfigStore>>) -> Self {
        Self {
            events: Arc::new(EventHub::new(label)),
            state: Mutex::new(TvState::default()),
            connection: Mutex::new(ConnectionState::Disconnected),
            store,
        }
    }

    pub async fn connection(&self) -> ConnectionState {
        *self.connection.lock().await
    }

    /// Set the lifecycle state, returning the previous one
    pub async fn set_connection(&self, next: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *self.connection.lock().await, next)
    }

    /// Mark connected and tell the observer
    pub async fn mark_connected(&self) {
        self.set_connection(ConnectionState::Connected).await;
        self.events.emit(TvEvent::Connected).await;
    }

    /// Mark disconnected; the observer hears about it once
    pub async fn mark_disconnected(&self) {
        let previous = self.set_connection(ConnectionState::Disconnected).await;
        if previous != ConnectionState::Disconnected {
            self.events.emit(TvEvent::Disconnected).await;
        }
    }

    /// Merge a partial update and push what actually changed to the observer
    pub async fn update(&self, patch: TvStatePatch) {
        let changes = {
            let mut state = self.state.lock().await;
            let changes = patch.changes_from(&state);
            state.apply(&changes);
            changes
        };
        if !changes.is_empty() {
            self.events.emit(TvEvent::StateChanged(changes)).await;
        }
    }

    pub async fn snapshot(&self) -> TvState {
        self.state.lock().await.clone()
    }

    /// Write an issued token or key through to the store
    ///
    /// Best-effort: a failing store must not fail the connection.
    pub async fn persist(&self, config: &ConnectionConfig) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(config) {
            warn!("Failed to persist {} config: {}", config.kind(), e);
            self.events
                .log(format!("Could not save pairing credentials: {}", e))
                .await;
        }
    }
}

/// Abort a task slot if it holds one
pub(crate) fn abort_task(slot: &mut Option<JoinHandle<()>>) {
    if let Some(task) = slot.take() {
        task.abort();
    }
}
