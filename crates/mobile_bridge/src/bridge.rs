//! Event streaming from the active controller to Flutter
//!
//! The Dart isolate must never block on a receive, so a background task
//! drains the controller's observer channel into a bounded buffer and
//! `poll_tv_event` pops from it.

use flutter_rust_bridge::frb;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tvlink_core::{TvController, TvEvent};

/// Events kept for the UI; the oldest is dropped on overflow
pub const EVENT_BUFFER_CAPACITY: usize = 256;

/// Flutter-friendly view of a controller event
#[frb]
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEvent {
    /// `state`, `connected`, `disconnected`, `error` or `log`
    pub kind: String,
    /// Log/error text; empty otherwise
    pub message: String,
    /// Changed state fields as JSON; empty unless `kind == "state"`
    pub state_json: String,
}

impl From<TvEvent> for BridgeEvent {
    fn from(event: TvEvent) -> Self {
        let (kind, message, state_json) = match event {
            TvEvent::StateChanged(patch) => (
                "state",
                String::new(),
                serde_json::to_string(&patch).unwrap_or_default(),
            ),
            TvEvent::Connected => ("connected", String::new(), String::new()),
            TvEvent::Disconnected => ("disconnected", String::new(), String::new()),
            TvEvent::Error(message) => ("error", message, String::new()),
            TvEvent::Log(message) => ("log", message, String::new()),
        };
        Self {
            kind: kind.to_string(),
            message,
            state_json,
        }
    }
}

/// Bounded FIFO shared between the pump task and the poller
#[derive(Clone, Default)]
pub struct EventBuffer {
    events: Arc<Mutex<VecDeque<BridgeEvent>>>,
}

impl EventBuffer {
    pub async fn push(&self, event: BridgeEvent) {
        let mut events = self.events.lock().await;
        if events.len() >= EVENT_BUFFER_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub async fn pop(&self) -> Option<BridgeEvent> {
        self.events.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

/// The controller the app is currently talking to
pub struct TvSession {
    controller: Arc<dyn TvController>,
    pump: JoinHandle<()>,
}

impl TvSession {
    /// Take over the controller's observer channel and start pumping events
    pub async fn start(controller: Arc<dyn TvController>, buffer: EventBuffer) -> Self {
        let mut events = controller.events().await;
        let kind = controller.kind();
        let pump = tokio::spawn(async move {
            info!("Event pump started for {} TV", kind);
            while let Some(event) = events.recv().await {
                buffer.push(BridgeEvent::from(event)).await;
            }
            debug!("Event pump for {} TV finished", kind);
        });
        Self { controller, pump }
    }

    pub fn controller(&self) -> Arc<dyn TvController> {
        Arc::clone(&self.controller)
    }

    /// Disconnect and stop the pump
    pub async fn shutdown(self) {
        self.controller.disconnect().await;
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvlink_core::transport::mock::MockConnector;
    use tvlink_core::{create_controller, AdapterContext, ConnectionConfig, SamsungConfig, TvStatePatch};

    #[test]
    fn test_event_conversion() {
        let event = BridgeEvent::from(TvEvent::error("pairing refused"));
        assert_eq!(event.kind, "error");
        assert_eq!(event.message, "pairing refused");

        let event = BridgeEvent::from(TvEvent::StateChanged(TvStatePatch {
            volume: Some(7),
            ..Default::default()
        }));
        assert_eq!(event.kind, "state");
        let state: serde_json::Value = serde_json::from_str(&event.state_json).unwrap();
        assert_eq!(state["volume"], 7);
    }

    #[tokio::test]
    async fn test_buffer_drops_oldest_on_overflow() {
        let buffer = EventBuffer::default();
        for i in 0..EVENT_BUFFER_CAPACITY + 3 {
            buffer.push(BridgeEvent::from(TvEvent::log(i.to_string()))).await;
        }
        assert_eq!(buffer.len().await, EVENT_BUFFER_CAPACITY);
        assert_eq!(buffer.pop().await.unwrap().message, "3");
    }

    #[tokio::test]
    async fn test_pump_forwards_controller_events() {
        let connector = MockConnector::new();
        let ctx = AdapterContext::new().unwrap().with_connector(connector.clone());
        let controller: Arc<dyn TvController> = Arc::from(
            create_controller(
                ConnectionConfig::Samsung(SamsungConfig::new("10.0.0.5", 8001)),
                &ctx,
            )
            .unwrap(),
        );
        let buffer = EventBuffer::default();
        let session = TvSession::start(Arc::clone(&controller), buffer.clone()).await;

        controller.connect().await.unwrap();
        let _remote = connector.next_remote().await;

        let mut kinds = Vec::new();
        while !kinds.iter().any(|k| k == "connected") {
            match buffer.pop().await {
                Some(event) => kinds.push(event.kind),
                None => tokio::task::yield_now().await,
            }
        }

        session.shutdown().await;
        assert!(!controller.is_connected().await);
    }
}
