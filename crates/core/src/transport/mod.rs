//! Transport primitive: one message-oriented connection per instance
//!
//! A [`Transport`] opens a link through a [`Connector`], pumps inbound frames
//! to the owning adapter as [`TransportEvent`]s and applies the reconnect
//! policy when the peer closes the link without being asked to.
//!
//! The connector is the only I/O seam: [`websocket::WsConnector`] speaks real
//! WebSockets, [`mock::MockConnector`] hands both ends to a test.

pub mod mock;
pub mod reconnect;
pub mod websocket;

pub use reconnect::{ReconnectPolicy, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};
pub use websocket::WsConnector;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{RemoteError, Result};
use crate::types::EventHub;

/// How long an open attempt may take before it is abandoned
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest inbound frame echoed verbatim into the diagnostic log
const LOG_PREVIEW_CHARS: usize = 240;

/// Both directions of an established link
///
/// Dropping `outbound` asks the connector to close the link; `inbound`
/// yields `None` once the peer has gone away.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens links to a URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Link>;
}

/// Transport tunables
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// What the transport reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Parsed inbound frame
    Message(Value),
    /// The link closed without a `close()` call
    Closed,
    /// A reconnect attempt is scheduled
    Reconnecting { attempt: u32 },
    /// A reconnect attempt succeeded
    Reopened,
    /// The reconnect budget is spent
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Open,
    Reconnecting,
}

struct LinkSlot {
    state: LinkState,
    /// Target of the next reconnect attempt
    url: String,
    outbound: Option<mpsc::UnboundedSender<String>>,
    supervisor: Option<JoinHandle<()>>,
    auto_reconnect: bool,
    reconnect_attempts: u32,
}

impl LinkSlot {
    fn closed() -> Self {
        Self {
            state: LinkState::Closed,
            url: String::new(),
            outbound: None,
            supervisor: None,
            auto_reconnect: false,
            reconnect_attempts: 0,
        }
    }
}

/// One bidirectional message connection with bounded auto-reconnect
pub struct Transport {
    label: &'static str,
    connector: Arc<dyn Connector>,
    options: TransportOptions,
    events: Arc<EventHub>,
    slot: Arc<Mutex<LinkSlot>>,
}

impl Transport {
    pub fn new(
        label: &'static str,
        connector: Arc<dyn Connector>,
        options: TransportOptions,
        events: Arc<EventHub>,
    ) -> Self {
        Self {
            label,
            connector,
            options,
            events,
            slot: Arc::new(Mutex::new(LinkSlot::closed())),
        }
    }

    /// Open a link to `url`, replacing any link this transport already holds
    ///
    /// Inbound frames and lifecycle changes are delivered to `sink`. With
    /// `auto_reconnect` off, an unsolicited close only produces
    /// [`TransportEvent::Closed`].
    pub async fn open(
        &self,
        url: &str,
        auto_reconnect: bool,
        sink: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<()> {
        self.close().await;
        self.events
            .log(format!("Connecting to {}", redact_url(url)))
            .await;

        let link = match establish(self.connector.as_ref(), url, self.options.connect_timeout).await {
            Ok(link) => link,
            Err(e) => {
                self.events
                    .log(format!("Connection to {} failed: {}", redact_url(url), e))
                    .await;
                return Err(e);
            }
        };

        let supervisor = Supervisor {
            label: self.label,
            connector: Arc::clone(&self.connector),
            options: self.options.clone(),
            events: Arc::clone(&self.events),
            slot: Arc::clone(&self.slot),
            sink,
        };

        {
            let mut slot = self.slot.lock().await;
            slot.outbound = Some(link.outbound);
            slot.state = LinkState::Open;
            slot.url = url.to_string();
            slot.auto_reconnect = auto_reconnect;
            slot.reconnect_attempts = 0;
            slot.supervisor = Some(tokio::spawn(supervisor.run(link.inbound)));
        }

        self.events
            .log(format!("Connected to {}", redact_url(url)))
            .await;
        Ok(())
    }

    /// Serialize and send a JSON frame
    pub async fn send(&self, payload: &Value) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        self.send_raw(text).await
    }

    /// Send a pre-encoded text frame
    ///
    /// Fails immediately when the link is not open; nothing is queued.
    pub async fn send_raw(&self, text: String) -> Result<()> {
        let slot = self.slot.lock().await;
        let outbound = match (&slot.state, &slot.outbound) {
            (LinkState::Open, Some(outbound)) => outbound,
            _ => return Err(RemoteError::NotConnected),
        };
        debug!(transport = self.label, "-> {}", text);
        outbound.send(text).map_err(|_| RemoteError::Disconnected)
    }

    /// Close the link and cancel any pending reconnect
    ///
    /// Silent: the owner already knows it asked for the close.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        slot.auto_reconnect = false;
        if let Some(supervisor) = slot.supervisor.take() {
            supervisor.abort();
        }
        if slot.outbound.take().is_some() {
            debug!(transport = self.label, "Link closed by owner");
        }
        slot.state = LinkState::Closed;
        slot.reconnect_attempts = 0;
    }

    /// Point later reconnect attempts at `url`
    ///
    /// For peers that hand out credentials mid-session which belong in the
    /// URL of every following connection.
    pub async fn set_reconnect_url(&self, url: impl Into<String>) {
        self.slot.lock().await.url = url.into();
    }

    /// Enable or suppress reconnection for the current link
    pub async fn set_auto_reconnect(&self, enabled: bool) {
        self.slot.lock().await.auto_reconnect = enabled;
    }

    pub async fn state(&self) -> LinkState {
        self.slot.lock().await.state
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == LinkState::Open
    }
}

/// `url` with the value of any `token` query parameter masked, for logging
pub fn redact_url(url: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some(parts) => parts,
        None => return url.to_string(),
    };
    let query: Vec<&str> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("token", _)) => "token=***",
            _ => pair,
        })
        .collect();
    format!("{}?{}", base, query.join("&"))
}

/// Run one open attempt under the connect timeout
async fn establish(connector: &dyn Connector, url: &str, timeout: Duration) -> Result<Link> {
    match tokio::time::timeout(timeout, connector.open(url)).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::ConnectTimeout(timeout.as_millis() as u64)),
    }
}

/// Background task owning the inbound half of the link
struct Supervisor {
    label: &'static str,
    connector: Arc<dyn Connector>,
    options: TransportOptions,
    events: Arc<EventHub>,
    slot: Arc<Mutex<LinkSlot>>,
    sink: mpsc::UnboundedSender<TransportEvent>,
}

impl Supervisor {
    async fn run(self, mut inbound: mpsc::UnboundedReceiver<String>) {
        loop {
            while let Some(text) = inbound.recv().await {
                self.dispatch(text).await;
            }

            let url = {
                let mut slot = self.slot.lock().await;
                slot.outbound = None;
                slot.state = LinkState::Closed;
                redact_url(&slot.url)
            };
            self.events
                .log(format!("Connection to {} closed", url))
                .await;
            let _ = self.sink.send(TransportEvent::Closed);

            match self.reconnect().await {
                Some(next) => inbound = next,
                None => return,
            }
        }
    }

    async fn dispatch(&self, text: String) {
        let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
        self.events.log(format!("<- {}", preview)).await;

        match serde_json::from_str::<Value>(&text) {
            Ok(frame) => {
                let _ = self.sink.send(TransportEvent::Message(frame));
            }
            Err(e) => {
                warn!(transport = self.label, "Unparseable frame: {}", e);
                self.events
                    .log(format!("Ignoring unparseable frame: {}", e))
                    .await;
            }
        }
    }

    /// Retry until a link opens or the budget runs out
    async fn reconnect(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        loop {
            let (attempt, delay, url) = {
                let mut slot = self.slot.lock().await;
                if !slot.auto_reconnect {
                    return None;
                }
                match self.options.reconnect.next_delay(slot.reconnect_attempts) {
                    Some(delay) => {
                        slot.reconnect_attempts += 1;
                        slot.state = LinkState::Reconnecting;
                        (slot.reconnect_attempts, delay, slot.url.clone())
                    }
                    None => {
                        slot.state = LinkState::Closed;
                        let url = redact_url(&slot.url);
                        drop(slot);
                        self.events
                            .log(format!(
                                "Giving up on {} after {} reconnect attempts",
                                url, self.options.reconnect.max_attempts
                            ))
                            .await;
                        let _ = self.sink.send(TransportEvent::GaveUp);
                        return None;
                    }
                }
            };

            self.events
                .log(format!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    self.options.reconnect.max_attempts
                ))
                .await;
            let _ = self.sink.send(TransportEvent::Reconnecting { attempt });

            tokio::time::sleep(delay).await;

            match establish(self.connector.as_ref(), &url, self.options.connect_timeout).await {
                Ok(link) => {
                    {
                        let mut slot = self.slot.lock().await;
                        slot.outbound = Some(link.outbound);
                        slot.state = LinkState::Open;
                        slot.reconnect_attempts = 0;
                    }
                    self.events
                        .log(format!("Reconnected to {}", redact_url(&url)))
                        .await;
                    let _ = self.sink.send(TransportEvent::Reopened);
                    return Some(link.inbound);
                }
                Err(e) => {
                    self.events
                        .log(format!("Reconnect attempt {} failed: {}", attempt, e))
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;
    use crate::types::TvEvent;
    use serde_json::json;

    fn transport(connector: Arc<MockConnector>, policy: ReconnectPolicy) -> Transport {
        Transport::new(
            "test",
            connector,
            TransportOptions {
                connect_timeout: Duration::from_secs(5),
                reconnect: policy,
            },
            Arc::new(EventHub::new("test")),
        )
    }

    #[tokio::test]
    async fn test_send_while_closed_fails_immediately() {
        let transport = transport(MockConnector::new(), ReconnectPolicy::disabled());
        let result = transport.send(&json!({ "hello": true })).await;
        assert!(matches!(result, Err(RemoteError::NotConnected)));
    }

    #[tokio::test]
    async fn test_open_send_and_receive() {
        let connector = MockConnector::new();
        let transport = transport(connector.clone(), ReconnectPolicy::disabled());
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.open("ws://tv:1", false, tx).await.unwrap();
        let mut remote = connector.next_remote().await;

        transport.send(&json!({ "ping": 1 })).await.unwrap();
        assert_eq!(remote.recv_json().await, Some(json!({ "ping": 1 })));

        remote.send_json(&json!({ "pong": 1 }));
        assert_eq!(rx.recv().await, Some(TransportEvent::Message(json!({ "pong": 1 }))));
    }

    #[tokio::test]
    async fn test_unparseable_frame_is_dropped() {
        let connector = MockConnector::new();
        let transport = transport(connector.clone(), ReconnectPolicy::disabled());
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.open("ws://tv:1", false, tx).await.unwrap();
        let remote = connector.next_remote().await;
        remote.send_text("{not json");
        remote.send_json(&json!({ "ok": true }));

        assert_eq!(rx.recv().await, Some(TransportEvent::Message(json!({ "ok": true }))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let connector = MockConnector::new();
        connector.hang("ws://");
        let transport = transport(connector, ReconnectPolicy::disabled());
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = transport.open("ws://tv:1", false, tx).await;
        assert!(matches!(result, Err(RemoteError::ConnectTimeout(5000))));
        assert_eq!(transport.state().await, LinkState::Closed);
    }

    #[tokio::test]
    async fn test_owner_close_is_silent() {
        let connector = MockConnector::new();
        let transport = transport(connector.clone(), ReconnectPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.open("ws://tv:1", true, tx).await.unwrap();
        let mut remote = connector.next_remote().await;
        transport.close().await;

        // Supervisor is gone, so the sink closes without a Closed event
        assert_eq!(rx.recv().await, None);
        assert_eq!(remote.recv_text().await, None);
        assert_eq!(connector.opened().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsolicited_close_without_reconnect() {
        let connector = MockConnector::new();
        let transport = transport(connector.clone(), ReconnectPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.open("ws://tv:1", false, tx).await.unwrap();
        drop(connector.next_remote().await);

        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
        assert_eq!(rx.recv().await, None);
        assert_eq!(connector.opened().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_are_capped() {
        let connector = MockConnector::new();
        let transport = transport(
            connector.clone(),
            ReconnectPolicy::new(Duration::from_secs(3), MAX_RECONNECT_ATTEMPTS),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.open("ws://tv:1", true, tx).await.unwrap();
        connector.refuse("ws://");
        drop(connector.next_remote().await);

        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            assert_eq!(rx.recv().await, Some(TransportEvent::Reconnecting { attempt }));
        }
        assert_eq!(rx.recv().await, Some(TransportEvent::GaveUp));
        assert_eq!(rx.recv().await, None);

        // Initial open plus exactly the budgeted attempts
        assert_eq!(connector.opened().len(), 1 + MAX_RECONNECT_ATTEMPTS as usize);
        assert_eq!(transport.state().await, LinkState::Closed);
    }

    #[test]
    fn test_redact_url_masks_token_only() {
        assert_eq!(
            redact_url("ws://tv:8001/api?name=QQ==&token=12345"),
            "ws://tv:8001/api?name=QQ==&token=***"
        );
        assert_eq!(redact_url("ws://tv:3000/"), "ws://tv:3000/");
        assert_eq!(redact_url("ws://tv/?tokenish=1"), "ws://tv/?tokenish=1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_follows_updated_url() {
        let connector = MockConnector::new();
        let events = Arc::new(EventHub::new("test"));
        let mut log = events.subscribe().await;
        let transport = Transport::new(
            "test",
            connector.clone(),
            TransportOptions {
                connect_timeout: Duration::from_secs(5),
                reconnect: ReconnectPolicy::new(Duration::from_millis(20), 1),
            },
            Arc::clone(&events),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.open("ws://tv:1/?name=x", true, tx).await.unwrap();
        transport.set_reconnect_url("ws://tv:1/?name=x&token=secret").await;
        drop(connector.next_remote().await);

        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
        assert_eq!(rx.recv().await, Some(TransportEvent::Reconnecting { attempt: 1 }));
        assert_eq!(rx.recv().await, Some(TransportEvent::Reopened));
        assert_eq!(connector.next_remote().await.url, "ws://tv:1/?name=x&token=secret");

        // The credential never reaches the observer log
        transport.close().await;
        let mut saw_reconnect = false;
        while let Ok(event) = log.try_recv() {
            if let TvEvent::Log(line) = event {
                assert!(!line.contains("secret"), "leaked in {:?}", line);
                saw_reconnect |= line.contains("Reconnected to ws://tv:1/?name=x&token=***");
            }
        }
        assert!(saw_reconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_reconnect_resets_budget() {
        let connector = MockConnector::new();
        let transport = transport(connector.clone(), ReconnectPolicy::new(Duration::from_secs(1), 1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.open("ws://tv:1", true, tx).await.unwrap();
        drop(connector.next_remote().await);
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
        assert_eq!(rx.recv().await, Some(TransportEvent::Reconnecting { attempt: 1 }));
        assert_eq!(rx.recv().await, Some(TransportEvent::Reopened));
        assert!(transport.is_open().await);

        // Budget is back to one attempt after the successful reopen
        drop(connector.next_remote().await);
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
        assert_eq!(rx.recv().await, Some(TransportEvent::Reconnecting { attempt: 1 }));
        assert_eq!(rx.recv().await, Some(TransportEvent::Reopened));
    }
}
