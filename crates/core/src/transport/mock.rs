//! In-memory connector for tests
//!
//! Records every URL it is asked to open and hands the TV side of each
//! accepted link to the test through [`MockConnector::next_remote`].
//! Behavior is chosen per URL prefix; later rules win.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::{Connector, Link};
use crate::error::{RemoteError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Accept,
    Refuse,
    /// Never completes; exercises the connect timeout
    Hang,
}

/// The TV end of a mock link
pub struct RemoteEnd {
    pub url: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl RemoteEnd {
    /// Next raw frame sent by the client, `None` once the client closed
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame sent by the client, parsed as JSON
    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv_text().await?;
        serde_json::from_str(&text).ok()
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(text.into());
    }

    pub fn send_json(&self, frame: &Value) {
        self.send_text(frame.to_string());
    }

    /// Frames the client sent that have not been read yet
    pub fn drain_json(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            if let Ok(frame) = serde_json::from_str(&text) {
                frames.push(frame);
            }
        }
        frames
    }
}

struct MockState {
    opened: Vec<String>,
    rules: Vec<(String, MockBehavior)>,
}

pub struct MockConnector {
    state: Mutex<MockState>,
    remotes_tx: mpsc::UnboundedSender<RemoteEnd>,
    remotes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RemoteEnd>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            state: Mutex::new(MockState {
                opened: Vec::new(),
                rules: Vec::new(),
            }),
            remotes_tx,
            remotes_rx: tokio::sync::Mutex::new(remotes_rx),
        })
    }

    pub fn set_behavior(&self, url_prefix: &str, behavior: MockBehavior) {
        self.lock().rules.push((url_prefix.to_string(), behavior));
    }

    pub fn accept(&self, url_prefix: &str) {
        self.set_behavior(url_prefix, MockBehavior::Accept);
    }

    pub fn refuse(&self, url_prefix: &str) {
        self.set_behavior(url_prefix, MockBehavior::Refuse);
    }

    pub fn hang(&self, url_prefix: &str) {
        self.set_behavior(url_prefix, MockBehavior::Hang);
    }

    /// Every URL passed to `open`, in call order
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Wait for the next accepted link
    pub async fn next_remote(&self) -> RemoteEnd {
        let mut remotes = self.remotes_rx.lock().await;
        match remotes.recv().await {
            Some(remote) => remote,
            // remotes_tx lives as long as self
            None => unreachable!("mock connector dropped its own sender"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &str) -> Result<Link> {
        let behavior = {
            let mut state = self.lock();
            state.opened.push(url.to_string());
            state
                .rules
                .iter()
                .rev()
                .find(|(prefix, _)| url.starts_with(prefix.as_str()))
                .map(|(_, behavior)| *behavior)
                .unwrap_or(MockBehavior::Accept)
        };

        match behavior {
            MockBehavior::Refuse => Err(RemoteError::Transport(format!(
                "connection to {} refused",
                super::redact_url(url)
            ))),
            MockBehavior::Hang => std::future::pending().await,
            MockBehavior::Accept => {
                let (client_tx, from_client) = mpsc::unbounded_channel();
                let (to_client, client_rx) = mpsc::unbounded_channel();
                let _ = self.remotes_tx.send(RemoteEnd {
                    url: url.to_string(),
                    from_client,
                    to_client,
                });
                Ok(Link {
                    outbound: client_tx,
                    inbound: client_rx,
                })
            }
        }
    }
}
