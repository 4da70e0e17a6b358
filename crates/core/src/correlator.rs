//! Request/reply correlation over a transport
//!
//! Every outbound request that expects a reply is tracked under its `id`
//! with its own timeout timer. Exactly one of {matching reply, timeout,
//! disconnect} settles it: the table entry is removed under the lock before
//! the waiter is woken, and the timer is aborted on every other path.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{RemoteError, Result};
use crate::transport::Transport;

/// Default reply timeout for correlated requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

struct PendingRequest {
    reply: oneshot::Sender<Result<Value>>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct PendingTable {
    next_seq: u64,
    pending: HashMap<String, PendingRequest>,
}

/// Pending-request table keyed by correlation id
#[derive(Clone, Default)]
pub struct Correlator {
    table: Arc<Mutex<PendingTable>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id such as `req_7`
    pub async fn next_id(&self, prefix: &str) -> String {
        let mut table = self.table.lock().await;
        let seq = table.next_seq;
        table.next_seq += 1;
        format!("{}_{}", prefix, seq)
    }

    /// Start tracking `id`; the receiver settles exactly once
    ///
    /// A second registration under a live id rejects the older waiter.
    pub async fn track(&self, id: String, timeout: Duration) -> oneshot::Receiver<Result<Value>> {
        let (reply, rx) = oneshot::channel();
        let mut table = self.table.lock().await;

        // The timer cannot observe the table before this lock is released,
        // so the entry is always present when it first looks.
        let timer = {
            let table = Arc::clone(&self.table);
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let expired = table.lock().await.pending.remove(&id);
                if let Some(entry) = expired {
                    debug!("Request {} timed out", id);
                    let _ = entry.reply.send(Err(RemoteError::RequestTimeout {
                        id,
                        timeout_ms: timeout.as_millis() as u64,
                    }));
                }
            })
        };

        if let Some(previous) = table.pending.insert(id, PendingRequest { reply, timer }) {
            previous.timer.abort();
            let _ = previous.reply.send(Err(RemoteError::Disconnected));
        }
        rx
    }

    /// Settle `id` with a reply; false when nothing was waiting
    pub async fn resolve(&self, id: &str, reply: Value) -> bool {
        let entry = self.table.lock().await.pending.remove(id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.reply.send(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Settle `id` with an error; false when nothing was waiting
    pub async fn reject(&self, id: &str, err: RemoteError) -> bool {
        let entry = self.table.lock().await.pending.remove(id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.reply.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Reject every waiter with [`RemoteError::Disconnected`] and clear the table
    ///
    /// Returns the number of requests that were still pending.
    pub async fn reject_all(&self) -> usize {
        let drained: Vec<(String, PendingRequest)> =
            self.table.lock().await.pending.drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            entry.timer.abort();
            debug!("Request {} invalidated by disconnect", id);
            let _ = entry.reply.send(Err(RemoteError::Disconnected));
        }
        count
    }

    pub async fn is_pending(&self, id: &str) -> bool {
        self.table.lock().await.pending.contains_key(id)
    }

    pub async fn pending_count(&self) -> usize {
        self.table.lock().await.pending.len()
    }

    /// Send `payload` and wait for the reply carrying the same `id`
    ///
    /// An `id` is allocated and inserted when the payload has none.
    pub async fn request(
        &self,
        transport: &Transport,
        mut payload: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = match payload.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = self.next_id("req").await;
                let object = payload.as_object_mut().ok_or_else(|| {
                    RemoteError::Transport("request payload must be a JSON object".into())
                })?;
                object.insert("id".to_string(), json!(id));
                id
            }
        };

        let rx = self.track(id.clone(), timeout).await;
        if let Err(e) = transport.send(&payload).await {
            self.reject(&id, RemoteError::Disconnected).await;
            return Err(e);
        }

        rx.await.unwrap_or(Err(RemoteError::Disconnected))
    }
}
