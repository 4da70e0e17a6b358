//! Fakes shared by the adapter integration tests
#![allow(dead_code)]

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tvlink_core::adapters::lg::ssap;
use tvlink_core::transport::mock::{MockConnector, RemoteEnd};
use tvlink_core::transport::{ReconnectPolicy, TransportOptions};
use tvlink_core::{AdapterContext, TvEvent, TvStatePatch};

pub const POINTER_PATH: &str = "ws://10.0.0.7:3000/resources/pointer";

pub fn mock_ctx(connector: Arc<MockConnector>) -> AdapterContext {
    AdapterContext::new()
        .expect("adapter context")
        .with_connector(connector)
        .with_app_name("Integration Remote")
}

pub fn no_reconnect() -> TransportOptions {
    TransportOptions {
        reconnect: ReconnectPolicy::disabled(),
        ..Default::default()
    }
}

/// Wait for the first event matching `pred`, skipping the rest
pub async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<TvEvent>, mut pred: F) -> TvEvent
where
    F: FnMut(&TvEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("timed out waiting for event")
}

pub fn is_state(event: &TvEvent, check: impl Fn(&TvStatePatch) -> bool) -> bool {
    matches!(event, TvEvent::StateChanged(patch) if check(patch))
}

/// Behaviour of the scripted LG TV
#[derive(Clone, Default)]
pub struct FakeLg {
    /// Key put in the `registered` reply
    pub issue_key: Option<String>,
    /// Show the pairing prompt before registering
    pub prompt: bool,
    /// Refuse to hand out a pointer socket
    pub no_pointer: bool,
    /// Requests to these URIs are never answered
    pub silent_uris: Vec<&'static str>,
    /// Foreground apps reported in order on the app subscription;
    /// `netflix` alone when empty
    pub foreground: Vec<&'static str>,
}

impl FakeLg {
    pub fn issuing(key: &str) -> Self {
        Self {
            issue_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    /// Answer every frame on `remote`; each client frame is forwarded to the
    /// returned channel after it was answered
    pub fn serve(self, mut remote: RemoteEnd) -> mpsc::UnboundedReceiver<Value> {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(frame) = remote.recv_json().await {
                if let Some(reply) = self.reply_to(&remote, &frame) {
                    remote.send_json(&reply);
                }
                let _ = seen_tx.send(frame);
            }
        });
        seen_rx
    }

    fn reply_to(&self, remote: &RemoteEnd, frame: &Value) -> Option<Value> {
        let id = frame["id"].clone();
        let uri = frame["uri"].as_str().unwrap_or_default();
        if self.silent_uris.iter().any(|silent| *silent == uri) {
            return None;
        }

        let reply = match frame["type"].as_str() {
            Some("register") => {
                if self.prompt {
                    remote.send_json(&json!({
                        "id": id, "type": "response",
                        "payload": { "pairingType": "PROMPT", "returnValue": true }
                    }));
                }
                let mut payload = json!({});
                if let Some(key) = &self.issue_key {
                    payload["client-key"] = json!(key);
                }
                json!({ "id": id, "type": "registered", "payload": payload })
            }
            Some("subscribe") if uri == ssap::URI_FOREGROUND_APP && !self.foreground.is_empty() => {
                let (last, earlier) = self.foreground.split_last()?;
                for app in earlier {
                    remote.send_json(&json!({
                        "id": id, "type": "response",
                        "payload": { "returnValue": true, "appId": app }
                    }));
                }
                json!({ "id": id, "type": "response", "payload": { "returnValue": true, "appId": last } })
            }
            Some("subscribe") => {
                let payload = match uri {
                    ssap::URI_GET_VOLUME => json!({
                        "returnValue": true,
                        "volumeStatus": { "volume": 12, "muteStatus": false }
                    }),
                    ssap::URI_FOREGROUND_APP => json!({ "returnValue": true, "appId": "netflix" }),
                    ssap::URI_CURRENT_CHANNEL => json!({ "returnValue": true, "channelName": "BBC One" }),
                    _ => json!({ "returnValue": true }),
                };
                json!({ "id": id, "type": "response", "payload": payload })
            }
            _ if uri == ssap::URI_POINTER_SOCKET => {
                let payload = if self.no_pointer {
                    json!({ "returnValue": false, "errorText": "no pointer service" })
                } else {
                    json!({ "returnValue": true, "socketPath": POINTER_PATH })
                };
                json!({ "id": id, "type": "response", "payload": payload })
            }
            _ => json!({ "id": id, "type": "response", "payload": { "returnValue": true } }),
        };
        Some(reply)
    }
}

/// Fake LG proxy backend state
#[derive(Default)]
pub struct Backend {
    pub actions: Vec<Value>,
    pub registered: bool,
    pub polls: usize,
}

pub type SharedBackend = Arc<Mutex<Backend>>;

async fn backend_post(State(backend): State<SharedBackend>, Json(body): Json<Value>) -> Json<Value> {
    let reply = match body["action"].as_str() {
        Some("connect") => json!({ "success": true, "clientKey": "proxy-key" }),
        Some("repaire") => json!({ "success": true, "clientKey": "fresh-key" }),
        Some("apps") => json!({ "apps": [{ "id": "netflix", "title": "Netflix" }] }),
        Some("inputs") => json!({ "devices": [{ "id": "HDMI_1", "label": "Console" }] }),
        Some("text") if body["text"] == "fail" => json!({ "error": "keyboard not open" }),
        _ => json!({ "success": true }),
    };
    let mut backend = backend.lock().expect("backend lock");
    if body["action"] == "connect" || body["action"] == "repaire" {
        backend.registered = true;
    }
    backend.actions.push(body);
    Json(reply)
}

async fn backend_status(State(backend): State<SharedBackend>) -> Json<Value> {
    let mut backend = backend.lock().expect("backend lock");
    backend.polls += 1;
    Json(json!({
        "connected": true,
        "registered": backend.registered,
        "state": { "power": true, "volume": 20, "app": "com.webos.app.livetv" },
        "inputSocketConnected": true,
        "dpadReady": true,
        "haFallback": true
    }))
}

/// Start the fake backend; returns its base URL
pub async fn spawn_backend() -> (String, SharedBackend) {
    let backend: SharedBackend = Arc::new(Mutex::new(Backend::default()));
    let app = Router::new()
        .route("/api/lg", get(backend_status).post(backend_post))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend");
    let addr = listener.local_addr().expect("backend addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve backend");
    });
    (format!("http://{}/api/lg", addr), backend)
}
