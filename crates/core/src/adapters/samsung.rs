//! Samsung Tizen remote-control channel
//!
//! One WebSocket to `/api/v2/channels/samsung.remote.control`. Keys are
//! single-shot `Click` frames; the installed-app list arrives as an
//! unsolicited `ed.installedApp.get` event some time after it is asked for.
//! The TV issues a token on the first accepted pairing and skips the
//! on-screen prompt when it is presented again.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{abort_task, AdapterShared};
use crate::controller::{ensure_connected, TvController};
use crate::error::{RemoteError, Result};
use crate::factory::AdapterContext;
use crate::transport::{Transport, TransportEvent, TransportOptions};
use crate::types::{
    AppInfo, ConnectionConfig, ConnectionState, RemoteKey, SamsungConfig, TvEvent, TvKind,
    TvState, TvStatePatch, SAMSUNG_SECURE_PORT,
};

/// How long `get_apps` waits for the TV to push its app list
pub const APP_LIST_GRACE: Duration = Duration::from_millis(1500);

/// Tizen app id of YouTube
pub const YOUTUBE_APP_ID: &str = "111299001912";

#[derive(Debug, Clone)]
pub struct SamsungOptions {
    pub transport: TransportOptions,
    pub app_list_grace: Duration,
}

impl Default for SamsungOptions {
    fn default() -> Self {
        Self {
            transport: TransportOptions::default(),
            app_list_grace: APP_LIST_GRACE,
        }
    }
}

/// Vendor key name for a vocabulary key
pub fn samsung_key(key: RemoteKey) -> &'static str {
    match key {
        RemoteKey::Power => "KEY_POWER",
        RemoteKey::VolumeUp => "KEY_VOLUP",
        RemoteKey::VolumeDown => "KEY_VOLDOWN",
        RemoteKey::Mute => "KEY_MUTE",
        RemoteKey::ChannelUp => "KEY_CHUP",
        RemoteKey::ChannelDown => "KEY_CHDOWN",
        RemoteKey::Up => "KEY_UP",
        RemoteKey::Down => "KEY_DOWN",
        RemoteKey::Left => "KEY_LEFT",
        RemoteKey::Right => "KEY_RIGHT",
        RemoteKey::Ok => "KEY_ENTER",
        RemoteKey::Back => "KEY_RETURN",
        RemoteKey::Home => "KEY_HOME",
        RemoteKey::Menu => "KEY_MENU",
        RemoteKey::Play => "KEY_PLAY",
        RemoteKey::Pause => "KEY_PAUSE",
        RemoteKey::Stop => "KEY_STOP",
    }
}

/// Channel URL; the token is only appended once one has been issued
pub fn channel_url(config: &SamsungConfig, app_name: &str) -> String {
    let scheme = if config.port == SAMSUNG_SECURE_PORT {
        "wss"
    } else {
        "ws"
    };
    let mut url = format!(
        "{}://{}:{}/api/v2/channels/samsung.remote.control?name={}",
        scheme,
        config.ip,
        config.port,
        STANDARD.encode(app_name)
    );
    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        url.push_str("&token=");
        url.push_str(token);
    }
    url
}

fn key_frame(key: RemoteKey) -> Value {
    json!({
        "method": "ms.remote.control",
        "params": {
            "Cmd": "Click",
            "DataOfCmd": samsung_key(key),
            "Option": "false",
            "TypeOfRemote": "SendRemoteKey",
        }
    })
}

fn app_list_frame() -> Value {
    json!({
        "method": "ms.channel.emit",
        "params": { "event": "ed.installedApp.get", "to": "host" }
    })
}

fn launch_frame(app_id: &str, params: Option<&Value>) -> Value {
    let action_type = params
        .and_then(|p| p.get("actionType"))
        .and_then(Value::as_str)
        .unwrap_or("DEEP_LINK");
    let mut data = json!({ "appId": app_id, "action_type": action_type });
    if let Some(meta) = params.and_then(|p| p.get("metaTag")).and_then(Value::as_str) {
        data["metaTag"] = json!(meta);
    }
    json!({
        "method": "ms.channel.emit",
        "params": { "event": "ed.apps.launch", "to": "host", "data": data }
    })
}

fn text_frame(text: &str) -> Value {
    json!({
        "method": "ms.remote.control",
        "params": {
            "Cmd": STANDARD.encode(text),
            "DataOfCmd": "base64",
            "TypeOfRemote": "SendInputString",
        }
    })
}

/// Token issued by the TV, wherever this firmware put it
fn issued_token(frame: &Value) -> Option<String> {
    let token = frame
        .pointer("/data/token")
        .or_else(|| frame.get("token"))?;
    match token {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

struct SamsungInner {
    shared: AdapterShared,
    config: Mutex<SamsungConfig>,
    app_name: String,
    transport: Transport,
    apps: Mutex<Vec<AppInfo>>,
    options: SamsungOptions,
}

impl SamsungInner {
    /// Channel is up: report it and ask for the app list
    async fn on_opened(&self) {
        self.shared.mark_connected().await;
        self.shared
            .update(TvStatePatch {
                power: Some(true),
                ..Default::default()
            })
            .await;
        if let Err(e) = self.transport.send(&app_list_frame()).await {
            debug!("App list request failed: {}", e);
        }
    }

    async fn drive(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::Message(frame) => self.handle_frame(frame).await,
                TransportEvent::Closed => self.shared.mark_disconnected().await,
                TransportEvent::Reconnecting { .. } => {
                    self.shared
                        .set_connection(ConnectionState::Reconnecting)
                        .await;
                }
                TransportEvent::Reopened => self.on_opened().await,
                TransportEvent::GaveUp => {
                    self.shared.set_connection(ConnectionState::Disconnected).await;
                }
            }
        }
    }

    async fn handle_frame(&self, frame: Value) {
        if let Some(token) = issued_token(&frame) {
            self.adopt_token(token).await;
        }

        match frame.get("event").and_then(Value::as_str) {
            Some("ms.channel.connect") => {
                self.shared.events.log("Remote channel accepted").await;
            }
            Some("ms.channel.unauthorized") => {
                self.shared
                    .events
                    .error("TV refused the remote; allow this device on the TV and retry")
                    .await;
            }
            Some("ed.installedApp.get") => {
                let apps: Vec<AppInfo> = frame
                    .pointer("/data/data")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().filter_map(AppInfo::from_json).collect())
                    .unwrap_or_default();
                self.shared
                    .events
                    .log(format!("Received {} installed apps", apps.len()))
                    .await;
                *self.apps.lock().await = apps;
            }
            Some("ms.error") => {
                let message = frame
                    .pointer("/data/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                self.shared.events.error(format!("TV error: {}", message)).await;
            }
            _ => {}
        }
    }

    async fn adopt_token(&self, token: String) {
        let updated = {
            let mut config = self.config.lock().await;
            if config.token.as_deref() == Some(token.as_str()) {
                return;
            }
            config.token = Some(token);
            config.clone()
        };
        // Automatic reconnects must present the token too
        self.transport
            .set_reconnect_url(channel_url(&updated, &self.app_name))
            .await;
        self.shared.events.log("Received pairing token").await;
        self.shared.persist(&ConnectionConfig::Samsung(updated)).await;
    }

    async fn send(&self, frame: &Value) -> Result<()> {
        ensure_connected(self.shared.connection().await)?;
        self.transport.send(frame).await
    }
}

/// Samsung Tizen adapter
pub struct SamsungAdapter {
    inner: Arc<SamsungInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SamsungAdapter {
    pub fn new(config: SamsungConfig, ctx: &AdapterContext) -> Self {
        Self::with_options(config, ctx, SamsungOptions::default())
    }

    pub fn with_options(config: SamsungConfig, ctx: &AdapterContext, options: SamsungOptions) -> Self {
        let shared = AdapterShared::new("samsung", ctx.store.clone());
        let transport = Transport::new(
            "samsung",
            Arc::clone(&ctx.connector),
            options.transport.clone(),
            Arc::clone(&shared.events),
        );
        Self {
            inner: Arc::new(SamsungInner {
                shared,
                config: Mutex::new(config),
                app_name: ctx.app_name.clone(),
                transport,
                apps: Mutex::new(Vec::new()),
                options,
            }),
            driver: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TvController for SamsungAdapter {
    fn kind(&self) -> TvKind {
        TvKind::Samsung
    }

    async fn connect(&self) -> Result<()> {
        self.disconnect().await;

        let inner = &self.inner;
        inner.shared.set_connection(ConnectionState::Connecting).await;
        let url = channel_url(&*inner.config.lock().await, &inner.app_name);

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = inner.transport.open(&url, true, tx).await {
            inner.shared.set_connection(ConnectionState::Disconnected).await;
            return Err(e);
        }

        *self.driver.lock().await = Some(tokio::spawn(Arc::clone(inner).drive(rx)));
        inner.on_opened().await;
        Ok(())
    }

    async fn disconnect(&self) {
        abort_task(&mut *self.driver.lock().await);
        self.inner.transport.close().await;
        self.inner.shared.mark_disconnected().await;
    }

    async fn connection_state(&self) -> ConnectionState {
        self.inner.shared.connection().await
    }

    async fn events(&self) -> mpsc::UnboundedReceiver<TvEvent> {
        self.inner.shared.events.subscribe().await
    }

    async fn config(&self) -> ConnectionConfig {
        ConnectionConfig::Samsung(self.inner.config.lock().await.clone())
    }

    async fn send_key(&self, key: RemoteKey) -> Result<()> {
        self.inner.send(&key_frame(key)).await
    }

    /// Best-effort: asks again, then returns whatever has been pushed so far
    async fn get_apps(&self) -> Result<Vec<AppInfo>> {
        self.inner.send(&app_list_frame()).await?;
        tokio::time::sleep(self.inner.options.app_list_grace).await;
        Ok(self.inner.apps.lock().await.clone())
    }

    async fn launch_app(&self, app_id: &str, params: Option<Value>) -> Result<()> {
        self.inner.send(&launch_frame(app_id, params.as_ref())).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.inner.send(&text_frame(text)).await
    }

    async fn open_youtube(&self, video_id: &str) -> Result<()> {
        self.launch_app(YOUTUBE_APP_ID, Some(json!({ "metaTag": video_id })))
            .await
    }

    /// Only power can be inferred, from the channel being up
    async fn get_state(&self) -> Result<Option<TvState>> {
        let connected = self.inner.shared.connection().await == ConnectionState::Connected;
        Ok(Some(TvState {
            power: connected,
            ..TvState::default()
        }))
    }

    /// Forget the token so the TV prompts again, then reconnect
    async fn repair(&self) -> Result<()> {
        let cleared = {
            let mut config = self.inner.config.lock().await;
            config.token = None;
            config.clone()
        };
        self.inner.shared.events.log("Dropped pairing token").await;
        self.inner.shared.persist(&ConnectionConfig::Samsung(cleared)).await;
        self.connect().await
    }

    async fn switch_input(&self, _input_id: &str) -> Result<()> {
        Err(RemoteError::Unsupported(
            "the Samsung remote channel has no input switching".into(),
        ))
    }
}
