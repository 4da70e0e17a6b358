//! Android TV through a user-run REST bridge
//!
//! The bridge is a fixed local service, so connecting is a single state
//! fetch with no retries. Keys become `POST /key {keycode}`.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use super::AdapterShared;
use crate::controller::{ensure_connected, TvController};
use crate::error::{RemoteError, Result};
use crate::factory::AdapterContext;
use crate::types::{
    AndroidConfig, AppInfo, ConnectionConfig, ConnectionState, InputSource, RemoteKey, TvEvent,
    TvKind, TvState, TvStatePatch,
};

/// Android keycode name for a vocabulary key
pub fn android_keycode(key: RemoteKey) -> &'static str {
    match key {
        RemoteKey::Power => "KEYCODE_POWER",
        RemoteKey::VolumeUp => "KEYCODE_VOLUME_UP",
        RemoteKey::VolumeDown => "KEYCODE_VOLUME_DOWN",
        RemoteKey::Mute => "KEYCODE_VOLUME_MUTE",
        RemoteKey::ChannelUp => "KEYCODE_CHANNEL_UP",
        RemoteKey::ChannelDown => "KEYCODE_CHANNEL_DOWN",
        RemoteKey::Up => "KEYCODE_DPAD_UP",
        RemoteKey::Down => "KEYCODE_DPAD_DOWN",
        RemoteKey::Left => "KEYCODE_DPAD_LEFT",
        RemoteKey::Right => "KEYCODE_DPAD_RIGHT",
        RemoteKey::Ok => "KEYCODE_DPAD_CENTER",
        RemoteKey::Back => "KEYCODE_BACK",
        RemoteKey::Home => "KEYCODE_HOME",
        RemoteKey::Menu => "KEYCODE_MENU",
        RemoteKey::Play => "KEYCODE_MEDIA_PLAY",
        RemoteKey::Pause => "KEYCODE_MEDIA_PAUSE",
        RemoteKey::Stop => "KEYCODE_MEDIA_STOP",
    }
}

/// Android bridge adapter
pub struct AndroidAdapter {
    shared: AdapterShared,
    config: Mutex<AndroidConfig>,
    http: reqwest::Client,
}

impl AndroidAdapter {
    pub fn new(config: AndroidConfig, ctx: &AdapterContext) -> Self {
        Self {
            shared: AdapterShared::new("android", ctx.store.clone()),
            config: Mutex::new(config),
            http: ctx.http.clone(),
        }
    }

    async fn endpoint(&self, path: &str) -> String {
        let config = self.config.lock().await;
        format!("{}{}", config.bridge_url.trim_end_matches('/'), path)
    }

    /// One bridge call; any failure is [`RemoteError::BridgeUnreachable`]
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.endpoint(path).await;
        let mut request = self.http.request(method, &url);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::BridgeUnreachable(format!("{}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::BridgeUnreachable(format!(
                "bridge at {} returned HTTP {}",
                url, status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::BridgeUnreachable(format!("{}: {}", url, e)))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Explicit user action: fails loudly
    async fn post(&self, path: &str, body: Value) -> Result<()> {
        ensure_connected(self.shared.connection().await)?;
        self.call(Method::POST, path, Some(body)).await.map(|_| ())
    }

    async fn fetch_state(&self) -> Result<TvStatePatch> {
        let body = self.call(Method::GET, "/state", None).await?;
        Ok(serde_json::from_value(body).unwrap_or_default())
    }
}

/// List under `field`, or the body itself when it is a bare array
fn list_of<'a>(body: &'a Value, field: &str) -> &'a [Value] {
    body.get(field)
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[async_trait]
impl TvController for AndroidAdapter {
    fn kind(&self) -> TvKind {
        TvKind::Android
    }

    async fn connect(&self) -> Result<()> {
        self.disconnect().await;
        self.shared.set_connection(ConnectionState::Connecting).await;
        let url = self.endpoint("").await;
        self.shared
            .events
            .log(format!("Checking bridge at {}", url))
            .await;

        match self.fetch_state().await {
            Ok(patch) => {
                self.shared.update(patch).await;
                self.shared.mark_connected().await;
                self.shared.events.log("Bridge reachable").await;
                Ok(())
            }
            Err(e) => {
                self.shared.set_connection(ConnectionState::Disconnected).await;
                self.shared
                    .events
                    .error(format!("Android bridge unavailable: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        self.shared.mark_disconnected().await;
    }

    async fn connection_state(&self) -> ConnectionState {
        self.shared.connection().await
    }

    async fn events(&self) -> mpsc::UnboundedReceiver<TvEvent> {
        self.shared.events.subscribe().await
    }

    async fn config(&self) -> ConnectionConfig {
        ConnectionConfig::Android(self.config.lock().await.clone())
    }

    async fn send_key(&self, key: RemoteKey) -> Result<()> {
        self.post("/key", json!({ "keycode": android_keycode(key) }))
            .await
    }

    async fn get_apps(&self) -> Result<Vec<AppInfo>> {
        ensure_connected(self.shared.connection().await)?;
        match self.call(Method::GET, "/apps", None).await {
            Ok(body) => Ok(list_of(&body, "apps")
                .iter()
                .filter_map(AppInfo::from_json)
                .collect()),
            Err(e) => {
                warn!("Android app discovery failed: {}", e);
                self.shared
                    .events
                    .log(format!("App discovery failed: {}", e))
                    .await;
                Ok(Vec::new())
            }
        }
    }

    async fn launch_app(&self, app_id: &str, params: Option<Value>) -> Result<()> {
        let mut body = json!({ "packageName": app_id });
        if let Some(params) = params {
            body["params"] = params;
        }
        self.post("/launch", body).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.post("/text", json!({ "text": text })).await
    }

    async fn open_youtube(&self, video_id: &str) -> Result<()> {
        self.post("/youtube", json!({ "videoId": video_id })).await
    }

    /// Refreshed from the bridge; `None` when it cannot be reached
    async fn get_state(&self) -> Result<Option<TvState>> {
        ensure_connected(self.shared.connection().await)?;
        match self.fetch_state().await {
            Ok(patch) => {
                self.shared.update(patch).await;
                Ok(Some(self.shared.snapshot().await))
            }
            Err(e) => {
                self.shared
                    .events
                    .log(format!("State refresh failed: {}", e))
                    .await;
                Ok(None)
            }
        }
    }

    async fn get_inputs(&self) -> Result<Vec<InputSource>> {
        ensure_connected(self.shared.connection().await)?;
        match self.call(Method::GET, "/inputs", None).await {
            Ok(body) => Ok(list_of(&body, "inputs")
                .iter()
                .filter_map(InputSource::from_json)
                .collect()),
            Err(e) => {
                warn!("Android input discovery failed: {}", e);
                self.shared
                    .events
                    .log(format!("Input discovery failed: {}", e))
                    .await;
                Ok(Vec::new())
            }
        }
    }

    async fn switch_input(&self, input_id: &str) -> Result<()> {
        self.post("/input", json!({ "inputId": input_id })).await
    }

    async fn set_volume(&self, level: u8) -> Result<()> {
        let level = level.min(100);
        self.post("/volume", json!({ "volume": level })).await?;
        self.shared
            .update(TvStatePatch {
                volume: Some(i64::from(level)),
                ..Default::default()
            })
            .await;
        Ok(())
    }
}
