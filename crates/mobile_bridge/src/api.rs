//! Flutter Rust Bridge API
//!
//! FFI-safe functions for Dart integration. One TV is active at a time;
//! `connect_tv` replaces whatever was connected before.

use flutter_rust_bridge::frb;
use once_cell::sync::Lazy;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tvlink_core::{
    create_controller, AdapterContext, ConnectionConfig, RemoteKey, TvController, TvKind,
};

use crate::bridge::{BridgeEvent, EventBuffer, TvSession};

/// Active controller slot
static SESSION: Lazy<Mutex<Option<TvSession>>> = Lazy::new(|| Mutex::new(None));

/// Kept outside the session lock so polling never waits on a slow command
static EVENTS: Lazy<EventBuffer> = Lazy::new(EventBuffer::default);

const NO_TV: &str = "No TV configured. Call connect_tv first.";

/// App entry for Dart
#[frb]
#[derive(Debug, Clone)]
pub struct TvApp {
    pub id: String,
    pub name: String,
}

/// Input entry for Dart
#[frb]
#[derive(Debug, Clone)]
pub struct TvInput {
    pub id: String,
    pub label: String,
}

async fn active() -> Result<Arc<dyn TvController>, String> {
    SESSION
        .lock()
        .await
        .as_ref()
        .map(TvSession::controller)
        .ok_or_else(|| NO_TV.to_string())
}

/// Connect to a TV
///
/// # Arguments
/// * `kind` - `samsung`, `lg` or `android`
/// * `config_json` - the per-kind settings blob (`ip`, `port`, `token`,
///   `clientKey`, `proxyBaseUrl`, `bridgeUrl`, ...)
///
/// On failure the controller stays installed so its error events can still
/// be polled and `repair_tv` can be attempted.
#[frb]
pub async fn connect_tv(kind: String, config_json: String) -> Result<(), String> {
    let kind = TvKind::from_str(&kind).map_err(|e| e.to_string())?;
    let blob: serde_json::Value = serde_json::from_str(&config_json).map_err(|e| e.to_string())?;
    let config = ConnectionConfig::from_blob(kind, blob).map_err(|e| e.to_string())?;
    let ctx = AdapterContext::new().map_err(|e| e.to_string())?;
    let controller: Arc<dyn TvController> =
        Arc::from(create_controller(config, &ctx).map_err(|e| e.to_string())?);

    {
        let mut slot = SESSION.lock().await;
        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }
        EVENTS.clear().await;
        *slot = Some(TvSession::start(Arc::clone(&controller), EVENTS.clone()).await);
    }

    info!("Connecting to {} TV", kind);
    controller.connect().await.map_err(|e| e.to_string())
}

/// Send a remote key by wire name (`VOLUME_UP`, `OK`, `HOME`, ...)
#[frb]
pub async fn send_tv_command(command: String) -> Result<(), String> {
    active()
        .await?
        .send_command(&command)
        .await
        .map_err(|e| e.to_string())
}

/// Launch an app; `params_json` is passed through to the TV when given
#[frb]
pub async fn launch_tv_app(app_id: String, params_json: Option<String>) -> Result<(), String> {
    let params = params_json
        .map(|p| serde_json::from_str(&p))
        .transpose()
        .map_err(|e| e.to_string())?;
    active()
        .await?
        .launch_app(&app_id, params)
        .await
        .map_err(|e| e.to_string())
}

#[frb]
pub async fn send_tv_text(text: String) -> Result<(), String> {
    active()
        .await?
        .send_text(&text)
        .await
        .map_err(|e| e.to_string())
}

#[frb]
pub async fn open_tv_youtube(video_id: String) -> Result<(), String> {
    active()
        .await?
        .open_youtube(&video_id)
        .await
        .map_err(|e| e.to_string())
}

#[frb]
pub async fn get_tv_apps() -> Result<Vec<TvApp>, String> {
    let apps = active().await?.get_apps().await.map_err(|e| e.to_string())?;
    Ok(apps
        .into_iter()
        .map(|app| TvApp {
            id: app.id,
            name: app.name,
        })
        .collect())
}

#[frb]
pub async fn get_tv_inputs() -> Result<Vec<TvInput>, String> {
    let inputs = active().await?.get_inputs().await.map_err(|e| e.to_string())?;
    Ok(inputs
        .into_iter()
        .map(|input| TvInput {
            id: input.id,
            label: input.label,
        })
        .collect())
}

#[frb]
pub async fn switch_tv_input(input_id: String) -> Result<(), String> {
    active()
        .await?
        .switch_input(&input_id)
        .await
        .map_err(|e| e.to_string())
}

/// Set absolute volume (0-100)
#[frb]
pub async fn set_tv_volume(level: u8) -> Result<(), String> {
    active()
        .await?
        .set_volume(level)
        .await
        .map_err(|e| e.to_string())
}

/// Current TV state as JSON, `None` when the adapter cannot tell
#[frb]
pub async fn get_tv_state() -> Result<Option<String>, String> {
    let state = active().await?.get_state().await.map_err(|e| e.to_string())?;
    state
        .map(|s| serde_json::to_string(&s))
        .transpose()
        .map_err(|e| e.to_string())
}

/// Current settings blob, including any token/key the TV issued
///
/// The app should save this after a successful pairing.
#[frb]
pub async fn get_tv_config() -> Result<String, String> {
    let config = active().await?.config().await;
    let blob = config.to_blob().map_err(|e| e.to_string())?;
    Ok(blob.to_string())
}

/// Re-pair with the TV (forces the on-screen prompt again)
#[frb]
pub async fn repair_tv() -> Result<(), String> {
    active().await?.repair().await.map_err(|e| e.to_string())
}

/// Next buffered event (NON-BLOCKING)
///
/// Returns `None` immediately when nothing is pending.
#[frb]
pub async fn poll_tv_event() -> Option<BridgeEvent> {
    EVENTS.pop().await
}

/// Disconnect and drop the active controller
#[frb]
pub async fn disconnect_tv() -> Result<(), String> {
    let session = SESSION.lock().await.take().ok_or_else(|| NO_TV.to_string())?;
    session.shutdown().await;
    EVENTS.clear().await;
    Ok(())
}

/// Check if connected
///
/// Returns false if no TV is configured.
#[frb]
pub async fn is_tv_connected() -> bool {
    match active().await {
        Ok(controller) => controller.is_connected().await,
        Err(_) => false,
    }
}

/// Wire names of every remote key, for building the keypad
#[frb(sync)]
pub fn remote_key_names() -> Vec<String> {
    RemoteKey::ALL.iter().map(|k| k.as_str().to_string()).collect()
}

/// TV families this bridge can drive
#[frb(sync)]
pub fn supported_tv_kinds() -> Vec<String> {
    [TvKind::Samsung, TvKind::Lg, TvKind::Android]
        .iter()
        .map(|k| k.as_str().to_string())
        .collect()
}
