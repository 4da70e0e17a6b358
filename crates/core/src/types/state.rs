//! TV state snapshot, partial updates and connection lifecycle

use serde::{Deserialize, Serialize};

/// Adapter connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// LG only: transport is open, waiting for the on-TV pairing prompt
    Registering,
    Connected,
    Reconnecting,
}

/// Snapshot of what the adapter knows about the TV
///
/// Merged in place as [`TvStatePatch`]es arrive. The last four fields are
/// only ever set by the LG adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TvState {
    pub power: bool,
    pub volume: Option<i64>,
    pub muted: bool,
    pub source: Option<String>,
    pub app: Option<String>,
    pub app_name: Option<String>,
    pub input_socket_connected: bool,
    pub dpad_ready: bool,
    pub pairing_prompt: bool,
    pub ha_fallback: bool,
}

/// Partial state update; `None` leaves the field untouched
///
/// For the text fields an empty string clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TvStatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_socket_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpad_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha_fallback: Option<bool>,
}

impl TvStatePatch {
    pub fn is_empty(&self) -> bool {
        *self == TvStatePatch::default()
    }

    /// Keep only the fields that differ from `state`
    pub fn changes_from(&self, state: &TvState) -> TvStatePatch {
        fn changed<T: PartialEq + Clone>(next: &Option<T>, current: &T) -> Option<T> {
            next.as_ref().filter(|v| *v != current).cloned()
        }

        fn changed_text(next: &Option<String>, current: &Option<String>) -> Option<String> {
            let next = next.as_ref()?;
            let value = Some(next.as_str()).filter(|v| !v.is_empty());
            (value != current.as_deref()).then(|| next.clone())
        }

        TvStatePatch {
            power: changed(&self.power, &state.power),
            volume: changed(&self.volume.map(Some), &state.volume).flatten(),
            muted: changed(&self.muted, &state.muted),
            source: changed_text(&self.source, &state.source),
            app: changed_text(&self.app, &state.app),
            app_name: changed_text(&self.app_name, &state.app_name),
            input_socket_connected: changed(
                &self.input_socket_connected,
                &state.input_socket_connected,
            ),
            dpad_ready: changed(&self.dpad_ready, &state.dpad_ready),
            pairing_prompt: changed(&self.pairing_prompt, &state.pairing_prompt),
            ha_fallback: changed(&self.ha_fallback, &state.ha_fallback),
        }
    }
}

impl TvState {
    /// Merge a partial update into this snapshot
    pub fn apply(&mut self, patch: &TvStatePatch) {
        if let Some(power) = patch.power {
            self.power = power;
        }
        if let Some(volume) = patch.volume {
            self.volume = Some(volume);
        }
        if let Some(muted) = patch.muted {
            self.muted = muted;
        }
        if let Some(source) = &patch.source {
            self.source = non_empty(source);
        }
        if let Some(app) = &patch.app {
            self.app = non_empty(app);
        }
        if let Some(app_name) = &patch.app_name {
            self.app_name = non_empty(app_name);
        }
        if let Some(connected) = patch.input_socket_connected {
            self.input_socket_connected = connected;
        }
        if let Some(ready) = patch.dpad_ready {
            self.dpad_ready = ready;
        }
        if let Some(prompt) = patch.pairing_prompt {
            self.pairing_prompt = prompt;
        }
        if let Some(fallback) = patch.ha_fallback {
            self.ha_fallback = fallback;
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.to_string()).filter(|v| !v.is_empty())
}

/// An installed application the TV can launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub id: String,
    pub name: String,
}

impl AppInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Lenient parse of the app objects the different peers return
    ///
    /// Accepts `id`/`appId`/`packageName` for the id and
    /// `name`/`title`/`label` for the display name.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let id = ["id", "appId", "packageName"]
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))?;
        let name = ["name", "title", "label", "appName"]
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
            .unwrap_or(id);
        Some(Self::new(id, name))
    }
}

/// An external input (HDMI port, tuner, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSource {
    pub id: String,
    pub label: String,
}

impl InputSource {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let id = value.get("id").and_then(|v| v.as_str())?;
        let label = ["label", "name"]
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
            .unwrap_or(id);
        Some(Self {
            id: id.to_string(),
            label: label.to_string(),
        })
    }
}
