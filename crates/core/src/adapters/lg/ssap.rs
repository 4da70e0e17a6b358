//! WebOS SSAP wire encoding
//!
//! Main channel frames are JSON `{id, type, uri, payload}`. The pointer
//! socket takes plain-text frames terminated by a blank line.

use serde_json::{json, Value};

use crate::types::RemoteKey;

pub const URI_TURN_OFF: &str = "ssap://system/turnOff";
pub const URI_VOLUME_UP: &str = "ssap://audio/volumeUp";
pub const URI_VOLUME_DOWN: &str = "ssap://audio/volumeDown";
pub const URI_SET_MUTE: &str = "ssap://audio/setMute";
pub const URI_SET_VOLUME: &str = "ssap://audio/setVolume";
pub const URI_GET_VOLUME: &str = "ssap://audio/getVolume";
pub const URI_CHANNEL_UP: &str = "ssap://tv/channelUp";
pub const URI_CHANNEL_DOWN: &str = "ssap://tv/channelDown";
pub const URI_CURRENT_CHANNEL: &str = "ssap://tv/getCurrentChannel";
pub const URI_INPUT_LIST: &str = "ssap://tv/getExternalInputList";
pub const URI_SWITCH_INPUT: &str = "ssap://tv/switchInput";
pub const URI_PLAY: &str = "ssap://media.controls/play";
pub const URI_PAUSE: &str = "ssap://media.controls/pause";
pub const URI_STOP: &str = "ssap://media.controls/stop";
pub const URI_FOREGROUND_APP: &str =
    "ssap://com.webos.applicationManager/getForegroundAppInfo";
pub const URI_LAUNCH_POINTS: &str = "ssap://com.webos.applicationManager/listLaunchPoints";
pub const URI_LAUNCH: &str = "ssap://system.launcher/launch";
pub const URI_INSERT_TEXT: &str = "ssap://com.webos.service.ime/insertText";
pub const URI_POINTER_SOCKET: &str =
    "ssap://com.webos.service.networkinput/getPointerInputSocket";

pub const HOME_APP_ID: &str = "com.webos.app.home";
pub const YOUTUBE_APP_ID: &str = "youtube.leanback.v4";

const PERMISSIONS: &[&str] = &[
    "LAUNCH",
    "LAUNCH_WEBAPP",
    "APP_TO_APP",
    "CLOSE",
    "TEST_OPEN",
    "TEST_PROTECTED",
    "CONTROL_AUDIO",
    "CONTROL_DISPLAY",
    "CONTROL_INPUT_JOYSTICK",
    "CONTROL_INPUT_MEDIA_RECORDING",
    "CONTROL_INPUT_MEDIA_PLAYBACK",
    "CONTROL_INPUT_TV",
    "CONTROL_POWER",
    "CONTROL_INPUT_TEXT",
    "CONTROL_MOUSE_AND_KEYBOARD",
    "READ_APP_STATUS",
    "READ_CURRENT_CHANNEL",
    "READ_INPUT_DEVICE_LIST",
    "READ_NETWORK_STATE",
    "READ_RUNNING_APPS",
    "READ_TV_CHANNEL_LIST",
    "READ_INSTALLED_APPS",
    "READ_POWER_STATE",
    "READ_COUNTRY_INFO",
    "READ_SETTINGS",
    "WRITE_NOTIFICATION_TOAST",
];

/// State channels subscribed to after registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscription {
    Volume,
    ForegroundApp,
    Channel,
}

impl Subscription {
    pub const ALL: [Subscription; 3] = [
        Subscription::Volume,
        Subscription::ForegroundApp,
        Subscription::Channel,
    ];

    pub fn uri(&self) -> &'static str {
        match self {
            Subscription::Volume => URI_GET_VOLUME,
            Subscription::ForegroundApp => URI_FOREGROUND_APP,
            Subscription::Channel => URI_CURRENT_CHANNEL,
        }
    }
}

/// What a key does on the SSAP side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRoute {
    /// Raw button frame on the pointer socket
    Pointer(&'static str),
    /// Request on the main channel
    Uri(&'static str),
    /// `setMute` with the inverse of the last known mute state
    ToggleMute,
}

pub fn key_route(key: RemoteKey) -> KeyRoute {
    match key {
        RemoteKey::Power => KeyRoute::Uri(URI_TURN_OFF),
        RemoteKey::VolumeUp => KeyRoute::Uri(URI_VOLUME_UP),
        RemoteKey::VolumeDown => KeyRoute::Uri(URI_VOLUME_DOWN),
        RemoteKey::Mute => KeyRoute::ToggleMute,
        RemoteKey::ChannelUp => KeyRoute::Uri(URI_CHANNEL_UP),
        RemoteKey::ChannelDown => KeyRoute::Uri(URI_CHANNEL_DOWN),
        RemoteKey::Play => KeyRoute::Uri(URI_PLAY),
        RemoteKey::Pause => KeyRoute::Uri(URI_PAUSE),
        RemoteKey::Stop => KeyRoute::Uri(URI_STOP),
        RemoteKey::Up => KeyRoute::Pointer("UP"),
        RemoteKey::Down => KeyRoute::Pointer("DOWN"),
        RemoteKey::Left => KeyRoute::Pointer("LEFT"),
        RemoteKey::Right => KeyRoute::Pointer("RIGHT"),
        RemoteKey::Ok => KeyRoute::Pointer("ENTER"),
        RemoteKey::Back => KeyRoute::Pointer("BACK"),
        RemoteKey::Home => KeyRoute::Pointer("HOME"),
        RemoteKey::Menu => KeyRoute::Pointer("MENU"),
    }
}

pub fn pointer_button(name: &str) -> String {
    format!("type:button\nname:{}\n\n", name)
}

/// Registration request; the stored client key skips the prompt
pub fn register_frame(id: &str, app_name: &str, client_key: Option<&str>) -> Value {
    let mut payload = json!({
        "forcePairing": false,
        "pairingType": "PROMPT",
        "manifest": {
            "manifestVersion": 1,
            "appVersion": "1.1",
            "signed": {
                "appId": "com.lge.test",
                "vendorId": "com.lge",
                "created": "20140509",
                "localizedAppNames": { "": app_name },
                "localizedVendorNames": { "": "LG Electronics" },
                "permissions": ["TEST_SECURE", "CONTROL_INPUT_TEXT", "CONTROL_MOUSE_AND_KEYBOARD",
                    "READ_INSTALLED_APPS", "READ_LGE_SDX", "READ_NOTIFICATIONS", "SEARCH",
                    "WRITE_SETTINGS", "WRITE_NOTIFICATION_ALERT", "CONTROL_POWER",
                    "READ_CURRENT_CHANNEL", "READ_RUNNING_APPS", "READ_UPDATE_INFO",
                    "UPDATE_FROM_REMOTE_APP", "READ_LGE_TV_INPUT_EVENTS", "READ_TV_CURRENT_TIME"],
                "serial": "2f930e2d2cfe083771f68e4fe7bb07",
            },
            "permissions": PERMISSIONS,
        }
    });
    if let Some(key) = client_key.filter(|k| !k.is_empty()) {
        payload["client-key"] = json!(key);
    }
    json!({ "id": id, "type": "register", "payload": payload })
}

pub fn request_frame(id: &str, uri: &str, payload: Option<Value>) -> Value {
    let mut frame = json!({ "id": id, "type": "request", "uri": uri });
    if let Some(payload) = payload {
        frame["payload"] = payload;
    }
    frame
}

pub fn subscribe_frame(id: &str, uri: &str) -> Value {
    json!({ "id": id, "type": "subscribe", "uri": uri })
}

/// True for the interim reply that means the TV is showing its prompt
pub fn is_pairing_prompt(frame: &Value) -> bool {
    frame.get("type").and_then(Value::as_str) == Some("response")
        && frame.pointer("/payload/pairingType").and_then(Value::as_str) == Some("PROMPT")
}

/// Key carried by a `registered` reply, if the TV issued one
pub fn issued_client_key(frame: &Value) -> Option<String> {
    frame
        .pointer("/payload/client-key")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
