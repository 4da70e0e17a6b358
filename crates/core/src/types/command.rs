//! Remote-control key vocabulary shared by every adapter

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RemoteError;

/// A button on the virtual remote
///
/// The wire names (`VOLUME_UP`, `OK`, ...) are what UI callers pass in and
/// what the LG proxy backend expects verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteKey {
    Power,
    VolumeUp,
    VolumeDown,
    Mute,
    ChannelUp,
    ChannelDown,
    Up,
    Down,
    Left,
    Right,
    Ok,
    Back,
    Home,
    Menu,
    Play,
    Pause,
    Stop,
}

impl RemoteKey {
    pub const ALL: [RemoteKey; 17] = [
        RemoteKey::Power,
        RemoteKey::VolumeUp,
        RemoteKey::VolumeDown,
        RemoteKey::Mute,
        RemoteKey::ChannelUp,
        RemoteKey::ChannelDown,
        RemoteKey::Up,
        RemoteKey::Down,
        RemoteKey::Left,
        RemoteKey::Right,
        RemoteKey::Ok,
        RemoteKey::Back,
        RemoteKey::Home,
        RemoteKey::Menu,
        RemoteKey::Play,
        RemoteKey::Pause,
        RemoteKey::Stop,
    ];

    /// Wire name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteKey::Power => "POWER",
            RemoteKey::VolumeUp => "VOLUME_UP",
            RemoteKey::VolumeDown => "VOLUME_DOWN",
            RemoteKey::Mute => "MUTE",
            RemoteKey::ChannelUp => "CHANNEL_UP",
            RemoteKey::ChannelDown => "CHANNEL_DOWN",
            RemoteKey::Up => "UP",
            RemoteKey::Down => "DOWN",
            RemoteKey::Left => "LEFT",
            RemoteKey::Right => "RIGHT",
            RemoteKey::Ok => "OK",
            RemoteKey::Back => "BACK",
            RemoteKey::Home => "HOME",
            RemoteKey::Menu => "MENU",
            RemoteKey::Play => "PLAY",
            RemoteKey::Pause => "PAUSE",
            RemoteKey::Stop => "STOP",
        }
    }

    /// True for the d-pad keys and OK
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            RemoteKey::Up | RemoteKey::Down | RemoteKey::Left | RemoteKey::Right | RemoteKey::Ok
        )
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteKey {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        RemoteKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| RemoteError::UnknownCommand(s.to_string()))
    }
}
