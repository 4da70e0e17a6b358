//! Protocol-agnostic TV controller trait

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{RemoteError, Result};
use crate::types::{
    AppInfo, ConnectionConfig, ConnectionState, InputSource, RemoteKey, TvEvent, TvKind, TvState,
};

/// One TV family behind a single command interface
///
/// Every command fails with [`RemoteError::NotConnected`] while the adapter
/// is not connected; nothing is queued for later.
#[async_trait]
pub trait TvController: Send + Sync {
    fn kind(&self) -> TvKind;

    /// Establish the connection, replacing any existing one
    async fn connect(&self) -> Result<()>;

    /// Tear down the connection, rejecting every in-flight request first
    async fn disconnect(&self);

    async fn connection_state(&self) -> ConnectionState;

    /// Register the observer; a later call replaces the earlier one
    async fn events(&self) -> mpsc::UnboundedReceiver<TvEvent>;

    /// Current configuration, including any token or key issued since construction
    async fn config(&self) -> ConnectionConfig;

    async fn send_key(&self, key: RemoteKey) -> Result<()>;

    /// Send a command by its vocabulary name (`"VOLUME_UP"`, ...)
    ///
    /// Names outside the vocabulary fail with [`RemoteError::UnknownCommand`]
    /// before anything touches the wire.
    async fn send_command(&self, command: &str) -> Result<()> {
        let key: RemoteKey = command.parse()?;
        self.send_key(key).await
    }

    async fn is_connected(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    async fn power(&self) -> Result<()> {
        self.send_key(RemoteKey::Power).await
    }

    async fn volume_up(&self) -> Result<()> {
        self.send_key(RemoteKey::VolumeUp).await
    }

    async fn volume_down(&self) -> Result<()> {
        self.send_key(RemoteKey::VolumeDown).await
    }

    async fn mute(&self) -> Result<()> {
        self.send_key(RemoteKey::Mute).await
    }

    async fn channel_up(&self) -> Result<()> {
        self.send_key(RemoteKey::ChannelUp).await
    }

    async fn channel_down(&self) -> Result<()> {
        self.send_key(RemoteKey::ChannelDown).await
    }

    async fn up(&self) -> Result<()> {
        self.send_key(RemoteKey::Up).await
    }

    async fn down(&self) -> Result<()> {
        self.send_key(RemoteKey::Down).await
    }

    async fn left(&self) -> Result<()> {
        self.send_key(RemoteKey::Left).await
    }

    async fn right(&self) -> Result<()> {
        self.send_key(RemoteKey::Right).await
    }

    async fn ok(&self) -> Result<()> {
        self.send_key(RemoteKey::Ok).await
    }

    async fn back(&self) -> Result<()> {
        self.send_key(RemoteKey::Back).await
    }

    async fn home(&self) -> Result<()> {
        self.send_key(RemoteKey::Home).await
    }

    async fn menu(&self) -> Result<()> {
        self.send_key(RemoteKey::Menu).await
    }

    /// Installed apps; empty when the list is unknown or discovery failed
    async fn get_apps(&self) -> Result<Vec<AppInfo>> {
        Ok(Vec::new())
    }

    async fn launch_app(&self, app_id: &str, params: Option<Value>) -> Result<()>;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn open_youtube(&self, video_id: &str) -> Result<()>;

    /// Snapshot of the TV state, `None` when nothing is known
    async fn get_state(&self) -> Result<Option<TvState>>;

    async fn get_inputs(&self) -> Result<Vec<InputSource>> {
        Ok(Vec::new())
    }

    async fn switch_input(&self, _input_id: &str) -> Result<()> {
        Err(RemoteError::Unsupported(format!(
            "{} TVs cannot switch inputs",
            self.kind()
        )))
    }

    async fn set_volume(&self, _level: u8) -> Result<()> {
        Err(RemoteError::Unsupported(format!(
            "{} TVs cannot set an absolute volume",
            self.kind()
        )))
    }

    /// Redo pairing from scratch
    async fn repair(&self) -> Result<()> {
        Err(RemoteError::Unsupported(format!(
            "{} TVs have no pairing to redo",
            self.kind()
        )))
    }
}

/// Guard shared by the adapters' command paths
pub(crate) fn ensure_connected(state: ConnectionState) -> Result<()> {
    if state == ConnectionState::Connected {
        Ok(())
    } else {
        Err(RemoteError::NotConnected)
    }
}
