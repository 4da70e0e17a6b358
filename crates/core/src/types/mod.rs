//! Domain types for TV remote control

mod command;
mod config;
mod event;
mod state;

pub use command::RemoteKey;
pub use config::{
    AndroidConfig, ConnectionConfig, LgConfig, SamsungConfig, TvKind, LG_DEFAULT_PORT,
    LG_SECURE_PORT, SAMSUNG_DEFAULT_PORT, SAMSUNG_SECURE_PORT,
};
pub use event::{EventHub, TvEvent};
pub use state::{AppInfo, ConnectionState, InputSource, TvState, TvStatePatch};
