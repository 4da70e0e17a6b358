//! Per-TV-family connection configuration
//!
//! Field names match the per-kind JSON blob the host application keeps in
//! its settings store (`ip`, `port`, `token`, `clientKey`, `bridgeUrl`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RemoteError, Result};

/// Default Samsung remote-control port (plain WebSocket)
pub const SAMSUNG_DEFAULT_PORT: u16 = 8001;
/// Samsung secure WebSocket port
pub const SAMSUNG_SECURE_PORT: u16 = 8002;
/// Default LG SSAP port (plain WebSocket)
pub const LG_DEFAULT_PORT: u16 = 3000;
/// LG SSAP secure WebSocket port
pub const LG_SECURE_PORT: u16 = 3001;

/// TV family discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvKind {
    Samsung,
    Lg,
    Android,
}

impl TvKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TvKind::Samsung => "samsung",
            TvKind::Lg => "lg",
            TvKind::Android => "android",
        }
    }
}

impl fmt::Display for TvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TvKind {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "samsung" => Ok(TvKind::Samsung),
            "lg" | "webos" => Ok(TvKind::Lg),
            "android" | "androidtv" | "android_tv" => Ok(TvKind::Android),
            other => Err(RemoteError::InvalidConfig(format!("unknown TV type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamsungConfig {
    pub ip: String,
    #[serde(default = "default_samsung_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LgConfig {
    pub ip: String,
    #[serde(default = "default_lg_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    /// Trusted backend that talks to the TV on our behalf
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_base_url: Option<String>,
    /// Home-automation entity the backend may fall back to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_entity_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidConfig {
    pub bridge_url: String,
}

fn default_samsung_port() -> u16 {
    SAMSUNG_DEFAULT_PORT
}

fn default_lg_port() -> u16 {
    LG_DEFAULT_PORT
}

impl SamsungConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            token: None,
        }
    }
}

impl LgConfig {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: LG_DEFAULT_PORT,
            client_key: None,
            proxy_base_url: None,
            remote_entity_id: None,
        }
    }

    /// Proxy mode is active whenever a non-empty backend URL is configured
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

impl AndroidConfig {
    pub fn new(bridge_url: impl Into<String>) -> Self {
        Self {
            bridge_url: bridge_url.into(),
        }
    }
}

/// Protocol-specific connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    Samsung(SamsungConfig),
    Lg(LgConfig),
    Android(AndroidConfig),
}

impl ConnectionConfig {
    pub fn kind(&self) -> TvKind {
        match self {
            ConnectionConfig::Samsung(_) => TvKind::Samsung,
            ConnectionConfig::Lg(_) => TvKind::Lg,
            ConnectionConfig::Android(_) => TvKind::Android,
        }
    }

    /// Serialize to the per-kind store blob (no type tag)
    pub fn to_blob(&self) -> Result<serde_json::Value> {
        let value = match self {
            ConnectionConfig::Samsung(c) => serde_json::to_value(c)?,
            ConnectionConfig::Lg(c) => serde_json::to_value(c)?,
            ConnectionConfig::Android(c) => serde_json::to_value(c)?,
        };
        Ok(value)
    }

    /// Parse a per-kind store blob
    pub fn from_blob(kind: TvKind, blob: serde_json::Value) -> Result<Self> {
        let config = match kind {
            TvKind::Samsung => ConnectionConfig::Samsung(serde_json::from_value(blob)?),
            TvKind::Lg => ConnectionConfig::Lg(serde_json::from_value(blob)?),
            TvKind::Android => ConnectionConfig::Android(serde_json::from_value(blob)?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no adapter could use
    pub fn validate(&self) -> Result<()> {
        match self {
            ConnectionConfig::Samsung(SamsungConfig { ip, port, .. })
            | ConnectionConfig::Lg(LgConfig { ip, port, .. }) => {
                if ip.trim().is_empty() {
                    return Err(RemoteError::InvalidConfig("IP address cannot be empty".into()));
                }
                if *port == 0 {
                    return Err(RemoteError::InvalidConfig("port cannot be 0".into()));
                }
            }
            ConnectionConfig::Android(AndroidConfig { bridge_url }) => {
                url::Url::parse(bridge_url)?;
            }
        }
        if let ConnectionConfig::Lg(lg) = self {
            if let Some(proxy) = lg.proxy_url() {
                url::Url::parse(proxy)?;
            }
        }
        Ok(())
    }
}
