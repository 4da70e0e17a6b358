//! Merge saved TV settings with command-line overrides

use anyhow::{bail, Context, Result};
use clap::Args;
use tvlink_core::{
    AndroidConfig, ConfigStore, ConnectionConfig, LgConfig, SamsungConfig, TvKind,
};

/// Connection flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionFlags {
    /// TV address (Samsung, LG)
    #[arg(long, global = true)]
    pub ip: Option<String>,

    /// Remote-control port; defaults to 8001 (Samsung) or 3000 (LG)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Samsung pairing token
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// LG pairing key
    #[arg(long, global = true)]
    pub client_key: Option<String>,

    /// LG proxy backend base URL (enables proxy mode)
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Android bridge base URL
    #[arg(long, global = true)]
    pub bridge_url: Option<String>,
}

impl ConnectionFlags {
    fn is_empty(&self) -> bool {
        self.ip.is_none()
            && self.port.is_none()
            && self.token.is_none()
            && self.client_key.is_none()
            && self.proxy.is_none()
            && self.bridge_url.is_none()
    }
}

/// Saved settings for `kind` with `flags` applied on top
pub fn resolve(
    kind: TvKind,
    flags: &ConnectionFlags,
    store: &dyn ConfigStore,
) -> Result<ConnectionConfig> {
    let saved = store
        .load(kind)
        .with_context(|| format!("Failed to read saved {} settings", kind))?;

    let config = match kind {
        TvKind::Samsung => {
            let mut config = match saved {
                Some(ConnectionConfig::Samsung(config)) => config,
                _ => SamsungConfig::new(required(&flags.ip, "--ip", kind)?, 8001),
            };
            if let Some(ip) = &flags.ip {
                config.ip = ip.clone();
            }
            if let Some(port) = flags.port {
                config.port = port;
            }
            if flags.token.is_some() {
                config.token = flags.token.clone();
            }
            ConnectionConfig::Samsung(config)
        }
        TvKind::Lg => {
            let mut config = match saved {
                Some(ConnectionConfig::Lg(config)) => config,
                _ => LgConfig::new(required(&flags.ip, "--ip", kind)?),
            };
            if let Some(ip) = &flags.ip {
                config.ip = ip.clone();
            }
            if let Some(port) = flags.port {
                config.port = port;
            }
            if flags.client_key.is_some() {
                config.client_key = flags.client_key.clone();
            }
            if let Some(proxy) = &flags.proxy {
                // An empty value switches back to direct mode
                config.proxy_base_url = Some(proxy.clone()).filter(|p| !p.is_empty());
            }
            ConnectionConfig::Lg(config)
        }
        TvKind::Android => {
            let mut config = match saved {
                Some(ConnectionConfig::Android(config)) => config,
                _ => AndroidConfig::new(required(&flags.bridge_url, "--bridge-url", kind)?),
            };
            if let Some(url) = &flags.bridge_url {
                config.bridge_url = url.clone();
            }
            ConnectionConfig::Android(config)
        }
    };

    config
        .validate()
        .with_context(|| format!("Invalid {} settings", kind))?;
    Ok(config)
}

/// Persist the merged settings when flags changed anything
pub fn remember(
    config: &ConnectionConfig,
    flags: &ConnectionFlags,
    store: &dyn ConfigStore,
) -> Result<()> {
    if flags.is_empty() {
        return Ok(());
    }
    store
        .save(config)
        .with_context(|| format!("Failed to save {} settings", config.kind()))
}

fn required(value: &Option<String>, flag: &str, kind: TvKind) -> Result<String> {
    match value {
        Some(value) => Ok(value.clone()),
        None => bail!("No saved {} settings; pass {} the first time", kind, flag),
    }
}
