//! Adapter factory

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{AndroidAdapter, LgAdapter, SamsungAdapter};
use crate::controller::TvController;
use crate::error::{RemoteError, Result};
use crate::store::ConfigStore;
use crate::transport::{Connector, WsConnector};
use crate::types::{ConnectionConfig, TvKind};
use crate::DEFAULT_APP_NAME;

/// Timeout for every REST call (Android bridge, LG proxy backend)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators handed to every adapter the factory builds
#[derive(Clone)]
pub struct AdapterContext {
    pub connector: Arc<dyn Connector>,
    pub store: Option<Arc<dyn ConfigStore>>,
    pub http: reqwest::Client,
    /// Name the TV shows in its pairing prompt
    pub app_name: String,
}

impl AdapterContext {
    /// Real WebSocket connector and HTTP client, no store
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            connector: Arc::new(WsConnector::new()?),
            store: None,
            http,
            app_name: DEFAULT_APP_NAME.to_string(),
        })
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }
}

/// Build the adapter for a configuration
pub fn create_controller(
    config: ConnectionConfig,
    ctx: &AdapterContext,
) -> Result<Box<dyn TvController>> {
    config.validate()?;
    let controller: Box<dyn TvController> = match config {
        ConnectionConfig::Samsung(config) => Box::new(SamsungAdapter::new(config, ctx)),
        ConnectionConfig::Lg(config) => Box::new(LgAdapter::new(config, ctx)),
        ConnectionConfig::Android(config) => Box::new(AndroidAdapter::new(config, ctx)),
    };
    Ok(controller)
}

/// Build the adapter for a TV type from its saved configuration
pub fn create_from_store(kind: TvKind, ctx: &AdapterContext) -> Result<Box<dyn TvController>> {
    let store = ctx
        .store
        .as_ref()
        .ok_or_else(|| RemoteError::Store("no config store configured".into()))?;
    let config = store
        .load(kind)?
        .ok_or_else(|| RemoteError::InvalidConfig(format!("no saved {} configuration", kind)))?;
    create_controller(config, ctx)
}
