//! LG WebOS adapter
//!
//! Two modes behind one controller:
//! - **Direct**: SSAP over WebSocket with an interactive pairing handshake,
//!   push subscriptions for volume/app/channel and a second pointer socket
//!   for d-pad input (see [`direct`]).
//! - **Proxy**: a trusted backend speaks SSAP for us; we make plain REST
//!   calls and poll its state (see [`proxy`]). Selected whenever the config
//!   carries a proxy base URL, and then no socket to the TV is ever opened.

mod direct;
pub mod proxy;
pub mod ssap;

pub use proxy::{ProxyClient, ProxyStatus};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::AdapterShared;
use crate::controller::{ensure_connected, TvController};
use crate::correlator::{Correlator, DEFAULT_REQUEST_TIMEOUT};
use crate::error::Result;
use crate::factory::AdapterContext;
use crate::transport::{ReconnectPolicy, Transport, TransportOptions};
use crate::types::{
    AppInfo, ConnectionConfig, ConnectionState, InputSource, LgConfig, RemoteKey, TvEvent, TvKind,
    TvState, TvStatePatch,
};
use ssap::Subscription;

/// Registration waits on a human accepting the prompt on the TV
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Proxy state poll period
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct LgOptions {
    pub transport: TransportOptions,
    pub request_timeout: Duration,
    pub register_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LgOptions {
    fn default() -> Self {
        Self {
            transport: TransportOptions::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            register_timeout: REGISTER_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Background tasks owned by one adapter; each is aborted on teardown
#[derive(Default)]
struct LgTasks {
    main_driver: Option<JoinHandle<()>>,
    input_driver: Option<JoinHandle<()>>,
    setup: Option<JoinHandle<()>>,
    reregister: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

struct LgInner {
    shared: AdapterShared,
    config: Mutex<LgConfig>,
    app_name: String,
    main: Transport,
    input: Transport,
    correlator: Correlator,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    apps: Mutex<Vec<AppInfo>>,
    proxy: Option<ProxyClient>,
    tasks: Mutex<LgTasks>,
    options: LgOptions,
}

impl LgInner {
    /// Adopt a freshly issued client key; an absent key keeps the stored one
    async fn adopt_client_key(&self, key: Option<String>) {
        let Some(key) = key else {
            return;
        };
        let updated = {
            let mut config = self.config.lock().await;
            if config.client_key.as_deref() == Some(key.as_str()) {
                return;
            }
            config.client_key = Some(key);
            config.clone()
        };
        self.shared.events.log("Received pairing key").await;
        self.shared.persist(&ConnectionConfig::Lg(updated)).await;
    }

    /// Drop the stored key so the TV prompts again
    async fn forget_client_key(&self) {
        let updated = {
            let mut config = self.config.lock().await;
            config.client_key = None;
            config.clone()
        };
        self.shared.events.log("Dropped pairing key").await;
        self.shared.persist(&ConnectionConfig::Lg(updated)).await;
    }

    async fn app_name_for(&self, app_id: &str) -> Option<String> {
        self.apps
            .lock()
            .await
            .iter()
            .find(|app| app.id == app_id)
            .map(|app| app.name.clone())
    }
}

/// LG WebOS adapter
pub struct LgAdapter {
    inner: Arc<LgInner>,
}

impl LgAdapter {
    pub fn new(config: LgConfig, ctx: &AdapterContext) -> Self {
        Self::with_options(config, ctx, LgOptions::default())
    }

    pub fn with_options(config: LgConfig, ctx: &AdapterContext, options: LgOptions) -> Self {
        let shared = AdapterShared::new("lg", ctx.store.clone());
        let main = Transport::new(
            "lg",
            Arc::clone(&ctx.connector),
            options.transport.clone(),
            Arc::clone(&shared.events),
        );
        // The pointer socket is re-requested after every registration
        let input = Transport::new(
            "lg-pointer",
            Arc::clone(&ctx.connector),
            TransportOptions {
                reconnect: ReconnectPolicy::disabled(),
                ..options.transport.clone()
            },
            Arc::clone(&shared.events),
        );
        let proxy = config
            .proxy_url()
            .map(|url| ProxyClient::new(ctx.http.clone(), url));

        Self {
            inner: Arc::new(LgInner {
                shared,
                config: Mutex::new(config),
                app_name: ctx.app_name.clone(),
                main,
                input,
                correlator: Correlator::new(),
                subscriptions: Mutex::new(HashMap::new()),
                apps: Mutex::new(Vec::new()),
                proxy,
                tasks: Mutex::new(LgTasks::default()),
                options,
            }),
        }
    }

    pub fn is_proxy_mode(&self) -> bool {
        self.inner.proxy.is_some()
    }

    async fn ensure_connected(&self) -> Result<()> {
        ensure_connected(self.inner.shared.connection().await)
    }
}

#[async_trait]
impl TvController for LgAdapter {
    fn kind(&self) -> TvKind {
        TvKind::Lg
    }

    async fn connect(&self) -> Result<()> {
        match &self.inner.proxy {
            Some(proxy) => self.inner.connect_proxy(proxy).await,
            None => self.inner.connect_direct().await,
        }
    }

    async fn disconnect(&self) {
        match &self.inner.proxy {
            Some(proxy) => self.inner.disconnect_proxy(proxy).await,
            None => self.inner.teardown_direct().await,
        }
    }

    async fn connection_state(&self) -> ConnectionState {
        self.inner.shared.connection().await
    }

    async fn events(&self) -> mpsc::UnboundedReceiver<TvEvent> {
        self.inner.shared.events.subscribe().await
    }

    async fn config(&self) -> ConnectionConfig {
        ConnectionConfig::Lg(self.inner.config.lock().await.clone())
    }

    async fn send_key(&self, key: RemoteKey) -> Result<()> {
        self.ensure_connected().await?;
        match &self.inner.proxy {
            Some(proxy) => {
                self.inner
                    .proxy_call(proxy, "command", json!({ "command": key.as_str() }))
                    .await?;
                Ok(())
            }
            None => self.inner.direct_key(key).await,
        }
    }

    async fn get_apps(&self) -> Result<Vec<AppInfo>> {
        self.ensure_connected().await?;
        let apps = match &self.inner.proxy {
            Some(proxy) => self.inner.proxy_apps(proxy).await,
            None => self.inner.direct_apps().await,
        };
        if !apps.is_empty() {
            *self.inner.apps.lock().await = apps.clone();
        }
        Ok(apps)
    }

    async fn launch_app(&self, app_id: &str, params: Option<Value>) -> Result<()> {
        self.ensure_connected().await?;
        match &self.inner.proxy {
            Some(proxy) => {
                self.inner
                    .proxy_call(proxy, "launch", json!({ "appId": app_id, "params": params }))
                    .await?;
            }
            None => {
                let mut payload = json!({ "id": app_id });
                if let Some(params) = params {
                    payload["params"] = params;
                }
                self.inner.ssap_request(ssap::URI_LAUNCH, Some(payload)).await?;
            }
        }
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.ensure_connected().await?;
        match &self.inner.proxy {
            Some(proxy) => {
                self.inner
                    .proxy_call(proxy, "text", json!({ "text": text }))
                    .await?;
            }
            None => {
                self.inner
                    .ssap_request(
                        ssap::URI_INSERT_TEXT,
                        Some(json!({ "text": text, "replace": false })),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn open_youtube(&self, video_id: &str) -> Result<()> {
        self.ensure_connected().await?;
        let target = format!("https://www.youtube.com/tv?v={}", video_id);
        match &self.inner.proxy {
            Some(proxy) => {
                self.inner
                    .proxy_call(
                        proxy,
                        "launch",
                        json!({
                            "appId": ssap::YOUTUBE_APP_ID,
                            "params": { "contentTarget": target },
                        }),
                    )
                    .await?;
            }
            None => {
                self.inner
                    .ssap_request(
                        ssap::URI_LAUNCH,
                        Some(json!({ "id": ssap::YOUTUBE_APP_ID, "contentTarget": target })),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn get_state(&self) -> Result<Option<TvState>> {
        Ok(Some(self.inner.shared.snapshot().await))
    }

    async fn get_inputs(&self) -> Result<Vec<InputSource>> {
        self.ensure_connected().await?;
        Ok(match &self.inner.proxy {
            Some(proxy) => self.inner.proxy_inputs(proxy).await,
            None => self.inner.direct_inputs().await,
        })
    }

    async fn switch_input(&self, input_id: &str) -> Result<()> {
        self.ensure_connected().await?;
        match &self.inner.proxy {
            Some(proxy) => {
                self.inner
                    .proxy_call(proxy, "switchInput", json!({ "inputId": input_id }))
                    .await?;
            }
            None => {
                self.inner
                    .ssap_request(ssap::URI_SWITCH_INPUT, Some(json!({ "inputId": input_id })))
                    .await?;
            }
        }
        Ok(())
    }

    async fn set_volume(&self, level: u8) -> Result<()> {
        self.ensure_connected().await?;
        let level = level.min(100);
        match &self.inner.proxy {
            Some(proxy) => {
                self.inner
                    .proxy_call(proxy, "volume", json!({ "volume": level }))
                    .await?;
            }
            None => {
                self.inner
                    .ssap_request(ssap::URI_SET_VOLUME, Some(json!({ "volume": level })))
                    .await?;
            }
        }
        self.inner
            .shared
            .update(TvStatePatch {
                volume: Some(i64::from(level)),
                ..Default::default()
            })
            .await;
        Ok(())
    }

    async fn repair(&self) -> Result<()> {
        match &self.inner.proxy {
            Some(proxy) => self.inner.repair_proxy(proxy).await,
            None => {
                self.inner.forget_client_key().await;
                self.inner.connect_direct().await
            }
        }
    }
}
