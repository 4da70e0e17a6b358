//! Proxy mode: a trusted backend talks SSAP to the TV for us
//!
//! Contract: `POST <base>` with `{action, ...params}` answers `{error}` on
//! failure or an action-specific body; `GET <base>` answers the backend's
//! view of the TV for polling.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::LgInner;
use crate::adapters::abort_task;
use crate::error::{RemoteError, Result};
use crate::types::{AppInfo, ConnectionState, InputSource, TvStatePatch};

/// Backend state as returned by the polling GET
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyStatus {
    pub connected: bool,
    /// `Some(false)` means the backend lost its pairing with the TV
    pub registered: Option<bool>,
    pub state: Option<Value>,
    pub input_socket_connected: bool,
    pub dpad_ready: bool,
    pub ha_fallback: bool,
}

impl ProxyStatus {
    /// State update carried by this poll
    pub fn patch(&self) -> TvStatePatch {
        let mut patch: TvStatePatch = self
            .state
            .clone()
            .and_then(|state| serde_json::from_value(state).ok())
            .unwrap_or_default();
        patch.input_socket_connected = Some(self.input_socket_connected);
        patch.dpad_ready = Some(self.dpad_ready);
        patch.ha_fallback = Some(self.ha_fallback);
        patch
    }
}

/// REST client for the proxy backend
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one backend action
    pub async fn call(&self, action: &str, params: Value, timeout: Duration) -> Result<Value> {
        let mut body = json!({ "action": action });
        if let (Some(body), Value::Object(params)) = (body.as_object_mut(), params) {
            body.extend(params);
        }
        debug!("proxy -> {}", body);

        let response = self
            .http
            .post(&self.base_url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Proxy(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Proxy(format!("{} response unreadable: {}", action, e)))?;
        let reply: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if let Some(error) = reply.get("error").and_then(Value::as_str) {
            return Err(RemoteError::Proxy(format!("{}: {}", action, error)));
        }
        if !status.is_success() {
            return Err(RemoteError::Proxy(format!(
                "{} returned HTTP {}",
                action, status
            )));
        }
        Ok(reply)
    }

    /// Poll the backend's view of the TV
    pub async fn status(&self, timeout: Duration) -> Result<ProxyStatus> {
        let response = self
            .http
            .get(&self.base_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RemoteError::Proxy(format!("status request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(RemoteError::Proxy(format!(
                "status returned HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| RemoteError::Proxy(format!("status body unreadable: {}", e)))
    }
}

/// Key in a backend reply, under whichever name the backend used
fn issued_key(reply: &Value) -> Option<String> {
    ["clientKey", "client-key", "client_key"]
        .iter()
        .find_map(|k| reply.get(*k).and_then(Value::as_str))
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// List under `field`, or the reply itself when it is a bare array
fn list_field<'a>(reply: &'a Value, field: &str) -> &'a [Value] {
    reply
        .get(field)
        .and_then(Value::as_array)
        .or_else(|| reply.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

impl LgInner {
    async fn connect_params(&self) -> Value {
        let config = self.config.lock().await;
        json!({
            "ip": config.ip,
            "port": config.port,
            "clientKey": config.client_key,
            "remoteEntityId": config.remote_entity_id,
        })
    }

    pub(super) async fn connect_proxy(self: &Arc<Self>, proxy: &ProxyClient) -> Result<()> {
        self.stop_polling().await;
        self.shared.set_connection(ConnectionState::Connecting).await;
        self.shared
            .events
            .log(format!("Connecting through proxy {}", proxy.base_url()))
            .await;

        let params = self.connect_params().await;
        let result = proxy
            .call("connect", params, self.options.register_timeout)
            .await
            .and_then(|reply| {
                if reply.get("success").and_then(Value::as_bool) == Some(false) {
                    Err(RemoteError::RegistrationFailed(
                        "proxy backend could not register with the TV".into(),
                    ))
                } else {
                    Ok(reply)
                }
            });

        match result {
            Ok(reply) => {
                self.adopt_client_key(issued_key(&reply)).await;
                self.shared.mark_connected().await;
                self.shared.events.log("Connected through proxy").await;
                self.start_polling().await;
                Ok(())
            }
            Err(e) => {
                self.shared.set_connection(ConnectionState::Disconnected).await;
                self.shared
                    .events
                    .error(format!("Proxy connect failed: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    pub(super) async fn disconnect_proxy(&self, proxy: &ProxyClient) {
        self.stop_polling().await;
        if self.shared.connection().await != ConnectionState::Disconnected {
            if let Err(e) = proxy
                .call("disconnect", json!({}), self.options.request_timeout)
                .await
            {
                debug!("Proxy disconnect failed: {}", e);
            }
        }
        self.shared.mark_disconnected().await;
    }

    pub(super) async fn proxy_call(
        &self,
        proxy: &ProxyClient,
        action: &str,
        params: Value,
    ) -> Result<Value> {
        proxy.call(action, params, self.options.request_timeout).await
    }

    pub(super) async fn proxy_apps(&self, proxy: &ProxyClient) -> Vec<AppInfo> {
        match self.proxy_call(proxy, "apps", json!({})).await {
            Ok(reply) => list_field(&reply, "apps")
                .iter()
                .filter_map(AppInfo::from_json)
                .collect(),
            Err(e) => {
                warn!("Proxy app discovery failed: {}", e);
                self.shared
                    .events
                    .log(format!("App discovery failed: {}", e))
                    .await;
                Vec::new()
            }
        }
    }

    pub(super) async fn proxy_inputs(&self, proxy: &ProxyClient) -> Vec<InputSource> {
        match self.proxy_call(proxy, "inputs", json!({})).await {
            Ok(reply) => {
                let list = match list_field(&reply, "inputs") {
                    [] => list_field(&reply, "devices"),
                    list => list,
                };
                list.iter().filter_map(InputSource::from_json).collect()
            }
            Err(e) => {
                warn!("Proxy input discovery failed: {}", e);
                self.shared
                    .events
                    .log(format!("Input discovery failed: {}", e))
                    .await;
                Vec::new()
            }
        }
    }

    /// Redo pairing through the backend with polling paused
    ///
    /// A poll during the window would see the transient unregistered state
    /// and report a disconnect.
    pub(super) async fn repair_proxy(self: &Arc<Self>, proxy: &ProxyClient) -> Result<()> {
        self.stop_polling().await;
        self.forget_client_key().await;
        self.shared
            .events
            .log("Re-pairing through proxy; accept the prompt on the TV")
            .await;

        let params = self.connect_params().await;
        let result = proxy
            .call("repaire", params, self.options.register_timeout)
            .await;

        match result {
            Ok(reply) => {
                self.adopt_client_key(issued_key(&reply)).await;
                if self.shared.connection().await != ConnectionState::Connected {
                    self.shared.mark_connected().await;
                }
                self.shared.events.log("Re-paired through proxy").await;
                self.start_polling().await;
                Ok(())
            }
            Err(e) => {
                self.shared
                    .events
                    .error(format!("Re-pair failed: {}", e))
                    .await;
                if self.shared.connection().await == ConnectionState::Connected {
                    self.start_polling().await;
                }
                Err(e)
            }
        }
    }

    async fn start_polling(self: &Arc<Self>) {
        let poller = tokio::spawn(Arc::clone(self).poll());
        let mut tasks = self.tasks.lock().await;
        abort_task(&mut tasks.poller);
        tasks.poller = Some(poller);
    }

    async fn stop_polling(&self) {
        abort_task(&mut self.tasks.lock().await.poller);
    }

    async fn poll(self: Arc<Self>) {
        let Some(proxy) = self.proxy.clone() else {
            return;
        };
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick is immediate; connect just refreshed everything
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match proxy.status(self.options.request_timeout).await {
                Ok(status) if status.registered == Some(false) => {
                    self.shared
                        .events
                        .log("Proxy lost its registration with the TV")
                        .await;
                    self.shared.mark_disconnected().await;
                    return;
                }
                Ok(status) => self.shared.update(status.patch()).await,
                Err(e) => debug!("State poll failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_patch_merges_backend_flags() {
        let status: ProxyStatus = serde_json::from_value(json!({
            "connected": true,
            "registered": true,
            "state": { "power": true, "volume": 14, "app": "netflix", "unknownField": 1 },
            "inputSocketConnected": true,
            "dpadReady": false,
            "haFallback": true
        }))
        .unwrap();

        let patch = status.patch();
        assert_eq!(patch.power, Some(true));
        assert_eq!(patch.volume, Some(14));
        assert_eq!(patch.app.as_deref(), Some("netflix"));
        assert_eq!(patch.input_socket_connected, Some(true));
        assert_eq!(patch.dpad_ready, Some(false));
        assert_eq!(patch.ha_fallback, Some(true));
    }

    #[test]
    fn test_status_defaults_when_fields_missing() {
        let status: ProxyStatus = serde_json::from_value(json!({})).unwrap();
        assert_eq!(status.registered, None);
        assert!(!status.connected);
        assert_eq!(status.patch().power, None);
    }

    #[test]
    fn test_issued_key_names() {
        assert_eq!(issued_key(&json!({ "clientKey": "a" })), Some("a".into()));
        assert_eq!(issued_key(&json!({ "client-key": "b" })), Some("b".into()));
        assert_eq!(issued_key(&json!({ "clientKey": "" })), None);
        assert_eq!(issued_key(&json!({ "success": true })), None);
    }

    #[test]
    fn test_list_field_accepts_bare_arrays() {
        let wrapped = json!({ "apps": [{ "id": "netflix" }] });
        assert_eq!(list_field(&wrapped, "apps").len(), 1);
        let bare = json!([{ "id": "a" }, { "id": "b" }]);
        assert_eq!(list_field(&bare, "apps").len(), 2);
        assert!(list_field(&json!({ "ok": true }), "apps").is_empty());
    }
}
