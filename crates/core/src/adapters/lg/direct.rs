//! Direct SSAP session: registration, subscriptions and the pointer socket

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ssap::{self, KeyRoute, Subscription};
use super::LgInner;
use crate::adapters::abort_task;
use crate::error::{RemoteError, Result};
use crate::transport::TransportEvent;
use crate::types::{AppInfo, ConnectionState, InputSource, RemoteKey, TvStatePatch, LG_SECURE_PORT};

impl LgInner {
    /// Try the plain endpoint, then the secure one, registering on each
    pub(super) async fn connect_direct(self: &Arc<Self>) -> Result<()> {
        self.teardown_direct().await;
        self.shared.set_connection(ConnectionState::Connecting).await;

        let (ip, port) = {
            let config = self.config.lock().await;
            (config.ip.clone(), config.port)
        };
        let endpoints = [
            format!("ws://{}:{}", ip, port),
            format!("wss://{}:{}", ip, LG_SECURE_PORT),
        ];

        let mut failures = Vec::new();
        let mut registration_failed = false;
        for url in &endpoints {
            self.shared.events.log(format!("Trying {}", url)).await;

            let (tx, rx) = mpsc::unbounded_channel();
            if let Err(e) = self.main.open(url, false, tx).await {
                failures.push(format!("{}: {}", url, e));
                continue;
            }
            {
                let mut tasks = self.tasks.lock().await;
                abort_task(&mut tasks.main_driver);
                tasks.main_driver = Some(tokio::spawn(Arc::clone(self).drive_main(rx)));
            }

            self.shared.set_connection(ConnectionState::Registering).await;
            match self.register().await {
                Ok(()) => {
                    self.on_registered().await;
                    return Ok(());
                }
                Err(e) => {
                    registration_failed = true;
                    self.shared
                        .events
                        .log(format!("Registration via {} failed: {}", url, e))
                        .await;
                    failures.push(format!("{}: {}", url, e));
                    self.correlator.reject_all().await;
                    self.main.close().await;
                    abort_task(&mut self.tasks.lock().await.main_driver);
                    self.shared
                        .update(TvStatePatch {
                            pairing_prompt: Some(false),
                            ..Default::default()
                        })
                        .await;
                }
            }
        }

        self.shared.set_connection(ConnectionState::Disconnected).await;
        let message = format!(
            "could not connect to LG TV at {} ({}). If the TV blocks direct connections, \
             configure a proxy backend URL to use proxy mode",
            ip,
            failures.join("; ")
        );
        self.shared.events.error(message.clone()).await;
        Err(if registration_failed {
            RemoteError::RegistrationFailed(message)
        } else {
            RemoteError::Transport(message)
        })
    }

    /// Cancel every task and pending request, then release both sockets
    pub(super) async fn teardown_direct(&self) {
        {
            let mut tasks = self.tasks.lock().await;
            abort_task(&mut tasks.setup);
            abort_task(&mut tasks.reregister);
        }
        let rejected = self.correlator.reject_all().await;
        if rejected > 0 {
            debug!("Rejected {} pending LG requests on teardown", rejected);
        }
        self.subscriptions.lock().await.clear();

        self.input.close().await;
        self.main.close().await;
        {
            let mut tasks = self.tasks.lock().await;
            abort_task(&mut tasks.input_driver);
            abort_task(&mut tasks.main_driver);
        }

        self.shared
            .update(TvStatePatch {
                input_socket_connected: Some(false),
                dpad_ready: Some(false),
                pairing_prompt: Some(false),
                ..Default::default()
            })
            .await;
        self.shared.mark_disconnected().await;
    }

    /// Registration handshake; may wait on the on-TV prompt
    async fn register(&self) -> Result<()> {
        let id = self.correlator.next_id("register").await;
        let client_key = self.config.lock().await.client_key.clone();
        self.shared
            .events
            .log(if client_key.is_some() {
                "Registering with stored pairing key"
            } else {
                "Registering; the TV may ask to allow this remote"
            })
            .await;

        let frame = ssap::register_frame(&id, &self.app_name, client_key.as_deref());
        let reply = self
            .correlator
            .request(&self.main, frame, self.options.register_timeout)
            .await
            .map_err(|e| match e {
                RemoteError::Rejected(reason) => RemoteError::RegistrationFailed(reason),
                other => other,
            })?;

        match reply.get("type").and_then(Value::as_str) {
            Some("registered") => {}
            other => {
                return Err(RemoteError::RegistrationFailed(format!(
                    "unexpected reply type {:?}",
                    other
                )))
            }
        }

        self.adopt_client_key(ssap::issued_client_key(&reply)).await;
        self.shared
            .update(TvStatePatch {
                pairing_prompt: Some(false),
                ..Default::default()
            })
            .await;
        Ok(())
    }

    /// Registered: report connected and start the follow-up setup
    async fn on_registered(self: &Arc<Self>) {
        self.main.set_auto_reconnect(true).await;
        self.shared.mark_connected().await;
        self.shared.events.log("Registered with TV").await;

        let setup = tokio::spawn(Arc::clone(self).setup());
        let mut tasks = self.tasks.lock().await;
        abort_task(&mut tasks.setup);
        tasks.setup = Some(setup);
    }

    async fn setup(self: Arc<Self>) {
        let subscribe_all = async {
            for subscription in Subscription::ALL {
                self.subscribe(subscription).await;
            }
        };
        let (_, pointer) = tokio::join!(subscribe_all, self.open_pointer_socket());
        if let Err(e) = pointer {
            self.shared
                .events
                .log(format!("Pointer input unavailable: {}", e))
                .await;
        }
    }

    async fn subscribe(&self, subscription: Subscription) {
        let id = self.correlator.next_id("sub").await;
        // Recorded before sending so the first event is attributed
        self.subscriptions
            .lock()
            .await
            .insert(id.clone(), subscription);

        let frame = ssap::subscribe_frame(&id, subscription.uri());
        if let Err(e) = self
            .correlator
            .request(&self.main, frame, self.options.request_timeout)
            .await
        {
            self.subscriptions.lock().await.remove(&id);
            self.shared
                .events
                .log(format!("Subscription to {} failed: {}", subscription.uri(), e))
                .await;
        }
    }

    async fn open_pointer_socket(self: &Arc<Self>) -> Result<()> {
        let reply = self.ssap_request(ssap::URI_POINTER_SOCKET, None).await?;
        let socket_path = reply
            .get("socketPath")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Rejected("pointer socket reply has no socketPath".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.input.open(socket_path, false, tx).await?;
        {
            let mut tasks = self.tasks.lock().await;
            abort_task(&mut tasks.input_driver);
            tasks.input_driver = Some(tokio::spawn(Arc::clone(self).drive_input(rx)));
        }

        self.shared
            .update(TvStatePatch {
                input_socket_connected: Some(true),
                dpad_ready: Some(true),
                ..Default::default()
            })
            .await;
        self.shared.events.log("Pointer input socket ready").await;
        Ok(())
    }

    async fn drive_main(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::Message(frame) => self.handle_frame(frame).await,
                TransportEvent::Closed => self.on_main_closed().await,
                TransportEvent::Reconnecting { .. } => {
                    self.shared
                        .set_connection(ConnectionState::Reconnecting)
                        .await;
                }
                TransportEvent::Reopened => {
                    let task = tokio::spawn(Arc::clone(&self).reregister());
                    let mut tasks = self.tasks.lock().await;
                    abort_task(&mut tasks.reregister);
                    tasks.reregister = Some(task);
                }
                TransportEvent::GaveUp => {
                    self.shared.set_connection(ConnectionState::Disconnected).await;
                }
            }
        }
    }

    /// Everything tied to the lost connection is invalid now
    async fn on_main_closed(&self) {
        {
            let mut tasks = self.tasks.lock().await;
            abort_task(&mut tasks.setup);
            abort_task(&mut tasks.reregister);
            abort_task(&mut tasks.input_driver);
        }
        self.correlator.reject_all().await;
        self.subscriptions.lock().await.clear();
        self.input.close().await;
        self.shared
            .update(TvStatePatch {
                input_socket_connected: Some(false),
                dpad_ready: Some(false),
                ..Default::default()
            })
            .await;
        self.shared.mark_disconnected().await;
    }

    /// Link came back by itself; pairing is per connection
    async fn reregister(self: Arc<Self>) {
        self.shared.set_connection(ConnectionState::Registering).await;
        match self.register().await {
            Ok(()) => self.on_registered().await,
            Err(e) => {
                warn!("LG re-registration failed: {}", e);
                self.shared
                    .events
                    .error(format!("Re-registration after reconnect failed: {}", e))
                    .await;
                self.correlator.reject_all().await;
                self.main.close().await;
                self.shared.set_connection(ConnectionState::Disconnected).await;
            }
        }
    }

    async fn drive_input(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            if event == TransportEvent::Closed {
                self.shared
                    .update(TvStatePatch {
                        input_socket_connected: Some(false),
                        dpad_ready: Some(false),
                        ..Default::default()
                    })
                    .await;
                self.shared.events.log("Pointer input socket closed").await;
            }
        }
    }

    async fn handle_frame(&self, frame: Value) {
        let Some(id) = frame.get("id").and_then(Value::as_str).map(str::to_string) else {
            debug!("Ignoring SSAP frame without id");
            return;
        };

        if ssap::is_pairing_prompt(&frame) {
            self.shared
                .update(TvStatePatch {
                    pairing_prompt: Some(true),
                    ..Default::default()
                })
                .await;
            self.shared
                .events
                .log("Pairing prompt shown on the TV; waiting for the user to accept")
                .await;
            return;
        }

        if frame.get("type").and_then(Value::as_str) == Some("error") {
            let reason = frame
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            if !self
                .correlator
                .reject(&id, RemoteError::Rejected(reason.clone()))
                .await
            {
                self.shared
                    .events
                    .error(format!("TV error for {}: {}", id, reason))
                    .await;
            }
            return;
        }

        let subscription = self.subscriptions.lock().await.get(&id).copied();
        if let (Some(subscription), Some(payload)) = (subscription, frame.get("payload")) {
            self.apply_subscription(subscription, payload).await;
        }
        self.correlator.resolve(&id, frame).await;
    }

    async fn apply_subscription(&self, subscription: Subscription, payload: &Value) {
        let patch = match subscription {
            Subscription::Volume => {
                let status = payload.get("volumeStatus").unwrap_or(payload);
                TvStatePatch {
                    volume: status.get("volume").and_then(Value::as_i64),
                    muted: ["muted", "mute", "muteStatus"]
                        .iter()
                        .find_map(|k| status.get(*k).and_then(Value::as_bool)),
                    ..Default::default()
                }
            }
            Subscription::ForegroundApp => {
                // An empty appId means nothing is in the foreground
                let reported = payload.get("appId").and_then(Value::as_str);
                let app = reported.filter(|id| !id.is_empty());
                let app_name = match app {
                    Some(id) => Some(self.app_name_for(id).await.unwrap_or_default()),
                    None => reported.map(|_| String::new()),
                };
                TvStatePatch {
                    power: app.map(|_| true),
                    app: reported.map(str::to_string),
                    app_name,
                    ..Default::default()
                }
            }
            Subscription::Channel => TvStatePatch {
                source: ["channelName", "channelNumber"]
                    .iter()
                    .find_map(|k| payload.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
                ..Default::default()
            },
        };
        self.shared.update(patch).await;
    }

    /// Correlated request on the main channel, returning the reply payload
    pub(super) async fn ssap_request(&self, uri: &str, payload: Option<Value>) -> Result<Value> {
        let id = self.correlator.next_id("req").await;
        let reply = self
            .correlator
            .request(
                &self.main,
                ssap::request_frame(&id, uri, payload),
                self.options.request_timeout,
            )
            .await?;

        let payload = reply.get("payload").cloned().unwrap_or(Value::Null);
        if payload.get("returnValue").and_then(Value::as_bool) == Some(false) {
            let reason = payload
                .get("errorText")
                .and_then(Value::as_str)
                .unwrap_or("request failed");
            return Err(RemoteError::Rejected(format!("{}: {}", uri, reason)));
        }
        Ok(payload)
    }

    async fn pointer_ready(&self) -> bool {
        self.shared.snapshot().await.dpad_ready && self.input.is_open().await
    }

    pub(super) async fn direct_key(&self, key: RemoteKey) -> Result<()> {
        match ssap::key_route(key) {
            KeyRoute::Uri(uri) => self.ssap_request(uri, None).await.map(|_| ()),
            KeyRoute::ToggleMute => {
                let mute = !self.shared.snapshot().await.muted;
                self.ssap_request(ssap::URI_SET_MUTE, Some(json!({ "mute": mute })))
                    .await?;
                self.shared
                    .update(TvStatePatch {
                        muted: Some(mute),
                        ..Default::default()
                    })
                    .await;
                Ok(())
            }
            KeyRoute::Pointer(button) => {
                if self.pointer_ready().await {
                    return self.input.send_raw(ssap::pointer_button(button)).await;
                }
                if key == RemoteKey::Home {
                    return self
                        .ssap_request(ssap::URI_LAUNCH, Some(json!({ "id": ssap::HOME_APP_ID })))
                        .await
                        .map(|_| ());
                }
                Err(RemoteError::Unsupported(format!(
                    "{} needs the pointer input socket, which is not connected",
                    key
                )))
            }
        }
    }

    pub(super) async fn direct_apps(&self) -> Vec<AppInfo> {
        match self.ssap_request(ssap::URI_LAUNCH_POINTS, None).await {
            Ok(payload) => payload
                .get("launchPoints")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(AppInfo::from_json).collect())
                .unwrap_or_default(),
            Err(e) => {
                self.shared
                    .events
                    .log(format!("App discovery failed: {}", e))
                    .await;
                Vec::new()
            }
        }
    }

    pub(super) async fn direct_inputs(&self) -> Vec<InputSource> {
        match self.ssap_request(ssap::URI_INPUT_LIST, None).await {
            Ok(payload) => payload
                .get("devices")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(InputSource::from_json).collect())
                .unwrap_or_default(),
            Err(e) => {
                self.shared
                    .events
                    .log(format!("Input discovery failed: {}", e))
                    .await;
                Vec::new()
            }
        }
    }
}
