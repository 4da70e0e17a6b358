//! LG WebOS direct mode against a scripted TV

mod common;

use common::{is_state, mock_ctx, no_reconnect, wait_for, FakeLg, POINTER_PATH};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tvlink_core::adapters::lg::{ssap, LgAdapter, LgOptions};
use tvlink_core::store::{ConfigStore, MemoryStore};
use tvlink_core::transport::mock::MockConnector;
use tvlink_core::transport::{ReconnectPolicy, TransportOptions};
use tvlink_core::{
    ConnectionConfig, ConnectionState, LgConfig, RemoteError, TvController, TvEvent, TvKind,
};

fn lg_config(client_key: Option<&str>) -> LgConfig {
    LgConfig {
        client_key: client_key.map(str::to_string),
        ..LgConfig::new("10.0.0.7")
    }
}

fn options() -> LgOptions {
    LgOptions {
        transport: no_reconnect(),
        ..Default::default()
    }
}

/// Connect against a fake TV; returns the adapter and the main-channel frame log
async fn connected(
    fake: FakeLg,
    store: Option<Arc<MemoryStore>>,
    client_key: Option<&str>,
) -> (
    Arc<LgAdapter>,
    Arc<MockConnector>,
    tokio::sync::mpsc::UnboundedReceiver<serde_json::Value>,
) {
    let connector = MockConnector::new();
    let mut ctx = mock_ctx(connector.clone());
    if let Some(store) = store {
        ctx = ctx.with_store(store);
    }
    let tv = Arc::new(LgAdapter::with_options(lg_config(client_key), &ctx, options()));

    let pending = {
        let tv = Arc::clone(&tv);
        tokio::spawn(async move { tv.connect().await })
    };
    let seen = fake.serve(connector.next_remote().await);
    pending.await.unwrap().unwrap();
    (tv, connector, seen)
}

#[tokio::test]
async fn test_connected_only_after_registration() {
    let connector = MockConnector::new();
    let tv = Arc::new(LgAdapter::with_options(
        lg_config(None),
        &mock_ctx(connector.clone()),
        options(),
    ));
    let mut events = tv.events().await;

    let pending = {
        let tv = Arc::clone(&tv);
        tokio::spawn(async move { tv.connect().await })
    };
    let mut remote = connector.next_remote().await;
    assert_eq!(remote.url, "ws://10.0.0.7:3000");

    let register = remote.recv_json().await.unwrap();
    assert_eq!(register["type"], "register");
    assert!(register["payload"].get("client-key").is_none());
    assert_eq!(tv.connection_state().await, ConnectionState::Registering);

    remote.send_json(&json!({
        "id": register["id"], "type": "response",
        "payload": { "pairingType": "PROMPT", "returnValue": true }
    }));
    wait_for(&mut events, |e| is_state(e, |p| p.pairing_prompt == Some(true))).await;
    assert_eq!(tv.connection_state().await, ConnectionState::Registering);
    while let Ok(event) = events.try_recv() {
        assert_ne!(event, TvEvent::Connected);
    }

    remote.send_json(&json!({
        "id": register["id"], "type": "registered",
        "payload": { "client-key": "k-1" }
    }));
    pending.await.unwrap().unwrap();

    wait_for(&mut events, |e| *e == TvEvent::Connected).await;
    assert_eq!(tv.connection_state().await, ConnectionState::Connected);
    assert!(!tv.get_state().await.unwrap().unwrap().pairing_prompt);
}

#[tokio::test]
async fn test_issued_key_replaces_stored_key_and_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let (tv, _connector, _seen) =
        connected(FakeLg::issuing("new-key"), Some(store.clone()), Some("old-key")).await;

    assert_eq!(
        tv.config().await,
        ConnectionConfig::Lg(lg_config(Some("new-key")))
    );
    assert_eq!(store.blob(TvKind::Lg).unwrap()["clientKey"], "new-key");
    tv.disconnect().await;
}

#[tokio::test]
async fn test_reply_without_key_keeps_stored_key() {
    let store = Arc::new(MemoryStore::new());
    let (tv, _connector, mut seen) =
        connected(FakeLg::default(), Some(store.clone()), Some("old-key")).await;

    let register = seen.recv().await.unwrap();
    assert_eq!(register["payload"]["client-key"], "old-key");
    assert_eq!(
        tv.config().await,
        ConnectionConfig::Lg(lg_config(Some("old-key")))
    );
    assert!(store.load(TvKind::Lg).unwrap().is_none());
    tv.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_registration_timeout_discards_late_reply() {
    let connector = MockConnector::new();
    connector.refuse("wss://");
    let tv = Arc::new(LgAdapter::with_options(
        lg_config(None),
        &mock_ctx(connector.clone()),
        options(),
    ));

    let pending = {
        let tv = Arc::clone(&tv);
        tokio::spawn(async move { tv.connect().await })
    };
    let mut remote = connector.next_remote().await;
    let register = remote.recv_json().await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    match pending.await.unwrap() {
        Err(RemoteError::RegistrationFailed(message)) => {
            assert!(message.contains("timed out after 30000ms"), "{}", message);
            assert!(message.contains("proxy"), "{}", message);
        }
        other => panic!("expected RegistrationFailed, got {:?}", other),
    }

    // One second too late
    remote.send_json(&json!({
        "id": register["id"], "type": "registered",
        "payload": { "client-key": "late-key" }
    }));
    tokio::task::yield_now().await;

    assert_eq!(tv.connection_state().await, ConnectionState::Disconnected);
    assert_eq!(tv.config().await, ConnectionConfig::Lg(lg_config(None)));
    assert_eq!(
        connector.opened(),
        vec!["ws://10.0.0.7:3000".to_string(), "wss://10.0.0.7:3001".to_string()]
    );
}

#[tokio::test]
async fn test_both_endpoints_unreachable() {
    let connector = MockConnector::new();
    connector.refuse("ws");
    let tv = LgAdapter::with_options(lg_config(None), &mock_ctx(connector.clone()), options());

    match tv.connect().await {
        Err(RemoteError::Transport(message)) => {
            assert!(message.contains("ws://10.0.0.7:3000"));
            assert!(message.contains("wss://10.0.0.7:3001"));
            assert!(message.contains("proxy mode"));
        }
        other => panic!("expected Transport error, got {:?}", other),
    }
    assert_eq!(tv.connection_state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_subscriptions_update_state() {
    let (tv, _connector, _seen) = connected(FakeLg::default(), None, None).await;
    let mut events = tv.events().await;

    // Subscriptions may already have landed before we subscribed
    loop {
        let state = tv.get_state().await.unwrap().unwrap();
        if state.volume.is_some() && state.app.is_some() && state.source.is_some() {
            assert_eq!(state.volume, Some(12));
            assert!(!state.muted);
            assert_eq!(state.app.as_deref(), Some("netflix"));
            assert_eq!(state.source.as_deref(), Some("BBC One"));
            break;
        }
        wait_for(&mut events, |e| matches!(e, TvEvent::StateChanged(_))).await;
    }
    tv.disconnect().await;
}

#[tokio::test]
async fn test_leaving_app_clears_foreground() {
    let fake = FakeLg {
        foreground: vec!["netflix", ""],
        ..Default::default()
    };
    let (tv, _connector, _seen) = connected(fake, None, None).await;
    let mut events = tv.events().await;

    loop {
        let state = tv.get_state().await.unwrap().unwrap();
        // The channel subscription is answered after both app reports
        if state.source.is_some() {
            assert_eq!(state.app, None);
            assert_eq!(state.app_name, None);
            assert!(state.power);
            break;
        }
        wait_for(&mut events, |e| matches!(e, TvEvent::StateChanged(_))).await;
    }
    tv.disconnect().await;
}

#[tokio::test]
async fn test_dpad_uses_pointer_socket() {
    let (tv, connector, mut seen) = connected(FakeLg::default(), None, None).await;
    let mut pointer = connector.next_remote().await;
    assert_eq!(pointer.url, POINTER_PATH);

    let mut events = tv.events().await;
    if !tv.get_state().await.unwrap().unwrap().dpad_ready {
        wait_for(&mut events, |e| is_state(e, |p| p.dpad_ready == Some(true))).await;
    }

    tv.up().await.unwrap();
    tv.ok().await.unwrap();
    assert_eq!(pointer.recv_text().await.unwrap(), "type:button\nname:UP\n\n");
    assert_eq!(pointer.recv_text().await.unwrap(), "type:button\nname:ENTER\n\n");

    tv.volume_up().await.unwrap();
    loop {
        let frame = seen.recv().await.unwrap();
        if frame["uri"] == ssap::URI_VOLUME_UP {
            assert_eq!(frame["type"], "request");
            break;
        }
    }
    tv.disconnect().await;
}

#[tokio::test]
async fn test_pointer_close_clears_dpad_flags() {
    let (tv, connector, _seen) = connected(FakeLg::default(), None, None).await;
    let pointer = connector.next_remote().await;
    let mut events = tv.events().await;
    if !tv.get_state().await.unwrap().unwrap().dpad_ready {
        wait_for(&mut events, |e| is_state(e, |p| p.dpad_ready == Some(true))).await;
    }

    drop(pointer);
    wait_for(&mut events, |e| is_state(e, |p| p.dpad_ready == Some(false))).await;
    let state = tv.get_state().await.unwrap().unwrap();
    assert!(!state.input_socket_connected);
    assert!(matches!(tv.left().await, Err(RemoteError::Unsupported(_))));
    assert_eq!(tv.connection_state().await, ConnectionState::Connected);
    tv.disconnect().await;
}

#[tokio::test]
async fn test_home_falls_back_to_launcher_without_pointer() {
    let fake = FakeLg {
        no_pointer: true,
        ..Default::default()
    };
    let (tv, _connector, mut seen) = connected(fake, None, None).await;

    tv.home().await.unwrap();
    loop {
        let frame = seen.recv().await.unwrap();
        if frame["uri"] == ssap::URI_LAUNCH {
            assert_eq!(frame["payload"]["id"], ssap::HOME_APP_ID);
            break;
        }
    }
    assert!(matches!(tv.down().await, Err(RemoteError::Unsupported(_))));
    tv.disconnect().await;
}

#[tokio::test]
async fn test_mute_toggles_from_known_state() {
    let (tv, _connector, mut seen) = connected(FakeLg::default(), None, None).await;
    let mut events = tv.events().await;
    if tv.get_state().await.unwrap().unwrap().volume.is_none() {
        wait_for(&mut events, |e| is_state(e, |p| p.volume.is_some())).await;
    }

    tv.mute().await.unwrap();
    tv.mute().await.unwrap();
    let mut mutes = Vec::new();
    while mutes.len() < 2 {
        let frame = seen.recv().await.unwrap();
        if frame["uri"] == ssap::URI_SET_MUTE {
            mutes.push(frame["payload"]["mute"].as_bool().unwrap());
        }
    }
    assert_eq!(mutes, vec![true, false]);
    tv.disconnect().await;
}

#[tokio::test]
async fn test_unknown_command_sends_nothing() {
    let (tv, _connector, mut seen) = connected(FakeLg::default(), None, None).await;

    let result = tv.send_command("RAINBOW").await;
    assert!(matches!(result, Err(RemoteError::UnknownCommand(_))));

    // The next request on the wire is the marker, nothing in between
    tv.channel_up().await.unwrap();
    loop {
        let frame = seen.recv().await.unwrap();
        if frame["type"] == "request" && frame["uri"] != ssap::URI_POINTER_SOCKET {
            assert_eq!(frame["uri"], ssap::URI_CHANNEL_UP);
            break;
        }
    }
    tv.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_rejects_in_flight_requests() {
    let fake = FakeLg {
        silent_uris: vec![ssap::URI_LAUNCH],
        ..Default::default()
    };
    let (tv, _connector, mut seen) = connected(fake, None, None).await;

    let launch = {
        let tv = Arc::clone(&tv);
        tokio::spawn(async move { tv.launch_app("netflix", None).await })
    };
    loop {
        if seen.recv().await.unwrap()["uri"] == ssap::URI_LAUNCH {
            break;
        }
    }

    tv.disconnect().await;
    assert!(matches!(launch.await.unwrap(), Err(RemoteError::Disconnected)));
    assert!(matches!(tv.power().await, Err(RemoteError::NotConnected)));
}

#[tokio::test]
async fn test_apps_inputs_and_switch() {
    let (tv, _connector, mut seen) = connected(FakeLg::default(), None, None).await;

    // The fake answers list requests without data
    assert!(tv.get_apps().await.unwrap().is_empty());
    assert!(tv.get_inputs().await.unwrap().is_empty());

    tv.switch_input("HDMI_2").await.unwrap();
    tv.set_volume(30).await.unwrap();
    tv.open_youtube("abc123").await.unwrap();

    let mut wanted = vec![ssap::URI_SWITCH_INPUT, ssap::URI_SET_VOLUME, ssap::URI_LAUNCH];
    while !wanted.is_empty() {
        let frame = seen.recv().await.unwrap();
        let uri = frame["uri"].as_str().unwrap_or_default().to_string();
        if uri == ssap::URI_SWITCH_INPUT {
            assert_eq!(frame["payload"]["inputId"], "HDMI_2");
        }
        if uri == ssap::URI_SET_VOLUME {
            assert_eq!(frame["payload"]["volume"], 30);
        }
        if uri == ssap::URI_LAUNCH {
            assert_eq!(frame["payload"]["id"], ssap::YOUTUBE_APP_ID);
            assert_eq!(
                frame["payload"]["contentTarget"],
                "https://www.youtube.com/tv?v=abc123"
            );
        }
        wanted.retain(|w| *w != uri);
    }
    assert_eq!(tv.get_state().await.unwrap().unwrap().volume, Some(30));
    tv.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_registers_again() {
    let connector = MockConnector::new();
    let options = LgOptions {
        transport: TransportOptions {
            reconnect: ReconnectPolicy::new(Duration::from_secs(3), 5),
            ..Default::default()
        },
        ..Default::default()
    };
    let tv = Arc::new(LgAdapter::with_options(
        lg_config(None),
        &mock_ctx(connector.clone()),
        options,
    ));
    let mut events = tv.events().await;

    let pending = {
        let tv = Arc::clone(&tv);
        tokio::spawn(async move { tv.connect().await })
    };
    let mut first = connector.next_remote().await;
    let register = first.recv_json().await.unwrap();
    first.send_json(&json!({
        "id": register["id"], "type": "registered",
        "payload": { "client-key": "k-1" }
    }));
    pending.await.unwrap().unwrap();
    wait_for(&mut events, |e| *e == TvEvent::Connected).await;

    // TV drops the link; the transport comes back on its own
    drop(first);
    wait_for(&mut events, |e| *e == TvEvent::Disconnected).await;

    let mut second = connector.next_remote().await;
    assert_eq!(second.url, "ws://10.0.0.7:3000");
    let register = second.recv_json().await.unwrap();
    assert_eq!(register["type"], "register");
    assert_eq!(register["payload"]["client-key"], "k-1");
    assert_eq!(tv.connection_state().await, ConnectionState::Registering);

    second.send_json(&json!({ "id": register["id"], "type": "registered", "payload": {} }));
    wait_for(&mut events, |e| *e == TvEvent::Connected).await;
    assert_eq!(tv.connection_state().await, ConnectionState::Connected);
    tv.disconnect().await;
}
