//! Multi-device sync scenarios.
//!
//! Each test wires real coordinators over loopback TCP (discovery
//! off, peers dialed directly) with mock relay links and cloud
//! stores, and drives the paths a real install exercises: LAN
//! fan-out, hub bridging to and from the wearable, and cross-path
//! session deduplication.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use sync_coordinator::{
    MemorySessionStore, MockCloudStore, SessionStore, StoreError, SyncCoordinator, SyncUpdate,
};
use sync_lan::{LanConfig, LocalPeerTransport};
use sync_relay::{MockRelayLink, RelayConfig, RelayTransport};
use sync_types::{
    unix_now_seconds, DeviceClass, DeviceId, DeviceRecord, Phase, SessionCompleteEvent, SessionId,
    StopReason, TimerStateMessage, WireMessage,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sync_coordinator=debug,sync_lan=debug")
        .try_init();
}

struct Device {
    coordinator: Arc<SyncCoordinator<MockRelayLink>>,
    updates: mpsc::Receiver<SyncUpdate>,
    cloud: MockCloudStore,
    sessions: MemorySessionStore,
    relay_link: MockRelayLink,
}

async fn device(class: DeviceClass, bridge: bool) -> Device {
    let local = DeviceRecord::new(DeviceId::random(), class);
    let lan_config = LanConfig {
        enable_discovery: false,
        ..Default::default()
    };
    let (lan, lan_events) = LocalPeerTransport::start(local, lan_config).await.unwrap();

    let relay_link = MockRelayLink::new();
    let (relay, relay_events) = RelayTransport::new(relay_link.clone(), RelayConfig::default());

    let cloud = MockCloudStore::new();
    let sessions = MemorySessionStore::new();

    let (coordinator, updates) = SyncCoordinator::start(
        local,
        lan,
        lan_events,
        relay,
        relay_events,
        Arc::new(cloud.clone()),
        Arc::new(sessions.clone()),
        bridge,
        Duration::from_millis(50),
    );
    Device {
        coordinator,
        updates,
        cloud,
        sessions,
        relay_link,
    }
}

fn work_snapshot(origin: DeviceRecord, elapsed: u64) -> TimerStateMessage {
    TimerStateMessage {
        origin: origin.id,
        origin_class: origin.class,
        phase: Phase::Work,
        mode_id: "classic-25".into(),
        elapsed_seconds: elapsed,
        remaining_seconds: Some(1500 - elapsed),
        total_seconds: Some(1500),
        is_running: true,
        emitted_at: unix_now_seconds(),
    }
}

fn completed_session(origin: DeviceRecord) -> SessionCompleteEvent {
    SessionCompleteEvent {
        session_id: SessionId::new(),
        mode_id: "classic-25".into(),
        mode_label: "Classic".into(),
        focus_seconds: 1500,
        focus_minutes: 25,
        stop_reason: StopReason::Completed,
        signals: vec!["manual".into()],
        session_date: "2026-08-29".into(),
        session_time: "16:20".into(),
        completed_at: unix_now_seconds(),
        origin: origin.id,
        origin_class: origin.class,
    }
}

async fn next_update(rx: &mut mpsc::Receiver<SyncUpdate>) -> SyncUpdate {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for sync update")
        .expect("update stream closed")
}

/// Poll until `check` holds or two seconds pass.
async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never happened: {what}");
}

async fn link(a: &Device, b: &Device) {
    a.coordinator.connect_peer(b.coordinator.lan_addr()).await.unwrap();
    // Give the accept side a moment to register the connection.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn desktop_change_appears_in_phone_view() {
    init_tracing();
    let p1 = device(DeviceClass::Desktop, false).await;
    let mut p2 = device(DeviceClass::Phone, false).await;
    link(&p2, &p1).await;

    let p1_record = p1.coordinator.local_record();
    p1.coordinator
        .publish_timer_state(work_snapshot(p1_record, 120))
        .await
        .unwrap();

    match next_update(&mut p2.updates).await {
        SyncUpdate::TimerUpdated { origin, state } => {
            assert_eq!(origin, p1_record.id);
            assert_eq!(state.phase, Phase::Work);
            assert_eq!(state.elapsed_seconds, 120);
            assert!(state.is_running);
        }
        other => panic!("expected timer update, got {other:?}"),
    }
    let merged = p2.coordinator.timer_for(p1_record.id).unwrap();
    assert_eq!(merged.elapsed_seconds, 120);

    p1.coordinator.stop();
    p2.coordinator.stop();
}

#[tokio::test]
async fn hub_bridges_desktop_state_to_wearable_with_origin_intact() {
    init_tracing();
    let desktop = device(DeviceClass::Desktop, false).await;
    let hub = device(DeviceClass::Phone, true).await;
    link(&hub, &desktop).await;

    let desktop_record = desktop.coordinator.local_record();
    desktop
        .coordinator
        .publish_timer_state(work_snapshot(desktop_record, 300))
        .await
        .unwrap();

    // The hub's relay link carries the snapshot onward.
    eventually("bridged snapshot on relay", || {
        !hub.relay_link.instant_sends().is_empty()
    })
    .await;

    let bridged = WireMessage::from_json_bytes(&hub.relay_link.instant_sends()[0]).unwrap();
    match bridged {
        WireMessage::TimerState(state) => {
            // Attributed to the desktop, not the bridging phone.
            assert_eq!(state.origin, desktop_record.id);
            assert_eq!(state.elapsed_seconds, 300);
        }
        other => panic!("expected timer state, got {other:?}"),
    }

    desktop.coordinator.stop();
    hub.coordinator.stop();
}

#[tokio::test]
async fn hub_bridges_wearable_state_to_lan_peers() {
    init_tracing();
    let mut desktop = device(DeviceClass::Desktop, false).await;
    let hub = device(DeviceClass::Phone, true).await;
    link(&hub, &desktop).await;

    // The wearable emits a snapshot through the hub's relay link.
    let wearable = DeviceRecord::new(DeviceId::random(), DeviceClass::Wearable);
    let snapshot = TimerStateMessage {
        origin: wearable.id,
        origin_class: wearable.class,
        phase: Phase::ShortBreak,
        mode_id: "classic-25".into(),
        elapsed_seconds: 0,
        remaining_seconds: Some(180),
        total_seconds: Some(300),
        is_running: true,
        emitted_at: unix_now_seconds(),
    };
    hub.relay_link.push_inbound(
        WireMessage::TimerState(snapshot).to_json_bytes().unwrap(),
        Some("wearable".into()),
    );

    // The desktop, which has no relay path, still sees it.
    match next_update(&mut desktop.updates).await {
        SyncUpdate::TimerUpdated { origin, state } => {
            assert_eq!(origin, wearable.id);
            assert_eq!(state.remaining_seconds, Some(180));
        }
        other => panic!("expected timer update, got {other:?}"),
    }

    desktop.coordinator.stop();
    hub.coordinator.stop();
}

#[tokio::test]
async fn non_hub_devices_do_not_bridge() {
    init_tracing();
    let desktop_a = device(DeviceClass::Desktop, false).await;
    let desktop_b = device(DeviceClass::Desktop, false).await;
    link(&desktop_b, &desktop_a).await;

    let a_record = desktop_a.coordinator.local_record();
    desktop_a
        .coordinator
        .publish_timer_state(work_snapshot(a_record, 30))
        .await
        .unwrap();

    eventually("merged on the peer", || {
        desktop_b.coordinator.timer_for(a_record.id).is_some()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // B applied the snapshot but did not forward it to its relay.
    assert!(desktop_b.relay_link.instant_sends().is_empty());
    assert!(desktop_b.relay_link.standing_context().is_none());

    desktop_a.coordinator.stop();
    desktop_b.coordinator.stop();
}

#[tokio::test]
async fn same_session_via_lan_and_cloud_lands_once() {
    init_tracing();
    let sender = device(DeviceClass::Desktop, false).await;
    let mut receiver = device(DeviceClass::Phone, false).await;
    link(&receiver, &sender).await;

    let event = completed_session(sender.coordinator.local_record());

    // Once over the LAN...
    sender
        .coordinator
        .publish_session_complete(event.clone())
        .await
        .unwrap();
    match next_update(&mut receiver.updates).await {
        SyncUpdate::SessionRecorded { session_id } => assert_eq!(session_id, event.session_id),
        other => panic!("expected session record, got {other:?}"),
    }

    // ...and again via the receiver's next cloud pull.
    receiver
        .cloud
        .seed(WireMessage::SessionComplete(event.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(receiver.sessions.len(), 1);
    assert!(receiver.sessions.contains(event.session_id));

    sender.coordinator.stop();
    receiver.coordinator.stop();
}

#[tokio::test]
async fn session_reaches_wearable_queue_via_hub() {
    init_tracing();
    let desktop = device(DeviceClass::Desktop, false).await;
    let hub = device(DeviceClass::Phone, true).await;
    link(&hub, &desktop).await;

    let event = completed_session(desktop.coordinator.local_record());
    desktop
        .coordinator
        .publish_session_complete(event.clone())
        .await
        .unwrap();

    eventually("session on the guaranteed queue", || {
        !hub.relay_link.guaranteed_queue().is_empty()
    })
    .await;

    let queued = WireMessage::from_json_bytes(&hub.relay_link.guaranteed_queue()[0]).unwrap();
    match queued {
        WireMessage::SessionComplete(bridged) => {
            assert_eq!(bridged.session_id, event.session_id);
            assert_eq!(bridged.origin, event.origin);
        }
        other => panic!("expected session event, got {other:?}"),
    }
    // The hub also materialized its own record.
    assert_eq!(hub.sessions.len(), 1);

    desktop.coordinator.stop();
    hub.coordinator.stop();
}

#[tokio::test]
async fn publishes_keep_flowing_when_cloud_is_down() {
    init_tracing();
    let p1 = device(DeviceClass::Desktop, false).await;
    let mut p2 = device(DeviceClass::Phone, false).await;
    link(&p2, &p1).await;

    p1.cloud.fail_next_push("offline");
    let p1_record = p1.coordinator.local_record();
    p1.coordinator
        .publish_timer_state(work_snapshot(p1_record, 45))
        .await
        .unwrap();

    // The LAN leg is unaffected by the dead cloud leg.
    match next_update(&mut p2.updates).await {
        SyncUpdate::TimerUpdated { origin, .. } => assert_eq!(origin, p1_record.id),
        other => panic!("expected timer update, got {other:?}"),
    }

    p1.coordinator.stop();
    p2.coordinator.stop();
}

/// A session store whose backend is down for every insert.
struct BrokenSessionStore;

#[async_trait::async_trait]
impl SessionStore for BrokenSessionStore {
    async fn insert_if_absent(&self, _event: &SessionCompleteEvent) -> Result<bool, StoreError> {
        Err(StoreError::Backend("history backend offline".into()))
    }
}

#[tokio::test]
async fn hub_with_broken_store_still_bridges_sessions() {
    init_tracing();
    let desktop = device(DeviceClass::Desktop, false).await;

    // A hub whose durable store fails on every insert.
    let local = DeviceRecord::new(DeviceId::random(), DeviceClass::Phone);
    let lan_config = LanConfig {
        enable_discovery: false,
        ..Default::default()
    };
    let (lan, lan_events) = LocalPeerTransport::start(local, lan_config).await.unwrap();
    let relay_link = MockRelayLink::new();
    let (relay, relay_events) = RelayTransport::new(relay_link.clone(), RelayConfig::default());
    let (hub, _updates) = SyncCoordinator::start(
        local,
        lan,
        lan_events,
        relay,
        relay_events,
        Arc::new(MockCloudStore::new()),
        Arc::new(BrokenSessionStore),
        true,
        Duration::from_millis(50),
    );
    hub.connect_peer(desktop.coordinator.lan_addr()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let event = completed_session(desktop.coordinator.local_record());
    desktop
        .coordinator
        .publish_session_complete(event.clone())
        .await
        .unwrap();

    // The wearable copy does not depend on the hub's own record.
    eventually("session on the guaranteed queue", || {
        !relay_link.guaranteed_queue().is_empty()
    })
    .await;
    let queued = WireMessage::from_json_bytes(&relay_link.guaranteed_queue()[0]).unwrap();
    match queued {
        WireMessage::SessionComplete(bridged) => assert_eq!(bridged.session_id, event.session_id),
        other => panic!("expected session event, got {other:?}"),
    }

    desktop.coordinator.stop();
    hub.stop();
}
