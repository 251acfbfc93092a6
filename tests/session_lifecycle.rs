//! End-to-end lifecycle scenarios driven through `CameraSession` with fakes.

use camstream::platform::VideoSink;
use camstream::store::{DeviceIdStore, LAST_DEVICE_ID_KEY};
use camstream::testing::{front_and_back, reported_facing_devices, FakeMediaDevices, FakeSink};
use camstream::types::{Capabilities, MediaDeviceInfo};
use camstream::{
    CameraError, CameraSession, DeviceEvent, Facing, MemoryStore, SessionConfig, SessionEvent,
    SessionState, Visibility,
};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

struct Fixture {
    media: Arc<FakeMediaDevices>,
    sink: Arc<FakeSink>,
    store: Arc<MemoryStore>,
    errors: Arc<Mutex<Vec<CameraError>>>,
    session: CameraSession,
}

fn fixture_with(config: SessionConfig, store: MemoryStore) -> Fixture {
    let media = Arc::new(FakeMediaDevices::with_devices(front_and_back()));
    let store = Arc::new(store);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let recorded = errors.clone();
    let session = CameraSession::builder(media.clone())
        .config(config)
        .store(store.clone())
        .on_error(move |e| recorded.lock().unwrap().push(e.clone()))
        .build();
    Fixture {
        media,
        sink: Arc::new(FakeSink::new()),
        store,
        errors,
        session,
    }
}

fn fixture() -> Fixture {
    fixture_with(SessionConfig::default(), MemoryStore::new())
}

fn states(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionState> {
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    states
}

#[tokio::test(start_paused = true)]
async fn test_auto_selects_first_device_and_mirrors_it() {
    let f = fixture();
    let mut events = f.session.events();

    f.session.attach_sink(f.sink.clone()).await;

    assert_eq!(f.session.selected_device().unwrap().id, "a");
    assert_eq!(f.session.selected_device().unwrap().facing, Facing::Front);
    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(states(&mut events), vec![SessionState::Starting, SessionState::Display]);
    assert!(f.session.is_mirrored());
    assert!(f.sink.is_mirrored());
    assert!(f.session.capabilities().is_some());
    assert_eq!(
        f.store.get(LAST_DEVICE_ID_KEY).unwrap().as_deref(),
        Some("a"),
        "auto-selection persists the id"
    );
}

#[tokio::test(start_paused = true)]
async fn test_persisted_device_is_preferred() {
    let f = fixture_with(SessionConfig::default(), MemoryStore::with_last_device("b"));
    assert_eq!(f.session.last_selected().as_deref(), Some("b"));

    f.session.attach_sink(f.sink.clone()).await;

    assert_eq!(f.session.selected_device().unwrap().id, "b");
    assert_eq!(f.session.state(), SessionState::Display);
    assert!(!f.sink.is_mirrored());
    assert_eq!(f.media.acquired_device_ids(), vec![Some("b".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_persisted_device_ignored_when_disabled() {
    let config = SessionConfig {
        use_last_device_id: false,
        ..SessionConfig::default()
    };
    let f = fixture_with(config, MemoryStore::with_last_device("b"));
    f.session.attach_sink(f.sink.clone()).await;
    assert_eq!(f.session.selected_device().unwrap().id, "a");
}

#[tokio::test(start_paused = true)]
async fn test_stale_persisted_device_falls_back_to_first() {
    let f = fixture_with(SessionConfig::default(), MemoryStore::with_last_device("gone"));
    f.session.attach_sink(f.sink.clone()).await;
    assert_eq!(f.session.selected_device().unwrap().id, "a");
}

#[tokio::test(start_paused = true)]
async fn test_no_auto_start_only_enumerates() {
    let config = SessionConfig {
        auto_start: false,
        ..SessionConfig::default()
    };
    let f = fixture_with(config, MemoryStore::new());
    f.session.attach_sink(f.sink.clone()).await;

    assert_eq!(f.session.devices().len(), 2);
    assert!(f.session.selected_device().is_none());
    assert_eq!(f.session.state(), SessionState::Idle);
    assert_eq!(f.media.acquisition_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_device_list_stays_idle() {
    let f = fixture();
    f.media.set_devices(Vec::new());
    f.session.attach_sink(f.sink.clone()).await;

    assert!(f.session.devices().is_empty());
    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_failure_reports_once() {
    let f = fixture();
    f.media
        .fail_next_acquisition(CameraError::AcquisitionError("in use".into()));
    let mut events = f.session.events();

    f.session.attach_sink(f.sink.clone()).await;

    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.session.stream().is_none());
    assert!(f.session.capabilities().is_none());
    assert_eq!(
        *f.errors.lock().unwrap(),
        vec![CameraError::AcquisitionError("in use".into())]
    );
    assert_eq!(
        states(&mut events),
        vec![SessionState::Starting, SessionState::Stopping, SessionState::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn test_enumeration_failure_goes_to_callback() {
    let f = fixture();
    f.media
        .fail_next_enumeration(CameraError::Unsupported("no enumeration".into()));

    f.session.attach_sink(f.sink.clone()).await;

    assert_eq!(f.session.state(), SessionState::Idle);
    assert_eq!(
        *f.errors.lock().unwrap(),
        vec![CameraError::Unsupported("no enumeration".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_goes_to_callback() {
    let f = fixture();
    f.media
        .set_permission(Ok(camstream::permissions::PermissionStatus::Denied));

    f.session.attach_sink(f.sink.clone()).await;

    let errors = f.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CameraError::PermissionDenied(_)));
    assert_eq!(f.media.acquisition_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_select_switches_and_releases_previous() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;

    assert!(f.session.select_device("b").await);

    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(f.session.controller().active_device().unwrap().id, "b");
    assert!(f.media.streams()[0].all_tracks_stopped());
    assert_eq!(f.media.live_track_count(), 1);
    assert_eq!(f.session.last_selected().as_deref(), Some("b"));
    assert_eq!(f.store.get(LAST_DEVICE_ID_KEY).unwrap().as_deref(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_selecting_absent_device_is_ignored() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;
    let acquisitions = f.media.acquisition_count();

    assert!(!f.session.select_device("zzz").await);

    assert_eq!(f.session.selected_device().unwrap().id, "a");
    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(f.media.acquisition_count(), acquisitions);
    assert_eq!(f.store.get(LAST_DEVICE_ID_KEY).unwrap().as_deref(), Some("a"));
}

#[tokio::test(start_paused = true)]
async fn test_reselecting_active_device_is_noop() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;

    assert!(f.session.select_device("a").await);
    assert_eq!(f.media.acquisition_count(), 1);
    assert_eq!(f.session.state(), SessionState::Display);
}

#[tokio::test(start_paused = true)]
async fn test_visibility_pauses_and_resumes() {
    let config = SessionConfig {
        auto_pause: true,
        ..SessionConfig::default()
    };
    let f = fixture_with(config, MemoryStore::new());
    f.session.attach_sink(f.sink.clone()).await;

    f.session.set_visibility(Visibility::Hidden).await;
    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.media.all_tracks_stopped());
    assert!(f.session.capabilities().is_none());

    f.session.set_visibility(Visibility::Visible).await;
    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(f.session.controller().active_device().unwrap().id, "a");
}

#[tokio::test(start_paused = true)]
async fn test_visibility_ignored_without_auto_pause() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;

    f.session.set_visibility(Visibility::Hidden).await;
    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(f.session.visibility(), Visibility::Hidden);
}

#[tokio::test(start_paused = true)]
async fn test_visible_again_skips_vanished_device() {
    let config = SessionConfig {
        auto_pause: true,
        ..SessionConfig::default()
    };
    let f = fixture_with(config, MemoryStore::new());
    f.session.attach_sink(f.sink.clone()).await;
    f.session.set_visibility(Visibility::Hidden).await;

    f.media.set_devices(vec![MediaDeviceInfo::video("b", "back cam")]);
    f.session.refresh_devices().await.unwrap();
    f.session.set_visibility(Visibility::Visible).await;

    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.session.selected_device().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_torch_noop_without_capability() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;
    let mut events = f.session.events();

    f.session.set_torch(true).await;

    assert!(!f.session.torch());
    assert!(f.media.last_track().unwrap().applied_constraints().is_empty());
    assert!(f.errors.lock().unwrap().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_torch_toggles_with_capability() {
    let f = fixture_with(SessionConfig::default(), MemoryStore::with_last_device("b"));
    f.media
        .set_track_capabilities(Some(Capabilities::default().with_torch(true)));
    f.session.attach_sink(f.sink.clone()).await;

    f.session.set_torch(true).await;
    assert!(f.session.torch());
    f.session.set_torch(true).await;
    assert_eq!(f.media.last_track().unwrap().applied_constraints().len(), 1);

    f.session.set_torch(false).await;
    assert!(!f.session.torch());
}

#[tokio::test(start_paused = true)]
async fn test_torch_failure_reports_and_keeps_flag() {
    let f = fixture();
    f.media
        .set_track_capabilities(Some(Capabilities::default().with_torch(true)));
    f.media
        .fail_constraints(Some(CameraError::Unsupported("torch busy".into())));
    f.session.attach_sink(f.sink.clone()).await;

    f.session.set_torch(true).await;

    assert!(!f.session.torch());
    let errors = f.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CameraError::CapabilityError(_)));
}

#[tokio::test(start_paused = true)]
async fn test_detach_sink_stops() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;

    f.session.detach_sink().await;

    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.sink.source_id().is_none());
    assert!(f.media.all_tracks_stopped());
    assert!(f.session.sink().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_releases_everything() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;

    f.session.deactivate().await;
    assert!(!f.session.is_active());
    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.media.all_tracks_stopped());

    f.session.stop().await;
    assert!(f.errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_latest_selection_wins() {
    let f = fixture_with(
        SessionConfig {
            auto_start: false,
            ..SessionConfig::default()
        },
        MemoryStore::new(),
    );
    f.media.set_devices(vec![
        MediaDeviceInfo::video("a", "front cam"),
        MediaDeviceInfo::video("b", "back cam"),
        MediaDeviceInfo::video("c", "USB cam"),
    ]);
    f.session.attach_sink(f.sink.clone()).await;
    f.media.hold_acquisitions();

    let release = async {
        tokio::task::yield_now().await;
        f.media.release_acquisitions();
    };
    let (a, b, c, _) = tokio::join!(
        f.session.select_device("a"),
        f.session.select_device("b"),
        f.session.select_device("c"),
        release,
    );
    assert!(a && b && c);

    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(f.session.controller().active_device().unwrap().id, "c");
    assert_eq!(f.session.selected_device().unwrap().id, "c");
    assert!(!f.media.acquired_device_ids().contains(&Some("b".to_string())));
    assert_eq!(f.media.live_track_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reported_facing_beats_label() {
    let f = fixture();
    f.media.set_devices(reported_facing_devices());
    f.session.attach_sink(f.sink.clone()).await;

    assert_eq!(f.session.selected_device().unwrap().facing, Facing::Front);
    assert!(f.sink.is_mirrored());

    f.session.select_device("document").await;
    assert!(!f.sink.is_mirrored());
}

#[tokio::test(start_paused = true)]
async fn test_unplugging_active_device_stops() {
    let f = fixture();
    f.session.attach_sink(f.sink.clone()).await;
    let monitor = f.session.device_monitor();
    monitor.scan_once().await.unwrap();

    f.media.set_devices(vec![MediaDeviceInfo::video("b", "back cam")]);
    let events = monitor.scan_once().await.unwrap();
    assert_eq!(events.len(), 1);
    f.session.handle_device_event(&events[0]).await;

    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.media.all_tracks_stopped());
    assert_eq!(f.session.devices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_plugging_first_camera_auto_starts() {
    let f = fixture();
    f.media.set_devices(Vec::new());
    f.session.attach_sink(f.sink.clone()).await;
    assert_eq!(f.session.state(), SessionState::Idle);

    f.media.set_devices(vec![MediaDeviceInfo::video("usb", "USB Camera")]);
    let device = camstream::Device::new("usb", "USB Camera", Facing::Unknown);
    f.session
        .handle_device_event(&DeviceEvent::Connected(device))
        .await;

    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(f.session.selected_device().unwrap().id, "usb");
}

#[tokio::test(start_paused = true)]
async fn test_session_events_cover_selection() {
    let f = fixture();
    let mut events = f.session.events();
    f.session.attach_sink(f.sink.clone()).await;

    let mut saw_devices = false;
    let mut selected = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::DevicesChanged(devices) => saw_devices = devices.len() == 2,
            SessionEvent::DeviceSelected(device) => selected = Some(device.id),
            _ => {}
        }
    }
    assert!(saw_devices);
    assert_eq!(selected.as_deref(), Some("a"));
}

#[tokio::test(start_paused = true)]
async fn test_watch_channel_tracks_state() {
    let f = fixture();
    let mut states = f.session.subscribe();
    assert_eq!(*states.borrow(), SessionState::Idle);

    f.session.attach_sink(f.sink.clone()).await;
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SessionState::Display);
}

#[tokio::test(start_paused = true)]
async fn test_queued_torch_requests_apply_in_order() {
    let f = fixture();
    f.media
        .set_track_capabilities(Some(Capabilities::default().with_torch(true)));
    f.session.attach_sink(f.sink.clone()).await;

    let requests = [true, false, true].map(|on| f.session.set_torch(on));
    futures::future::join_all(requests).await;

    assert!(f.session.torch());
    assert_eq!(f.media.last_track().unwrap().applied_constraints().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unready_sink_holds_starting_until_stopped() {
    let f = fixture_with(
        SessionConfig {
            auto_start: false,
            ..SessionConfig::default()
        },
        MemoryStore::new(),
    );
    f.sink.never_ready();
    f.session.attach_sink(f.sink.clone()).await;

    let mut start = tokio_test::task::spawn(f.session.select_device("a"));
    for _ in 0..5 {
        tokio_test::assert_pending!(start.poll());
        tokio::time::advance(std::time::Duration::from_millis(750)).await;
    }
    assert_eq!(f.session.state(), SessionState::Starting);
    drop(start);

    f.session.stop().await;
    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.media.all_tracks_stopped());
    assert!(f.errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hidden_during_permission_prompt_stays_idle() {
    let config = SessionConfig {
        auto_pause: true,
        ..SessionConfig::default()
    };
    let f = fixture_with(config, MemoryStore::new());
    f.media
        .set_permission(Err(CameraError::Unsupported("no query".into())));
    f.media.hold_acquisitions();

    let hide_then_answer = async {
        tokio::task::yield_now().await;
        f.session.set_visibility(Visibility::Hidden).await;
        f.media.release_acquisitions();
    };
    tokio::join!(f.session.attach_sink(f.sink.clone()), hide_then_answer);

    assert_eq!(f.session.visibility(), Visibility::Hidden);
    assert_eq!(f.session.state(), SessionState::Idle);
    assert_eq!(f.session.selected_device().unwrap().id, "a");
    assert_eq!(f.media.live_track_count(), 0);

    f.session.set_visibility(Visibility::Visible).await;
    assert_eq!(f.session.state(), SessionState::Display);
    assert_eq!(f.session.controller().active_device().unwrap().id, "a");
}

#[tokio::test(start_paused = true)]
async fn test_select_while_hidden_defers_start() {
    let config = SessionConfig {
        auto_pause: true,
        ..SessionConfig::default()
    };
    let f = fixture_with(config, MemoryStore::new());
    f.session.attach_sink(f.sink.clone()).await;
    f.session.set_visibility(Visibility::Hidden).await;

    assert!(f.session.select_device("b").await);
    assert_eq!(f.session.state(), SessionState::Idle);
    assert_eq!(f.store.get(LAST_DEVICE_ID_KEY).unwrap().as_deref(), Some("b"));

    f.session.set_visibility(Visibility::Visible).await;
    assert_eq!(f.session.controller().active_device().unwrap().id, "b");
}

#[tokio::test(start_paused = true)]
async fn test_hot_plug_refresh_opens_no_stream() {
    let f = fixture();
    f.media
        .set_permission(Err(CameraError::Unsupported("no query".into())));
    f.session.attach_sink(f.sink.clone()).await;
    assert_eq!(f.session.state(), SessionState::Display);
    let acquired = f.media.acquisition_count();

    let monitor = f.session.device_monitor();
    monitor.start_monitoring().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    f.session
        .handle_device_event(&DeviceEvent::Connected(camstream::Device::new(
            "usb",
            "USB cam",
            Facing::Unknown,
        )))
        .await;
    monitor.stop_monitoring().await.unwrap();

    assert_eq!(f.media.acquisition_count(), acquired);
    assert_eq!(f.media.live_track_count(), 1);
    assert_eq!(f.session.state(), SessionState::Display);
}
