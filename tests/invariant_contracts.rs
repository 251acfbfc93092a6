//! Contract tests: the lifecycle invariants must actually be checked on the
//! paths a session drives, not only hold by accident.

use camstream::invariant_ppt::{
    clear_invariant_log, contract_test, DISPLAY_HOLDS_STREAM, IDLE_HOLDS_NOTHING,
};
use camstream::testing::{front_and_back, FakeMediaDevices, FakeSink};
use camstream::{CameraError, CameraSession, MemoryStore, SessionConfig, Visibility};
use std::sync::Arc;

fn session(media: Arc<FakeMediaDevices>) -> CameraSession {
    CameraSession::builder(media)
        .config(SessionConfig {
            auto_pause: true,
            ..SessionConfig::default()
        })
        .store(Arc::new(MemoryStore::new()))
        .build()
}

#[tokio::test(start_paused = true)]
async fn contract_auto_start_and_deactivate() {
    clear_invariant_log();
    let session = session(Arc::new(FakeMediaDevices::with_devices(front_and_back())));
    session.attach_sink(Arc::new(FakeSink::new())).await;
    session.deactivate().await;
    contract_test(
        "auto start then deactivate",
        &[DISPLAY_HOLDS_STREAM, IDLE_HOLDS_NOTHING],
    );
}

#[tokio::test(start_paused = true)]
async fn contract_visibility_pause() {
    let session = session(Arc::new(FakeMediaDevices::with_devices(front_and_back())));
    session.attach_sink(Arc::new(FakeSink::new())).await;
    clear_invariant_log();
    session.set_visibility(Visibility::Hidden).await;
    contract_test("hidden", &[IDLE_HOLDS_NOTHING]);

    clear_invariant_log();
    session.set_visibility(Visibility::Visible).await;
    contract_test("visible again", &[DISPLAY_HOLDS_STREAM]);
}

#[tokio::test(start_paused = true)]
async fn contract_failed_acquisition_returns_idle() {
    clear_invariant_log();
    let media = Arc::new(FakeMediaDevices::with_devices(front_and_back()));
    media.fail_next_acquisition(CameraError::AcquisitionError("busy".into()));
    let session = session(media);
    session.attach_sink(Arc::new(FakeSink::new())).await;
    contract_test("failed acquisition", &[IDLE_HOLDS_NOTHING]);
}
