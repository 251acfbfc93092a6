//! Stream lifecycle controller.
//!
//! Owns the `idle -> starting -> display -> stopping -> idle` state machine
//! for one camera. Start and stop requests are serialized behind a FIFO lock
//! and tagged with a ticket; a request that is no longer the newest when its
//! turn comes is dropped, and an in-flight start abandons itself at its next
//! suspension point once a newer request arrives. Stop sequences always run
//! to completion.

use crate::assert_invariant;
use crate::config::TimingConfig;
use crate::devices::{self, facing, DeviceAccess};
use crate::errors::CameraError;
use crate::events::SessionEvent;
use crate::invariant_ppt::{DISPLAY_HOLDS_STREAM, IDLE_HOLDS_NOTHING};
use crate::lock;
use crate::platform::{MediaStream, VideoSink, VideoTrack};
use crate::types::{Capabilities, Device, Facing, ReadyState, SessionState, StreamConstraints};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Sink for every failure funneled out of the controller
pub type ErrorCallback = Arc<dyn Fn(&CameraError) + Send + Sync>;

/// Default error callback: log and carry on
pub fn log_error_callback() -> ErrorCallback {
    Arc::new(|error: &CameraError| log::error!("Camera error: {}", error))
}

/// Fixed delays used while bringing a stream up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTiming {
    /// Delay between readiness polls of the sink
    pub ready_poll_interval: Duration,
    /// Delay after readiness before capabilities are read
    pub settle_delay: Duration,
}

impl Default for StreamTiming {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(750),
            settle_delay: Duration::from_millis(500),
        }
    }
}

impl From<&TimingConfig> for StreamTiming {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(timing.ready_poll_interval_ms),
            settle_delay: Duration::from_millis(timing.settle_delay_ms),
        }
    }
}

enum Request {
    Start(Device),
    Stop,
}

impl Request {
    fn name(&self) -> &'static str {
        match self {
            Request::Start(_) => "start",
            Request::Stop => "stop",
        }
    }
}

/// Everything tied to the stream currently owned by the controller
#[derive(Default)]
struct Held {
    stream: Option<Arc<dyn MediaStream>>,
    /// Sink the stream was bound to; released on stop even if detached since
    sink: Option<Arc<dyn VideoSink>>,
    device: Option<Device>,
    capabilities: Option<Capabilities>,
    torch: bool,
    mirrored: bool,
}

pub struct StreamController {
    access: DeviceAccess,
    constraints: StreamConstraints,
    timing: StreamTiming,
    sink: Mutex<Option<Arc<dyn VideoSink>>>,
    held: Mutex<Held>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    on_error: ErrorCallback,
    turn: tokio::sync::Mutex<()>,
    tickets: AtomicU64,
}

impl StreamController {
    pub fn new(
        access: DeviceAccess,
        constraints: StreamConstraints,
        timing: StreamTiming,
        events: broadcast::Sender<SessionEvent>,
        on_error: ErrorCallback,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            access,
            constraints,
            timing,
            sink: Mutex::new(None),
            held: Mutex::new(Held::default()),
            state,
            events,
            on_error,
            turn: tokio::sync::Mutex::new(()),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn attach_sink(&self, sink: Arc<dyn VideoSink>) {
        *lock(&self.sink) = Some(sink);
    }

    pub fn detach_sink(&self) -> Option<Arc<dyn VideoSink>> {
        lock(&self.sink).take()
    }

    pub fn sink(&self) -> Option<Arc<dyn VideoSink>> {
        lock(&self.sink).clone()
    }

    /// Start streaming from `device`, replacing any current stream.
    ///
    /// Failures are reported through the error callback, never returned.
    pub async fn start(&self, device: Device) {
        self.run(Request::Start(device)).await
    }

    /// Stop streaming and release the camera. No-op when already idle.
    pub async fn stop(&self) {
        self.run(Request::Stop).await
    }

    /// Stop, then report `error` once
    pub(crate) async fn fail(&self, error: CameraError) {
        self.stop().await;
        self.report(error);
    }

    /// Switch the torch; ignored unless the active track supports it
    pub async fn set_torch(&self, enabled: bool) {
        if !self.torch_supported() {
            log::debug!("Torch request ignored, no torch capability held");
            return;
        }
        let _turn = self.turn.lock().await;

        let (stream, supported, current) = {
            let held = lock(&self.held);
            (
                held.stream.clone(),
                held.capabilities.as_ref().is_some_and(|caps| caps.torch),
                held.torch,
            )
        };
        let Some(stream) = stream else {
            return;
        };
        if !supported || current == enabled {
            return;
        }

        match self.access.set_torch(stream.as_ref(), enabled).await {
            Ok(()) => {
                lock(&self.held).torch = enabled;
                let _ = self.events.send(SessionEvent::TorchChanged(enabled));
            }
            Err(e) => {
                log::warn!("Failed to switch torch: {}", e);
                self.report(e);
            }
        }
    }

    fn torch_supported(&self) -> bool {
        let held = lock(&self.held);
        held.stream.is_some() && held.capabilities.as_ref().is_some_and(|caps| caps.torch)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn stream(&self) -> Option<Arc<dyn MediaStream>> {
        lock(&self.held).stream.clone()
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        lock(&self.held).capabilities.clone()
    }

    pub fn torch(&self) -> bool {
        lock(&self.held).torch
    }

    pub fn is_mirrored(&self) -> bool {
        lock(&self.held).mirrored
    }

    /// Device of the stream currently held, if any
    pub fn active_device(&self) -> Option<Device> {
        lock(&self.held).device.clone()
    }

    /// Synchronously drop the held stream without the async stop sequence.
    ///
    /// Used when the owner goes away and cannot await; tracks are stopped and
    /// the sink is cleared so the hardware is never left locked.
    pub fn release_now(&self) {
        let held = std::mem::take(&mut *lock(&self.held));
        if let Some(sink) = &held.sink {
            sink.set_source(None);
            sink.load();
        }
        if let Some(stream) = &held.stream {
            log::info!("Releasing camera stream {} without stop sequence", stream.id());
            devices::stop_tracks(stream.as_ref());
        }
        self.state.send_replace(SessionState::Idle);
    }

    async fn run(&self, request: Request) {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let _turn = self.turn.lock().await;

        if self.is_superseded(ticket) {
            log::debug!("Dropping superseded {} request #{}", request.name(), ticket);
            return;
        }

        match request {
            Request::Start(device) => {
                if let Err(e) = self.start_sequence(ticket, &device).await {
                    log::warn!("Failed to start camera {}: {}", device.id, e);
                    self.stop_sequence().await;
                    self.report(e);
                }
            }
            Request::Stop => self.stop_sequence().await,
        }
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        self.tickets.load(Ordering::SeqCst) != ticket
    }

    async fn start_sequence(&self, ticket: u64, device: &Device) -> Result<(), CameraError> {
        if lock(&self.held).stream.is_some() {
            self.stop_sequence().await;
        }

        self.transition(SessionState::Starting);
        let stream = self
            .access
            .acquire_stream(&self.constraints, Some(&device.id))
            .await?;
        {
            let mut held = lock(&self.held);
            held.stream = Some(stream.clone());
            held.device = Some(device.clone());
        }

        if self.is_superseded(ticket) {
            self.abandon(device).await;
            return Ok(());
        }

        let Some(sink) = self.sink() else {
            log::info!("No video sink attached, releasing stream for {}", device.id);
            self.stop_sequence().await;
            return Ok(());
        };
        lock(&self.held).sink = Some(sink.clone());

        let Some(capabilities) = self.bind(ticket, sink.as_ref(), &stream, device).await? else {
            self.abandon(device).await;
            return Ok(());
        };

        lock(&self.held).capabilities = Some(capabilities);
        self.transition(SessionState::Display);
        log::info!("Camera {} ({}) is displaying", device.id, device.label);
        Ok(())
    }

    /// Attach the stream to the sink and wait until it is really playing.
    ///
    /// Returns `None` if a newer request superseded this one meanwhile.
    async fn bind(
        &self,
        ticket: u64,
        sink: &dyn VideoSink,
        stream: &Arc<dyn MediaStream>,
        device: &Device,
    ) -> Result<Option<Capabilities>, CameraError> {
        sink.set_source(Some(stream.clone()));
        sink.can_play().await.map_err(binding_error)?;
        if self.is_superseded(ticket) {
            return Ok(None);
        }

        let track = stream.video_tracks().into_iter().next();
        let facing = resolve_facing(track.as_deref(), device);
        let mirrored = facing::should_mirror(facing);
        sink.set_mirrored(mirrored);
        lock(&self.held).mirrored = mirrored;
        log::debug!("Camera {} faces {}, mirrored: {}", device.id, facing, mirrored);

        sink.play().await.map_err(binding_error)?;
        if !self.wait_until_ready(ticket, sink).await {
            return Ok(None);
        }

        // Capabilities lag readiness on some platforms
        tokio::time::sleep(self.timing.settle_delay).await;
        if self.is_superseded(ticket) {
            return Ok(None);
        }

        Ok(Some(
            track
                .and_then(|track| track.capabilities())
                .unwrap_or_default(),
        ))
    }

    /// Poll the sink until it has enough data. Unbounded: hardware start-up
    /// time is unbounded, only a newer request ends the wait early.
    async fn wait_until_ready(&self, ticket: u64, sink: &dyn VideoSink) -> bool {
        let mut polls: u64 = 0;
        loop {
            tokio::time::sleep(self.timing.ready_poll_interval).await;
            if self.is_superseded(ticket) {
                return false;
            }
            if sink.ready_state() >= ReadyState::HaveEnoughData {
                return true;
            }
            polls += 1;
            if polls % 20 == 0 {
                log::debug!("Sink still not ready after {} polls", polls);
            }
        }
    }

    async fn abandon(&self, device: &Device) {
        log::debug!("Start of {} superseded, releasing its stream", device.id);
        self.stop_sequence().await;
    }

    async fn stop_sequence(&self) {
        let (stream, sink, torch) = {
            let held = lock(&self.held);
            (held.stream.clone(), held.sink.clone(), held.torch)
        };
        if stream.is_none() && sink.is_none() && self.state() == SessionState::Idle {
            return;
        }

        self.transition(SessionState::Stopping);

        if torch {
            if let Some(stream) = &stream {
                if let Err(e) = self.access.set_torch(stream.as_ref(), false).await {
                    log::warn!("Failed to turn torch off while stopping: {}", e);
                }
            }
            lock(&self.held).torch = false;
            let _ = self.events.send(SessionEvent::TorchChanged(false));
        }

        if let Some(sink) = sink {
            sink.set_source(None);
            sink.load();
            sink.emptied().await;
        }
        if let Some(stream) = stream {
            devices::stop_tracks(stream.as_ref());
        }

        *lock(&self.held) = Held::default();
        self.transition(SessionState::Idle);
    }

    fn transition(&self, next: SessionState) {
        {
            let held = lock(&self.held);
            match next {
                SessionState::Display => assert_invariant!(
                    held.stream.is_some() && held.capabilities.is_some(),
                    DISPLAY_HOLDS_STREAM,
                    "StreamController::transition"
                ),
                SessionState::Idle => assert_invariant!(
                    held.stream.is_none() && held.capabilities.is_none(),
                    IDLE_HOLDS_NOTHING,
                    "StreamController::transition"
                ),
                SessionState::Starting | SessionState::Stopping => {}
            }
        }

        let previous = self.state.send_replace(next);
        if previous != next {
            log::debug!("Camera state {} -> {}", previous, next);
            let _ = self.events.send(SessionEvent::StateChanged(next));
        }
    }

    fn report(&self, error: CameraError) {
        (self.on_error)(&error);
        let _ = self.events.send(SessionEvent::Error(error));
    }
}

fn binding_error(error: CameraError) -> CameraError {
    match error {
        CameraError::BindingError(_) => error,
        other => CameraError::BindingError(other.to_string()),
    }
}

/// Track settings first, then the device classification, then labels
fn resolve_facing(track: Option<&dyn VideoTrack>, device: &Device) -> Facing {
    if let Some(reported) = track.and_then(|track| track.settings().facing) {
        if reported.is_known() {
            return reported;
        }
    }
    if device.facing.is_known() {
        return device.facing;
    }

    let label = if device.label.is_empty() {
        track.map(|track| track.label()).unwrap_or_default()
    } else {
        device.label.as_str()
    };
    facing::classify_label(label)
}
