//! Testing utilities for camstream
//!
//! Scriptable in-memory fakes of every collaborator the camera core talks
//! to, plus synthetic frames, so lifecycle and capture behavior can be
//! tested offline and deterministically.

pub mod synthetic_data;

pub use synthetic_data::{front_and_back, reported_facing_devices, synthetic_frame};

use crate::capture::video::{MediaRecorder, RecorderFactory, RecorderOptions, RecordingSource};
use crate::errors::CameraError;
use crate::lock;
use crate::permissions::PermissionStatus;
use crate::platform::{MediaDevices, MediaStream, VideoSink, VideoTrack};
use crate::types::{
    Capabilities, Frame, MediaDeviceInfo, MediaDeviceKind, ReadyState, StreamConstraints,
    TrackConstraints, TrackSettings,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

struct MediaState {
    devices: Vec<MediaDeviceInfo>,
    permission: Result<PermissionStatus, CameraError>,
    fail_next_acquisition: Option<CameraError>,
    fail_all_acquisitions: Option<CameraError>,
    fail_next_enumeration: Option<CameraError>,
    track_capabilities: Option<Capabilities>,
    fail_constraints: Option<CameraError>,
    acquired: Vec<Option<String>>,
    streams: Vec<Arc<FakeStream>>,
    enumerations: usize,
}

/// In-memory [`MediaDevices`] with scriptable failures.
///
/// Acquisitions can be held at a gate to line up concurrent requests; the
/// requested device id is recorded before the gate.
pub struct FakeMediaDevices {
    state: Mutex<MediaState>,
    gate: watch::Sender<bool>,
}

impl Default for FakeMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self::with_devices(Vec::new())
    }

    pub fn with_devices(devices: Vec<MediaDeviceInfo>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(MediaState {
                devices,
                permission: Ok(PermissionStatus::Granted),
                fail_next_acquisition: None,
                fail_all_acquisitions: None,
                fail_next_enumeration: None,
                track_capabilities: Some(Capabilities::default()),
                fail_constraints: None,
                acquired: Vec::new(),
                streams: Vec::new(),
                enumerations: 0,
            }),
            gate,
        }
    }

    pub fn set_devices(&self, devices: Vec<MediaDeviceInfo>) {
        lock(&self.state).devices = devices;
    }

    pub fn set_permission(&self, permission: Result<PermissionStatus, CameraError>) {
        lock(&self.state).permission = permission;
    }

    pub fn fail_next_acquisition(&self, error: CameraError) {
        lock(&self.state).fail_next_acquisition = Some(error);
    }

    pub fn fail_all_acquisitions(&self, error: Option<CameraError>) {
        lock(&self.state).fail_all_acquisitions = error;
    }

    pub fn fail_next_enumeration(&self, error: CameraError) {
        lock(&self.state).fail_next_enumeration = Some(error);
    }

    /// Capabilities reported by tracks acquired from now on
    pub fn set_track_capabilities(&self, capabilities: Option<Capabilities>) {
        lock(&self.state).track_capabilities = capabilities;
    }

    /// Constraint failure of tracks acquired from now on
    pub fn fail_constraints(&self, error: Option<CameraError>) {
        lock(&self.state).fail_constraints = error;
    }

    /// Park every acquisition until [`release_acquisitions`](Self::release_acquisitions)
    pub fn hold_acquisitions(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_acquisitions(&self) {
        self.gate.send_replace(true);
    }

    pub fn acquisition_count(&self) -> usize {
        lock(&self.state).acquired.len()
    }

    /// Device ids requested, in call order; `None` for unpinned requests
    pub fn acquired_device_ids(&self) -> Vec<Option<String>> {
        lock(&self.state).acquired.clone()
    }

    pub fn enumeration_count(&self) -> usize {
        lock(&self.state).enumerations
    }

    /// Every stream handed out so far, oldest first
    pub fn streams(&self) -> Vec<Arc<FakeStream>> {
        lock(&self.state).streams.clone()
    }

    pub fn last_track(&self) -> Option<Arc<FakeTrack>> {
        lock(&self.state)
            .streams
            .last()
            .and_then(|stream| stream.original_tracks.first().cloned())
    }

    /// Whether every track ever handed out has been stopped
    pub fn all_tracks_stopped(&self) -> bool {
        lock(&self.state)
            .streams
            .iter()
            .all(|stream| stream.all_tracks_stopped())
    }

    pub fn live_track_count(&self) -> usize {
        lock(&self.state)
            .streams
            .iter()
            .flat_map(|stream| stream.original_tracks.iter())
            .filter(|track| track.is_live())
            .count()
    }

    fn open(&self, constraints: &StreamConstraints) -> Result<Arc<FakeStream>, CameraError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.fail_next_acquisition.take() {
            return Err(error);
        }
        if let Some(error) = state.fail_all_acquisitions.clone() {
            return Err(error);
        }

        let video_inputs = state
            .devices
            .iter()
            .filter(|info| info.kind == MediaDeviceKind::VideoInput);
        let info = match &constraints.device_id {
            Some(id) => video_inputs
                .clone()
                .find(|info| &info.device_id == id)
                .cloned()
                .ok_or_else(|| CameraError::DeviceNotFound(id.clone()))?,
            None => video_inputs
                .clone()
                .find(|info| constraints.facing.map_or(true, |f| info.facing == Some(f)))
                .or_else(|| video_inputs.clone().next())
                .cloned()
                .unwrap_or_else(|| MediaDeviceInfo::video("default", "Default Camera")),
        };

        let n = state.streams.len();
        let track = Arc::new(FakeTrack {
            id: format!("track-{}", n),
            label: info.label.clone(),
            settings: TrackSettings {
                device_id: Some(info.device_id.clone()),
                facing: info.facing,
                width: constraints.width.or(Some(640)),
                height: constraints.height.or(Some(480)),
            },
            capabilities: state.track_capabilities.clone(),
            live: AtomicBool::new(true),
            applied: Mutex::new(Vec::new()),
            fail: Mutex::new(state.fail_constraints.clone()),
        });
        let stream = Arc::new(FakeStream {
            id: format!("stream-{}", n),
            tracks: Mutex::new(vec![track.clone()]),
            original_tracks: vec![track],
        });
        state.streams.push(stream.clone());
        Ok(stream)
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn query_permission(&self) -> Result<PermissionStatus, CameraError> {
        lock(&self.state).permission.clone()
    }

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, CameraError> {
        let mut state = lock(&self.state);
        state.enumerations += 1;
        if let Some(error) = state.fail_next_enumeration.take() {
            return Err(error);
        }
        Ok(state.devices.clone())
    }

    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, CameraError> {
        lock(&self.state).acquired.push(constraints.device_id.clone());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let stream: Arc<dyn MediaStream> = self.open(constraints)?;
        Ok(stream)
    }
}

pub struct FakeStream {
    id: String,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
    /// Tracks the stream was created with, kept after removal
    original_tracks: Vec<Arc<FakeTrack>>,
}

impl FakeStream {
    pub fn all_tracks_stopped(&self) -> bool {
        self.original_tracks.iter().all(|track| !track.is_live())
    }

    pub fn attached_track_count(&self) -> usize {
        lock(&self.tracks).len()
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn video_tracks(&self) -> Vec<Arc<dyn VideoTrack>> {
        lock(&self.tracks)
            .iter()
            .map(|track| track.clone() as Arc<dyn VideoTrack>)
            .collect()
    }

    fn remove_track(&self, track_id: &str) {
        lock(&self.tracks).retain(|track| track.id != track_id);
    }
}

pub struct FakeTrack {
    id: String,
    label: String,
    settings: TrackSettings,
    capabilities: Option<Capabilities>,
    live: AtomicBool,
    applied: Mutex<Vec<TrackConstraints>>,
    fail: Mutex<Option<CameraError>>,
}

impl FakeTrack {
    /// Constraint sets applied successfully, oldest first
    pub fn applied_constraints(&self) -> Vec<TrackConstraints> {
        lock(&self.applied).clone()
    }

    pub fn fail_constraints(&self, error: Option<CameraError>) {
        *lock(&self.fail) = error;
    }
}

#[async_trait]
impl VideoTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.clone()
    }

    async fn apply_constraints(&self, constraints: &TrackConstraints) -> Result<(), CameraError> {
        if let Some(error) = lock(&self.fail).clone() {
            return Err(error);
        }
        lock(&self.applied).push(constraints.clone());
        Ok(())
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

struct SinkState {
    source: Option<Arc<dyn MediaStream>>,
    mirrored: bool,
    size: (u32, u32),
    frame: Option<Frame>,
    /// Polls answered "not ready" before reporting enough data; `None` never
    ready_after: Option<usize>,
    polls: usize,
    can_play_error: Option<CameraError>,
    play_error: Option<CameraError>,
    loads: usize,
    emptied: usize,
    plays: usize,
    frames_served: u64,
}

/// Headless [`VideoSink`] with scriptable readiness
pub struct FakeSink {
    state: Mutex<SinkState>,
}

impl Default for FakeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                source: None,
                mirrored: false,
                size: (64, 48),
                frame: None,
                ready_after: Some(0),
                polls: 0,
                can_play_error: None,
                play_error: None,
                loads: 0,
                emptied: 0,
                plays: 0,
                frames_served: 0,
            }),
        }
    }

    /// Report `HaveMetadata` for the first `polls` readiness checks
    pub fn ready_after(&self, polls: usize) {
        lock(&self.state).ready_after = Some(polls);
    }

    pub fn never_ready(&self) {
        lock(&self.state).ready_after = None;
    }

    pub fn fail_can_play(&self, error: Option<CameraError>) {
        lock(&self.state).can_play_error = error;
    }

    pub fn fail_play(&self, error: Option<CameraError>) {
        lock(&self.state).play_error = error;
    }

    pub fn set_video_size(&self, width: u32, height: u32) {
        lock(&self.state).size = (width, height);
    }

    /// Serve `frame` instead of synthetic frames
    pub fn set_frame(&self, frame: Option<Frame>) {
        lock(&self.state).frame = frame;
    }

    pub fn source_id(&self) -> Option<String> {
        lock(&self.state)
            .source
            .as_ref()
            .map(|stream| stream.id().to_string())
    }

    pub fn load_count(&self) -> usize {
        lock(&self.state).loads
    }

    pub fn emptied_count(&self) -> usize {
        lock(&self.state).emptied
    }

    pub fn play_count(&self) -> usize {
        lock(&self.state).plays
    }
}

#[async_trait]
impl VideoSink for FakeSink {
    fn set_source(&self, stream: Option<Arc<dyn MediaStream>>) {
        let mut state = lock(&self.state);
        state.source = stream;
        state.polls = 0;
    }

    fn load(&self) {
        lock(&self.state).loads += 1;
    }

    async fn can_play(&self) -> Result<(), CameraError> {
        let state = lock(&self.state);
        if let Some(error) = state.can_play_error.clone() {
            return Err(error);
        }
        if state.source.is_none() {
            return Err(CameraError::BindingError("no source assigned".to_string()));
        }
        Ok(())
    }

    async fn play(&self) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.play_error.clone() {
            return Err(error);
        }
        state.plays += 1;
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        let mut state = lock(&self.state);
        if state.source.is_none() {
            return ReadyState::HaveNothing;
        }
        state.polls += 1;
        match state.ready_after {
            Some(n) if state.polls > n => ReadyState::HaveEnoughData,
            _ => ReadyState::HaveMetadata,
        }
    }

    async fn emptied(&self) {
        lock(&self.state).emptied += 1;
    }

    fn set_mirrored(&self, mirrored: bool) {
        lock(&self.state).mirrored = mirrored;
    }

    fn is_mirrored(&self) -> bool {
        lock(&self.state).mirrored
    }

    fn video_size(&self) -> (u32, u32) {
        lock(&self.state).size
    }

    fn current_frame(&self) -> Option<Frame> {
        let mut state = lock(&self.state);
        state.source.as_ref()?;
        if let Some(frame) = state.frame.clone() {
            return Some(frame);
        }
        state.frames_served += 1;
        let (width, height) = state.size;
        Some(synthetic_frame(state.frames_served, width, height))
    }
}

/// Recorder factory that hands out [`FakeRecorder`]s
pub struct FakeRecorderFactory {
    rejected: Mutex<Vec<String>>,
    payload: Mutex<Bytes>,
    recorders: Mutex<Vec<Arc<FakeRecorder>>>,
}

impl Default for FakeRecorderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRecorderFactory {
    pub fn new() -> Self {
        Self {
            rejected: Mutex::new(Vec::new()),
            payload: Mutex::new(Bytes::from_static(b"fake-recording")),
            recorders: Mutex::new(Vec::new()),
        }
    }

    pub fn reject_mime(&self, mime: &str) {
        lock(&self.rejected).push(mime.to_string());
    }

    /// Bytes returned by recorders created from now on
    pub fn set_payload(&self, payload: Bytes) {
        *lock(&self.payload) = payload;
    }

    pub fn recorders(&self) -> Vec<Arc<FakeRecorder>> {
        lock(&self.recorders).clone()
    }

    pub fn last_recorder(&self) -> Option<Arc<FakeRecorder>> {
        lock(&self.recorders).last().cloned()
    }
}

impl RecorderFactory for FakeRecorderFactory {
    fn is_type_supported(&self, mime: &str) -> bool {
        !lock(&self.rejected).iter().any(|rejected| rejected == mime)
    }

    fn create(
        &self,
        source: RecordingSource,
        options: &RecorderOptions,
    ) -> Result<Arc<dyn MediaRecorder>, CameraError> {
        let frames = Arc::new(AtomicUsize::new(0));
        let last_frame = Arc::new(Mutex::new(None));
        let kind = match source {
            RecordingSource::Stream(_) => "stream",
            RecordingSource::Frames(mut rx) => {
                let frames = frames.clone();
                let last_frame = last_frame.clone();
                tokio::spawn(async move {
                    while let Some(frame) = rx.recv().await {
                        frames.fetch_add(1, Ordering::SeqCst);
                        *lock(&last_frame) = Some(frame);
                    }
                });
                "frames"
            }
        };

        let recorder = Arc::new(FakeRecorder {
            source_kind: kind,
            mime_type: options.mime_type.clone(),
            payload: lock(&self.payload).clone(),
            calls: Mutex::new(Vec::new()),
            frames,
            last_frame,
        });
        lock(&self.recorders).push(recorder.clone());
        Ok(recorder)
    }
}

pub struct FakeRecorder {
    source_kind: &'static str,
    mime_type: String,
    payload: Bytes,
    calls: Mutex<Vec<&'static str>>,
    frames: Arc<AtomicUsize>,
    last_frame: Arc<Mutex<Option<Frame>>>,
}

impl FakeRecorder {
    /// `"stream"` when recording the live stream, `"frames"` for a re-rendered feed
    pub fn source_kind(&self) -> &'static str {
        self.source_kind
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Recorder methods invoked, in order
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn frames_received(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn last_frame(&self) -> Option<Frame> {
        lock(&self.last_frame).clone()
    }
}

#[async_trait]
impl MediaRecorder for FakeRecorder {
    fn start(&self) -> Result<(), CameraError> {
        lock(&self.calls).push("start");
        Ok(())
    }

    fn pause(&self) -> Result<(), CameraError> {
        lock(&self.calls).push("pause");
        Ok(())
    }

    fn resume(&self) -> Result<(), CameraError> {
        lock(&self.calls).push("resume");
        Ok(())
    }

    async fn stop(&self) -> Result<Bytes, CameraError> {
        lock(&self.calls).push("stop");
        Ok(self.payload.clone())
    }
}
