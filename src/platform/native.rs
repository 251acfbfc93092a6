//! Native camera backend on top of nokhwa.
//!
//! Devices are addressed by their nokhwa index rendered as a string. Frames
//! arrive on nokhwa's capture thread and are decoded to RGBA into a
//! per-stream slot, which [`HeadlessSink`] renders from.

use crate::errors::CameraError;
use crate::lock;
use crate::permissions::{probe_host_permission, PermissionStatus};
use crate::platform::{MediaDevices, MediaStream, VideoSink, VideoTrack};
use crate::types::{
    Capabilities, CapabilityRange, Frame, MediaDeviceInfo, ReadyState, StreamConstraints,
    TrackConstraints, TrackSettings,
};
use async_trait::async_trait;
use nokhwa::{
    pixel_format::RgbAFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution},
    CallbackCamera,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

type FrameSlot = Arc<Mutex<Option<Frame>>>;

/// Host cameras via nokhwa
#[derive(Default)]
pub struct NativeMediaDevices {
    slots: Mutex<HashMap<String, Weak<Mutex<Option<Frame>>>>>,
}

impl NativeMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_slot(&self, stream_id: &str) -> Option<FrameSlot> {
        let mut slots = lock(&self.slots);
        slots.retain(|_, slot| slot.strong_count() > 0);
        slots.get(stream_id).and_then(Weak::upgrade)
    }
}

#[async_trait]
impl MediaDevices for NativeMediaDevices {
    async fn query_permission(&self) -> Result<PermissionStatus, CameraError> {
        probe_host_permission()
            .map(|info| {
                log::debug!("Host permission probe: {}", info.message);
                info.status
            })
            .ok_or_else(|| CameraError::Unsupported("no permission query on this host".into()))
    }

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, CameraError> {
        let cameras = tokio::task::spawn_blocking(|| query(ApiBackend::Auto))
            .await
            .map_err(|e| CameraError::Unsupported(format!("camera query task failed: {}", e)))?
            .map_err(|e| CameraError::DeviceNotFound(format!("Failed to query cameras: {}", e)))?;

        Ok(cameras
            .into_iter()
            .map(|info| {
                let mut device =
                    MediaDeviceInfo::video(info.index().to_string(), info.human_name());
                device.group_id = Some(info.misc());
                device
            })
            .collect())
    }

    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, CameraError> {
        let index = match &constraints.device_id {
            Some(id) => parse_index(id),
            None => CameraIndex::Index(0),
        };
        let requested = match (constraints.width, constraints.height) {
            (Some(width), Some(height)) => RequestedFormat::new::<RgbAFormat>(
                RequestedFormatType::HighestResolution(Resolution::new(width, height)),
            ),
            _ => RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution),
        };

        let slot: FrameSlot = Arc::new(Mutex::new(None));
        let camera = {
            let slot = slot.clone();
            let index = index.clone();
            tokio::task::spawn_blocking(move || NativeCamera::open(index, requested, slot))
                .await
                .map_err(|e| CameraError::AcquisitionError(format!("camera task failed: {}", e)))??
        };

        let stream_id = Uuid::new_v4().to_string();
        lock(&self.slots).insert(stream_id.clone(), Arc::downgrade(&slot));

        let track = Arc::new(NativeTrack {
            id: format!("{}-video", stream_id),
            device_id: index.to_string(),
            camera: Arc::new(camera),
            slot,
            live: AtomicBool::new(true),
        });
        log::info!("Opened camera {} ({})", index, track.camera.label);
        Ok(Arc::new(NativeStream {
            id: stream_id,
            tracks: Mutex::new(vec![track]),
        }))
    }
}

fn parse_index(id: &str) -> CameraIndex {
    id.parse::<u32>()
        .map(CameraIndex::Index)
        .unwrap_or_else(|_| CameraIndex::String(id.to_string()))
}

struct NativeCamera {
    camera: Mutex<CallbackCamera>,
    label: String,
    resolution: (u32, u32),
    frame_rate: u32,
}

impl NativeCamera {
    fn open(
        index: CameraIndex,
        requested: RequestedFormat,
        slot: FrameSlot,
    ) -> Result<Self, CameraError> {
        let mut camera = CallbackCamera::new(index, requested, move |buffer: nokhwa::Buffer| {
            match buffer.decode_image::<RgbAFormat>() {
                Ok(image) => {
                    let (width, height) = (image.width(), image.height());
                    *lock(&slot) = Some(Frame::new(width, height, image.into_raw()));
                }
                Err(e) => log::warn!("Dropping undecodable frame: {}", e),
            }
        })
        .map_err(|e| CameraError::AcquisitionError(format!("Failed to initialize camera: {}", e)))?;

        camera
            .open_stream()
            .map_err(|e| CameraError::AcquisitionError(format!("Failed to start stream: {}", e)))?;

        let label = camera
            .info()
            .map(|info| info.human_name())
            .unwrap_or_default();
        let format = camera
            .camera_format()
            .map_err(|e| CameraError::AcquisitionError(format!("Failed to read format: {}", e)))?;

        Ok(Self {
            camera: Mutex::new(camera),
            label,
            resolution: (format.resolution().width_x, format.resolution().height_y),
            frame_rate: format.frame_rate(),
        })
    }

    fn stop(&self) {
        if let Err(e) = lock(&self.camera).stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

// nokhwa's camera handles are driven from their own capture thread; all
// access from here goes through the mutex.
unsafe impl Send for NativeCamera {}
unsafe impl Sync for NativeCamera {}

struct NativeTrack {
    id: String,
    device_id: String,
    camera: Arc<NativeCamera>,
    slot: FrameSlot,
    live: AtomicBool,
}

#[async_trait]
impl VideoTrack for NativeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.camera.label
    }

    fn settings(&self) -> TrackSettings {
        let (width, height) = self.camera.resolution;
        TrackSettings {
            device_id: Some(self.device_id.clone()),
            facing: None,
            width: Some(width),
            height: Some(height),
        }
    }

    fn capabilities(&self) -> Option<Capabilities> {
        let (width, height) = self.camera.resolution;
        Some(Capabilities {
            torch: false,
            zoom: None,
            width: Some(CapabilityRange::new(1.0, width as f64)),
            height: Some(CapabilityRange::new(1.0, height as f64)),
            frame_rate: Some(CapabilityRange::new(1.0, self.camera.frame_rate as f64)),
        })
    }

    async fn apply_constraints(&self, constraints: &TrackConstraints) -> Result<(), CameraError> {
        if constraints.torch.is_some() {
            return Err(CameraError::Unsupported("torch control".to_string()));
        }
        Ok(())
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.camera.stop();
            *lock(&self.slot) = None;
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for NativeTrack {
    fn drop(&mut self) {
        VideoTrack::stop(self);
    }
}

struct NativeStream {
    id: String,
    tracks: Mutex<Vec<Arc<NativeTrack>>>,
}

impl MediaStream for NativeStream {
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

#[derive(Default)]
struct SinkState {
    source: Option<Arc<dyn MediaStream>>,
    slot: Option<FrameSlot>,
    playing: bool,
    mirrored: bool,
}

/// Off-screen sink that "renders" by keeping the newest decoded frame
pub struct HeadlessSink {
    devices: Arc<NativeMediaDevices>,
    state: Mutex<SinkState>,
}

impl HeadlessSink {
    pub fn new(devices: Arc<NativeMediaDevices>) -> Self {
        Self {
            devices,
            state: Mutex::new(SinkState::default()),
        }
    }

    fn latest(&self) -> Option<Frame> {
        let slot = lock(&self.state).slot.clone()?;
        let frame = lock(&slot).clone();
        frame
    }
}

#[async_trait]
impl VideoSink for HeadlessSink {
    fn set_source(&self, stream: Option<Arc<dyn MediaStream>>) {
        let slot = stream
            .as_ref()
            .and_then(|stream| self.devices.frame_slot(stream.id()));
        let mut state = lock(&self.state);
        state.source = stream;
        state.slot = slot;
        state.playing = false;
    }

    fn load(&self) {
        if lock(&self.state).source.is_none() {
            lock(&self.state).slot = None;
        }
    }

    async fn can_play(&self) -> Result<(), CameraError> {
        let state = lock(&self.state);
        match (&state.source, &state.slot) {
            (Some(_), Some(_)) => Ok(()),
            (Some(stream), None) => Err(CameraError::BindingError(format!(
                "stream {} was not opened by this backend",
                stream.id()
            ))),
            (None, _) => Err(CameraError::BindingError("no source assigned".to_string())),
        }
    }

    async fn play(&self) -> Result<(), CameraError> {
        lock(&self.state).playing = true;
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        let playing = lock(&self.state).playing;
        match (playing, self.latest().is_some()) {
            (true, true) => ReadyState::HaveEnoughData,
            (_, true) => ReadyState::HaveCurrentData,
            _ if lock(&self.state).source.is_some() => ReadyState::HaveMetadata,
            _ => ReadyState::HaveNothing,
        }
    }

    async fn emptied(&self) {}

    fn set_mirrored(&self, mirrored: bool) {
        lock(&self.state).mirrored = mirrored;
    }

    fn is_mirrored(&self) -> bool {
        lock(&self.state).mirrored
    }

    fn video_size(&self) -> (u32, u32) {
        self.latest()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or((0, 0))
    }

    fn current_frame(&self) -> Option<Frame> {
        self.latest()
    }
}
