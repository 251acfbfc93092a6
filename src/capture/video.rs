//! Video recording bound to a live session stream.
//!
//! The recorder itself is a platform collaborator; this adapter decides what
//! it records (the raw stream, or a re-rendered feed when the preview is
//! mirrored) and guards the `inactive -> recording <-> paused` transitions.

use crate::errors::CameraError;
use crate::lock;
use crate::platform::{MediaStream, VideoSink};
use crate::session::CameraSession;
use crate::types::{Frame, SessionState};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::imageops;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_VIDEO_MIME: &str = "video/webm";

/// Frame rate of the re-rendered feed used for mirrored previews
pub const RENDER_FPS: u32 = 30;

const FEED_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Inactive,
    Recording,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderOptions {
    pub mime_type: String,
    pub frame_rate: u32,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            mime_type: DEFAULT_VIDEO_MIME.to_string(),
            frame_rate: RENDER_FPS,
        }
    }
}

/// What a recorder consumes
pub enum RecordingSource {
    /// The live stream as delivered by the camera
    Stream(Arc<dyn MediaStream>),
    /// Frames re-rendered from the sink
    Frames(mpsc::Receiver<Frame>),
}

/// A platform media recorder
#[async_trait]
pub trait MediaRecorder: Send + Sync {
    fn start(&self) -> Result<(), CameraError>;

    fn pause(&self) -> Result<(), CameraError>;

    fn resume(&self) -> Result<(), CameraError>;

    /// Finalize the recording and hand back everything recorded
    async fn stop(&self) -> Result<Bytes, CameraError>;
}

pub trait RecorderFactory: Send + Sync {
    fn is_type_supported(&self, mime: &str) -> bool;

    fn create(
        &self,
        source: RecordingSource,
        options: &RecorderOptions,
    ) -> Result<Arc<dyn MediaRecorder>, CameraError>;
}

/// Background task copying sink frames, flipped as displayed, into a channel
struct RenderedFeed {
    task: JoinHandle<()>,
}

impl RenderedFeed {
    fn spawn(sink: Arc<dyn VideoSink>, fps: u32) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let period = Duration::from_secs(1) / fps.max(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(mut image) = sink.current_frame().and_then(|frame| frame.to_image())
                else {
                    continue;
                };
                imageops::flip_horizontal_in_place(&mut image);
                if tx.send(Frame::from_image(image)).await.is_err() {
                    break;
                }
            }
        });

        (Self { task }, rx)
    }
}

impl Drop for RenderedFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Binding {
    recorder: Arc<dyn MediaRecorder>,
    stream_id: String,
    _feed: Option<RenderedFeed>,
}

#[derive(Default)]
struct Recording {
    binding: Option<Binding>,
    state: RecordingState,
    started_at: Option<DateTime<Utc>>,
}

pub struct VideoCapture {
    factory: Arc<dyn RecorderFactory>,
    options: RecorderOptions,
    inner: Mutex<Recording>,
}

impl VideoCapture {
    pub fn new(factory: Arc<dyn RecorderFactory>, options: RecorderOptions) -> Self {
        Self {
            factory,
            options,
            inner: Mutex::new(Recording::default()),
        }
    }

    /// Bind a recorder to `stream`.
    ///
    /// Returns `Ok(false)` and leaves the adapter unbound when the configured
    /// MIME type is not supported. Binding the stream already bound is a
    /// no-op.
    pub fn bind(
        &self,
        stream: Arc<dyn MediaStream>,
        sink: Option<Arc<dyn VideoSink>>,
    ) -> Result<bool, CameraError> {
        let mut inner = lock(&self.inner);
        if inner
            .binding
            .as_ref()
            .is_some_and(|binding| binding.stream_id == stream.id())
        {
            return Ok(true);
        }

        if !self.factory.is_type_supported(&self.options.mime_type) {
            log::warn!("Codec not supported: {}", self.options.mime_type);
            *inner = Recording::default();
            return Ok(false);
        }
        if inner.state != RecordingState::Inactive {
            log::warn!("Rebinding recorder while {:?}, recording discarded", inner.state);
        }

        let stream_id = stream.id().to_string();
        let (source, feed) = match sink.filter(|sink| sink.is_mirrored()) {
            Some(sink) => {
                let (feed, frames) = RenderedFeed::spawn(sink, self.options.frame_rate);
                (RecordingSource::Frames(frames), Some(feed))
            }
            None => (RecordingSource::Stream(stream), None),
        };
        let recorder = self.factory.create(source, &self.options)?;

        log::debug!(
            "Recorder bound to stream {} ({}, re-rendered: {})",
            stream_id,
            self.options.mime_type,
            feed.is_some()
        );
        *inner = Recording {
            binding: Some(Binding {
                recorder,
                stream_id,
                _feed: feed,
            }),
            ..Recording::default()
        };
        Ok(true)
    }

    /// Drop the bound recorder, discarding anything not yet stopped
    pub fn unbind(&self) {
        *lock(&self.inner) = Recording::default();
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.inner).binding.is_some()
    }

    pub fn state(&self) -> RecordingState {
        lock(&self.inner).state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner).started_at
    }

    pub fn start(&self) -> Result<(), CameraError> {
        let mut inner = lock(&self.inner);
        let Some(binding) = &inner.binding else {
            return Ok(());
        };
        binding.recorder.start()?;
        inner.state = RecordingState::Recording;
        inner.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn pause(&self) -> Result<(), CameraError> {
        let mut inner = lock(&self.inner);
        if inner.state != RecordingState::Recording {
            return Ok(());
        }
        if let Some(binding) = &inner.binding {
            binding.recorder.pause()?;
            inner.state = RecordingState::Paused;
        }
        Ok(())
    }

    pub fn resume(&self) -> Result<(), CameraError> {
        let mut inner = lock(&self.inner);
        if inner.state != RecordingState::Paused {
            return Ok(());
        }
        if let Some(binding) = &inner.binding {
            binding.recorder.resume()?;
            inner.state = RecordingState::Recording;
        }
        Ok(())
    }

    /// Finish the recording.
    ///
    /// Resolves to `None` when nothing is bound, nothing was started, or the
    /// recorder produced no data.
    pub async fn stop(&self) -> Result<Option<Bytes>, CameraError> {
        let recorder = {
            let mut inner = lock(&self.inner);
            if inner.state == RecordingState::Inactive {
                return Ok(None);
            }
            inner.state = RecordingState::Inactive;
            match &inner.binding {
                Some(binding) => binding.recorder.clone(),
                None => return Ok(None),
            }
        };

        let data = recorder.stop().await?;
        if data.is_empty() {
            log::debug!("Recorder produced no data");
            return Ok(None);
        }
        log::info!("Recording finished ({} bytes)", data.len());
        Ok(Some(data))
    }

    /// Keep this adapter bound to whatever `session` is displaying.
    ///
    /// Rebinds each time the session reaches `display` with a new stream and
    /// unbinds when it returns to `idle`. The task ends with the session.
    pub fn follow(self: &Arc<Self>, session: &CameraSession) -> JoinHandle<()> {
        let capture = Arc::clone(self);
        let controller = session.controller();
        let mut states = session.subscribe();

        tokio::spawn(async move {
            loop {
                let state = *states.borrow_and_update();
                match state {
                    SessionState::Display => {
                        if let Some(stream) = controller.stream() {
                            if let Err(e) = capture.bind(stream, controller.sink()) {
                                log::warn!("Failed to bind recorder: {}", e);
                            }
                        }
                    }
                    SessionState::Idle => {
                        if capture.is_bound() {
                            capture.unbind();
                        }
                    }
                    SessionState::Starting | SessionState::Stopping => {}
                }
                if states.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MediaDevices;
    use crate::testing::{front_and_back, FakeMediaDevices, FakeRecorderFactory, FakeSink};
    use crate::types::StreamConstraints;

    async fn stream() -> Arc<dyn MediaStream> {
        FakeMediaDevices::with_devices(front_and_back())
            .get_user_media(&StreamConstraints::default())
            .await
            .unwrap()
    }

    fn capture(factory: &Arc<FakeRecorderFactory>) -> VideoCapture {
        VideoCapture::new(factory.clone(), RecorderOptions::default())
    }

    #[tokio::test]
    async fn test_unbound_adapter_is_inert() {
        let factory = Arc::new(FakeRecorderFactory::new());
        let video = capture(&factory);

        video.start().unwrap();
        assert_eq!(video.state(), RecordingState::Inactive);
        assert_eq!(video.stop().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsupported_mime_leaves_unbound() {
        let factory = Arc::new(FakeRecorderFactory::new());
        factory.reject_mime(DEFAULT_VIDEO_MIME);
        let video = capture(&factory);

        assert!(!video.bind(stream().await, None).unwrap());
        assert!(!video.is_bound());
        assert!(factory.recorders().is_empty());
    }

    #[tokio::test]
    async fn test_state_guards() {
        let factory = Arc::new(FakeRecorderFactory::new());
        let video = capture(&factory);
        video.bind(stream().await, None).unwrap();

        video.pause().unwrap();
        video.resume().unwrap();
        assert_eq!(video.state(), RecordingState::Inactive);

        video.start().unwrap();
        assert!(video.started_at().is_some());
        video.resume().unwrap();
        video.pause().unwrap();
        assert_eq!(video.state(), RecordingState::Paused);
        video.pause().unwrap();
        video.resume().unwrap();
        assert_eq!(video.state(), RecordingState::Recording);

        let data = video.stop().await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"fake-recording"[..]));
        assert_eq!(video.state(), RecordingState::Inactive);
        assert_eq!(
            factory.last_recorder().unwrap().calls(),
            vec!["start", "pause", "resume", "stop"]
        );
    }

    #[tokio::test]
    async fn test_empty_recording_is_none() {
        let factory = Arc::new(FakeRecorderFactory::new());
        factory.set_payload(Bytes::new());
        let video = capture(&factory);
        video.bind(stream().await, None).unwrap();
        video.start().unwrap();
        assert_eq!(video.stop().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unmirrored_sink_records_stream() {
        let factory = Arc::new(FakeRecorderFactory::new());
        let video = capture(&factory);
        let sink = Arc::new(FakeSink::new());
        video.bind(stream().await, Some(sink)).unwrap();
        assert_eq!(factory.last_recorder().unwrap().source_kind(), "stream");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mirrored_sink_records_flipped_frames() {
        let factory = Arc::new(FakeRecorderFactory::new());
        let video = capture(&factory);
        let stream = stream().await;
        let sink = Arc::new(FakeSink::new());
        sink.set_source(Some(stream.clone()));
        sink.set_mirrored(true);
        let frame = crate::testing::synthetic_frame(1, 8, 4);
        let raw = frame.to_image().unwrap();
        sink.set_frame(Some(frame));

        video.bind(stream, Some(sink)).unwrap();
        let recorder = factory.last_recorder().unwrap();
        assert_eq!(recorder.source_kind(), "frames");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(recorder.frames_received() >= 5);
        let recorded = recorder.last_frame().unwrap().to_image().unwrap();
        assert_eq!(recorded.get_pixel(0, 0), raw.get_pixel(7, 0));
    }

    #[tokio::test]
    async fn test_rebinding_same_stream_is_noop() {
        let factory = Arc::new(FakeRecorderFactory::new());
        let video = capture(&factory);
        let stream = stream().await;
        video.bind(stream.clone(), None).unwrap();
        video.bind(stream, None).unwrap();
        assert_eq!(factory.recorders().len(), 1);
    }
}
