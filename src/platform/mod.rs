//! Collaborator contracts the camera core is written against.
//!
//! The platform supplies device enumeration, stream acquisition and a video
//! sink; the core only consumes these traits and tolerates the optional entry
//! points (permission query, track capabilities) being absent.

pub mod device_monitor;
#[cfg(feature = "native")]
pub mod native;

use crate::errors::CameraError;
use crate::permissions::PermissionStatus;
use crate::types::{
    Capabilities, Frame, MediaDeviceInfo, ReadyState, StreamConstraints, TrackConstraints,
    TrackSettings,
};
use async_trait::async_trait;
use std::sync::Arc;

pub use device_monitor::{DeviceEvent, DeviceMonitor};

/// Device enumeration and stream acquisition primitives
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Query the camera permission state.
    ///
    /// Return `CameraError::Unsupported` when the platform has no query.
    async fn query_permission(&self) -> Result<PermissionStatus, CameraError>;

    /// Enumerate every media device, of all kinds
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, CameraError>;

    /// Open a live stream satisfying `constraints`
    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, CameraError>;
}

/// A live stream holding one or more tracks
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn video_tracks(&self) -> Vec<Arc<dyn VideoTrack>>;

    /// Detach a track from this stream; unknown ids are ignored
    fn remove_track(&self, track_id: &str);
}

/// A single video track of a live stream
#[async_trait]
pub trait VideoTrack: Send + Sync {
    fn id(&self) -> &str;

    fn label(&self) -> &str;

    fn settings(&self) -> TrackSettings;

    /// Hardware capabilities; `None` when the platform cannot report them
    fn capabilities(&self) -> Option<Capabilities>;

    async fn apply_constraints(&self, constraints: &TrackConstraints) -> Result<(), CameraError>;

    /// Stop the track and release the underlying hardware
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Rendering target a live stream is attached to
#[async_trait]
pub trait VideoSink: Send + Sync {
    /// Assign (or clear with `None`) the stream being rendered
    fn set_source(&self, stream: Option<Arc<dyn MediaStream>>);

    /// Force the sink to reload its current source
    fn load(&self);

    /// Resolve once the sink can begin playback of its source
    async fn can_play(&self) -> Result<(), CameraError>;

    async fn play(&self) -> Result<(), CameraError>;

    fn ready_state(&self) -> ReadyState;

    /// Resolve once the sink has dropped its media after a reload with no
    /// source (the sink's error/emptied signal)
    async fn emptied(&self);

    fn set_mirrored(&self, mirrored: bool);

    fn is_mirrored(&self) -> bool;

    /// Native resolution of the feed being rendered
    fn video_size(&self) -> (u32, u32);

    /// The frame currently on display, if any
    fn current_frame(&self) -> Option<Frame>;
}
