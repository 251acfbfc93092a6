//! Device access layer: permission probing, enumeration with facing
//! classification, stream acquisition and torch control.

pub mod facing;

use crate::errors::CameraError;
use crate::permissions::PermissionStatus;
use crate::platform::{MediaDevices, MediaStream};
use crate::types::{Device, MediaDeviceKind, StreamConstraints, TrackConstraints};
use std::sync::Arc;

/// Thin wrapper over the platform's [`MediaDevices`] primitives
#[derive(Clone)]
pub struct DeviceAccess {
    media: Arc<dyn MediaDevices>,
}

impl DeviceAccess {
    pub fn new(media: Arc<dyn MediaDevices>) -> Self {
        Self { media }
    }

    /// Make sure the user has been asked for camera access.
    ///
    /// When the permission state cannot be queried, or is undetermined, a
    /// throwaway stream is opened to trigger the prompt and its tracks are
    /// stopped straight away.
    pub async fn request_permission(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<(), CameraError> {
        let status = match self.media.query_permission().await {
            Ok(status) => status,
            Err(e) => {
                log::debug!("Permission query unavailable ({}), prompting", e);
                PermissionStatus::NotDetermined
            }
        };

        if status == PermissionStatus::Granted {
            return Ok(());
        }
        if !status.needs_prompt() {
            return Err(CameraError::PermissionDenied(format!(
                "camera permission is {}",
                status
            )));
        }

        log::info!("Requesting camera permission");
        let stream = self.acquire_stream(constraints, None).await?;
        stop_tracks(stream.as_ref());
        Ok(())
    }

    /// Request permission, then list video input devices filtered by the
    /// facing constraint if set
    pub async fn list_devices(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Vec<Device>, CameraError> {
        self.request_permission(constraints).await?;
        self.enumerate_devices(constraints).await
    }

    /// List video input devices without probing permission.
    ///
    /// Never opens a stream, so it is safe to call while one is live.
    pub async fn enumerate_devices(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Vec<Device>, CameraError> {
        let devices: Vec<Device> = self
            .media
            .enumerate_devices()
            .await?
            .into_iter()
            .filter(|info| info.kind == MediaDeviceKind::VideoInput)
            .map(|info| {
                let facing = facing::classify(info.facing, &info.label);
                Device::new(info.device_id, info.label, facing)
            })
            .filter(|device| constraints.facing.map_or(true, |f| device.facing == f))
            .collect();

        log::info!("Found {} cameras", devices.len());
        for device in &devices {
            log::debug!("Camera: {} - {} ({})", device.id, device.label, device.facing);
        }
        Ok(devices)
    }

    /// Acquire a live stream, optionally pinned to `device_id`
    pub async fn acquire_stream(
        &self,
        constraints: &StreamConstraints,
        device_id: Option<&str>,
    ) -> Result<Arc<dyn MediaStream>, CameraError> {
        let constraints = match device_id {
            Some(id) => constraints.pinned_to(id),
            None => constraints.clone(),
        };

        self.media
            .get_user_media(&constraints)
            .await
            .map_err(CameraError::into_acquisition)
    }

    /// Switch the torch of the stream's first video track.
    ///
    /// Silently does nothing when the track does not report torch support.
    pub async fn set_torch(
        &self,
        stream: &dyn MediaStream,
        enabled: bool,
    ) -> Result<(), CameraError> {
        let Some(track) = stream.video_tracks().into_iter().next() else {
            return Ok(());
        };

        let supported = track.capabilities().is_some_and(|caps| caps.torch);
        if !supported {
            log::debug!("Torch not supported on track {}", track.id());
            return Ok(());
        }

        track
            .apply_constraints(&TrackConstraints::torch(enabled))
            .await
            .map_err(|e| CameraError::CapabilityError(format!("failed to set torch: {}", e)))
    }
}

/// Stop and detach every video track of `stream`
pub(crate) fn stop_tracks(stream: &dyn MediaStream) {
    for track in stream.video_tracks() {
        stream.remove_track(track.id());
        track.stop();
    }
}
