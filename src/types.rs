//! Core data types shared by the device layer, the stream controller and the
//! capture adapters.

use bytes::Bytes;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way a camera points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// User-facing ("selfie") camera
    #[serde(alias = "user")]
    Front,
    /// Environment-facing camera
    #[serde(alias = "environment", alias = "rear")]
    Back,
    #[default]
    Unknown,
}

impl Facing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Front => "front",
            Facing::Back => "back",
            Facing::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Facing::Unknown)
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaDeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Raw device entry as reported by the platform enumeration primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: MediaDeviceKind,
    pub group_id: Option<String>,
    /// Facing mode when the platform reports it alongside the device
    pub facing: Option<Facing>,
}

impl MediaDeviceInfo {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: MediaDeviceKind::VideoInput,
            group_id: None,
            facing: None,
        }
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = Some(facing);
        self
    }

    pub fn with_kind(mut self, kind: MediaDeviceKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A classified video input device.
///
/// Snapshot from a single enumeration. Device lists are replaced wholesale on
/// every enumeration, so hold on to `id` rather than to the struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub label: String,
    pub facing: Facing,
}

impl Device {
    pub fn new(id: impl Into<String>, label: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            facing,
        }
    }
}

/// Inclusive numeric range reported for a capability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRange {
    pub min: f64,
    pub max: f64,
    pub step: Option<f64>,
}

impl CapabilityRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            step: None,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Hardware-controllable features of the active video track
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub torch: bool,
    pub zoom: Option<CapabilityRange>,
    pub width: Option<CapabilityRange>,
    pub height: Option<CapabilityRange>,
    pub frame_rate: Option<CapabilityRange>,
}

impl Capabilities {
    pub fn with_torch(mut self, torch: bool) -> Self {
        self.torch = torch;
        self
    }
}

/// Settings currently in effect on a video track
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackSettings {
    pub device_id: Option<String>,
    pub facing: Option<Facing>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Constraint set applied to a live track
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackConstraints {
    pub torch: Option<bool>,
}

impl TrackConstraints {
    pub fn torch(enabled: bool) -> Self {
        Self {
            torch: Some(enabled),
        }
    }
}

/// Constraints used when requesting a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConstraints {
    pub video: bool,
    pub audio: bool,
    /// Restrict enumeration and acquisition to one facing mode
    pub facing: Option<Facing>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Pin acquisition to a specific device
    pub device_id: Option<String>,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: false,
            facing: None,
            width: None,
            height: None,
            device_id: None,
        }
    }
}

impl StreamConstraints {
    /// Copy of these constraints pinned to `device_id`.
    ///
    /// A pinned device makes the facing filter meaningless, so it is dropped.
    pub fn pinned_to(&self, device_id: &str) -> Self {
        Self {
            video: true,
            facing: None,
            device_id: Some(device_id.to_string()),
            ..self.clone()
        }
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = Some(facing);
        self
    }
}

/// Media readiness as reported by a sink, ordered from least to most ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Lifecycle state of a camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Display,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Display => "display",
            SessionState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// A decoded video frame in tightly packed RGBA8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// View the frame as an image buffer; `None` when the buffer size does
    /// not match the dimensions
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
    }
}
