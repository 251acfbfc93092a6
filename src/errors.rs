use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Stream acquisition error: {0}")]
    AcquisitionError(String),
    #[error("Camera capability error: {0}")]
    CapabilityError(String),
    #[error("Video sink binding error: {0}")]
    BindingError(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Capture error: {0}")]
    CaptureError(String),
}

impl CameraError {
    /// Collapse any platform failure into an acquisition failure.
    ///
    /// Platforms do not reliably distinguish denial, a missing device and a
    /// busy device, so callers always see the same variant.
    pub fn into_acquisition(self) -> Self {
        match self {
            CameraError::AcquisitionError(_) => self,
            other => CameraError::AcquisitionError(other.to_string()),
        }
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => "permission_denied",
            CameraError::DeviceNotFound(_) => "device_not_found",
            CameraError::AcquisitionError(_) => "acquisition",
            CameraError::CapabilityError(_) => "capability",
            CameraError::BindingError(_) => "binding",
            CameraError::Unsupported(_) => "unsupported",
            CameraError::ConfigError(_) => "config",
            CameraError::StorageError(_) => "storage",
            CameraError::CaptureError(_) => "capture",
        }
    }
}
