//! camstream: camera stream lifecycle management
//!
//! This crate manages a device camera stream inside an interactive
//! application: enumerating capture devices, opening and closing a live
//! stream bound to a video sink, toggling the torch, and deriving photos
//! and recordings from the live feed.
//!
//! # Features
//! - Permission probing and device enumeration with front/back classification
//! - A start/stop state machine where the latest request wins
//! - Guaranteed release of camera hardware on stop, error and drop
//! - Photo and video capture adapters
//! - Hot-plug monitoring
//! - A nokhwa backend behind the `native` feature
//!
//! # Usage
//! ```rust,ignore
//! use camstream::{CameraSession, SessionConfig};
//!
//! let session = CameraSession::builder(media_devices)
//!     .config(SessionConfig::load_or_default())
//!     .on_error(|e| eprintln!("camera error: {}", e))
//!     .build();
//!
//! session.attach_sink(sink).await;   // enumerates and auto-starts
//! session.select_device("1").await;  // switch cameras
//! session.deactivate().await;        // release the camera
//! ```
pub mod capture;
pub mod config;
pub mod devices;
pub mod errors;
pub mod events;
pub mod invariant_ppt;
pub mod permissions;
pub mod platform;
pub mod session;
pub mod store;
pub mod stream;
pub mod types;

// Testing utilities - scriptable fakes and synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use capture::{ImageMime, PhotoCapture, RecordingState, VideoCapture};
pub use config::SessionConfig;
pub use devices::DeviceAccess;
pub use errors::CameraError;
pub use events::SessionEvent;
pub use platform::{DeviceEvent, DeviceMonitor, MediaDevices, MediaStream, VideoSink, VideoTrack};
pub use session::{CameraSession, CameraSessionBuilder};
pub use store::{DeviceIdStore, FileStore, MemoryStore};
pub use stream::{ErrorCallback, StreamController};
pub use types::{
    Capabilities, Device, Facing, Frame, SessionState, StreamConstraints, Visibility,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Initialize logging for the camera system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camstream=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        native_backend: cfg!(feature = "native"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub native_backend: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "camstream");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let poisoner = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        *lock(&mutex) += 1;
        assert_eq!(*lock(&mutex), 2);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
