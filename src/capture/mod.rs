//! Capture adapters built on a live session: still photos and recordings.

pub mod photo;
pub mod video;

pub use photo::{ImageMime, PhotoCapture};
pub use video::{
    MediaRecorder, RecorderFactory, RecorderOptions, RecordingSource, RecordingState,
    VideoCapture,
};
