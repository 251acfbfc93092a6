//! Synthetic frames and device fixtures.
//!
//! Lets capture and lifecycle code be exercised without camera hardware.

use crate::types::{Facing, Frame, MediaDeviceInfo};

/// Create a synthetic RGBA frame.
///
/// The gradient shifts with `frame_number` and varies along both axes, so a
/// horizontal flip is always observable in the pixel data.
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> Frame {
    let mut data = vec![0u8; (width * height * 4) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 4) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x * 7 + y) % 256) as u8);
            data[idx + 3] = 255;
        }
    }

    Frame::new(width, height, data)
}

/// The two-camera phone layout used throughout the lifecycle tests:
/// `a` is the selfie camera, `b` the rear one. Neither reports facing, so
/// classification falls back to the labels.
pub fn front_and_back() -> Vec<MediaDeviceInfo> {
    vec![
        MediaDeviceInfo::video("a", "front cam"),
        MediaDeviceInfo::video("b", "back cam"),
    ]
}

/// A laptop-like layout where the platform reports facing explicitly
pub fn reported_facing_devices() -> Vec<MediaDeviceInfo> {
    vec![
        MediaDeviceInfo::video("integrated", "Integrated Webcam").with_facing(Facing::Front),
        MediaDeviceInfo::video("document", "Document Camera").with_facing(Facing::Back),
    ]
}
