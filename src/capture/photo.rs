//! Still photos from the frame currently on the sink.

use crate::errors::CameraError;
use crate::platform::VideoSink;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

/// Encoded output format of a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageMime {
    #[default]
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
        }
    }

    /// Guess from a file name's extension, defaulting to PNG
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            ImageMime::Jpeg
        } else {
            ImageMime::Png
        }
    }
}

impl FromStr for ImageMime {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image/png" | "png" => Ok(ImageMime::Png),
            "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => Ok(ImageMime::Jpeg),
            other => Err(CameraError::Unsupported(format!("image type {}", other))),
        }
    }
}

pub struct PhotoCapture {
    sink: Arc<dyn VideoSink>,
    mime: ImageMime,
    jpeg_quality: u8,
}

impl PhotoCapture {
    pub fn new(sink: Arc<dyn VideoSink>, mime: ImageMime) -> Self {
        Self {
            sink,
            mime,
            jpeg_quality: 90,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    /// Grab the current frame at the feed's native size, as displayed.
    ///
    /// A mirrored sink only mirrors on screen, so the flip is re-applied
    /// here to make the photo match the preview.
    pub fn snapshot(&self) -> Result<RgbaImage, CameraError> {
        let frame = self
            .sink
            .current_frame()
            .ok_or_else(|| CameraError::CaptureError("no frame on the video sink".to_string()))?;
        let mut image = frame.to_image().ok_or_else(|| {
            CameraError::CaptureError(format!(
                "frame buffer does not match {}x{}",
                frame.width, frame.height
            ))
        })?;

        let (width, height) = self.sink.video_size();
        if width > 0 && height > 0 && image.dimensions() != (width, height) {
            log::debug!(
                "Scaling snapshot from {:?} to native {}x{}",
                image.dimensions(),
                width,
                height
            );
            image = imageops::resize(&image, width, height, FilterType::Triangle);
        }

        if self.sink.is_mirrored() {
            imageops::flip_horizontal_in_place(&mut image);
        }
        Ok(image)
    }

    /// Encoded image bytes in the configured format
    pub fn take_as_bytes(&self) -> Result<Bytes, CameraError> {
        let image = self.snapshot()?;
        let bytes = encode(image, self.mime, self.jpeg_quality)?;
        log::info!("Captured {} photo ({} bytes)", self.mime.as_str(), bytes.len());
        Ok(bytes)
    }

    /// `data:` URI of the encoded image
    pub fn take_as_data_url(&self) -> Result<String, CameraError> {
        let bytes = self.take_as_bytes()?;
        Ok(format!(
            "data:{};base64,{}",
            self.mime.as_str(),
            STANDARD.encode(&bytes)
        ))
    }
}

fn encode(image: RgbaImage, mime: ImageMime, jpeg_quality: u8) -> Result<Bytes, CameraError> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);

    let result = match mime {
        ImageMime::Png => image.write_to(&mut cursor, image::ImageFormat::Png),
        ImageMime::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::from(DynamicImage::ImageRgba8(image).into_rgb8());
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, jpeg_quality);
            rgb.write_with_encoder(encoder)
        }
    };
    result.map_err(|e| CameraError::CaptureError(format!("failed to encode photo: {}", e)))?;

    Ok(Bytes::from(buffer))
}
