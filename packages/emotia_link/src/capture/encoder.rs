use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::error::{LinkError, Result};

pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 240;
pub const DEFAULT_QUALITY: u8 = 60;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Turns a sampled frame into the JPEG data URL the prediction endpoint
/// expects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameEncoder {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl FrameEncoder {
    pub fn encode(&self, frame: &DynamicImage) -> Result<String> {
        if self.width == 0 || self.height == 0 {
            return Err(LinkError::Encode(format!(
                "invalid raster size {}x{}",
                self.width, self.height
            )));
        }

        let raster = frame
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality.clamp(1, 100));
        encoder
            .encode_image(&raster)
            .map_err(|e| LinkError::Encode(e.to_string()))?;

        Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(&jpeg)))
    }
}
