use crate::error::{ProcessingError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::sync::Arc;

/// JPEG quality used for HTTP camera snapshots.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 85;

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// 3 bytes per pixel, blue first. Native capture order.
    Bgr24,
    /// 3 bytes per pixel, red first. Published order for consumers.
    Rgb24,
}

impl FrameFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Bgr24 | FrameFormat::Rgb24 => 3,
        }
    }
}

/// A single captured frame with shared ownership of the pixel buffer.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(width: u32, height: u32, data: Vec<u8>, format: FrameFormat) -> Self {
        Self {
            width,
            height,
            data: Arc::new(data),
            format,
        }
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Return an RGB copy of this frame, swapping channels when needed.
    pub fn to_rgb(&self) -> Result<FrameData> {
        match self.format {
            FrameFormat::Rgb24 => Ok(self.clone()),
            FrameFormat::Bgr24 => {
                let mut rgb = self.data.as_ref().clone();
                for px in rgb.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                Ok(FrameData::new(self.width, self.height, rgb, FrameFormat::Rgb24))
            }
        }
    }

    /// View this frame as an owned `RgbImage`, converting from BGR if needed.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let rgb = self.to_rgb()?;
        RgbImage::from_raw(rgb.width, rgb.height, rgb.data.as_ref().clone()).ok_or_else(|| {
            ProcessingError::Conversion {
                details: format!(
                    "buffer of {} bytes does not match {}x{}",
                    rgb.data.len(),
                    rgb.width,
                    rgb.height
                ),
            }
            .into()
        })
    }

    /// Average the three channels into a grayscale plane.
    ///
    /// Channel order does not matter for the luma approximation used by the
    /// motion analyzer, so BGR frames are handled without a swap.
    pub fn to_gray(&self) -> Result<image::GrayImage> {
        if !self.validate_size() {
            return Err(ProcessingError::Conversion {
                details: format!(
                    "buffer of {} bytes does not match {}x{}",
                    self.data.len(),
                    self.width,
                    self.height
                ),
            }
            .into());
        }

        let mut gray = image::GrayImage::new(self.width, self.height);
        for (i, px) in self.data.chunks_exact(3).enumerate() {
            let x = (i as u32) % self.width;
            let y = (i as u32) / self.width;
            let luma = (px[0] as u16 + px[1] as u16 + px[2] as u16) / 3;
            gray.put_pixel(x, y, image::Luma([luma as u8]));
        }
        Ok(gray)
    }
}

/// Encode a frame as JPEG at the given quality.
pub fn encode_jpeg(frame: &FrameData, quality: u8) -> Result<Vec<u8>> {
    let img = frame.to_rgb_image()?;

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(&img)
        .map_err(|e| ProcessingError::JpegEncoding {
            details: e.to_string(),
        })?;

    Ok(buf)
}
