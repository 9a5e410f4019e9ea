use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

use crate::error::FrameError;

/// Channel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    /// Single-channel grayscale
    Gray,
    /// Three channels, blue first (camera order)
    Bgr,
    /// Three channels, red first
    Rgb,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Bgr | ChannelLayout::Rgb => 3,
        }
    }
}

/// An owned image buffer submitted for classification.
///
/// Pixels are stored interleaved, row-major. A frame is immutable once built;
/// layout conversions return a new frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyFrame);
        }
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Build a frame from a decoded image. 8-bit grayscale stays grayscale,
    /// everything else is converted to RGB.
    pub fn from_image(img: DynamicImage) -> Result<Self, FrameError> {
        match img {
            DynamicImage::ImageLuma8(gray) => {
                let (w, h) = gray.dimensions();
                Self::new(w, h, ChannelLayout::Gray, gray.into_raw())
            }
            other => {
                let rgb = other.to_rgb8();
                let (w, h) = rgb.dimensions();
                Self::new(w, h, ChannelLayout::Rgb, rgb.into_raw())
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Re-encode the frame into `target`.
    ///
    /// Gray to color replicates the single channel into all three; color to
    /// gray uses the Rec. 601 luma weights; Bgr and Rgb swap the outer channels.
    pub fn to_layout(&self, target: ChannelLayout) -> Frame {
        if self.layout == target {
            return self.clone();
        }
        let data = match (self.layout, target) {
            (ChannelLayout::Gray, _) => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            (ChannelLayout::Rgb, ChannelLayout::Gray) => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
            (ChannelLayout::Bgr, ChannelLayout::Gray) => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[2], px[1], px[0]))
                .collect(),
            // Bgr <-> Rgb
            _ => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };
        Frame {
            width: self.width,
            height: self.height,
            layout: target,
            data,
        }
    }

    /// Convert to an `image` buffer suitable for resizing or saving.
    /// Bgr frames come out as RGB.
    pub fn to_image(&self) -> DynamicImage {
        match self.layout {
            ChannelLayout::Gray => {
                let buf: Option<GrayImage> =
                    ImageBuffer::<Luma<u8>, _>::from_raw(self.width, self.height, self.data.clone());
                // Length was checked in `new`, so from_raw cannot fail here.
                DynamicImage::ImageLuma8(buf.unwrap_or_else(|| GrayImage::new(self.width, self.height)))
            }
            ChannelLayout::Rgb | ChannelLayout::Bgr => {
                let rgb = self.to_layout(ChannelLayout::Rgb);
                let buf: Option<RgbImage> =
                    ImageBuffer::<Rgb<u8>, _>::from_raw(rgb.width, rgb.height, rgb.data);
                DynamicImage::ImageRgb8(buf.unwrap_or_else(|| RgbImage::new(self.width, self.height)))
            }
        }
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}
