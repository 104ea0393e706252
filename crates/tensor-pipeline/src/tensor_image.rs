//! Raw image input

use image::DynamicImage;

use crate::{TensorBuffer, TransformError};

/// Decoded 8-bit image with interleaved channels
#[derive(Debug, Clone)]
pub struct TensorImage {
    /// Pixel data (width * height * channels)
    data: Vec<u8>,
    width: u32,
    height: u32,
    /// 1 (gray), 3 (RGB) or 4 (RGBA)
    channels: usize,
}

impl TensorImage {
    /// Create an image from raw interleaved pixel data
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: usize) -> Result<Self, TransformError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(TransformError::InvalidParameter(format!(
                "unsupported channel count {channels}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(TransformError::InvalidParameter(format!(
                "image must not be empty, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * channels;
        if data.len() != expected {
            return Err(TransformError::ShapeMismatch {
                elements: data.len(),
                shape: vec![height as usize, width as usize, channels],
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Create an image from RGB data
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, TransformError> {
        Self::new(data, width, height, 3)
    }

    /// Convert a decoded image, keeping grayscale images single-channel
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageLuma8(gray) => Self {
                data: gray.as_raw().clone(),
                width,
                height,
                channels: 1,
            },
            DynamicImage::ImageRgba8(rgba) => Self {
                data: rgba.as_raw().clone(),
                width,
                height,
                channels: 4,
            },
            other => Self {
                data: other.to_rgb8().into_raw(),
                width,
                height,
                channels: 3,
            },
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the channel values of the pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * self.channels;
        Some(&self.data[idx..idx + self.channels])
    }

    /// Tensor of shape `[height, width, channels]`
    pub fn to_buffer(&self) -> TensorBuffer {
        self.clone().into_buffer()
    }

    /// Consume the image into a tensor of shape `[height, width, channels]`
    pub fn into_buffer(self) -> TensorBuffer {
        let shape = [self.height as usize, self.width as usize, self.channels];
        match TensorBuffer::from_vec(&shape, self.data) {
            Ok(buffer) => buffer,
            // Length is checked by every constructor
            Err(_) => unreachable!("image data length matches its dimensions"),
        }
    }
}
