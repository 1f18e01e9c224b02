use crate::error::{Result, ScanError};
use crate::geometry::Size;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit greyscale, one byte per pixel
    Luma8,
    /// YUV 4:2:0 with a full-resolution luma plane first
    Yuv420,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
    /// RGBA, four bytes per pixel
    Rgba8,
}

impl FrameFormat {
    /// Expected buffer length for a frame of the given dimensions
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            FrameFormat::Luma8 => pixels,
            FrameFormat::Yuv420 => pixels + 2 * (pixels / 4),
            FrameFormat::Rgb24 => pixels * 3,
            FrameFormat::Rgba8 => pixels * 4,
        }
    }
}

/// Sensor rotation reported alongside each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Rotate0,
    /// Rotate 90 degrees clockwise
    Rotate90,
    Rotate180,
    /// Rotate 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Rotate0),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }
}

/// Callback run exactly once when a frame's buffer is released
pub type ReleaseHook = Box<dyn FnOnce(u64) + Send + Sync>;

/// One camera frame owned by the analysis loop for a single cycle.
///
/// The platform buffer is returned through the release hook when the frame
/// is dropped, so every path out of an analysis cycle releases it.
pub struct Frame {
    /// Capture-order sequence number
    pub sequence: u64,
    pub timestamp: SystemTime,
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub rotation: Rotation,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(
        sequence: u64,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
        rotation: Rotation,
    ) -> Self {
        Self {
            sequence,
            timestamp: SystemTime::now(),
            data: Arc::new(data),
            width,
            height,
            format,
            rotation,
            release: None,
        }
    }

    /// Attach the hook that hands the buffer back to the frame source
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn validate_size(&self) -> bool {
        self.data.len() >= self.format.buffer_len(self.width, self.height)
    }

    /// Greyscale value at `(x, y)`, or 0 outside the buffer.
    pub fn luma_at(&self, x: usize, y: usize) -> u8 {
        let width = self.width as usize;
        match self.format {
            FrameFormat::Luma8 | FrameFormat::Yuv420 => {
                self.data.get(y * width + x).copied().unwrap_or(0)
            }
            FrameFormat::Rgb24 | FrameFormat::Rgba8 => {
                let bpp = if self.format == FrameFormat::Rgb24 { 3 } else { 4 };
                let offset = (y * width + x) * bpp;
                match self.data.get(offset..offset + 3) {
                    Some(px) => {
                        // ITU-R BT.601 luma weights
                        let luma = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
                        (luma / 1000) as u8
                    }
                    None => 0,
                }
            }
        }
    }

    /// Greyscale plane of the frame, sharing the buffer when it already is one
    pub fn luma_plane(&self) -> Arc<Vec<u8>> {
        match self.format {
            FrameFormat::Luma8 | FrameFormat::Yuv420 => Arc::clone(&self.data),
            FrameFormat::Rgb24 | FrameFormat::Rgba8 => {
                let (width, height) = (self.width as usize, self.height as usize);
                let mut plane = Vec::with_capacity(width * height);
                for y in 0..height {
                    for x in 0..width {
                        plane.push(self.luma_at(x, y));
                    }
                }
                Arc::new(plane)
            }
        }
    }

    /// Load an image file into a greyscale frame for one-shot decoding
    pub fn from_image_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading image for decoding: {}", path.display());

        let image = image::open(path).map_err(|e| {
            debug!("Failed to load image {}: {}", path.display(), e);
            ScanError::ImageLoadFailed
        })?;
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();

        Ok(Self::new(
            0,
            luma.into_raw(),
            width,
            height,
            FrameFormat::Luma8,
            Rotation::Rotate0,
        ))
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            trace!("Releasing frame {}", self.sequence);
            hook(self.sequence);
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("rotation", &self.rotation)
            .field("bytes", &self.data.len())
            .finish()
    }
}
