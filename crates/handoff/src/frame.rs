//! Frame layout and read-only frame views.

use std::fmt;

use handoff_ipc::IpcError;
use image::{ImageBuffer, Rgb};

/// Image resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub const RES_1080P: Self = Self::new(1920, 1080);

    pub const RES_720P: Self = Self::new(1280, 720);

    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub const fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Dimensions of the frames exchanged through the frame buffer.
///
/// Both processes agree on this out-of-band; there is no header or negotiation in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub resolution: Resolution,
    pub channels: u32,
}

impl FrameFormat {
    /// 1920x1080 RGB.
    pub const RGB_1080P: Self = Self {
        resolution: Resolution::RES_1080P,
        channels: 3,
    };

    /// Returns the number of bytes one frame occupies.
    pub const fn byte_len(&self) -> usize {
        self.resolution.num_pixels() * self.channels as usize
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::RGB_1080P
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.resolution, self.channels)
    }
}

/// A borrowed, read-only frame: `width × height × channels` bytes, row-major.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    format: FrameFormat,
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Creates a frame view, checking that `data` has exactly the size `format` declares.
    pub fn new(format: FrameFormat, data: &'a [u8]) -> Result<Self, IpcError> {
        if data.len() != format.byte_len() {
            return Err(IpcError::SizeMismatch {
                what: "frame",
                expected: format.byte_len(),
                actual: data.len(),
            });
        }
        Ok(Self { format, data })
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn resolution(&self) -> Resolution {
        self.format.resolution
    }

    pub fn width(&self) -> u32 {
        self.format.resolution.width()
    }

    pub fn height(&self) -> u32 {
        self.format.resolution.height()
    }

    /// Returns the raw frame bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the channel values of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside of the frame.
    pub fn pixel(&self, x: u32, y: u32) -> &'a [u8] {
        assert!(
            x < self.width() && y < self.height(),
            "pixel ({x}, {y}) out of bounds for {}",
            self.resolution()
        );
        let channels = self.format.channels as usize;
        let start = (y as usize * self.width() as usize + x as usize) * channels;
        &self.data[start..start + channels]
    }

    /// Returns the frame as an RGB [`ImageBuffer`] borrowing the frame data.
    ///
    /// Returns [`None`] if the frame does not have exactly 3 channels.
    pub fn as_rgb_image(&self) -> Option<ImageBuffer<Rgb<u8>, &'a [u8]>> {
        if self.format.channels != 3 {
            return None;
        }
        ImageBuffer::from_raw(self.width(), self.height(), self.data)
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Converts a BGRA camera image into the packed RGB layout of the frame buffer.
///
/// `dst` must hold exactly 3 bytes for every 4 bytes of `src`.
pub fn bgra_to_rgb(src: &[u8], dst: &mut [u8]) -> Result<(), IpcError> {
    if src.len() % 4 != 0 || dst.len() != src.len() / 4 * 3 {
        return Err(IpcError::SizeMismatch {
            what: "BGRA to RGB conversion",
            expected: src.len() / 4 * 3,
            actual: dst.len(),
        });
    }
    for (bgra, rgb) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
        rgb[0] = bgra[2];
        rgb[1] = bgra[1];
        rgb[2] = bgra[0];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: FrameFormat = FrameFormat {
        resolution: Resolution::new(4, 2),
        channels: 3,
    };

    #[test]
    fn default_is_1080p_rgb() {
        assert_eq!(FrameFormat::default().byte_len(), 1920 * 1080 * 3);
        assert_eq!(FrameFormat::default().to_string(), "1920x1080x3");
    }

    #[test]
    fn rejects_wrong_size() {
        assert!(Frame::new(SMALL, &[0; 23]).is_err());
        assert!(Frame::new(SMALL, &[0; 24]).is_ok());
    }

    #[test]
    fn pixel_access_is_row_major() {
        let data: Vec<u8> = (0..24).collect();
        let frame = Frame::new(SMALL, &data).unwrap();
        assert_eq!(frame.pixel(0, 0), &[0, 1, 2]);
        assert_eq!(frame.pixel(3, 0), &[9, 10, 11]);
        assert_eq!(frame.pixel(1, 1), &[15, 16, 17]);

        let image = frame.as_rgb_image().unwrap();
        assert_eq!(image.get_pixel(1, 1).0, [15, 16, 17]);
    }

    #[test]
    fn no_rgb_view_for_other_channel_counts() {
        let format = FrameFormat {
            resolution: Resolution::new(2, 2),
            channels: 4,
        };
        let data = [0; 16];
        assert!(Frame::new(format, &data).unwrap().as_rgb_image().is_none());
    }

    #[test]
    fn converts_bgra() {
        let src = [1, 2, 3, 255, 4, 5, 6, 255];
        let mut dst = [0; 6];
        bgra_to_rgb(&src, &mut dst).unwrap();
        assert_eq!(dst, [3, 2, 1, 6, 5, 4]);
        assert!(bgra_to_rgb(&src, &mut [0; 5]).is_err());
    }
}
