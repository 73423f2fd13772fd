//! Bi-level frame buffer.
//!
//! [`Frame`] holds pixels in the panel's native 1bpp layout and implements
//! [`DrawTarget`], so anything in the embedded-graphics ecosystem can draw
//! onto it:
//!
//! ```rust
//! use embedded_graphics::{
//!     pixelcolor::BinaryColor,
//!     prelude::*,
//!     primitives::{PrimitiveStyle, Rectangle},
//! };
//! use eink_photoframe::Frame;
//!
//! let mut frame = Frame::blank(16, 8);
//! let _ = Rectangle::new(Point::new(2, 2), Size::new(4, 3))
//!     .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
//!     .draw(&mut frame);
//! assert_eq!(frame.ink_count(), 12);
//! ```

use std::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use image::{GrayImage, Luma};

/// A fixed-size 1-bit bitmap, produced fresh for every render.
///
/// `BinaryColor::On` is ink (black), `BinaryColor::Off` is paper (white).
/// Pixels are stored row-major, MSB first, each row padded to a whole byte.
/// Pixels drawn outside the frame are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Frame {
    /// Create an all-white frame.
    pub fn blank(width: u32, height: u32) -> Self {
        let stride = (width as usize).div_ceil(8);
        Self {
            width,
            height,
            buffer: vec![0u8; stride * height as usize],
        }
    }

    /// Threshold an 8-bit grayscale image: values below 128 become ink.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let mut frame = Self::blank(gray.width(), gray.height());
        let pixels = gray.enumerate_pixels().map(|(x, y, p)| {
            let color = if p.0[0] < 128 {
                BinaryColor::On
            } else {
                BinaryColor::Off
            };
            Pixel(Point::new(x as i32, y as i32), color)
        });
        let _ = frame.draw_iter(pixels);
        frame
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel at (x, y) is black. Out-of-range reads are white.
    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let (byte, mask) = self.locate(x, y);
        self.buffer[byte] & mask != 0
    }

    /// Number of black pixels.
    pub fn ink_count(&self) -> usize {
        self.buffer.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// The panel's native buffer: row-major, MSB first, 1 = black.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Render as an 8-bit grayscale image (0 for ink, 255 for paper).
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.is_ink(x, y) {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn locate(&self, x: u32, y: u32) -> (usize, u8) {
        let stride = (self.width as usize).div_ceil(8);
        (y as usize * stride + x as usize / 8, 0x80 >> (x % 8))
    }
}

impl DrawTarget for Frame {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0
                || point.y < 0
                || point.x >= self.width as i32
                || point.y >= self.height as i32
            {
                continue;
            }
            let (byte, mask) = self.locate(point.x as u32, point.y as u32);
            match color {
                BinaryColor::On => self.buffer[byte] |= mask,
                BinaryColor::Off => self.buffer[byte] &= !mask,
            }
        }
        Ok(())
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
