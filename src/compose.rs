//! Frame composition: resize, pad, convert to bi-level, overlay the clock.
//!
//! # Orientation rule
//!
//! - Landscape sources (width > height) are stretched to exactly fill the
//!   panel. Aspect ratio is not preserved.
//! - Portrait and square sources keep their aspect ratio, are fitted by
//!   height (or by width if that overflows) and centered on white.
//!
//! The result is converted to 1-bit with the `image` crate's
//! Floyd-Steinberg error diffusion, which is deterministic for identical
//! input.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GrayImage, ImageDecoder, ImageReader, Luma};

use crate::error::Error;
use crate::frame::Frame;
use crate::text::ClockFonts;

/// Distance of the overlay clock from the top and right edges.
pub const CLOCK_MARGIN: i32 = 10;

/// Padding of the clock's background box around the text.
pub const CLOCK_PADDING: i32 = 5;

/// Where a scaled source lands on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Compute the scaled size and offset of a `src_width × src_height` source
/// on a `width × height` panel.
pub fn placement(src_width: u32, src_height: u32, width: u32, height: u32) -> Placement {
    if src_width > src_height {
        return Placement {
            width,
            height,
            x: 0,
            y: 0,
        };
    }

    let aspect = src_width as f64 / src_height.max(1) as f64;
    let mut scaled_height = height;
    let mut scaled_width = (aspect * height as f64) as u32;
    if scaled_width > width {
        scaled_width = width;
        scaled_height = (width as f64 / aspect) as u32;
    }
    let scaled_width = scaled_width.clamp(1, width);
    let scaled_height = scaled_height.clamp(1, height);

    Placement {
        width: scaled_width,
        height: scaled_height,
        x: (width - scaled_width) / 2,
        y: (height - scaled_height) / 2,
    }
}

/// Compose the image at `path` into a `width × height` bi-level frame.
pub fn compose(path: &Path, width: u32, height: u32) -> Result<Frame, Error> {
    let source = load_oriented(path)?.to_luma8();
    let (src_width, src_height) = source.dimensions();
    tracing::debug!("Source {} is {}x{}", path.display(), src_width, src_height);

    let place = placement(src_width, src_height, width, height);
    let scaled = imageops::resize(&source, place.width, place.height, FilterType::Lanczos3);

    let mut canvas = if place.width == width && place.height == height {
        scaled
    } else {
        let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
        imageops::overlay(&mut canvas, &scaled, place.x as i64, place.y as i64);
        tracing::debug!(
            "Padded {}x{} source at ({}, {})",
            place.width,
            place.height,
            place.x,
            place.y
        );
        canvas
    };

    Ok(dither(&mut canvas))
}

/// Decode an image and apply its EXIF orientation.
fn load_oriented(path: &Path) -> Result<DynamicImage, Error> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| Error::Compose(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Floyd-Steinberg error diffusion to 1 bit. `gray` is left holding only
/// black and white.
pub fn dither(gray: &mut GrayImage) -> Frame {
    imageops::dither(gray, &BiLevel);
    Frame::from_gray(gray)
}

/// Format a time as the clock shows it: 12-hour `HH:MM AM/PM`.
pub fn clock_text<T: TimeZone>(now: &DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    now.format("%I:%M %p").to_string()
}

/// Resolve an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, Error> {
    name.parse::<Tz>().map_err(|_| Error::Timezone(name.to_string()))
}

/// Composes frames for one panel geometry.
#[derive(Debug, Clone)]
pub struct FrameComposer {
    width: u32,
    height: u32,
    fonts: ClockFonts,
}

impl FrameComposer {
    pub fn new(width: u32, height: u32, fonts: ClockFonts) -> Self {
        Self {
            width,
            height,
            fonts,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// An all-white frame of the panel size.
    pub fn blank(&self) -> Frame {
        Frame::blank(self.width, self.height)
    }

    /// Compose a source image for this panel.
    pub fn compose(&self, path: &Path) -> Result<Frame, Error> {
        compose(path, self.width, self.height)
    }

    /// Draw the current time in `timezone` onto `frame`.
    pub fn overlay_clock(
        &self,
        frame: &mut Frame,
        timezone: &str,
        centered: bool,
    ) -> Result<(), Error> {
        let tz = parse_timezone(timezone)?;
        self.overlay_clock_at(frame, &Utc::now().with_timezone(&tz), centered);
        Ok(())
    }

    /// Draw a fixed time onto `frame`.
    ///
    /// `centered` places a large clock in the middle of the frame; otherwise a
    /// smaller clock is anchored to the top-right corner. Either way a white
    /// box is drawn behind the text first.
    pub fn overlay_clock_at<T: TimeZone>(
        &self,
        frame: &mut Frame,
        now: &DateTime<T>,
        centered: bool,
    ) where
        T::Offset: std::fmt::Display,
    {
        let text = clock_text(now);
        let px = if centered {
            self.fonts.clock_px
        } else {
            self.fonts.overlay_px
        };
        let extent = self.fonts.measure(&text, px);
        let (text_width, text_height) = (extent.width as i32, extent.height as i32);

        let (x, y) = if centered {
            (
                (frame.width() as i32 - text_width) / 2,
                (frame.height() as i32 - text_height) / 2,
            )
        } else {
            (frame.width() as i32 - text_width - CLOCK_MARGIN, CLOCK_MARGIN)
        };

        let background = Rectangle::new(
            Point::new(x - CLOCK_PADDING, y - CLOCK_PADDING),
            Size::new(
                (text_width + 2 * CLOCK_PADDING + 1) as u32,
                (text_height + 2 * CLOCK_PADDING + 1) as u32,
            ),
        );
        let _ = background
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
            .draw(frame);
        let _ = self.fonts.draw(frame, Point::new(x, y), &text, px);
        tracing::debug!("Drew clock '{}' at ({}, {}) size {}", text, x, y, px);
    }
}
