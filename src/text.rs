//! TrueType text measuring and drawing on bi-level frames.
//!
//! Measurements come from the font's own metrics (advance widths, kerning,
//! ascent/descent) so the clock's background box always fits the text.

use std::path::Path;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use fontdue::{Font, FontSettings};

use crate::error::Error;

/// Coverage at or above this value becomes ink.
const COVERAGE_THRESHOLD: u8 = 128;

/// Pixel extent of a rendered string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextExtent {
    pub width: u32,
    pub height: u32,
}

/// The clock typeface at its two sizes.
#[derive(Clone)]
pub struct ClockFonts {
    font: Font,
    /// Size for the centered, clock-only screen
    pub clock_px: f32,
    /// Size for the corner overlay on photos
    pub overlay_px: f32,
}

impl std::fmt::Debug for ClockFonts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockFonts")
            .field("clock_px", &self.clock_px)
            .field("overlay_px", &self.overlay_px)
            .finish_non_exhaustive()
    }
}

impl ClockFonts {
    /// Default size of the centered clock.
    pub const CLOCK_PX: f32 = 72.0;
    /// Default size of the photo overlay clock.
    pub const OVERLAY_PX: f32 = 36.0;

    /// Parse a TrueType/OpenType font from memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| Error::Init(format!("Invalid font data: {}", e)))?;
        Ok(Self {
            font,
            clock_px: Self::CLOCK_PX,
            overlay_px: Self::OVERLAY_PX,
        })
    }

    /// Load a font file. A missing or unreadable font is fatal at startup.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref()).map_err(|e| {
            Error::Init(format!(
                "Failed to read font '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let fonts = Self::from_bytes(&data)?;
        tracing::info!("Loaded clock font from {}", path.as_ref().display());
        Ok(fonts)
    }

    /// Override both sizes.
    #[must_use]
    pub fn with_sizes(mut self, clock_px: f32, overlay_px: f32) -> Self {
        self.clock_px = clock_px;
        self.overlay_px = overlay_px;
        self
    }

    /// Measure `text` at `px` without drawing it.
    pub fn measure(&self, text: &str, px: f32) -> TextExtent {
        let (ascent, descent) = self.vertical_metrics(px);
        let mut width = 0.0f32;
        let mut prev: Option<char> = None;
        for c in text.chars() {
            if let Some(p) = prev {
                width += self.font.horizontal_kern(p, c, px).unwrap_or(0.0);
            }
            width += self.font.metrics(c, px).advance_width;
            prev = Some(c);
        }
        TextExtent {
            width: width.ceil().max(0.0) as u32,
            height: (ascent - descent).ceil().max(0.0) as u32,
        }
    }

    /// Draw `text` in ink with its top-left corner at `origin`.
    ///
    /// Glyph coverage is thresholded, so only `BinaryColor::On` pixels are
    /// emitted and the background shows through between strokes.
    pub fn draw<D>(
        &self,
        target: &mut D,
        origin: Point,
        text: &str,
        px: f32,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let (ascent, _) = self.vertical_metrics(px);
        let baseline = origin.y + ascent.round() as i32;
        let mut pen_x = origin.x as f32;
        let mut prev: Option<char> = None;

        for c in text.chars() {
            if let Some(p) = prev {
                pen_x += self.font.horizontal_kern(p, c, px).unwrap_or(0.0);
            }
            let (metrics, coverage) = self.font.rasterize(c, px);
            let glyph = Point::new(
                pen_x.round() as i32 + metrics.xmin,
                baseline - metrics.ymin - metrics.height as i32,
            );

            let width = metrics.width.max(1);
            let pixels = coverage
                .iter()
                .enumerate()
                .filter(|(_, alpha)| **alpha >= COVERAGE_THRESHOLD)
                .map(|(i, _)| {
                    let offset = Point::new((i % width) as i32, (i / width) as i32);
                    Pixel(glyph + offset, BinaryColor::On)
                });
            target.draw_iter(pixels)?;

            pen_x += metrics.advance_width;
            prev = Some(c);
        }
        Ok(())
    }

    fn vertical_metrics(&self, px: f32) -> (f32, f32) {
        self.font
            .horizontal_line_metrics(px)
            .map_or((px, 0.0), |m| (m.ascent, m.descent))
    }
}
