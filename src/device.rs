//! Display device contract and a file-backed panel.

use std::path::{Path, PathBuf};

use crate::config::OutputFormat;
use crate::error::Error;
use crate::frame::Frame;

/// The physical panel, reduced to what the rotator needs.
///
/// Every call may fail. A failed [`DisplayDevice::display_frame`] must leave
/// the device usable for the next frame.
pub trait DisplayDevice {
    /// Power up and configure the panel.
    fn init(&mut self) -> Result<(), Error>;

    /// Blank the panel to white.
    fn clear(&mut self) -> Result<(), Error>;

    /// Push a full frame.
    fn display_frame(&mut self, frame: &Frame) -> Result<(), Error>;

    /// Enter deep sleep. [`DisplayDevice::init`] is required before reuse.
    fn sleep(&mut self) -> Result<(), Error>;
}

/// A panel that writes every frame to a file.
///
/// Used headless and for previewing what an e-paper panel would show. Writes
/// go through a temporary file and a rename, so a reader never sees a
/// half-written frame.
#[derive(Debug)]
pub struct FileDisplay {
    path: PathBuf,
    format: OutputFormat,
    width: u32,
    height: u32,
    asleep: bool,
    frames_written: u64,
}

impl FileDisplay {
    pub fn new(path: impl Into<PathBuf>, format: OutputFormat, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            format,
            width,
            height,
            asleep: true,
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    /// Frames written since creation, including clears.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Error> {
        if self.asleep {
            return Err(Error::Device("Panel is asleep; call init first".to_string()));
        }
        if frame.width() != self.width || frame.height() != self.height {
            return Err(Error::Device(format!(
                "Frame is {}x{}, panel is {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let tmp = self.path.with_extension("tmp");
        let written = match self.format {
            OutputFormat::Png => frame
                .to_gray_image()
                .save_with_format(&tmp, image::ImageFormat::Png)
                .map_err(|e| e.to_string()),
            OutputFormat::Raw => {
                std::fs::write(&tmp, frame.as_bytes()).map_err(|e| e.to_string())
            }
        };
        let result =
            written.and_then(|()| std::fs::rename(&tmp, &self.path).map_err(|e| e.to_string()));
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::Device(format!(
                "Failed to write frame to {}: {}",
                self.path.display(),
                e
            )));
        }

        self.frames_written += 1;
        Ok(())
    }
}

impl DisplayDevice for FileDisplay {
    fn init(&mut self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Device(format!(
                    "Failed to create output dir '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        self.asleep = false;
        tracing::info!(
            "Panel {}x{} writing {:?} frames to {}",
            self.width,
            self.height,
            self.format,
            self.path.display()
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.write(&Frame::blank(self.width, self.height))
    }

    fn display_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.write(frame)
    }

    fn sleep(&mut self) -> Result<(), Error> {
        self.asleep = true;
        tracing::info!("Panel asleep");
        Ok(())
    }
}
