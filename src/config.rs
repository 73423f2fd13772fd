//! Process configuration loaded from YAML.
//!
//! # Example
//!
//! ```yaml
//! cache_dir: /var/cache/photoframe
//! font_path: /usr/share/fonts/truetype/dejavu/DejaVuSans.ttf
//!
//! display:
//!   width: 800
//!   height: 480
//!   output: /run/photoframe/frame.png
//!   format: png
//!
//! intervals:
//!   photo_secs: 300   # advance to the next photo
//!   clock_secs: 60    # redraw the clock
//!
//! firebase:
//!   project_id: my-frame
//!   bucket: my-frame.appspot.com
//!   folder: photos
//! ```
//!
//! Every field has a default, so an empty file is valid apart from the
//! Firebase identifiers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::{DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Directory holding downloaded images (created if absent)
    pub cache_dir: PathBuf,
    /// TrueType font used for the clock
    pub font_path: PathBuf,
    /// Panel geometry and output
    pub display: DisplayConfig,
    /// Timer periods
    pub intervals: IntervalConfig,
    /// Clock font sizes
    pub fonts: FontConfig,
    /// Timeout for each HTTP request (seconds)
    pub fetch_timeout_secs: u64,
    /// Remote store
    pub firebase: FirebaseConfig,
}

/// Panel geometry and where frames are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// File the panel output is written to
    pub output: PathBuf,
    pub format: OutputFormat,
}

/// Encoding of frames written by the file-backed panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Grayscale PNG
    #[default]
    Png,
    /// Packed 1bpp panel buffer
    Raw,
}

/// Periods of the two independent timers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// Photo advance period in seconds
    pub photo_secs: u64,
    /// Clock refresh period in seconds
    pub clock_secs: u64,
}

/// Clock font sizes in pixels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Centered clock on the clock-only screen
    pub clock_px: f32,
    /// Corner clock drawn over photos
    pub overlay_px: f32,
}

/// Firebase project, bucket and settings document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    pub project_id: String,
    /// Storage bucket (e.g. `my-frame.appspot.com`)
    pub bucket: String,
    /// Folder (object prefix) holding the photos
    pub folder: String,
    pub settings_collection: String,
    pub settings_document: String,
    /// Environment variable holding an OAuth access token
    pub token_env: String,
    /// Cloud Storage API base URL
    pub storage_url: String,
    /// Firestore API base URL
    pub firestore_url: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/cache/photoframe"),
            font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            display: DisplayConfig::default(),
            intervals: IntervalConfig::default(),
            fonts: FontConfig::default(),
            fetch_timeout_secs: crate::DEFAULT_TIMEOUT_SECS,
            firebase: FirebaseConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: DISPLAY_WIDTH,
            height: DISPLAY_HEIGHT,
            output: PathBuf::from("/tmp/photoframe/frame.png"),
            format: OutputFormat::Png,
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            photo_secs: crate::DEFAULT_PHOTO_INTERVAL_SECS,
            clock_secs: crate::DEFAULT_CLOCK_INTERVAL_SECS,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            clock_px: crate::text::ClockFonts::CLOCK_PX,
            overlay_px: crate::text::ClockFonts::OVERLAY_PX,
        }
    }
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            bucket: String::new(),
            folder: String::new(),
            settings_collection: "settings".to_string(),
            settings_document: "display_settings".to_string(),
            token_env: "FIREBASE_ACCESS_TOKEN".to_string(),
            storage_url: "https://storage.googleapis.com".to_string(),
            firestore_url: "https://firestore.googleapis.com".to_string(),
        }
    }
}

impl FrameConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject geometry and timer values the frame cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.display.width == 0 || self.display.height == 0 {
            return Err(Error::Config(format!(
                "Display size must be non-zero, got {}x{}",
                self.display.width, self.display.height
            )));
        }
        if self.intervals.photo_secs == 0 || self.intervals.clock_secs == 0 {
            return Err(Error::Config("Timer intervals must be non-zero".to_string()));
        }
        if self.fonts.clock_px <= 0.0 || self.fonts.overlay_px <= 0.0 {
            return Err(Error::Config("Font sizes must be positive".to_string()));
        }
        Ok(())
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Set the panel size.
    #[must_use]
    pub fn with_display_size(mut self, width: u32, height: u32) -> Self {
        self.display.width = width;
        self.display.height = height;
        self
    }

    /// Set both timer periods in seconds.
    #[must_use]
    pub fn with_intervals(mut self, photo_secs: u64, clock_secs: u64) -> Self {
        self.intervals.photo_secs = photo_secs;
        self.intervals.clock_secs = clock_secs;
        self
    }

    pub fn photo_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.photo_secs)
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.clock_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl FirebaseConfig {
    /// Read the access token from the configured environment variable.
    pub fn access_token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}
