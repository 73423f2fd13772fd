//! # eink-photoframe
//!
//! A photo frame for slow-refresh e-paper panels.
//!
//! At startup the photo folder of a Firebase Storage bucket is listed once
//! and every image is downloaded into a local cache. From then on two
//! independent timers drive the panel:
//!
//! - **Photo timer** (default 5 minutes): advance to the next photo
//! - **Clock timer** (default 1 minute): redraw the current screen so the
//!   clock overlay stays accurate
//!
//! Before every action the display settings are read from a Firestore
//! document, so the user can switch the clock or photos on and off (or change
//! the clock's timezone) without restarting the frame.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eink_photoframe::{
//!     prepare_images, ClockFonts, DisplayRotator, FileDisplay, FirebaseClient, FrameComposer,
//!     FrameConfig, ImageCache, NowShowingPublisher, Scheduler, SettingsSource,
//! };
//!
//! let config = FrameConfig::load("photoframe.yaml")?;
//! let firebase = FirebaseClient::new(&config.firebase, config.fetch_timeout())?;
//! let cache = ImageCache::open(&config.cache_dir)?;
//! let images = prepare_images(&firebase, &cache, &config.firebase.folder).await?;
//!
//! let (publisher, _worker) = NowShowingPublisher::spawn(firebase.clone(), firebase.clone(), 8);
//! let composer = FrameComposer::new(800, 480, ClockFonts::load(&config.font_path)?);
//! let mut rotator = DisplayRotator::new(
//!     panel,
//!     SettingsSource::new(firebase),
//!     composer,
//!     images,
//!     publisher,
//! )?;
//!
//! Scheduler::new(config.photo_interval(), config.clock_interval())
//!     .run(&mut rotator, shutdown_signal())
//!     .await;
//! ```
//!
//! ## Settings Document
//!
//! | Field | Type | Default |
//! |-------|------|---------|
//! | `show_clock` | bool | `true` |
//! | `show_photos` | bool | `true` |
//! | `timezone` | string | `"UTC"` |
//! | `current_photo` | string | written by the frame |
//!
//! A missing document is created with the defaults on first read.

pub mod cache;
pub mod compose;
pub mod config;
pub mod device;
mod error;
pub mod firebase;
pub mod frame;
pub mod remote;
pub mod rotator;
pub mod schedule;
pub mod settings;
pub mod text;

#[cfg(test)]
mod testing;

pub use cache::{prepare_images, CachedImage, ImageCache};
pub use compose::{clock_text, FrameComposer};
pub use config::{FrameConfig, OutputFormat};
pub use device::{DisplayDevice, FileDisplay};
pub use error::Error;
pub use firebase::FirebaseClient;
pub use frame::Frame;
pub use remote::{ImageRef, ImageStore, NowShowing, RemoteObject, SettingsStore};
pub use rotator::{DisplayMode, DisplayRotator, NowShowingPublisher, RotationState};
pub use schedule::Scheduler;
pub use settings::{DisplaySettings, SettingsSource};
pub use text::ClockFonts;

/// Default panel width in pixels (Waveshare 7.5" V2)
pub const DISPLAY_WIDTH: u32 = 800;

/// Default panel height in pixels
pub const DISPLAY_HEIGHT: u32 = 480;

/// Default photo advance period
pub const DEFAULT_PHOTO_INTERVAL_SECS: u64 = 300;

/// Default clock refresh period
pub const DEFAULT_CLOCK_INTERVAL_SECS: u64 = 60;

/// Default timeout for each HTTP request
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
