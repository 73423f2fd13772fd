//! In-memory doubles and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, Luma};
use tokio::time::Instant;

use crate::compose::FrameComposer;
use crate::device::DisplayDevice;
use crate::error::Error;
use crate::frame::Frame;
use crate::remote::{ImageStore, NowShowing, RemoteObject, SettingsDocument, SettingsStore};
use crate::settings::DisplaySettings;
use crate::text::ClockFonts;

static TEST_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

pub fn test_fonts() -> ClockFonts {
    ClockFonts::from_bytes(TEST_FONT).unwrap()
}

/// A small panel with fonts scaled to fit it.
pub fn test_composer() -> FrameComposer {
    FrameComposer::new(120, 72, test_fonts().with_sizes(20.0, 12.0))
}

/// Write a solid grayscale PNG and return its path.
pub fn write_image(dir: &Path, name: &str, width: u32, height: u32, luma: u8) -> PathBuf {
    let path = dir.join(name);
    GrayImage::from_pixel(width, height, Luma([luma]))
        .save(&path)
        .unwrap();
    path
}

/// Bind an ephemeral local port, serve `app` on it and return the base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Debug, Default)]
struct SettingsState {
    document: Option<SettingsDocument>,
    failing: bool,
    failing_writes: bool,
    load_delay: Duration,
    loads: usize,
    saves: usize,
    now_showing: Vec<NowShowing>,
}

/// Settings document held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    state: Arc<Mutex<SettingsState>>,
}

impl MemorySettingsStore {
    /// No document yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_settings(show_clock: bool, show_photos: bool, timezone: &str) -> Self {
        let store = Self::default();
        store.set_settings(show_clock, show_photos, timezone);
        store
    }

    /// Replace the document, as a user editing it remotely would.
    pub fn set_settings(&self, show_clock: bool, show_photos: bool, timezone: &str) {
        self.state.lock().unwrap().document = Some(SettingsDocument {
            show_clock: Some(show_clock),
            show_photos: Some(show_photos),
            timezone: Some(timezone.to_string()),
        });
    }

    /// Make every operation fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Make only writes fail.
    pub fn set_failing_writes(&self, failing: bool) {
        self.state.lock().unwrap().failing_writes = failing;
    }

    /// Make every `load` take this long before answering.
    pub fn set_load_delay(&self, delay: Duration) {
        self.state.lock().unwrap().load_delay = delay;
    }

    /// Number of `load` calls, failed ones included.
    pub fn loads(&self) -> usize {
        self.state.lock().unwrap().loads
    }

    pub fn document(&self) -> Option<SettingsDocument> {
        self.state.lock().unwrap().document.clone()
    }

    /// Number of successful `save` calls.
    pub fn saves(&self) -> usize {
        self.state.lock().unwrap().saves
    }

    pub fn now_showing(&self) -> Vec<NowShowing> {
        self.state.lock().unwrap().now_showing.clone()
    }

    fn check_write(state: &SettingsState) -> Result<(), Error> {
        if state.failing || state.failing_writes {
            return Err(Error::Settings("store unavailable".to_string()));
        }
        Ok(())
    }
}

impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Option<SettingsDocument>, Error> {
        let delay = self.state.lock().unwrap().load_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.loads += 1;
        if state.failing {
            return Err(Error::Settings("store unavailable".to_string()));
        }
        Ok(state.document.clone())
    }

    async fn save(&self, settings: &DisplaySettings) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state)?;
        state.document = Some(SettingsDocument {
            show_clock: Some(settings.show_clock),
            show_photos: Some(settings.show_photos),
            timezone: Some(settings.timezone.clone()),
        });
        state.saves += 1;
        Ok(())
    }

    async fn publish_now_showing(&self, record: &NowShowing) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state)?;
        state.now_showing.push(record.clone());
        Ok(())
    }
}

/// Fixed listing plus an in-memory blob per locator. `access_locator`
/// knows only the listed ids. Clones share the fetch counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageStore {
    objects: Vec<RemoteObject>,
    blobs: HashMap<String, Vec<u8>>,
    fetches: Arc<AtomicUsize>,
}

impl MemoryImageStore {
    pub fn new(objects: Vec<RemoteObject>) -> Self {
        Self {
            objects,
            ..Default::default()
        }
    }

    pub fn with_locator(id: &str, locator: &str) -> Self {
        Self::new(vec![RemoteObject {
            id: id.to_string(),
            content_type: Some("image/jpeg".to_string()),
            locator: locator.to_string(),
        }])
    }

    /// Serve `bytes` for `locator`. Unknown locators fail like a 404.
    pub fn with_blob(mut self, locator: &str, bytes: &[u8]) -> Self {
        self.blobs.insert(locator.to_string(), bytes.to_vec());
        self
    }

    /// Number of `fetch` calls so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ImageStore for MemoryImageStore {
    async fn list_images(&self, prefix: &str) -> Result<Vec<RemoteObject>, Error> {
        Ok(self
            .objects
            .iter()
            .filter(|o| o.id.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("Download of {} returned status 404", locator)))
    }

    async fn access_locator(&self, id: &str) -> Result<Option<String>, Error> {
        Ok(self
            .objects
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.locator.clone()))
    }
}

/// A device operation as seen by [`RecordingDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    Init,
    Clear,
    Display,
    Sleep,
}

#[derive(Debug, Default)]
struct DeviceState {
    calls: Vec<DeviceCall>,
    display_times: Vec<Instant>,
    last_frame: Option<Frame>,
    failing: bool,
}

/// Records successful device calls. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail without being recorded.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of frames displayed.
    pub fn frames(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == DeviceCall::Display)
            .count()
    }

    /// When each displayed frame reached the device.
    pub fn display_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().display_times.clone()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.state.lock().unwrap().last_frame.clone()
    }

    fn record(&self, call: DeviceCall, frame: Option<&Frame>) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(Error::Device(format!("{:?} failed", call)));
        }
        state.calls.push(call);
        if let Some(frame) = frame {
            state.display_times.push(Instant::now());
            state.last_frame = Some(frame.clone());
        }
        Ok(())
    }
}

impl DisplayDevice for RecordingDevice {
    fn init(&mut self) -> Result<(), Error> {
        self.record(DeviceCall::Init, None)
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.record(DeviceCall::Clear, None)
    }

    fn display_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.record(DeviceCall::Display, Some(frame))
    }

    fn sleep(&mut self) -> Result<(), Error> {
        self.record(DeviceCall::Sleep, None)
    }
}
