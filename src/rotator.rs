//! The display rotator: which photo is current and what goes on the panel.
//!
//! The mode is recomputed from the latest settings on every call:
//!
//! | show_photos | show_clock | Mode | Panel |
//! |-------------|------------|------|-------|
//! | false | false | [`DisplayMode::Blank`] | cleared |
//! | false | true | [`DisplayMode::ShowingClockOnly`] | large centered clock |
//! | true | any | [`DisplayMode::ShowingPhoto`] | current photo, corner clock if enabled |
//!
//! A failed render or device write is returned to the caller and leaves the
//! rotation state as it was, so the next trigger simply tries again.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::CachedImage;
use crate::compose::FrameComposer;
use crate::device::DisplayDevice;
use crate::error::Error;
use crate::remote::{ImageStore, NowShowing, SettingsStore};
use crate::settings::{DisplaySettings, SettingsSource};

/// What the panel shows for a given set of settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    ShowingPhoto,
    ShowingClockOnly,
    Blank,
}

impl DisplayMode {
    pub fn from_settings(settings: &DisplaySettings) -> Self {
        match (settings.show_photos, settings.show_clock) {
            (true, _) => DisplayMode::ShowingPhoto,
            (false, true) => DisplayMode::ShowingClockOnly,
            (false, false) => DisplayMode::Blank,
        }
    }
}

/// The rotator's mutable state.
///
/// `current_index` is always a valid index into the non-empty `images`.
#[derive(Debug, Clone)]
pub struct RotationState {
    images: Vec<CachedImage>,
    current_index: usize,
    settings: DisplaySettings,
}

impl RotationState {
    /// Start at the first image. Fails if there is nothing to show.
    pub fn new(images: Vec<CachedImage>) -> Result<Self, Error> {
        if images.is_empty() {
            return Err(Error::Init("No images available to display".to_string()));
        }
        Ok(Self {
            images,
            current_index: 0,
            settings: DisplaySettings::default(),
        })
    }

    pub fn images(&self) -> &[CachedImage] {
        &self.images
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &CachedImage {
        &self.images[self.current_index]
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    /// Index after the current one, wrapping around.
    pub fn next_index(&self) -> usize {
        (self.current_index + 1) % self.images.len()
    }
}

/// Hands displayed image ids to a background task that writes the
/// NowShowing record.
///
/// Publishing never waits: when the queue is full the record is dropped
/// with a warning.
#[derive(Debug, Clone)]
pub struct NowShowingPublisher {
    tx: mpsc::Sender<String>,
}

impl NowShowingPublisher {
    /// Default queue depth.
    pub const QUEUE_CAPACITY: usize = 8;

    /// A publisher and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Spawn the worker that resolves a fresh locator for each id and
    /// writes it to the settings document.
    ///
    /// Failures are logged and not retried. The worker exits once every
    /// publisher is dropped.
    pub fn spawn<I, S>(images: I, store: S, capacity: usize) -> (Self, JoinHandle<()>)
    where
        I: ImageStore + Send + Sync + 'static,
        S: SettingsStore + Send + Sync + 'static,
    {
        let (publisher, mut rx) = Self::channel(capacity);
        let handle = tokio::spawn(async move {
            while let Some(image_id) = rx.recv().await {
                let access_locator = match images.access_locator(&image_id).await {
                    Ok(Some(locator)) => locator,
                    Ok(None) => {
                        tracing::error!("Image {} no longer exists in storage", image_id);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to look up {}: {}", image_id, e);
                        continue;
                    }
                };
                let record = NowShowing {
                    image_id,
                    access_locator,
                };
                if let Err(e) = store.publish_now_showing(&record).await {
                    tracing::warn!("Failed to publish now showing {}: {}", record.image_id, e);
                }
            }
            tracing::debug!("Now-showing worker stopped");
        });
        (publisher, handle)
    }

    /// Queue `image_id` for publishing without waiting.
    pub fn publish(&self, image_id: &str) {
        match self.tx.try_send(image_id.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(id)) => {
                tracing::warn!("Now-showing queue full, dropping {}", id);
            }
            Err(mpsc::error::TrySendError::Closed(id)) => {
                tracing::warn!("Now-showing worker gone, dropping {}", id);
            }
        }
    }
}

/// Owns the device, the rotation state and everything needed to render.
pub struct DisplayRotator<D, S> {
    device: D,
    settings: SettingsSource<S>,
    composer: FrameComposer,
    state: RotationState,
    now_showing: NowShowingPublisher,
}

impl<D: DisplayDevice, S: SettingsStore> DisplayRotator<D, S> {
    /// Build a rotator over the cached images. Fails if `images` is empty.
    pub fn new(
        device: D,
        settings: SettingsSource<S>,
        composer: FrameComposer,
        images: Vec<CachedImage>,
        now_showing: NowShowingPublisher,
    ) -> Result<Self, Error> {
        Ok(Self {
            device,
            settings,
            composer,
            state: RotationState::new(images)?,
            now_showing,
        })
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Fetch the latest settings into the rotation state.
    async fn refresh_settings(&mut self) -> &DisplaySettings {
        self.state.settings = self.settings.fetch().await;
        &self.state.settings
    }

    /// Move to the next photo and show it.
    ///
    /// With photos disabled the index stays put and the current non-photo
    /// screen (clock or blank) is redrawn instead. The index only moves if
    /// the new photo reached the panel.
    pub async fn advance(&mut self) -> Result<DisplayMode, Error> {
        self.refresh_settings().await;
        if !self.state.settings.show_photos {
            tracing::info!("Photo display is disabled, not advancing");
            return self.show(self.state.current_index);
        }

        let next = self.state.next_index();
        let mode = self.show(next)?;
        self.state.current_index = next;
        tracing::info!(
            "Displayed image {}/{}",
            next + 1,
            self.state.images.len()
        );
        Ok(mode)
    }

    /// Redraw the current screen without changing photos.
    ///
    /// Keeps the clock accurate; safe to call far more often than
    /// [`DisplayRotator::advance`].
    pub async fn refresh_display(&mut self) -> Result<DisplayMode, Error> {
        self.refresh_settings().await;
        self.show(self.state.current_index)
    }

    /// Clear the panel and put it to sleep. Errors are logged.
    pub fn power_down(&mut self) {
        if let Err(e) = self.device.clear() {
            tracing::warn!("Failed to clear panel on shutdown: {}", e);
        }
        if let Err(e) = self.device.sleep() {
            tracing::warn!("Failed to put panel to sleep: {}", e);
        }
    }

    /// Render the screen for the current settings with photo `index`.
    fn show(&mut self, index: usize) -> Result<DisplayMode, Error> {
        let settings = &self.state.settings;
        let mode = DisplayMode::from_settings(settings);

        match mode {
            DisplayMode::Blank => {
                self.device.clear()?;
                tracing::info!("Cleared display, clock and photos are disabled");
            }
            DisplayMode::ShowingClockOnly => {
                let mut frame = self.composer.blank();
                self.composer
                    .overlay_clock(&mut frame, &settings.timezone, true)?;
                self.device.display_frame(&frame)?;
                tracing::info!("Displayed clock only");
            }
            DisplayMode::ShowingPhoto => {
                let image = &self.state.images[index];
                let mut frame = self.composer.compose(&image.local_path)?;
                if settings.show_clock {
                    if let Err(e) = self
                        .composer
                        .overlay_clock(&mut frame, &settings.timezone, false)
                    {
                        tracing::warn!("Showing {} without clock: {}", image.id, e);
                    }
                }
                self.device.display_frame(&frame)?;
                self.now_showing.publish(&image.id);
            }
        }

        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        test_composer, write_image, DeviceCall, MemoryImageStore, MemorySettingsStore,
        RecordingDevice,
    };
    use std::path::Path;

    fn images(dir: &Path, count: usize) -> Vec<CachedImage> {
        (0..count)
            .map(|i| CachedImage {
                id: format!("photos/{}.png", i),
                local_path: write_image(dir, &format!("{}.png", i), 30, 20, (i * 40) as u8),
            })
            .collect()
    }

    struct Fixture {
        rotator: DisplayRotator<RecordingDevice, MemorySettingsStore>,
        device: RecordingDevice,
        store: MemorySettingsStore,
        published: mpsc::Receiver<String>,
        _dir: tempfile::TempDir,
    }

    fn fixture(count: usize, store: MemorySettingsStore) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let device = RecordingDevice::new();
        let (publisher, published) = NowShowingPublisher::channel(64);
        let rotator = DisplayRotator::new(
            device.clone(),
            SettingsSource::new(store.clone()),
            test_composer(),
            images(dir.path(), count),
            publisher,
        )
        .unwrap();
        Fixture {
            rotator,
            device,
            store,
            published,
            _dir: dir,
        }
    }

    #[test]
    fn test_mode_from_settings() {
        let mut settings = DisplaySettings::default();
        assert_eq!(DisplayMode::from_settings(&settings), DisplayMode::ShowingPhoto);
        settings.show_clock = false;
        assert_eq!(DisplayMode::from_settings(&settings), DisplayMode::ShowingPhoto);
        settings.show_photos = false;
        assert_eq!(DisplayMode::from_settings(&settings), DisplayMode::Blank);
        settings.show_clock = true;
        assert_eq!(
            DisplayMode::from_settings(&settings),
            DisplayMode::ShowingClockOnly
        );
    }

    #[test]
    fn test_empty_image_list_is_fatal() {
        let err = RotationState::new(vec![]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_advance_visits_every_image_cyclically() {
        let mut f = fixture(3, MemorySettingsStore::with_settings(false, true, "UTC"));

        let mut visited = Vec::new();
        for _ in 0..6 {
            f.rotator.advance().await.unwrap();
            visited.push(f.rotator.current_index());
        }
        assert_eq!(visited, vec![1, 2, 0, 1, 2, 0]);
        assert_eq!(f.device.frames(), 6);
    }

    #[tokio::test]
    async fn test_refresh_never_moves_index() {
        let mut f = fixture(3, MemorySettingsStore::with_settings(true, true, "UTC"));
        f.rotator.advance().await.unwrap();
        assert_eq!(f.rotator.current_index(), 1);

        for _ in 0..5 {
            let mode = f.rotator.refresh_display().await.unwrap();
            assert_eq!(mode, DisplayMode::ShowingPhoto);
            assert_eq!(f.rotator.current_index(), 1);
        }
    }

    #[tokio::test]
    async fn test_all_disabled_clears_without_rendering() {
        let mut f = fixture(2, MemorySettingsStore::with_settings(false, false, "UTC"));

        assert_eq!(f.rotator.advance().await.unwrap(), DisplayMode::Blank);
        assert_eq!(f.rotator.refresh_display().await.unwrap(), DisplayMode::Blank);
        assert_eq!(f.device.calls(), vec![DeviceCall::Clear, DeviceCall::Clear]);
        assert_eq!(f.rotator.current_index(), 0);
        assert!(f.published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clock_only_does_not_advance() {
        let mut f = fixture(2, MemorySettingsStore::with_settings(true, false, "UTC"));

        assert_eq!(
            f.rotator.advance().await.unwrap(),
            DisplayMode::ShowingClockOnly
        );
        assert_eq!(f.rotator.current_index(), 0);
        assert_eq!(f.device.frames(), 1);
        let frame = f.device.last_frame().unwrap();
        assert!(frame.ink_count() > 0);
        assert!(f.published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_settings_change_is_honored_mid_run() {
        let mut f = fixture(3, MemorySettingsStore::with_settings(true, true, "UTC"));
        f.rotator.advance().await.unwrap();
        assert_eq!(f.rotator.current_index(), 1);

        f.store.set_settings(true, false, "UTC");
        f.rotator.advance().await.unwrap();
        assert_eq!(f.rotator.current_index(), 1);

        f.store.set_settings(true, true, "UTC");
        f.rotator.advance().await.unwrap();
        assert_eq!(f.rotator.current_index(), 2);
        assert!(f.rotator.state().settings().show_photos);
    }

    #[tokio::test]
    async fn test_device_error_keeps_state() {
        let mut f = fixture(3, MemorySettingsStore::with_settings(true, true, "Europe/Oslo"));
        f.rotator.advance().await.unwrap();
        let before = f.rotator.state().settings().clone();

        f.device.set_failing(true);
        let err = f.rotator.advance().await.unwrap_err();
        assert!(matches!(err, Error::Device(_)));
        assert_eq!(f.rotator.current_index(), 1);
        assert_eq!(f.rotator.state().settings(), &before);
        assert!(f.rotator.refresh_display().await.is_err());

        f.device.set_failing(false);
        f.rotator.advance().await.unwrap();
        assert_eq!(f.rotator.current_index(), 2);
    }

    #[tokio::test]
    async fn test_compose_error_keeps_index() {
        let mut f = fixture(2, MemorySettingsStore::with_settings(false, true, "UTC"));
        std::fs::write(&f.rotator.state().images()[1].local_path, b"garbage").unwrap();

        let err = f.rotator.advance().await.unwrap_err();
        assert!(matches!(err, Error::Compose(_)));
        assert_eq!(f.rotator.current_index(), 0);
        assert_eq!(f.device.frames(), 0);
    }

    #[tokio::test]
    async fn test_bad_timezone_falls_back() {
        let mut f = fixture(2, MemorySettingsStore::with_settings(true, true, "Nowhere/City"));
        // photo still shows, without the clock
        assert_eq!(
            f.rotator.refresh_display().await.unwrap(),
            DisplayMode::ShowingPhoto
        );

        // a clock-only screen has nothing to fall back to
        f.store.set_settings(true, false, "Nowhere/City");
        let err = f.rotator.refresh_display().await.unwrap_err();
        assert!(matches!(err, Error::Timezone(_)));
        assert_eq!(f.device.frames(), 1);
    }

    #[tokio::test]
    async fn test_successful_photo_publishes_now_showing() {
        let mut f = fixture(2, MemorySettingsStore::with_settings(false, true, "UTC"));
        f.rotator.advance().await.unwrap();
        f.rotator.refresh_display().await.unwrap();
        assert_eq!(f.published.try_recv().unwrap(), "photos/1.png");
        assert_eq!(f.published.try_recv().unwrap(), "photos/1.png");

        f.device.set_failing(true);
        let _ = f.rotator.advance().await;
        assert!(f.published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_power_down_clears_and_sleeps() {
        let mut f = fixture(1, MemorySettingsStore::empty());
        f.rotator.power_down();
        assert_eq!(f.device.calls(), vec![DeviceCall::Clear, DeviceCall::Sleep]);
    }

    #[tokio::test]
    async fn test_publish_never_blocks_when_full() {
        let (publisher, mut rx) = NowShowingPublisher::channel(1);
        publisher.publish("a");
        publisher.publish("b");
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert!(rx.try_recv().is_err());

        drop(rx);
        publisher.publish("c");
    }

    #[tokio::test]
    async fn test_worker_writes_now_showing() {
        let images = MemoryImageStore::with_locator("photos/a.jpg", "https://cdn/a.jpg");
        let store = MemorySettingsStore::empty();
        let (publisher, handle) = NowShowingPublisher::spawn(images, store.clone(), 4);

        publisher.publish("photos/a.jpg");
        publisher.publish("photos/deleted.jpg");
        drop(publisher);
        handle.await.unwrap();

        assert_eq!(
            store.now_showing(),
            vec![NowShowing {
                image_id: "photos/a.jpg".to_string(),
                access_locator: "https://cdn/a.jpg".to_string(),
            }]
        );
    }
}
