//! Display settings and their pull-based source.
//!
//! Settings live in a remote document owned by the user. The frame reads
//! them before every scheduled action and only ever writes them to seed
//! defaults when the document is missing. Read failures never stop the
//! display: the last good value (or the defaults) is used instead.

use crate::remote::{SettingsDocument, SettingsStore};

/// What the panel should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySettings {
    pub show_clock: bool,
    pub show_photos: bool,
    /// IANA timezone name for the clock
    pub timezone: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_clock: true,
            show_photos: true,
            timezone: "UTC".to_string(),
        }
    }
}

impl From<SettingsDocument> for DisplaySettings {
    /// Missing fields take their default individually.
    fn from(doc: SettingsDocument) -> Self {
        let defaults = Self::default();
        Self {
            show_clock: doc.show_clock.unwrap_or(defaults.show_clock),
            show_photos: doc.show_photos.unwrap_or(defaults.show_photos),
            timezone: doc.timezone.unwrap_or(defaults.timezone),
        }
    }
}

/// Fetches settings with create-on-read and last-known-good fallback.
#[derive(Debug)]
pub struct SettingsSource<S> {
    store: S,
    last_known: Option<DisplaySettings>,
}

impl<S: SettingsStore> SettingsSource<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            last_known: None,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Settings from the most recent successful read, if any.
    pub fn last_known(&self) -> Option<&DisplaySettings> {
        self.last_known.as_ref()
    }

    /// Read the current settings. Never fails.
    ///
    /// - Document present: its values (defaults for missing fields).
    /// - Document absent: the defaults are written back and returned.
    /// - Read error: last known settings, else the defaults.
    pub async fn fetch(&mut self) -> DisplaySettings {
        match self.store.load().await {
            Ok(Some(doc)) => {
                let settings = DisplaySettings::from(doc);
                tracing::info!(
                    "Display settings - clock: {}, photos: {}, timezone: {}",
                    settings.show_clock,
                    settings.show_photos,
                    settings.timezone
                );
                self.last_known = Some(settings.clone());
                settings
            }
            Ok(None) => {
                let settings = DisplaySettings::default();
                match self.store.save(&settings).await {
                    Ok(()) => tracing::info!("Created default display settings"),
                    Err(e) => tracing::warn!("Failed to write default settings: {}", e),
                }
                self.last_known = Some(settings.clone());
                settings
            }
            Err(e) => {
                let settings = self.last_known.clone().unwrap_or_default();
                tracing::warn!(
                    "Failed to read display settings, using {}: {}",
                    if self.last_known.is_some() {
                        "last known values"
                    } else {
                        "defaults"
                    },
                    e
                );
                settings
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySettingsStore;

    #[test]
    fn test_defaults() {
        let settings = DisplaySettings::default();
        assert!(settings.show_clock);
        assert!(settings.show_photos);
        assert_eq!(settings.timezone, "UTC");
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let settings = DisplaySettings::from(SettingsDocument {
            show_clock: None,
            show_photos: Some(false),
            timezone: None,
        });
        assert!(settings.show_clock);
        assert!(!settings.show_photos);
        assert_eq!(settings.timezone, "UTC");
    }

    #[tokio::test]
    async fn test_missing_document_is_created_once() {
        let store = MemorySettingsStore::empty();
        let mut source = SettingsSource::new(store.clone());

        let first = source.fetch().await;
        assert_eq!(first, DisplaySettings::default());
        assert_eq!(store.saves(), 1);
        assert_eq!(
            store.document(),
            Some(SettingsDocument {
                show_clock: Some(true),
                show_photos: Some(true),
                timezone: Some("UTC".to_string()),
            })
        );

        let second = source.fetch().await;
        assert_eq!(second, first);
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn test_existing_document_is_not_rewritten() {
        let store = MemorySettingsStore::with_settings(false, true, "Europe/Paris");
        let mut source = SettingsSource::new(store.clone());

        let settings = source.fetch().await;
        assert!(!settings.show_clock);
        assert_eq!(settings.timezone, "Europe/Paris");
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_read_error_without_history_uses_defaults() {
        let store = MemorySettingsStore::empty();
        store.set_failing(true);
        let mut source = SettingsSource::new(store.clone());

        assert_eq!(source.fetch().await, DisplaySettings::default());
        assert!(source.last_known().is_none());
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_read_error_uses_last_known() {
        let store = MemorySettingsStore::with_settings(true, false, "Asia/Tokyo");
        let mut source = SettingsSource::new(store.clone());
        source.fetch().await;

        store.set_failing(true);
        let settings = source.fetch().await;
        assert!(!settings.show_photos);
        assert_eq!(settings.timezone, "Asia/Tokyo");
    }

    #[tokio::test]
    async fn test_failed_default_write_still_returns_defaults() {
        let store = MemorySettingsStore::empty();
        store.set_failing_writes(true);
        let mut source = SettingsSource::new(store.clone());

        assert_eq!(source.fetch().await, DisplaySettings::default());
        assert!(store.document().is_none());
    }
}
