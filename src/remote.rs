//! Contracts for the remote image store and settings document.
//!
//! The frame only needs a handful of operations from its backend; these
//! traits name them so the rotator and cache can be driven by the Firebase
//! client in production and by in-memory doubles in tests.

use std::future::Future;

use crate::error::Error;
use crate::settings::DisplaySettings;

/// An object found while listing the remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full object name (e.g. `photos/beach.jpg`)
    pub id: String,
    /// MIME type reported by the store, if any
    pub content_type: Option<String>,
    /// URL the object can be downloaded from
    pub locator: String,
}

impl RemoteObject {
    /// Whether the store reports this object as an image.
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// A remote image and a URL it can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub id: String,
    pub remote_locator: String,
}

impl From<RemoteObject> for ImageRef {
    fn from(obj: RemoteObject) -> Self {
        Self {
            id: obj.id,
            remote_locator: obj.locator,
        }
    }
}

/// Keep only image objects, in listing order.
pub fn eligible_images(objects: Vec<RemoteObject>) -> Vec<ImageRef> {
    objects
        .into_iter()
        .filter(RemoteObject::is_image)
        .map(ImageRef::from)
        .collect()
}

/// The settings document as stored remotely. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsDocument {
    pub show_clock: Option<bool>,
    pub show_photos: Option<bool>,
    pub timezone: Option<String>,
}

/// Pointer to the most recently displayed image, for external observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowShowing {
    pub image_id: String,
    pub access_locator: String,
}

/// Read access to the photo folder.
pub trait ImageStore {
    /// List every object under `prefix`.
    fn list_images(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<RemoteObject>, Error>> + Send;

    /// Download the bytes behind a locator returned by this store.
    ///
    /// The store attaches whatever credentials the locator needs.
    fn fetch(&self, locator: &str) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;

    /// A fetchable URL for `id` that works without credentials, or `None`
    /// if the object is gone.
    fn access_locator(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<String>, Error>> + Send;
}

/// Read/write access to the settings document.
pub trait SettingsStore {
    /// Read the document, `None` if it does not exist.
    fn load(&self) -> impl Future<Output = Result<Option<SettingsDocument>, Error>> + Send;

    /// Create or replace the document.
    fn save(&self, settings: &DisplaySettings) -> impl Future<Output = Result<(), Error>> + Send;

    /// Record what is on the panel right now.
    fn publish_now_showing(
        &self,
        record: &NowShowing,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
