//! Local image cache.
//!
//! Images are downloaded once and kept on disk for the life of the cache
//! directory. A file is named after the image id, so a later run finds it
//! again without touching the network. Cached files are never refreshed:
//! if a remote image is replaced under the same id, the old copy is served.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::remote::{eligible_images, ImageRef, ImageStore};

/// Bytes of the id hash kept in a cache file name.
const NAME_HASH_BYTES: usize = 8;

/// Longest id basename kept in a cache file name.
const MAX_BASENAME_CHARS: usize = 100;

/// A remote image materialized on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub id: String,
    pub local_path: PathBuf,
}

/// Maps image ids to local files, downloading on miss.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    /// Open (and create if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Init(format!(
                "Failed to create cache dir '{}': {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic local path for an image id.
    pub fn local_path(&self, id: &str) -> PathBuf {
        self.dir.join(cache_file_name(id))
    }

    /// Return the cached copy of `image`, downloading it through `store`
    /// first if absent.
    ///
    /// A failed download leaves nothing behind in the cache.
    pub async fn resolve<S: ImageStore>(
        &self,
        store: &S,
        image: &ImageRef,
    ) -> Result<CachedImage, Error> {
        let local_path = self.local_path(&image.id);
        if tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
            tracing::debug!("Cache hit for {}", image.id);
            return Ok(CachedImage {
                id: image.id.clone(),
                local_path,
            });
        }

        let bytes = store.fetch(&image.remote_locator).await?;
        let partial = partial_path(&local_path);
        let stored = match tokio::fs::write(&partial, &bytes).await {
            Ok(()) => tokio::fs::rename(&partial, &local_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(Error::Fetch(format!(
                "Failed to store {}: {}",
                local_path.display(),
                e
            )));
        }

        tracing::info!("Downloaded {} to {}", image.id, local_path.display());
        Ok(CachedImage {
            id: image.id.clone(),
            local_path,
        })
    }
}

/// List the remote folder and materialize every image in it.
///
/// Images that fail to download are dropped with a warning. It is an
/// [`Error::Init`] if the folder holds no images or none could be fetched.
pub async fn prepare_images<S: ImageStore>(
    store: &S,
    cache: &ImageCache,
    prefix: &str,
) -> Result<Vec<CachedImage>, Error> {
    let objects = store
        .list_images(prefix)
        .await
        .map_err(|e| Error::Init(format!("Failed to list images under '{}': {}", prefix, e)))?;
    let refs = eligible_images(objects);
    if refs.is_empty() {
        return Err(Error::Init(format!("No images found under '{}'", prefix)));
    }

    let mut cached = Vec::with_capacity(refs.len());
    for image in &refs {
        match cache.resolve(store, image).await {
            Ok(entry) => cached.push(entry),
            Err(e) => tracing::warn!("Skipping {}: {}", image.id, e),
        }
    }

    if cached.is_empty() {
        return Err(Error::Init(format!(
            "None of the {} listed images could be fetched",
            refs.len()
        )));
    }
    if cached.len() < refs.len() {
        tracing::warn!("{} of {} images unavailable", refs.len() - cached.len(), refs.len());
    }
    tracing::info!("{} images cached", cached.len());
    Ok(cached)
}

/// File name for an image id: a hash of the whole id, then its last path
/// component restricted to `[A-Za-z0-9._-]`.
///
/// The hash keeps ids that share a basename in different folders apart.
fn cache_file_name(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let hash: String = digest[..NAME_HASH_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    let base = id.rsplit('/').find(|s| !s.is_empty()).unwrap_or(id);
    let base: String = base
        .chars()
        .take(MAX_BASENAME_CHARS)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", hash, base)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
