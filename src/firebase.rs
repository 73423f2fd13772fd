//! Firebase backend: Cloud Storage for photos, Firestore for settings.
//!
//! Talks to the public REST APIs with `reqwest`:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list photos | `GET /storage/v1/b/{bucket}/o?prefix={folder}` (paginated) |
//! | object lookup | `GET /storage/v1/b/{bucket}/o/{name}` |
//! | download token | `PATCH /storage/v1/b/{bucket}/o/{name}` (metadata only) |
//! | read settings | `GET /v1/projects/{p}/databases/(default)/documents/{col}/{doc}` |
//! | seed settings | `PATCH` on the same document |
//! | now showing | `PATCH ...?updateMask.fieldPaths=current_photo` |
//!
//! Requests carry a bearer token when one is configured. Without a token the
//! requests go out unauthenticated, which is what the local emulators expect.
//! Downloads from the Storage API host (media links) carry the token too;
//! Firebase download-token URLs are public and are fetched without it.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::FirebaseConfig;
use crate::error::Error;
use crate::remote::{ImageStore, NowShowing, RemoteObject, SettingsDocument, SettingsStore};
use crate::settings::DisplaySettings;

/// Public host serving Firebase download-token URLs.
const DOWNLOAD_HOST: &str = "https://firebasestorage.googleapis.com";

/// Metadata key holding Firebase download tokens (comma separated).
const DOWNLOAD_TOKENS_KEY: &str = "firebaseStorageDownloadTokens";

/// Firestore field written after each displayed photo.
const CURRENT_PHOTO_FIELD: &str = "current_photo";

/// One page of a Cloud Storage object listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

/// The parts of a Cloud Storage object resource the frame uses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    content_type: Option<String>,
    media_link: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// A Firestore document body.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FirestoreDocument {
    #[serde(default)]
    fields: BTreeMap<String, FirestoreValue>,
}

/// A typed Firestore value. Only the types the settings use are modelled;
/// other types deserialize to an empty value.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    boolean_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
}

impl FirestoreValue {
    fn boolean(value: bool) -> Self {
        Self {
            boolean_value: Some(value),
            ..Default::default()
        }
    }

    fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Default::default()
        }
    }
}

impl FirestoreDocument {
    fn into_settings(mut self) -> SettingsDocument {
        SettingsDocument {
            show_clock: self.fields.get("show_clock").and_then(|v| v.boolean_value),
            show_photos: self.fields.get("show_photos").and_then(|v| v.boolean_value),
            timezone: self
                .fields
                .remove("timezone")
                .and_then(|v| v.string_value),
        }
    }

    fn from_settings(settings: &DisplaySettings) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("show_clock".to_string(), FirestoreValue::boolean(settings.show_clock));
        fields.insert("show_photos".to_string(), FirestoreValue::boolean(settings.show_photos));
        fields.insert("timezone".to_string(), FirestoreValue::string(&settings.timezone));
        Self { fields }
    }
}

/// Firebase REST client implementing [`ImageStore`] and [`SettingsStore`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use eink_photoframe::{FirebaseClient, FrameConfig};
///
/// let config = FrameConfig::load("photoframe.yaml")?;
/// let client = FirebaseClient::new(&config.firebase, Duration::from_secs(10))?;
/// # Ok::<(), eink_photoframe::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FirebaseClient {
    http: reqwest::Client,
    token: Option<String>,
    project_id: String,
    bucket: String,
    settings_collection: String,
    settings_document: String,
    storage_url: String,
    firestore_url: String,
}

impl FirebaseClient {
    /// Create a client for the configured project.
    ///
    /// The access token is read once from `config.token_env`. `timeout`
    /// bounds every request, downloads included.
    pub fn new(config: &FirebaseConfig, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Init(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token: config.access_token(),
            project_id: config.project_id.clone(),
            bucket: config.bucket.clone(),
            settings_collection: config.settings_collection.clone(),
            settings_document: config.settings_document.clone(),
            storage_url: config.storage_url.clone(),
            firestore_url: config.firestore_url.clone(),
        })
    }

    /// Set a custom Cloud Storage base URL (useful for testing).
    #[must_use]
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = url.into();
        self
    }

    /// Set a custom Firestore base URL (useful for testing).
    #[must_use]
    pub fn with_firestore_url(mut self, url: impl Into<String>) -> Self {
        self.firestore_url = url.into();
        self
    }

    /// Set the bearer token explicitly.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn objects_url(&self) -> Result<Url, Error> {
        endpoint(&self.storage_url, &["storage", "v1", "b", &self.bucket, "o"])
    }

    fn object_url(&self, name: &str) -> Result<Url, Error> {
        endpoint(
            &self.storage_url,
            &["storage", "v1", "b", &self.bucket, "o", name],
        )
    }

    fn document_url(&self) -> Result<Url, Error> {
        endpoint(
            &self.firestore_url,
            &[
                "v1",
                "projects",
                &self.project_id,
                "databases",
                "(default)",
                "documents",
                &self.settings_collection,
                &self.settings_document,
            ],
        )
    }

    /// Whether `url` points at the Storage API host, which needs the token.
    fn is_storage_api(&self, url: &Url) -> bool {
        Url::parse(&self.storage_url).is_ok_and(|base| base.origin() == url.origin())
    }

    /// Public download URL built from the object's first download token.
    fn token_locator(&self, object: &ObjectResource) -> Result<Option<String>, Error> {
        let Some(token) = object
            .metadata
            .get(DOWNLOAD_TOKENS_KEY)
            .and_then(|t| t.split(',').next())
            .filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };
        let mut url = endpoint(DOWNLOAD_HOST, &["v0", "b", &self.bucket, "o", &object.name])?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);
        Ok(Some(url.to_string()))
    }

    /// Best URL to download an object from.
    ///
    /// Prefers a Firebase download-token URL, then the API media link. The
    /// latter two need the bearer token, which [`ImageStore::fetch`] sends.
    fn download_locator(&self, object: &ObjectResource) -> Result<String, Error> {
        if let Some(locator) = self.token_locator(object)? {
            return Ok(locator);
        }
        if let Some(link) = &object.media_link {
            return Ok(link.clone());
        }
        let mut url = self.object_url(&object.name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url.to_string())
    }

    /// Attach a fresh download token to an object, as the Firebase console
    /// does, so it can be fetched without credentials.
    async fn add_download_token(&self, name: &str) -> Result<ObjectResource, Error> {
        let body = json!({ "metadata": { DOWNLOAD_TOKENS_KEY: new_download_token()? } });
        let response = self
            .request(Method::PATCH, self.object_url(name)?)
            .json(&body)
            .send()
            .await?;
        let object = read_json(response).await?;
        tracing::info!("Created download token for {}", name);
        Ok(object)
    }

    async fn patch_document(
        &self,
        body: &FirestoreDocument,
        mask: Option<&str>,
    ) -> Result<(), Error> {
        let mut url = self.document_url()?;
        if let Some(field) = mask {
            url.query_pairs_mut()
                .append_pair("updateMask.fieldPaths", field);
        }

        let response = self.request(Method::PATCH, url).json(body).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

impl ImageStore for FirebaseClient {
    async fn list_images(&self, prefix: &str) -> Result<Vec<RemoteObject>, Error> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url()?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.request(Method::GET, url).send().await?;
            let page: ObjectList = read_json(response).await?;

            for item in page.items {
                let locator = self.download_locator(&item)?;
                objects.push(RemoteObject {
                    id: item.name,
                    content_type: item.content_type,
                    locator,
                });
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::info!(
            "Found {} objects under '{}' in bucket {}",
            objects.len(),
            prefix,
            self.bucket
        );
        Ok(objects)
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, Error> {
        let url = Url::parse(locator)
            .map_err(|e| Error::Fetch(format!("Invalid locator '{}': {}", locator, e)))?;
        let request = if self.is_storage_api(&url) {
            self.request(Method::GET, url)
        } else {
            self.http.get(url)
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "Download of {} returned status {}",
                locator,
                status.as_u16()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn access_locator(&self, id: &str) -> Result<Option<String>, Error> {
        let url = self.object_url(id)?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let object: ObjectResource = read_json(response).await?;
        if let Some(locator) = self.token_locator(&object)? {
            return Ok(Some(locator));
        }

        let object = self.add_download_token(id).await?;
        self.token_locator(&object)?
            .ok_or_else(|| Error::Fetch(format!("Object {} has no download token", id)))
            .map(Some)
    }
}

impl SettingsStore for FirebaseClient {
    async fn load(&self) -> Result<Option<SettingsDocument>, Error> {
        let url = self.document_url()?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(settings_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: FirestoreDocument = read_json(response).await?;
        Ok(Some(document.into_settings()))
    }

    async fn save(&self, settings: &DisplaySettings) -> Result<(), Error> {
        self.patch_document(&FirestoreDocument::from_settings(settings), None)
            .await
    }

    async fn publish_now_showing(&self, record: &NowShowing) -> Result<(), Error> {
        let mut fields = BTreeMap::new();
        fields.insert(
            CURRENT_PHOTO_FIELD.to_string(),
            FirestoreValue::string(&record.access_locator),
        );
        self.patch_document(&FirestoreDocument { fields }, Some(CURRENT_PHOTO_FIELD))
            .await?;
        tracing::info!("Updated {} to {}", CURRENT_PHOTO_FIELD, record.image_id);
        Ok(())
    }
}

/// Build `base` + percent-encoded path segments.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, Error> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("Base URL '{}' cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn a non-success response into [`Error::Api`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api { status, body });
    }
    Ok(response)
}

/// Check the status, then decode the body as JSON.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    let body = check_status(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// A random version 4 UUID, the format Firebase uses for download tokens.
fn new_download_token() -> Result<String, Error> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes)
        .map_err(|e| Error::Fetch(format!("No randomness for download token: {}", e)))?;
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    ))
}

fn settings_error(err: reqwest::Error) -> Error {
    Error::Settings(err.to_string())
}
