//! Blocking client for the library storage service.
//!
//! The service keeps `<name>.zip` archives and serves them statically under
//! `/libraries/`. Analysis never happens server-side; the service's
//! `/api/generate-video` endpoint returns placeholder timelines and is not used.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::package::ShapeLibrary;
use super::store::{sanitize_name, LibrarySummary};
use crate::error::LibraryError;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub version: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    name: String,
}

pub struct RemoteLibraries {
    base_url: String,
    client: Client,
}

impl RemoteLibraries {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LibraryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(http_error)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn health(&self) -> Result<ServiceHealth, LibraryError> {
        let response = self.client.get(self.url("api/health")).send().map_err(http_error)?;
        parse_json(checked(response, "health")?)
    }

    /// Libraries known to the service, keyed by name.
    pub fn list(&self) -> Result<BTreeMap<String, LibrarySummary>, LibraryError> {
        let response = self
            .client
            .get(self.url("api/file-libraries"))
            .send()
            .map_err(http_error)?;
        parse_json(checked(response, "list")?)
    }

    /// Upload archive bytes as `<name>.zip`. Returns the name the service stored it under.
    pub fn upload_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<String, LibraryError> {
        let name = sanitize_name(name)?;
        ShapeLibrary::from_zip_bytes(&bytes, &name)?;

        let part = multipart::Part::bytes(bytes)
            .file_name(format!("{}.zip", name))
            .mime_str("application/zip")
            .map_err(http_error)?;
        let form = multipart::Form::new().part("library", part);
        let response = self
            .client
            .post(self.url("api/upload-library"))
            .multipart(form)
            .send()
            .map_err(http_error)?;
        let reply: UploadReply = parse_json(checked(response, &name)?)?;
        log::info!("Uploaded library '{}'", reply.name);
        Ok(reply.name)
    }

    pub fn upload(&self, library: &ShapeLibrary) -> Result<String, LibraryError> {
        self.upload_bytes(library.name(), library.to_zip_bytes()?)
    }

    /// Raw archive bytes of a stored library.
    pub fn download_bytes(&self, name: &str) -> Result<Vec<u8>, LibraryError> {
        let name = sanitize_name(name)?;
        let response = self
            .client
            .get(self.url(&format!("libraries/{}.zip", name)))
            .send()
            .map_err(http_error)?;
        let bytes = checked(response, &name)?.bytes().map_err(http_error)?;
        Ok(bytes.to_vec())
    }

    pub fn download(&self, name: &str) -> Result<ShapeLibrary, LibraryError> {
        let bytes = self.download_bytes(name)?;
        ShapeLibrary::from_zip_bytes(&bytes, name)
    }

    pub fn delete(&self, name: &str) -> Result<(), LibraryError> {
        let name = sanitize_name(name)?;
        let response = self
            .client
            .delete(self.url(&format!("api/file-library/{}", name)))
            .send()
            .map_err(http_error)?;
        checked(response, &name)?;
        log::info!("Deleted remote library '{}'", name);
        Ok(())
    }
}

fn http_error(e: reqwest::Error) -> LibraryError {
    LibraryError::Http(e.to_string())
}

/// Maps 404 to [`LibraryError::NotFound`] and other failures to [`LibraryError::Http`].
fn checked(response: Response, what: &str) -> Result<Response, LibraryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(LibraryError::NotFound(what.to_string()));
    }
    let body = response.text().unwrap_or_default();
    Err(LibraryError::Http(format!(
        "{} ({}): {}",
        what,
        status,
        error_message(&body)
    )))
}

fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, LibraryError> {
    let bytes = response.bytes().map_err(http_error)?;
    serde_json::from_slice(&bytes).map_err(|e| LibraryError::Http(format!("bad response: {}", e)))
}

/// The service reports failures as `{"error": "..."}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_urls() {
        let remote = RemoteLibraries::new("http://localhost:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(remote.url("/api/health"), "http://localhost:3000/api/health");
        assert_eq!(remote.url("libraries/x.zip"), "http://localhost:3000/libraries/x.zip");
    }

    #[test]
    fn parses_listing() {
        let listing: BTreeMap<String, LibrarySummary> = serde_json::from_str(
            r#"{"faces":{"name":"faces","displayName":"Faces","createdAt":"2024-01-01T00:00:00.000Z","size":1234,"imageCount":9}}"#,
        )
        .unwrap();
        assert_eq!(listing["faces"].image_count, 9);
        assert_eq!(listing["faces"].display_name, "Faces");
    }

    #[test]
    fn extracts_error_messages() {
        assert_eq!(error_message(r#"{"error":"Library not found"}"#), "Library not found");
        assert_eq!(error_message(" plain text "), "plain text");
    }

    #[test]
    fn rejects_bad_names_before_sending() {
        let remote = RemoteLibraries::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        assert!(matches!(remote.delete("///"), Err(LibraryError::InvalidName(_))));
    }
}
