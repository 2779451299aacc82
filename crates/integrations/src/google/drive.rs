//! Google Drive v3 storage for pipeline artifacts.
//!
//! Everything lives under one root folder with four fixed subfolders. Folder ids are
//! looked up (or created) once per client and cached.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use closer_core::assets::file_mime_type;
use closer_core::workspace::Workspace;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::auth::GoogleAuth;
use super::{api_url, GoogleApi};
use crate::error::{ensure_success, IntegrationError};

const FILES_BASE: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,size,webViewLink";
const SERVICE: &str = "google drive";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveFolder {
    Transcripts,
    Proposals,
    Deployments,
    Exports,
}

impl DriveFolder {
    pub const ALL: [DriveFolder; 4] =
        [Self::Transcripts, Self::Proposals, Self::Deployments, Self::Exports];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcripts => "transcripts",
            Self::Proposals => "proposals",
            Self::Deployments => "deployments",
            Self::Exports => "exports",
        }
    }

    /// Unrecognized folder names land in `exports`.
    pub fn parse_or_exports(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "transcripts" | "transcript" => Self::Transcripts,
            "proposals" | "proposal" => Self::Proposals,
            "deployments" | "deployment" => Self::Deployments,
            _ => Self::Exports,
        }
    }
}

impl fmt::Display for DriveFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncedFile {
    pub folder: DriveFolder,
    pub name: String,
    pub file_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub uploaded: Vec<SyncedFile>,
    pub failed: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug)]
pub struct DriveClient {
    api: GoogleApi,
    root_folder: String,
    folder_ids: Mutex<HashMap<String, String>>,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, auth: Arc<GoogleAuth>, root_folder: impl Into<String>) -> Self {
        Self {
            api: GoogleApi::new(http, auth),
            root_folder: root_folder.into(),
            folder_ids: Mutex::new(HashMap::new()),
        }
    }

    pub fn root_folder(&self) -> &str {
        &self.root_folder
    }

    pub async fn folder_id(&self, folder: DriveFolder) -> Result<String, IntegrationError> {
        let root = self.find_or_create(&self.root_folder, None).await?;
        self.find_or_create(folder.as_str(), Some(&root)).await
    }

    /// Creates the file, or replaces its content if the folder already has one by that name.
    pub async fn upload(&self, path: &Path, folder: DriveFolder) -> Result<DriveFile, IntegrationError> {
        let bytes = tokio::fs::read(path).await.map_err(IntegrationError::io(path))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                IntegrationError::InvalidRequest(format!("`{}` has no file name", path.display()))
            })?;
        let mime = file_mime_type(path);
        let parent = self.folder_id(folder).await?;

        let existing = self
            .query(&format!(
                "name = '{}' and '{}' in parents and trashed = false",
                escape_query(&name),
                escape_query(&parent)
            ))
            .await?
            .into_iter()
            .next();

        let (method, url, metadata) = match &existing {
            Some(file) => {
                let url = api_url(UPLOAD_BASE, &[file.id.as_str()])?;
                (Method::PATCH, url, json!({ "name": name }))
            }
            None => {
                let url = api_url(UPLOAD_BASE, &[])?;
                (Method::POST, url, json!({ "name": name, "parents": [parent] }))
            }
        };
        let mut url = url;
        url.query_pairs_mut().append_pair("uploadType", "multipart").append_pair("fields", FILE_FIELDS);

        let boundary = format!("closer_{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, mime, &bytes);
        let response = self
            .api
            .request(method, url)
            .await?
            .header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
            .body(body)
            .send()
            .await;
        let file: DriveFile = decode(response).await?;

        info!(
            event_name = "drive.file.uploaded",
            folder = %folder,
            name = %file.name,
            file_id = %file.id,
            replaced = existing.is_some(),
            "file uploaded"
        );
        Ok(file)
    }

    /// Upload into a folder given by name, the way tool callers pass it.
    pub async fn upload_single(&self, path: &Path, folder_type: &str) -> Result<DriveFile, IntegrationError> {
        self.upload(path, DriveFolder::parse_or_exports(folder_type)).await
    }

    pub async fn list(&self, folder: DriveFolder, limit: usize) -> Result<Vec<DriveFile>, IntegrationError> {
        let parent = self.folder_id(folder).await?;
        let mut files = self
            .query(&format!("'{}' in parents and trashed = false", escape_query(&parent)))
            .await?;
        files.truncate(limit);
        Ok(files)
    }

    pub async fn download(&self, file_id: &str, dest: &Path) -> Result<PathBuf, IntegrationError> {
        if file_id.trim().is_empty() {
            return Err(IntegrationError::InvalidRequest("file_id must not be empty".to_string()));
        }
        let mut meta_url = api_url(FILES_BASE, &[file_id])?;
        meta_url.query_pairs_mut().append_pair("fields", FILE_FIELDS);
        let response = self.api.request(Method::GET, meta_url).await?.send().await;
        let file: DriveFile = match decode(response).await {
            Err(IntegrationError::Status { status: 404, .. }) => {
                return Err(IntegrationError::NotFound(format!("drive file `{file_id}` not found")));
            }
            other => other?,
        };

        let mut url = api_url(FILES_BASE, &[file_id])?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self
            .api
            .request(Method::GET, url)
            .await?
            .send()
            .await
            .map_err(IntegrationError::transport(SERVICE))?;
        let response = ensure_success(SERVICE, response).await?;
        let bytes = response.bytes().await.map_err(IntegrationError::decode(SERVICE))?;

        let target = download_target(dest, &file.name, file_id);
        if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(IntegrationError::io(parent))?;
        }
        tokio::fs::write(&target, &bytes).await.map_err(IntegrationError::io(target.as_path()))?;
        info!(event_name = "drive.file.downloaded", file_id = %file_id, path = %target.display(), "file downloaded");
        Ok(target)
    }

    /// Uploads every transcript, proposal and the last deployment URL. One bad file does
    /// not stop the rest; it is listed in [`SyncReport::failed`].
    pub async fn sync_all(&self, workspace: &Workspace) -> Result<SyncReport, IntegrationError> {
        let mut pending: Vec<(PathBuf, DriveFolder)> = Vec::new();
        let transcripts = workspace.list_transcripts(usize::MAX).await.map_err(storage)?;
        pending.extend(transcripts.into_iter().map(|entry| (entry.path, DriveFolder::Transcripts)));
        let proposals = workspace.list_proposals(usize::MAX).await.map_err(storage)?;
        pending.extend(proposals.into_iter().map(|entry| (entry.path, DriveFolder::Proposals)));
        let last_url = workspace.last_deployment_path();
        if tokio::fs::try_exists(&last_url).await.unwrap_or(false) {
            pending.push((last_url, DriveFolder::Deployments));
        }

        let mut report = SyncReport::default();
        for (path, folder) in pending {
            match self.upload(&path, folder).await {
                Ok(file) => report.uploaded.push(SyncedFile { folder, name: file.name, file_id: file.id }),
                Err(IntegrationError::NotConfigured { what, hint }) => {
                    return Err(IntegrationError::NotConfigured { what, hint });
                }
                Err(error) => {
                    warn!(event_name = "drive.sync.file_failed", path = %path.display(), error = %error, "upload failed");
                    report.failed.push(format!("{}: {error}", path.display()));
                }
            }
        }

        info!(
            event_name = "drive.sync.completed",
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            "drive sync finished"
        );
        Ok(report)
    }

    async fn find_or_create(&self, name: &str, parent: Option<&str>) -> Result<String, IntegrationError> {
        let key = format!("{}/{name}", parent.unwrap_or(""));
        let mut cache = self.folder_ids.lock().await;
        if let Some(id) = cache.get(&key) {
            return Ok(id.clone());
        }

        let mut clause = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME}' and trashed = false",
            escape_query(name)
        );
        if let Some(parent) = parent {
            clause.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }
        let id = match self.query(&clause).await?.into_iter().next() {
            Some(folder) => folder.id,
            None => {
                let url = api_url(FILES_BASE, &[])?;
                let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME });
                if let Some(parent) = parent {
                    metadata["parents"] = json!([parent]);
                }
                let response = self.api.request(Method::POST, url).await?.json(&metadata).send().await;
                let created: DriveFile = decode(response).await?;
                info!(event_name = "drive.folder.created", name = %name, folder_id = %created.id, "folder created");
                created.id
            }
        };
        cache.insert(key, id.clone());
        Ok(id)
    }

    async fn query(&self, clause: &str) -> Result<Vec<DriveFile>, IntegrationError> {
        let mut url = api_url(FILES_BASE, &[])?;
        url.query_pairs_mut()
            .append_pair("q", clause)
            .append_pair("orderBy", "modifiedTime desc")
            .append_pair("fields", &format!("files({FILE_FIELDS})"));
        let response = self.api.request(Method::GET, url).await?.send().await;
        let list: FileList = decode(response).await?;
        Ok(list.files)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, IntegrationError> {
    let response = response.map_err(IntegrationError::transport(SERVICE))?;
    let response = ensure_success(SERVICE, response).await?;
    response.json().await.map_err(IntegrationError::decode(SERVICE))
}

fn storage(error: closer_core::errors::ApplicationError) -> IntegrationError {
    IntegrationError::Workspace(error.to_string())
}

/// Drive query strings quote with `'` and escape with `\`.
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// A directory destination receives the file under its Drive name.
pub fn download_target(dest: &Path, drive_name: &str, file_id: &str) -> PathBuf {
    let is_dir = dest.is_dir() || dest.as_os_str().to_string_lossy().ends_with('/');
    if !is_dir {
        return dest.to_path_buf();
    }
    let name = Path::new(drive_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| file_id.to_string());
    dest.join(name)
}

pub fn multipart_related(boundary: &str, metadata: &serde_json::Value, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;
    use tempfile::TempDir;

    use super::{download_target, escape_query, multipart_related, DriveFile, DriveFolder};

    #[test]
    fn unknown_folder_types_fall_back_to_exports() {
        assert_eq!(DriveFolder::parse_or_exports("Proposals"), DriveFolder::Proposals);
        assert_eq!(DriveFolder::parse_or_exports("transcript"), DriveFolder::Transcripts);
        assert_eq!(DriveFolder::parse_or_exports("invoices"), DriveFolder::Exports);
    }

    #[test]
    fn query_values_escape_quotes() {
        assert_eq!(escape_query("O'Brien proposal"), "O\\'Brien proposal");
    }

    #[test]
    fn multipart_body_has_metadata_then_content() {
        let body = multipart_related("b1", &json!({ "name": "a.html" }), "text/html", b"<p>hi</p>");
        let text = String::from_utf8(body).expect("utf8");
        assert!(text.starts_with("--b1\r\nContent-Type: application/json"));
        let metadata_at = text.find("\"name\":\"a.html\"").expect("metadata");
        let content_at = text.find("<p>hi</p>").expect("content");
        assert!(metadata_at < content_at);
        assert!(text.ends_with("\r\n--b1--\r\n"));
    }

    #[test]
    fn download_into_directory_uses_drive_name() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(download_target(dir.path(), "deck.html", "id1"), dir.path().join("deck.html"));
        let explicit = dir.path().join("renamed.html");
        assert_eq!(download_target(&explicit, "deck.html", "id1"), explicit);
        assert_eq!(
            download_target(Path::new("downloads/"), "../evil.html", "id1"),
            Path::new("downloads/").join("evil.html")
        );
    }

    #[test]
    fn file_listing_parses_camel_case_fields() {
        let file: DriveFile = serde_json::from_value(json!({
            "id": "f1",
            "name": "acme.html",
            "mimeType": "text/html",
            "webViewLink": "https://drive.google.com/file/d/f1/view"
        }))
        .expect("parse");
        assert_eq!(file.mime_type.as_deref(), Some("text/html"));
        assert!(file.modified_time.is_none());
    }
}
