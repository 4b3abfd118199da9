// ─── Google Drive backend ───
// Drive v3 REST API over reqwest. Authentication is an already-issued OAuth
// access token; obtaining one is the caller's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use super::model::{EntryKind, EntryQuery, FileRef, FolderRef, RemoteEntry};
use super::StorageClient;
use crate::core::error::{SyncError, SyncResult};
use crate::core::http::build_http_client;

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,parents,modifiedTime,md5Checksum";
const PAGE_SIZE: &str = "1000";
const MULTIPART_BOUNDARY: &str = "craftsync-part-boundary";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    md5_checksum: Option<String>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        let kind = if file.mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        RemoteEntry {
            id: file.id,
            title: file.name,
            kind,
            parent: file.parents.into_iter().next(),
            modified_at: file.modified_time,
            md5: file.md5_checksum,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

pub struct DriveStore {
    client: Client,
    access_token: String,
    files_url: String,
    upload_url: String,
}

impl DriveStore {
    pub fn new(access_token: impl Into<String>) -> SyncResult<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(SyncError::Config("Drive access token is empty".into()));
        }

        Ok(Self {
            client: build_http_client()?,
            access_token,
            files_url: DRIVE_FILES_URL.to_string(),
            upload_url: DRIVE_UPLOAD_URL.to_string(),
        })
    }
}

/// Translate a structured query into Drive's `q` search syntax.
pub fn build_query(query: &EntryQuery) -> String {
    let mut clauses = Vec::new();

    if let Some(parent) = &query.parent {
        clauses.push(format!("'{}' in parents", escape_query_value(parent)));
    }
    if let Some(title) = &query.title {
        clauses.push(format!("name = '{}'", escape_query_value(title)));
    }
    match query.kind {
        Some(EntryKind::Folder) => clauses.push(format!("mimeType = '{FOLDER_MIME_TYPE}'")),
        Some(EntryKind::File) => clauses.push(format!("mimeType != '{FOLDER_MIME_TYPE}'")),
        None => {}
    }
    if !query.include_trashed {
        clauses.push("trashed = false".to_string());
    }

    clauses.join(" and ")
}

fn escape_query_value(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related_body(metadata: &serde_json::Value, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

/// Turn a non-2xx response into a `RemoteStatus` error carrying the body.
async fn check_status(response: Response, operation: &str) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::RemoteStatus {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl StorageClient for DriveStore {
    fn name(&self) -> &str {
        "google-drive"
    }

    async fn query(&self, query: &EntryQuery) -> SyncResult<Vec<RemoteEntry>> {
        let q = build_query(query);
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", q.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", PAGE_SIZE),
                ("spaces", "drive"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let response = self
                .client
                .get(&self.files_url)
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await?;
            let page: DriveFileList = check_status(response, "list").await?.json().await?;

            entries.extend(page.files.into_iter().map(RemoteEntry::from));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Drive query [{}] returned {} entries", q, entries.len());
        Ok(entries)
    }

    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&FolderRef>,
    ) -> SyncResult<FolderRef> {
        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent.id]);
        }

        let response = self
            .client
            .post(&self.files_url)
            .bearer_auth(&self.access_token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&metadata)
            .send()
            .await?;
        let created: DriveFile = check_status(response, "create folder").await?.json().await?;

        Ok(FolderRef {
            id: created.id,
            name: created.name,
        })
    }

    async fn upload_content(
        &self,
        parent: &FolderRef,
        title: &str,
        bytes: Vec<u8>,
    ) -> SyncResult<FileRef> {
        let metadata = serde_json::json!({
            "name": title,
            "parents": [parent.id],
        });
        let body = multipart_related_body(&metadata, &bytes);

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        let uploaded: DriveFile = check_status(response, "upload").await?.json().await?;

        debug!("Uploaded {} ({} bytes) as {}", title, bytes.len(), uploaded.id);
        Ok(FileRef {
            id: uploaded.id,
            title: uploaded.name,
            md5: uploaded.md5_checksum,
        })
    }

    async fn delete_entry(&self, id: &str) -> SyncResult<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.files_url, id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(id.to_string()));
        }
        check_status(response, "delete").await?;
        Ok(())
    }

    async fn download_content(&self, file: &FileRef) -> SyncResult<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}/{}", self.files_url, file.id))
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(file.title.clone()));
        }
        let bytes = check_status(response, "download").await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
