use std::sync::Arc;
use std::time::Duration;

use dd_core::drive::{children_query, is_drive_id};
use dd_core::error::{ErrorPayload, codes};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::RuntimeSettings;
use crate::oauth::{GoogleAuth, OAuthError};
use crate::util::{http_client, truncate_for_error};

const GOOGLE_TIMEOUT: Duration = Duration::from_secs(60);
const FILE_FIELDS: &str = "id, name, mimeType, size, modifiedTime, webViewLink";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error(transparent)]
    Auth(#[from] OAuthError),
    #[error("Failed to reach Google API during {operation}: {source}")]
    Connection {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Google API error {status} during {operation}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("Invalid Google Drive id for {operation}: {id:?}")]
    InvalidId { operation: &'static str, id: String },
    #[error("Unexpected Google response during {operation}: {reason}")]
    Response {
        operation: &'static str,
        reason: String,
    },
}

impl From<GoogleError> for ErrorPayload {
    fn from(err: GoogleError) -> Self {
        let message = err.to_string();
        match err {
            GoogleError::Auth(auth) => auth.into(),
            GoogleError::Connection { operation, .. } => {
                ErrorPayload::new(codes::CONNECTION_ERROR, message)
                    .with_details(json!({ "service": "google", "operation": operation }))
            }
            GoogleError::Api {
                operation, status, ..
            } => {
                let code = if status == 404 {
                    codes::NOT_FOUND
                } else {
                    codes::UPSTREAM_ERROR
                };
                let payload = ErrorPayload::new(code, message).with_details(json!({
                    "service": "google",
                    "operation": operation,
                    "status": status
                }));
                if status == 403 || status == 404 {
                    payload.with_docs_hint(
                        "Check that the authorized Google account can access this file or folder.",
                    )
                } else {
                    payload
                }
            }
            GoogleError::InvalidId { .. } => ErrorPayload::new(codes::VALIDATION_FAILED, message)
                .with_field("file_id")
                .with_docs_hint("Use a file id exactly as returned by list_drive_documents."),
            GoogleError::Response { operation, .. } => {
                ErrorPayload::new(codes::RESPONSE_ERROR, message)
                    .with_details(json!({ "service": "google", "operation": operation }))
            }
        }
    }
}

/// Drive file metadata as returned by `files.list` / `files.get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListPage {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Drive v3 and Docs v1, authorized through [`GoogleAuth`].
pub struct GoogleClient {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    drive_url: String,
    docs_url: String,
}

impl GoogleClient {
    pub fn from_settings(auth: Arc<GoogleAuth>, settings: &RuntimeSettings) -> Self {
        Self::with_base_urls(
            auth,
            &settings.google_drive_api_url,
            &settings.google_docs_api_url,
        )
    }

    pub fn with_base_urls(auth: Arc<GoogleAuth>, drive_url: &str, docs_url: &str) -> Self {
        Self {
            http: http_client(GOOGLE_TIMEOUT),
            auth,
            drive_url: drive_url.trim_end_matches('/').to_string(),
            docs_url: docs_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, GoogleError> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| GoogleError::Connection { operation, source })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(operation, status = status.as_u16(), "Google API call failed");
        Err(GoogleError::Api {
            operation,
            status: status.as_u16(),
            body: truncate_for_error(&body),
        })
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GoogleError> {
        self.send(operation, request)
            .await?
            .json()
            .await
            .map_err(|e| GoogleError::Response {
                operation,
                reason: e.to_string(),
            })
    }

    async fn list_children(
        &self,
        folder_id: &str,
        folders: bool,
    ) -> Result<Vec<DriveFile>, GoogleError> {
        let folder_id = checked_id("files.list", folder_id)?;
        let query = children_query(folder_id, folders, false);
        let fields = format!("nextPageToken, files({FILE_FIELDS})");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("orderBy", "name_natural"),
                ("pageSize", PAGE_SIZE),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let page: FileListPage = self
                .send_json(
                    "files.list",
                    self.http
                        .get(format!("{}/files", self.drive_url))
                        .query(&params),
                )
                .await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        tracing::debug!(folder_id, folders, count = files.len(), "listed folder children");
        Ok(files)
    }

    /// Non-folder, non-trashed children of a folder, all pages.
    pub async fn list_files(&self, folder_id: &str) -> Result<Vec<DriveFile>, GoogleError> {
        self.list_children(folder_id, false).await
    }

    pub async fn list_subfolders(&self, folder_id: &str) -> Result<Vec<DriveFile>, GoogleError> {
        self.list_children(folder_id, true).await
    }

    pub async fn find_subfolder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<DriveFile>, GoogleError> {
        let wanted = name.trim();
        Ok(self
            .list_subfolders(parent_id)
            .await?
            .into_iter()
            .find(|folder| folder.name.trim() == wanted))
    }

    pub async fn file_metadata(&self, file_id: &str) -> Result<DriveFile, GoogleError> {
        let file_id = checked_id("files.get", file_id)?;
        self.send_json(
            "files.get",
            self.http
                .get(format!("{}/files/{file_id}", self.drive_url))
                .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")]),
        )
        .await
    }

    /// Export a Workspace file (Docs, Sheets, Slides) as text in `mime_type`.
    pub async fn export_text(&self, file_id: &str, mime_type: &str) -> Result<String, GoogleError> {
        let file_id = checked_id("files.export", file_id)?;
        let response = self
            .send(
                "files.export",
                self.http
                    .get(format!("{}/files/{file_id}/export", self.drive_url))
                    .query(&[("mimeType", mime_type)]),
            )
            .await?;
        let bytes = response.bytes().await.map_err(|e| GoogleError::Response {
            operation: "files.export",
            reason: e.to_string(),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>, GoogleError> {
        let file_id = checked_id("files.download", file_id)?;
        let response = self
            .send(
                "files.download",
                self.http
                    .get(format!("{}/files/{file_id}", self.drive_url))
                    .query(&[("alt", "media"), ("supportsAllDrives", "true")]),
            )
            .await?;
        let bytes = response.bytes().await.map_err(|e| GoogleError::Response {
            operation: "files.download",
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    pub async fn copy_document(
        &self,
        template_id: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<DriveFile, GoogleError> {
        let template_id = checked_id("files.copy", template_id)?;
        tracing::info!(template_id, parent_id, name, "copying template document");
        self.send_json(
            "files.copy",
            self.http
                .post(format!("{}/files/{template_id}/copy", self.drive_url))
                .query(&[
                    ("fields", "id, name, mimeType, webViewLink"),
                    ("supportsAllDrives", "true"),
                ])
                .json(&json!({ "name": name, "parents": [parent_id] })),
        )
        .await
    }

    pub async fn batch_update(
        &self,
        document_id: &str,
        requests: Vec<Value>,
    ) -> Result<Value, GoogleError> {
        let document_id = checked_id("documents.batchUpdate", document_id)?;
        if requests.is_empty() {
            return Ok(json!({ "documentId": document_id, "replies": [] }));
        }
        tracing::info!(document_id, requests = requests.len(), "applying document batch update");
        self.send_json(
            "documents.batchUpdate",
            self.http
                .post(format!("{}/documents/{document_id}:batchUpdate", self.docs_url))
                .json(&json!({ "requests": requests })),
        )
        .await
    }
}

/// Ids are interpolated into request paths.
fn checked_id<'a>(operation: &'static str, id: &'a str) -> Result<&'a str, GoogleError> {
    if is_drive_id(id) {
        Ok(id)
    } else {
        Err(GoogleError::InvalidId {
            operation,
            id: id.to_string(),
        })
    }
}
