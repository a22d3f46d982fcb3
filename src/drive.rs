use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// One file or folder as the object store reports it.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: Option<i64>,
    pub parent_id: Option<String>,
    pub modified_at: DateTime<Utc>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// The object-store collaborator. Consumed, never reimplemented: listing,
/// lookup and folder creation are all the core needs.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn list_children(&self, folder_id: &str) -> AppResult<Vec<RemoteEntry>>;

    /// All folders with this exact name anywhere in the store. The caller
    /// decides which parent chain counts.
    async fn find_folders_named(&self, name: &str) -> AppResult<Vec<RemoteEntry>>;

    async fn entry(&self, id: &str) -> AppResult<Option<RemoteEntry>>;

    async fn create_folder(&self, name: &str, parent_id: &str) -> AppResult<RemoteEntry>;
}

/// Drive-style REST client. Token refresh happens outside this core; the
/// client only attaches the bearer token it was configured with.
pub struct DriveClient {
    http: Client,
    endpoint: String,
    token: String,
}

impl DriveClient {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.object_store_endpoint.trim_end_matches('/').to_string(),
            token: config.object_store_token.clone(),
        }
    }

    async fn query_files(&self, query: &str) -> AppResult<Vec<RemoteEntry>> {
        let url = format!("{}/files", self.endpoint);
        debug!(%url, %query, "listing object store files");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("q", query),
                ("fields", FILE_FIELDS_LIST),
                ("pageSize", "1000"),
            ])
            .send()
            .await?;
        let response = check_status(response, "file query").await?;
        let data: FileListResponse = response.json().await?;
        Ok(data.files.into_iter().map(DriveFile::into_entry).collect())
    }
}

#[async_trait]
impl ObjectStore for DriveClient {
    async fn list_children(&self, folder_id: &str) -> AppResult<Vec<RemoteEntry>> {
        let query = format!("'{}' in parents and trashed = false", escape_query(folder_id));
        self.query_files(&query).await
    }

    async fn find_folders_named(&self, name: &str) -> AppResult<Vec<RemoteEntry>> {
        let query = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME_TYPE}' and trashed = false",
            escape_query(name)
        );
        self.query_files(&query).await
    }

    async fn entry(&self, id: &str) -> AppResult<Option<RemoteEntry>> {
        let url = format!("{}/files/{id}", self.endpoint);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, "file lookup").await?;
        let file: DriveFile = response.json().await?;
        Ok(Some(file.into_entry()))
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> AppResult<RemoteEntry> {
        let url = format!("{}/files", self.endpoint);
        debug!(%name, %parent_id, "creating object store folder");
        let payload = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&payload)
            .send()
            .await?;
        let response = check_status(response, "folder creation").await?;
        let file: DriveFile = response.json().await?;
        Ok(file.into_entry())
    }
}

const FILE_FIELDS: &str = "id,name,mimeType,size,parents,modifiedTime";
const FILE_FIELDS_LIST: &str = "files(id,name,mimeType,size,parents,modifiedTime)";

async fn check_status(response: Response, operation: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(%status, body = %body, "object store {operation} failed");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::PermissionDenied(
            format!("{operation} rejected with status {status}"),
        )),
        StatusCode::NOT_FOUND => Err(AppError::not_found("object store resource", operation)),
        _ => Err(AppError::transient(format!(
            "{operation} failed with status {status}: {body}"
        ))),
    }
}

/// Escapes a value for interpolation into a Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[derive(Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    /// The API reports sizes as decimal strings; folders have none.
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    parents: Option<Vec<String>>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

impl DriveFile {
    fn into_entry(self) -> RemoteEntry {
        RemoteEntry {
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            size_bytes: self.size.and_then(|raw| raw.parse().ok()),
            parent_id: self
                .parents
                .and_then(|parents| parents.into_iter().next()),
            modified_at: self.modified_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}
