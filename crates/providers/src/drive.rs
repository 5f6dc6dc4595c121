use crate::auth::Credentials;
use crate::{ProviderError, RemoteDirectory, RemoteNode, UploadRequest, FOLDER_MIME};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
pub const PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct DriveConfig {
    /// Base for metadata calls (`/drive/v3/...`).
    pub api_base: String,
    /// Base for media uploads (`/upload/drive/v3/...`).
    pub upload_base: String,
    pub api_key: Option<String>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
        }
    }
}

#[derive(Clone)]
pub struct DriveClient {
    client: Client,
    cfg: DriveConfig,
    credentials: Credentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteNode>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    mime_type: &'a str,
    parents: [&'a str; 1],
}

impl DriveClient {
    pub fn new(cfg: DriveConfig, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            cfg,
            credentials,
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.cfg.api_base.trim_end_matches('/'))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let token = self.credentials.require()?;
        let mut builder = builder.bearer_auth(token);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.query(&[("key", key)]);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }
        Ok(resp)
    }
}

/// Quotes a value for the Drive query language.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn find_query(name: &str, parent_id: &str, mime_type: Option<&str>) -> String {
    let mut q = format!(
        "name={} and {} in parents and trashed=false",
        quote(name),
        quote(parent_id)
    );
    if let Some(mime) = mime_type {
        q.push_str(&format!(" and mimeType={}", quote(mime)));
    }
    q
}

pub fn children_query(folder_id: &str) -> String {
    format!("{} in parents and trashed=false", quote(folder_id))
}

/// Upload form: JSON metadata part then media part. The boundary is chosen by reqwest.
fn upload_form(metadata: String, request: UploadRequest) -> Result<Form, ProviderError> {
    let metadata = Part::text(metadata)
        .mime_str("application/json; charset=UTF-8")
        .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
    let media = Part::bytes(request.bytes.to_vec())
        .file_name(request.name)
        .mime_str(&request.mime_type)
        .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
    Ok(Form::new().part("metadata", metadata).part("file", media))
}

#[async_trait::async_trait]
impl RemoteDirectory for DriveClient {
    async fn find_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: Option<&str>,
    ) -> Result<Option<String>, ProviderError> {
        let q = find_query(name, parent_id, mime_type);
        let resp = self
            .send(self.client.get(self.files_url()).query(&[
                ("q", q.as_str()),
                ("fields", "files(id, name)"),
                ("spaces", "drive"),
            ]))
            .await?;
        let list: FileList = resp.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, ProviderError> {
        let metadata = FileMetadata {
            name,
            mime_type: FOLDER_MIME,
            parents: [parent_id],
        };
        let resp = self
            .send(
                self.client
                    .post(self.files_url())
                    .query(&[("fields", "id")])
                    .json(&metadata),
            )
            .await?;
        let created: CreatedFile = resp.json().await?;
        debug!(name, parent_id, id = %created.id, "created folder");
        Ok(created.id)
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteNode>, ProviderError> {
        let q = children_query(folder_id);
        let page_size = PAGE_SIZE.to_string();
        let resp = self
            .send(self.client.get(self.files_url()).query(&[
                ("q", q.as_str()),
                ("fields", "nextPageToken, files(id, name, mimeType, webViewLink, parents)"),
                ("pageSize", page_size.as_str()),
                ("orderBy", "folder,name"),
            ]))
            .await?;
        let list: FileList = resp.json().await?;
        if list.next_page_token.is_some() {
            debug!(folder_id, "folder listing truncated at {} entries", PAGE_SIZE);
        }
        Ok(list.files)
    }

    async fn upload_file(&self, request: UploadRequest) -> Result<RemoteNode, ProviderError> {
        let metadata = serde_json::to_string(&FileMetadata {
            name: &request.name,
            mime_type: &request.mime_type,
            parents: [&request.parent_id],
        })
        .map_err(|e| ProviderError::Decode(e.to_string()))?;
        let name = request.name.clone();
        let form = upload_form(metadata, request)?;
        let url = format!(
            "{}/upload/drive/v3/files",
            self.cfg.upload_base.trim_end_matches('/')
        );
        let resp = self
            .send(
                self.client
                    .post(url)
                    .query(&[
                        ("uploadType", "multipart"),
                        ("fields", "id,name,mimeType,webViewLink,parents"),
                    ])
                    .multipart(form),
            )
            .await
            .map_err(|e| {
                error!(name = %name, "upload failed: {}", e);
                e
            })?;
        Ok(resp.json().await?)
    }

    async fn fetch_content(&self, file_id: &str) -> Result<String, ProviderError> {
        let resp = self
            .send(
                self.client
                    .get(format!("{}/{}", self.files_url(), file_id))
                    .query(&[("alt", "media")]),
            )
            .await?;
        Ok(resp.text().await?)
    }

    async fn move_file(
        &self,
        file_id: &str,
        from_parent: &str,
        to_parent: &str,
    ) -> Result<(), ProviderError> {
        self.send(
            self.client
                .patch(format!("{}/{}", self.files_url(), file_id))
                .query(&[("addParents", to_parent), ("removeParents", from_parent)]),
        )
        .await?;
        Ok(())
    }
}
