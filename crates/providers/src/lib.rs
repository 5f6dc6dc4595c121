//! Provider abstractions for the remote directory, the refinery backend and the job feed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod auth;
pub mod backend;
pub mod drive;
pub mod firestore;
pub mod memory;

/// MIME type the storage provider uses to mark folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("api error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::RequestFailed(err.to_string())
        }
    }
}

/// A file or folder in the provider's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl RemoteNode {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub mime_type: String,
    pub parent_id: String,
    pub bytes: Bytes,
}

/// Client side of the storage provider's file API.
#[async_trait::async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// First non-trashed child of `parent_id` named exactly `name`.
    async fn find_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: Option<&str>,
    ) -> Result<Option<String>, ProviderError>;

    /// Creates unconditionally; callers look up first.
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, ProviderError>;

    /// Single page of children, folders first then by name.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteNode>, ProviderError>;

    async fn upload_file(&self, request: UploadRequest) -> Result<RemoteNode, ProviderError>;

    async fn fetch_content(&self, file_id: &str) -> Result<String, ProviderError>;

    async fn move_file(
        &self,
        file_id: &str,
        from_parent: &str,
        to_parent: &str,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineRequest {
    pub file_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub access_token: String,
    pub source_type: String,
    #[serde(skip)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefineResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub user_id: String,
    pub file_name: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_id: String,
    pub upload_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub folder_id: String,
    pub report_name: String,
    pub formats: Vec<String>,
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub files: serde_json::Value,
}

/// Backend endpoints that queue analysis work.
#[async_trait::async_trait]
pub trait RefineryBackend: Send + Sync {
    async fn refine_file(&self, request: &RefineRequest) -> Result<RefineResponse, ProviderError>;

    async fn create_job(&self, request: &JobRequest) -> Result<JobTicket, ProviderError>;

    /// Binary PUT of an archive to the target returned by `create_job`.
    async fn upload_archive(&self, upload_url: &str, bytes: Bytes) -> Result<(), ProviderError>;

    async fn generate_report(
        &self,
        request: &ReportRequest,
    ) -> Result<ReportResponse, ProviderError>;
}

/// Pipeline stage reported explicitly by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Uploading,
    Analyzing,
    Complete,
}

impl JobStage {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "queued" | "pending" | "pending_upload" => Some(JobStage::Queued),
            "uploading" => Some(JobStage::Uploading),
            "analyzing" => Some(JobStage::Analyzing),
            "complete" | "completed" | "done" => Some(JobStage::Complete),
            _ => None,
        }
    }
}

/// Externally owned progress document for an import job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub progress: u8,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stage: Option<JobStage>,
}

impl JobRecord {
    pub fn with_progress(progress: f64, status: impl Into<String>) -> Self {
        Self {
            progress: clamp_progress(progress),
            status: status.into(),
            message: None,
            stage: None,
        }
    }
}

pub fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Live view of a job document. Dropping it ends the subscription.
pub struct JobSubscription {
    pub job_id: String,
    receiver: tokio::sync::watch::Receiver<JobRecord>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl JobSubscription {
    pub fn new(
        job_id: impl Into<String>,
        receiver: tokio::sync::watch::Receiver<JobRecord>,
        task: Option<tokio::task::JoinHandle<()>>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            receiver,
            task,
        }
    }

    pub fn latest(&self) -> JobRecord {
        self.receiver.borrow().clone()
    }

    /// Waits for the next update. `None` once the feed has stopped.
    pub async fn changed(&mut self) -> Option<JobRecord> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

impl std::fmt::Debug for JobSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSubscription")
            .field("job_id", &self.job_id)
            .field("latest", &*self.receiver.borrow())
            .finish()
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
pub trait JobFeed: Send + Sync {
    async fn subscribe(&self, job_id: &str) -> Result<JobSubscription, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped_and_rounded() {
        assert_eq!(clamp_progress(-3.0), 0);
        assert_eq!(clamp_progress(42.6), 43);
        assert_eq!(clamp_progress(250.0), 100);
        assert_eq!(clamp_progress(f64::NAN), 0);
    }

    #[test]
    fn folder_nodes_are_detected_by_mime() {
        let node: RemoteNode = serde_json::from_value(serde_json::json!({
            "id": "f1",
            "name": "Amazon",
            "mimeType": FOLDER_MIME,
        }))
        .unwrap();
        assert!(node.is_folder());
        assert!(node.parents.is_empty());
    }

    #[test]
    fn refine_request_uses_backend_field_names() {
        let req = RefineRequest {
            file_id: "abc".into(),
            file_name: "export.zip".into(),
            access_token: "tok".into(),
            source_type: "Gmail".into(),
            debug: true,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["fileName"], "export.zip");
        assert_eq!(value["source_type"], "Gmail");
        assert!(value.get("debug").is_none());
    }

    #[test]
    fn subscription_debug_names_the_job() {
        let (_tx, rx) = tokio::sync::watch::channel(JobRecord::with_progress(40.0, "Analyzing"));
        let sub = JobSubscription::new("job-7", rx, None);
        let text = format!("{sub:?}");
        assert!(text.contains("job-7"));
        assert!(text.contains("progress: 40"));
    }
}
