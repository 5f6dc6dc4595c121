//! Job progress feed backed by the document store's REST API.

use crate::auth::Credentials;
use crate::{clamp_progress, JobFeed, JobRecord, JobStage, JobSubscription, ProviderError};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub const DEFAULT_FIRESTORE_BASE: &str = "https://firestore.googleapis.com";

#[derive(Clone)]
pub struct FirestoreConfig {
    pub base_url: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub poll_interval: Duration,
}

#[derive(Clone)]
pub struct FirestoreJobFeed {
    client: Client,
    cfg: Arc<FirestoreConfig>,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: HashMap<String, FieldValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValue {
    integer_value: Option<String>,
    double_value: Option<f64>,
    string_value: Option<String>,
}

impl FieldValue {
    fn as_f64(&self) -> Option<f64> {
        self.double_value
            .or_else(|| self.integer_value.as_deref().and_then(|v| v.parse().ok()))
    }
}

/// Decodes a typed document body into a job record. Missing fields fall back to defaults.
pub fn decode_job_document(body: &str) -> Result<JobRecord, ProviderError> {
    let doc: Document =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    let text = |key: &str| doc.fields.get(key).and_then(|f| f.string_value.clone());
    Ok(JobRecord {
        progress: doc
            .fields
            .get("progress")
            .and_then(FieldValue::as_f64)
            .map(clamp_progress)
            .unwrap_or(0),
        status: text("status").unwrap_or_default(),
        message: text("message"),
        stage: text("stage").as_deref().and_then(JobStage::parse),
    })
}

impl FirestoreJobFeed {
    pub fn new(cfg: FirestoreConfig, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
            credentials,
        }
    }

    fn document_url(&self, job_id: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/jobs/{}",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.project_id,
            job_id
        )
    }

    async fn fetch(&self, job_id: &str) -> Result<JobRecord, ProviderError> {
        let mut builder = self.client.get(self.document_url(job_id));
        if let Some(key) = &self.cfg.api_key {
            builder = builder.query(&[("key", key)]);
        }
        if let Some(token) = self.credentials.token() {
            builder = builder.bearer_auth(token);
        }
        let resp = builder.send().await?;
        if resp.status().as_u16() == 404 {
            return Err(ProviderError::NotFound(job_id.to_string()));
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }
        decode_job_document(&resp.text().await?)
    }
}

#[async_trait::async_trait]
impl JobFeed for FirestoreJobFeed {
    async fn subscribe(&self, job_id: &str) -> Result<JobSubscription, ProviderError> {
        let (tx, rx) = watch::channel(JobRecord::default());
        let feed = self.clone();
        let id = job_id.to_string();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(feed.cfg.poll_interval);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                match feed.fetch(&id).await {
                    Ok(record) => {
                        let done = record.progress >= 100;
                        tx.send_if_modified(|current| {
                            if *current == record {
                                false
                            } else {
                                *current = record;
                                true
                            }
                        });
                        if done {
                            debug!(job_id = %id, "job complete, stopping feed");
                            break;
                        }
                    }
                    // the document may not exist until the backend writes it
                    Err(ProviderError::NotFound(_)) => debug!(job_id = %id, "job document not found yet"),
                    Err(e) => warn!(job_id = %id, "job feed poll failed: {}", e),
                }
            }
        });
        Ok(JobSubscription::new(job_id, rx, Some(task)))
    }
}
