use crate::auth::Credentials;
use crate::{
    JobRequest, JobTicket, ProviderError, RefineRequest, RefineResponse, RefineryBackend,
    ReportRequest, ReportResponse,
};
use bytes::Bytes;
use reqwest::{Client, Response};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct BackendConfig {
    pub api_base: String,
}

/// HTTP client for the refinery backend's job, refine and report endpoints.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    cfg: Arc<BackendConfig>,
    credentials: Credentials,
}

impl BackendClient {
    pub fn new(cfg: BackendConfig, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.api_base.trim_end_matches('/'), path)
    }
}

async fn check(resp: Response) -> Result<Response, ProviderError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status { status, body })
}

#[async_trait::async_trait]
impl RefineryBackend for BackendClient {
    async fn refine_file(&self, request: &RefineRequest) -> Result<RefineResponse, ProviderError> {
        let mut builder = self.client.post(self.url("/api/refine-drive-file")).json(request);
        if request.debug {
            builder = builder.query(&[("debug", "on")]);
        }
        let resp = check(builder.send().await?).await?;
        let text = resp.text().await?;
        // the endpoint may answer with an empty body
        if text.trim().is_empty() {
            return Ok(RefineResponse::default());
        }
        serde_json::from_str(&text).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn create_job(&self, request: &JobRequest) -> Result<JobTicket, ProviderError> {
        let mut builder = self.client.post(self.url("/api/jobs/create")).json(request);
        if let Some(token) = self.credentials.token() {
            builder = builder.bearer_auth(token);
        }
        let resp = check(builder.send().await?).await?;
        let ticket: JobTicket = resp.json().await?;
        info!(job_id = %ticket.job_id, file = %request.file_name, "created import job");
        Ok(ticket)
    }

    async fn upload_archive(&self, upload_url: &str, bytes: Bytes) -> Result<(), ProviderError> {
        let size = bytes.len();
        let resp = self
            .client
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        check(resp).await?;
        info!(size, "archive uploaded");
        Ok(())
    }

    async fn generate_report(
        &self,
        request: &ReportRequest,
    ) -> Result<ReportResponse, ProviderError> {
        let resp = check(
            self.client
                .post(self.url("/api/reports/generate"))
                .json(request)
                .send()
                .await?,
        )
        .await?;
        Ok(resp.json().await?)
    }
}
