//! Mail-archive import: a linear three-step flow ending in a live processing view.

use bytes::Bytes;
use providers::{JobFeed, JobRecord, JobRequest, JobStage, JobSubscription, ProviderError, RefineryBackend};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

pub const SEARCH_QUERY: &str = r#"in:anywhere (receipt OR order OR "sales invoice") OR label:(^cob_sm_order OR ^cob_sm_cl_jc_order OR ^cob_sm_cl_llm_order)"#;
pub const TAKEOUT_URL: &str = "https://takeout.google.com/settings/takeout";
pub const EXPORT_LABEL: &str = "Kintsu_Export";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WizardStep {
    CopyQuery,
    ExternalExport,
    Upload,
    Processing,
}

impl WizardStep {
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::CopyQuery => 1,
            WizardStep::ExternalExport => 2,
            WizardStep::Upload => 3,
            WizardStep::Processing => 4,
        }
    }

    pub fn instructions(&self) -> String {
        match self {
            WizardStep::CopyQuery => format!(
                "1. Filter your email. Paste this query into Gmail, and label the results {EXPORT_LABEL}:\n   {SEARCH_QUERY}"
            ),
            WizardStep::ExternalExport => format!(
                "2. Create an export containing only the Mail category (and your label if possible):\n   {TAKEOUT_URL}"
            ),
            WizardStep::Upload => "3. Upload the downloaded .zip archive.".to_string(),
            WizardStep::Processing => "Processing your archive...".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("the wizard is not on the upload step")]
    NotReadyForUpload,
    #[error("job creation failed: {0}")]
    CreateJob(#[source] ProviderError),
    #[error("archive upload failed: {0}")]
    Upload(#[source] ProviderError),
    #[error("could not follow job progress: {0}")]
    Subscribe(#[source] ProviderError),
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub user_id: String,
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug)]
pub struct ImportWizard {
    step: WizardStep,
    job_id: Option<String>,
}

impl Default for ImportWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::CopyQuery,
            job_id: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Moves to the next instructional step. Upload and Processing are left only by `start_import`/`restart`.
    pub fn advance(&mut self) -> WizardStep {
        self.step = match self.step {
            WizardStep::CopyQuery => WizardStep::ExternalExport,
            WizardStep::ExternalExport => WizardStep::Upload,
            other => other,
        };
        self.step
    }

    pub fn restart(&mut self) {
        self.step = WizardStep::CopyQuery;
        self.job_id = None;
    }

    /// Creates the job, uploads the archive, then subscribes to its progress document.
    pub async fn start_import(
        &mut self,
        backend: &dyn RefineryBackend,
        feed: &dyn JobFeed,
        request: ImportRequest,
        auth_token: &str,
    ) -> Result<JobSubscription, WizardError> {
        if self.step != WizardStep::Upload {
            return Err(WizardError::NotReadyForUpload);
        }
        let ticket = backend
            .create_job(&JobRequest {
                user_id: request.user_id.clone(),
                file_name: request.file_name.clone(),
                auth_token: auth_token.to_string(),
            })
            .await
            .map_err(|e| {
                error!("job creation failed: {}", e);
                WizardError::CreateJob(e)
            })?;
        self.job_id = Some(ticket.job_id.clone());

        backend
            .upload_archive(&ticket.upload_url, request.bytes)
            .await
            .map_err(|e| {
                error!(job_id = %ticket.job_id, "archive upload failed: {}", e);
                WizardError::Upload(e)
            })?;
        self.step = WizardStep::Processing;
        info!(job_id = %ticket.job_id, "archive handed to backend");

        feed.subscribe(&ticket.job_id)
            .await
            .map_err(WizardError::Subscribe)
    }
}

/// What the processing screen shows for one job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingView {
    pub progress: u8,
    pub status: String,
    /// Coarse stage 1..=4.
    pub stage: u8,
}

impl ProcessingView {
    pub fn is_complete(&self) -> bool {
        self.progress == 100
    }

    pub fn line(&self) -> String {
        let mut line = format!("[stage {}/4] {} ({}%)", self.stage, self.status, self.progress);
        if self.is_complete() {
            line.push_str(" - Complete! Your emails are in the Hopper.");
        }
        line
    }
}

impl From<&JobRecord> for ProcessingView {
    fn from(record: &JobRecord) -> Self {
        let status = if record.status.is_empty() {
            "processing".to_string()
        } else {
            record.status.clone()
        };
        Self {
            progress: record.progress,
            stage: stage_for(record),
            status,
        }
    }
}

/// Prefers the backend's explicit stage; falls back to matching words in the status text.
pub fn stage_for(record: &JobRecord) -> u8 {
    if record.progress == 100 {
        return 4;
    }
    if let Some(stage) = record.stage {
        return match stage {
            JobStage::Queued => 1,
            JobStage::Uploading => 2,
            JobStage::Analyzing => 3,
            JobStage::Complete => 4,
        };
    }
    let status = record.status.to_lowercase();
    if status.contains("analyzing") {
        3
    } else if status.contains("uploading") {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{ManualFeed, RecordingBackend};
    use std::sync::atomic::Ordering;

    fn at_upload() -> ImportWizard {
        let mut wizard = ImportWizard::new();
        wizard.advance();
        wizard.advance();
        assert_eq!(wizard.step(), WizardStep::Upload);
        wizard
    }

    fn archive() -> ImportRequest {
        ImportRequest {
            user_id: "u1".into(),
            file_name: "takeout.zip".into(),
            bytes: Bytes::from_static(b"PK\x03\x04"),
        }
    }

    #[test]
    fn steps_are_linear() {
        let mut wizard = ImportWizard::new();
        assert_eq!(wizard.step().number(), 1);
        assert_eq!(wizard.advance().number(), 2);
        assert_eq!(wizard.advance().number(), 3);
        assert_eq!(wizard.advance().number(), 3);
        wizard.restart();
        assert_eq!(wizard.step(), WizardStep::CopyQuery);
        assert!(wizard.step().instructions().contains(SEARCH_QUERY));
    }

    #[test]
    fn complete_exactly_at_one_hundred() {
        let done = ProcessingView::from(&JobRecord::with_progress(100.0, "done"));
        assert!(done.is_complete());
        assert_eq!(done.stage, 4);

        let almost = ProcessingView::from(&JobRecord::with_progress(99.0, "complete"));
        assert!(!almost.is_complete());
    }

    #[test]
    fn stage_prefers_explicit_field_over_text() {
        let mut record = JobRecord::with_progress(10.0, "Uploading chunks");
        assert_eq!(stage_for(&record), 2);
        record.status = "Analyzing 40 emails".into();
        assert_eq!(stage_for(&record), 3);
        record.stage = Some(JobStage::Uploading);
        assert_eq!(stage_for(&record), 2);
        assert_eq!(ProcessingView::from(&JobRecord::default()).status, "processing");
    }

    #[tokio::test]
    async fn import_creates_job_uploads_and_follows_progress() {
        let backend = RecordingBackend::default();
        let feed = ManualFeed::default();
        let mut wizard = at_upload();

        let mut sub = wizard
            .start_import(&backend, &feed, archive(), "tok")
            .await
            .unwrap();
        assert_eq!(wizard.step(), WizardStep::Processing);
        assert_eq!(wizard.job_id(), Some("job-1"));
        assert_eq!(backend.jobs.lock().unwrap()[0].auth_token, "tok");
        assert_eq!(backend.uploads.lock().unwrap()[0].1, 4);

        feed.sender
            .send(JobRecord::with_progress(100.0, "done"))
            .unwrap();
        let update = sub.changed().await.unwrap();
        assert!(ProcessingView::from(&update).is_complete());
    }

    #[tokio::test]
    async fn failed_upload_keeps_wizard_on_upload_step() {
        let backend = RecordingBackend::default();
        backend.fail_upload.store(true, Ordering::Relaxed);
        let feed = ManualFeed::default();
        let mut wizard = at_upload();
        let err = wizard
            .start_import(&backend, &feed, archive(), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::Upload(_)));
        assert_eq!(wizard.step(), WizardStep::Upload);
    }

    #[tokio::test]
    async fn import_before_upload_step_is_refused() {
        let mut wizard = ImportWizard::new();
        let err = wizard
            .start_import(&RecordingBackend::default(), &ManualFeed::default(), archive(), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::NotReadyForUpload));
    }
}
