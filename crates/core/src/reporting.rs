//! Claim report generation for the hopper folder.

use crate::folders;
use crate::session::Session;
use anyhow::{bail, Context};
use providers::{ReportRequest, ReportResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFormats {
    pub pdf: bool,
    pub csv: bool,
    pub zip: bool,
}

impl Default for ReportFormats {
    fn default() -> Self {
        Self {
            pdf: true,
            csv: true,
            zip: false,
        }
    }
}

impl ReportFormats {
    /// Parses `pdf,csv`. Unknown names are rejected.
    pub fn parse(list: &str) -> anyhow::Result<Self> {
        let mut formats = Self {
            pdf: false,
            csv: false,
            zip: false,
        };
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name.to_lowercase().as_str() {
                "pdf" => formats.pdf = true,
                "csv" => formats.csv = true,
                "zip" => formats.zip = true,
                other => bail!("unknown report format: {other}"),
            }
        }
        Ok(formats)
    }

    pub fn selected(&self) -> Vec<String> {
        [("pdf", self.pdf), ("csv", self.csv), ("zip", self.zip)]
            .into_iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Asks the backend for a report over the hopper folder.
///
/// A 2xx answer is not enough: the body's `status` must be `success`, otherwise this errors.
pub async fn generate(session: &Session, formats: ReportFormats) -> anyhow::Result<ReportResponse> {
    let selected = formats.selected();
    if selected.is_empty() {
        bail!("no report format selected");
    }
    let folder_id = folders::locate_hopper(session.directory(), &session.config.hopper)
        .await
        .context("hopper folder not found; run `hopper init` first")?;
    let request = ReportRequest {
        folder_id,
        report_name: session.config.report.name.clone(),
        formats: selected,
        access_token: session.access_token()?,
    };
    let response = session
        .backend()
        .generate_report(&request)
        .await
        .context("report request failed")?;
    if response.status != "success" {
        bail!("report generation failed: status {:?}", response.status);
    }
    info!(report = %request.report_name, "report generated");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{session_with, ManualFeed, RecordingBackend};
    use providers::memory::MemoryDirectory;
    use std::sync::Arc;

    #[test]
    fn formats_keep_fixed_order() {
        assert_eq!(ReportFormats::default().selected(), vec!["pdf", "csv"]);
        let parsed = ReportFormats::parse("zip, PDF").unwrap();
        assert_eq!(parsed.selected(), vec!["pdf", "zip"]);
        assert!(ReportFormats::parse("docx").is_err());
    }

    #[tokio::test]
    async fn report_targets_hopper_folder() {
        let dir = Arc::new(MemoryDirectory::new());
        let root = dir.add_folder("Kintsu", "root");
        let hopper = dir.add_folder("Hopper", &root);
        let backend = Arc::new(RecordingBackend::default());
        let session = session_with(dir, backend.clone(), Arc::new(ManualFeed::default()));

        generate(&session, ReportFormats::default()).await.unwrap();
        let reports = backend.reports.lock().unwrap();
        assert_eq!(reports[0].folder_id, hopper);
        assert_eq!(reports[0].report_name, "Kintsu_Claim_Report");
        assert_eq!(reports[0].access_token, "tok");
    }

    #[tokio::test]
    async fn report_without_hopper_fails() {
        let session = session_with(
            Arc::new(MemoryDirectory::new()),
            Arc::new(RecordingBackend::default()),
            Arc::new(ManualFeed::default()),
        );
        assert!(generate(&session, ReportFormats::default()).await.is_err());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let dir = Arc::new(MemoryDirectory::new());
        let root = dir.add_folder("Kintsu", "root");
        dir.add_folder("Hopper", &root);
        let backend = Arc::new(RecordingBackend::default());
        *backend.report_status.lock().unwrap() = "partial".into();
        let session = session_with(dir, backend, Arc::new(ManualFeed::default()));
        let err = generate(&session, ReportFormats::default()).await.unwrap_err();
        assert!(err.to_string().contains("partial"));
    }
}
