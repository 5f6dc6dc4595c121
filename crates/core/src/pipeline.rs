//! Scan the hopper and hand new shards to the refinery backend.

use crate::folders;
use crate::models::{Shard, ShardStatus};
use crate::scanner;
use crate::session::Session;
use anyhow::Context;
use providers::RefineRequest;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Ask the backend for verbose processing.
    pub debug: bool,
    /// List what would be submitted without calling the backend.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub discovered: usize,
    pub submitted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub submitted_names: Vec<String>,
}

impl ScanSummary {
    pub fn found_nothing_new(&self) -> bool {
        self.submitted == 0 && self.failed == 0
    }

    pub fn status_message(&self) -> &'static str {
        if self.found_nothing_new() {
            "No new files found."
        } else {
            "Scan complete."
        }
    }
}

pub async fn run_scan(
    session: &Session,
    pool: &SqlitePool,
    options: &ScanOptions,
) -> anyhow::Result<ScanSummary> {
    let settings = &session.config.hopper;
    let mut summary = ScanSummary::default();

    let Some(hopper_id) = folders::locate_hopper(session.directory(), settings).await else {
        return Ok(summary);
    };
    info!(hopper_id = %hopper_id, "starting hopper scan");

    let files = scanner::scan(
        session.directory(),
        &hopper_id,
        &settings.hopper_name,
        settings.scan_depth,
    )
    .await;
    summary.discovered = files.len();

    let known = storage::known_shard_ids(pool)
        .await
        .context("loading known shards")?;
    let selected = scanner::select_for_refinement(&files, &known);
    summary.skipped = files.len() - selected.len();

    if options.dry_run {
        summary.submitted_names = selected.iter().map(|f| f.node.name.clone()).collect();
        return Ok(summary);
    }

    let token = session.access_token()?;
    for file in selected {
        let mut shard = Shard::from_scanned(file, ShardStatus::Processing);
        info!(file = %file.node.name, debug = options.debug, "sending for refinement");
        let request = RefineRequest {
            file_id: file.node.id.clone(),
            file_name: file.node.name.clone(),
            access_token: token.clone(),
            source_type: shard.source_type.clone(),
            debug: options.debug,
        };
        match session.backend().refine_file(&request).await {
            Ok(resp) => {
                summary.submitted += 1;
                summary.submitted_names.push(file.node.name.clone());
                if !resp.status.is_empty() {
                    info!(file = %file.node.name, status = %resp.status, "refinery answered");
                }
            }
            Err(e) => {
                error!(file = %file.node.name, "refinement request failed: {}", e);
                summary.failed += 1;
                shard.status = ShardStatus::Error;
            }
        }
        storage::upsert_shard(pool, &shard.to_record())
            .await
            .with_context(|| format!("recording shard {}", shard.id))?;
    }

    info!(
        discovered = summary.discovered,
        submitted = summary.submitted,
        failed = summary.failed,
        "{}",
        summary.status_message()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{session_with, ManualFeed, RecordingBackend};
    use providers::memory::MemoryDirectory;
    use std::sync::Arc;

    async fn ledger() -> SqlitePool {
        let pool = storage::connect("sqlite::memory:").await.unwrap();
        storage::migrate(&pool).await.unwrap();
        pool
    }

    fn seeded() -> Arc<MemoryDirectory> {
        let dir = Arc::new(MemoryDirectory::new());
        let root = dir.add_folder("Kintsu", "root");
        let hopper = dir.add_folder("Hopper", &root);
        let gmail = dir.add_folder("Gmail", &hopper);
        dir.add_file("export.zip", "application/zip", &gmail, "");
        dir.add_file("export.json", "application/json", &gmail, "{}");
        dir
    }

    #[tokio::test]
    async fn second_scan_only_resubmits_archives() {
        let backend = Arc::new(RecordingBackend::default());
        let session = session_with(seeded(), backend.clone(), Arc::new(ManualFeed::default()));
        let pool = ledger().await;

        let first = run_scan(&session, &pool, &ScanOptions::default()).await.unwrap();
        assert_eq!(first.submitted, 2);
        let second = run_scan(&session, &pool, &ScanOptions::default()).await.unwrap();
        assert_eq!(second.submitted_names, vec!["export.zip".to_string()]);
        assert_eq!(second.skipped, 1);

        let refined = backend.refined.lock().unwrap();
        assert_eq!(refined.len(), 3);
        assert!(refined.iter().all(|r| r.source_type == "Gmail" && r.access_token == "tok"));
    }

    #[tokio::test]
    async fn failures_are_counted_and_recorded() {
        let backend = Arc::new(RecordingBackend::default());
        backend.fail_names.lock().unwrap().push("export.json".into());
        let session = session_with(seeded(), backend.clone(), Arc::new(ManualFeed::default()));
        let pool = ledger().await;

        let summary = run_scan(&session, &pool, &ScanOptions::default()).await.unwrap();
        assert_eq!((summary.submitted, summary.failed), (1, 1));
        let errored = storage::list_shards(&pool, Some("error")).await.unwrap();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].file_name, "export.json");
    }

    #[tokio::test]
    async fn failed_submission_is_retried_on_next_scan() {
        let backend = Arc::new(RecordingBackend::default());
        backend.fail_names.lock().unwrap().push("export.json".into());
        let session = session_with(seeded(), backend.clone(), Arc::new(ManualFeed::default()));
        let pool = ledger().await;

        let first = run_scan(&session, &pool, &ScanOptions::default()).await.unwrap();
        assert_eq!(first.failed, 1);

        backend.fail_names.lock().unwrap().clear();
        let second = run_scan(&session, &pool, &ScanOptions::default()).await.unwrap();
        assert_eq!((second.submitted, second.failed, second.skipped), (2, 0, 0));
        assert!(second.submitted_names.contains(&"export.json".to_string()));
        assert!(storage::list_shards(&pool, Some("error")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let backend = Arc::new(RecordingBackend::default());
        let session = session_with(seeded(), backend.clone(), Arc::new(ManualFeed::default()));
        let pool = ledger().await;
        let summary = run_scan(
            &session,
            &pool,
            &ScanOptions {
                dry_run: true,
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.submitted_names.len(), 2);
        assert!(backend.refined.lock().unwrap().is_empty());
        assert!(storage::known_shard_ids(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_hopper_scans_nothing() {
        let session = session_with(
            Arc::new(MemoryDirectory::new()),
            Arc::new(RecordingBackend::default()),
            Arc::new(ManualFeed::default()),
        );
        let pool = ledger().await;
        let summary = run_scan(&session, &pool, &ScanOptions::default()).await.unwrap();
        assert_eq!(summary, ScanSummary::default());
        assert!(summary.found_nothing_new());
    }
}
