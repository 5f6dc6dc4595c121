//! Result feed: every shard in the hopper with its extracted record, if any.

use crate::config::HopperSettings;
use crate::folders;
use crate::models::{ExtractedRecord, Shard, ShardStatus};
use crate::preview::{load_sidecar, PreviewKind, SidecarState};
use crate::scanner;
use providers::RemoteDirectory;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub shard: Shard,
    pub record: Option<ExtractedRecord>,
}

impl FeedEntry {
    pub fn line(&self) -> String {
        let detail = match &self.record {
            Some(record) => record.summary(),
            None => String::new(),
        };
        format!("[{}] {} {}", self.shard.source_type, self.shard.file_name, detail)
            .trim_end()
            .to_string()
    }
}

/// Empty when the hopper folder does not exist yet.
pub async fn build_feed(dir: &dyn RemoteDirectory, settings: &HopperSettings) -> Vec<FeedEntry> {
    let Some(hopper_id) = folders::locate_hopper(dir, settings).await else {
        return Vec::new();
    };
    let files = scanner::scan(dir, &hopper_id, &settings.hopper_name, settings.scan_depth).await;

    let mut entries = Vec::with_capacity(files.len());
    for file in &files {
        let shard = Shard::from_scanned(file, ShardStatus::Refined);
        let record = if PreviewKind::of(&file.node) == PreviewKind::Json {
            match load_sidecar(dir, &file.node.id).await {
                SidecarState::Loaded(record) => Some(record),
                SidecarState::Failed(_) => None,
            }
        } else {
            None
        };
        debug!(shard = %shard.id, has_record = record.is_some(), "feed entry");
        entries.push(FeedEntry { shard, record });
    }
    info!(entries = entries.len(), "feed built");
    entries
}
