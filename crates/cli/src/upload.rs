//! Local files and directories pushed into a hopper folder.

use anyhow::Context;
use bytes::Bytes;
use globset::{Glob, GlobSet, GlobSetBuilder};
use hopper_core::mime::sniff_mime;
use providers::{RemoteDirectory, RemoteNode, UploadRequest};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<RemoteNode>,
    pub failed: Vec<(PathBuf, String)>,
}

pub fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat).with_context(|| format!("bad exclude pattern {pat}"))?);
    }
    Ok(builder.build()?)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Files under `root` (or `root` itself), skipping hidden entries and exclude matches.
/// Patterns are matched against the path relative to `root`.
pub fn collect_uploads(root: &Path, excludes: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    anyhow::ensure!(root.is_dir(), "{} does not exist", root.display());
    let exclude_set = build_globset(excludes)?;
    let relative = |p: &Path| p.strip_prefix(root).map(Path::to_path_buf).unwrap_or_default();

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || (!is_hidden(e.path()) && !exclude_set.is_match(relative(e.path())))
        })
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

pub async fn read_upload(path: &Path, parent_id: &str) -> anyhow::Result<UploadRequest> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?
        .to_string();
    Ok(UploadRequest {
        mime_type: sniff_mime(path, &bytes),
        name,
        parent_id: parent_id.to_string(),
        bytes: Bytes::from(bytes),
    })
}

/// Uploads each collected file; one failure does not stop the rest.
pub async fn upload_path(
    dir: &dyn RemoteDirectory,
    root: &Path,
    parent_id: &str,
    excludes: &[String],
) -> anyhow::Result<UploadReport> {
    let files = collect_uploads(root, excludes)?;
    let mut report = UploadReport::default();
    for path in files {
        let result = match read_upload(&path, parent_id).await {
            Ok(request) => dir.upload_file(request).await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(node) => {
                info!(file = %node.name, id = %node.id, "uploaded");
                report.uploaded.push(node);
            }
            Err(e) => {
                error!(path = %path.display(), "upload failed: {:#}", e);
                report.failed.push((path, format!("{e:#}")));
            }
        }
    }
    Ok(report)
}
