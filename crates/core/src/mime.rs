//! Mime type detection for local files headed to the hopper.

use std::path::Path;

pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Content sniffing first, then the file extension.
pub fn sniff_mime(path: &Path, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "zip" => "application/zip",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "txt" => "text/plain",
        _ => FALLBACK_MIME,
    }
    .to_string()
}
