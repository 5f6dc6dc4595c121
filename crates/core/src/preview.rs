//! Previewers for files fetched from the hopper: JSON trees, HTML, extracted sidecars.

use crate::models::ExtractedRecord;
use providers::{RemoteDirectory, RemoteNode};
use serde_json::Value;
use tracing::error;

pub const JSON_LOAD_ERROR: &str = "Invalid JSON or failed to load.";
pub const HTML_LOAD_FALLBACK: &str =
    "<div style='color:red; padding: 20px;'>Failed to load content.</div>";

/// Top levels shown expanded in a JSON tree.
const EXPANDED_LEVELS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    Html,
    Json,
    Unsupported,
}

impl PreviewKind {
    pub fn of(node: &RemoteNode) -> Self {
        if node.mime_type == "text/html" || node.name.ends_with(".html") {
            PreviewKind::Html
        } else if node.mime_type == "application/json" || node.name.ends_with(".json") {
            PreviewKind::Json
        } else {
            PreviewKind::Unsupported
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Json(Value),
    Html(String),
    External { web_view_link: Option<String> },
    Error(String),
}

impl Preview {
    pub fn render(&self) -> String {
        match self {
            Preview::Json(value) => render_json_tree(value),
            Preview::Html(html) => html.clone(),
            Preview::External {
                web_view_link: Some(link),
            } => format!("No inline preview. Open in Drive: {link}"),
            Preview::External {
                web_view_link: None,
            } => "No inline preview available.".to_string(),
            Preview::Error(msg) => format!("error: {msg}"),
        }
    }
}

pub async fn load_preview(dir: &dyn RemoteDirectory, node: &RemoteNode) -> Preview {
    match PreviewKind::of(node) {
        PreviewKind::Json => match dir.fetch_content(&node.id).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => Preview::Json(value),
                Err(e) => {
                    error!(file = %node.name, "failed to parse JSON content: {}", e);
                    Preview::Error(JSON_LOAD_ERROR.to_string())
                }
            },
            Err(e) => {
                error!(file = %node.name, "failed to load JSON content: {}", e);
                Preview::Error(JSON_LOAD_ERROR.to_string())
            }
        },
        PreviewKind::Html => match dir.fetch_content(&node.id).await {
            Ok(text) => Preview::Html(text),
            Err(e) => {
                error!(file = %node.name, "failed to load HTML content: {}", e);
                Preview::Html(HTML_LOAD_FALLBACK.to_string())
            }
        },
        PreviewKind::Unsupported => Preview::External {
            web_view_link: node.web_view_link.clone(),
        },
    }
}

fn header(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("Array({})", items.len()),
        Value::Object(map) => format!("Object {{{}}}", map.len()),
        scalar => scalar.to_string(),
    }
}

fn render_node(out: &mut String, name: Option<&str>, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = name.map(|n| format!("{n}: ")).unwrap_or_default();
    let is_container = matches!(value, Value::Array(_) | Value::Object(_));
    let is_empty = match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => true,
    };
    let expanded = is_container && !is_empty && depth < EXPANDED_LEVELS;
    let marker = match (is_container, is_empty, expanded) {
        (false, _, _) | (true, true, _) => "",
        (true, false, true) => "v ",
        (true, false, false) => "> ",
    };
    out.push_str(&format!("{indent}{marker}{label}{}\n", header(value)));
    if !expanded {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                render_node(out, None, item, depth + 1);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                render_node(out, Some(key), item, depth + 1);
            }
        }
        _ => {}
    }
}

/// Indented tree; containers below the second level are collapsed to their header.
pub fn render_json_tree(value: &Value) -> String {
    let mut out = String::new();
    render_node(&mut out, None, value, 0);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum SidecarState {
    Loaded(ExtractedRecord),
    Failed(String),
}

pub fn parse_sidecar(text: &str) -> SidecarState {
    match serde_json::from_str::<ExtractedRecord>(text) {
        Ok(record) => SidecarState::Loaded(record),
        Err(e) => SidecarState::Failed(format!("malformed sidecar: {e}")),
    }
}

/// Fetches and parses a sidecar. Never fails; problems come back as `Failed`.
pub async fn load_sidecar(dir: &dyn RemoteDirectory, file_id: &str) -> SidecarState {
    match dir.fetch_content(file_id).await {
        Ok(text) => {
            let state = parse_sidecar(&text);
            if let SidecarState::Failed(reason) = &state {
                error!(file_id, "error loading sidecar: {}", reason);
            }
            state
        }
        Err(e) => {
            error!(file_id, "error loading sidecar: {}", e);
            SidecarState::Failed(e.to_string())
        }
    }
}
