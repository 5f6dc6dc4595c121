use chrono::{DateTime, Utc};
use providers::RemoteNode;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use storage::ShardRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: String,
    pub name: String,
}

impl Breadcrumb {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Navigation stack from the fixed root to the current folder. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreadcrumbTrail {
    crumbs: Vec<Breadcrumb>,
}

impl BreadcrumbTrail {
    pub fn new(root: Breadcrumb) -> Self {
        Self { crumbs: vec![root] }
    }

    pub fn root(&self) -> &Breadcrumb {
        &self.crumbs[0]
    }

    pub fn current(&self) -> &Breadcrumb {
        &self.crumbs[self.crumbs.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.crumbs.len()
    }

    pub fn is_at_root(&self) -> bool {
        self.crumbs.len() == 1
    }

    pub fn crumbs(&self) -> &[Breadcrumb] {
        &self.crumbs
    }

    pub fn push(&mut self, crumb: Breadcrumb) {
        self.crumbs.push(crumb);
    }

    /// Drops the last crumb; refuses to drop the root.
    pub fn pop(&mut self) -> Option<Breadcrumb> {
        if self.is_at_root() {
            return None;
        }
        self.crumbs.pop()
    }

    /// Keeps crumbs `0..=index`. Returns false if nothing changes or `index` is out of range.
    pub fn truncate_to(&mut self, index: usize) -> bool {
        if index + 1 >= self.crumbs.len() {
            return false;
        }
        self.crumbs.truncate(index + 1);
        true
    }

    /// `Hopper / Amazon / 2023`
    pub fn display_path(&self) -> String {
        self.crumbs
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// A file found by the scanner, tagged with its immediate parent folder's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedFile {
    pub node: RemoteNode,
    pub category: String,
    pub depth: usize,
}

impl ScannedFile {
    pub fn shard_id(&self) -> String {
        shard_id(&self.node.id)
    }
}

pub fn shard_id(file_id: &str) -> String {
    format!("drive_{file_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    Unprocessed,
    Processing,
    Refined,
    Error,
}

impl ShardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardStatus::Unprocessed => "unprocessed",
            ShardStatus::Processing => "processing",
            ShardStatus::Refined => "refined",
            ShardStatus::Error => "error",
        }
    }
}

impl From<&str> for ShardStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => ShardStatus::Processing,
            "refined" | "linked" => ShardStatus::Refined,
            "error" => ShardStatus::Error,
            _ => ShardStatus::Unprocessed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shard {
    pub id: String,
    pub file_name: String,
    pub source_type: String,
    pub status: ShardStatus,
    pub drive_file_id: Option<String>,
    pub web_view_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Shard {
    pub fn from_scanned(file: &ScannedFile, status: ShardStatus) -> Self {
        Self {
            id: file.shard_id(),
            file_name: file.node.name.clone(),
            source_type: source_type_or_upload(&file.category),
            status,
            drive_file_id: Some(file.node.id.clone()),
            web_view_link: file.node.web_view_link.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn to_record(&self) -> ShardRecord {
        ShardRecord {
            id: self.id.clone(),
            file_name: self.file_name.clone(),
            source_type: self.source_type.clone(),
            status: self.status.as_str().to_string(),
            drive_file_id: self.drive_file_id.clone(),
            web_view_link: self.web_view_link.clone(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

impl From<ShardRecord> for Shard {
    fn from(rec: ShardRecord) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&rec.created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Self {
            status: ShardStatus::from(rec.status.as_str()),
            id: rec.id,
            file_name: rec.file_name,
            source_type: rec.source_type,
            drive_file_id: rec.drive_file_id,
            web_view_link: rec.web_view_link,
            created_at,
        }
    }
}

pub fn source_type_or_upload(category: &str) -> String {
    if category.trim().is_empty() {
        "Upload".to_string()
    } else {
        category.to_string()
    }
}

/// Structured fields the backend extracts from one source file.
///
/// Sidecars are model output, so every field is read on its own: a value of the
/// wrong shape becomes `None` instead of rejecting the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub item_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub merchant: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub confidence: Option<String>,
}

/// Strings as-is, numbers and booleans in their JSON form, anything else `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Numbers, or strings such as `"12.50"` / `"1,299.00"`; anything else `None`.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    })
}

impl ExtractedRecord {
    /// `USD 12.5`, or whichever half is present.
    pub fn amount_label(&self) -> Option<String> {
        match (&self.currency, self.total_amount) {
            (Some(c), Some(a)) => Some(format!("{c} {a}")),
            (None, Some(a)) => Some(a.to_string()),
            (Some(c), None) => Some(c.clone()),
            (None, None) => None,
        }
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(name) = &self.item_name {
            parts.push(name.clone());
        }
        if let Some(merchant) = &self.merchant {
            parts.push(format!("@ {merchant}"));
        }
        if let Some(date) = &self.date {
            parts.push(date.clone());
        }
        if let Some(amount) = self.amount_label() {
            parts.push(amount);
        }
        if let Some(conf) = &self.confidence {
            parts.push(format!("[{conf}]"));
        }
        if parts.is_empty() {
            "(no extracted fields)".to_string()
        } else {
            parts.join(" ")
        }
    }
}
