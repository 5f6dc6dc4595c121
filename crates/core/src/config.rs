use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub drive: DriveSettings,
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub hopper: HopperSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSettings {
    #[serde(default = "default_google_base")]
    pub api_base: String,
    #[serde(default = "default_google_base")]
    pub upload_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            api_base: default_google_base(),
            upload_base: default_google_base(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Also ask for read-only mail access.
    #[serde(default)]
    pub request_gmail: bool,
    #[serde(default = "default_oauth_base")]
    pub oauth_base: String,
    #[serde(default = "default_token_timeout")]
    pub token_timeout_secs: u64,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            client_id: None,
            access_token: None,
            request_gmail: false,
            oauth_base: default_oauth_base(),
            token_timeout_secs: default_token_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_backend_base")]
    pub api_base: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_base: default_backend_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    #[serde(default = "default_firestore_base")]
    pub firestore_base: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            firestore_base: default_firestore_base(),
            project_id: String::new(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopperSettings {
    #[serde(default = "default_root_name")]
    pub root_name: String,
    #[serde(default = "default_hopper_name")]
    pub hopper_name: String,
    #[serde(default = "default_containers")]
    pub containers: Vec<String>,
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
}

impl Default for HopperSettings {
    fn default() -> Self {
        Self {
            root_name: default_root_name(),
            hopper_name: default_hopper_name(),
            containers: default_containers(),
            scan_depth: default_scan_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Glob patterns skipped when uploading a local directory.
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_report_name")]
    pub name: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            name: default_report_name(),
        }
    }
}

fn default_google_base() -> String {
    providers::drive::DEFAULT_API_BASE.to_string()
}
fn default_oauth_base() -> String {
    "https://oauth2.googleapis.com".to_string()
}
fn default_token_timeout() -> u64 {
    120
}
fn default_backend_base() -> String {
    "http://localhost:8080".to_string()
}
fn default_firestore_base() -> String {
    providers::firestore::DEFAULT_FIRESTORE_BASE.to_string()
}
fn default_poll_interval() -> u64 {
    2000
}
fn default_root_name() -> String {
    "Kintsu".to_string()
}
fn default_hopper_name() -> String {
    "Hopper".to_string()
}
fn default_containers() -> Vec<String> {
    ["Amazon", "Banking", "Gmail", "Photos", "Receipts"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_scan_depth() -> usize {
    4
}
fn default_db_path() -> String {
    "data/hopper.db".to_string()
}
fn default_attempts() -> u32 {
    3
}
fn default_backoff() -> u64 {
    1000
}
fn default_report_name() -> String {
    "Kintsu_Claim_Report".to_string()
}

/// Loads the TOML file (if any) and then `HOPPER_SECTION__KEY` overrides.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("HOPPER")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("hopper.containers")
            .with_list_parse_key("upload.exclude")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
