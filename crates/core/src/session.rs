//! An explicitly constructed session: credentials plus the clients that use them.

use crate::config::AppConfig;
use providers::auth::{self, Credentials, IdentityProvider, TokenBroker};
use providers::backend::{BackendClient, BackendConfig};
use providers::drive::{DriveClient, DriveConfig};
use providers::firestore::{FirestoreConfig, FirestoreJobFeed};
use providers::{JobFeed, ProviderError, RefineryBackend, RemoteDirectory};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client bootstrap failed after {attempts} attempts: {source}")]
    Bootstrap {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("sign-in failed: {0}")]
    SignIn(#[source] ProviderError),
    #[error("not signed in")]
    NotSignedIn,
}

#[derive(Clone)]
pub struct Session {
    pub config: Arc<AppConfig>,
    credentials: Credentials,
    granted: Arc<RwLock<BTreeSet<String>>>,
    broker: TokenBroker,
    directory: Arc<dyn RemoteDirectory>,
    backend: Arc<dyn RefineryBackend>,
    jobs: Arc<dyn JobFeed>,
    http: reqwest::Client,
}

impl Session {
    /// Builds the HTTP clients from configuration; nothing is contacted yet.
    pub fn from_config(config: AppConfig) -> Self {
        let credentials = Credentials::new();
        let directory = Arc::new(DriveClient::new(
            DriveConfig {
                api_base: config.drive.api_base.clone(),
                upload_base: config.drive.upload_base.clone(),
                api_key: config.drive.api_key.clone(),
            },
            credentials.clone(),
        ));
        let backend = Arc::new(BackendClient::new(
            BackendConfig {
                api_base: config.backend.api_base.clone(),
            },
            credentials.clone(),
        ));
        let jobs = Arc::new(FirestoreJobFeed::new(
            FirestoreConfig {
                base_url: config.jobs.firestore_base.clone(),
                project_id: config.jobs.project_id.clone(),
                api_key: config.drive.api_key.clone(),
                poll_interval: Duration::from_millis(config.jobs.poll_interval_ms),
            },
            credentials.clone(),
        ));
        Self::from_parts(config, credentials, directory, backend, jobs)
    }

    /// Assembles a session from arbitrary implementations.
    pub fn from_parts(
        config: AppConfig,
        credentials: Credentials,
        directory: Arc<dyn RemoteDirectory>,
        backend: Arc<dyn RefineryBackend>,
        jobs: Arc<dyn JobFeed>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
            granted: Arc::new(RwLock::new(BTreeSet::new())),
            broker: TokenBroker::new(),
            directory,
            backend,
            jobs,
            http: reqwest::Client::new(),
        }
    }

    pub fn directory(&self) -> &dyn RemoteDirectory {
        self.directory.as_ref()
    }

    pub fn directory_handle(&self) -> Arc<dyn RemoteDirectory> {
        self.directory.clone()
    }

    pub fn backend(&self) -> &dyn RefineryBackend {
        self.backend.as_ref()
    }

    pub fn jobs(&self) -> &dyn JobFeed {
        self.jobs.as_ref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_signed_in(&self) -> bool {
        self.credentials.is_signed_in()
    }

    pub fn access_token(&self) -> Result<String, SessionError> {
        self.credentials.token().ok_or(SessionError::NotSignedIn)
    }

    /// Initializes the identity client with bounded, fixed-backoff retries.
    pub async fn bootstrap(&self, identity: &dyn IdentityProvider) -> Result<(), SessionError> {
        let attempts = self.config.bootstrap.attempts.max(1);
        let backoff = Duration::from_millis(self.config.bootstrap.backoff_ms);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match identity.init().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(attempt, remaining = attempts - attempt, "client init failed, retrying: {}", e);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(SessionError::Bootstrap {
                        attempts,
                        source: e,
                    })
                }
            }
        }
    }

    pub fn requested_scopes(&self) -> Vec<String> {
        auth::requested_scopes(self.config.identity.request_gmail)
    }

    pub async fn sign_in(&self, identity: &dyn IdentityProvider) -> Result<(), SessionError> {
        let timeout = Duration::from_secs(self.config.identity.token_timeout_secs);
        let granted = self
            .broker
            .acquire(identity, self.requested_scopes(), timeout)
            .await
            .map_err(SessionError::SignIn)?;
        self.credentials.set(granted.access_token);
        if let Ok(mut scopes) = self.granted.write() {
            scopes.extend(granted.granted_scopes);
        }
        let missing = self.missing_scopes();
        if !missing.is_empty() {
            warn!(?missing, "not every requested scope was granted");
        }
        info!("signed in");
        Ok(())
    }

    pub fn granted_scopes(&self) -> BTreeSet<String> {
        self.granted.read().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn missing_scopes(&self) -> Vec<String> {
        let granted = self.granted_scopes();
        self.requested_scopes()
            .into_iter()
            .filter(|s| !granted.contains(s))
            .collect()
    }

    /// Revokes the token if possible and forgets it either way.
    pub async fn sign_out(&self) {
        if let Some(token) = self.credentials.token() {
            if let Err(e) =
                auth::revoke_token(&self.http, &self.config.identity.oauth_base, &token).await
            {
                warn!("token revoke failed: {}", e);
            }
        }
        self.credentials.clear();
        if let Ok(mut scopes) = self.granted.write() {
            scopes.clear();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use providers::memory::MemoryDirectory;
    use providers::{
        JobRecord, JobRequest, JobSubscription, JobTicket, RefineRequest, RefineResponse,
        ReportRequest, ReportResponse,
    };
    use std::sync::Mutex;
    use tokio::sync::watch;

    /// Backend double that records every call.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub refined: Mutex<Vec<RefineRequest>>,
        pub jobs: Mutex<Vec<JobRequest>>,
        pub uploads: Mutex<Vec<(String, usize)>>,
        pub reports: Mutex<Vec<ReportRequest>>,
        pub fail_names: Mutex<Vec<String>>,
        pub fail_upload: std::sync::atomic::AtomicBool,
        /// Empty means `success`.
        pub report_status: Mutex<String>,
    }

    #[async_trait::async_trait]
    impl RefineryBackend for RecordingBackend {
        async fn refine_file(&self, request: &RefineRequest) -> Result<RefineResponse, ProviderError> {
            if self.fail_names.lock().unwrap().contains(&request.file_name) {
                return Err(ProviderError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            self.refined.lock().unwrap().push(request.clone());
            Ok(RefineResponse {
                status: "queued".into(),
                message: None,
            })
        }

        async fn create_job(&self, request: &JobRequest) -> Result<JobTicket, ProviderError> {
            self.jobs.lock().unwrap().push(request.clone());
            Ok(JobTicket {
                job_id: "job-1".into(),
                upload_url: "https://upload.example/job-1".into(),
            })
        }

        async fn upload_archive(&self, upload_url: &str, bytes: bytes::Bytes) -> Result<(), ProviderError> {
            if self.fail_upload.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(ProviderError::Status {
                    status: 403,
                    body: "expired".into(),
                });
            }
            self.uploads
                .lock()
                .unwrap()
                .push((upload_url.to_string(), bytes.len()));
            Ok(())
        }

        async fn generate_report(&self, request: &ReportRequest) -> Result<ReportResponse, ProviderError> {
            self.reports.lock().unwrap().push(request.clone());
            let status = self.report_status.lock().unwrap().clone();
            Ok(ReportResponse {
                status: if status.is_empty() { "success".into() } else { status },
                files: serde_json::json!([]),
            })
        }
    }

    /// Job feed whose updates are pushed by the test.
    pub struct ManualFeed {
        pub sender: watch::Sender<JobRecord>,
    }

    impl Default for ManualFeed {
        fn default() -> Self {
            Self {
                sender: watch::channel(JobRecord::default()).0,
            }
        }
    }

    #[async_trait::async_trait]
    impl JobFeed for ManualFeed {
        async fn subscribe(&self, job_id: &str) -> Result<JobSubscription, ProviderError> {
            Ok(JobSubscription::new(job_id, self.sender.subscribe(), None))
        }
    }

    pub fn session_with(
        dir: Arc<MemoryDirectory>,
        backend: Arc<RecordingBackend>,
        feed: Arc<ManualFeed>,
    ) -> Session {
        Session::from_parts(
            AppConfig::default(),
            Credentials::with_token("tok"),
            dir,
            backend,
            feed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::auth::{StaticIdentity, GMAIL_READONLY_SCOPE};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyIdentity {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl IdentityProvider for FlakyIdentity {
        async fn init(&self) -> Result<(), ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if n < self.failures {
                Err(ProviderError::Status {
                    status: 502,
                    body: "discovery".into(),
                })
            } else {
                Ok(())
            }
        }

        fn request_access_token(&self, _request: auth::TokenRequest, _broker: TokenBroker) {}
    }

    fn fast_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.bootstrap.backoff_ms = 1;
        cfg
    }

    #[tokio::test]
    async fn bootstrap_retries_then_succeeds() {
        let session = Session::from_config(fast_config());
        let identity = FlakyIdentity {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        session.bootstrap(&identity).await.unwrap();
        assert_eq!(identity.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn bootstrap_gives_up_after_configured_attempts() {
        let session = Session::from_config(fast_config());
        let identity = FlakyIdentity {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let err = session.bootstrap(&identity).await.unwrap_err();
        assert!(matches!(err, SessionError::Bootstrap { attempts: 3, .. }));
        assert_eq!(identity.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn sign_in_stores_token_and_scopes() {
        let mut cfg = fast_config();
        cfg.identity.request_gmail = true;
        let session = Session::from_config(cfg);
        assert!(!session.is_signed_in());
        session
            .sign_in(&StaticIdentity::new(Some("abc".into())))
            .await
            .unwrap();
        assert_eq!(session.access_token().unwrap(), "abc");
        assert!(session.granted_scopes().contains(GMAIL_READONLY_SCOPE));
        assert!(session.missing_scopes().is_empty());
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_session_signed_out() {
        let session = Session::from_config(fast_config());
        let err = session.sign_in(&StaticIdentity::new(None)).await.unwrap_err();
        assert!(matches!(err, SessionError::SignIn(_)));
        assert!(matches!(session.access_token(), Err(SessionError::NotSignedIn)));
    }
}
