//! Access-token plumbing: a shared credential cell and a request-keyed token broker.

use crate::ProviderError;
use reqwest::Client;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Shared, swappable bearer token handed to every HTTP client of a session.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    inner: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let creds = Self::default();
        creds.set(token);
        creds
    }

    pub fn set(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    pub fn require(&self) -> Result<String, ProviderError> {
        self.token().ok_or(ProviderError::NotSignedIn)
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }
}

/// Space-separated OAuth scope list.
pub fn scope_string(scopes: &[String]) -> String {
    scopes.join(" ")
}

pub fn requested_scopes(include_gmail: bool) -> Vec<String> {
    let mut scopes = vec![DRIVE_FILE_SCOPE.to_string()];
    if include_gmail {
        scopes.push(GMAIL_READONLY_SCOPE.to_string());
    }
    scopes
}

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub id: u64,
    pub scopes: Vec<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    /// Space-separated list of scopes actually granted.
    pub scope: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GrantedToken {
    pub access_token: String,
    pub granted_scopes: BTreeSet<String>,
}

/// The identity provider side of the token flow.
///
/// `request_access_token` starts a flow and returns; the answer arrives later
/// through `TokenBroker::complete` with the same request id.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn init(&self) -> Result<(), ProviderError>;

    fn request_access_token(&self, request: TokenRequest, broker: TokenBroker);
}

type Pending = HashMap<u64, oneshot::Sender<TokenResponse>>;

/// Correlates token responses with the request that asked for them.
#[derive(Clone, Default)]
pub struct TokenBroker {
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<Pending>>,
}

impl TokenBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Delivers a response to the waiting request. Returns false for unknown ids.
    pub fn complete(&self, request_id: u64, response: TokenResponse) -> bool {
        let sender = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&request_id),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                warn!(request_id, "token response for unknown request");
                false
            }
        }
    }

    pub async fn acquire(
        &self,
        identity: &dyn IdentityProvider,
        scopes: Vec<String>,
        timeout: Duration,
    ) -> Result<GrantedToken, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| ProviderError::RequestFailed("token broker poisoned".into()))?
            .insert(id, tx);

        debug!(request_id = id, scopes = %scope_string(&scopes), "requesting access token");
        identity.request_access_token(
            TokenRequest {
                id,
                scopes,
                prompt: Some("consent".into()),
            },
            self.clone(),
        );

        let outcome = tokio::time::timeout(timeout, rx).await;
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
        let response = match outcome {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                return Err(ProviderError::RequestFailed(
                    "identity provider dropped the request".into(),
                ))
            }
            Err(_) => return Err(ProviderError::RequestFailed("token request timed out".into())),
        };

        if let Some(err) = response.error {
            return Err(ProviderError::RequestFailed(format!("sign-in error: {err}")));
        }
        let access_token = response
            .access_token
            .ok_or_else(|| ProviderError::Decode("token response without access_token".into()))?;
        let granted_scopes = response
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(GrantedToken {
            access_token,
            granted_scopes,
        })
    }
}

/// Identity provider that answers every request with a pre-issued token.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    token: Option<String>,
}

impl StaticIdentity {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentity {
    async fn init(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn request_access_token(&self, request: TokenRequest, broker: TokenBroker) {
        let response = match &self.token {
            Some(token) => TokenResponse {
                access_token: Some(token.clone()),
                scope: Some(scope_string(&request.scopes)),
                error: None,
            },
            None => TokenResponse {
                error: Some("no access token configured".into()),
                ..TokenResponse::default()
            },
        };
        broker.complete(request.id, response);
    }
}

/// Best-effort token revocation at the identity provider.
pub async fn revoke_token(client: &Client, oauth_base: &str, token: &str) -> Result<(), ProviderError> {
    let resp = client
        .post(format!("{}/revoke", oauth_base.trim_end_matches('/')))
        .query(&[("token", token)])
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Status { status, body });
    }
    Ok(())
}
