//! Credential store: cached token records, silent refresh, and the
//! interactive consent flow both API clients authenticate through.
//!
//! Tokens are persisted per service as a versioned JSON record so a format
//! change never silently misreads an old cache: any record with an
//! unexpected version is treated as a cache miss and reacquired. The
//! interactive flow is injected as the [`AuthorizationFlow`] trait so tests
//! can substitute a mock instead of opening a browser consent page.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::AuthError;

/// Current on-disk token record format.
pub const TOKEN_RECORD_VERSION: u32 = 1;

/// Tokens returned as expired this many seconds before their actual expiry,
/// so a token never dies mid-request.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// A credential ready for immediate use against the service API.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
}

/// The persisted token record, one file per service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub version: u32,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds after which the access token is no longer valid.
    pub expires_at: i64,
    pub scopes: Vec<String>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        now + EXPIRY_LEEWAY_SECS >= self.expires_at
    }

    fn from_grant(grant: TokenGrant, now: i64) -> Self {
        TokenRecord {
            version: TOKEN_RECORD_VERSION,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: now + grant.expires_in,
            scopes: grant.scopes,
        }
    }
}

/// A fresh grant from the authorization provider, before persistence.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, relative to the moment the grant was issued.
    pub expires_in: i64,
    pub scopes: Vec<String>,
}

/// The OAuth client registration, read from the provider's "installed app"
/// JSON secret file.
#[derive(Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: ClientSecret,
}

/// Wire shape of the provider's token endpoint responses.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

/// The interactive consent capability the credential store falls back to
/// when no cached or refreshable token exists.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Walk the user through consent and return the resulting grant.
    async fn authorize(
        &self,
        secret: &ClientSecret,
        scopes: &[String],
    ) -> Result<TokenGrant, AuthError>;
}

/// Loads, refreshes and persists credentials for one or more services.
pub struct CredentialStore<F: AuthorizationFlow> {
    http: reqwest::Client,
    flow: F,
}

impl<F: AuthorizationFlow> CredentialStore<F> {
    pub fn new(flow: F) -> Self {
        Self {
            http: reqwest::Client::new(),
            flow,
        }
    }

    /// Returns a credential valid for immediate use against the service,
    /// going through cache, silent refresh and interactive consent in that
    /// order. Overwrites the cache file whenever a new grant lands.
    pub async fn acquire(&self, service: &ServiceConfig) -> Result<Credential, AuthError> {
        let secret = load_client_secret(&service.client_secret_path)?;
        let now = Utc::now().timestamp();

        let cached = read_token_record(&service.token_cache_path);
        if let Some(record) = &cached {
            if !record.is_expired(now) {
                debug!(
                    cache = %service.token_cache_path.display(),
                    "Cached token still valid, using it"
                );
                return Ok(Credential {
                    access_token: record.access_token.clone(),
                });
            }
        }

        if let Some(refresh_token) = cached.as_ref().and_then(|r| r.refresh_token.clone()) {
            match self.refresh(&secret, &refresh_token).await {
                Ok(mut grant) => {
                    // Providers usually omit the refresh token on refresh.
                    if grant.refresh_token.is_none() {
                        grant.refresh_token = Some(refresh_token);
                    }
                    if grant.scopes.is_empty() {
                        grant.scopes = service.scopes.clone();
                    }
                    info!(
                        cache = %service.token_cache_path.display(),
                        "Refreshed expired token silently"
                    );
                    let record = TokenRecord::from_grant(grant, now);
                    write_token_record(&service.token_cache_path, &record)?;
                    return Ok(Credential {
                        access_token: record.access_token,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Silent refresh failed, falling back to interactive consent");
                }
            }
        }

        info!(
            cache = %service.token_cache_path.display(),
            "No usable cached token, running interactive authorization"
        );
        let mut grant = self.flow.authorize(&secret, &service.scopes).await?;
        if grant.scopes.is_empty() {
            grant.scopes = service.scopes.clone();
        }
        let record = TokenRecord::from_grant(grant, now);
        write_token_record(&service.token_cache_path, &record)?;
        Ok(Credential {
            access_token: record.access_token,
        })
    }

    async fn refresh(
        &self,
        secret: &ClientSecret,
        refresh_token: &str,
    ) -> Result<TokenGrant, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
        ];
        let response = self.http.post(&secret.token_uri).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Refresh(format!("{status}: {body}")));
        }
        let token: TokenResponse = response.json().await?;
        Ok(grant_from_response(token))
    }
}

fn grant_from_response(token: TokenResponse) -> TokenGrant {
    TokenGrant {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_in: token.expires_in.unwrap_or(3600),
        scopes: token
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    }
}

fn load_client_secret(path: &Path) -> Result<ClientSecret, AuthError> {
    let content = fs::read_to_string(path).map_err(|e| AuthError::ClientSecret {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let file: ClientSecretFile =
        serde_json::from_str(&content).map_err(|e| AuthError::ClientSecret {
            path: path.to_path_buf(),
            reason: format!("not a valid installed-app secret: {e}"),
        })?;
    Ok(file.installed)
}

/// Reads the cached record, treating anything unusable (absent file, broken
/// JSON, wrong format version) as a cache miss.
fn read_token_record(path: &Path) -> Option<TokenRecord> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(cache = %path.display(), error = %e, "No readable token cache");
            return None;
        }
    };
    match serde_json::from_str::<TokenRecord>(&content) {
        Ok(record) if record.version == TOKEN_RECORD_VERSION => Some(record),
        Ok(record) => {
            warn!(
                cache = %path.display(),
                found_version = record.version,
                expected_version = TOKEN_RECORD_VERSION,
                "Token cache has unknown format version, reauthorizing"
            );
            None
        }
        Err(e) => {
            warn!(cache = %path.display(), error = %e, "Token cache is corrupt, reauthorizing");
            None
        }
    }
}

fn write_token_record(path: &Path, record: &TokenRecord) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AuthError::TokenCache {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }
    let json = serde_json::to_string_pretty(record).map_err(|e| AuthError::TokenCache {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    fs::write(path, json).map_err(|e| AuthError::TokenCache {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!(
        cache = %path.display(),
        has_refresh_token = record.refresh_token.is_some(),
        "Persisted token record"
    );
    Ok(())
}

/// The real consent flow: a one-shot loopback listener plus a browser visit
/// by the operator.
pub struct InstalledFlow {
    http: reqwest::Client,
}

impl InstalledFlow {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for InstalledFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationFlow for InstalledFlow {
    async fn authorize(
        &self,
        secret: &ClientSecret,
        scopes: &[String],
    ) -> Result<TokenGrant, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Consent(format!("failed to bind loopback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Consent(format!("failed to read listener address: {e}")))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}");
        let state = Uuid::new_v4().to_string();

        let mut auth_url = Url::parse(&secret.auth_uri)
            .map_err(|e| AuthError::Consent(format!("invalid auth_uri in client secret: {e}")))?;
        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &secret.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &state);

        println!("Open this URL in your browser to authorize access:\n\n{auth_url}\n");
        info!(port, "Waiting for authorization callback on loopback listener");

        let (mut socket, peer) = listener
            .accept()
            .await
            .map_err(|e| AuthError::Consent(format!("callback listener failed: {e}")))?;
        debug!(peer = %peer, "Authorization callback connection accepted");

        let (read_half, mut write_half) = socket.split();
        let mut request_line = String::new();
        BufReader::new(read_half)
            .read_line(&mut request_line)
            .await
            .map_err(|e| AuthError::Consent(format!("failed to read callback request: {e}")))?;

        let code = parse_callback(&request_line, &state)?;

        let page = "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\n\r\n\
                    <html><body>Authorization received, you can close this tab.</body></html>";
        if let Err(e) = write_half.write_all(page.as_bytes()).await {
            // The grant is already in hand; a broken response page is not fatal.
            warn!(error = %e, "Failed to write callback response page");
        }

        self.exchange_code(secret, &code, &redirect_uri).await
    }
}

impl InstalledFlow {
    async fn exchange_code(
        &self,
        secret: &ClientSecret,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];
        let response = self.http.post(&secret.token_uri).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Code exchange rejected by token endpoint");
            return Err(AuthError::Consent(format!(
                "code exchange rejected: {status}: {body}"
            )));
        }
        let token: TokenResponse = response.json().await?;
        info!("Authorization code exchanged for tokens");
        Ok(grant_from_response(token))
    }
}

/// Extracts the authorization code from the callback request line,
/// verifying the anti-forgery state parameter.
fn parse_callback(request_line: &str, expected_state: &str) -> Result<String, AuthError> {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::Consent("malformed callback request".into()))?;
    let url = Url::parse(&format!("http://127.0.0.1{path}"))
        .map_err(|e| AuthError::Consent(format!("malformed callback url: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(AuthError::Consent(format!(
                    "authorization denied: {value}"
                )))
            }
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::Consent("state parameter mismatch".into()));
    }
    code.ok_or_else(|| AuthError::Consent("callback carried no authorization code".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_check_applies_leeway() {
        let record = TokenRecord {
            version: TOKEN_RECORD_VERSION,
            access_token: "at".into(),
            refresh_token: None,
            expires_at: 1_000,
            scopes: vec![],
        };
        assert!(!record.is_expired(900));
        // Within the 60 second leeway window.
        assert!(record.is_expired(950));
        assert!(record.is_expired(1_001));
    }

    #[test]
    fn token_record_round_trips_through_json() {
        let record = TokenRecord {
            version: TOKEN_RECORD_VERSION,
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: 1_700_000_000,
            scopes: vec!["https://example.com/auth/upload".into()],
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TokenRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, record.version);
        assert_eq!(back.access_token, record.access_token);
        assert_eq!(back.refresh_token, record.refresh_token);
        assert_eq!(back.expires_at, record.expires_at);
        assert_eq!(back.scopes, record.scopes);
    }

    #[test]
    fn callback_with_matching_state_yields_code() {
        let code =
            parse_callback("GET /?state=abc&code=4%2Fxyz HTTP/1.1", "abc").expect("code parses");
        assert_eq!(code, "4/xyz");
    }

    #[test]
    fn callback_with_wrong_state_is_rejected() {
        let err = parse_callback("GET /?state=evil&code=4%2Fxyz HTTP/1.1", "abc").unwrap_err();
        assert!(matches!(err, AuthError::Consent(_)));
    }

    #[test]
    fn callback_with_provider_error_is_rejected() {
        let err =
            parse_callback("GET /?error=access_denied&state=abc HTTP/1.1", "abc").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }
}
