use std::fs;
use std::path::Path;

use tempfile::tempdir;

use drive_shorts::auth::{
    CredentialStore, MockAuthorizationFlow, TokenGrant, TokenRecord, TOKEN_RECORD_VERSION,
};
use drive_shorts::config::ServiceConfig;

fn write_client_secret(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("client_secret.json");
    fs::write(
        &path,
        r#"{
  "installed": {
    "client_id": "test-client-id",
    "client_secret": "test-client-secret",
    "auth_uri": "http://127.0.0.1/auth",
    "token_uri": "http://127.0.0.1/token",
    "redirect_uris": ["http://localhost"]
  }
}"#,
    )
    .unwrap();
    path
}

fn service_config(dir: &Path) -> ServiceConfig {
    ServiceConfig {
        client_secret_path: write_client_secret(dir),
        token_cache_path: dir.join("token.json"),
        scopes: vec!["https://example.com/auth/storage".to_string()],
    }
}

fn far_future() -> i64 {
    unix_now() + 24 * 3600
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn grant(access_token: &str) -> TokenGrant {
    TokenGrant {
        access_token: access_token.to_string(),
        refresh_token: Some("granted-refresh".to_string()),
        expires_in: 3600,
        scopes: vec![],
    }
}

#[tokio::test]
async fn valid_cached_token_is_used_without_consent() {
    let temp = tempdir().unwrap();
    let service = service_config(temp.path());

    let record = TokenRecord {
        version: TOKEN_RECORD_VERSION,
        access_token: "cached-access".to_string(),
        refresh_token: None,
        expires_at: far_future(),
        scopes: service.scopes.clone(),
    };
    fs::write(
        &service.token_cache_path,
        serde_json::to_string(&record).unwrap(),
    )
    .unwrap();

    // No authorize expectation: any interactive consent fails the test.
    let store = CredentialStore::new(MockAuthorizationFlow::new());
    let credential = store.acquire(&service).await.expect("cache hit");
    assert_eq!(credential.access_token, "cached-access");
}

#[tokio::test]
async fn missing_cache_triggers_consent_and_persists_record() {
    let temp = tempdir().unwrap();
    let service = service_config(temp.path());

    let mut flow = MockAuthorizationFlow::new();
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(grant("fresh-access")));

    let store = CredentialStore::new(flow);
    let credential = store.acquire(&service).await.expect("interactive grant");
    assert_eq!(credential.access_token, "fresh-access");

    // The grant must have been written back as a current-version record.
    let persisted: TokenRecord =
        serde_json::from_str(&fs::read_to_string(&service.token_cache_path).unwrap()).unwrap();
    assert_eq!(persisted.version, TOKEN_RECORD_VERSION);
    assert_eq!(persisted.access_token, "fresh-access");
    assert_eq!(persisted.refresh_token.as_deref(), Some("granted-refresh"));
    assert_eq!(persisted.scopes, service.scopes);

    // A second acquire is served from the fresh cache, not the flow.
    let credential = store.acquire(&service).await.expect("cache hit");
    assert_eq!(credential.access_token, "fresh-access");
}

#[tokio::test]
async fn unknown_record_version_forces_reauthorization() {
    let temp = tempdir().unwrap();
    let service = service_config(temp.path());

    let stale = TokenRecord {
        version: TOKEN_RECORD_VERSION + 1,
        access_token: "from-the-future".to_string(),
        refresh_token: Some("future-refresh".to_string()),
        expires_at: far_future(),
        scopes: vec![],
    };
    fs::write(
        &service.token_cache_path,
        serde_json::to_string(&stale).unwrap(),
    )
    .unwrap();

    let mut flow = MockAuthorizationFlow::new();
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(grant("reacquired-access")));

    let store = CredentialStore::new(flow);
    let credential = store.acquire(&service).await.expect("reauthorized");
    assert_eq!(credential.access_token, "reacquired-access");
}

#[tokio::test]
async fn corrupt_cache_forces_reauthorization() {
    let temp = tempdir().unwrap();
    let service = service_config(temp.path());
    fs::write(&service.token_cache_path, "not json at all").unwrap();

    let mut flow = MockAuthorizationFlow::new();
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(grant("recovered-access")));

    let store = CredentialStore::new(flow);
    let credential = store.acquire(&service).await.expect("reauthorized");
    assert_eq!(credential.access_token, "recovered-access");
}

#[tokio::test]
async fn expired_token_without_refresh_token_triggers_consent() {
    let temp = tempdir().unwrap();
    let service = service_config(temp.path());

    let expired = TokenRecord {
        version: TOKEN_RECORD_VERSION,
        access_token: "expired-access".to_string(),
        refresh_token: None,
        expires_at: unix_now() - 10,
        scopes: vec![],
    };
    fs::write(
        &service.token_cache_path,
        serde_json::to_string(&expired).unwrap(),
    )
    .unwrap();

    let mut flow = MockAuthorizationFlow::new();
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(grant("post-expiry-access")));

    let store = CredentialStore::new(flow);
    let credential = store.acquire(&service).await.expect("reauthorized");
    assert_eq!(credential.access_token, "post-expiry-access");
}

#[tokio::test]
async fn missing_client_secret_is_an_authentication_error() {
    let temp = tempdir().unwrap();
    let service = ServiceConfig {
        client_secret_path: temp.path().join("does-not-exist.json"),
        token_cache_path: temp.path().join("token.json"),
        scopes: vec![],
    };

    let store = CredentialStore::new(MockAuthorizationFlow::new());
    let err = store.acquire(&service).await.unwrap_err();
    assert!(err.to_string().contains("client secret"));
}
