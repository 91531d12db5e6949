//! Secret broker client (Vault HTTP API).
//!
//! Two calls only: the `cf` auth login that trades an [`IdentityAssertion`]
//! for a client token, and a logical read of the station secret with that
//! token. Neither call retries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::identity::IdentityAssertion;
use crate::station::StationConfig;

// ── Constants ───────────────────────────────────────────────────────

/// Default mount of the Cloud Foundry auth method.
pub const DEFAULT_MOUNT: &str = "cf";

/// Default logical path of the station secret.
pub const DEFAULT_SECRET_PATH: &str = "kv/pws";

/// Transport deadline for broker calls.
pub const BROKER_TIMEOUT: Duration = Duration::from_secs(10);

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

// ── Token ───────────────────────────────────────────────────────────

/// Client token issued by the broker at login.
///
/// Held for the whole process lifetime; nothing renews it.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    lease_duration: Duration,
    renewable: bool,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[redacted]")
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish()
    }
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            lease_duration: Duration::ZERO,
            renewable: false,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lease reported by the broker. Informational only.
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn renewable(&self) -> bool {
        self.renewable
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    role: &'a str,
    cf_instance_cert: &'a str,
    signing_time: String,
    signature: String,
}

impl<'a> LoginRequest<'a> {
    fn from_assertion(assertion: &'a IdentityAssertion) -> Self {
        Self {
            role: assertion.role(),
            cf_instance_cert: assertion.certificate(),
            signing_time: assertion.signing_time_str(),
            signature: assertion.encoded_signature(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<AuthBlock>,
}

#[derive(Debug, Deserialize)]
struct AuthBlock {
    #[serde(default)]
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Debug, Deserialize)]
struct SecretResponse {
    data: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Pull the `errors` list out of a broker error body, or fall back to raw text.
fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ if body.trim().is_empty() => "no error details".to_string(),
        _ => body.trim().to_string(),
    }
}

/// KV v2 wraps the payload as `{data: {data: {...}, metadata: {...}}}`.
fn unwrap_kv_v2(mut data: Map<String, Value>) -> Map<String, Value> {
    if data.contains_key("metadata") {
        if let Some(Value::Object(inner)) = data.remove("data") {
            return inner;
        }
    }
    data
}

// ── Client ──────────────────────────────────────────────────────────

/// Broker client bound to one address, owning its HTTP transport.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    addr: String,
    namespace: Option<String>,
}

impl BrokerClient {
    /// Client for `addr` (e.g. `https://vault.service.cf.internal:8200`).
    pub fn new(addr: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(BROKER_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build broker HTTP client: {}", e)))?;
        Self::with_client(http, addr)
    }

    /// Client using a caller-supplied transport.
    pub fn with_client(http: reqwest::Client, addr: &str) -> Result<Self> {
        let addr = addr.trim().trim_end_matches('/');
        if addr.is_empty() {
            return Err(Error::Config("secret broker address is empty".to_string()));
        }
        Ok(Self {
            http,
            addr: addr.to_string(),
            namespace: None,
        })
    }

    /// Send `X-Vault-Namespace` on every call.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.trim().is_empty());
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.namespace {
            Some(ns) => builder.header(NAMESPACE_HEADER, ns),
            None => builder,
        }
    }

    /// Exchange a signed assertion for a client token at `auth/<mount>/login`.
    pub async fn login(&self, mount: &str, assertion: &IdentityAssertion) -> Result<AccessToken> {
        let mount = match mount.trim_matches('/') {
            "" => DEFAULT_MOUNT,
            m => m,
        };
        let path = format!("auth/{}/login", mount);

        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&LoginRequest::from_assertion(assertion))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("login request to {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("failed to read login response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Auth(format!(
                "login to {} failed with status {}: {}",
                path,
                status.as_u16(),
                describe_error_body(&body)
            )));
        }

        if body.trim().is_empty() {
            return Err(Error::Auth(
                "empty response from credential provider".to_string(),
            ));
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("malformed login response: {}", e)))?;

        match parsed.auth {
            Some(auth) if !auth.client_token.is_empty() => {
                log::info!(
                    "Logged in via {} as role '{}' (lease {}s, renewable: {})",
                    path,
                    assertion.role(),
                    auth.lease_duration,
                    auth.renewable
                );
                Ok(AccessToken {
                    value: auth.client_token,
                    lease_duration: Duration::from_secs(auth.lease_duration),
                    renewable: auth.renewable,
                })
            }
            _ => Err(Error::Auth(
                "empty response from credential provider".to_string(),
            )),
        }
    }

    /// Read the raw key/value data stored at `path`.
    pub async fn read_secret(&self, token: &AccessToken, path: &str) -> Result<Map<String, Value>> {
        let response = self
            .request(reqwest::Method::GET, path)
            .header(TOKEN_HEADER, token.value())
            .send()
            .await
            .map_err(|e| Error::Config(format!("reading secret {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Config(format!("failed to read secret {}: {}", path, e)))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Config(format!("no secret data at {}", path)));
        }
        if !status.is_success() {
            return Err(Error::Config(format!(
                "reading secret {} failed with status {}: {}",
                path,
                status.as_u16(),
                describe_error_body(&body)
            )));
        }

        let parsed: SecretResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Config(format!("malformed secret response for {}: {}", path, e)))?;

        match parsed.data.map(unwrap_kv_v2) {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(Error::Config(format!("no secret data at {}", path))),
        }
    }

    /// Read and validate the station configuration stored at `path`.
    pub async fn read_station_config(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> Result<StationConfig> {
        let data = self.read_secret(token, path).await?;
        let config = StationConfig::from_secret(&data)?;
        log::info!(
            "Loaded station config from {} (station {}, units '{}', tz {})",
            path,
            config.station_id,
            config.units,
            config.timezone
        );
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityProofSigner;
    use crate::testutil::{spawn_stub, test_identity_files, test_private_key};
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use base64::{engine::general_purpose::URL_SAFE, Engine};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn assertion() -> IdentityAssertion {
        let files = test_identity_files();
        IdentityProofSigner::with_lookup(Some(&files.cert), Some(&files.key), |_| None)
            .unwrap()
            .sign("pws-role", Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
            .unwrap()
    }

    #[test]
    fn test_url_joining() {
        let client = BrokerClient::new("http://vault:8200/").unwrap();
        assert_eq!(client.addr(), "http://vault:8200");
        assert_eq!(client.url("auth/cf/login"), "http://vault:8200/v1/auth/cf/login");
        assert_eq!(client.url("/kv/pws"), "http://vault:8200/v1/kv/pws");
    }

    #[test]
    fn test_empty_address_is_config_error() {
        assert!(matches!(BrokerClient::new("  "), Err(Error::Config(_))));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("s.very-secret");
        assert!(!format!("{:?}", token).contains("very-secret"));
        assert_eq!(token.value(), "s.very-secret");
    }

    #[test]
    fn test_describe_error_body() {
        assert_eq!(
            describe_error_body(r#"{"errors":["permission denied","bad role"]}"#),
            "permission denied; bad role"
        );
        assert_eq!(describe_error_body("  "), "no error details");
        assert_eq!(describe_error_body("<html>oops</html>"), "<html>oops</html>");
    }

    #[test]
    fn test_unwrap_kv_v2() {
        let v2 = json!({"data": {"sid": "KDEN1"}, "metadata": {"version": 3}});
        let unwrapped = unwrap_kv_v2(v2.as_object().cloned().unwrap());
        assert_eq!(unwrapped.get("sid"), Some(&json!("KDEN1")));

        let v1 = json!({"sid": "KDEN1", "data": "not-a-wrapper"});
        let untouched = unwrap_kv_v2(v1.as_object().cloned().unwrap());
        assert_eq!(untouched.len(), 2);
    }

    #[tokio::test]
    async fn test_login_sends_signed_assertion() {
        let app = Router::new().route(
            "/v1/auth/{mount}/login",
            post(|Path(mount): Path<String>, Json(body): Json<Value>| async move {
                assert_eq!(mount, "cf");
                assert_eq!(body["role"], "pws-role");
                assert_eq!(body["signing_time"], "2024-01-02T03:04:05Z");
                assert!(body["cf_instance_cert"]
                    .as_str()
                    .unwrap()
                    .contains("BEGIN CERTIFICATE"));
                let signature = URL_SAFE
                    .decode(body["signature"].as_str().unwrap())
                    .unwrap();
                assert!(!signature.is_empty());
                Json(json!({
                    "auth": {"client_token": "tok-1", "lease_duration": 3600, "renewable": true}
                }))
            }),
        );
        let base = spawn_stub(app).await;

        let client = BrokerClient::new(&base).unwrap();
        let token = client.login("", &assertion()).await.unwrap();
        assert_eq!(token.value(), "tok-1");
        assert_eq!(token.lease_duration(), Duration::from_secs(3600));
        assert!(token.renewable());
    }

    #[tokio::test]
    async fn test_login_signature_verifies_on_broker_side() {
        let app = Router::new().route(
            "/v1/auth/cf/login",
            post(|Json(body): Json<Value>| async move {
                let time = chrono::NaiveDateTime::parse_from_str(
                    body["signing_time"].as_str().unwrap(),
                    crate::identity::SIGNING_TIME_FORMAT,
                )
                .unwrap()
                .and_utc();
                let payload = crate::identity::signing_payload(
                    &time,
                    body["cf_instance_cert"].as_str().unwrap(),
                    body["role"].as_str().unwrap(),
                );
                let signature = URL_SAFE
                    .decode(body["signature"].as_str().unwrap())
                    .unwrap();
                let signature = rsa::pss::Signature::try_from(signature.as_slice()).unwrap();
                use rsa::signature::Verifier;
                let verified = rsa::pss::VerifyingKey::<sha2::Sha256>::new(
                    test_private_key().to_public_key(),
                )
                .verify(payload.as_bytes(), &signature)
                .is_ok();
                if verified {
                    (StatusCode::OK, Json(json!({"auth": {"client_token": "tok-ok"}})))
                } else {
                    (
                        StatusCode::FORBIDDEN,
                        Json(json!({"errors": ["invalid signature"]})),
                    )
                }
            }),
        );
        let base = spawn_stub(app).await;

        let token = BrokerClient::new(&base)
            .unwrap()
            .login("cf", &assertion())
            .await
            .unwrap();
        assert_eq!(token.value(), "tok-ok");
    }

    #[tokio::test]
    async fn test_login_rejected_is_auth_error() {
        let app = Router::new().route(
            "/v1/auth/cf/login",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"errors": ["role \"pws-role\" not found"]})),
                )
            }),
        );
        let base = spawn_stub(app).await;

        let err = BrokerClient::new(&base)
            .unwrap()
            .login("cf", &assertion())
            .await
            .unwrap_err();
        match err {
            Error::Auth(msg) => {
                assert!(msg.contains("400"), "{msg}");
                assert!(msg.contains("not found"), "{msg}");
            }
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_empty_response_is_auth_error() {
        let app = Router::new()
            .route("/v1/auth/cf/login", post(|| async { StatusCode::NO_CONTENT }))
            .route(
                "/v1/auth/other/login",
                post(|| async { Json(json!({"auth": null})) }),
            );
        let base = spawn_stub(app).await;
        let client = BrokerClient::new(&base).unwrap();

        for mount in ["cf", "other"] {
            let err = client.login(mount, &assertion()).await.unwrap_err();
            assert!(
                matches!(err, Error::Auth(ref m) if m.contains("empty response")),
                "mount {mount}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_login_transport_failure_is_auth_error() {
        // Bind then drop so nothing is listening on the port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = BrokerClient::new(&format!("http://{}", addr))
            .unwrap()
            .login("cf", &assertion())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_read_station_config_with_token() {
        let app = Router::new().route(
            "/v1/kv/pws",
            get(|headers: HeaderMap| async move {
                if headers.get("x-vault-token").and_then(|v| v.to_str().ok()) != Some("tok-1") {
                    return (StatusCode::FORBIDDEN, Json(json!({"errors": ["permission denied"]})));
                }
                (
                    StatusCode::OK,
                    Json(json!({"data": {
                        "api": "https://x/v2/pws/observations/current",
                        "sid": "KDEN1",
                        "units": "e",
                        "key": "abc",
                        "tz": "America/Denver"
                    }})),
                )
            }),
        );
        let base = spawn_stub(app).await;
        let client = BrokerClient::new(&base).unwrap();

        let config = client
            .read_station_config(&AccessToken::new("tok-1"), DEFAULT_SECRET_PATH)
            .await
            .unwrap();
        assert_eq!(config.station_id, "KDEN1");
        assert_eq!(config.api_key, "abc");

        let err = client
            .read_station_config(&AccessToken::new("wrong"), DEFAULT_SECRET_PATH)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("permission denied")));
    }

    #[tokio::test]
    async fn test_read_missing_secret_is_config_error() {
        let app = Router::new()
            .route(
                "/v1/kv/empty",
                get(|| async { Json(json!({"data": {}})) }),
            )
            .route(
                "/v1/kv/partial",
                get(|| async { Json(json!({"data": {"sid": "KDEN1"}})) }),
            );
        let base = spawn_stub(app).await;
        let client = BrokerClient::new(&base).unwrap();
        let token = AccessToken::new("tok-1");

        for path in ["kv/absent", "kv/empty", "kv/partial"] {
            let err = client.read_station_config(&token, path).await.unwrap_err();
            assert!(matches!(err, Error::Config(_)), "path {path}: {err:?}");
        }
    }

    #[tokio::test]
    async fn test_namespace_header_is_sent() {
        let app = Router::new().route(
            "/v1/kv/pws",
            get(|headers: HeaderMap| async move {
                let ns = headers
                    .get("x-vault-namespace")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"data": {"ns": ns}}))
            }),
        );
        let base = spawn_stub(app).await;
        let client = BrokerClient::new(&base)
            .unwrap()
            .with_namespace(Some("team-weather".to_string()));

        let data = client
            .read_secret(&AccessToken::new("tok-1"), "kv/pws")
            .await
            .unwrap();
        assert_eq!(data.get("ns"), Some(&json!("team-weather")));
    }
}
