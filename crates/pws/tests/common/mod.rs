//! Test helpers for integration tests

#![allow(dead_code)]

use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const TEST_CERT: &str = "-----BEGIN CERTIFICATE-----\n\
MIIDXTCCAkWgAwIBAgIJAKp3integration0instance0certificate\n\
-----END CERTIFICATE-----\n";

/// One RSA key per test binary; generation is the slow part.
pub fn test_private_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("generate test key"))
}

/// Instance certificate and key on disk, removed when dropped
pub struct IdentityFiles {
    pub dir: tempfile::TempDir,
    pub cert: PathBuf,
    pub key: PathBuf,
}

pub fn write_identity_files() -> IdentityFiles {
    let dir = tempfile::tempdir().expect("create temp dir");
    let cert = dir.path().join("instance.crt");
    let key = dir.path().join("instance.key");

    std::fs::write(&cert, TEST_CERT).expect("write cert");
    let pem = test_private_key()
        .to_pkcs1_pem(LineEnding::LF)
        .expect("encode key");
    std::fs::write(&key, pem.as_bytes()).expect("write key");

    IdentityFiles { dir, cert, key }
}

/// Serve `app` on an ephemeral localhost port and return its base URL
pub async fn spawn_stub(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}
