//! Cloud Foundry instance identity proof.
//!
//! Diego hands every container an instance certificate and RSA key
//! (`CF_INSTANCE_CERT` / `CF_INSTANCE_KEY`). Vault's `cf` auth method accepts
//! a login when the caller signs `signing_time ++ certificate ++ role` with
//! that key using RSASSA-PSS over SHA-256. The broker re-derives the same
//! payload, so the time layout below is part of the signed bytes.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Layout of `signing_time`, second precision, always UTC.
pub const SIGNING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Environment fallback for the instance certificate path.
pub const CERT_PATH_ENV: &str = "CF_INSTANCE_CERT";

/// Environment fallback for the instance key path.
pub const KEY_PATH_ENV: &str = "CF_INSTANCE_KEY";

/// A signed identity claim, valid for a single login attempt.
#[derive(Clone)]
pub struct IdentityAssertion {
    signing_time: DateTime<Utc>,
    role: String,
    certificate: String,
    signature: Vec<u8>,
}

impl std::fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAssertion")
            .field("signing_time", &self.signing_time_str())
            .field("role", &self.role)
            .field("certificate", &format!("[{} bytes]", self.certificate.len()))
            .field("signature", &"[redacted]")
            .finish()
    }
}

impl IdentityAssertion {
    pub fn signing_time(&self) -> DateTime<Utc> {
        self.signing_time
    }

    /// Signing time in the exact layout that was signed.
    pub fn signing_time_str(&self) -> String {
        self.signing_time.format(SIGNING_TIME_FORMAT).to_string()
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Instance certificate PEM text, as read from disk.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Signature in the wire encoding the broker expects (base64url, padded).
    pub fn encoded_signature(&self) -> String {
        URL_SAFE.encode(&self.signature)
    }

    /// Check the signature against `public_key` the way the broker does.
    pub fn verify(&self, public_key: &RsaPublicKey) -> Result<()> {
        let payload = signing_payload(&self.signing_time, &self.certificate, &self.role);
        let signature = Signature::try_from(self.signature.as_slice())
            .map_err(|e| Error::Auth(format!("malformed signature: {}", e)))?;
        VerifyingKey::<Sha256>::new(public_key.clone())
            .verify(payload.as_bytes(), &signature)
            .map_err(|_| Error::Auth("signature does not verify".to_string()))
    }
}

/// Build the byte string that gets signed.
pub fn signing_payload(signing_time: &DateTime<Utc>, certificate: &str, role: &str) -> String {
    let mut payload = signing_time.format(SIGNING_TIME_FORMAT).to_string();
    payload.push_str(certificate);
    payload.push_str(role);
    payload
}

/// Pick the explicit path when given, else the value of `env_var`.
pub fn resolve_path(
    explicit: Option<&Path>,
    env_var: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path.to_path_buf());
    }
    match lookup(env_var) {
        Some(value) if !value.trim().is_empty() => Ok(PathBuf::from(value)),
        _ => Err(Error::Config(format!(
            "{} is required (set it explicitly or via the environment)",
            env_var
        ))),
    }
}

/// Signs identity assertions with a fixed certificate/key pair on disk.
#[derive(Debug, Clone)]
pub struct IdentityProofSigner {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl IdentityProofSigner {
    /// Resolve paths, falling back to `CF_INSTANCE_CERT` / `CF_INSTANCE_KEY`.
    pub fn new(cert_path: Option<&Path>, key_path: Option<&Path>) -> Result<Self> {
        Self::with_lookup(cert_path, key_path, |name| std::env::var(name).ok())
    }

    /// Same as [`IdentityProofSigner::new`] with a custom environment lookup.
    pub fn with_lookup(
        cert_path: Option<&Path>,
        key_path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            cert_path: resolve_path(cert_path, CERT_PATH_ENV, &lookup)?,
            key_path: resolve_path(key_path, KEY_PATH_ENV, &lookup)?,
        })
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Read the certificate, sign it for `role` at `now`.
    pub fn sign(&self, role: &str, now: DateTime<Utc>) -> Result<IdentityAssertion> {
        if role.trim().is_empty() {
            return Err(Error::Config("role is required".to_string()));
        }

        let certificate = read_file(&self.cert_path)?;
        let private_key = load_private_key(&self.key_path)?;

        let signing_time = now.trunc_subsecs(0);
        let payload = signing_payload(&signing_time, &certificate, role);
        let signature = BlindedSigningKey::<Sha256>::new(private_key)
            .sign_with_rng(&mut OsRng, payload.as_bytes())
            .to_vec();

        log::debug!(
            "Signed identity assertion for role '{}' at {}",
            role,
            signing_time.format(SIGNING_TIME_FORMAT)
        );

        Ok(IdentityAssertion {
            signing_time,
            role: role.to_string(),
            certificate,
            signature,
        })
    }
}

/// One-shot signing with environment fallback for missing paths.
pub fn sign(
    role: &str,
    cert_path: Option<&Path>,
    key_path: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<IdentityAssertion> {
    if role.trim().is_empty() {
        return Err(Error::Config("role is required".to_string()));
    }
    IdentityProofSigner::new(cert_path, key_path)?.sign(role, now)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an RSA key from PEM, PKCS#1 first (what Diego writes), then PKCS#8.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = read_file(path)?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| {
            Error::Config(format!(
                "unable to decode private key {}: {}",
                path.display(),
                e
            ))
        })
}
