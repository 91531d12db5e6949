//! Process configuration.
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional YAML
//! file, environment variables, then CLI flags (applied by the binary).
//! `CF_INSTANCE_CERT` / `CF_INSTANCE_KEY` are not read here; the identity
//! signer falls back to them when the file leaves the paths unset.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::broker::{DEFAULT_MOUNT, DEFAULT_SECRET_PATH};
use crate::error::{Error, Result};
use crate::server::DEFAULT_PORT;

/// Root configuration for the report service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Secret broker address (`VAULT_ADDR`)
    pub vault_addr: String,
    /// Broker namespace (`VAULT_NAMESPACE`)
    pub vault_namespace: Option<String>,
    /// Login role (`ROLE`)
    pub role: String,
    /// Mount of the Cloud Foundry auth method
    pub mount: String,
    /// Logical path of the station secret
    pub secret_path: String,
    /// Instance certificate path; falls back to `CF_INSTANCE_CERT`
    pub cf_instance_cert: Option<PathBuf>,
    /// Instance key path; falls back to `CF_INSTANCE_KEY`
    pub cf_instance_key: Option<PathBuf>,
    /// HTTP listen port
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            vault_addr: String::new(),
            vault_namespace: None,
            role: String::new(),
            mount: DEFAULT_MOUNT.to_string(),
            secret_path: DEFAULT_SECRET_PATH.to_string(),
            cf_instance_cert: None,
            cf_instance_key: None,
            port: DEFAULT_PORT,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Overlay `VAULT_ADDR`, `VAULT_NAMESPACE` and `ROLE` from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Overlay environment values obtained through `lookup`. Empty values are ignored.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("VAULT_ADDR") {
            self.vault_addr = addr;
        }
        if let Some(ns) = get("VAULT_NAMESPACE") {
            self.vault_namespace = Some(ns);
        }
        if let Some(role) = get("ROLE") {
            self.role = role;
        }
        self
    }

    /// Check the fields startup cannot proceed without
    pub fn validate(&self) -> Result<()> {
        if self.vault_addr.trim().is_empty() {
            return Err(Error::Config(
                "secret broker address is required (VAULT_ADDR)".to_string(),
            ));
        }
        if self.role.trim().is_empty() {
            return Err(Error::Config("login role is required (ROLE)".to_string()));
        }
        if self.secret_path.trim_matches('/').is_empty() {
            return Err(Error::Config("secret path must not be empty".to_string()));
        }
        Ok(())
    }
}
