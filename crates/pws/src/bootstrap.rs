//! Startup sequence: sign, log in, read the station secret.
//!
//! Runs once before the listener binds. Every error here is fatal.

use chrono::Utc;

use crate::broker::{AccessToken, BrokerClient};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::identity::IdentityProofSigner;
use crate::station::StationConfig;

/// What the process holds for its whole lifetime after startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: AccessToken,
    pub station: StationConfig,
}

pub async fn bootstrap(config: &ServiceConfig) -> Result<Credentials> {
    config.validate()?;

    let signer = IdentityProofSigner::new(
        config.cf_instance_cert.as_deref(),
        config.cf_instance_key.as_deref(),
    )?;
    log::info!(
        "Signing identity assertion with {}",
        signer.cert_path().display()
    );
    let assertion = signer.sign(&config.role, Utc::now())?;

    let broker = BrokerClient::new(&config.vault_addr)?
        .with_namespace(config.vault_namespace.clone());
    log::info!("Logging in to secret broker at {}", broker.addr());
    let token = broker.login(&config.mount, &assertion).await?;

    let station = broker
        .read_station_config(&token, &config.secret_path)
        .await?;

    Ok(Credentials { token, station })
}
