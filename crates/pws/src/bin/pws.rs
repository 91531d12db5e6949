//! Weather station report server binary

use argh::FromArgs;
use pws::{bootstrap, create_router, run_http_server, ServiceConfig, WeatherClient};
use std::sync::Arc;

#[derive(FromArgs)]
/// Personal weather station current-conditions report server
struct Args {
    /// path to a YAML configuration file (optional, environment is enough)
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// HTTP listen port (default: 8080)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// mount of the Cloud Foundry auth method (default: cf)
    #[argh(option)]
    mount: Option<String>,

    /// secret path holding the station settings (default: kv/pws)
    #[argh(option)]
    secret_path: Option<String>,
}

fn load_config(args: &Args) -> pws::Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    }
    .apply_env();

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(mount) = &args.mount {
        config.mount = mount.clone();
    }
    if let Some(secret_path) = &args.secret_path {
        config.secret_path = secret_path.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Sign, log in and read the station secret before accepting traffic
    let credentials = match bootstrap(&config).await {
        Ok(c) => c,
        Err(e) => {
            log::error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let weather = match WeatherClient::new() {
        Ok(w) => w,
        Err(e) => {
            log::error!("Failed to create weather client: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "Serving current conditions for station {}",
        credentials.station.station_id
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let router = create_router(Arc::new(weather), Arc::new(credentials.station));
    run_http_server(router, config.port, shutdown_rx).await?;

    log::info!("Weather report server stopped.");

    Ok(())
}
