use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use iptv_edge::{AppConfig, ApplicationServer, Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guard is kept alive so buffered log lines actually flush
    let _guards = Logger::init(config.cargo_env);

    info!("logger and env prepped, starting proxy...");

    ApplicationServer::serve(config)
        .await
        .context("proxy server failed to start")?;

    Ok(())
}
