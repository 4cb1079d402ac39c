pub mod api;
pub mod error;
pub mod extractors;
pub mod rewrite;
pub mod services;
pub mod utils;

pub use error::{AppResult, Error};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use axum::Extension;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use api::{ChannelsController, HealthController, ProxyController};
use services::AppServices;

pub struct ApplicationServer;

impl ApplicationServer {
    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        let port = config.port;
        let cors = Self::cors_layer(&config.cors_origin)?;
        let services = AppServices::new(config).context("failed to start services")?;

        let app = axum::Router::new()
            .merge(ProxyController::app())
            .merge(ChannelsController::app())
            .merge(HealthController::app())
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(Extension(services));

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        info!("proxy listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind listener")?;

        // connect-info so handlers can see the peer address for the
        // private-network checks
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .context("server stopped unexpectedly")?;

        Ok(())
    }

    fn cors_layer(cors_origin: &str) -> anyhow::Result<CorsLayer> {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_headers(Any);

        if cors_origin == "*" {
            return Ok(layer.allow_origin(Any));
        }

        let origins = cors_origin
            .split(',')
            .map(|origin| {
                origin
                    .trim()
                    .parse::<HeaderValue>()
                    .context("invalid cors origin")
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(layer.allow_origin(origins))
    }
}
