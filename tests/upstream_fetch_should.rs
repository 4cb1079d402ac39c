// redirect-following against a real local server, the hop bound is the
// termination guarantee so it gets exercised at the boundary
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::Path,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};

use iptv_edge::config::AppConfig;
use iptv_edge::server::error::Error;
use iptv_edge::server::services::upstream_services::{UpstreamService, UpstreamServiceTrait};

/// serves /hop/{n}: redirects down to /hop/0, which answers 200 "terminal"
async fn spawn_redirect_server() -> SocketAddr {
    async fn hop(Path(n): Path<u32>) -> Response {
        if n == 0 {
            "terminal".into_response()
        } else {
            Redirect::temporary(&format!("/hop/{}", n - 1)).into_response()
        }
    }

    let app = Router::new()
        .route("/hop/{n}", get(hop))
        .route("/teapot", get(|| async { axum::http::StatusCode::IM_A_TEAPOT }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    addr
}

fn service() -> UpstreamService {
    UpstreamService::new(Arc::new(AppConfig::default())).expect("client should build")
}

#[tokio::test]
async fn test_chain_of_eight_redirects_terminates() {
    let addr = spawn_redirect_server().await;

    let response = service()
        .fetch(&format!("http://{}/hop/8", addr), "test-agent")
        .await
        .expect("eight hops is within the bound");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"terminal".to_vec());
}

#[tokio::test]
async fn test_chain_of_nine_is_too_many() {
    let addr = spawn_redirect_server().await;

    let err = service()
        .fetch(&format!("http://{}/hop/9", addr), "test-agent")
        .await
        .expect_err("nine hops must exceed the bound");

    assert!(matches!(err, Error::TooManyRedirects(8)));
}

#[tokio::test]
async fn test_non_success_status_is_classified() {
    let addr = spawn_redirect_server().await;

    let err = service()
        .fetch(&format!("http://{}/teapot", addr), "test-agent")
        .await
        .expect_err("non-2xx is an upstream error");

    assert!(matches!(err, Error::UpstreamHttp { status: 418 }));
    assert_eq!(err.status_code().as_u16(), 418);
}

#[tokio::test]
async fn test_connection_refused_is_a_connection_error() {
    // nothing listens on this port
    let err = service()
        .fetch("http://127.0.0.1:1/x.ts", "test-agent")
        .await
        .expect_err("closed port cannot succeed");

    assert!(matches!(err, Error::UpstreamConnection));
}
