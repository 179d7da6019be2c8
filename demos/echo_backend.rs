//! Stand-in tenant backend: echoes the request body followed by " response".
//!
//! cargo run --example echo_backend

use axum::{
    body::Bytes,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::IntoResponse,
    Router,
};
use std::net::SocketAddr;

async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();

    let mut out = body.to_vec();
    out.extend_from_slice(b" response");
    ([(CONTENT_TYPE, content_type)], out)
}

#[tokio::main]
async fn main() {
    let app = Router::new().fallback(echo);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    println!("Echo backend listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
