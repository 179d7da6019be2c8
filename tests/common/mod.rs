//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use vault_proxy::action::{ActionConfig, FieldList};
use vault_proxy::config::ProxyConfig;
use vault_proxy::http::{AppState, HttpServer};
use vault_proxy::storage::{Direction, Route, Vault};
use vault_proxy::Shutdown;

/// A mock backend that records what it received.
#[derive(Clone)]
pub struct Backend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Bytes>>>,
    last_headers: Arc<Mutex<Option<HeaderMap>>>,
    suffix: &'static str,
    mirror_content_type: bool,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Option<Bytes> {
        self.last_body.lock().unwrap().clone()
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.last_headers.lock().unwrap().clone()
    }
}

/// Start an echo backend: responds with the request body followed by `suffix`.
///
/// With `mirror_content_type` the request's Content-Type is sent back,
/// otherwise the response is `text/plain`.
pub async fn start_echo_backend(suffix: &'static str, mirror_content_type: bool) -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = Backend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        last_body: Arc::new(Mutex::new(None)),
        last_headers: Arc::new(Mutex::new(None)),
        suffix,
        mirror_content_type,
    };

    let app = Router::new().fallback(echo).with_state(backend.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    backend
}

async fn echo(State(backend): State<Backend>, headers: HeaderMap, body: Bytes) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    *backend.last_body.lock().unwrap() = Some(body.clone());
    *backend.last_headers.lock().unwrap() = Some(headers.clone());

    let content_type = if backend.mirror_content_type {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string()
    } else {
        "text/plain".to_string()
    };

    let mut out = body.to_vec();
    out.extend_from_slice(backend.suffix.as_bytes());
    (StatusCode::OK, [(CONTENT_TYPE, content_type)], out).into_response()
}

/// Start a backend that accepts connections but answers only after `delay`.
pub async fn start_slow_backend(delay: Duration) -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = Backend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        last_body: Arc::new(Mutex::new(None)),
        last_headers: Arc::new(Mutex::new(None)),
        suffix: "",
        mirror_content_type: false,
    };

    let hits = backend.hits.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        tokio::time::sleep(delay).await;
                        let _ = socket
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nlate")
                            .await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    backend
}

/// Start a backend that holds each request for `delay`.
///
/// The returned `Notify` fires when the peer closes a connection before the
/// response is written.
pub async fn start_hanging_backend(delay: Duration) -> (Backend, Arc<Notify>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = Backend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        last_body: Arc::new(Mutex::new(None)),
        last_headers: Arc::new(Mutex::new(None)),
        suffix: "",
        mirror_content_type: false,
    };
    let closed = Arc::new(Notify::new());

    let hits = backend.hits.clone();
    let notify = closed.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            hits.fetch_add(1, Ordering::SeqCst);
            let notify = notify.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let deadline = tokio::time::sleep(delay);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        read = socket.read(&mut buf) => match read {
                            Ok(0) | Err(_) => {
                                notify.notify_one();
                                return;
                            }
                            Ok(_) => {}
                        },
                        _ = &mut deadline => {
                            let _ = socket
                                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nlate")
                                .await;
                            return;
                        }
                    }
                }
            });
        }
    });
    (backend, closed)
}

/// An address nothing listens on.
pub async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config with short timeouts suitable for tests.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.timeouts.connect_secs = 1;
    config.timeouts.backend_secs = 1;
    config.timeouts.request_secs = 5;
    config.observability.metrics_enabled = false;
    config
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: &ProxyConfig, state: AppState) -> (String, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(config, state);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (format!("http://{}", addr), shutdown)
}

pub fn vault(id: &str, upstream: &str) -> Vault {
    Vault {
        id: id.to_string(),
        upstream: upstream.to_string(),
    }
}

pub fn route(id: &str, vault_id: &str, method: &str, path: &str, fields: &str, action: ActionConfig) -> Route {
    Route {
        id: id.to_string(),
        vault_id: vault_id.to_string(),
        direction: Direction::Inbound,
        method: method.to_string(),
        path: path.to_string(),
        upstream: None,
        fields: FieldList::parse(fields),
        action,
    }
}
