//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

use code_server_proxy::config::ProxyConfig;
use code_server_proxy::lifecycle::{prepare, Shutdown};
use code_server_proxy::routing::Registry;

/// A request as a mock backend received it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub uri: String,
    pub host: Option<String>,
    pub cookie: Option<String>,
    pub body: String,
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Clone)]
struct HttpCtx {
    name: &'static str,
    seen: Arc<Mutex<Vec<Seen>>>,
}

/// Mock code-server: answers `/ping`, `/teapot` with 418, and echoes
/// `"<name> <METHOD> <uri>"` for everything else.
pub struct HttpBackend {
    pub port: u16,
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

impl HttpBackend {
    pub async fn start(name: &'static str) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ctx = HttpCtx {
            name,
            seen: seen.clone(),
        };
        let app = Router::new().fallback(http_handler).with_state(ctx);
        let port = serve(app).await;
        Self { port, seen }
    }

    pub fn last(&self) -> Seen {
        self.seen.lock().last().cloned().expect("backend saw no request")
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

async fn http_handler(State(ctx): State<HttpCtx>, request: Request<Body>) -> Response {
    if request.uri().path() == "/ping" {
        return Json(json!({ "hostname": ctx.name })).into_response();
    }
    if request.uri().path() == "/teapot" {
        return (StatusCode::IM_A_TEAPOT, "short and stout").into_response();
    }

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    ctx.seen.lock().push(Seen {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        host: header_string(&parts.headers, header::HOST),
        cookie: header_string(&parts.headers, header::COOKIE),
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    format!("{} {} {}", ctx.name, parts.method, parts.uri).into_response()
}

#[derive(Clone)]
struct WsCtx {
    seen: Arc<Mutex<Vec<Seen>>>,
    closed: Arc<AtomicUsize>,
}

/// Mock websocket backend: echoes text and binary, answers `"bye"` with a
/// close frame (code 4000, reason "done"), and answers `"burst N"` with N
/// text frames `"frame 0"`.. followed by that same close frame.
pub struct WsBackend {
    pub port: u16,
    pub seen: Arc<Mutex<Vec<Seen>>>,
    pub closed: Arc<AtomicUsize>,
}

impl WsBackend {
    pub async fn start() -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicUsize::new(0));
        let ctx = WsCtx {
            seen: seen.clone(),
            closed: closed.clone(),
        };
        let app = Router::new().fallback(ws_handler).with_state(ctx);
        let port = serve(app).await;
        Self { port, seen, closed }
    }

    pub fn last(&self) -> Seen {
        self.seen.lock().last().cloned().expect("backend saw no upgrade")
    }

    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn ws_handler(
    State(ctx): State<WsCtx>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    ctx.seen.lock().push(Seen {
        method: "GET".into(),
        uri: uri.to_string(),
        host: header_string(&headers, header::HOST),
        cookie: header_string(&headers, header::COOKIE),
        body: String::new(),
    });

    let closed = ctx.closed.clone();
    ws.on_upgrade(move |mut socket| async move {
        while let Some(Ok(message)) = socket.recv().await {
            if let Message::Text(text) = &message {
                let burst = text
                    .as_str()
                    .strip_prefix("burst ")
                    .and_then(|n| n.parse::<usize>().ok());
                if let Some(count) = burst {
                    for i in 0..count {
                        let frame = Message::Text(format!("frame {}", i).into());
                        if socket.send(frame).await.is_err() {
                            break;
                        }
                    }
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: 4000,
                            reason: "done".into(),
                        })))
                        .await;
                    break;
                }
                if text.as_str() == "bye" {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: 4000,
                            reason: "done".into(),
                        })))
                        .await;
                    break;
                }
            }
            match message {
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
                other => {
                    if socket.send(other).await.is_err() {
                        break;
                    }
                }
            }
        }
        closed.fetch_add(1, Ordering::SeqCst);
    })
}

async fn serve(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

/// A local port with nothing listening on it.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// A proxy running on an ephemeral port with a throwaway backend file.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    pub backends_file: PathBuf,
    shutdown: Shutdown,
    _dir: TempDir,
}

impl TestProxy {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut ProxyConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backends_file = dir.path().join("code.toml");

        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.backends.host = "127.0.0.1".into();
        config.backends.file = backends_file.to_string_lossy().into_owned();
        config.health_check.timeout_ms = 500;
        configure(&mut config);

        let bootstrap = prepare(&config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(bootstrap.server.run(listener, server_shutdown));

        Self {
            addr,
            registry: bootstrap.registry,
            backends_file,
            shutdown,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Poll the backend file until `predicate` holds or two seconds pass.
    pub async fn wait_for_file(&self, predicate: impl Fn(&str) -> bool) -> String {
        for _ in 0..100 {
            if let Ok(contents) = std::fs::read_to_string(&self.backends_file) {
                if predicate(&contents) {
                    return contents;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        std::fs::read_to_string(&self.backends_file).unwrap_or_default()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
