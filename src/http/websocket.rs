//! WebSocket tunnel to backends.
//!
//! # Responsibilities
//! - Resolve the backend for an upgrade request
//! - Dial the backend websocket before accepting the client
//! - Bidirectional message relay until either side ends
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket messages ────→ Proxy ←──── WebSocket messages ────→ Backend
//! ```
//!
//! # Design Decisions
//! - The backend is dialed first so a dead backend yields 502, not a
//!   half-open client socket
//! - Message-level forwarding, no buffering beyond one message
//! - Close frames are forwarded; ping/pong stay on their own leg
//! - The first leg to finish tears down both

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Body;
use axum::extract::ws::{CloseFrame as AxumCloseFrame, Message as AxumMessage, WebSocket};
use axum::extract::{FromRequestParts, WebSocketUpgrade};
use axum::http::{header, Request};
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tokio_tungstenite::{connect_async, WebSocketStream};

use crate::http::error::ProxyError;
use crate::http::request::{forwarded_cookies, referer_path, with_query};
use crate::http::server::AppState;
use crate::observability::metrics;

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of one tunnel session, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Which leg of the relay finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

/// Why a relay leg stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// Close frame forwarded, or the source stream ended.
    Closed,
    ReadFailed(String),
    WriteFailed(String),
}

impl fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEnd::Closed => write!(f, "closed"),
            RelayEnd::ReadFailed(e) => write!(f, "read failed: {}", e),
            RelayEnd::WriteFailed(e) => write!(f, "write failed: {}", e),
        }
    }
}

/// Handle an upgrade request by tunnelling it to the resolved backend.
pub async fn tunnel(
    state: AppState,
    request: Request<Body>,
    request_id: String,
) -> Result<Response, ProxyError> {
    let referer = referer_path(request.headers());
    let route = state
        .registry
        .route(request.uri().path(), referer.as_deref())?;
    let target = format!(
        "ws://{}:{}{}",
        state.backend_host,
        route.port,
        with_query(&route.path, request.uri().query())
    );
    let session = SessionId::new();

    tracing::info!(
        request_id = %request_id,
        session = %session,
        path = %request.uri().path(),
        backend = %target,
        "Received websocket connection request"
    );

    let mut backend_request = target
        .as_str()
        .into_client_request()
        .map_err(|e| ProxyError::UpstreamDial(e.to_string()))?;
    if let Some(cookie) = forwarded_cookies(request.headers()) {
        backend_request.headers_mut().insert(header::COOKIE, cookie);
    }
    let (mut backend, _) = connect_async(backend_request).await.map_err(|e| {
        tracing::warn!(
            request_id = %request_id,
            session = %session,
            error = %e,
            "Backend dial failed"
        );
        ProxyError::UpstreamDial(e.to_string())
    })?;

    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::warn!(
                request_id = %request_id,
                session = %session,
                "Client upgrade rejected"
            );
            let _ = backend.close(None).await;
            return Err(ProxyError::Upgrade(rejection.body_text()));
        }
    };

    let failed_id = request_id.clone();
    Ok(upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(
                request_id = %failed_id,
                session = %session,
                error = %e,
                "Client websocket upgrade failed"
            );
        })
        .on_upgrade(move |socket| async move {
            metrics::tunnel_opened();
            let (direction, end) = relay(socket, backend).await;
            metrics::tunnel_closed();
            tracing::info!(
                request_id = %request_id,
                session = %session,
                first = ?direction,
                reason = %end,
                "Websocket session closed"
            );
        }))
}

/// Pump messages both ways until one leg finishes, then stop the other.
///
/// Returns the leg that finished first and why.
pub async fn relay<B>(client: WebSocket, backend: WebSocketStream<B>) -> (Direction, RelayEnd)
where
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_tx, client_rx) = client.split();
    let (backend_tx, backend_rx) = backend.split();
    let (done_tx, mut done_rx) = mpsc::channel(2);

    let upstream = tokio::spawn(pump(
        client_rx,
        backend_tx,
        client_to_backend,
        Direction::ClientToBackend,
        done_tx.clone(),
    ));
    let downstream = tokio::spawn(pump(
        backend_rx,
        client_tx,
        backend_to_client,
        Direction::BackendToClient,
        done_tx,
    ));

    let first = done_rx
        .recv()
        .await
        .unwrap_or((Direction::ClientToBackend, RelayEnd::Closed));

    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;
    first
}

/// Outcome of translating one message for the other leg.
enum Relayed<T> {
    Data(T),
    Close(T),
    Skip,
}

async fn pump<S, K, In, Out, ReadErr, WriteErr>(
    mut source: S,
    mut sink: K,
    translate: fn(In) -> Relayed<Out>,
    direction: Direction,
    done: mpsc::Sender<(Direction, RelayEnd)>,
) where
    S: Stream<Item = Result<In, ReadErr>> + Unpin + Send + 'static,
    K: Sink<Out, Error = WriteErr> + Unpin + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
    ReadErr: fmt::Display + Send + 'static,
    WriteErr: fmt::Display + Send + 'static,
{
    let end = loop {
        let message = match source.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => break RelayEnd::ReadFailed(e.to_string()),
            None => break RelayEnd::Closed,
        };
        let (out, closing) = match translate(message) {
            Relayed::Data(out) => (out, false),
            Relayed::Close(out) => (out, true),
            Relayed::Skip => continue,
        };
        if let Err(e) = sink.send(out).await {
            break RelayEnd::WriteFailed(e.to_string());
        }
        if closing {
            break RelayEnd::Closed;
        }
    };
    tracing::debug!(direction = ?direction, reason = %end, "Relay leg finished");
    let _ = done.send((direction, end)).await;
}

fn client_to_backend(message: AxumMessage) -> Relayed<BackendMessage> {
    match message {
        AxumMessage::Text(text) => {
            Relayed::Data(BackendMessage::Text(text.as_str().to_owned().into()))
        }
        AxumMessage::Binary(data) => Relayed::Data(BackendMessage::Binary(data)),
        AxumMessage::Close(frame) => Relayed::Close(BackendMessage::Close(frame.map(|f| {
            BackendCloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.as_str().to_owned().into(),
            }
        }))),
        AxumMessage::Ping(_) | AxumMessage::Pong(_) => Relayed::Skip,
    }
}

fn backend_to_client(message: BackendMessage) -> Relayed<AxumMessage> {
    match message {
        BackendMessage::Text(text) => {
            Relayed::Data(AxumMessage::Text(text.as_str().to_owned().into()))
        }
        BackendMessage::Binary(data) => Relayed::Data(AxumMessage::Binary(data)),
        BackendMessage::Close(frame) => Relayed::Close(AxumMessage::Close(frame.map(|f| {
            AxumCloseFrame {
                code: u16::from(f.code),
                reason: f.reason.as_str().to_owned().into(),
            }
        }))),
        BackendMessage::Ping(_) | BackendMessage::Pong(_) | BackendMessage::Frame(_) => {
            Relayed::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("ws-"));
    }

    #[test]
    fn test_text_and_binary_cross_over() {
        match client_to_backend(AxumMessage::Text("hello".into())) {
            Relayed::Data(BackendMessage::Text(t)) => assert_eq!(t.as_str(), "hello"),
            _ => panic!("expected text"),
        }
        match backend_to_client(BackendMessage::Binary(vec![1u8, 2, 3].into())) {
            Relayed::Data(AxumMessage::Binary(b)) => assert_eq!(&b[..], &[1, 2, 3]),
            _ => panic!("expected binary"),
        }
    }

    #[test]
    fn test_close_keeps_code_and_reason() {
        let frame = AxumCloseFrame {
            code: 4001,
            reason: "bye".into(),
        };
        match client_to_backend(AxumMessage::Close(Some(frame))) {
            Relayed::Close(BackendMessage::Close(Some(f))) => {
                assert_eq!(u16::from(f.code), 4001);
                assert_eq!(f.reason.as_str(), "bye");
            }
            _ => panic!("expected close"),
        }
        match backend_to_client(BackendMessage::Close(None)) {
            Relayed::Close(AxumMessage::Close(None)) => {}
            _ => panic!("expected close"),
        }
    }

    #[test]
    fn test_control_frames_stay_local() {
        assert!(matches!(
            client_to_backend(AxumMessage::Ping(vec![1u8].into())),
            Relayed::Skip
        ));
        assert!(matches!(
            backend_to_client(BackendMessage::Pong(vec![1u8].into())),
            Relayed::Skip
        ));
    }
}
