//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with management routes and the proxy fallback
//! - Wire up middleware (request ID, tracing)
//! - Bind server to listener, stop on shutdown signal
//! - Dispatch proxied requests to the forwarder or the tunnel

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::health::HealthChecker;
use crate::http::request::{is_upgrade_request, request_id};
use crate::http::{forward, management, websocket};
use crate::observability::metrics;
use crate::routing::Registry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub health: HealthChecker,
    pub client: Client<HttpConnector, Body>,
    pub backend_host: Arc<str>,
    pub public_scheme: Arc<str>,
}

impl AppState {
    pub fn new(config: &ProxyConfig, registry: Arc<Registry>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            registry,
            health: HealthChecker::new(config.backends.host.clone(), &config.health_check),
            client,
            backend_host: Arc::from(config.backends.host.as_str()),
            public_scheme: Arc::from(config.public.scheme.as_str()),
        }
    }
}

/// The proxy's HTTP front door.
pub struct ProxyServer {
    router: Router,
}

impl ProxyServer {
    pub fn new(config: &ProxyConfig, registry: Arc<Registry>) -> Self {
        let state = AppState::new(config, registry);
        Self {
            router: Self::build_router(state),
        }
    }

    /// Management routes answer their own method; every other request,
    /// including other methods on those paths, goes to the proxy.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(management::healthcheck).fallback(dispatch))
            .route("/healthcheck", get(management::healthcheck).fallback(dispatch))
            .route("/status", get(management::status).fallback(dispatch))
            .route("/status/{alias}", get(management::backend_status).fallback(dispatch))
            .route("/register", post(management::register).fallback(dispatch))
            .route("/remove/{alias}", delete(management::remove).fallback(dispatch))
            .fallback(dispatch)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = %request_id(request.headers()),
                            )
                        },
                    ))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining");
            })
            .await?;

        tracing::info!("Proxy stopped");
        Ok(())
    }
}

/// Proxy handler: tunnel upgrade requests, forward everything else.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let upgrade = is_upgrade_request(request.headers());
    let id = request_id(request.headers()).to_string();

    let (kind, result) = if upgrade {
        ("tunnel", websocket::tunnel(state, request, id).await)
    } else {
        ("forward", forward::forward(&state, request, &id).await)
    };

    let response = result.unwrap_or_else(IntoResponse::into_response);
    metrics::record_request(kind, response.status().as_u16(), start);
    response
}
