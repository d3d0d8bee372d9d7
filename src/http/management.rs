//! Management endpoints: health reports, registration and removal.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prost::Message;
use serde::Deserialize;

use crate::health::status::{
    collect, CodeServerStatus, HealthCheck, HealthcheckResponse, PublicBase,
};
use crate::http::error::ProxyError;
use crate::http::request::public_host;
use crate::http::server::AppState;
use crate::observability::metrics;

pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

fn public_base(state: &AppState, headers: &HeaderMap) -> PublicBase {
    PublicBase::new(&*state.public_scheme, public_host(headers))
}

/// `GET /` and `GET /healthcheck`: JSON report of every backend.
pub async fn healthcheck(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<HealthcheckResponse> {
    let reports = collect(&state.health, state.registry.backends()).await;
    Json(HealthcheckResponse::from_reports(
        &reports,
        &public_base(&state, &headers),
    ))
}

/// `GET /status`: protobuf report of every backend.
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let reports = collect(&state.health, state.registry.backends()).await;
    let report = HealthCheck::from_reports(&reports, &public_base(&state, &headers));
    protobuf(report.encode_to_vec())
}

/// `GET /status/{alias}`: protobuf report of one backend.
pub async fn backend_status(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let backend = state
        .registry
        .get(&alias)
        .ok_or_else(|| ProxyError::NotFound(format!("Project {} does not exist", alias)))?;
    let reports = collect(&state.health, vec![backend]).await;
    let base = public_base(&state, &headers);
    let report = reports
        .first()
        .map(|r| CodeServerStatus::from_report(r, &base))
        .unwrap_or_default();
    Ok(protobuf(report.encode_to_vec()))
}

fn protobuf(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], body).into_response()
}

/// Body of `POST /register`. The port arrives as a decimal string.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub folder: String,
    pub name: String,
    pub port: String,
}

impl RegisterRequest {
    /// Check the fields and parse the port.
    pub fn validate(&self) -> Result<u16, ProxyError> {
        let port = match self.port.trim().parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => {
                return Err(ProxyError::Decode(format!(
                    "Invalid port {:?}",
                    self.port
                )))
            }
        };
        if self.name.is_empty() || self.name.contains('/') {
            return Err(ProxyError::Decode(format!("Invalid name {:?}", self.name)));
        }
        if !self.folder.starts_with('/') {
            return Err(ProxyError::Decode(format!(
                "Folder must be an absolute path, got {:?}",
                self.folder
            )));
        }
        Ok(port)
    }
}

/// `POST /register`: add a backend.
pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ProxyError> {
    let request: RegisterRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::Decode(format!("Invalid register body: {}", e)))?;
    let port = request.validate()?;

    state
        .registry
        .register(request.folder, request.name, port)?;
    metrics::record_backends(state.registry.len());
    Ok(StatusCode::OK)
}

/// `DELETE /remove/{alias}`: drop a backend.
pub async fn remove(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<StatusCode, ProxyError> {
    state.registry.remove(&alias)?;
    metrics::record_backends(state.registry.len());
    Ok(StatusCode::NO_CONTENT)
}
