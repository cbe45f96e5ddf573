//! HTTP Front-End
//!
//! Serves the store over HTTP/1.1:
//!
//! | Route                  | Action                                      |
//! |------------------------|---------------------------------------------|
//! | `PUT /store/{name}`    | write and publish the request body          |
//! | `GET /store/{name}`    | read the object back                        |
//! | `GET /stat/{name}`     | JSON description of the object              |
//! | `POST /repair`         | reconcile and rebuild, JSON report          |
//! | `GET /metrics`         | prometheus text format                      |
//! | `GET /healthz` etc.    | liveness and readiness                      |
//!
//! Engine calls do blocking file I/O and run on tokio's blocking pool.

use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::store::StripeStore;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";
const APPLICATION_JSON: &str = "application/json";

// =============================================================================
// Server Loop
// =============================================================================

/// Accept connections on `addr` until the listener fails
pub async fn run_server(addr: &str, store: Arc<StripeStore>) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Store listening on {}", addr);

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let store = Arc::clone(&store);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let store = Arc::clone(&store);
                async move { Ok::<_, Infallible>(route(store, req).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(peer = %peer, "Connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Dispatch one request against the store
pub async fn route<B>(store: Arc<StripeStore>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, %path, "Request");

    if let Some(raw) = path.strip_prefix("/store/") {
        let name = match decode_name(raw) {
            Ok(name) => name,
            Err(response) => return response,
        };
        return match method {
            Method::PUT => {
                let body = match req.into_body().collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) => {
                        return text(StatusCode::BAD_REQUEST, format!("unreadable body: {}", e))
                    }
                };
                match blocking(move || store.put(&name, &body)).await {
                    Ok(published) => {
                        info!(content_name = %published.content_name, "Stored object");
                        text(StatusCode::OK, "ok")
                    }
                    Err(e) => error_response(e),
                }
            }
            Method::GET => match blocking(move || store.get(&name)).await {
                Ok(data) => respond(StatusCode::OK, OCTET_STREAM, data),
                Err(e) => error_response(e),
            },
            _ => text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        };
    }

    if let Some(raw) = path.strip_prefix("/stat/") {
        if method != Method::GET {
            return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }
        let name = match decode_name(raw) {
            Ok(name) => name,
            Err(response) => return response,
        };
        return match blocking(move || store.stat(&name)).await {
            Ok(info) => json(&info),
            Err(e) => error_response(e),
        };
    }

    match (method, path.as_str()) {
        (Method::POST, "/repair") => match blocking(move || store.repair()).await {
            Ok(report) => json(&report),
            Err(e) => error_response(e),
        },
        (Method::GET, "/healthz" | "/livez" | "/readyz") => text(StatusCode::OK, "ok"),
        (Method::GET, "/metrics") => match store.metrics().encode_text() {
            Ok((content_type, buffer)) => {
                let mut response = respond(StatusCode::OK, TEXT_PLAIN, buffer);
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => error_response(e),
        },
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Store task failed: {}", e)))?
}

#[allow(clippy::result_large_err)]
fn decode_name(raw: &str) -> std::result::Result<String, Response<Full<Bytes>>> {
    urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .map_err(|e| text(StatusCode::BAD_REQUEST, format!("bad name encoding: {}", e)))
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    respond(status, TEXT_PLAIN, body.into())
}

fn json<T: Serialize>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, APPLICATION_JSON, body),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("encoding failed: {}", e)),
    }
}

fn error_response(err: Error) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.is_client_error() {
        debug!(status = status.as_u16(), "Request rejected: {}", err);
    } else {
        error!(status = status.as_u16(), "Request failed: {}", err);
    }
    text(status, err.to_string())
}

// =============================================================================
// Tests
// =============================================================================
