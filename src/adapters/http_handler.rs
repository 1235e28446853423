use std::{
    future::{Future, IntoFuture},
    sync::Arc,
};

use axum::{
    body::Body,
    extract::Request as AxumRequest,
    http::{HeaderValue, StatusCode, header},
    response::Response as AxumResponse,
};
use eyre::{Result, WrapErr};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::{
    core::{
        Kernel,
        http::{Request, Response, parse_cookies},
    },
    tracing_setup::configure_component_tracing,
};

/// Largest request body the adapter buffers.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// HTTP adapter exposing an initialized [`Kernel`] through `axum`.
///
/// Every path and method goes to the kernel; routing is the kernel's job.
#[derive(Clone)]
pub struct HttpHandler {
    kernel: Arc<Kernel>,
    body_limit: usize,
}

impl HttpHandler {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self {
            kernel,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Build an `axum` router whose fallback hands every request to the kernel.
    pub fn into_router(self) -> axum::Router {
        let handler = Arc::new(self);
        axum::Router::new()
            .fallback(move |request: AxumRequest| {
                let handler = handler.clone();
                async move { handler.handle(request).await }
            })
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until `shutdown` resolves, then let in-flight requests finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to read listener address")?;
        tracing::info!("HTTP server listening on {}", local_addr);

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown)
            .into_future()
            .instrument(configure_component_tracing("http_server"))
            .await
            .wrap_err("HTTP server error")?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Convert, run through the kernel, convert back.
    pub async fn handle(&self, request: AxumRequest) -> AxumResponse {
        match self.to_kernel_request(request).await {
            Ok(request) => to_axum_response(self.kernel.handle_request(request).await),
            Err(response) => response,
        }
    }

    async fn to_kernel_request(&self, request: AxumRequest) -> Result<Request, AxumResponse> {
        let (parts, body) = request.into_parts();

        let bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to read request body: {}", e);
                plain_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            })?;

        let mut kernel_request = Request::new(parts.method, parts.uri.to_string());
        kernel_request.cookies = parse_cookies(&parts.headers);
        kernel_request.headers = parts.headers;
        kernel_request.body = parse_body(&bytes);
        Ok(kernel_request)
    }
}

/// JSON when it parses, text otherwise, `Null` when empty.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }

    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn to_axum_response(response: Response) -> AxumResponse {
    let Response {
        status,
        mut headers,
        body,
    } = response;

    let (bytes, content_type) = match body {
        Value::Null => (Vec::new(), None),
        Value::String(text) => (text.into_bytes(), Some("text/plain; charset=utf-8")),
        other => match serde_json::to_vec(&other) {
            Ok(bytes) => (bytes, Some("application/json")),
            Err(e) => {
                tracing::error!("Failed to serialize response body: {}", e);
                return plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                );
            }
        },
    };

    if let Some(content_type) = content_type {
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    let mut axum_response = AxumResponse::new(Body::from(bytes));
    *axum_response.status_mut() = status;
    *axum_response.headers_mut() = headers;
    axum_response
}

fn plain_response(status: StatusCode, message: &'static str) -> AxumResponse {
    let mut response = AxumResponse::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
