//! Middleware de logging estructurado.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
};
use emissary_core::CorrelationId;
use std::{
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::{Instrument, info, info_span};

/// Header carrying the handling time, e.g. `12ms`.
pub static RESPONSE_TIME_HEADER: HeaderName = HeaderName::from_static("x-response-time");

/// Layer that logs requests and responses.
#[derive(Clone, Default)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingMiddleware { inner }
    }
}

/// Middleware that logs request/response details and sets `X-Response-Time`.
#[derive(Clone)]
pub struct LoggingMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for LoggingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        // Set by CorrelationIdMiddleware
        let correlation_id = request
            .extensions()
            .get::<CorrelationId>()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let span = info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
        );

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                info!("Request started");

                let mut response = inner.call(request).await?;

                let status = response.status().as_u16();
                let duration = start.elapsed();

                if let Ok(value) = HeaderValue::from_str(&format!("{}ms", duration.as_millis())) {
                    response
                        .headers_mut()
                        .insert(RESPONSE_TIME_HEADER.clone(), value);
                }

                info!(
                    status = status,
                    duration_ms = duration.as_millis() as u64,
                    "Request completed"
                );

                Ok(response)
            }
            .instrument(span),
        )
    }
}
