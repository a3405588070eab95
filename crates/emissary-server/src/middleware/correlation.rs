//! Middleware que propaga o genera el Correlation-ID.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
};
use emissary_core::{CorrelationId, correlation};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Header name for the correlation id, matched case-insensitively.
pub static CORRELATION_HEADER: HeaderName = HeaderName::from_static("correlation-id");

/// Layer that scopes every request to a correlation id.
#[derive(Clone, Default)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware that takes the correlation id from the request, or generates
/// one, runs the inner service inside its scope and echoes it on the
/// response.
///
/// The id is also stored in the request extensions as a [`CorrelationId`].
#[derive(Clone)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for CorrelationIdMiddleware<S>
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

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        // Blank or non-UTF-8 values count as absent
        let id = request
            .headers()
            .get(&CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(CorrelationId::from)
            .unwrap_or_else(CorrelationId::generate);

        request.extensions_mut().insert(id.clone());

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let echoed = HeaderValue::from_str(id.as_str()).ok();
            let mut response = correlation::scope(id, async move { inner.call(request).await }).await?;

            if let Some(value) = echoed {
                response
                    .headers_mut()
                    .insert(CORRELATION_HEADER.clone(), value);
            }

            Ok(response)
        })
    }
}

// Unit tests are in tests/middleware_test.rs to avoid complex type bounds
// with tower::service_fn and async functions.
