//! Middleware stack para el servidor HTTP.
//!
//! Este modulo contiene los middleware de Tower que se aplican a todas las requests:
//! - `CorrelationIdLayer`: Genera/propaga Correlation-ID y lo deja en el contexto del request
//! - `LoggingLayer`: Logging estructurado de requests y header X-Response-Time

mod correlation;
mod logging;

pub use correlation::{CORRELATION_HEADER, CorrelationIdLayer, CorrelationIdMiddleware};
pub use logging::{LoggingLayer, LoggingMiddleware, RESPONSE_TIME_HEADER};
