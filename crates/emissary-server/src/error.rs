use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use emissary_core::EmissaryError;
use serde::Serialize;
use thiserror::Error;

/// Errores devueltos por los handlers HTTP.
#[derive(Debug, Error)]
pub enum AppError {
    /// Entrada invalida
    #[error("{0}")]
    BadRequest(String),

    /// Entidad no encontrada
    #[error("{0}")]
    NotFound(String),

    /// No hay cache worker alcanzable
    #[error("{0}")]
    Unavailable(String),

    /// El cache worker no respondio a tiempo
    #[error("{0}")]
    GatewayTimeout(String),

    /// El cache worker respondio con un fallo
    #[error("{message}")]
    Upstream { code: u16, message: String },

    /// Error interno
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EmissaryError> for AppError {
    fn from(error: EmissaryError) -> Self {
        match error {
            EmissaryError::InvalidEntity(_) | EmissaryError::InvalidHeader { .. } => {
                AppError::BadRequest(error.to_string())
            },
            EmissaryError::Timeout { .. } => AppError::GatewayTimeout(error.to_string()),
            EmissaryError::NoHandlers { .. } | EmissaryError::ReplyLost { .. } => {
                AppError::Unavailable(error.to_string())
            },
            EmissaryError::RecipientFailure { code, message } => AppError::Upstream { code, message },
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = status.canonical_reason().unwrap_or("Error").to_string();

        let body = Json(ErrorResponse {
            error,
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (EmissaryError::InvalidEntity("x".into()), StatusCode::BAD_REQUEST),
            (EmissaryError::timeout("add.to.cache", 5), StatusCode::GATEWAY_TIMEOUT),
            (EmissaryError::no_handlers("add.to.cache"), StatusCode::SERVICE_UNAVAILABLE),
            (EmissaryError::reply_lost("add.to.cache"), StatusCode::SERVICE_UNAVAILABLE),
            (EmissaryError::recipient_failure(404, "gone"), StatusCode::NOT_FOUND),
            (EmissaryError::recipient_failure(500, "boom"), StatusCode::INTERNAL_SERVER_ERROR),
            (EmissaryError::internal("oops"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            let label = error.to_string();
            assert_eq!(AppError::from(error).status(), expected, "error: {label}");
        }
    }

    #[test]
    fn test_out_of_range_code_is_internal() {
        let error = AppError::Upstream {
            code: 42,
            message: "weird".into(),
        };

        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_recipient_message_is_kept() {
        let error = AppError::from(EmissaryError::recipient_failure(
            500,
            "transformation 'random-age' failed: field 'age' must be an integer",
        ));

        assert!(error.to_string().starts_with("transformation 'random-age'"));
    }
}
