//! Error handling for the stock ledger server
//!
//! Provides consistent error responses in English and Portuguese

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::error::CoreError;
use thiserror::Error;

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_pt: String,
    },

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_pt: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Persistence failures abort the whole transaction
    #[error("Database error: {0}")]
    DatabaseError(#[source] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Validation error from a core validation message
    pub fn invalid(field: &str, message: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_pt: format!("Valor inválido para {}", field),
        }
    }
}

impl AppError {
    /// Conflict raised by a unique index
    pub fn unique_violation(constraint: Option<&str>) -> Self {
        AppError::Conflict {
            resource: constraint.unwrap_or("record").to_string(),
            message: "A conflicting record already exists".to_string(),
            message_pt: "Já existe um registro conflitante".to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return AppError::unique_violation(db.constraint());
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Invalid { field, message } => AppError::invalid(field, message),
            CoreError::QuantityOverflow(code) => AppError::Validation {
                field: "quantity".to_string(),
                message: format!("Quantity out of range for {}", code),
                message_pt: format!("Quantidade fora do intervalo para {}", code),
            },
            CoreError::LinkNotFound(id) => AppError::NotFound(format!("Component link {}", id)),
            CoreError::LinkInactive(id) => AppError::Conflict {
                resource: "component_link".to_string(),
                message: format!("Component link {} is inactive", id),
                message_pt: format!("O vínculo de componente {} está inativo", id),
            },
            CoreError::DuplicateLink {
                parent,
                component,
                version,
            } => AppError::Conflict {
                resource: "component_link".to_string(),
                message: format!("An active link {} -> {} ({}) already exists", parent, component, version),
                message_pt: format!("Já existe um vínculo ativo {} -> {} ({})", parent, component, version),
            },
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_pt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Validation { field, message, message_pt } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: message.clone(),
                    message_pt: message_pt.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::Conflict { resource, message, message_pt } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONFLICT".to_string(),
                    message_en: message.clone(),
                    message_pt: message_pt.clone(),
                    field: Some(resource.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message_en: format!("{} not found", resource),
                    message_pt: format!("{} não encontrado", resource),
                    field: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message_en: "A database error occurred".to_string(),
                    message_pt: "Ocorreu um erro no banco de dados".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: msg.clone(),
                    message_pt: "Erro interno do servidor".to_string(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: "An internal server error occurred".to_string(),
                    message_pt: "Erro interno do servidor".to_string(),
                    field: None,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
