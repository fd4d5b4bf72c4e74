use std::fmt;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::model::payroll::PayrollStatus;
use crate::payroll::machine::Trigger;

/// Failures surfaced by the persistence boundary.
#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),

    /// Stored data that cannot be mapped back onto the domain types.
    Corrupt(String),

    /// Raised by the in-memory store when a test asks it to fail.
    #[cfg(test)]
    Injected(&'static str),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {e}"),
            StoreError::Corrupt(detail) => write!(f, "corrupt row: {detail}"),
            #[cfg(test)]
            StoreError::Injected(what) => write!(f, "injected failure: {what}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

#[derive(Debug, Display)]
pub enum PayrollError {
    #[display(fmt = "{}", message)]
    Validation { code: &'static str, message: String },

    #[display(fmt = "trigger {} is not allowed from state {}", trigger, from)]
    IllegalTransition {
        from: PayrollStatus,
        trigger: Trigger,
    },

    #[display(fmt = "payroll record {} not found", _0)]
    RecordNotFound(u64),

    #[display(fmt = "staff {} not found", _0)]
    StaffNotFound(u64),

    #[display(fmt = "serial number generation exhausted after {} attempts", attempts)]
    SerialExhausted { attempts: usize },

    #[display(
        fmt = "batch aborted after {} record(s): record {} failed: {}",
        succeeded,
        record_id,
        source
    )]
    BatchAborted {
        succeeded: usize,
        record_id: u64,
        source: Box<PayrollError>,
    },

    #[display(fmt = "{}", _0)]
    Storage(StoreError),
}

impl PayrollError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        PayrollError::Validation {
            code,
            message: message.into(),
        }
    }

    /// Stable machine-readable code returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            PayrollError::Validation { code, .. } => *code,
            PayrollError::IllegalTransition { .. } => "illegal_transition",
            PayrollError::RecordNotFound(_) => "record_not_found",
            PayrollError::StaffNotFound(_) => "staff_not_found",
            PayrollError::SerialExhausted { .. } => "serial_exhausted",
            PayrollError::BatchAborted { .. } => "batch_aborted",
            PayrollError::Storage(_) => "storage_error",
        }
    }

    /// Errors meant for operators rather than the person who made the request.
    pub fn is_internal(&self) -> bool {
        match self {
            PayrollError::SerialExhausted { .. } | PayrollError::Storage(_) => true,
            PayrollError::BatchAborted { source, .. } => source.is_internal(),
            _ => false,
        }
    }
}

impl std::error::Error for PayrollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PayrollError::BatchAborted { source, .. } => Some(source.as_ref()),
            PayrollError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for PayrollError {
    fn from(e: StoreError) -> Self {
        PayrollError::Storage(e)
    }
}

impl From<sqlx::Error> for PayrollError {
    fn from(e: sqlx::Error) -> Self {
        PayrollError::Storage(StoreError::Database(e))
    }
}

impl ResponseError for PayrollError {
    fn status_code(&self) -> StatusCode {
        match self {
            PayrollError::Validation { .. } => StatusCode::BAD_REQUEST,
            PayrollError::IllegalTransition { .. } => StatusCode::CONFLICT,
            PayrollError::RecordNotFound(_) | PayrollError::StaffNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            PayrollError::BatchAborted { source, .. } => source.status_code(),
            PayrollError::SerialExhausted { .. } | PayrollError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_internal() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
            return HttpResponse::build(self.status_code()).json(json!({
                "error": self.code(),
                "message": "Internal Server Error"
            }));
        }

        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let PayrollError::BatchAborted {
            succeeded,
            record_id,
            ..
        } = self
        {
            body["succeeded"] = json!(succeeded);
            body["failed_record_id"] = json!(record_id);
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}
