pub mod payroll;
pub mod staff;

use actix_web::{HttpRequest, error::JsonPayloadError, error::QueryPayloadError};

use crate::error::PayrollError;
use crate::payroll::PayrollService;
use crate::store::mysql::MySqlStore;

pub type Service = PayrollService<MySqlStore>;

/// Malformed bodies (unknown kind, wrong types) surface as validation errors.
pub fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    PayrollError::validation("invalid_payload", err.to_string()).into()
}

pub fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    PayrollError::validation("invalid_query", err.to_string()).into()
}
