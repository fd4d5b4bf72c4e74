use chrono::{DateTime, Utc};
use serde::Serialize;

/// A minted identifier. Its presence in storage is what proves uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialNumber {
    pub value: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
}

/// Shape of the identifiers to mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSpec {
    pub prefix: String,
    pub purpose: String,
    pub total_length: usize,
    pub letter_count: usize,
}

impl SerialSpec {
    /// Payroll records: `GZ` followed by sixteen digits.
    pub fn payroll_record() -> Self {
        Self {
            prefix: "GZ".to_string(),
            purpose: "payroll_record".to_string(),
            total_length: 16,
            letter_count: 0,
        }
    }
}
