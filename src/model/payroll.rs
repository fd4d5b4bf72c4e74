use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, FromRepr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Money owed to the staff member (income) or paid out to them (expense).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Income = 1,
    Expense = 2,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayrollKind {
    Advance = 1,
    Basic = 2,
    Overtime = 3,
    Bonus = 4,
    Hourly = 5,
    Disbursement = 6,
    Performance = 7,
    Commission = 8,
    Other = 99,
}

impl PayrollKind {
    /// Advances and disbursements move money out; everything else is owed to the staff.
    pub fn direction(self) -> Direction {
        match self {
            PayrollKind::Advance | PayrollKind::Disbursement => Direction::Expense,
            _ => Direction::Income,
        }
    }

    /// Kinds whose title is not tied to a pay period.
    pub fn is_period_free(self) -> bool {
        matches!(self, PayrollKind::Advance | PayrollKind::Disbursement)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayrollStatus {
    Unaudited = 1,
    AuditPassed = 2,
    PendingCorrection = 3,
    Corrected = 4,
    AuditRejected = 5,
    Cancelled = 6,
}

impl PayrollStatus {
    #[cfg(test)]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PayrollStatus::AuditPassed | PayrollStatus::AuditRejected | PayrollStatus::Cancelled
        )
    }

    /// Descriptive fields may only change before an auditor has signed off.
    pub fn is_editable(self) -> bool {
        matches!(
            self,
            PayrollStatus::Unaudited | PayrollStatus::PendingCorrection
        )
    }
}

/// Year / month / optional day a record is booked against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Period {
    #[schema(example = 2026)]
    pub year: Option<i32>,
    #[schema(example = 9)]
    pub month: Option<u32>,
    #[schema(example = 15)]
    pub day: Option<u32>,
}

impl Period {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayrollRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "GZ4820193385710264")]
    pub serial_number: String,
    pub staff_id: u64,
    #[schema(example = "EMP-001")]
    pub staff_code: String,
    pub full_name: String,
    pub phone: Option<String>,
    #[schema(value_type = String, example = "4200.00")]
    pub amount: Decimal,
    pub direction: Direction,
    pub kind: PayrollKind,
    pub status: PayrollStatus,
    pub title: String,
    pub memo: Option<String>,
    pub audit_memo: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    #[schema(value_type = Option<String>)]
    pub basic_salary: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub staff_hourly_wage: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub hourly_wage: Option<Decimal>,
    pub work_hours: Option<u32>,
    pub is_released: Option<bool>,
    pub release_user_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub released_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub settlement_token: Option<Uuid>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub settled_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl PayrollRecord {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

/// Caller input for a new record; amounts and snapshots are filled in by derivation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPayrollRecord {
    #[schema(example = 1001)]
    pub staff_id: u64,
    #[schema(example = "basic")]
    pub kind: PayrollKind,
    /// Requested amount; ignored for hourly records, capped for basic ones.
    #[schema(value_type = Option<String>, example = "5000.00")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub period: Period,
    #[schema(value_type = Option<String>, example = "50.00")]
    pub hourly_wage: Option<Decimal>,
    #[schema(example = 10)]
    pub work_hours: Option<u32>,
    pub memo: Option<String>,
}

/// Fields an editor may touch while the record is still editable.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PayrollPatch {
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub hourly_wage: Option<Decimal>,
    pub work_hours: Option<u32>,
    pub memo: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

/// One line of a bulk basic-salary payout.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BasicDisbursement {
    pub staff_id: u64,
    #[schema(value_type = String, example = "4200.00")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RecordFilter {
    pub staff_id: Option<u64>,
    pub status: Option<PayrollStatus>,
    pub kind: Option<PayrollKind>,
    pub direction: Option<Direction>,
    pub is_released: Option<bool>,
}
