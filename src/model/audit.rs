use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::payroll::PayrollStatus;

/// The user a transition is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub user_id: u64,
    pub display_name: String,
    pub contact: Option<String>,
}

/// One immutable line of the audit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditTrailEntry {
    pub id: u64,
    pub record_id: u64,
    pub serial_number: String,
    pub previous_status: PayrollStatus,
    pub new_status: PayrollStatus,
    pub actor_id: u64,
    pub actor_display_name: String,
    pub actor_contact: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    pub memo: Option<String>,
}

/// Ledger line before the store has assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub record_id: u64,
    pub serial_number: String,
    pub previous_status: PayrollStatus,
    pub new_status: PayrollStatus,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    pub memo: Option<String>,
}

#[cfg(test)]
impl NewAuditEntry {
    pub fn into_entry(self, id: u64) -> AuditTrailEntry {
        AuditTrailEntry {
            id,
            record_id: self.record_id,
            serial_number: self.serial_number,
            previous_status: self.previous_status,
            new_status: self.new_status,
            actor_id: self.actor.user_id,
            actor_display_name: self.actor.display_name,
            actor_contact: self.actor.contact,
            timestamp: self.timestamp,
            memo: self.memo,
        }
    }
}
