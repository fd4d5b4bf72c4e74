/// Signals raised by committed transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayrollEvent {
    /// A record reached `AuditPassed`; its financial effect is still to be applied.
    AuditPassed { record_id: u64, staff_id: u64 },
}

impl PayrollEvent {
    pub fn record_id(&self) -> u64 {
        match self {
            PayrollEvent::AuditPassed { record_id, .. } => *record_id,
        }
    }
}
