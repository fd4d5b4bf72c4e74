//! Payroll approval state machine.
//!
//! ```text
//! Unaudited ──approve──────────────► AuditPassed
//!     │  ├──request_correction──► PendingCorrection ──mark_corrected──► Corrected
//!     │  └──reject──────────────► AuditRejected                          │
//!     └──cancel──► Cancelled ◄──cancel── PendingCorrection / Corrected    │
//! Corrected accepts approve / request_correction / reject like Unaudited ◄┘
//! ```

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::PayrollError;
use crate::model::payroll::PayrollStatus;

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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    Approve,
    RequestCorrection,
    Reject,
    MarkCorrected,
    Cancel,
}

impl Trigger {
    /// Rejections and correction requests must tell the submitter why.
    pub fn requires_memo(self) -> bool {
        matches!(self, Trigger::Reject | Trigger::RequestCorrection)
    }

    /// Accepts both `request_correction` and the URL form `request-correction`.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.replace('-', "_").parse().ok()
    }
}

/// Destination of `trigger` fired from `from`, or an error naming both.
pub fn next_status(from: PayrollStatus, trigger: Trigger) -> Result<PayrollStatus, PayrollError> {
    use PayrollStatus::*;

    let to = match (from, trigger) {
        (Unaudited | Corrected, Trigger::Approve) => AuditPassed,
        (Unaudited | Corrected, Trigger::RequestCorrection) => PendingCorrection,
        (Unaudited | Corrected, Trigger::Reject) => AuditRejected,
        (PendingCorrection, Trigger::MarkCorrected) => Corrected,
        (Unaudited | PendingCorrection | Corrected, Trigger::Cancel) => Cancelled,
        _ => return Err(PayrollError::IllegalTransition { from, trigger }),
    };

    Ok(to)
}

/// Normalises the caller's memo and enforces it where the trigger demands one.
pub fn check_memo(trigger: Trigger, memo: Option<&str>) -> Result<Option<String>, PayrollError> {
    let memo = memo.map(str::trim).filter(|m| !m.is_empty());

    if trigger.requires_memo() && memo.is_none() {
        return Err(PayrollError::validation(
            "memo_required",
            format!("a reason is required to {trigger}"),
        ));
    }

    Ok(memo.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const LEGAL: &[(PayrollStatus, Trigger, PayrollStatus)] = &[
        (PayrollStatus::Unaudited, Trigger::Approve, PayrollStatus::AuditPassed),
        (PayrollStatus::Corrected, Trigger::Approve, PayrollStatus::AuditPassed),
        (PayrollStatus::Unaudited, Trigger::RequestCorrection, PayrollStatus::PendingCorrection),
        (PayrollStatus::Corrected, Trigger::RequestCorrection, PayrollStatus::PendingCorrection),
        (PayrollStatus::Unaudited, Trigger::Reject, PayrollStatus::AuditRejected),
        (PayrollStatus::Corrected, Trigger::Reject, PayrollStatus::AuditRejected),
        (PayrollStatus::PendingCorrection, Trigger::MarkCorrected, PayrollStatus::Corrected),
        (PayrollStatus::Unaudited, Trigger::Cancel, PayrollStatus::Cancelled),
        (PayrollStatus::PendingCorrection, Trigger::Cancel, PayrollStatus::Cancelled),
        (PayrollStatus::Corrected, Trigger::Cancel, PayrollStatus::Cancelled),
    ];

    #[test]
    fn every_listed_transition_is_accepted() {
        for &(from, trigger, to) in LEGAL {
            assert_eq!(next_status(from, trigger).ok(), Some(to), "{from} --{trigger}-->");
        }
    }

    #[test]
    fn every_unlisted_pair_is_illegal() {
        for from in PayrollStatus::iter() {
            for trigger in Trigger::iter() {
                if LEGAL.iter().any(|&(f, t, _)| f == from && t == trigger) {
                    continue;
                }
                match next_status(from, trigger) {
                    Err(PayrollError::IllegalTransition { from: f, trigger: t }) => {
                        assert_eq!((f, t), (from, trigger));
                    }
                    other => panic!("{from} --{trigger}--> should be illegal, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in PayrollStatus::iter().filter(|s| s.is_terminal()) {
            assert!(Trigger::iter().all(|t| next_status(from, t).is_err()));
        }
    }

    #[test]
    fn reject_needs_a_reason() {
        assert!(check_memo(Trigger::Reject, None).is_err());
        assert!(check_memo(Trigger::RequestCorrection, Some("   ")).is_err());
        assert_eq!(
            check_memo(Trigger::Reject, Some(" wrong month ")).unwrap(),
            Some("wrong month".to_string())
        );
        assert_eq!(check_memo(Trigger::Approve, None).unwrap(), None);
    }

    #[test]
    fn url_form_parses() {
        assert_eq!(Trigger::parse("request-correction"), Some(Trigger::RequestCorrection));
        assert_eq!(Trigger::parse("mark_corrected"), Some(Trigger::MarkCorrected));
        assert_eq!(Trigger::parse("audit"), None);
    }
}
