//! Applies an approved record's amount to its staff member's running totals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::events::PayrollEvent;
use crate::error::PayrollError;
use crate::model::payroll::{Direction, PayrollStatus};
use crate::store::{PayrollStore, StoreTx};
use crate::utils::settled_cache::SettledCache;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled {
        #[schema(value_type = String)]
        token: Uuid,
    },
    AlreadySettled,
    NotApproved,
    RecordMissing,
    /// Nothing was written; the record stays unsettled so it can be replayed.
    StaffMissing,
}

pub struct SettlementReconciler {
    settled: SettledCache,
}

impl SettlementReconciler {
    pub fn new(settled: SettledCache) -> Self {
        Self { settled }
    }

    pub async fn handle<S: PayrollStore>(
        &self,
        store: &S,
        event: &PayrollEvent,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, PayrollError> {
        match event {
            PayrollEvent::AuditPassed { record_id, .. } => self.settle(store, *record_id, now).await,
        }
    }

    /// Applies the record's effect at most once, however often it is called.
    #[tracing::instrument(name = "settle_record", skip(self, store, now))]
    pub async fn settle<S: PayrollStore>(
        &self,
        store: &S,
        record_id: u64,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, PayrollError> {
        if self.settled.is_settled(record_id).await {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let mut tx = store.begin().await?;
        let Some(record) = tx.lock_record(record_id).await? else {
            tracing::warn!(record_id, "settlement requested for unknown record");
            return Ok(SettlementOutcome::RecordMissing);
        };
        if record.is_settled() {
            self.settled.mark_settled(record_id).await;
            return Ok(SettlementOutcome::AlreadySettled);
        }
        if record.status != PayrollStatus::AuditPassed {
            tracing::warn!(record_id, status = %record.status, "settlement requested before approval");
            return Ok(SettlementOutcome::NotApproved);
        }

        let token = Uuid::new_v4();
        if !tx.claim_settlement(record_id, token, now).await? {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let (balance, expenditure) = match record.direction {
            Direction::Income => (record.amount, Decimal::ZERO),
            Direction::Expense => (-record.amount, record.amount),
        };
        if !tx
            .increment_staff_totals(record.staff_id, balance, expenditure)
            .await?
        {
            tracing::error!(
                anomaly = "staff_missing",
                record_id,
                staff_id = record.staff_id,
                serial = %record.serial_number,
                amount = %record.amount,
                "settlement target missing, manual reconciliation required"
            );
            return Ok(SettlementOutcome::StaffMissing);
        }
        tx.commit().await?;
        self.settled.mark_settled(record_id).await;

        tracing::info!(
            record_id,
            staff_id = record.staff_id,
            direction = %record.direction,
            amount = %record.amount,
            %token,
            "record settled"
        );
        Ok(SettlementOutcome::Settled { token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payroll::{PayrollKind, PayrollRecord};
    use crate::payroll::derive::tests::{blank, dec, staff};
    use crate::store::memory::MemoryStore;

    fn reconciler() -> SettlementReconciler {
        SettlementReconciler::new(SettledCache::new(100))
    }

    fn now() -> DateTime<Utc> {
        "2026-10-01T09:00:00Z".parse().unwrap()
    }

    async fn seed(store: &MemoryStore, record: PayrollRecord) -> u64 {
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_record(&record).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    fn approved(kind: PayrollKind, amount: &str) -> PayrollRecord {
        let mut record = blank(kind);
        record.serial_number = format!("GZ-{kind}-{amount}");
        record.direction = kind.direction();
        record.amount = dec(amount);
        record.status = PayrollStatus::AuditPassed;
        record
    }

    #[actix_web::test]
    async fn expense_lowers_balance_and_raises_expenditure() {
        let store = MemoryStore::new();
        let mut s = staff("5000", "50", "1000");
        s.account_total_expenditure = dec("200");
        store.put_staff(s).await;
        let id = seed(&store, approved(PayrollKind::Advance, "300.00")).await;

        let outcome = reconciler().settle(&store, id, now()).await.unwrap();

        assert!(matches!(outcome, SettlementOutcome::Settled { .. }));
        let s = store.staff(7).await.unwrap();
        assert_eq!(s.account_balance, dec("700"));
        assert_eq!(s.account_total_expenditure, dec("500"));
        let record = store.record(id).await.unwrap();
        assert_eq!(record.settled_at, Some(now()));
        assert!(record.settlement_token.is_some());
    }

    #[actix_web::test]
    async fn income_raises_balance_only() {
        let store = MemoryStore::new();
        store.put_staff(staff("5000", "50", "-800")).await;
        let id = seed(&store, approved(PayrollKind::Bonus, "1000.00")).await;

        reconciler().settle(&store, id, now()).await.unwrap();

        let s = store.staff(7).await.unwrap();
        assert_eq!(s.account_balance, dec("200"));
        assert_eq!(s.account_total_expenditure, Decimal::ZERO);
    }

    #[actix_web::test]
    async fn redelivery_does_not_double_count() {
        let store = MemoryStore::new();
        store.put_staff(staff("5000", "50", "1000")).await;
        let id = seed(&store, approved(PayrollKind::Advance, "300.00")).await;
        let event = PayrollEvent::AuditPassed {
            record_id: id,
            staff_id: 7,
        };

        let first = reconciler();
        first.handle(&store, &event, now()).await.unwrap();
        assert_eq!(
            first.handle(&store, &event, now()).await.unwrap(),
            SettlementOutcome::AlreadySettled
        );
        // A fresh reconciler has an empty cache and must rely on the stored guard.
        assert_eq!(
            reconciler().handle(&store, &event, now()).await.unwrap(),
            SettlementOutcome::AlreadySettled
        );

        assert_eq!(store.staff(7).await.unwrap().account_balance, dec("700"));
    }

    #[actix_web::test]
    async fn unapproved_records_are_left_alone() {
        let store = MemoryStore::new();
        store.put_staff(staff("5000", "50", "1000")).await;
        let mut record = approved(PayrollKind::Advance, "300.00");
        record.status = PayrollStatus::Unaudited;
        let id = seed(&store, record).await;

        assert_eq!(
            reconciler().settle(&store, id, now()).await.unwrap(),
            SettlementOutcome::NotApproved
        );
        assert_eq!(
            reconciler().settle(&store, 999, now()).await.unwrap(),
            SettlementOutcome::RecordMissing
        );
        assert_eq!(store.staff(7).await.unwrap().account_balance, dec("1000"));
    }

    #[actix_web::test]
    async fn missing_staff_leaves_record_replayable() {
        let store = MemoryStore::new();
        let id = seed(&store, approved(PayrollKind::Advance, "300.00")).await;
        let reconciler = reconciler();

        assert_eq!(
            reconciler.settle(&store, id, now()).await.unwrap(),
            SettlementOutcome::StaffMissing
        );
        assert!(!store.record(id).await.unwrap().is_settled());

        store.put_staff(staff("5000", "50", "1000")).await;
        let outcome = reconciler.settle(&store, id, now()).await.unwrap();
        assert!(matches!(outcome, SettlementOutcome::Settled { .. }));
        assert_eq!(store.staff(7).await.unwrap().account_balance, dec("700"));
    }

    #[actix_web::test]
    async fn staff_removed_after_approval_rolls_back_the_claim() {
        let store = MemoryStore::new();
        store.put_staff(staff("5000", "50", "1000")).await;
        let id = seed(&store, approved(PayrollKind::Bonus, "400.00")).await;
        store.remove_staff(7).await;

        assert_eq!(
            reconciler().settle(&store, id, now()).await.unwrap(),
            SettlementOutcome::StaffMissing
        );
        let record = store.record(id).await.unwrap();
        assert!(record.settlement_token.is_none());
        assert!(record.settled_at.is_none());
    }

    #[actix_web::test]
    async fn zero_amount_record_still_settles() {
        let store = MemoryStore::new();
        store.put_staff(staff("5000", "50", "1000")).await;
        let id = seed(&store, approved(PayrollKind::Basic, "0.00")).await;

        let outcome = reconciler().settle(&store, id, now()).await.unwrap();

        assert!(matches!(outcome, SettlementOutcome::Settled { .. }));
        assert_eq!(store.staff(7).await.unwrap().account_balance, dec("1000"));
    }
}
