//! Payroll lifecycle operations: creation, editing, approval, release and settlement.
//!
//! Every write runs inside one store transaction. Settlement of approved records is
//! dispatched only after the transition that approved them has committed.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use super::derive::{Derivation, derive_fields};
use super::events::PayrollEvent;
use super::machine::{Trigger, check_memo, next_status};
use super::settlement::{SettlementOutcome, SettlementReconciler};
use crate::clock::Clock;
use crate::error::PayrollError;
use crate::model::audit::{Actor, AuditTrailEntry, NewAuditEntry};
use crate::model::payroll::{
    BasicDisbursement, Direction, NewPayrollRecord, PayrollKind, PayrollPatch, PayrollRecord,
    PayrollStatus, Period, RecordFilter,
};
use crate::model::serial::SerialSpec;
use crate::model::staff::{Staff, UndisbursedStaff};
use crate::serial::{SerialFilter, SerialNumberGenerator};
use crate::store::{Page, PayrollStore, Release, StoreTx};

pub struct PayrollService<S> {
    store: S,
    serials: SerialNumberGenerator,
    reconciler: SettlementReconciler,
    clock: Arc<dyn Clock>,
    batch_limit: usize,
}

impl<S: PayrollStore> PayrollService<S> {
    pub fn new(
        store: S,
        serials: SerialNumberGenerator,
        reconciler: SettlementReconciler,
        clock: Arc<dyn Clock>,
        batch_limit: usize,
    ) -> Self {
        Self {
            store,
            serials,
            reconciler,
            clock,
            batch_limit,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn serial_filter(&self) -> &SerialFilter {
        self.serials.filter()
    }

    #[instrument(
        name = "create_payroll_record",
        skip(self, input, actor),
        fields(staff_id = input.staff_id, kind = %input.kind, user_id = actor.user_id)
    )]
    pub async fn create_record(
        &self,
        input: NewPayrollRecord,
        actor: &Actor,
    ) -> Result<PayrollRecord, PayrollError> {
        let now = self.clock.now();
        let period = default_period(input.kind, input.period, now);

        let mut tx = self.store.begin().await?;
        let staff = active_staff(&mut tx, input.staff_id).await?;

        let requested = match input.kind {
            PayrollKind::Basic => input.amount.unwrap_or(staff.basic_salary),
            _ => input.amount.unwrap_or(Decimal::ZERO),
        };
        let mut record = draft(&staff, input.kind, period, actor, now);
        record.amount = requested;
        record.hourly_wage = input.hourly_wage;
        record.work_hours = input.work_hours;
        record.memo = clean(input.memo);

        derive_fields(&mut record, Derivation::Create(&staff))?;
        ensure_no_basic(&mut tx, &record).await?;

        record.serial_number = self
            .serials
            .next(&mut tx, &SerialSpec::payroll_record(), now)
            .await?;
        record.id = tx.insert_record(&record).await?;
        tx.commit().await?;

        info!(
            record_id = record.id,
            serial = %record.serial_number,
            amount = %record.amount,
            "Payroll record created"
        );
        Ok(record)
    }

    #[instrument(name = "update_payroll_record", skip(self, patch, actor), fields(user_id = actor.user_id))]
    pub async fn update_record(
        &self,
        id: u64,
        patch: PayrollPatch,
        actor: &Actor,
    ) -> Result<PayrollRecord, PayrollError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut record = tx
            .lock_record(id)
            .await?
            .ok_or(PayrollError::RecordNotFound(id))?;

        if !record.status.is_editable() {
            return Err(PayrollError::validation(
                "record_not_editable",
                format!("a record in state {} can no longer be edited", record.status),
            ));
        }

        let previous_period = record.period();
        if let Some(amount) = patch.amount {
            if record.kind == PayrollKind::Hourly {
                return Err(PayrollError::validation(
                    "amount_is_derived",
                    "hourly amounts follow from wage and hours",
                ));
            }
            record.amount = amount;
        }
        if patch.hourly_wage.is_some() || patch.work_hours.is_some() {
            if record.kind != PayrollKind::Hourly {
                return Err(PayrollError::validation(
                    "not_hourly",
                    "wage and hours only apply to hourly records",
                ));
            }
            record.hourly_wage = patch.hourly_wage.or(record.hourly_wage);
            record.work_hours = patch.work_hours.or(record.work_hours);
        }
        if patch.memo.is_some() {
            record.memo = clean(patch.memo);
        }
        record.year = patch.year.or(record.year);
        record.month = patch.month.or(record.month);
        record.day = patch.day.or(record.day);
        record.updated_at = now;

        derive_fields(&mut record, Derivation::Edit)?;

        if record.kind == PayrollKind::Basic {
            let staff = tx
                .find_staff(record.staff_id)
                .await?
                .ok_or(PayrollError::StaffNotFound(record.staff_id))?;
            check_basic_amount(&staff, record.amount)?;
            if record.period() != previous_period {
                ensure_no_basic(&mut tx, &record).await?;
            }
        }

        tx.update_record_fields(&record).await?;
        tx.commit().await?;

        info!(record_id = id, amount = %record.amount, "Payroll record updated");
        Ok(record)
    }

    /// Fires one trigger. The status change and its ledger line commit together.
    #[instrument(
        name = "transition_payroll_record",
        skip(self, memo, actor),
        fields(trigger = %trigger, user_id = actor.user_id)
    )]
    pub async fn transition(
        &self,
        id: u64,
        trigger: Trigger,
        memo: Option<&str>,
        actor: &Actor,
    ) -> Result<PayrollRecord, PayrollError> {
        let memo = check_memo(trigger, memo)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let record = apply_transition(&mut tx, id, trigger, memo.as_deref(), actor, now).await?;
        tx.commit().await?;

        info!(record_id = id, status = %record.status, "Payroll record transitioned");

        if record.status == PayrollStatus::AuditPassed {
            self.dispatch(approval(&record)).await;
            return match self.store.find_record(id).await {
                Ok(settled) => Ok(settled.unwrap_or(record)),
                Err(e) => {
                    warn!(record_id = id, error = %e, "Failed to reload approved record");
                    Ok(record)
                }
            };
        }
        Ok(record)
    }

    /// All-or-nothing: the first failing record aborts the whole batch.
    #[instrument(
        name = "transition_payroll_batch",
        skip(self, ids, memo, actor),
        fields(trigger = %trigger, size = ids.len(), user_id = actor.user_id)
    )]
    pub async fn transition_batch(
        &self,
        ids: &[u64],
        trigger: Trigger,
        memo: Option<&str>,
        actor: &Actor,
    ) -> Result<Vec<PayrollRecord>, PayrollError> {
        let ids = self.check_batch(ids)?;
        let memo = check_memo(trigger, memo)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let mut records = Vec::with_capacity(ids.len());
        for (succeeded, &id) in ids.iter().enumerate() {
            let record = apply_transition(&mut tx, id, trigger, memo.as_deref(), actor, now)
                .await
                .map_err(|source| {
                    warn!(record_id = id, succeeded, error = %source, "Payroll batch aborted");
                    PayrollError::BatchAborted {
                        succeeded,
                        record_id: id,
                        source: Box::new(source),
                    }
                })?;
            records.push(record);
        }
        tx.commit().await?;

        info!(count = records.len(), "Payroll batch transitioned");

        if trigger == Trigger::Approve {
            for record in &records {
                self.dispatch(approval(record)).await;
            }
        }
        Ok(records)
    }

    /// Marks approved expense records as paid out. Not a status transition, so no
    /// ledger line is written.
    #[instrument(name = "release_payroll_records", skip(self, ids, actor), fields(size = ids.len(), user_id = actor.user_id))]
    pub async fn release(
        &self,
        ids: &[u64],
        actor: &Actor,
    ) -> Result<Vec<PayrollRecord>, PayrollError> {
        let ids = self.check_batch(ids)?;
        let release = Release {
            user_id: actor.user_id,
            at: self.clock.now(),
        };

        let mut tx = self.store.begin().await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let mut record = tx
                .lock_record(id)
                .await?
                .ok_or(PayrollError::RecordNotFound(id))?;

            let releasable = record.direction == Direction::Expense
                && record.status == PayrollStatus::AuditPassed
                && record.is_released == Some(false);
            if !releasable {
                return Err(PayrollError::validation(
                    "illegal_release",
                    format!(
                        "record {} must be an approved, unreleased expense to be released",
                        record.serial_number
                    ),
                ));
            }

            tx.mark_released(id, release).await?;
            record.is_released = Some(true);
            record.release_user_id = Some(release.user_id);
            record.released_at = Some(release.at);
            record.updated_at = release.at;
            records.push(record);
        }
        tx.commit().await?;

        for record in &records {
            info!(record_id = record.id, serial = %record.serial_number, amount = %record.amount, "Payroll record released");
        }
        Ok(records)
    }

    /// Creates this month's basic salary records for several staff members at once.
    #[instrument(name = "disburse_basic_batch", skip(self, items, actor), fields(size = items.len(), user_id = actor.user_id))]
    pub async fn disburse_basic_batch(
        &self,
        items: &[BasicDisbursement],
        actor: &Actor,
    ) -> Result<Vec<PayrollRecord>, PayrollError> {
        if items.is_empty() {
            return Err(PayrollError::validation("empty_batch", "nothing to disburse"));
        }
        if items.len() > self.batch_limit {
            return Err(batch_too_large(self.batch_limit));
        }

        let now = self.clock.now();
        let period = Period {
            year: Some(now.year()),
            month: Some(now.month()),
            day: None,
        };
        let serials = self
            .serials
            .next_batch(&self.store, items.len(), &SerialSpec::payroll_record(), now)
            .await?;

        let mut tx = self.store.begin().await?;
        let mut records = Vec::with_capacity(items.len());
        for (item, serial) in items.iter().zip(serials) {
            let staff = active_staff(&mut tx, item.staff_id).await?;
            if item.amount <= Decimal::ZERO {
                return Err(PayrollError::validation(
                    "invalid_amount",
                    format!("amount for staff {} must be positive", staff.staff_code),
                ));
            }
            check_basic_amount(&staff, item.amount)?;

            let mut record = draft(&staff, PayrollKind::Basic, period, actor, now);
            record.amount = item.amount;
            derive_fields(&mut record, Derivation::Create(&staff))?;
            ensure_no_basic(&mut tx, &record).await?;

            record.serial_number = serial;
            record.id = tx.insert_record(&record).await?;
            records.push(record);
        }
        tx.commit().await?;

        info!(count = records.len(), "Basic salaries disbursed");
        Ok(records)
    }

    /// Staff still without a live `kind` record for the period, previous month by default.
    pub async fn list_undisbursed(
        &self,
        kind: PayrollKind,
        year: Option<i32>,
        month: Option<u32>,
        page: Page,
    ) -> Result<Vec<UndisbursedStaff>, PayrollError> {
        if !matches!(kind, PayrollKind::Basic | PayrollKind::Hourly) {
            return Err(PayrollError::validation(
                "unsupported_kind",
                format!("undisbursed listing is not available for {kind} records"),
            ));
        }
        let (year, month) = match (year, month) {
            (Some(year), Some(month)) if (1..=12).contains(&month) => (year, month),
            (None, None) => previous_month(self.clock.now()),
            _ => {
                return Err(PayrollError::validation(
                    "invalid_period",
                    "year and month must be given together",
                ));
            }
        };

        let staff = self
            .store
            .staff_without_record(kind, year, month, page)
            .await?;
        Ok(staff.into_iter().map(UndisbursedStaff::from).collect())
    }

    /// Re-delivers the approval effect of one record.
    #[instrument(name = "replay_settlement", skip(self))]
    pub async fn settle(&self, record_id: u64) -> Result<SettlementOutcome, PayrollError> {
        if self.store.find_record(record_id).await?.is_none() {
            return Err(PayrollError::RecordNotFound(record_id));
        }
        self.reconciler
            .settle(&self.store, record_id, self.clock.now())
            .await
    }

    pub async fn get_record(&self, id: u64) -> Result<PayrollRecord, PayrollError> {
        self.store
            .find_record(id)
            .await?
            .ok_or(PayrollError::RecordNotFound(id))
    }

    pub async fn list_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<(Vec<PayrollRecord>, i64), PayrollError> {
        Ok(self.store.list_records(filter, page).await?)
    }

    pub async fn audit_trail(&self, record_id: u64) -> Result<Vec<AuditTrailEntry>, PayrollError> {
        self.get_record(record_id).await?;
        Ok(self.store.audit_trail(record_id).await?)
    }

    pub async fn get_staff(&self, id: u64) -> Result<Staff, PayrollError> {
        self.store
            .find_staff(id)
            .await?
            .ok_or(PayrollError::StaffNotFound(id))
    }

    /// Settlement runs after the approving transaction has committed, so its failure
    /// cannot be reported to the caller. It is logged and can be replayed with [`Self::settle`].
    async fn dispatch(&self, event: PayrollEvent) {
        let record_id = event.record_id();
        match self
            .reconciler
            .handle(&self.store, &event, self.clock.now())
            .await
        {
            Ok(outcome) => tracing::debug!(record_id, ?outcome, "Settlement dispatched"),
            Err(e) => tracing::error!(error = %e, record_id, "Settlement dispatch failed"),
        }
    }

    fn check_batch(&self, ids: &[u64]) -> Result<Vec<u64>, PayrollError> {
        if ids.is_empty() {
            return Err(PayrollError::validation("empty_batch", "no records selected"));
        }
        if ids.len() > self.batch_limit {
            return Err(batch_too_large(self.batch_limit));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
    }
}

async fn apply_transition<T: StoreTx>(
    tx: &mut T,
    id: u64,
    trigger: Trigger,
    memo: Option<&str>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<PayrollRecord, PayrollError> {
    let mut record = tx
        .lock_record(id)
        .await?
        .ok_or(PayrollError::RecordNotFound(id))?;

    let previous = record.status;
    let next = next_status(previous, trigger).inspect_err(|e| {
        warn!(record_id = id, error = %e, "Illegal payroll transition");
    })?;

    let audit_memo = memo.filter(|_| trigger.requires_memo());
    tx.update_status(id, next, audit_memo, now).await?;
    tx.append_audit(&NewAuditEntry {
        record_id: id,
        serial_number: record.serial_number.clone(),
        previous_status: previous,
        new_status: next,
        actor: actor.clone(),
        timestamp: now,
        memo: memo.map(str::to_string),
    })
    .await?;

    record.status = next;
    if let Some(memo) = audit_memo {
        record.audit_memo = Some(memo.to_string());
    }
    record.updated_at = now;
    Ok(record)
}

async fn active_staff<T: StoreTx>(tx: &mut T, staff_id: u64) -> Result<Staff, PayrollError> {
    tx.find_staff(staff_id)
        .await?
        .filter(|s| !s.is_deleted)
        .ok_or(PayrollError::StaffNotFound(staff_id))
}

/// A basic salary may be booked once per staff member and month unless the earlier
/// one was rejected or cancelled.
async fn ensure_no_basic<T: StoreTx>(tx: &mut T, record: &PayrollRecord) -> Result<(), PayrollError> {
    if record.kind != PayrollKind::Basic {
        return Ok(());
    }
    let (Some(year), Some(month)) = (record.year, record.month) else {
        return Ok(());
    };
    if tx.basic_record_exists(record.staff_id, year, month).await? {
        return Err(PayrollError::validation(
            "duplicate_basic_salary",
            format!(
                "{} already has a basic salary record for {year}-{month:02}",
                record.full_name
            ),
        ));
    }
    Ok(())
}

fn check_basic_amount(staff: &Staff, amount: Decimal) -> Result<(), PayrollError> {
    let cap = staff.basic_salary_cap();
    if amount > cap {
        return Err(PayrollError::validation(
            "amount_exceeds_cap",
            format!("amount {amount} exceeds the basic salary ceiling {cap} for {}", staff.staff_code),
        ));
    }
    Ok(())
}

fn draft(
    staff: &Staff,
    kind: PayrollKind,
    period: Period,
    actor: &Actor,
    now: DateTime<Utc>,
) -> PayrollRecord {
    PayrollRecord {
        id: 0,
        serial_number: String::new(),
        staff_id: staff.id,
        staff_code: staff.staff_code.clone(),
        full_name: staff.full_name.clone(),
        phone: staff.phone.clone(),
        amount: Decimal::ZERO,
        direction: kind.direction(),
        kind,
        status: PayrollStatus::Unaudited,
        title: String::new(),
        memo: None,
        audit_memo: None,
        year: period.year,
        month: period.month,
        day: period.day,
        basic_salary: None,
        staff_hourly_wage: None,
        hourly_wage: None,
        work_hours: None,
        is_released: None,
        release_user_id: None,
        released_at: None,
        settlement_token: None,
        settled_at: None,
        is_deleted: false,
        created_by: actor.user_id,
        created_at: now,
        updated_at: now,
    }
}

fn approval(record: &PayrollRecord) -> PayrollEvent {
    PayrollEvent::AuditPassed {
        record_id: record.id,
        staff_id: record.staff_id,
    }
}

/// An empty period means "now"; a partial one is left for validation to reject.
fn default_period(kind: PayrollKind, period: Period, now: DateTime<Utc>) -> Period {
    if !period.is_empty() || kind.is_period_free() {
        return period;
    }
    Period {
        year: Some(now.year()),
        month: Some(now.month()),
        day: (kind == PayrollKind::Overtime).then(|| now.day()),
    }
}

fn previous_month(now: DateTime<Utc>) -> (i32, u32) {
    match now.month() {
        1 => (now.year() - 1, 12),
        m => (now.year(), m - 1),
    }
}

fn batch_too_large(limit: usize) -> PayrollError {
    PayrollError::validation(
        "batch_too_large",
        format!("at most {limit} records can be processed at once"),
    )
}

fn clean(memo: Option<String>) -> Option<String> {
    memo.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())
}
