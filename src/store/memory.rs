//! In-memory persistence used by the unit tests.
//!
//! A transaction holds the store lock for its whole lifetime and works on a private copy
//! of the state, which replaces the shared state only on commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use futures::lock::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Page, PayrollStore, Release, StoreResult, StoreTx};
use crate::error::StoreError;
use crate::model::audit::{AuditTrailEntry, NewAuditEntry};
use crate::model::payroll::{PayrollKind, PayrollRecord, PayrollStatus, RecordFilter};
use crate::model::serial::SerialNumber;
use crate::model::staff::Staff;

#[derive(Debug, Clone, Default)]
pub struct MemState {
    pub staff: BTreeMap<u64, Staff>,
    pub records: BTreeMap<u64, PayrollRecord>,
    pub audit: Vec<AuditTrailEntry>,
    /// Serial value -> (insertion id, row).
    pub serials: BTreeMap<String, (u64, SerialNumber)>,
    next_record_id: u64,
    next_serial_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemState>,
    fail_audit_append: AtomicBool,
    fail_record_reads: AtomicBool,
    forced_collisions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_staff(&self, staff: Staff) {
        self.state.lock().await.staff.insert(staff.id, staff);
    }

    pub async fn remove_staff(&self, id: u64) {
        self.state.lock().await.staff.remove(&id);
    }

    pub async fn staff(&self, id: u64) -> Option<Staff> {
        self.state.lock().await.staff.get(&id).cloned()
    }

    pub async fn record(&self, id: u64) -> Option<PayrollRecord> {
        self.state.lock().await.records.get(&id).cloned()
    }

    pub async fn snapshot(&self) -> MemState {
        self.state.lock().await.clone()
    }

    /// Makes every subsequent ledger append fail.
    pub fn fail_audit_append(&self, fail: bool) {
        self.fail_audit_append.store(fail, Ordering::SeqCst);
    }

    /// Makes non-transactional record reads fail.
    pub fn fail_record_reads(&self, fail: bool) {
        self.fail_record_reads.store(fail, Ordering::SeqCst);
    }

    /// The next `n` serial inserts report a duplicate regardless of content.
    pub fn force_collisions(&self, n: usize) {
        self.forced_collisions.store(n, Ordering::SeqCst);
    }
}

impl PayrollStore for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    async fn begin(&self) -> StoreResult<Self::Tx<'_>> {
        let guard = self.state.lock().await;
        let work = guard.clone();
        Ok(MemoryTx {
            guard,
            work,
            store: self,
        })
    }

    async fn find_record(&self, id: u64) -> StoreResult<Option<PayrollRecord>> {
        if self.fail_record_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("find_record"));
        }
        Ok(self
            .state
            .lock()
            .await
            .records
            .get(&id)
            .filter(|r| !r.is_deleted)
            .cloned())
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> StoreResult<(Vec<PayrollRecord>, i64)> {
        let state = self.state.lock().await;
        let matching: Vec<_> = state
            .records
            .values()
            .rev()
            .filter(|r| !r.is_deleted)
            .filter(|r| filter.staff_id.is_none_or(|id| r.staff_id == id))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.kind.is_none_or(|k| r.kind == k))
            .filter(|r| filter.direction.is_none_or(|d| r.direction == d))
            .filter(|r| {
                filter
                    .is_released
                    .is_none_or(|want| r.is_released.unwrap_or(false) == want)
            })
            .cloned()
            .collect();

        let total = matching.len() as i64;
        let data = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect();
        Ok((data, total))
    }

    async fn audit_trail(&self, record_id: u64) -> StoreResult<Vec<AuditTrailEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .audit
            .iter()
            .filter(|e| e.record_id == record_id)
            .cloned()
            .collect())
    }

    async fn find_staff(&self, id: u64) -> StoreResult<Option<Staff>> {
        Ok(self.state.lock().await.staff.get(&id).cloned())
    }

    async fn staff_without_record(
        &self,
        kind: PayrollKind,
        year: i32,
        month: u32,
        page: Page,
    ) -> StoreResult<Vec<Staff>> {
        let state = self.state.lock().await;
        Ok(state
            .staff
            .values()
            .filter(|s| !s.is_deleted)
            .filter(|s| {
                !state.records.values().any(|r| {
                    r.staff_id == s.id
                        && r.kind == kind
                        && r.year == Some(year)
                        && r.month == Some(month)
                        && !r.is_deleted
                        && !matches!(
                            r.status,
                            PayrollStatus::AuditRejected | PayrollStatus::Cancelled
                        )
                })
            })
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .cloned()
            .collect())
    }

    async fn serial_chunk(&self, after_id: u64, limit: u32) -> StoreResult<Vec<(u64, String)>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .serials
            .values()
            .filter(|(id, _)| *id > after_id)
            .map(|(id, s)| (*id, s.value.clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

pub struct MemoryTx<'a> {
    guard: MutexGuard<'a, MemState>,
    work: MemState,
    store: &'a MemoryStore,
}

impl StoreTx for MemoryTx<'_> {
    async fn insert_serial(&mut self, serial: &SerialNumber) -> StoreResult<bool> {
        let forced = self
            .store
            .forced_collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced || self.work.serials.contains_key(&serial.value) {
            return Ok(false);
        }

        self.work.next_serial_id += 1;
        let id = self.work.next_serial_id;
        self.work
            .serials
            .insert(serial.value.clone(), (id, serial.clone()));
        Ok(true)
    }

    async fn find_staff(&mut self, id: u64) -> StoreResult<Option<Staff>> {
        Ok(self.work.staff.get(&id).cloned())
    }

    async fn basic_record_exists(
        &mut self,
        staff_id: u64,
        year: i32,
        month: u32,
    ) -> StoreResult<bool> {
        Ok(self.work.records.values().any(|r| {
            r.staff_id == staff_id
                && r.kind == PayrollKind::Basic
                && r.year == Some(year)
                && r.month == Some(month)
                && !r.is_deleted
                && !matches!(
                    r.status,
                    PayrollStatus::AuditRejected | PayrollStatus::Cancelled
                )
        }))
    }

    async fn insert_record(&mut self, record: &PayrollRecord) -> StoreResult<u64> {
        if self
            .work
            .records
            .values()
            .any(|r| r.serial_number == record.serial_number)
        {
            return Err(StoreError::Corrupt(format!(
                "duplicate serial number {}",
                record.serial_number
            )));
        }

        self.work.next_record_id += 1;
        let id = self.work.next_record_id;
        let mut stored = record.clone();
        stored.id = id;
        self.work.records.insert(id, stored);
        Ok(id)
    }

    async fn lock_record(&mut self, id: u64) -> StoreResult<Option<PayrollRecord>> {
        Ok(self
            .work
            .records
            .get(&id)
            .filter(|r| !r.is_deleted)
            .cloned())
    }

    async fn update_record_fields(&mut self, record: &PayrollRecord) -> StoreResult<()> {
        if let Some(stored) = self.work.records.get_mut(&record.id) {
            stored.amount = record.amount;
            stored.title = record.title.clone();
            stored.memo = record.memo.clone();
            stored.year = record.year;
            stored.month = record.month;
            stored.day = record.day;
            stored.hourly_wage = record.hourly_wage;
            stored.work_hours = record.work_hours;
            stored.updated_at = record.updated_at;
        }
        Ok(())
    }

    async fn update_status(
        &mut self,
        id: u64,
        status: PayrollStatus,
        audit_memo: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(stored) = self.work.records.get_mut(&id) {
            stored.status = status;
            if let Some(memo) = audit_memo {
                stored.audit_memo = Some(memo.to_string());
            }
            stored.updated_at = at;
        }
        Ok(())
    }

    async fn append_audit(&mut self, entry: &NewAuditEntry) -> StoreResult<u64> {
        if self.store.fail_audit_append.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("audit append"));
        }
        let id = self.work.audit.len() as u64 + 1;
        self.work.audit.push(entry.clone().into_entry(id));
        Ok(id)
    }

    async fn mark_released(&mut self, id: u64, release: Release) -> StoreResult<()> {
        if let Some(stored) = self.work.records.get_mut(&id) {
            stored.is_released = Some(true);
            stored.release_user_id = Some(release.user_id);
            stored.released_at = Some(release.at);
            stored.updated_at = release.at;
        }
        Ok(())
    }

    async fn claim_settlement(
        &mut self,
        id: u64,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.work.records.get_mut(&id) {
            Some(stored)
                if stored.status == PayrollStatus::AuditPassed && stored.settled_at.is_none() =>
            {
                stored.settlement_token = Some(token);
                stored.settled_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_staff_totals(
        &mut self,
        staff_id: u64,
        balance_delta: Decimal,
        expenditure_delta: Decimal,
    ) -> StoreResult<bool> {
        let Some(staff) = self.work.staff.get_mut(&staff_id) else {
            return Ok(false);
        };
        staff.account_balance += balance_delta;
        staff.account_total_expenditure += expenditure_delta;
        Ok(true)
    }

    async fn commit(mut self) -> StoreResult<()> {
        *self.guard = std::mem::take(&mut self.work);
        Ok(())
    }
}
