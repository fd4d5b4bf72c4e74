//! Persistence boundary.
//!
//! Reads that need no isolation hang off [`PayrollStore`]; everything that must commit
//! together goes through a [`StoreTx`] obtained from [`PayrollStore::begin`]. Dropping a
//! transaction without calling [`StoreTx::commit`] discards all of its writes.

pub mod mysql;

#[cfg(test)]
pub mod memory;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::audit::{AuditTrailEntry, NewAuditEntry};
use crate::model::payroll::{PayrollKind, PayrollRecord, PayrollStatus, RecordFilter};
use crate::model::serial::SerialNumber;
use crate::model::staff::Staff;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(10).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// Release bookkeeping written when an expense record is paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    pub user_id: u64,
    pub at: DateTime<Utc>,
}

pub trait PayrollStore: Send + Sync {
    type Tx<'a>: StoreTx + 'a
    where
        Self: 'a;

    async fn begin(&self) -> StoreResult<Self::Tx<'_>>;

    async fn find_record(&self, id: u64) -> StoreResult<Option<PayrollRecord>>;

    async fn list_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> StoreResult<(Vec<PayrollRecord>, i64)>;

    /// Ledger lines for one record, oldest first.
    async fn audit_trail(&self, record_id: u64) -> StoreResult<Vec<AuditTrailEntry>>;

    async fn find_staff(&self, id: u64) -> StoreResult<Option<Staff>>;

    /// Active staff with no live record of `kind` for the period.
    async fn staff_without_record(
        &self,
        kind: PayrollKind,
        year: i32,
        month: u32,
        page: Page,
    ) -> StoreResult<Vec<Staff>>;

    /// Keyset page over minted serials, ordered by insertion, strictly after `after_id`.
    async fn serial_chunk(&self, after_id: u64, limit: u32) -> StoreResult<Vec<(u64, String)>>;
}

pub trait StoreTx {
    /// Inserts under the unique constraint. `Ok(false)` means the value was already taken.
    async fn insert_serial(&mut self, serial: &SerialNumber) -> StoreResult<bool>;

    /// Locks the staff row until the transaction ends.
    async fn find_staff(&mut self, id: u64) -> StoreResult<Option<Staff>>;

    /// Any non-deleted basic record for the period that was not rejected or cancelled.
    async fn basic_record_exists(&mut self, staff_id: u64, year: i32, month: u32)
    -> StoreResult<bool>;

    /// Returns the id assigned by storage.
    async fn insert_record(&mut self, record: &PayrollRecord) -> StoreResult<u64>;

    /// Reads a record and holds it against concurrent writers until the unit ends.
    async fn lock_record(&mut self, id: u64) -> StoreResult<Option<PayrollRecord>>;

    /// Persists the editable columns (amount, snapshots, period, memo, title).
    async fn update_record_fields(&mut self, record: &PayrollRecord) -> StoreResult<()>;

    async fn update_status(
        &mut self,
        id: u64,
        status: PayrollStatus,
        audit_memo: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn append_audit(&mut self, entry: &NewAuditEntry) -> StoreResult<u64>;

    async fn mark_released(&mut self, id: u64, release: Release) -> StoreResult<()>;

    /// Stamps the settlement token only if the record is approved and not yet settled.
    async fn claim_settlement(
        &mut self,
        id: u64,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// In-place increment of the staff totals; never a read-then-write.
    /// Returns `false` when no staff row matched.
    async fn increment_staff_totals(
        &mut self,
        staff_id: u64,
        balance_delta: Decimal,
        expenditure_delta: Decimal,
    ) -> StoreResult<bool>;

    async fn commit(self) -> StoreResult<()>;
}
