use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, MySqlPool, Transaction};
use uuid::Uuid;

use super::{Page, PayrollStore, Release, StoreResult, StoreTx};
use crate::error::StoreError;
use crate::model::audit::{AuditTrailEntry, NewAuditEntry};
use crate::model::payroll::{Direction, PayrollKind, PayrollRecord, PayrollStatus, RecordFilter};
use crate::model::serial::SerialNumber;
use crate::model::staff::Staff;

const RECORD_COLUMNS: &str = r#"
    id, serial_number, staff_id, staff_code, full_name, phone, amount, direction, kind,
    status, title, memo, audit_memo, year, month, day, basic_salary, staff_hourly_wage,
    hourly_wage, work_hours, is_released, release_user_id, released_at, settlement_token,
    settled_at, is_deleted, created_by, created_at, updated_at
"#;

const STAFF_COLUMNS: &str = r#"
    id, staff_code, full_name, phone, basic_salary, hourly_wage, account_balance,
    account_total_expenditure, is_deleted
"#;

/// MySQL reports every integrity violation, duplicates included, under this SQLSTATE.
const INTEGRITY_VIOLATION: &str = "23000";

#[derive(FromRow)]
struct PayrollRow {
    id: u64,
    serial_number: String,
    staff_id: u64,
    staff_code: String,
    full_name: String,
    phone: Option<String>,
    amount: Decimal,
    direction: u8,
    kind: u8,
    status: u8,
    title: String,
    memo: Option<String>,
    audit_memo: Option<String>,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    basic_salary: Option<Decimal>,
    staff_hourly_wage: Option<Decimal>,
    hourly_wage: Option<Decimal>,
    work_hours: Option<u32>,
    is_released: Option<bool>,
    release_user_id: Option<u64>,
    released_at: Option<DateTime<Utc>>,
    settlement_token: Option<String>,
    settled_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    created_by: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PayrollRow> for PayrollRecord {
    type Error = StoreError;

    fn try_from(row: PayrollRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, code: u8| {
            StoreError::Corrupt(format!("payroll record {}: unknown {what} {code}", row.id))
        };

        let direction = Direction::from_repr(row.direction)
            .ok_or_else(|| corrupt("direction", row.direction))?;
        let kind = PayrollKind::from_repr(row.kind).ok_or_else(|| corrupt("kind", row.kind))?;
        let status =
            PayrollStatus::from_repr(row.status).ok_or_else(|| corrupt("status", row.status))?;
        let settlement_token = row
            .settlement_token
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| {
                StoreError::Corrupt(format!("payroll record {}: bad settlement token: {e}", row.id))
            })?;

        Ok(PayrollRecord {
            id: row.id,
            serial_number: row.serial_number,
            staff_id: row.staff_id,
            staff_code: row.staff_code,
            full_name: row.full_name,
            phone: row.phone,
            amount: row.amount,
            direction,
            kind,
            status,
            title: row.title,
            memo: row.memo,
            audit_memo: row.audit_memo,
            year: row.year,
            month: row.month,
            day: row.day,
            basic_salary: row.basic_salary,
            staff_hourly_wage: row.staff_hourly_wage,
            hourly_wage: row.hourly_wage,
            work_hours: row.work_hours,
            is_released: row.is_released,
            release_user_id: row.release_user_id,
            released_at: row.released_at,
            settlement_token,
            settled_at: row.settled_at,
            is_deleted: row.is_deleted,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: u64,
    record_id: u64,
    serial_number: String,
    previous_status: u8,
    new_status: u8,
    actor_id: u64,
    actor_display_name: String,
    actor_contact: Option<String>,
    timestamp: DateTime<Utc>,
    memo: Option<String>,
}

impl TryFrom<AuditRow> for AuditTrailEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let status = |code: u8| {
            PayrollStatus::from_repr(code).ok_or_else(|| {
                StoreError::Corrupt(format!("audit entry {}: unknown status {code}", row.id))
            })
        };
        let previous_status = status(row.previous_status)?;
        let new_status = status(row.new_status)?;

        Ok(AuditTrailEntry {
            id: row.id,
            record_id: row.record_id,
            serial_number: row.serial_number,
            previous_status,
            new_status,
            actor_id: row.actor_id,
            actor_display_name: row.actor_display_name,
            actor_contact: row.actor_contact,
            timestamp: row.timestamp,
            memo: row.memo,
        })
    }
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    U8(u8),
    Bool(bool),
}

fn filter_clause(filter: &RecordFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE is_deleted = FALSE");
    let mut args = Vec::new();

    if let Some(staff_id) = filter.staff_id {
        where_sql.push_str(" AND staff_id = ?");
        args.push(FilterValue::U64(staff_id));
    }
    if let Some(status) = filter.status {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::U8(status as u8));
    }
    if let Some(kind) = filter.kind {
        where_sql.push_str(" AND kind = ?");
        args.push(FilterValue::U8(kind as u8));
    }
    if let Some(direction) = filter.direction {
        where_sql.push_str(" AND direction = ?");
        args.push(FilterValue::U8(direction as u8));
    }
    if let Some(is_released) = filter.is_released {
        if is_released {
            where_sql.push_str(" AND is_released = ?");
            args.push(FilterValue::Bool(true));
        } else {
            where_sql.push_str(" AND (is_released = FALSE OR is_released IS NULL)");
        }
    }

    (where_sql, args)
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl PayrollStore for MySqlStore {
    type Tx<'a> = MySqlTx;

    async fn begin(&self) -> StoreResult<Self::Tx<'_>> {
        Ok(MySqlTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn find_record(&self, id: u64) -> StoreResult<Option<PayrollRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM payroll_records WHERE id = ? AND is_deleted = FALSE"
        );
        sqlx::query_as::<_, PayrollRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(PayrollRecord::try_from)
            .transpose()
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> StoreResult<(Vec<PayrollRecord>, i64)> {
        let (where_sql, args) = filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM payroll_records{where_sql}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::U8(v) => count_q.bind(*v),
                FilterValue::Bool(v) => count_q.bind(*v),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT {RECORD_COLUMNS} FROM payroll_records{where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        let mut data_q = sqlx::query_as::<_, PayrollRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::U8(v) => data_q.bind(v),
                FilterValue::Bool(v) => data_q.bind(v),
            };
        }
        let rows = data_q
            .bind(page.per_page)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .map(PayrollRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((records, total))
    }

    async fn audit_trail(&self, record_id: u64) -> StoreResult<Vec<AuditTrailEntry>> {
        sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, record_id, serial_number, previous_status, new_status, actor_id,
                   actor_display_name, actor_contact, timestamp, memo
            FROM payroll_audit_trail
            WHERE record_id = ?
            ORDER BY id
            "#,
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AuditTrailEntry::try_from)
        .collect()
    }

    async fn find_staff(&self, id: u64) -> StoreResult<Option<Staff>> {
        let sql = format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?");
        Ok(sqlx::query_as::<_, Staff>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn staff_without_record(
        &self,
        kind: PayrollKind,
        year: i32,
        month: u32,
        page: Page,
    ) -> StoreResult<Vec<Staff>> {
        let sql = format!(
            r#"
            SELECT {STAFF_COLUMNS}
            FROM staff s
            WHERE s.is_deleted = FALSE
              AND NOT EXISTS (
                SELECT 1 FROM payroll_records p
                WHERE p.staff_id = s.id
                  AND p.kind = ?
                  AND p.year = ?
                  AND p.month = ?
                  AND p.is_deleted = FALSE
                  AND p.status NOT IN (?, ?)
              )
            ORDER BY s.id
            LIMIT ? OFFSET ?
            "#
        );
        Ok(sqlx::query_as::<_, Staff>(&sql)
            .bind(kind as u8)
            .bind(year)
            .bind(month)
            .bind(PayrollStatus::AuditRejected as u8)
            .bind(PayrollStatus::Cancelled as u8)
            .bind(page.per_page)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn serial_chunk(&self, after_id: u64, limit: u32) -> StoreResult<Vec<(u64, String)>> {
        Ok(sqlx::query_as::<_, (u64, String)>(
            "SELECT id, value FROM serial_numbers WHERE id > ? ORDER BY id LIMIT ?",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

pub struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

impl StoreTx for MySqlTx {
    async fn insert_serial(&mut self, serial: &SerialNumber) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO serial_numbers (value, purpose, created_at) VALUES (?, ?, ?)",
        )
        .bind(&serial.value)
        .bind(&serial.purpose)
        .bind(serial.created_at)
        .execute(&mut *self.tx)
        .await;

        // A failed statement is rolled back on its own; the transaction stays usable.
        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(INTEGRITY_VIOLATION) =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_staff(&mut self, id: u64) -> StoreResult<Option<Staff>> {
        let sql = format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ? FOR UPDATE");
        Ok(sqlx::query_as::<_, Staff>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn basic_record_exists(
        &mut self,
        staff_id: u64,
        year: i32,
        month: u32,
    ) -> StoreResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM payroll_records
                WHERE staff_id = ? AND kind = ? AND year = ? AND month = ?
                  AND is_deleted = FALSE AND status NOT IN (?, ?)
            )
            "#,
        )
        .bind(staff_id)
        .bind(PayrollKind::Basic as u8)
        .bind(year)
        .bind(month)
        .bind(PayrollStatus::AuditRejected as u8)
        .bind(PayrollStatus::Cancelled as u8)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(found != 0)
    }

    async fn insert_record(&mut self, record: &PayrollRecord) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO payroll_records
                (serial_number, staff_id, staff_code, full_name, phone, amount, direction,
                 kind, status, title, memo, audit_memo, year, month, day, basic_salary,
                 staff_hourly_wage, hourly_wage, work_hours, is_released, is_deleted,
                 created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.serial_number)
        .bind(record.staff_id)
        .bind(&record.staff_code)
        .bind(&record.full_name)
        .bind(&record.phone)
        .bind(record.amount)
        .bind(record.direction as u8)
        .bind(record.kind as u8)
        .bind(record.status as u8)
        .bind(&record.title)
        .bind(&record.memo)
        .bind(&record.audit_memo)
        .bind(record.year)
        .bind(record.month)
        .bind(record.day)
        .bind(record.basic_salary)
        .bind(record.staff_hourly_wage)
        .bind(record.hourly_wage)
        .bind(record.work_hours)
        .bind(record.is_released)
        .bind(record.is_deleted)
        .bind(record.created_by)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.last_insert_id())
    }

    async fn lock_record(&mut self, id: u64) -> StoreResult<Option<PayrollRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM payroll_records WHERE id = ? AND is_deleted = FALSE FOR UPDATE"
        );
        sqlx::query_as::<_, PayrollRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(PayrollRecord::try_from)
            .transpose()
    }

    async fn update_record_fields(&mut self, record: &PayrollRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE payroll_records
            SET amount = ?, title = ?, memo = ?, year = ?, month = ?, day = ?,
                hourly_wage = ?, work_hours = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.amount)
        .bind(&record.title)
        .bind(&record.memo)
        .bind(record.year)
        .bind(record.month)
        .bind(record.day)
        .bind(record.hourly_wage)
        .bind(record.work_hours)
        .bind(record.updated_at)
        .bind(record.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_status(
        &mut self,
        id: u64,
        status: PayrollStatus,
        audit_memo: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE payroll_records
            SET status = ?, audit_memo = COALESCE(?, audit_memo), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status as u8)
        .bind(audit_memo)
        .bind(at)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_audit(&mut self, entry: &NewAuditEntry) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO payroll_audit_trail
                (record_id, serial_number, previous_status, new_status, actor_id,
                 actor_display_name, actor_contact, timestamp, memo)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.record_id)
        .bind(&entry.serial_number)
        .bind(entry.previous_status as u8)
        .bind(entry.new_status as u8)
        .bind(entry.actor.user_id)
        .bind(&entry.actor.display_name)
        .bind(&entry.actor.contact)
        .bind(entry.timestamp)
        .bind(&entry.memo)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.last_insert_id())
    }

    async fn mark_released(&mut self, id: u64, release: Release) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE payroll_records
            SET is_released = TRUE, release_user_id = ?, released_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(release.user_id)
        .bind(release.at)
        .bind(release.at)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn claim_settlement(
        &mut self,
        id: u64,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payroll_records
            SET settlement_token = ?, settled_at = ?
            WHERE id = ? AND status = ? AND settled_at IS NULL
            "#,
        )
        .bind(token.to_string())
        .bind(at)
        .bind(id)
        .bind(PayrollStatus::AuditPassed as u8)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_staff_totals(
        &mut self,
        staff_id: u64,
        balance_delta: Decimal,
        expenditure_delta: Decimal,
    ) -> StoreResult<bool> {
        // sqlx connects with CLIENT_FOUND_ROWS, so a zero delta still counts the row.
        let result = sqlx::query(
            r#"
            UPDATE staff
            SET account_balance = account_balance + ?,
                account_total_expenditure = account_total_expenditure + ?
            WHERE id = ?
            "#,
        )
        .bind(balance_delta)
        .bind(expenditure_delta)
        .bind(staff_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> StoreResult<()> {
        Ok(self.tx.commit().await?)
    }
}
