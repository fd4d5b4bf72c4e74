//! Derived fields of a payroll record: direction, amount overrides, snapshots and title.
//!
//! Creation and editing both go through [`derive_fields`] so the kind-specific rules live
//! in exactly one place.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::PayrollError;
use crate::model::payroll::{Direction, PayrollKind, PayrollRecord};
use crate::model::staff::Staff;

pub enum Derivation<'a> {
    /// First save: snapshot the staff's current pay rates onto the record.
    Create(&'a Staff),
    /// Later edits: recompute from the snapshots already on the record.
    Edit,
}

/// Largest value a `DECIMAL(10, 2)` column holds.
// Equals `Decimal::new(9_999_999_999, 2)`; `new` is not a const fn.
const MAX_MONEY: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// Two-decimal fixed scale used for every stored amount.
pub fn money(value: Decimal) -> Decimal {
    let mut value = value.round_dp(2);
    value.rescale(2);
    value
}

pub fn derive_fields(
    record: &mut PayrollRecord,
    derivation: Derivation<'_>,
) -> Result<(), PayrollError> {
    if record.amount < Decimal::ZERO {
        return Err(PayrollError::validation(
            "negative_amount",
            "amount must not be negative",
        ));
    }
    check_range("amount", record.amount)?;
    validate_period(record)?;

    if let Derivation::Create(staff) = derivation {
        record.direction = record.kind.direction();
        record.is_released = match record.direction {
            Direction::Expense => Some(false),
            Direction::Income => None,
        };

        match record.kind {
            PayrollKind::Hourly => {
                record.staff_hourly_wage = Some(staff.hourly_wage);
                record.hourly_wage = Some(record.hourly_wage.unwrap_or(staff.hourly_wage));
            }
            PayrollKind::Basic => {
                record.basic_salary = Some(staff.basic_salary);
                record.amount = record.amount.min(staff.basic_salary_cap());
            }
            _ => {}
        }
    }

    if record.kind == PayrollKind::Hourly {
        let wage = record.hourly_wage.ok_or_else(|| {
            PayrollError::validation("hourly_wage_required", "hourly wage is required")
        })?;
        let hours = record.work_hours.ok_or_else(|| {
            PayrollError::validation("work_hours_required", "work hours are required")
        })?;
        if wage < Decimal::ZERO {
            return Err(PayrollError::validation(
                "negative_amount",
                "hourly wage must not be negative",
            ));
        }
        check_range("hourly_wage", wage)?;
        record.amount = wage.checked_mul(Decimal::from(hours)).ok_or_else(|| {
            PayrollError::validation("amount_out_of_range", "hourly amount overflows")
        })?;
    }

    record.amount = money(record.amount);
    check_range("amount", record.amount)?;
    record.title = generate_title(record)?;
    Ok(())
}

fn check_range(field: &str, value: Decimal) -> Result<(), PayrollError> {
    if value > MAX_MONEY {
        return Err(PayrollError::validation(
            "amount_out_of_range",
            format!("{field} must not exceed {MAX_MONEY}"),
        ));
    }
    Ok(())
}

fn validate_period(record: &PayrollRecord) -> Result<(), PayrollError> {
    let kind = record.kind;

    if !kind.is_period_free() && (record.year.is_none() || record.month.is_none()) {
        return Err(PayrollError::validation(
            "period_required",
            format!("year and month are required for {kind} records"),
        ));
    }
    if kind == PayrollKind::Overtime && record.day.is_none() {
        return Err(PayrollError::validation(
            "period_required",
            "day is required for overtime records",
        ));
    }

    if let Some(month) = record.month {
        if !(1..=12).contains(&month) {
            return Err(PayrollError::validation(
                "invalid_period",
                format!("month {month} is out of range"),
            ));
        }
    }
    if let (Some(year), Some(month), Some(day)) = (record.year, record.month, record.day) {
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(PayrollError::validation(
                "invalid_period",
                format!("{year}-{month}-{day} is not a calendar date"),
            ));
        }
    }

    Ok(())
}

/// Human-readable summary of a record. Depends only on the record's own fields.
pub fn generate_title(record: &PayrollRecord) -> Result<String, PayrollError> {
    let amount = format!("{:.2}", record.amount);
    let created = record.created_at.format("%Y-%m-%d %H:%M:%S");

    match record.kind {
        PayrollKind::Advance => return Ok(format!("(支出){created}预支工资{amount}元")),
        PayrollKind::Disbursement => {
            return Ok(match (record.year, record.month) {
                (Some(year), Some(month)) => {
                    format!("(支出){created}发放{year}年{month}月工资{amount}元")
                }
                _ => format!("(支出){created}发放工资{amount}元"),
            });
        }
        _ => {}
    }

    let (year, month) = match (record.year, record.month) {
        (Some(year), Some(month)) => (year, month),
        _ => {
            return Err(PayrollError::validation(
                "period_required",
                "year and month are required",
            ));
        }
    };

    let title = match record.kind {
        PayrollKind::Basic => {
            let basic = record.basic_salary.ok_or_else(|| {
                PayrollError::validation("basic_salary_required", "basic salary snapshot missing")
            })?;
            format!("{year}年{month}月基础工资{basic:.2}元，实际工资{amount}元")
        }
        PayrollKind::Bonus => format!("{year}年{month}月奖金{amount}元"),
        PayrollKind::Hourly => {
            let (wage, hours) = match (record.hourly_wage, record.work_hours) {
                (Some(wage), Some(hours)) => (wage, hours),
                _ => {
                    return Err(PayrollError::validation(
                        "work_hours_required",
                        "hourly wage and work hours are required",
                    ));
                }
            };
            format!("{year}年{month}月时薪工资{wage:.2}元 * {hours}小时, 总计时薪工资{amount}元")
        }
        PayrollKind::Performance => format!("{year}年{month}月绩效工资{amount}元"),
        PayrollKind::Commission => format!("{year}年{month}月提成工资{amount}元"),
        PayrollKind::Other => format!("{year}年{month}月其他工资{amount}元"),
        PayrollKind::Overtime => {
            let day = record.day.ok_or_else(|| {
                PayrollError::validation("period_required", "day is required")
            })?;
            format!("{year}年{month}月{day}日加班工资{amount}元")
        }
        PayrollKind::Advance | PayrollKind::Disbursement => unreachable!("handled above"),
    };

    Ok(title)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::payroll::PayrollStatus;
    use chrono::{DateTime, Utc};

    pub fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    pub fn staff(basic: &str, hourly: &str, balance: &str) -> Staff {
        Staff {
            id: 7,
            staff_code: "EMP-007".into(),
            full_name: "Li Si".into(),
            phone: Some("13800000007".into()),
            basic_salary: dec(basic),
            hourly_wage: dec(hourly),
            account_balance: dec(balance),
            account_total_expenditure: Decimal::ZERO,
            is_deleted: false,
        }
    }

    pub fn blank(kind: PayrollKind) -> PayrollRecord {
        let created: DateTime<Utc> = "2026-09-30T08:15:00Z".parse().unwrap();
        PayrollRecord {
            id: 0,
            serial_number: String::new(),
            staff_id: 7,
            staff_code: "EMP-007".into(),
            full_name: "Li Si".into(),
            phone: None,
            amount: Decimal::ZERO,
            direction: Direction::Income,
            kind,
            status: PayrollStatus::Unaudited,
            title: String::new(),
            memo: None,
            audit_memo: None,
            year: Some(2026),
            month: Some(9),
            day: None,
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
            created_by: 1,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn basic_salary_is_capped_by_debt() {
        let staff = staff("5000", "0", "-800");
        let mut record = blank(PayrollKind::Basic);
        record.amount = staff.basic_salary;

        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();

        assert_eq!(record.amount, dec("4200.00"));
        assert_eq!(record.basic_salary, Some(dec("5000")));
        assert_eq!(record.title, "2026年9月基础工资5000.00元，实际工资4200.00元");
    }

    #[test]
    fn basic_salary_keeps_smaller_requested_amount() {
        let staff = staff("5000", "0", "0");
        let mut record = blank(PayrollKind::Basic);
        record.amount = dec("3000");

        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();

        assert_eq!(record.amount, dec("3000.00"));
    }

    #[test]
    fn basic_salary_request_above_cap_is_lowered() {
        let staff = staff("5000", "0", "-1000");
        let mut record = blank(PayrollKind::Basic);
        record.amount = dec("4800");

        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();

        assert_eq!(record.amount, dec("4000.00"));
    }

    #[test]
    fn hourly_amount_comes_from_wage_and_hours() {
        let staff = staff("0", "50", "0");
        let mut record = blank(PayrollKind::Hourly);
        record.work_hours = Some(10);
        record.amount = dec("99999");

        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();

        assert_eq!(record.amount, dec("500.00"));
        assert_eq!(record.staff_hourly_wage, Some(dec("50")));
        assert_eq!(record.hourly_wage, Some(dec("50")));
        assert_eq!(
            record.title,
            "2026年9月时薪工资50.00元 * 10小时, 总计时薪工资500.00元"
        );
    }

    #[test]
    fn hourly_edit_recomputes_amount_and_title() {
        let staff = staff("0", "50", "0");
        let mut record = blank(PayrollKind::Hourly);
        record.work_hours = Some(10);
        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();

        record.work_hours = Some(12);
        derive_fields(&mut record, Derivation::Edit).unwrap();

        assert_eq!(record.amount, dec("600.00"));
        assert_eq!(record.staff_hourly_wage, Some(dec("50")));
        assert!(record.title.ends_with("总计时薪工资600.00元"));
    }

    #[test]
    fn hourly_without_hours_is_rejected() {
        let staff = staff("0", "50", "0");
        let mut record = blank(PayrollKind::Hourly);
        let err = derive_fields(&mut record, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "work_hours_required");
    }

    #[test]
    fn expense_kinds_start_unreleased() {
        let staff = staff("0", "0", "0");
        let mut record = blank(PayrollKind::Advance);
        record.amount = dec("300");
        record.year = None;
        record.month = None;

        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();

        assert_eq!(record.direction, Direction::Expense);
        assert_eq!(record.is_released, Some(false));
        assert_eq!(record.title, "(支出)2026-09-30 08:15:00预支工资300.00元");
    }

    #[test]
    fn income_kinds_have_no_release_flag() {
        let staff = staff("0", "0", "0");
        let mut record = blank(PayrollKind::Bonus);
        record.amount = dec("100");
        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();
        assert_eq!(record.direction, Direction::Income);
        assert_eq!(record.is_released, None);
    }

    #[test]
    fn missing_period_is_a_validation_error() {
        let staff = staff("0", "0", "0");
        let mut record = blank(PayrollKind::Bonus);
        record.month = None;
        let err = derive_fields(&mut record, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "period_required");

        let mut overtime = blank(PayrollKind::Overtime);
        let err = derive_fields(&mut overtime, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "period_required");
    }

    #[test]
    fn impossible_dates_are_rejected() {
        let staff = staff("0", "0", "0");
        let mut record = blank(PayrollKind::Overtime);
        record.month = Some(2);
        record.day = Some(30);
        let err = derive_fields(&mut record, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "invalid_period");
    }

    #[test]
    fn negative_amount_is_rejected() {
        let staff = staff("0", "0", "0");
        let mut record = blank(PayrollKind::Commission);
        record.amount = dec("-1");
        let err = derive_fields(&mut record, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "negative_amount");
    }

    #[test]
    fn hourly_amount_that_overflows_is_rejected() {
        let staff = staff("0", "50", "0");
        let mut record = blank(PayrollKind::Hourly);
        record.hourly_wage = Some(Decimal::MAX);
        record.work_hours = Some(2);
        let err = derive_fields(&mut record, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "amount_out_of_range");

        let mut record = blank(PayrollKind::Hourly);
        record.hourly_wage = Some(dec("9999999.99"));
        record.work_hours = Some(1000);
        let err = derive_fields(&mut record, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "amount_out_of_range");
    }

    #[test]
    fn amount_beyond_column_range_is_rejected() {
        let staff = staff("0", "0", "0");
        let mut record = blank(PayrollKind::Bonus);
        record.amount = dec("100000000");
        let err = derive_fields(&mut record, Derivation::Create(&staff)).unwrap_err();
        assert_eq!(err.code(), "amount_out_of_range");

        record.amount = dec("99999999.99");
        derive_fields(&mut record, Derivation::Create(&staff)).unwrap();
        assert_eq!(record.amount, dec("99999999.99"));
    }

    #[test]
    fn title_is_deterministic() {
        let mut record = blank(PayrollKind::Overtime);
        record.day = Some(3);
        record.amount = dec("120.5");

        let first = generate_title(&record).unwrap();
        assert_eq!(first, "2026年9月3日加班工资120.50元");
        assert_eq!(generate_title(&record).unwrap(), first);

        record.memo = Some("weekend shift".into());
        record.audit_memo = Some("checked".into());
        record.status = PayrollStatus::Corrected;
        assert_eq!(generate_title(&record).unwrap(), first);
    }

    #[test]
    fn disbursement_title_with_and_without_period() {
        let mut record = blank(PayrollKind::Disbursement);
        record.amount = dec("800");
        assert_eq!(
            generate_title(&record).unwrap(),
            "(支出)2026-09-30 08:15:00发放2026年9月工资800.00元"
        );
        record.year = None;
        record.month = None;
        assert_eq!(
            generate_title(&record).unwrap(),
            "(支出)2026-09-30 08:15:00发放工资800.00元"
        );
    }
}
