use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "staff_code": "EMP-001",
        "full_name": "Zhang San",
        "phone": "+8613800000000",
        "basic_salary": "5000.00",
        "hourly_wage": "50.00",
        "account_balance": "-800.00",
        "account_total_expenditure": "200.00",
        "is_deleted": false
    })
)]
pub struct Staff {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub staff_code: String,

    #[schema(example = "Zhang San")]
    pub full_name: String,

    #[schema(example = "+8613800000000", nullable = true)]
    pub phone: Option<String>,

    #[schema(value_type = String, example = "5000.00")]
    pub basic_salary: Decimal,

    #[schema(value_type = String, example = "50.00")]
    pub hourly_wage: Decimal,

    /// Signed running balance; negative means the staff member owes money.
    #[schema(value_type = String, example = "-800.00")]
    pub account_balance: Decimal,

    #[schema(value_type = String, example = "200.00")]
    pub account_total_expenditure: Decimal,

    pub is_deleted: bool,
}

impl Staff {
    /// Ceiling for this period's basic salary. Outstanding debt lowers it, never below zero.
    pub fn basic_salary_cap(&self) -> Decimal {
        let cap = if self.account_balance < Decimal::ZERO {
            self.basic_salary + self.account_balance
        } else {
            self.basic_salary
        };
        cap.max(Decimal::ZERO)
    }
}

/// One row of the "who has not been paid yet" listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UndisbursedStaff {
    pub staff_id: u64,
    pub staff_code: String,
    pub full_name: String,
    pub phone: Option<String>,
    #[schema(value_type = String)]
    pub basic_salary: Decimal,
    #[schema(value_type = String)]
    pub hourly_wage: Decimal,
    #[schema(value_type = String)]
    pub account_balance: Decimal,
    #[schema(value_type = String)]
    pub max_disbursement: Decimal,
}

impl From<Staff> for UndisbursedStaff {
    fn from(staff: Staff) -> Self {
        let max_disbursement = staff.basic_salary_cap();
        Self {
            staff_id: staff.id,
            staff_code: staff.staff_code,
            full_name: staff.full_name,
            phone: staff.phone,
            basic_salary: staff.basic_salary,
            hourly_wage: staff.hourly_wage,
            account_balance: staff.account_balance,
            max_disbursement,
        }
    }
}
