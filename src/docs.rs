use crate::api::payroll::{
    BatchTransitionRequest, PaginatedPayrollResponse, PayrollQuery, ReleaseRequest,
    TransitionRequest,
};
use crate::api::staff::{BasicDisbursementRequest, UndisbursedQuery};
use crate::model::audit::AuditTrailEntry;
use crate::model::payroll::{
    BasicDisbursement, Direction, NewPayrollRecord, PayrollKind, PayrollPatch, PayrollRecord,
    PayrollStatus, Period,
};
use crate::model::staff::{Staff, UndisbursedStaff};
use crate::payroll::Trigger;
use crate::payroll::settlement::SettlementOutcome;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll Ledger API",
        version = "1.0.0",
        description = r#"
## Payroll Ledger

Payroll records from creation through audit to settlement against the staff account.

### Lifecycle
- **Create**: a record starts as `unaudited`; amount, title and pay-rate snapshots are derived
- **Audit**: `approve`, `request-correction`, `reject`, `mark-corrected`, `cancel`
- **Settle**: an approved record moves the staff balance exactly once
- **Release**: approved expenses are marked as paid out

Every transition is written to an append-only audit trail.

### Security
All endpoints require a **JWT Bearer** access token.
HR/Admin audit, Finance/Admin release, Admin replays settlement; employees read their own records.
"#,
    ),
    paths(
        crate::api::payroll::create_payroll,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::get_payroll,
        crate::api::payroll::update_payroll,
        crate::api::payroll::audit_trail,
        crate::api::payroll::transition_payroll,
        crate::api::payroll::transition_batch,
        crate::api::payroll::release_payrolls,
        crate::api::payroll::settle_payroll,

        crate::api::staff::get_staff,
        crate::api::staff::list_undisbursed,
        crate::api::staff::disburse_basic
    ),
    components(
        schemas(
            PayrollRecord,
            PayrollKind,
            PayrollStatus,
            Direction,
            Period,
            NewPayrollRecord,
            PayrollPatch,
            PayrollQuery,
            PaginatedPayrollResponse,
            TransitionRequest,
            BatchTransitionRequest,
            ReleaseRequest,
            Trigger,
            AuditTrailEntry,
            SettlementOutcome,
            Staff,
            UndisbursedStaff,
            UndisbursedQuery,
            BasicDisbursement,
            BasicDisbursementRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Payroll", description = "Payroll record lifecycle APIs"),
        (name = "Staff", description = "Staff accounts and salary disbursement APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
