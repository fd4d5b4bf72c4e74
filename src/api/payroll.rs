use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::Service;
use crate::auth::auth::AuthUser;
use crate::error::PayrollError;
use crate::model::payroll::{
    Direction, NewPayrollRecord, PayrollKind, PayrollPatch, PayrollRecord, PayrollStatus,
    RecordFilter,
};
use crate::payroll::Trigger;
use crate::store::Page;

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PayrollQuery {
    #[schema(example = 1)]
    pub page: Option<u32>,

    #[schema(example = 10)]
    pub per_page: Option<u32>,

    #[schema(example = 7)]
    pub staff_id: Option<u64>,

    pub status: Option<PayrollStatus>,
    pub kind: Option<PayrollKind>,
    pub direction: Option<Direction>,
    pub is_released: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedPayrollResponse {
    pub data: Vec<PayrollRecord>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct TransitionRequest {
    /// Required when rejecting or requesting a correction
    #[schema(example = "hours do not match the timesheet")]
    pub memo: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct BatchTransitionRequest {
    #[schema(example = json!([1, 2, 3]))]
    pub ids: Vec<u64>,
    pub memo: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReleaseRequest {
    #[schema(example = json!([4, 5]))]
    pub ids: Vec<u64>,
}

fn parse_trigger(raw: &str) -> Result<Trigger, PayrollError> {
    Trigger::parse(raw).ok_or_else(|| {
        PayrollError::validation("unknown_trigger", format!("unknown trigger {raw}"))
    })
}

#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = NewPayrollRecord,
    responses(
        (status = 201, description = "Payroll record created", body = PayrollRecord),
        (status = 400, description = "Validation failed"),
        (status = 401),
        (status = 403),
        (status = 404, description = "Staff not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_payroll(
    auth: AuthUser,
    svc: web::Data<Service>,
    payload: web::Json<NewPayrollRecord>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let record = svc
        .create_record(payload.into_inner(), &auth.actor())
        .await?;

    Ok(HttpResponse::Created().json(record))
}

#[utoipa::path(
    put,
    path = "/api/payroll/{id}",
    request_body = PayrollPatch,
    params(("id", description = "Payroll record ID")),
    responses(
        (status = 200, description = "Payroll record updated", body = PayrollRecord),
        (status = 400, description = "Record not editable or invalid"),
        (status = 404, description = "Payroll record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_payroll(
    auth: AuthUser,
    svc: web::Data<Service>,
    path: web::Path<u64>,
    body: web::Json<PayrollPatch>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let record = svc
        .update_record(path.into_inner(), body.into_inner(), &auth.actor())
        .await?;

    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    get,
    path = "/api/payroll/{id}",
    params(("id", description = "Payroll record ID")),
    responses(
        (status = 200, description = "Payroll record", body = PayrollRecord),
        (status = 403),
        (status = 404, description = "Payroll record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    svc: web::Data<Service>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let record = svc.get_record(path.into_inner()).await?;
    auth.require_staff_access(record.staff_id)?;

    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Paginated payroll records", body = PaginatedPayrollResponse),
        (status = 401),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    svc: web::Data<Service>,
    query: web::Query<PayrollQuery>,
) -> actix_web::Result<impl Responder> {
    let query = query.into_inner();
    let page = Page::new(query.page, query.per_page);
    let filter = RecordFilter {
        staff_id: auth.visible_staff()?.or(query.staff_id),
        status: query.status,
        kind: query.kind,
        direction: query.direction,
        is_released: query.is_released,
    };

    let (data, total) = svc.list_records(&filter, page).await?;

    Ok(HttpResponse::Ok().json(PaginatedPayrollResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/payroll/{id}/audit-trail",
    params(("id", description = "Payroll record ID")),
    responses(
        (status = 200, description = "Ledger lines, oldest first", body = [AuditTrailEntry]),
        (status = 404, description = "Payroll record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn audit_trail(
    auth: AuthUser,
    svc: web::Data<Service>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let record = svc.get_record(id).await?;
    auth.require_staff_access(record.staff_id)?;

    let entries = svc.audit_trail(id).await?;
    Ok(HttpResponse::Ok().json(entries))
}

#[utoipa::path(
    post,
    path = "/api/payroll/{id}/{trigger}",
    request_body = TransitionRequest,
    params(
        ("id", description = "Payroll record ID"),
        ("trigger", description = "approve | request-correction | reject | mark-corrected | cancel")
    ),
    responses(
        (status = 200, description = "Transition applied", body = PayrollRecord),
        (status = 400, description = "Unknown trigger or missing memo"),
        (status = 404, description = "Payroll record not found"),
        (status = 409, description = "Trigger not allowed from the current state")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn transition_payroll(
    auth: AuthUser,
    svc: web::Data<Service>,
    path: web::Path<(u64, String)>,
    body: Option<web::Json<TransitionRequest>>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let (id, trigger) = path.into_inner();
    let trigger = parse_trigger(&trigger)?;
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    let record = svc
        .transition(id, trigger, body.memo.as_deref(), &auth.actor())
        .await?;

    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    post,
    path = "/api/payroll/batch/{trigger}",
    request_body = BatchTransitionRequest,
    params(("trigger", description = "approve | request-correction | reject | mark-corrected | cancel")),
    responses(
        (status = 200, description = "Every record transitioned", body = [PayrollRecord]),
        (status = 400, description = "Batch aborted, nothing applied"),
        (status = 409, description = "Batch aborted on an illegal transition, nothing applied")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn transition_batch(
    auth: AuthUser,
    svc: web::Data<Service>,
    path: web::Path<String>,
    body: web::Json<BatchTransitionRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let trigger = parse_trigger(&path.into_inner())?;
    let records = svc
        .transition_batch(&body.ids, trigger, body.memo.as_deref(), &auth.actor())
        .await?;

    Ok(HttpResponse::Ok().json(records))
}

#[utoipa::path(
    post,
    path = "/api/payroll/release",
    request_body = ReleaseRequest,
    responses(
        (status = 200, description = "Records marked as paid out", body = [PayrollRecord]),
        (status = 400, description = "A record is not an approved, unreleased expense")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn release_payrolls(
    auth: AuthUser,
    svc: web::Data<Service>,
    body: web::Json<ReleaseRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_finance_or_admin()?;

    let records = svc.release(&body.ids, &auth.actor()).await?;

    Ok(HttpResponse::Ok().json(records))
}

#[utoipa::path(
    post,
    path = "/api/payroll/{id}/settle",
    params(("id", description = "Payroll record ID")),
    responses(
        (status = 200, description = "Settlement outcome", body = SettlementOutcome),
        (status = 404, description = "Payroll record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn settle_payroll(
    auth: AuthUser,
    svc: web::Data<Service>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let id = path.into_inner();
    let outcome = svc.settle(id).await?;
    tracing::info!(record_id = id, user_id = auth.user_id, ?outcome, "Settlement replayed");

    Ok(HttpResponse::Ok().json(outcome))
}
