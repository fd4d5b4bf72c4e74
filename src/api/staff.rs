use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::Service;
use crate::auth::auth::AuthUser;
use crate::model::payroll::{BasicDisbursement, PayrollKind};
use crate::store::Page;

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UndisbursedQuery {
    /// `basic` (default) or `hourly`
    pub kind: Option<PayrollKind>,
    /// Defaults to the previous month together with `month`
    #[schema(example = 2026)]
    pub year: Option<i32>,
    #[schema(example = 9)]
    pub month: Option<u32>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 10)]
    pub per_page: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct BasicDisbursementRequest {
    pub items: Vec<BasicDisbursement>,
}

#[utoipa::path(
    get,
    path = "/api/staff/{id}",
    params(("id", description = "Staff ID")),
    responses(
        (status = 200, description = "Staff with running totals", body = Staff),
        (status = 403),
        (status = 404, description = "Staff not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn get_staff(
    auth: AuthUser,
    svc: web::Data<Service>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let staff_id = path.into_inner();
    auth.require_staff_access(staff_id)?;

    let staff = svc.get_staff(staff_id).await?;
    Ok(HttpResponse::Ok().json(staff))
}

#[utoipa::path(
    get,
    path = "/api/staff/undisbursed",
    params(UndisbursedQuery),
    responses(
        (status = 200, description = "Staff still to be paid for the period", body = [UndisbursedStaff]),
        (status = 400, description = "Unsupported kind or bad period")
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn list_undisbursed(
    auth: AuthUser,
    svc: web::Data<Service>,
    query: web::Query<UndisbursedQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let query = query.into_inner();
    let rows = svc
        .list_undisbursed(
            query.kind.unwrap_or(PayrollKind::Basic),
            query.year,
            query.month,
            Page::new(query.page, query.per_page),
        )
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    post,
    path = "/api/staff/basic-disbursement",
    request_body = BasicDisbursementRequest,
    responses(
        (status = 201, description = "Basic salary records created", body = [PayrollRecord]),
        (status = 400, description = "Amount over the ceiling or salary already booked"),
        (status = 404, description = "Staff not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn disburse_basic(
    auth: AuthUser,
    svc: web::Data<Service>,
    body: web::Json<BasicDisbursementRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let records = svc.disburse_basic_batch(&body.items, &auth.actor()).await?;

    Ok(HttpResponse::Created().json(records))
}
