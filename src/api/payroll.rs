use actix_web::{HttpResponse, Responder, http::StatusCode, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::model::payroll::{DateRange, Payslip};
use crate::payroll::consolidation::{PayslipRequest, payslips_for};
use crate::payroll::reconciliation::BatchMutation;
use crate::payroll::snapshot::PayrollSnapshot;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct PayrollGroupQuery {
    /// First period date to include (inclusive)
    #[schema(example = "2024-01-01", format = "date", value_type = String)]
    pub start_date: Option<NaiveDate>,
    /// Last period date to include (inclusive)
    #[schema(example = "2024-01-31", format = "date", value_type = String)]
    pub end_date: Option<NaiveDate>,
}

impl PayrollGroupQuery {
    fn range(&self) -> Result<Option<DateRange>, AppError> {
        match (self.start_date, self.end_date) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) if start <= end => Ok(Some(DateRange { start, end })),
            (Some(_), Some(_)) => Err(AppError::Validation(
                "start_date cannot be after end_date".into(),
            )),
            _ => Err(AppError::Validation(
                "start_date and end_date must be given together".into(),
            )),
        }
    }
}

/// Fetch raw payroll records and aggregate them into display groups
#[utoipa::path(
    get,
    path = "/api/payroll/groups",
    params(PayrollGroupQuery),
    responses(
        (status = 200, description = "Fresh payroll snapshot", body = PayrollSnapshot),
        (status = 400, description = "Invalid date range"),
        (status = 409, description = "Superseded by a newer fetch")
    ),
    tag = "Payroll"
)]
pub async fn list_groups(
    state: web::Data<AppState>,
    query: web::Query<PayrollGroupQuery>,
) -> actix_web::Result<impl Responder> {
    let range = query.range()?;
    let snapshot = state.snapshots.load(state.store.as_ref(), range).await?;
    Ok(HttpResponse::Ok().json(snapshot.as_ref()))
}

/// The snapshot currently on screen, without refetching
#[utoipa::path(
    get,
    path = "/api/payroll/groups/current",
    responses(
        (status = 200, description = "Current payroll snapshot", body = PayrollSnapshot),
        (status = 404, description = "Nothing loaded yet")
    ),
    tag = "Payroll"
)]
pub async fn current_groups(state: web::Data<AppState>) -> actix_web::Result<impl Responder> {
    let snapshot = state
        .snapshots
        .current()
        .ok_or_else(|| AppError::NotFound("no payroll snapshot loaded".into()))?;
    Ok(HttpResponse::Ok().json(snapshot.as_ref()))
}

/// Apply a bonus, a deduction or a payment status to every record behind
/// the selected groups
#[utoipa::path(
    post,
    path = "/api/payroll/groups/mutations",
    request_body = BatchMutation,
    responses(
        (status = 200, description = "Every record updated", body = Object),
        (status = 207, description = "Some records or groups were not updated", body = Object),
        (status = 400, description = "Invalid amount"),
        (status = 409, description = "Snapshot is stale; reload")
    ),
    tag = "Payroll"
)]
pub async fn mutate_groups(
    state: web::Data<AppState>,
    payload: web::Json<BatchMutation>,
) -> actix_web::Result<impl Responder> {
    let response = state.coordinator.apply(payload.into_inner()).await?;

    match response.report.partial_failure() {
        None => Ok(HttpResponse::Ok().json(json!({
            "message": "Batch applied",
            "result": response,
        }))),
        Some(partial) => {
            info!(
                batch_id = %response.report.batch_id,
                succeeded = response.report.succeeded,
                failed = response.report.failed,
                "Payroll batch partially applied"
            );
            Ok(HttpResponse::build(StatusCode::MULTI_STATUS).json(json!({
                "message": partial.to_string(),
                "result": response,
            })))
        }
    }
}

/// Consolidate the selected groups into one payslip per employee
#[utoipa::path(
    post,
    path = "/api/payroll/payslips",
    request_body = PayslipRequest,
    responses(
        (status = 200, description = "Consolidated payslips", body = [Payslip]),
        (status = 409, description = "Snapshot is stale; reload")
    ),
    tag = "Payroll"
)]
pub async fn payslips(
    state: web::Data<AppState>,
    payload: web::Json<PayslipRequest>,
) -> actix_web::Result<impl Responder> {
    let snapshot = state
        .snapshots
        .current()
        .ok_or_else(|| AppError::StaleSnapshot("no payroll snapshot loaded".into()))?;
    let payslips = payslips_for(&snapshot, &payload)?;
    Ok(HttpResponse::Ok().json(payslips))
}
