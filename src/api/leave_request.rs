use actix_web::{HttpResponse, Responder, web};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::model::leave_request::{LeaveBalance, LeaveRequest, LeaveStatus, NewLeaveRequest};
use crate::state::AppState;

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by employee ID
    #[schema(example = 123)]
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct BalanceQuery {
    /// Calendar year, defaults to the current one
    #[schema(example = 2026)]
    pub year: Option<i32>,
}

/// List leave requests, optionally for one employee
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Leave requests", body = [LeaveRequest])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    state: web::Data<AppState>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    let leaves = state.store.fetch_leave_requests(query.employee_id).await?;
    Ok(HttpResponse::Ok().json(leaves))
}

/// Days used and remaining against the annual cap
#[utoipa::path(
    get,
    path = "/api/leave/balance/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID"),
        BalanceQuery
    ),
    responses(
        (status = 200, description = "Leave balance", body = LeaveBalance)
    ),
    tag = "Leave"
)]
pub async fn leave_balance(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    query: web::Query<BalanceQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    let year = query.year.unwrap_or_else(|| Utc::now().year());
    let leaves = state.store.fetch_leave_requests(Some(employee_id)).await?;
    Ok(HttpResponse::Ok().json(state.leave.balance(employee_id, year, &leaves)))
}

/// Submit a leave request; rejected up front when it does not fit the
/// remaining balance
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body = NewLeaveRequest,
    responses(
        (status = 201, description = "Leave request submitted", body = Object, example = json!({
            "message": "Leave request submitted",
            "id": 7,
            "status": "pending"
        })),
        (status = 400, description = "Invalid dates or span crossing a year"),
        (status = 422, description = "Not enough leave remaining")
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    state: web::Data<AppState>,
    payload: web::Json<NewLeaveRequest>,
) -> actix_web::Result<impl Responder> {
    let request = payload.into_inner();
    let leaves = state
        .store
        .fetch_leave_requests(Some(request.employee_id))
        .await?;
    let balance = state
        .leave
        .balance(request.employee_id, request.start_date.year(), &leaves);
    state.leave.preflight(&request, &balance)?;

    let id = state.store.submit_leave(&request).await?;
    info!(leave_id = id, employee_id = request.employee_id, "Leave request submitted");

    Ok(HttpResponse::Created().json(json!({
        "message": "Leave request submitted",
        "id": id,
        "status": LeaveStatus::Pending,
    })))
}

async fn decide(
    state: &AppState,
    leave_id: u64,
    decision: LeaveStatus,
) -> Result<HttpResponse, AppError> {
    if !state.store.decide_leave(leave_id, decision).await? {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Leave request not found or already processed"
        })));
    }
    info!(leave_id, %decision, "Leave request decided");
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Leave {decision}")
    })))
}

/// Approve a pending leave request
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    responses(
        (status = 200, description = "Leave approved", body = Object, example = json!({
            "message": "Leave approved"
        })),
        (status = 400, description = "Leave request not found or already processed")
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    Ok(decide(&state, path.into_inner(), LeaveStatus::Approved).await?)
}

/// Reject a pending leave request
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    responses(
        (status = 200, description = "Leave rejected", body = Object, example = json!({
            "message": "Leave rejected"
        })),
        (status = 400, description = "Leave request not found or already processed")
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    Ok(decide(&state, path.into_inner(), LeaveStatus::Rejected).await?)
}
