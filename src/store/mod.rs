use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, NewLeaveRequest};
use crate::model::payroll::{DateRange, DeductionKind, PaymentStatus, RawPayrollRecord};

#[cfg(test)]
pub mod memory;
pub mod mysql;

/// Read and per-field mutation contract of the HR backend.
///
/// Mutations set the field on exactly one raw record; they never add to the
/// stored value, so replaying a call cannot double count.
#[async_trait]
pub trait RawRecordStore: Send + Sync {
    /// Records whose period date falls inside `range` (inclusive), or every
    /// record when `range` is `None`. Ordered by period date, then id.
    async fn fetch_payroll(&self, range: Option<DateRange>)
    -> Result<Vec<RawPayrollRecord>, AppError>;

    async fn set_bonus(&self, record_id: u64, amount: Decimal) -> Result<(), AppError>;

    async fn set_deduction(
        &self,
        record_id: u64,
        kind: DeductionKind,
        amount: Decimal,
    ) -> Result<(), AppError>;

    async fn set_payment_status(
        &self,
        record_id: u64,
        status: PaymentStatus,
    ) -> Result<(), AppError>;

    async fn fetch_leave_requests(
        &self,
        employee_id: Option<u64>,
    ) -> Result<Vec<LeaveRequest>, AppError>;

    async fn submit_leave(&self, request: &NewLeaveRequest) -> Result<u64, AppError>;

    /// Moves a pending request to `decision`. Returns `false` when the
    /// request does not exist or was already decided.
    async fn decide_leave(&self, leave_id: u64, decision: LeaveStatus) -> Result<bool, AppError>;
}
