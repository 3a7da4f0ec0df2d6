use chrono::Datelike;
use tracing::warn;

use crate::error::AppError;
use crate::model::leave_request::{LeaveBalance, LeaveRequest, LeaveStatus, NewLeaveRequest};

pub const DEFAULT_ANNUAL_CAP: i64 = 12;

/// Days used and remaining against the annual leave entitlement.
#[derive(Debug, Clone, Copy)]
pub struct LeaveBalanceCalculator {
    annual_cap: i64,
}

impl Default for LeaveBalanceCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_ANNUAL_CAP)
    }
}

impl LeaveBalanceCalculator {
    pub fn new(annual_cap: i64) -> Self {
        Self {
            annual_cap: annual_cap.max(0),
        }
    }

    /// Sums approved requests of `employee_id` starting in `year`.
    pub fn balance(&self, employee_id: u64, year: i32, requests: &[LeaveRequest]) -> LeaveBalance {
        let days_taken_this_year = requests
            .iter()
            .filter(|r| r.employee_id == employee_id)
            .filter(|r| r.status == LeaveStatus::Approved)
            .filter(|r| r.start_date.year() == year)
            .inspect(|r| {
                if r.end_date.year() != r.start_date.year() {
                    warn!(
                        leave_id = r.id,
                        employee_id, "Approved leave crosses a year boundary; counted whole in its start year"
                    );
                }
            })
            .map(LeaveRequest::span_days)
            .sum();

        LeaveBalance {
            employee_id,
            year,
            days_taken_this_year,
            days_remaining: (self.annual_cap - days_taken_this_year).max(0),
            annual_cap: self.annual_cap,
        }
    }

    /// Client-side gate run before a submission reaches the store.
    pub fn preflight(&self, request: &NewLeaveRequest, balance: &LeaveBalance) -> Result<(), AppError> {
        if request.end_date < request.start_date {
            return Err(AppError::Validation(
                "start_date cannot be after end_date".into(),
            ));
        }
        if request.start_date.year() != request.end_date.year() {
            return Err(AppError::UnsupportedLeaveSpan(format!(
                "{} to {} crosses a calendar year; submit one request per year",
                request.start_date, request.end_date
            )));
        }

        let requested = request.span_days();
        if requested > balance.days_remaining {
            return Err(AppError::LeaveCapExceeded {
                requested,
                remaining: balance.days_remaining,
            });
        }
        Ok(())
    }
}
