use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::RawRecordStore;
use crate::error::AppError;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, NewLeaveRequest};
use crate::model::payroll::{DateRange, DeductionKind, PaymentStatus, RawPayrollRecord};

/// Scriptable stand-in for the HR backend.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<RawPayrollRecord>>,
    leaves: Mutex<Vec<LeaveRequest>>,
    failing: Mutex<HashSet<u64>>,
    delays: Mutex<HashMap<u64, Duration>>,
    fail_fetches: AtomicBool,
    mutation_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn with_records(records: Vec<RawPayrollRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn with_leaves(self, leaves: Vec<LeaveRequest>) -> Self {
        *self.leaves.lock().unwrap() = leaves;
        self
    }

    pub fn fail_record(&self, record_id: u64) {
        self.failing.lock().unwrap().insert(record_id);
    }

    pub fn delay_record(&self, record_id: u64, delay: Duration) {
        self.delays.lock().unwrap().insert(record_id, delay);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn record(&self, record_id: u64) -> Option<RawPayrollRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == record_id)
            .cloned()
    }

    async fn mutate(
        &self,
        record_id: u64,
        apply: impl FnOnce(&mut RawPayrollRecord) + Send,
    ) -> Result<(), AppError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(&record_id).copied();
        if let Some(delay) = delay {
            actix_web::rt::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&record_id) {
            return Err(AppError::Network(format!("record {record_id} unreachable")));
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| AppError::NotFound(format!("payroll record {record_id}")))?;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl RawRecordStore for InMemoryStore {
    async fn fetch_payroll(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<RawPayrollRecord>, AppError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(AppError::Network("payroll fetch failed".into()));
        }
        let mut records: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| range.is_none_or(|range| (range.start..=range.end).contains(&r.period_date)))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.period_date, r.id));
        Ok(records)
    }

    async fn set_bonus(&self, record_id: u64, amount: Decimal) -> Result<(), AppError> {
        self.mutate(record_id, |r| r.bonus = amount).await
    }

    async fn set_deduction(
        &self,
        record_id: u64,
        kind: DeductionKind,
        amount: Decimal,
    ) -> Result<(), AppError> {
        self.mutate(record_id, |r| r.deductions.set(kind, amount)).await
    }

    async fn set_payment_status(
        &self,
        record_id: u64,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        self.mutate(record_id, |r| r.payment_status = status).await
    }

    async fn fetch_leave_requests(
        &self,
        employee_id: Option<u64>,
    ) -> Result<Vec<LeaveRequest>, AppError> {
        Ok(self
            .leaves
            .lock()
            .unwrap()
            .iter()
            .filter(|l| employee_id.is_none_or(|id| l.employee_id == id))
            .cloned()
            .collect())
    }

    async fn submit_leave(&self, request: &NewLeaveRequest) -> Result<u64, AppError> {
        let mut leaves = self.leaves.lock().unwrap();
        let id = leaves.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        leaves.push(LeaveRequest {
            id,
            employee_id: request.employee_id,
            start_date: request.start_date,
            end_date: request.end_date,
            leave_type: request.leave_type,
            status: LeaveStatus::Pending,
        });
        Ok(id)
    }

    async fn decide_leave(&self, leave_id: u64, decision: LeaveStatus) -> Result<bool, AppError> {
        let mut leaves = self.leaves.lock().unwrap();
        match leaves
            .iter_mut()
            .find(|l| l.id == leave_id && l.status == LeaveStatus::Pending)
        {
            Some(leave) => {
                leave.status = decision;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
