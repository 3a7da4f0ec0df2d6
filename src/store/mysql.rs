use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, MySqlPool};
use tracing::{debug, error};

use super::RawRecordStore;
use crate::error::AppError;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType, NewLeaveRequest};
use crate::model::payroll::{
    DateRange, DeductionKind, Deductions, EmployeeIdentity, EmployeeKey, PaymentStatus,
    RawPayrollRecord,
};

const PAYROLL_SELECT: &str = r#"
    SELECT
        p.id,
        p.employee_id,
        CONCAT_WS(' ', e.first_name, e.last_name) AS employee_name,
        e.employee_code AS employee_nik,
        d.name AS department,
        p.period_date,
        p.base_pay,
        p.bonus,
        p.income_tax,
        p.lateness_deduction,
        p.loan_deduction,
        p.donation_deduction,
        p.health_insurance_deduction,
        p.event_deduction,
        p.days_present_full,
        p.days_present_half,
        p.payment_status
    FROM payroll p
    LEFT JOIN employees e ON e.id = p.employee_id
    LEFT JOIN departments d ON d.id = e.department_id
"#;

/// Loosely typed payroll row exactly as the database hands it back.
#[derive(Debug, FromRow)]
pub struct PayrollRow {
    pub id: u64,
    pub employee_id: Option<u64>,
    pub employee_name: Option<String>,
    pub employee_nik: Option<String>,
    pub department: Option<String>,
    pub period_date: Option<NaiveDate>,
    pub base_pay: Option<Decimal>,
    pub bonus: Option<Decimal>,
    pub income_tax: Option<Decimal>,
    pub lateness_deduction: Option<Decimal>,
    pub loan_deduction: Option<Decimal>,
    pub donation_deduction: Option<Decimal>,
    pub health_insurance_deduction: Option<Decimal>,
    pub event_deduction: Option<Decimal>,
    pub days_present_full: Option<u32>,
    pub days_present_half: Option<u32>,
    pub payment_status: Option<String>,
}

fn money(record_id: u64, field: &str, value: Option<Decimal>) -> Result<Decimal, AppError> {
    let value = value.unwrap_or(Decimal::ZERO);
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::Validation(format!(
            "payroll record {record_id}: {field} is negative ({value})"
        )));
    }
    Ok(value)
}

impl TryFrom<PayrollRow> for RawPayrollRecord {
    type Error = AppError;

    fn try_from(row: PayrollRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let period_date = row.period_date.ok_or_else(|| {
            AppError::Validation(format!("payroll record {id}: missing period_date"))
        })?;
        let status_text = row.payment_status.as_deref().unwrap_or("unpaid");
        let payment_status = PaymentStatus::from_str(status_text.trim()).map_err(|_| {
            AppError::Validation(format!(
                "payroll record {id}: unknown payment status '{status_text}'"
            ))
        })?;

        let deductions = Deductions {
            income_tax: money(id, "income_tax", row.income_tax)?,
            lateness: money(id, "lateness_deduction", row.lateness_deduction)?,
            loan: money(id, "loan_deduction", row.loan_deduction)?,
            donation: money(id, "donation_deduction", row.donation_deduction)?,
            health_insurance: money(
                id,
                "health_insurance_deduction",
                row.health_insurance_deduction,
            )?,
            event: money(id, "event_deduction", row.event_deduction)?,
        };

        Ok(RawPayrollRecord {
            id,
            employee: EmployeeKey::from(row.employee_id),
            identity: EmployeeIdentity {
                name: row.employee_name.filter(|n| !n.trim().is_empty()),
                nik: row.employee_nik,
                department: row.department,
            },
            period_date,
            base_pay: money(id, "base_pay", row.base_pay)?,
            bonus: money(id, "bonus", row.bonus)?,
            deductions,
            days_present_full: row.days_present_full.unwrap_or(0),
            days_present_half: row.days_present_half.unwrap_or(0),
            payment_status,
        })
    }
}

#[derive(Debug, FromRow)]
struct LeaveRow {
    id: u64,
    employee_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    leave_type: String,
    status: Option<String>,
}

impl TryFrom<LeaveRow> for LeaveRequest {
    type Error = AppError;

    fn try_from(row: LeaveRow) -> Result<Self, Self::Error> {
        let leave_type = LeaveType::from_str(&row.leave_type).map_err(|_| {
            AppError::Validation(format!(
                "leave request {}: unknown leave type '{}'",
                row.id, row.leave_type
            ))
        })?;
        if row.end_date < row.start_date {
            return Err(AppError::Validation(format!(
                "leave request {}: end_date {} is before start_date {}",
                row.id, row.end_date, row.start_date
            )));
        }
        let status_text = row.status.as_deref().unwrap_or("pending");
        let status = LeaveStatus::from_str(status_text).map_err(|_| {
            AppError::Validation(format!(
                "leave request {}: unknown status '{}'",
                row.id, status_text
            ))
        })?;
        Ok(LeaveRequest {
            id: row.id,
            employee_id: row.employee_id,
            start_date: row.start_date,
            end_date: row.end_date,
            leave_type,
            status,
        })
    }
}

pub struct MySqlRecordStore {
    pool: MySqlPool,
}

impl MySqlRecordStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn update_field<T>(&self, sql: &str, record_id: u64, value: T) -> Result<(), AppError>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::MySql> + sqlx::Type<sqlx::MySql> + Send + 'static,
    {
        let result = sqlx::query(sql)
            .bind(value)
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, record_id, "Payroll record update failed");
                AppError::from(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("payroll record {record_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RawRecordStore for MySqlRecordStore {
    async fn fetch_payroll(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<RawPayrollRecord>, AppError> {
        let rows = match range {
            Some(range) => {
                let sql = format!(
                    "{PAYROLL_SELECT} WHERE p.period_date BETWEEN ? AND ? ORDER BY p.period_date, p.id"
                );
                sqlx::query_as::<_, PayrollRow>(&sql)
                    .bind(range.start)
                    .bind(range.end)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!("{PAYROLL_SELECT} ORDER BY p.period_date, p.id");
                sqlx::query_as::<_, PayrollRow>(&sql)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| {
            error!(error = %e, "Failed to fetch payroll records");
            AppError::from(e)
        })?;

        debug!(rows = rows.len(), "Fetched payroll rows");
        rows.into_iter().map(RawPayrollRecord::try_from).collect()
    }

    async fn set_bonus(&self, record_id: u64, amount: Decimal) -> Result<(), AppError> {
        self.update_field("UPDATE payroll SET bonus = ? WHERE id = ?", record_id, amount)
            .await
    }

    async fn set_deduction(
        &self,
        record_id: u64,
        kind: DeductionKind,
        amount: Decimal,
    ) -> Result<(), AppError> {
        let sql = format!("UPDATE payroll SET {} = ? WHERE id = ?", kind.column());
        self.update_field(&sql, record_id, amount).await
    }

    async fn set_payment_status(
        &self,
        record_id: u64,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        self.update_field(
            "UPDATE payroll SET payment_status = ? WHERE id = ?",
            record_id,
            status.to_string(),
        )
        .await
    }

    async fn fetch_leave_requests(
        &self,
        employee_id: Option<u64>,
    ) -> Result<Vec<LeaveRequest>, AppError> {
        let base = "SELECT id, employee_id, start_date, end_date, leave_type, status FROM leave_requests";
        let rows = match employee_id {
            Some(employee_id) => {
                let sql = format!("{base} WHERE employee_id = ? ORDER BY start_date");
                sqlx::query_as::<_, LeaveRow>(&sql)
                    .bind(employee_id)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!("{base} ORDER BY start_date");
                sqlx::query_as::<_, LeaveRow>(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| {
            error!(error = %e, ?employee_id, "Failed to fetch leave requests");
            AppError::from(e)
        })?;

        rows.into_iter().map(LeaveRequest::try_from).collect()
    }

    async fn submit_leave(&self, request: &NewLeaveRequest) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO leave_requests
                (employee_id, start_date, end_date, leave_type, status)
            VALUES (?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(request.employee_id)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(request.leave_type.as_ref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id = request.employee_id, "Failed to create leave request");
            AppError::from(e)
        })?;

        Ok(result.last_insert_id())
    }

    async fn decide_leave(&self, leave_id: u64, decision: LeaveStatus) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE leave_requests
            SET status = ?
            WHERE id = ?
            AND status = 'pending'
            "#,
        )
        .bind(decision.as_ref())
        .bind(leave_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, leave_id, "Leave decision failed");
            AppError::from(e)
        })?;

        Ok(result.rows_affected() > 0)
    }
}
