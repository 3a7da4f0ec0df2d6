use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::AppError;

/// Adds two money amounts, failing instead of overflowing.
fn checked_sum(what: &str, a: Decimal, b: Decimal) -> Result<Decimal, AppError> {
    a.checked_add(b)
        .ok_or_else(|| AppError::Validation(format!("{what} is out of range ({a} + {b})")))
}

/// Payment state of a raw payroll record. Transitions are unrestricted in
/// every direction so an accidental payment can be undone.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
}

/// The six independently mutable deduction components.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeductionKind {
    IncomeTax,
    Lateness,
    Loan,
    Donation,
    HealthInsurance,
    Event,
}

impl DeductionKind {
    /// Column holding this component in the `payroll` table.
    pub fn column(self) -> &'static str {
        match self {
            DeductionKind::IncomeTax => "income_tax",
            DeductionKind::Lateness => "lateness_deduction",
            DeductionKind::Loan => "loan_deduction",
            DeductionKind::Donation => "donation_deduction",
            DeductionKind::HealthInsurance => "health_insurance_deduction",
            DeductionKind::Event => "event_deduction",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Deductions {
    #[schema(value_type = String, example = "0")]
    pub income_tax: Decimal,
    #[schema(value_type = String, example = "0")]
    pub lateness: Decimal,
    #[schema(value_type = String, example = "0")]
    pub loan: Decimal,
    #[schema(value_type = String, example = "0")]
    pub donation: Decimal,
    #[schema(value_type = String, example = "0")]
    pub health_insurance: Decimal,
    #[schema(value_type = String, example = "0")]
    pub event: Decimal,
}

impl Deductions {
    pub fn get(&self, kind: DeductionKind) -> Decimal {
        match kind {
            DeductionKind::IncomeTax => self.income_tax,
            DeductionKind::Lateness => self.lateness,
            DeductionKind::Loan => self.loan,
            DeductionKind::Donation => self.donation,
            DeductionKind::HealthInsurance => self.health_insurance,
            DeductionKind::Event => self.event,
        }
    }

    pub fn set(&mut self, kind: DeductionKind, amount: Decimal) {
        let slot = match kind {
            DeductionKind::IncomeTax => &mut self.income_tax,
            DeductionKind::Lateness => &mut self.lateness,
            DeductionKind::Loan => &mut self.loan,
            DeductionKind::Donation => &mut self.donation,
            DeductionKind::HealthInsurance => &mut self.health_insurance,
            DeductionKind::Event => &mut self.event,
        };
        *slot = amount;
    }

    pub fn total(&self) -> Result<Decimal, AppError> {
        DeductionKind::iter().try_fold(Decimal::ZERO, |acc, kind| {
            checked_sum("total deductions", acc, self.get(kind))
        })
    }

    pub fn add(&mut self, other: &Deductions) -> Result<(), AppError> {
        for kind in DeductionKind::iter() {
            let sum = checked_sum(kind.column(), self.get(kind), other.get(kind))?;
            self.set(kind, sum);
        }
        Ok(())
    }
}

/// Employee identity used for grouping. Records without an employee id are
/// kept under `Unknown` so their money still shows up somewhere.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeKey {
    Id(u64),
    Unknown,
}

impl From<Option<u64>> for EmployeeKey {
    fn from(id: Option<u64>) -> Self {
        id.map_or(EmployeeKey::Unknown, EmployeeKey::Id)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub struct GroupKey {
    pub employee: EmployeeKey,
    pub status: PaymentStatus,
}

/// Display-only identity fields carried alongside a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmployeeIdentity {
    pub name: Option<String>,
    pub nik: Option<String>,
    pub department: Option<String>,
}

/// One pay-period unit as stored by the backend. Already validated: money
/// fields are non-negative and `period_date` is a real date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RawPayrollRecord {
    pub id: u64,
    pub employee: EmployeeKey,
    pub identity: EmployeeIdentity,
    #[schema(value_type = String, format = "date", example = "2024-01-01")]
    pub period_date: NaiveDate,
    #[schema(value_type = String, example = "100000")]
    pub base_pay: Decimal,
    #[schema(value_type = String, example = "0")]
    pub bonus: Decimal,
    pub deductions: Deductions,
    pub days_present_full: u32,
    pub days_present_half: u32,
    pub payment_status: PaymentStatus,
}

impl RawPayrollRecord {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            employee: self.employee,
            status: self.payment_status,
        }
    }
}

/// The mergeable numeric part of a group. `absorb` is the one merge rule
/// shared by table aggregation and payslip consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PayrollFigures {
    #[schema(value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub period_end: NaiveDate,
    pub unit_count: usize,
    /// Rate context taken from the first member. Never summed.
    #[schema(value_type = String)]
    pub base_pay: Decimal,
    #[schema(value_type = String)]
    pub bonus: Decimal,
    pub deductions: Deductions,
    #[schema(value_type = String)]
    pub total_gross: Decimal,
    #[schema(value_type = String)]
    pub total_deductions: Decimal,
    #[schema(value_type = String)]
    pub net_pay: Decimal,
    pub days_present_full: u32,
    pub days_present_half: u32,
    pub source_ids: Vec<u64>,
}

impl PayrollFigures {
    pub fn seed(record: &RawPayrollRecord) -> Result<Self, AppError> {
        let mut figures = Self {
            period_start: record.period_date,
            period_end: record.period_date,
            unit_count: 1,
            base_pay: record.base_pay,
            bonus: record.bonus,
            deductions: record.deductions,
            total_gross: checked_sum(
                &format!("gross pay of record {}", record.id),
                record.base_pay,
                record.bonus,
            )?,
            total_deductions: Decimal::ZERO,
            net_pay: Decimal::ZERO,
            days_present_full: record.days_present_full,
            days_present_half: record.days_present_half,
            source_ids: vec![record.id],
        };
        figures.recompute_totals()?;
        Ok(figures)
    }

    /// Folds `other` into `self`. Additive fields are summed, the period is
    /// widened, and `base_pay` keeps the value of the first member.
    /// Fails when a sum leaves the `Decimal` range.
    pub fn absorb(&mut self, other: &PayrollFigures) -> Result<(), AppError> {
        self.period_start = self.period_start.min(other.period_start);
        self.period_end = self.period_end.max(other.period_end);
        self.unit_count += other.unit_count;
        self.bonus = checked_sum("bonus", self.bonus, other.bonus)?;
        self.deductions.add(&other.deductions)?;
        self.total_gross = checked_sum("gross pay", self.total_gross, other.total_gross)?;
        self.days_present_full = self.days_present_full.saturating_add(other.days_present_full);
        self.days_present_half = self.days_present_half.saturating_add(other.days_present_half);
        self.source_ids.extend_from_slice(&other.source_ids);
        self.recompute_totals()
    }

    fn recompute_totals(&mut self) -> Result<(), AppError> {
        self.total_deductions = self.deductions.total()?;
        self.net_pay = self.total_gross - self.total_deductions;
        Ok(())
    }

    /// `"2024-01-01"` for a single unit, otherwise
    /// `"2024-01-01 - 2024-01-05 (5 hari)"`.
    pub fn period_label(&self) -> String {
        if self.unit_count == 1 {
            self.period_start.format("%Y-%m-%d").to_string()
        } else {
            format!(
                "{} - {} ({} hari)",
                self.period_start.format("%Y-%m-%d"),
                self.period_end.format("%Y-%m-%d"),
                self.unit_count
            )
        }
    }
}

/// One display row: every record of one employee in one payment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AggregatedPayrollGroup {
    pub key: GroupKey,
    pub identity: EmployeeIdentity,
    pub period_label: String,
    #[serde(flatten)]
    pub figures: PayrollFigures,
}

/// One consolidated payslip per employee, regardless of payment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Payslip {
    pub employee: EmployeeKey,
    pub identity: EmployeeIdentity,
    pub statuses: Vec<PaymentStatus>,
    pub period_label: String,
    #[serde(flatten)]
    pub figures: PayrollFigures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    #[schema(value_type = String, format = "date", example = "2024-01-01")]
    pub start: NaiveDate,
    #[schema(value_type = String, format = "date", example = "2024-01-31")]
    pub end: NaiveDate,
}
