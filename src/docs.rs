use crate::api::leave_request::{BalanceQuery, LeaveFilter};
use crate::api::payroll::PayrollGroupQuery;
use crate::model::leave_request::{
    LeaveBalance, LeaveRequest, LeaveStatus, LeaveType, NewLeaveRequest,
};
use crate::model::payroll::{
    AggregatedPayrollGroup, DateRange, DeductionKind, Deductions, EmployeeIdentity, EmployeeKey,
    GroupKey, PaymentStatus, PayrollFigures, Payslip, RawPayrollRecord,
};
use crate::payroll::consolidation::PayslipRequest;
use crate::payroll::reconciliation::{BatchMutation, MutationAction};
use crate::payroll::snapshot::PayrollSnapshot;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll Board API",
        version = "0.1.0",
        description = r#"
## Payroll Board

Back end for the HR payroll table. Raw payroll records (one per employee per
working day) are grouped into one row per employee and payment status.

### Payroll
- **Groups**: fetch and aggregate records for a date range
- **Mutations**: apply a bonus, a deduction or a payment status to every
  record behind the selected rows, then refresh the table once
- **Payslips**: consolidate selected rows into one payslip per employee

### Leave
- Submit, approve and reject leave requests
- Annual balance against the yearly cap, checked before submission

### Response Format
- JSON bodies; money amounts are decimal strings
- Errors carry a `message` field
- A batch with failed records answers `207 Multi-Status`
"#,
    ),
    paths(
        crate::api::payroll::list_groups,
        crate::api::payroll::current_groups,
        crate::api::payroll::mutate_groups,
        crate::api::payroll::payslips,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::leave_balance,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave
    ),
    components(
        schemas(
            PayrollGroupQuery,
            PayrollSnapshot,
            AggregatedPayrollGroup,
            PayrollFigures,
            RawPayrollRecord,
            Deductions,
            DeductionKind,
            GroupKey,
            EmployeeKey,
            EmployeeIdentity,
            PaymentStatus,
            DateRange,
            Payslip,
            PayslipRequest,
            MutationAction,
            BatchMutation,
            LeaveFilter,
            BalanceQuery,
            LeaveRequest,
            NewLeaveRequest,
            LeaveBalance,
            LeaveType,
            LeaveStatus
        )
    ),
    tags(
        (name = "Payroll", description = "Payroll table, batch mutations and payslips"),
        (name = "Leave", description = "Leave requests and annual balance"),
    )
)]
pub struct ApiDoc;
