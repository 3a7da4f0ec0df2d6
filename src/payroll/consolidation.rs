use serde::Deserialize;
use tracing::debug;
use utoipa::ToSchema;

use super::aggregation::fold_by_key;
use super::snapshot::PayrollSnapshot;
use crate::error::AppError;
use crate::model::payroll::{AggregatedPayrollGroup, GroupKey, Payslip};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PayslipRequest {
    #[schema(example = 3)]
    pub snapshot_id: u64,
    pub targets: Vec<GroupKey>,
}

/// Re-groups the selected groups by employee alone, one payslip each,
/// using the same merge rule as the table aggregation.
pub fn consolidate<'a>(
    groups: impl IntoIterator<Item = &'a AggregatedPayrollGroup>,
) -> Result<Vec<Payslip>, AppError> {
    let units = groups.into_iter().map(|group| {
        (
            group.key.employee,
            (group.identity.clone(), vec![group.key.status], group.figures.clone()),
        )
    });

    let payslips = fold_by_key(units, |(_, statuses, acc), (_, next_statuses, next)| {
        for status in next_statuses {
            if !statuses.contains(&status) {
                statuses.push(status);
            }
        }
        acc.absorb(&next)
    })?
    .into_iter()
    .map(|(employee, (identity, statuses, figures))| Payslip {
        employee,
        identity,
        statuses,
        period_label: figures.period_label(),
        figures,
    })
    .collect();
    Ok(payslips)
}

/// Consolidates the operator's selection out of `snapshot`. Every selected
/// key must still be present; a payslip silently missing a status group
/// would understate pay.
pub fn payslips_for(
    snapshot: &PayrollSnapshot,
    request: &PayslipRequest,
) -> Result<Vec<Payslip>, AppError> {
    if request.snapshot_id != snapshot.id {
        return Err(AppError::StaleSnapshot(format!(
            "payslips requested from snapshot {} but snapshot {} is current",
            request.snapshot_id, snapshot.id
        )));
    }

    let mut selected = Vec::with_capacity(request.targets.len());
    for key in &request.targets {
        let group = snapshot.find(key).ok_or_else(|| {
            AppError::StaleSnapshot(format!("group {key:?} is not in snapshot {}", snapshot.id))
        })?;
        if !selected.iter().any(|g: &&AggregatedPayrollGroup| g.key == *key) {
            selected.push(group);
        }
    }

    let payslips = consolidate(selected)?;
    debug!(
        snapshot_id = snapshot.id,
        payslips = payslips.len(),
        "Consolidated payslips"
    );
    Ok(payslips)
}
