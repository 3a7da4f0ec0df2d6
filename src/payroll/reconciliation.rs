use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use actix_web::rt::time::timeout;
use futures::future::join_all;
use moka::future::Cache;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::snapshot::{PayrollSnapshot, SnapshotHolder};
use crate::error::AppError;
use crate::model::payroll::{DeductionKind, GroupKey, PaymentStatus};
use crate::store::RawRecordStore;

/// Largest bonus or deduction accepted for a single record.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

/// An operator action against whole groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationAction {
    Bonus {
        #[schema(value_type = String, example = "50000")]
        amount: Decimal,
    },
    Deduction {
        kind: DeductionKind,
        #[schema(value_type = String, example = "25000")]
        amount: Decimal,
    },
    Status {
        status: PaymentStatus,
    },
}

impl MutationAction {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            MutationAction::Bonus { amount } | MutationAction::Deduction { amount, .. }
                if amount.is_sign_negative() && !amount.is_zero() =>
            {
                Err(AppError::Validation(format!(
                    "amount must not be negative (got {amount})"
                )))
            }
            MutationAction::Bonus { amount } | MutationAction::Deduction { amount, .. }
                if *amount > MAX_AMOUNT =>
            {
                Err(AppError::Validation(format!(
                    "amount must not exceed {MAX_AMOUNT} (got {amount})"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchMutation {
    /// Snapshot the operator selected the targets from.
    #[schema(example = 3)]
    pub snapshot_id: u64,
    pub targets: Vec<GroupKey>,
    pub action: MutationAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupUpdate {
    Full,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub record_id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub key: GroupKey,
    pub update: GroupUpdate,
    pub succeeded: Vec<u64>,
    pub failed: Vec<RecordFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Refreshed { snapshot: Arc<PayrollSnapshot> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub action: MutationAction,
    pub groups: Vec<GroupOutcome>,
    /// Requested keys that were not present in the snapshot.
    pub stale_targets: Vec<GroupKey>,
    pub succeeded: usize,
    pub failed: usize,
    pub refresh: RefreshOutcome,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.stale_targets.is_empty()
    }

    pub fn partial_failure(&self) -> Option<AppError> {
        (!self.is_complete()).then_some(AppError::PartialBatch {
            succeeded: self.succeeded,
            failed: self.failed,
            stale: self.stale_targets.len(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    /// True when this request was folded into an identical recent batch.
    pub coalesced: bool,
    #[serde(flatten)]
    pub report: Arc<BatchReport>,
}

/// Identity of a batch for debouncing purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchFingerprint {
    snapshot_id: u64,
    action: MutationAction,
    targets: Vec<GroupKey>,
}

impl BatchFingerprint {
    fn of(request: &BatchMutation) -> Self {
        let mut targets = request.targets.clone();
        targets.sort();
        targets.dedup();
        Self {
            snapshot_id: request.snapshot_id,
            action: request.action.clone(),
            targets,
        }
    }
}

struct ResolvedTarget {
    key: GroupKey,
    source_ids: Vec<u64>,
}

struct BatchPlan {
    targets: Vec<ResolvedTarget>,
    stale: Vec<GroupKey>,
}

impl BatchPlan {
    /// Looks every requested key up in `snapshot`, the same snapshot the
    /// operator selected from.
    fn resolve(snapshot: &PayrollSnapshot, keys: &[GroupKey]) -> Result<Self, AppError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        let mut stale = Vec::new();

        for key in keys.iter().filter(|k| seen.insert(**k)) {
            match snapshot.find(key) {
                Some(group) => targets.push(ResolvedTarget {
                    key: *key,
                    source_ids: group.figures.source_ids.clone(),
                }),
                None => stale.push(*key),
            }
        }

        if targets.is_empty() {
            return Err(AppError::StaleSnapshot(format!(
                "none of the {} requested group(s) exist in snapshot {}",
                keys.len(),
                snapshot.id
            )));
        }
        Ok(Self { targets, stale })
    }

    fn record_count(&self) -> usize {
        self.targets.iter().map(|t| t.source_ids.len()).sum()
    }
}

/// Fans group-level actions out to the raw records behind each group.
pub struct ReconciliationCoordinator {
    store: Arc<dyn RawRecordStore>,
    snapshots: Arc<SnapshotHolder>,
    call_timeout: Duration,
    recent: Cache<BatchFingerprint, Arc<BatchReport>>,
}

impl ReconciliationCoordinator {
    pub fn new(
        store: Arc<dyn RawRecordStore>,
        snapshots: Arc<SnapshotHolder>,
        call_timeout: Duration,
        debounce_window: Duration,
    ) -> Self {
        Self {
            store,
            snapshots,
            call_timeout,
            recent: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(debounce_window)
                .build(),
        }
    }

    /// Applies `request` to every raw record behind its target groups.
    ///
    /// Identical requests inside the debounce window, or arriving while an
    /// identical batch is still running, share that batch's report instead
    /// of mutating again.
    pub async fn apply(&self, request: BatchMutation) -> Result<BatchResponse, AppError> {
        request.action.validate()?;

        let fingerprint = BatchFingerprint::of(&request);
        if let Some(report) = self.recent.get(&fingerprint).await {
            info!(batch_id = %report.batch_id, "Coalesced repeated payroll batch");
            return Ok(BatchResponse {
                coalesced: true,
                report,
            });
        }

        let snapshot = self
            .snapshots
            .current()
            .ok_or_else(|| AppError::StaleSnapshot("no payroll snapshot loaded".into()))?;
        if snapshot.id != request.snapshot_id {
            return Err(AppError::StaleSnapshot(format!(
                "request targets snapshot {} but snapshot {} is current; reload and retry",
                request.snapshot_id, snapshot.id
            )));
        }

        let plan = BatchPlan::resolve(&snapshot, &request.targets)?;
        let entry = self
            .recent
            .entry(fingerprint)
            .or_insert_with(self.execute(snapshot, plan, request.action))
            .await;

        let coalesced = !entry.is_fresh();
        if coalesced {
            info!(batch_id = %entry.value().batch_id, "Joined in-flight payroll batch");
        }
        Ok(BatchResponse {
            coalesced,
            report: entry.into_value(),
        })
    }

    async fn execute(
        &self,
        snapshot: Arc<PayrollSnapshot>,
        plan: BatchPlan,
        action: MutationAction,
    ) -> Arc<BatchReport> {
        let batch_id = Uuid::new_v4().to_string();
        info!(
            batch_id = %batch_id,
            snapshot_id = snapshot.id,
            ?action,
            groups = plan.targets.len(),
            records = plan.record_count(),
            "Applying payroll batch"
        );

        let action_ref = &action;
        let calls = plan.targets.iter().enumerate().flat_map(move |(slot, target)| {
            target
                .source_ids
                .iter()
                .map(move |&record_id| async move {
                    (slot, record_id, self.apply_one(record_id, action_ref).await)
                })
        });
        let results = join_all(calls).await;

        let mut groups: Vec<GroupOutcome> = plan
            .targets
            .iter()
            .map(|t| GroupOutcome {
                key: t.key,
                update: GroupUpdate::Full,
                succeeded: Vec::new(),
                failed: Vec::new(),
            })
            .collect();

        for (slot, record_id, result) in results {
            match result {
                Ok(()) => groups[slot].succeeded.push(record_id),
                Err(e) => {
                    warn!(batch_id = %batch_id, record_id, error = %e, "Payroll record mutation failed");
                    groups[slot].failed.push(RecordFailure {
                        record_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        for group in &mut groups {
            if !group.failed.is_empty() {
                group.update = GroupUpdate::Partial;
            }
        }

        let succeeded = groups.iter().map(|g| g.succeeded.len()).sum();
        let failed = groups.iter().map(|g| g.failed.len()).sum();

        if let MutationAction::Status {
            status: PaymentStatus::Paid,
        } = action
        {
            info!(batch_id = %batch_id, records = succeeded, "Records marked paid; payslips are rendered downstream");
        }

        let refresh = match self.snapshots.load(self.store.as_ref(), snapshot.range).await {
            Ok(snapshot) => RefreshOutcome::Refreshed { snapshot },
            Err(e) => {
                warn!(batch_id = %batch_id, error = %e, "Refetch after payroll batch failed");
                RefreshOutcome::Failed {
                    reason: format!("mutation likely succeeded, display may be stale: {e}"),
                }
            }
        };

        info!(batch_id = %batch_id, succeeded, failed, "Payroll batch settled");
        Arc::new(BatchReport {
            batch_id,
            action,
            groups,
            stale_targets: plan.stale,
            succeeded,
            failed,
            refresh,
        })
    }

    async fn apply_one(&self, record_id: u64, action: &MutationAction) -> Result<(), AppError> {
        let call = async {
            match *action {
                MutationAction::Bonus { amount } => self.store.set_bonus(record_id, amount).await,
                MutationAction::Deduction { kind, amount } => {
                    self.store.set_deduction(record_id, kind, amount).await
                }
                MutationAction::Status { status } => {
                    self.store.set_payment_status(record_id, status).await
                }
            }
        };

        timeout(self.call_timeout, call).await.unwrap_or_else(|_| {
            Err(AppError::Network(format!(
                "record {record_id} timed out after {}s",
                self.call_timeout.as_secs_f32()
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payroll::{EmployeeKey, RawPayrollRecord};
    use crate::payroll::aggregation::tests::record;
    use crate::store::memory::InMemoryStore;
    use rust_decimal_macros::dec;

    const LONG: Duration = Duration::from_secs(10);
    const DEBOUNCE: Duration = Duration::from_secs(2);

    fn key(employee: u64, status: PaymentStatus) -> GroupKey {
        GroupKey {
            employee: EmployeeKey::Id(employee),
            status,
        }
    }

    /// Five employees with two unpaid days each; record ids `2e-1` and `2e`.
    fn five_groups() -> Vec<RawPayrollRecord> {
        (1..=5u64)
            .flat_map(|e| {
                [
                    record(e * 2 - 1, e, 1, dec!(100000), dec!(0), PaymentStatus::Unpaid),
                    record(e * 2, e, 2, dec!(100000), dec!(0), PaymentStatus::Unpaid),
                ]
            })
            .collect()
    }

    async fn setup(
        records: Vec<RawPayrollRecord>,
        call_timeout: Duration,
    ) -> (Arc<InMemoryStore>, ReconciliationCoordinator, Arc<PayrollSnapshot>) {
        let store = Arc::new(InMemoryStore::with_records(records));
        let snapshots = Arc::new(SnapshotHolder::new());
        let snapshot = snapshots.load(store.as_ref(), None).await.unwrap();
        let coordinator =
            ReconciliationCoordinator::new(store.clone(), snapshots, call_timeout, DEBOUNCE);
        (store, coordinator, snapshot)
    }

    fn unpaid_targets() -> Vec<GroupKey> {
        (1..=5).map(|e| key(e, PaymentStatus::Unpaid)).collect()
    }

    #[actix_web::test]
    async fn one_failing_record_only_marks_its_group_partial() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;
        store.fail_record(6);

        let response = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: unpaid_targets(),
                action: MutationAction::Bonus { amount: dec!(5000) },
            })
            .await
            .unwrap();
        let report = &response.report;

        assert!(!response.coalesced);
        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed, 1);
        let full = report
            .groups
            .iter()
            .filter(|g| g.update == GroupUpdate::Full)
            .count();
        assert_eq!(full, 4);

        let partial = report
            .groups
            .iter()
            .find(|g| g.update == GroupUpdate::Partial)
            .unwrap();
        assert_eq!(partial.key, key(3, PaymentStatus::Unpaid));
        assert_eq!(partial.failed.len(), 1);
        assert_eq!(partial.failed[0].record_id, 6);
        assert_eq!(partial.succeeded, vec![5]);

        assert!(matches!(
            report.partial_failure(),
            Some(AppError::PartialBatch { succeeded: 9, failed: 1, stale: 0 })
        ));
        assert_eq!(store.record(5).unwrap().bonus, dec!(5000));
        assert_eq!(store.record(6).unwrap().bonus, dec!(0));
    }

    #[actix_web::test]
    async fn refetches_exactly_once_after_settling() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;
        assert_eq!(store.fetch_calls(), 1);

        let response = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: vec![key(1, PaymentStatus::Unpaid)],
                action: MutationAction::Deduction {
                    kind: DeductionKind::Loan,
                    amount: dec!(20000),
                },
            })
            .await
            .unwrap();

        assert_eq!(store.fetch_calls(), 2);
        let RefreshOutcome::Refreshed { snapshot: fresh } = &response.report.refresh else {
            panic!("expected a refreshed snapshot");
        };
        let group = fresh.find(&key(1, PaymentStatus::Unpaid)).unwrap();
        assert_eq!(group.figures.deductions.loan, dec!(40000));
        assert_eq!(group.figures.total_deductions, dec!(40000));
        assert_eq!(
            group.figures.net_pay,
            group.figures.total_gross - group.figures.total_deductions
        );
        assert_eq!(group.figures.net_pay, dec!(160000));
    }

    #[actix_web::test]
    async fn timed_out_record_fails_alone() {
        let (store, coordinator, snapshot) =
            setup(five_groups(), Duration::from_millis(50)).await;
        store.delay_record(2, Duration::from_millis(500));

        let response = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: vec![key(1, PaymentStatus::Unpaid), key(2, PaymentStatus::Unpaid)],
                action: MutationAction::Bonus { amount: dec!(1000) },
            })
            .await
            .unwrap();

        assert_eq!(response.report.succeeded, 3);
        assert_eq!(response.report.failed, 1);
        let failure = &response.report.groups[0].failed[0];
        assert_eq!(failure.record_id, 2);
        assert!(failure.reason.contains("timed out"));
    }

    #[actix_web::test]
    async fn stale_snapshot_id_is_rejected_without_calls() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;

        let err = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id + 1,
                targets: unpaid_targets(),
                action: MutationAction::Bonus { amount: dec!(1) },
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StaleSnapshot(_)));
        assert_eq!(store.mutation_calls(), 0);
    }

    #[actix_web::test]
    async fn missing_keys_are_reported_as_stale_targets() {
        let (_store, coordinator, snapshot) = setup(five_groups(), LONG).await;

        let response = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: vec![key(1, PaymentStatus::Unpaid), key(1, PaymentStatus::Paid)],
                action: MutationAction::Status {
                    status: PaymentStatus::Pending,
                },
            })
            .await
            .unwrap();

        assert_eq!(response.report.stale_targets, vec![key(1, PaymentStatus::Paid)]);
        assert_eq!(response.report.succeeded, 2);
        let partial = response.report.partial_failure().unwrap();
        assert!(matches!(
            partial,
            AppError::PartialBatch { succeeded: 2, failed: 0, stale: 1 }
        ));
        assert!(partial.to_string().contains("1 group(s) skipped"));
    }

    #[actix_web::test]
    async fn all_keys_missing_is_a_stale_snapshot() {
        let (_store, coordinator, snapshot) = setup(five_groups(), LONG).await;

        let err = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: vec![key(9, PaymentStatus::Unpaid)],
                action: MutationAction::Bonus { amount: dec!(1) },
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StaleSnapshot(_)));
    }

    #[actix_web::test]
    async fn negative_amount_never_reaches_the_store() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;

        let err = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: unpaid_targets(),
                action: MutationAction::Deduction {
                    kind: DeductionKind::IncomeTax,
                    amount: dec!(-10),
                },
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.mutation_calls(), 0);
    }

    #[actix_web::test]
    async fn oversized_amount_never_reaches_the_store() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;

        for action in [
            MutationAction::Bonus { amount: Decimal::MAX },
            MutationAction::Deduction {
                kind: DeductionKind::Loan,
                amount: MAX_AMOUNT + dec!(1),
            },
        ] {
            let err = coordinator
                .apply(BatchMutation {
                    snapshot_id: snapshot.id,
                    targets: vec![key(1, PaymentStatus::Unpaid)],
                    action,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(store.mutation_calls(), 0);

        let capped = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: vec![key(1, PaymentStatus::Unpaid)],
                action: MutationAction::Bonus { amount: MAX_AMOUNT },
            })
            .await
            .unwrap();
        assert!(capped.report.is_complete());
        assert!(matches!(capped.report.refresh, RefreshOutcome::Refreshed { .. }));
    }

    #[actix_web::test]
    async fn repeated_request_inside_window_is_coalesced() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;
        let request = BatchMutation {
            snapshot_id: snapshot.id,
            targets: unpaid_targets(),
            action: MutationAction::Bonus { amount: dec!(2500) },
        };

        let first = coordinator.apply(request.clone()).await.unwrap();
        let second = coordinator.apply(request).await.unwrap();

        assert!(!first.coalesced);
        assert!(second.coalesced);
        assert_eq!(first.report.batch_id, second.report.batch_id);
        assert_eq!(store.mutation_calls(), 10);
        assert_eq!(store.fetch_calls(), 2);
    }

    #[actix_web::test]
    async fn identical_request_runs_again_after_window() {
        let store = Arc::new(InMemoryStore::with_records(five_groups()));
        let snapshots = Arc::new(SnapshotHolder::new());
        let snapshot = snapshots.load(store.as_ref(), None).await.unwrap();
        let coordinator = ReconciliationCoordinator::new(
            store.clone(),
            snapshots,
            LONG,
            Duration::from_millis(100),
        );
        // keeps the snapshot id unchanged between the two batches
        store.fail_fetches(true);

        let request = BatchMutation {
            snapshot_id: snapshot.id,
            targets: vec![key(1, PaymentStatus::Unpaid)],
            action: MutationAction::Bonus { amount: dec!(100) },
        };
        let first = coordinator.apply(request.clone()).await.unwrap();
        let inside = coordinator.apply(request.clone()).await.unwrap();
        assert!(inside.coalesced);
        assert_eq!(store.mutation_calls(), 2);

        actix_web::rt::time::sleep(Duration::from_millis(300)).await;
        let after = coordinator.apply(request).await.unwrap();
        assert!(!after.coalesced);
        assert_ne!(after.report.batch_id, first.report.batch_id);
        assert_eq!(store.mutation_calls(), 4);
    }

    #[actix_web::test]
    async fn concurrent_identical_requests_run_once() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;
        store.delay_record(1, Duration::from_millis(50));
        let request = BatchMutation {
            snapshot_id: snapshot.id,
            targets: unpaid_targets(),
            action: MutationAction::Status {
                status: PaymentStatus::Paid,
            },
        };

        let (a, b) = futures::join!(
            coordinator.apply(request.clone()),
            coordinator.apply(request)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.report.batch_id, b.report.batch_id);
        assert!(a.coalesced != b.coalesced);
        assert_eq!(store.mutation_calls(), 10);
    }

    #[actix_web::test]
    async fn paid_status_can_be_reverted() {
        let (_store, coordinator, snapshot) = setup(five_groups(), LONG).await;

        let paid = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: vec![key(4, PaymentStatus::Unpaid)],
                action: MutationAction::Status {
                    status: PaymentStatus::Paid,
                },
            })
            .await
            .unwrap();
        let RefreshOutcome::Refreshed { snapshot: after_paid } = &paid.report.refresh else {
            panic!("expected a refreshed snapshot");
        };
        assert!(after_paid.find(&key(4, PaymentStatus::Unpaid)).is_none());
        assert_eq!(
            after_paid
                .find(&key(4, PaymentStatus::Paid))
                .unwrap()
                .figures
                .source_ids,
            vec![7, 8]
        );

        let undone = coordinator
            .apply(BatchMutation {
                snapshot_id: after_paid.id,
                targets: vec![key(4, PaymentStatus::Paid)],
                action: MutationAction::Status {
                    status: PaymentStatus::Unpaid,
                },
            })
            .await
            .unwrap();
        assert!(undone.report.is_complete());
        let RefreshOutcome::Refreshed { snapshot: after_undo } = &undone.report.refresh else {
            panic!("expected a refreshed snapshot");
        };
        assert!(after_undo.find(&key(4, PaymentStatus::Unpaid)).is_some());
    }

    #[actix_web::test]
    async fn failed_refetch_is_reported_separately() {
        let (store, coordinator, snapshot) = setup(five_groups(), LONG).await;
        store.fail_fetches(true);

        let response = coordinator
            .apply(BatchMutation {
                snapshot_id: snapshot.id,
                targets: vec![key(2, PaymentStatus::Unpaid)],
                action: MutationAction::Bonus { amount: dec!(750) },
            })
            .await
            .unwrap();

        assert_eq!(response.report.succeeded, 2);
        assert!(response.report.is_complete());
        let RefreshOutcome::Failed { reason } = &response.report.refresh else {
            panic!("expected the refresh to fail");
        };
        assert!(reason.starts_with("mutation likely succeeded"));
        assert_eq!(store.record(3).unwrap().bonus, dec!(750));
    }
}
