use std::sync::Arc;

use crate::config::Config;
use crate::leave::balance::LeaveBalanceCalculator;
use crate::payroll::reconciliation::ReconciliationCoordinator;
use crate::payroll::snapshot::SnapshotHolder;
use crate::store::RawRecordStore;

/// Shared per-process services handed to every handler.
pub struct AppState {
    pub store: Arc<dyn RawRecordStore>,
    pub snapshots: Arc<SnapshotHolder>,
    pub coordinator: ReconciliationCoordinator,
    pub leave: LeaveBalanceCalculator,
}

impl AppState {
    pub fn new(store: Arc<dyn RawRecordStore>, config: &Config) -> Self {
        let snapshots = Arc::new(SnapshotHolder::new());
        let coordinator = ReconciliationCoordinator::new(
            store.clone(),
            snapshots.clone(),
            config.mutation_timeout,
            config.debounce_window,
        );
        Self {
            store,
            snapshots,
            coordinator,
            leave: LeaveBalanceCalculator::new(config.annual_leave_cap),
        }
    }
}
