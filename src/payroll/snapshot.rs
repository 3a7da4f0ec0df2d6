use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::aggregation::aggregate;
use crate::error::AppError;
use crate::model::payroll::{AggregatedPayrollGroup, DateRange, GroupKey};
use crate::store::RawRecordStore;

/// The groups produced from one fetch. Never patched after creation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayrollSnapshot {
    #[schema(example = 3)]
    pub id: u64,
    pub range: Option<DateRange>,
    #[schema(value_type = String, format = "date-time")]
    pub fetched_at: DateTime<Utc>,
    pub groups: Vec<AggregatedPayrollGroup>,
}

impl PayrollSnapshot {
    pub fn find(&self, key: &GroupKey) -> Option<&AggregatedPayrollGroup> {
        self.groups.iter().find(|g| &g.key == key)
    }
}

/// Proof that a fetch was started; only the newest ticket may install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    range: Option<DateRange>,
}

#[derive(Default)]
struct HolderState {
    latest_generation: u64,
    current: Option<Arc<PayrollSnapshot>>,
}

/// Holds the snapshot the operator is currently looking at.
#[derive(Default)]
pub struct SnapshotHolder {
    state: RwLock<HolderState>,
}

impl SnapshotHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<PayrollSnapshot>> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .current
            .clone()
    }

    /// Registers a new fetch. Any fetch begun earlier is superseded.
    pub fn begin(&self, range: Option<DateRange>) -> FetchTicket {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.latest_generation += 1;
        FetchTicket {
            generation: state.latest_generation,
            range,
        }
    }

    /// Installs the groups fetched under `ticket`, or discards them when a
    /// newer fetch has started in the meantime.
    pub fn install(
        &self,
        ticket: FetchTicket,
        groups: Vec<AggregatedPayrollGroup>,
    ) -> Result<Arc<PayrollSnapshot>, AppError> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if ticket.generation != state.latest_generation {
            warn!(
                generation = ticket.generation,
                latest = state.latest_generation,
                "Discarding superseded payroll fetch"
            );
            return Err(AppError::FetchSuperseded);
        }

        let snapshot = Arc::new(PayrollSnapshot {
            id: ticket.generation,
            range: ticket.range,
            fetched_at: Utc::now(),
            groups,
        });
        state.current = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Fetches raw records for `range`, aggregates them and installs the
    /// result as the current snapshot.
    pub async fn load(
        &self,
        store: &dyn RawRecordStore,
        range: Option<DateRange>,
    ) -> Result<Arc<PayrollSnapshot>, AppError> {
        let ticket = self.begin(range);
        debug!(generation = ticket.generation, ?range, "Fetching payroll records");

        let records = store.fetch_payroll(range).await?;
        let groups = aggregate(&records)?;
        let snapshot = self.install(ticket, groups)?;

        info!(
            snapshot_id = snapshot.id,
            records = records.len(),
            groups = snapshot.groups.len(),
            "Payroll snapshot installed"
        );
        Ok(snapshot)
    }
}
