pub mod aggregation;
pub mod consolidation;
pub mod reconciliation;
pub mod snapshot;
