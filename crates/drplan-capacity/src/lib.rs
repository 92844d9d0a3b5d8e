//! drplan-capacity — replication headroom snapshots.
//!
//! Answers "can this account/region absorb more replicating servers?"
//! against the 300-per-account-per-region service quota. Snapshots are
//! computed fresh per request by fanning out over every account×region
//! scope of the topology; an unreachable scope is flagged in the result,
//! never a reason to abort the whole snapshot.

pub mod snapshot;
pub mod tracker;

pub use snapshot::{
    AccountCapacity, CapacityStatus, CombinedCapacity, RegionCapacity, Topology,
};
pub use tracker::CapacityTracker;
