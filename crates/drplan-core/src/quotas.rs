//! Hard remote-service quotas.
//!
//! These limits are enforced unconditionally by the recovery service and
//! are not adjustable. Creation-time validation blocks configurations that
//! exceed them; start-time conflict detection re-checks them because
//! tag-resolved membership can drift between creation and execution.

/// Maximum source servers in a single recovery job (one job per wave).
pub const MAX_SERVERS_PER_JOB: usize = 100;

/// Maximum source servers across all concurrently-launched jobs of a plan.
pub const MAX_TOTAL_SERVERS_IN_JOBS: usize = 500;

/// Maximum concurrent recovery jobs per region.
pub const MAX_CONCURRENT_JOBS_PER_REGION: usize = 20;

/// Maximum replicating servers per account per region.
pub const MAX_REPLICATING_PER_ACCOUNT_REGION: usize = 300;
