//! Fan-out capacity sweep over the topology.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use drplan_remote::ServiceFactory;

use crate::snapshot::{AccountCapacity, CombinedCapacity, RegionCapacity, Topology};

/// Default concurrent inventory queries per snapshot.
pub const DEFAULT_SWEEP_PERMITS: usize = 8;

/// Computes fresh capacity snapshots against the remote service.
pub struct CapacityTracker {
    factory: Arc<dyn ServiceFactory>,
    permits: usize,
}

impl CapacityTracker {
    pub fn new(factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            factory,
            permits: DEFAULT_SWEEP_PERMITS,
        }
    }

    pub fn with_permits(factory: Arc<dyn ServiceFactory>, permits: usize) -> Self {
        Self {
            factory,
            permits: permits.max(1),
        }
    }

    /// Sweep every account×region scope of the topology concurrently.
    ///
    /// A scope whose credentials or inventory query fail is returned as a
    /// flagged [`RegionCapacity`] and listed in `failed_scopes`; the rest
    /// of the snapshot is unaffected.
    pub async fn combined_capacity(&self, topology: &Topology) -> CombinedCapacity {
        let semaphore = Arc::new(Semaphore::new(self.permits));
        let mut sweeps = JoinSet::new();

        for account_id in topology.accounts() {
            for region in &topology.regions {
                let factory = self.factory.clone();
                let semaphore = semaphore.clone();
                let account_id = account_id.clone();
                let region = region.clone();
                sweeps.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    sweep_scope(factory, account_id, region).await
                });
            }
        }

        // Scope order must be deterministic regardless of completion order.
        let mut by_account: BTreeMap<String, Vec<RegionCapacity>> = BTreeMap::new();
        while let Some(joined) = sweeps.join_next().await {
            match joined {
                Ok(region) => by_account
                    .entry(region.account_id.clone())
                    .or_default()
                    .push(region),
                Err(e) => warn!(error = %e, "capacity sweep task panicked"),
            }
        }

        let mut accounts = Vec::new();
        for account_id in topology.accounts() {
            let mut regions = by_account.remove(account_id).unwrap_or_default();
            regions.sort_by(|a, b| a.region.cmp(&b.region));
            accounts.push(AccountCapacity::rollup(account_id, regions));
        }

        let combined = CombinedCapacity::rollup(accounts);
        debug!(
            status = ?combined.status,
            available_slots = combined.available_slots,
            failed_scopes = combined.failed_scopes.len(),
            "capacity snapshot complete"
        );
        combined
    }
}

async fn sweep_scope(
    factory: Arc<dyn ServiceFactory>,
    account_id: String,
    region: String,
) -> RegionCapacity {
    let service = match factory.service_for(&account_id) {
        Ok(service) => service,
        Err(e) => {
            warn!(account_id = %account_id, region = %region, error = %e, "scope credentials failed");
            return RegionCapacity::failed(&account_id, &region, e.to_string());
        }
    };
    match service.list_inventory(&account_id, &region).await {
        Ok(inventory) => RegionCapacity::classify(&account_id, &region, &inventory),
        Err(e) => {
            warn!(account_id = %account_id, region = %region, error = %e, "scope inventory query failed");
            RegionCapacity::failed(&account_id, &region, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CapacityStatus;
    use drplan_remote::mock::{replicating_server, MockFactory, MockRecoveryService};

    fn topology(staging: &[&str], regions: &[&str]) -> Topology {
        Topology {
            target_account: "111122223333".to_string(),
            staging_accounts: staging.iter().map(|s| s.to_string()).collect(),
            regions: regions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn seed_region(mock: &MockRecoveryService, account: &str, region: &str, count: usize) {
        let servers = (0..count)
            .map(|i| replicating_server(&format!("{region}-s-{i}"), account))
            .collect();
        mock.set_inventory(account, region, servers);
    }

    #[tokio::test]
    async fn two_half_full_regions_roll_up_to_info() {
        let mock = MockRecoveryService::new();
        seed_region(&mock, "111122223333", "us-east-1", 200);
        seed_region(&mock, "111122223333", "us-west-2", 200);
        let tracker = CapacityTracker::new(MockFactory::new(mock));

        let snapshot = tracker
            .combined_capacity(&topology(&[], &["us-east-1", "us-west-2"]))
            .await;

        assert_eq!(snapshot.status, CapacityStatus::Info);
        let account = &snapshot.accounts[0];
        assert_eq!(account.active_regions, 2);
        assert_eq!(account.total_regional_capacity, 600);
        assert_eq!(account.available_slots, 200);
        assert!(snapshot.failed_scopes.is_empty());
    }

    #[tokio::test]
    async fn empty_regions_do_not_inflate_capacity() {
        let mock = MockRecoveryService::new();
        seed_region(&mock, "111122223333", "us-east-1", 10);
        let tracker = CapacityTracker::new(MockFactory::new(mock));

        let snapshot = tracker
            .combined_capacity(&topology(&[], &["us-east-1", "eu-west-1", "ap-south-1"]))
            .await;

        let account = &snapshot.accounts[0];
        assert_eq!(account.active_regions, 1);
        assert_eq!(account.total_regional_capacity, 300);
        // Inactive regions still appear in the detail list.
        assert_eq!(account.regions.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_staging_account_is_flagged_not_fatal() {
        let mock = MockRecoveryService::new();
        seed_region(&mock, "111122223333", "us-east-1", 50);
        let factory = MockFactory::new(mock);
        factory.fail_account("999988887777");
        let tracker = CapacityTracker::new(factory);

        let snapshot = tracker
            .combined_capacity(&topology(&["999988887777"], &["us-east-1"]))
            .await;

        assert_eq!(snapshot.failed_scopes, vec!["999988887777/us-east-1"]);
        // The target account's data is intact.
        let target = &snapshot.accounts[0];
        assert_eq!(target.account_id, "111122223333");
        assert_eq!(target.available_slots, 250);
        assert_eq!(snapshot.status, CapacityStatus::Ok);
    }

    #[tokio::test]
    async fn inventory_failure_flags_only_that_scope() {
        let mock = MockRecoveryService::new();
        seed_region(&mock, "111122223333", "us-east-1", 50);
        seed_region(&mock, "111122223333", "us-west-2", 50);
        mock.fail_next(
            "list_inventory",
            drplan_remote::RemoteError::Throttled("busy".into()),
        );
        let tracker = CapacityTracker::with_permits(MockFactory::new(mock), 1);

        let snapshot = tracker
            .combined_capacity(&topology(&[], &["us-east-1", "us-west-2"]))
            .await;

        assert_eq!(snapshot.failed_scopes.len(), 1);
        let account = &snapshot.accounts[0];
        assert_eq!(account.active_regions, 1);
    }

    #[tokio::test]
    async fn account_order_is_target_first() {
        let mock = MockRecoveryService::new();
        seed_region(&mock, "111122223333", "us-east-1", 1);
        seed_region(&mock, "444455556666", "us-east-1", 1);
        let tracker = CapacityTracker::new(MockFactory::new(mock));

        let snapshot = tracker
            .combined_capacity(&topology(&["444455556666"], &["us-east-1"]))
            .await;

        let order: Vec<&str> = snapshot
            .accounts
            .iter()
            .map(|a| a.account_id.as_str())
            .collect();
        assert_eq!(order, vec!["111122223333", "444455556666"]);
    }
}
