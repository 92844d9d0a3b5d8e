//! Capacity snapshot types and classification rules.

use serde::{Deserialize, Serialize};

use drplan_core::quotas;
use drplan_remote::{ReplicationState, SourceServer};

/// Deployment topology the tracker sweeps: one target account plus the
/// staging accounts replication fans out through, across a region set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub target_account: String,
    #[serde(default)]
    pub staging_accounts: Vec<String>,
    pub regions: Vec<String>,
}

impl Topology {
    /// All accounts in sweep order, target first.
    pub fn accounts(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.target_account).chain(self.staging_accounts.iter())
    }
}

/// Severity band for a scope's replicating/limit ratio.
///
/// The ordering is load order: `Ok < Info < Warning < Critical <
/// HyperCritical`, so `max()` over scopes yields the worst band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapacityStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "HYPER-CRITICAL")]
    HyperCritical,
}

impl CapacityStatus {
    /// Classify a replicating count against the per-scope limit.
    ///
    /// Bands: <50% OK, <75% INFO, <90% WARNING, <100% CRITICAL,
    /// at or over the limit HYPER-CRITICAL.
    pub fn classify(replicating: usize, max: usize) -> Self {
        if replicating >= max {
            return CapacityStatus::HyperCritical;
        }
        let ratio = replicating as f64 / max as f64;
        if ratio < 0.50 {
            CapacityStatus::Ok
        } else if ratio < 0.75 {
            CapacityStatus::Info
        } else if ratio < 0.90 {
            CapacityStatus::Warning
        } else {
            CapacityStatus::Critical
        }
    }
}

/// Capacity of one account×region scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCapacity {
    pub account_id: String,
    pub region: String,
    pub replicating_servers: usize,
    pub total_servers: usize,
    pub max_replicating: usize,
    pub available_slots: usize,
    pub status: CapacityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegionCapacity {
    /// Classify a scope from its inventory. Only servers replicating into
    /// `account_id` count; servers targeting other accounts are someone
    /// else's quota.
    pub fn classify(account_id: &str, region: &str, inventory: &[SourceServer]) -> Self {
        let scoped: Vec<&SourceServer> = inventory
            .iter()
            .filter(|s| s.replication_target == account_id)
            .collect();
        let replicating = scoped
            .iter()
            .filter(|s| s.state == ReplicationState::Replicating)
            .count();
        let max = quotas::MAX_REPLICATING_PER_ACCOUNT_REGION;
        Self {
            account_id: account_id.to_string(),
            region: region.to_string(),
            replicating_servers: replicating,
            total_servers: scoped.len(),
            max_replicating: max,
            available_slots: max.saturating_sub(replicating),
            status: CapacityStatus::classify(replicating, max),
            error: None,
        }
    }

    /// Placeholder for a scope the tracker could not query.
    pub fn failed(account_id: &str, region: &str, error: String) -> Self {
        Self {
            account_id: account_id.to_string(),
            region: region.to_string(),
            replicating_servers: 0,
            total_servers: 0,
            max_replicating: quotas::MAX_REPLICATING_PER_ACCOUNT_REGION,
            available_slots: 0,
            status: CapacityStatus::Ok,
            error: Some(error),
        }
    }

    /// A region with no scoped servers is inactive: it contributes nothing
    /// to rollups and can never be "over limit".
    pub fn is_active(&self) -> bool {
        self.error.is_none() && self.total_servers > 0
    }
}

/// Per-account rollup over its regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCapacity {
    pub account_id: String,
    pub active_regions: usize,
    /// Sum of per-active-region limits.
    pub total_regional_capacity: usize,
    pub available_slots: usize,
    pub status: CapacityStatus,
    pub regions: Vec<RegionCapacity>,
}

impl AccountCapacity {
    /// Roll up active regions; failed and inactive scopes are carried in
    /// `regions` but excluded from the aggregates.
    pub fn rollup(account_id: &str, regions: Vec<RegionCapacity>) -> Self {
        let active: Vec<&RegionCapacity> = regions.iter().filter(|r| r.is_active()).collect();
        Self {
            account_id: account_id.to_string(),
            active_regions: active.len(),
            total_regional_capacity: active.iter().map(|r| r.max_replicating).sum(),
            available_slots: active.iter().map(|r| r.available_slots).sum(),
            status: active
                .iter()
                .map(|r| r.status)
                .max()
                .unwrap_or(CapacityStatus::Ok),
            regions,
        }
    }
}

/// Rollup across the target account and every staging account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedCapacity {
    pub status: CapacityStatus,
    pub available_slots: usize,
    pub accounts: Vec<AccountCapacity>,
    /// `account/region` scopes the snapshot could not query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_scopes: Vec<String>,
}

impl CombinedCapacity {
    pub fn rollup(accounts: Vec<AccountCapacity>) -> Self {
        let failed_scopes = accounts
            .iter()
            .flat_map(|a| a.regions.iter())
            .filter(|r| r.error.is_some())
            .map(|r| format!("{}/{}", r.account_id, r.region))
            .collect();
        Self {
            status: accounts
                .iter()
                .map(|a| a.status)
                .max()
                .unwrap_or(CapacityStatus::Ok),
            available_slots: accounts.iter().map(|a| a.available_slots).sum(),
            accounts,
            failed_scopes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drplan_remote::mock::replicating_server;

    #[test]
    fn status_bands() {
        assert_eq!(CapacityStatus::classify(0, 300), CapacityStatus::Ok);
        assert_eq!(CapacityStatus::classify(149, 300), CapacityStatus::Ok);
        assert_eq!(CapacityStatus::classify(150, 300), CapacityStatus::Info);
        assert_eq!(CapacityStatus::classify(224, 300), CapacityStatus::Info);
        assert_eq!(CapacityStatus::classify(225, 300), CapacityStatus::Warning);
        assert_eq!(CapacityStatus::classify(270, 300), CapacityStatus::Critical);
        assert_eq!(CapacityStatus::classify(299, 300), CapacityStatus::Critical);
        assert_eq!(
            CapacityStatus::classify(300, 300),
            CapacityStatus::HyperCritical
        );
        assert_eq!(
            CapacityStatus::classify(301, 300),
            CapacityStatus::HyperCritical
        );
    }

    #[test]
    fn status_ordering_is_severity() {
        assert!(CapacityStatus::Ok < CapacityStatus::Info);
        assert!(CapacityStatus::Info < CapacityStatus::Warning);
        assert!(CapacityStatus::Warning < CapacityStatus::Critical);
        assert!(CapacityStatus::Critical < CapacityStatus::HyperCritical);
    }

    #[test]
    fn status_wire_vocabulary() {
        assert_eq!(serde_json::to_value(CapacityStatus::Ok).unwrap(), "OK");
        assert_eq!(
            serde_json::to_value(CapacityStatus::HyperCritical).unwrap(),
            "HYPER-CRITICAL"
        );
    }

    #[test]
    fn classification_is_scoped_to_target_account() {
        let inventory = vec![
            replicating_server("s-1", "111122223333"),
            replicating_server("s-2", "111122223333"),
            replicating_server("s-3", "999988887777"),
        ];
        let region = RegionCapacity::classify("111122223333", "us-east-1", &inventory);
        assert_eq!(region.total_servers, 2);
        assert_eq!(region.replicating_servers, 2);
        assert_eq!(region.available_slots, 298);
    }

    #[test]
    fn non_replicating_states_count_toward_total_only() {
        let mut stalled = replicating_server("s-2", "111122223333");
        stalled.state = ReplicationState::Stalled;
        let inventory = vec![replicating_server("s-1", "111122223333"), stalled];

        let region = RegionCapacity::classify("111122223333", "us-east-1", &inventory);
        assert_eq!(region.total_servers, 2);
        assert_eq!(region.replicating_servers, 1);
    }

    #[test]
    fn empty_region_is_inactive_and_ok() {
        let region = RegionCapacity::classify("111122223333", "eu-west-1", &[]);
        assert!(!region.is_active());
        assert_eq!(region.status, CapacityStatus::Ok);
    }

    #[test]
    fn account_rollup_matches_two_region_example() {
        // Two regions at 200/300 each: INFO, not a sum-based band.
        let regions = vec![
            region_at("us-east-1", 200),
            region_at("us-west-2", 200),
            RegionCapacity::classify("111122223333", "eu-west-1", &[]),
        ];
        let account = AccountCapacity::rollup("111122223333", regions);
        assert_eq!(account.status, CapacityStatus::Info);
        assert_eq!(account.active_regions, 2);
        assert_eq!(account.total_regional_capacity, 600);
        assert_eq!(account.available_slots, 200);
    }

    #[test]
    fn failed_scope_is_excluded_from_aggregates_and_listed() {
        let regions = vec![
            region_at("us-east-1", 10),
            RegionCapacity::failed("111122223333", "us-west-2", "unreachable".into()),
        ];
        let account = AccountCapacity::rollup("111122223333", regions);
        assert_eq!(account.active_regions, 1);

        let combined = CombinedCapacity::rollup(vec![account]);
        assert_eq!(combined.failed_scopes, vec!["111122223333/us-west-2"]);
    }

    #[test]
    fn combined_status_is_worst_account() {
        let ok = AccountCapacity::rollup("111122223333", vec![region_at("us-east-1", 10)]);
        let critical = AccountCapacity::rollup("999988887777", vec![region_at("us-east-1", 280)]);
        let combined = CombinedCapacity::rollup(vec![ok, critical]);
        assert_eq!(combined.status, CapacityStatus::Critical);
    }

    #[test]
    fn region_capacity_serializes_camel_case() {
        let json = serde_json::to_value(region_at("us-east-1", 200)).unwrap();
        assert_eq!(json["replicatingServers"], 200);
        assert_eq!(json["availableSlots"], 100);
        assert_eq!(json["maxReplicating"], 300);
        assert_eq!(json["status"], "INFO");
        assert!(json.get("error").is_none());
    }

    fn region_at(region: &str, replicating: usize) -> RegionCapacity {
        let inventory: Vec<SourceServer> = (0..replicating)
            .map(|i| replicating_server(&format!("s-{i}"), "111122223333"))
            .collect();
        RegionCapacity::classify("111122223333", region, &inventory)
    }
}
