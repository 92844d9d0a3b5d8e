//! Shared server-membership resolution.
//!
//! Both admission gates resolve protection-group selections the same way:
//! explicit lists are deduplicated in order, tag queries go through the
//! remote service at the moment of the check.

use std::collections::HashSet;

use drplan_core::{ProtectionGroup, ServerId, ServerSelection, Wave};
use drplan_remote::RecoveryService;
use drplan_state::StateStore;

use crate::error::{AdmissionError, AdmissionResult};

/// Resolve a selection to its current server membership.
pub async fn resolve_selection(
    service: &dyn RecoveryService,
    region: &str,
    selection: &ServerSelection,
) -> AdmissionResult<Vec<ServerId>> {
    let servers = match selection {
        ServerSelection::Explicit { server_ids } => dedup(server_ids.clone()),
        ServerSelection::TagQuery { tags } => {
            dedup(service.resolve_servers_by_tag(region, tags).await?)
        }
    };
    Ok(servers)
}

/// Resolve a wave to the union of its groups' current memberships.
pub async fn resolve_wave(
    store: &StateStore,
    service: &dyn RecoveryService,
    wave: &Wave,
) -> AdmissionResult<Vec<ServerId>> {
    let mut servers = Vec::new();
    for group_id in &wave.protection_group_ids {
        let group = load_group(store, group_id)?;
        servers.extend(resolve_selection(service, &group.region, &group.selection).await?);
    }
    Ok(dedup(servers))
}

/// Load a group, mapping absence to the admission vocabulary.
pub fn load_group(store: &StateStore, group_id: &str) -> AdmissionResult<ProtectionGroup> {
    store
        .get_protection_group(group_id)?
        .ok_or_else(|| AdmissionError::UnknownGroup(group_id.to_string()))
}

/// Regions touched by a set of waves (deduplicated, in first-seen order).
pub fn wave_regions(store: &StateStore, waves: &[Wave]) -> AdmissionResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut regions = Vec::new();
    for wave in waves {
        for group_id in &wave.protection_group_ids {
            let group = load_group(store, group_id)?;
            if seen.insert(group.region.clone()) {
                regions.push(group.region);
            }
        }
    }
    Ok(regions)
}

fn dedup(servers: Vec<ServerId>) -> Vec<ServerId> {
    let mut seen = HashSet::new();
    servers.into_iter().filter(|s| seen.insert(s.clone())).collect()
}
