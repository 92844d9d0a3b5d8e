//! Wave dependency graph validation and layering.
//!
//! Cycles are rejected at plan creation; the orchestrator assumes
//! acyclicity and walks the graph in dependency layers, starting every
//! wave of a layer concurrently.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::error::{ValidationError, ValidationResult};
use crate::types::{RecoveryPlan, Wave, WaveId};

/// Validate the structural integrity of a plan's wave graph.
///
/// Checks: at least one wave, unique wave ids, every wave references at
/// least one protection group, every `depends_on` target exists, and the
/// graph is acyclic.
pub fn validate(plan: &RecoveryPlan) -> ValidationResult<()> {
    if plan.waves.is_empty() {
        return Err(ValidationError::NoWaves);
    }

    let mut ids = HashSet::new();
    for wave in &plan.waves {
        if !ids.insert(wave.id.as_str()) {
            return Err(ValidationError::DuplicateWaveId(wave.id.clone()));
        }
        if wave.protection_group_ids.is_empty() {
            return Err(ValidationError::EmptyWave {
                wave: wave.id.clone(),
            });
        }
    }
    for wave in &plan.waves {
        for dep in &wave.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    wave: wave.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    detect_cycles(&plan.waves)
}

/// DFS cycle detection over the `depends_on` edges.
fn detect_cycles(waves: &[Wave]) -> ValidationResult<()> {
    let edges: BTreeMap<&str, &BTreeSet<WaveId>> =
        waves.iter().map(|w| (w.id.as_str(), &w.depends_on)).collect();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        edges: &BTreeMap<&'a str, &'a BTreeSet<WaveId>>,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> ValidationResult<()> {
        visited.insert(node);
        stack.insert(node);
        if let Some(deps) = edges.get(node) {
            for dep in deps.iter() {
                if stack.contains(dep.as_str()) {
                    return Err(ValidationError::DependencyCycle {
                        wave: dep.clone(),
                    });
                }
                if !visited.contains(dep.as_str()) {
                    visit(dep, edges, visited, stack)?;
                }
            }
        }
        stack.remove(node);
        Ok(())
    }

    for wave in waves {
        if !visited.contains(wave.id.as_str()) {
            visit(&wave.id, &edges, &mut visited, &mut stack)?;
        }
    }
    Ok(())
}

/// Kahn layering: waves grouped so that each layer depends only on earlier
/// layers. Waves within one layer have no ordering requirement and may be
/// started concurrently.
///
/// Assumes the plan already passed [`validate`].
pub fn execution_layers(plan: &RecoveryPlan) -> Vec<Vec<WaveId>> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = plan
        .waves
        .iter()
        .map(|w| {
            (
                w.id.as_str(),
                w.depends_on.iter().map(|d| d.as_str()).collect(),
            )
        })
        .collect();

    let mut layers = Vec::new();
    let mut done: HashSet<&str> = HashSet::new();
    let mut order: VecDeque<&str> = plan.waves.iter().map(|w| w.id.as_str()).collect();

    while !remaining.is_empty() {
        let ready: Vec<&str> = order
            .iter()
            .filter(|id| {
                remaining
                    .get(*id)
                    .is_some_and(|deps| deps.iter().all(|d| done.contains(d)))
            })
            .copied()
            .collect();
        if ready.is_empty() {
            // Unreachable after validate(); bail rather than loop forever.
            break;
        }
        for id in &ready {
            remaining.remove(id);
            done.insert(id);
        }
        order.retain(|id| !done.contains(id));
        layers.push(ready.iter().map(|s| s.to_string()).collect());
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn wave(id: &str, deps: &[&str]) -> Wave {
        Wave {
            id: id.to_string(),
            name: id.to_string(),
            protection_group_ids: vec!["pg-1".into()],
            depends_on: deps.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            pause_before: false,
        }
    }

    fn plan(waves: Vec<Wave>) -> RecoveryPlan {
        RecoveryPlan {
            id: "plan-1".into(),
            name: "plan".into(),
            waves,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn empty_plan_rejected() {
        assert_eq!(validate(&plan(vec![])), Err(ValidationError::NoWaves));
    }

    #[test]
    fn duplicate_wave_id_rejected() {
        let p = plan(vec![wave("w1", &[]), wave("w1", &[])]);
        assert_eq!(
            validate(&p),
            Err(ValidationError::DuplicateWaveId("w1".into()))
        );
    }

    #[test]
    fn unknown_dependency_rejected() {
        let p = plan(vec![wave("w1", &["ghost"])]);
        assert!(matches!(
            validate(&p),
            Err(ValidationError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn self_cycle_rejected() {
        let p = plan(vec![wave("w1", &["w1"])]);
        assert!(matches!(
            validate(&p),
            Err(ValidationError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn long_cycle_rejected() {
        let p = plan(vec![
            wave("w1", &["w3"]),
            wave("w2", &["w1"]),
            wave("w3", &["w2"]),
        ]);
        assert!(matches!(
            validate(&p),
            Err(ValidationError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn deep_acyclic_chain_accepted() {
        let waves: Vec<Wave> = (0..50)
            .map(|i| {
                if i == 0 {
                    wave("w0", &[])
                } else {
                    let dep = format!("w{}", i - 1);
                    wave(&format!("w{i}"), &[dep.as_str()])
                }
            })
            .collect();
        assert!(validate(&plan(waves)).is_ok());
    }

    #[test]
    fn diamond_layers() {
        let p = plan(vec![
            wave("a", &[]),
            wave("b", &["a"]),
            wave("c", &["a"]),
            wave("d", &["b", "c"]),
        ]);
        assert!(validate(&p).is_ok());
        let layers = execution_layers(&p);
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], vec!["a".to_string()]);
        assert_eq!(layers[1], vec!["b".to_string(), "c".to_string()]);
        assert_eq!(layers[2], vec!["d".to_string()]);
    }

    #[test]
    fn independent_waves_share_a_layer() {
        let p = plan(vec![wave("a", &[]), wave("b", &[]), wave("c", &[])]);
        let layers = execution_layers(&p);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 3);
    }
}
