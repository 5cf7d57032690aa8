//! Manufacturing operation sequencing
//!
//! Turns a BOM tree into discrete jobs: one operation per manufactured node,
//! each waiting on the operations that build its inputs. Start times are the
//! longest path through the dependency DAG. Slot over-subscription is only
//! reported, never repacked.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::FacilityConstraints;
use crate::error::Result;
use crate::models::{ActivityKind, MaterialNode, Operation};

/// Absorbs float noise such as 6.000000000000001 before rounding runs up
const RUN_EPSILON: f64 = 1e-9;

/// More jobs running at once than the facility has slots for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotConflict {
    pub kind: ActivityKind,
    pub at_seconds: f64,
    pub running: u32,
    pub available: u32,
}

/// Operations in dependency order plus advisory conflicts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schedule {
    pub operations: Vec<Operation>,
    pub conflicts: Vec<SlotConflict>,
    pub makespan_seconds: f64,
}

impl Schedule {
    pub fn operation(&self, item: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.item_name.as_str() == item)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Number of discrete runs needed to cover `quantity`
pub fn run_count(quantity: f64, output_per_run: u32) -> u32 {
    let runs = (quantity / f64::from(output_per_run.max(1)) - RUN_EPSILON).ceil();
    if runs >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        (runs as u32).max(1)
    }
}

/// Linearize `tree` into a dependency-ordered list of operations
pub fn sequence(tree: &MaterialNode, constraints: &FacilityConstraints) -> Result<Schedule> {
    constraints.validate()?;

    let mut pending = Vec::new();
    discover(tree, constraints.time_multiplier(), &mut pending);

    let operations = schedule(pending);
    let conflicts = find_conflicts(&operations, constraints);
    let makespan_seconds = operations
        .iter()
        .map(|op| op.finish_seconds)
        .fold(0.0, f64::max);

    for conflict in &conflicts {
        warn!(
            kind = %conflict.kind,
            at_seconds = conflict.at_seconds,
            running = conflict.running,
            available = conflict.available,
            "insufficient slots"
        );
    }
    info!(
        item = %tree.item_name,
        operations = operations.len(),
        makespan_seconds,
        conflicts = conflicts.len(),
        "operations sequenced"
    );

    Ok(Schedule {
        operations,
        conflicts,
        makespan_seconds,
    })
}

/// Pre-order walk assigning ids; returns the id of `node`'s operation
fn discover(node: &MaterialNode, time_multiplier: f64, pending: &mut Vec<Operation>) -> Option<usize> {
    if node.is_raw_material {
        return None;
    }

    let id = pending.len();
    let runs = run_count(node.quantity_required, node.output_per_run);
    pending.push(Operation {
        id,
        item_name: node.item_name.clone(),
        kind: ActivityKind::Manufacturing,
        run_count: runs,
        duration_seconds: node.time_per_run_seconds * f64::from(runs) * time_multiplier,
        depends_on: BTreeSet::new(),
        earliest_start_seconds: 0.0,
        finish_seconds: 0.0,
    });

    let deps: BTreeSet<usize> = node
        .children
        .iter()
        .filter_map(|child| discover(child, time_multiplier, pending))
        .collect();
    pending[id].depends_on = deps;
    Some(id)
}

/// Kahn's algorithm; ready operations leave in discovery order
fn schedule(mut pending: Vec<Operation>) -> Vec<Operation> {
    let mut remaining: Vec<usize> = pending.iter().map(|op| op.depends_on.len()).collect();
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); pending.len()];
    for op in &pending {
        for &dep in &op.depends_on {
            consumers[dep].push(op.id);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(pending.len());
    while let Some(Reverse(id)) = ready.pop() {
        let start = pending[id]
            .depends_on
            .iter()
            .map(|&dep| pending[dep].finish_seconds)
            .fold(0.0, f64::max);
        pending[id].earliest_start_seconds = start;
        pending[id].finish_seconds = start + pending[id].duration_seconds;
        order.push(id);

        for &consumer in &consumers[id] {
            remaining[consumer] -= 1;
            if remaining[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    let mut slots: Vec<Option<Operation>> = pending.into_iter().map(Some).collect();
    order.into_iter().filter_map(|id| slots[id].take()).collect()
}

/// Sweep start/finish events per activity kind
fn find_conflicts(operations: &[Operation], constraints: &FacilityConstraints) -> Vec<SlotConflict> {
    let mut events: BTreeMap<ActivityKind, Vec<(f64, i32)>> = BTreeMap::new();
    for op in operations {
        if op.duration_seconds <= 0.0 {
            continue;
        }
        let kind_events = events.entry(op.kind).or_default();
        kind_events.push((op.earliest_start_seconds, 1));
        kind_events.push((op.finish_seconds, -1));
    }

    let mut conflicts = Vec::new();
    for (kind, mut kind_events) in events {
        let available = constraints.slots_for(kind);
        // Finishes before starts at the same instant
        kind_events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut running: i64 = 0;
        let mut index = 0;
        while index < kind_events.len() {
            let at = kind_events[index].0;
            while index < kind_events.len() && kind_events[index].0 == at {
                running += i64::from(kind_events[index].1);
                index += 1;
            }
            if running > i64::from(available) {
                conflicts.push(SlotConflict {
                    kind,
                    at_seconds: at,
                    running: u32::try_from(running).unwrap_or(u32::MAX),
                    available,
                });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemId, SourceKind};

    fn leaf(name: &str, quantity: f64) -> MaterialNode {
        MaterialNode {
            item_name: ItemId::new(name).unwrap(),
            quantity_required: quantity,
            is_raw_material: true,
            source_kind: SourceKind::RawMaterial,
            output_per_run: 1,
            time_per_run_seconds: 0.0,
            production_time_seconds: 0.0,
            children: vec![],
        }
    }

    fn built(name: &str, quantity: f64, per_run: u32, time: f64, children: Vec<MaterialNode>) -> MaterialNode {
        MaterialNode {
            item_name: ItemId::new(name).unwrap(),
            quantity_required: quantity,
            is_raw_material: false,
            source_kind: SourceKind::UserRecipe,
            output_per_run: per_run,
            time_per_run_seconds: time,
            production_time_seconds: time * quantity / f64::from(per_run),
            children,
        }
    }

    #[test]
    fn run_count_rounds_up() {
        assert_eq!(run_count(6.0, 1), 6);
        assert_eq!(run_count(6.0, 4), 2);
        assert_eq!(run_count(0.5, 1), 1);
        assert_eq!(run_count(6.000000000000001, 1), 6);
        assert_eq!(run_count(7.0, 0), 7);
    }

    #[test]
    fn children_finish_before_parent_starts() {
        let tree = built(
            "Root",
            2.0,
            1,
            100.0,
            vec![built("Component", 6.0, 4, 50.0, vec![leaf("Ore", 60.0)])],
        );
        let schedule = sequence(&tree, &FacilityConstraints::default()).unwrap();

        assert_eq!(schedule.operations.len(), 2);
        let component = &schedule.operations[0];
        let root = &schedule.operations[1];
        assert_eq!(component.item_name.as_str(), "Component");
        assert_eq!(component.run_count, 2);
        assert_eq!(component.duration_seconds, 100.0);
        assert_eq!(component.earliest_start_seconds, 0.0);
        assert!(root.depends_on.contains(&component.id));
        assert_eq!(root.earliest_start_seconds, 100.0);
        assert_eq!(root.finish_seconds, 300.0);
        assert_eq!(schedule.makespan_seconds, 300.0);
        assert!(schedule.operation("Ore").is_none());
    }

    #[test]
    fn siblings_leave_in_discovery_order() {
        let tree = built(
            "Root",
            1.0,
            1,
            10.0,
            vec![
                built("Alpha", 1.0, 1, 30.0, vec![leaf("Ore", 1.0)]),
                built("Beta", 1.0, 1, 20.0, vec![leaf("Ore", 1.0)]),
            ],
        );
        let schedule = sequence(&tree, &FacilityConstraints::default()).unwrap();
        let names: Vec<_> = schedule.operations.iter().map(|op| op.item_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Root"]);
        // Root waits for the slower sibling
        assert_eq!(schedule.operation("Root").unwrap().earliest_start_seconds, 30.0);
    }

    #[test]
    fn facility_bonus_shortens_jobs() {
        let tree = built("Root", 1.0, 1, 1000.0, vec![leaf("Ore", 1.0)]);
        let constraints = FacilityConstraints {
            facility_time_bonus_fraction: 0.25,
            ..FacilityConstraints::default()
        };
        let schedule = sequence(&tree, &constraints).unwrap();
        assert_eq!(schedule.operations[0].duration_seconds, 750.0);
    }

    #[test]
    fn over_subscription_is_reported_not_fatal() {
        let tree = built(
            "Root",
            1.0,
            1,
            10.0,
            vec![
                built("Alpha", 1.0, 1, 30.0, vec![leaf("Ore", 1.0)]),
                built("Beta", 1.0, 1, 20.0, vec![leaf("Ore", 1.0)]),
                built("Gamma", 1.0, 1, 20.0, vec![leaf("Ore", 1.0)]),
            ],
        );
        let constraints = FacilityConstraints {
            manufacturing_slots: 2,
            ..FacilityConstraints::default()
        };
        let schedule = sequence(&tree, &constraints).unwrap();
        assert_eq!(schedule.operations.len(), 4);
        assert_eq!(
            schedule.conflicts,
            vec![SlotConflict {
                kind: ActivityKind::Manufacturing,
                at_seconds: 0.0,
                running: 3,
                available: 2,
            }]
        );

        let roomy = sequence(&tree, &FacilityConstraints::default()).unwrap();
        assert!(!roomy.has_conflicts());
    }

    #[test]
    fn raw_root_has_no_operations() {
        let schedule = sequence(&leaf("Tritanium", 10.0), &FacilityConstraints::default()).unwrap();
        assert!(schedule.operations.is_empty());
        assert_eq!(schedule.makespan_seconds, 0.0);
    }

    #[test]
    fn invalid_bonus_is_rejected() {
        let constraints = FacilityConstraints {
            facility_time_bonus_fraction: 1.5,
            ..FacilityConstraints::default()
        };
        let tree = built("Root", 1.0, 1, 10.0, vec![leaf("Ore", 1.0)]);
        assert!(sequence(&tree, &constraints).is_err());
    }
}
