//! Evaluation phase
//!
//! Resolves every branch's two endpoints down to a bus. Passive elements
//! are processed first because they often sit between a bus and a branch
//! and settle the bus that branch will consume; branches follow.
//!
//! Whenever an endpoint cannot be settled by an existing bus, a synthetic
//! bus is created through the [`BusRegistry`]:
//!
//! - `<passive>-bus`        passive element between two branches
//! - `<branch>-<side>-bus`  branch directly against another branch
//! - `<tag>`                unknown reference, taken as an implicit bus
//! - `<anchor>-bus`         run of passives between two branches, or a
//!                          run that dead-ends

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{BusRegistry, Class, ElementIndex, TraceEnd};
use crate::diagnostics::{has_error, Alert, AlertCode};
use crate::model::{Branch, Bus, ElementCategory, PassiveElement, Side};

/// Output of [`evaluate`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub alerts: Vec<Alert>,
    /// Tags of buses created by this run
    pub created_buses: Vec<String>,
}

impl Evaluation {
    /// False if any error alert was raised; the run must not be laid out.
    pub fn ok(&self) -> bool {
        !has_error(&self.alerts)
    }

    pub fn get_branch(&self, tag: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.tag == tag)
    }

    pub fn get_bus(&self, tag: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.tag == tag)
    }
}

/// Resolve the bus on both sides of every branch.
///
/// Expects input that passed validation. Resolved buses on the incoming
/// branches are discarded first, so evaluating an earlier output again
/// yields the same assignments and creates no new buses.
pub fn evaluate(buses: Vec<Bus>, branches: Vec<Branch>, passives: &[PassiveElement]) -> Evaluation {
    Evaluator::new(buses, branches, passives).run()
}

struct Evaluator<'a> {
    index: ElementIndex,
    registry: BusRegistry,
    branches: Vec<Branch>,
    branch_indices: HashMap<String, usize>,
    passives: &'a [PassiveElement],
    alerts: Vec<Alert>,
}

impl<'a> Evaluator<'a> {
    fn new(buses: Vec<Bus>, mut branches: Vec<Branch>, passives: &'a [PassiveElement]) -> Self {
        for branch in &mut branches {
            branch.clear_resolved();
        }

        let index = ElementIndex::new(&buses, &branches, passives);
        let mut branch_indices = HashMap::new();
        for (i, branch) in branches.iter().enumerate() {
            branch_indices.entry(branch.tag.clone()).or_insert(i);
        }

        Self {
            index,
            registry: BusRegistry::new(buses),
            branches,
            branch_indices,
            passives,
            alerts: Vec::new(),
        }
    }

    fn run(mut self) -> Evaluation {
        for passive in self.passives {
            self.resolve_passive(passive);
        }

        for i in 0..self.branches.len() {
            for side in Side::BOTH {
                self.resolve_branch_side(i, side);
            }
        }

        self.check_resolved();
        self.recompute_adjacency();
        self.registry.place_created();

        let created_buses = self.registry.created().to_vec();
        tracing::info!(
            "Evaluation finished: {} branches, {} buses created, {} alerts",
            self.branches.len(),
            created_buses.len(),
            self.alerts.len()
        );

        Evaluation {
            buses: self.registry.into_buses(),
            branches: self.branches,
            alerts: self.alerts,
            created_buses,
        }
    }

    fn resolve_passive(&mut self, passive: &PassiveElement) {
        let tag = passive.tag.as_str();
        let from = passive.reference(Side::From);
        let to = passive.reference(Side::To);
        let class_of = |r: Option<&str>| r.map(|r| self.index.classify(r));

        match (class_of(from), class_of(to), from, to) {
            (Some(Class::Bus), Some(Class::Bus), Some(a), Some(b)) => {
                tracing::debug!("{} ties buses {} and {}", tag, a, b);
                self.registry.add_adjacency(a, b);
            }
            (Some(Class::Branch), Some(Class::Branch), Some(a), Some(b)) => {
                let junction = format!("{}-bus", tag);
                self.create_bus(&junction, tag);
                self.assign_slot(a, tag, &junction);
                self.assign_slot(b, tag, &junction);
            }
            (Some(Class::Bus), Some(Class::Branch), Some(bus), Some(branch))
            | (Some(Class::Branch), Some(Class::Bus), Some(branch), Some(bus)) => {
                self.assign_slot(branch, tag, bus);
            }
            (Some(Class::Unknown), Some(Class::Unknown), _, _) => {
                self.alerts.push(
                    Alert::error(
                        AlertCode::UnresolvablePassive,
                        format!(
                            "{} '{}' references only unknown tags ({} / {}); nothing to resolve against",
                            ElementCategory::from(passive.category),
                            tag,
                            from.unwrap_or_default(),
                            to.unwrap_or_default()
                        ),
                    )
                    .for_tag(tag),
                );
            }
            (Some(Class::Bus), Some(Class::Unknown), Some(bus), Some(unknown))
            | (Some(Class::Unknown), Some(Class::Bus), Some(unknown), Some(bus)) => {
                self.create_bus(unknown, tag);
                self.registry.add_adjacency(bus, unknown);
            }
            (Some(Class::Bus), Some(Class::Passive), Some(bus), Some(next))
            | (Some(Class::Passive), Some(Class::Bus), Some(next), Some(bus)) => {
                // Bus-to-bus runs are only visible from their ends
                let trace = self.index.trace(tag, next);
                if let Some(far) = trace.terminal_bus() {
                    let far = far.to_string();
                    self.registry.add_adjacency(bus, &far);
                }
            }
            _ => {
                tracing::debug!("{} left to the branch pass", tag);
            }
        }
    }

    fn resolve_branch_side(&mut self, i: usize, side: Side) {
        if self.branches[i].resolved(side).is_some() {
            return;
        }
        let Some(reference) = self.branches[i].reference(side).map(str::to_string) else {
            return;
        };
        let tag = self.branches[i].tag.clone();

        match self.index.classify(&reference) {
            Class::Bus => self.branches[i].set_resolved(side, reference),
            Class::Branch => {
                let junction = format!("{}-{}-bus", tag, side);
                self.create_bus(&junction, &tag);
                self.branches[i].set_resolved(side, junction.as_str());
                self.assign_slot(&reference, &tag, &junction);
            }
            Class::Unknown => {
                self.create_bus(&reference, &tag);
                self.branches[i].set_resolved(side, reference);
            }
            Class::Passive => self.resolve_through_passives(i, side, &tag, &reference),
        }
    }

    fn resolve_through_passives(&mut self, i: usize, side: Side, tag: &str, first: &str) {
        let trace = self.index.trace(tag, first);
        let last = trace.hops.last().cloned().unwrap_or_else(|| first.to_string());

        match trace.end {
            TraceEnd::Bus(bus) => self.branches[i].set_resolved(side, bus),
            TraceEnd::Branch(neighbour) if neighbour == tag => {
                let reported = self
                    .alerts
                    .iter()
                    .any(|a| a.code == AlertCode::BranchLoop && a.tag.as_deref() == Some(tag));
                if !reported {
                    self.alerts.push(
                        Alert::error(
                            AlertCode::BranchLoop,
                            format!(
                                "Branch '{}' loops back onto itself through {}",
                                tag,
                                trace.hops.join(" -> ")
                            ),
                        )
                        .for_tag(tag),
                    );
                }
            }
            TraceEnd::Branch(neighbour) => {
                // Both branches pick the same anchor, so the junction is shared
                let anchor = trace.hops.iter().min().cloned().unwrap_or(last.clone());
                let junction = format!("{}-bus", anchor);
                self.create_bus(&junction, &anchor);
                self.branches[i].set_resolved(side, junction.as_str());
                self.assign_slot(&neighbour, &last, &junction);
            }
            TraceEnd::Unknown(unknown) => {
                self.create_bus(&unknown, &last);
                self.branches[i].set_resolved(side, unknown);
            }
            TraceEnd::DeadEnd => {
                let terminal = format!("{}-bus", last);
                self.create_bus(&terminal, &last);
                self.branches[i].set_resolved(side, terminal);
            }
            TraceEnd::Cycle(at) => {
                self.alerts.push(
                    Alert::error(
                        AlertCode::PassiveCycle,
                        format!(
                            "Branch '{}' {} side runs into a loop of passive elements at '{}' ({})",
                            tag,
                            side,
                            at,
                            trace.hops.join(" -> ")
                        ),
                    )
                    .for_tag(tag),
                );
            }
        }
    }

    /// Put `bus` on the free slot of `branch_tag` whose reference is
    /// `pointing_at`, or on the first free slot if that one is taken.
    fn assign_slot(&mut self, branch_tag: &str, pointing_at: &str, bus: &str) -> bool {
        let Some(&i) = self.branch_indices.get(branch_tag) else {
            return false;
        };
        let branch = &mut self.branches[i];

        let matching = Side::BOTH
            .into_iter()
            .find(|&s| branch.reference(s) == Some(pointing_at) && branch.resolved(s).is_none());
        let slot = matching.or_else(|| {
            Side::BOTH
                .into_iter()
                .find(|&s| branch.resolved(s).is_none())
        });

        match slot {
            Some(side) => {
                tracing::debug!("{} {} side -> {}", branch_tag, side, bus);
                branch.set_resolved(side, bus);
                true
            }
            None => {
                self.alerts.push(
                    Alert::warning(
                        AlertCode::NoFreeSlot,
                        format!(
                            "Branch '{}' has no free side for bus '{}' via '{}'",
                            branch_tag, bus, pointing_at
                        ),
                    )
                    .for_tag(branch_tag),
                );
                false
            }
        }
    }

    fn create_bus(&mut self, tag: &str, source: &str) {
        if self.registry.ensure(tag, source) {
            self.index.insert_bus(tag);
            tracing::info!("Created synthetic bus {} for {}", tag, source);
            self.alerts.push(
                Alert::info(
                    AlertCode::SyntheticBus,
                    format!("Created bus '{}' to terminate '{}'", tag, source),
                )
                .for_tag(tag),
            );
        }
    }

    fn check_resolved(&mut self) {
        for branch in &self.branches {
            let open: Vec<&str> = Side::BOTH
                .into_iter()
                .filter(|&s| branch.resolved(s).is_none())
                .map(Side::as_str)
                .collect();
            if open.is_empty() {
                continue;
            }
            tracing::warn!("Branch {} unresolved on {:?}", branch.tag, open);
            self.alerts.push(
                Alert::error(
                    AlertCode::UnresolvedBranch,
                    format!(
                        "Branch '{}' finished evaluation without a bus on its {} side",
                        branch.tag,
                        open.join(" and ")
                    ),
                )
                .for_tag(branch.tag.as_str()),
            );
        }
    }

    fn recompute_adjacency(&mut self) {
        for branch in &self.branches {
            if let (Some(a), Some(b)) = (branch.resolved(Side::From), branch.resolved(Side::To)) {
                self.registry.add_adjacency(a, b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(evaluation: &Evaluation) -> Vec<AlertCode> {
        evaluation.alerts.iter().map(|a| a.code).collect()
    }

    fn ends(evaluation: &Evaluation, tag: &str) -> (String, String) {
        let branch = evaluation.get_branch(tag).unwrap();
        (
            branch.resolved(Side::From).unwrap_or_default().to_string(),
            branch.resolved(Side::To).unwrap_or_default().to_string(),
        )
    }

    #[test]
    fn test_direct_buses() {
        let buses = vec![Bus::new("A").swing(), Bus::new("B").with_tier(1, 0)];
        let branches = vec![Branch::cable("C1").between("A", "B")];

        let evaluation = evaluate(buses, branches, &[]);
        assert!(evaluation.ok());
        assert_eq!(ends(&evaluation, "C1"), ("A".into(), "B".into()));
        assert!(evaluation.created_buses.is_empty());
        assert_eq!(evaluation.get_bus("A").unwrap().adjacent_buses, vec!["B"]);
    }

    #[test]
    fn test_branch_to_branch_junction() {
        let buses = vec![Bus::new("BusA"), Bus::new("BusB").with_tier(1, 0)];
        let branches = vec![
            Branch::cable("C1").between("BusA", "C2"),
            Branch::cable("C2").between("C1", "BusB"),
        ];

        let evaluation = evaluate(buses, branches, &[]);
        assert!(evaluation.ok());
        assert_eq!(evaluation.created_buses, vec!["C1-to-bus"]);
        assert_eq!(ends(&evaluation, "C1"), ("BusA".into(), "C1-to-bus".into()));
        assert_eq!(ends(&evaluation, "C2"), ("C1-to-bus".into(), "BusB".into()));
        assert!(codes(&evaluation).contains(&AlertCode::SyntheticBus));
    }

    #[test]
    fn test_from_side_junction_named_after_side() {
        let buses = vec![Bus::new("B1"), Bus::new("B2")];
        let branches = vec![
            Branch::transformer("T1").between("T2", "B1"),
            Branch::transformer("T2").between("T1", "B2"),
        ];

        let evaluation = evaluate(buses, branches, &[]);
        assert_eq!(ends(&evaluation, "T1"), ("T1-from-bus".into(), "B1".into()));
        assert_eq!(ends(&evaluation, "T2"), ("T1-from-bus".into(), "B2".into()));
    }

    #[test]
    fn test_passive_between_bus_and_branch() {
        let buses = vec![Bus::new("A"), Bus::new("B").with_tier(1, 0)];
        let branches = vec![Branch::cable("C1").between("S1", "B")];
        let passives = vec![PassiveElement::switch("S1").between("A", "C1")];

        let evaluation = evaluate(buses, branches, &passives);
        assert!(evaluation.ok());
        assert_eq!(ends(&evaluation, "C1"), ("A".into(), "B".into()));
        assert!(evaluation.created_buses.is_empty());
    }

    #[test]
    fn test_passive_between_two_branches() {
        let buses = vec![Bus::new("A"), Bus::new("B").with_tier(2, 0)];
        let branches = vec![
            Branch::cable("C1").between("A", "F1"),
            Branch::cable("C2").between("F1", "B"),
        ];
        let passives = vec![PassiveElement::fuse("F1").between("C1", "C2")];

        let evaluation = evaluate(buses, branches, &passives);
        assert_eq!(ends(&evaluation, "C1"), ("A".into(), "F1-bus".into()));
        assert_eq!(ends(&evaluation, "C2"), ("F1-bus".into(), "B".into()));

        let junction = evaluation.get_bus("F1-bus").unwrap();
        assert_eq!(junction.synthetic_source.as_deref(), Some("F1"));
        assert_eq!(junction.tier_row, 1);
    }

    #[test]
    fn test_passive_run_between_two_branches_shares_junction() {
        let buses = vec![Bus::new("A"), Bus::new("B")];
        let branches = vec![
            Branch::cable("C1").between("A", "S2"),
            Branch::cable("C2").between("S1", "B"),
        ];
        let passives = vec![
            PassiveElement::switch("S1").between("C2", "S2"),
            PassiveElement::switch("S2").between("S1", "C1"),
        ];

        let evaluation = evaluate(buses, branches, &passives);
        assert!(evaluation.ok());
        assert_eq!(evaluation.created_buses, vec!["S1-bus"]);
        assert_eq!(ends(&evaluation, "C1"), ("A".into(), "S1-bus".into()));
        assert_eq!(ends(&evaluation, "C2"), ("S1-bus".into(), "B".into()));
    }

    #[test]
    fn test_unknown_reference_becomes_bus() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1").between("A", "NEW")];

        let evaluation = evaluate(buses, branches, &[]);
        assert_eq!(ends(&evaluation, "C1"), ("A".into(), "NEW".into()));
        let created = evaluation.get_bus("NEW").unwrap();
        assert!(created.is_synthetic());
        assert_eq!(created.tier_row, 1);
    }

    #[test]
    fn test_dead_end_passive_terminates_branch() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1").between("A", "F1")];
        let passives = vec![PassiveElement::fuse("F1").from_only("C1")];

        let evaluation = evaluate(buses, branches, &passives);
        assert!(evaluation.ok());
        assert_eq!(ends(&evaluation, "C1"), ("A".into(), "F1-bus".into()));
    }

    #[test]
    fn test_unknown_both_sides_is_error() {
        let passives = vec![PassiveElement::switch("S1").between("X1", "X2")];

        let evaluation = evaluate(vec![], vec![], &passives);
        assert!(!evaluation.ok());
        assert_eq!(codes(&evaluation), vec![AlertCode::UnresolvablePassive]);
    }

    #[test]
    fn test_bus_tie_records_adjacency() {
        let buses = vec![Bus::new("A"), Bus::new("B")];
        let passives = vec![PassiveElement::bus_tie("BT1").between("A", "B")];

        let evaluation = evaluate(buses, vec![], &passives);
        assert_eq!(evaluation.get_bus("A").unwrap().adjacent_buses, vec!["B"]);
        assert_eq!(evaluation.get_bus("B").unwrap().adjacent_buses, vec!["A"]);
    }

    #[test]
    fn test_passive_run_between_buses_records_adjacency() {
        let buses = vec![Bus::new("A"), Bus::new("B")];
        let passives = vec![
            PassiveElement::switch("S1").between("A", "F1"),
            PassiveElement::fuse("F1").between("S1", "B"),
        ];

        let evaluation = evaluate(buses, vec![], &passives);
        assert_eq!(evaluation.get_bus("A").unwrap().adjacent_buses, vec!["B"]);
    }

    #[test]
    fn test_passive_cycle_is_error() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1").between("A", "S1")];
        let passives = vec![
            PassiveElement::switch("S1").between("C1", "S2"),
            PassiveElement::switch("S2").between("S3", "S1"),
            PassiveElement::switch("S3").between("S2", "S1"),
        ];

        let evaluation = evaluate(buses, branches, &passives);
        assert!(!evaluation.ok());
        let found = codes(&evaluation);
        assert!(found.contains(&AlertCode::PassiveCycle));
        assert!(found.contains(&AlertCode::UnresolvedBranch));
    }

    #[test]
    fn test_branch_looping_onto_itself_is_error() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1").between("S1", "S2")];
        let passives = vec![
            PassiveElement::switch("S1").between("C1", "S2"),
            PassiveElement::switch("S2").between("S1", "C1"),
        ];

        let evaluation = evaluate(buses, branches, &passives);
        assert!(!evaluation.ok());
        let found = codes(&evaluation);
        assert_eq!(found.iter().filter(|&&c| c == AlertCode::BranchLoop).count(), 1);
        assert!(found.contains(&AlertCode::UnresolvedBranch));
        assert!(evaluation.created_buses.is_empty());
        assert_eq!(ends(&evaluation, "C1"), (String::new(), String::new()));
    }

    #[test]
    fn test_junction_for_full_branch_raises_no_free_slot() {
        let buses = vec![Bus::new("A"), Bus::new("B")];
        let branches = vec![
            Branch::cable("C1").between("A", "B"),
            Branch::cable("C2").between("C1", "B"),
        ];

        let evaluation = evaluate(buses, branches, &[]);
        assert_eq!(ends(&evaluation, "C1"), ("A".into(), "B".into()));
        assert_eq!(ends(&evaluation, "C2"), ("C2-from-bus".into(), "B".into()));

        let alert = evaluation
            .alerts
            .iter()
            .find(|a| a.code == AlertCode::NoFreeSlot)
            .expect("C1 has both sides settled");
        assert_eq!(alert.tag.as_deref(), Some("C1"));
        assert!(evaluation.ok());
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let buses = vec![Bus::new("A").swing(), Bus::new("B").with_tier(2, 0)];
        let branches = vec![
            Branch::cable("C1").between("A", "C2"),
            Branch::cable("C2").between("C1", "F1"),
            Branch::cable("C3").between("F1", "NEW"),
        ];
        let passives = vec![PassiveElement::fuse("F1").between("C2", "C3")];

        let first = evaluate(buses, branches, &passives);
        let second = evaluate(first.buses.clone(), first.branches.clone(), &passives);

        assert!(second.created_buses.is_empty());
        assert_eq!(first.branches, second.branches);
        assert_eq!(first.buses, second.buses);
    }
}
