//! Chain discovery
//!
//! A chain is the ordered path of elements between two buses. Every branch
//! roots exactly one chain; passive elements join the chain of the branch
//! they lead to, and runs of passives with a bus on both ends form chains
//! of their own (bus ties, switch/fuse runs).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::LayoutConfig;
use crate::diagnostics::{Alert, AlertCode};
use crate::model::{Branch, Bus, PassiveElement, Side};
use crate::topology::{Class, ElementIndex, Trace, TraceEnd};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Both buses on the same tier row
    SameTier,
    CrossTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// Element tags ordered from `from_bus` to `to_bus`
    pub elements: Vec<String>,
    pub from_bus: String,
    pub to_bus: String,
    /// The branch this chain runs through, if any
    pub branch: Option<String>,
    pub orientation: Orientation,
    pub slot_height: f64,
    pub parallel_index: usize,
    pub parallel_count: usize,
}

impl Chain {
    pub fn has_branch(&self) -> bool {
        self.branch.is_some()
    }

    /// Unordered bus pair, smallest tag first
    pub fn bus_pair(&self) -> (&str, &str) {
        if self.from_bus <= self.to_bus {
            (&self.from_bus, &self.to_bus)
        } else {
            (&self.to_bus, &self.from_bus)
        }
    }

    pub fn is_branch_element(&self, tag: &str) -> bool {
        self.branch.as_deref() == Some(tag)
    }

    /// Layout weight of one of this chain's elements
    pub fn element_weight(&self, tag: &str, config: &LayoutConfig) -> f64 {
        if self.is_branch_element(tag) {
            config.branch_slot_height
        } else {
            config.passive_slot_height
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainDiscovery {
    pub chains: Vec<Chain>,
    pub warnings: Vec<Alert>,
}

/// Find every chain, group parallels, and classify orientation.
pub fn discover_chains(
    buses: &[Bus],
    branches: &[Branch],
    passives: &[PassiveElement],
    config: &LayoutConfig,
) -> ChainDiscovery {
    let index = ElementIndex::new(buses, branches, passives);
    let mut used: HashSet<String> = HashSet::new();
    let mut discovery = ChainDiscovery::default();

    for branch in branches {
        if used.contains(&branch.tag) {
            continue;
        }
        match branch_chain(&index, branch, &mut used) {
            Ok(chain) => discovery.chains.push(chain),
            Err(alert) => {
                tracing::warn!("{}", alert.message);
                discovery.warnings.push(alert);
            }
        }
    }

    for passive in passives {
        if used.contains(&passive.tag) {
            continue;
        }
        match passive_chain(&index, passive, &mut used) {
            Ok(Some(chain)) => discovery.chains.push(chain),
            Ok(None) => {}
            Err(alert) => {
                tracing::warn!("{}", alert.message);
                discovery.warnings.push(alert);
            }
        }
    }

    assign_parallels(&mut discovery.chains);
    classify(&mut discovery.chains, buses, config);

    tracing::debug!(
        "Discovered {} chains ({} omitted)",
        discovery.chains.len(),
        discovery.warnings.len()
    );
    discovery
}

/// Bus and passive hops reached from one side of a branch
fn branch_side(index: &ElementIndex, branch: &Branch, side: Side) -> Result<(Vec<String>, String), Alert> {
    let fallback = |hops: Vec<String>, reason: String| match branch.resolved(side) {
        Some(bus) => Ok((hops, bus.to_string())),
        None => Err(Alert::warning(
            AlertCode::ChainAborted,
            format!("Chain through '{}' omitted: {} side {}", branch.tag, side, reason),
        )
        .for_tag(branch.tag.as_str())),
    };

    let Some(reference) = branch.reference(side) else {
        return fallback(Vec::new(), "has no reference".to_string());
    };

    match index.classify(reference) {
        Class::Bus => Ok((Vec::new(), reference.to_string())),
        Class::Passive => {
            let Trace { hops, end } = index.trace(&branch.tag, reference);
            match end {
                TraceEnd::Bus(bus) => Ok((hops, bus)),
                TraceEnd::Cycle(at) => Err(Alert::warning(
                    AlertCode::ChainCycle,
                    format!(
                        "Chain through '{}' omitted: {} side loops back at '{}' ({})",
                        branch.tag,
                        side,
                        at,
                        hops.join(" -> ")
                    ),
                )
                .for_tag(branch.tag.as_str())),
                TraceEnd::Branch(other) => fallback(hops, format!("meets branch '{}'", other)),
                TraceEnd::Unknown(tag) => fallback(hops, format!("meets unknown tag '{}'", tag)),
                TraceEnd::DeadEnd => fallback(hops, "dead-ends".to_string()),
            }
        }
        Class::Branch => fallback(Vec::new(), format!("meets branch '{}'", reference)),
        Class::Unknown => fallback(Vec::new(), format!("meets unknown tag '{}'", reference)),
    }
}

fn branch_chain(
    index: &ElementIndex,
    branch: &Branch,
    used: &mut HashSet<String>,
) -> Result<Chain, Alert> {
    let (from_hops, from_bus) = branch_side(index, branch, Side::From)?;
    let (to_hops, to_bus) = branch_side(index, branch, Side::To)?;

    // A branch that loops back onto itself sees the same hops from both sides
    let mut elements: Vec<String> = Vec::with_capacity(from_hops.len() + to_hops.len() + 1);
    elements.extend(from_hops.into_iter().rev().filter(|t| !used.contains(t)));
    used.extend(elements.iter().cloned());
    used.insert(branch.tag.clone());
    elements.push(branch.tag.clone());
    for hop in to_hops {
        if used.insert(hop.clone()) {
            elements.push(hop);
        }
    }

    Ok(Chain {
        elements,
        from_bus,
        to_bus,
        branch: Some(branch.tag.clone()),
        orientation: Orientation::CrossTier,
        slot_height: 0.0,
        parallel_index: 0,
        parallel_count: 1,
    })
}

/// Chain for a run of passives with a bus on both ends. Runs that meet a
/// branch belong to that branch's chain and yield `None`; a closed ring of
/// passives is reported once and its members are marked as used.
fn passive_chain(
    index: &ElementIndex,
    passive: &PassiveElement,
    used: &mut HashSet<String>,
) -> Result<Option<Chain>, Alert> {
    let (Some(from_ref), Some(to_ref)) = (passive.reference(Side::From), passive.reference(Side::To)) else {
        return Ok(None);
    };
    let from = index.trace(&passive.tag, from_ref);
    let to = index.trace(&passive.tag, to_ref);

    if let Some(at) = [&from.end, &to.end].into_iter().find_map(|end| match end {
        TraceEnd::Cycle(at) => Some(at.clone()),
        _ => None,
    }) {
        let mut ring: Vec<String> = Vec::new();
        for tag in std::iter::once(&passive.tag).chain(&from.hops).chain(&to.hops) {
            if !ring.contains(tag) {
                ring.push(tag.clone());
            }
        }
        used.extend(ring.iter().cloned());
        return Err(Alert::warning(
            AlertCode::ChainCycle,
            format!(
                "Chain through '{}' omitted: passive run loops back at '{}' ({})",
                passive.tag,
                at,
                ring.join(" -> ")
            ),
        )
        .for_tag(passive.tag.as_str()));
    }

    let (Some(from_bus), Some(to_bus)) = (from.terminal_bus(), to.terminal_bus()) else {
        return Ok(None);
    };
    let (from_bus, to_bus) = (from_bus.to_string(), to_bus.to_string());

    let mut elements: Vec<String> = from.hops.into_iter().rev().collect();
    elements.push(passive.tag.clone());
    elements.extend(to.hops);

    if elements.iter().any(|t| used.contains(t)) {
        return Ok(None);
    }
    used.extend(elements.iter().cloned());

    Ok(Some(Chain {
        elements,
        from_bus,
        to_bus,
        branch: None,
        orientation: Orientation::CrossTier,
        slot_height: 0.0,
        parallel_index: 0,
        parallel_count: 1,
    }))
}

/// Number chains that share an unordered bus pair
fn assign_parallels(chains: &mut [Chain]) {
    let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for (i, chain) in chains.iter().enumerate() {
        let (a, b) = chain.bus_pair();
        groups.entry((a.to_string(), b.to_string())).or_default().push(i);
    }

    for members in groups.values() {
        for (n, &i) in members.iter().enumerate() {
            chains[i].parallel_index = n;
            chains[i].parallel_count = members.len();
        }
    }
}

fn classify(chains: &mut [Chain], buses: &[Bus], config: &LayoutConfig) {
    let rows: HashMap<&str, u32> = buses.iter().map(|b| (b.tag.as_str(), b.tier_row)).collect();

    for chain in chains.iter_mut() {
        match (rows.get(chain.from_bus.as_str()), rows.get(chain.to_bus.as_str())) {
            (Some(a), Some(b)) => {
                chain.orientation = if a == b {
                    Orientation::SameTier
                } else {
                    Orientation::CrossTier
                };
                chain.slot_height = chain
                    .elements
                    .iter()
                    .map(|t| chain.element_weight(t, config))
                    .sum();
            }
            _ => {
                chain.orientation = Orientation::CrossTier;
                chain.slot_height = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LayoutConfig {
        LayoutConfig::default()
    }

    fn resolved(mut branch: Branch, from: &str, to: &str) -> Branch {
        branch.set_resolved(Side::From, from);
        branch.set_resolved(Side::To, to);
        branch
    }

    #[test]
    fn test_chain_through_passives() {
        let buses = vec![Bus::new("A"), Bus::new("B").with_tier(1, 0)];
        let branches = vec![resolved(Branch::cable("C1").between("F1", "B"), "A", "B")];
        let passives = vec![
            PassiveElement::switch("S1").between("A", "F1"),
            PassiveElement::fuse("F1").between("S1", "C1"),
        ];

        let found = discover_chains(&buses, &branches, &passives, &config());
        assert!(found.warnings.is_empty());
        assert_eq!(found.chains.len(), 1);

        let chain = &found.chains[0];
        assert_eq!(chain.elements, vec!["S1", "F1", "C1"]);
        assert_eq!((chain.from_bus.as_str(), chain.to_bus.as_str()), ("A", "B"));
        assert_eq!(chain.branch.as_deref(), Some("C1"));
        assert_eq!(chain.orientation, Orientation::CrossTier);
        assert_eq!(chain.slot_height, 80.0 + 40.0 + 40.0);
    }

    #[test]
    fn test_parallel_chains_share_pair() {
        let buses = vec![Bus::new("BusA"), Bus::new("BusB").with_tier(1, 0)];
        let branches = vec![
            Branch::cable("C1").between("BusA", "BusB"),
            Branch::cable("C2").between("BusB", "BusA"),
            resolved(Branch::cable("C3").between("BusA", "BusC"), "BusA", "BusC"),
        ];

        let found = discover_chains(&buses, &branches, &[], &config());
        let by_tag: HashMap<&str, &Chain> = found
            .chains
            .iter()
            .map(|c| (c.branch.as_deref().unwrap(), c))
            .collect();

        assert_eq!(by_tag["C1"].parallel_count, 2);
        assert_eq!(by_tag["C2"].parallel_count, 2);
        assert_ne!(by_tag["C1"].parallel_index, by_tag["C2"].parallel_index);
        assert_eq!(by_tag["C3"].parallel_count, 1);
        // BusC is not a known bus
        assert_eq!(by_tag["C3"].slot_height, 0.0);
    }

    #[test]
    fn test_bus_tie_forms_pure_passive_chain() {
        let buses = vec![Bus::new("A"), Bus::new("B").with_tier(0, 1)];
        let passives = vec![PassiveElement::bus_tie("BT1").between("A", "B")];

        let found = discover_chains(&buses, &[], &passives, &config());
        assert_eq!(found.chains.len(), 1);
        assert!(!found.chains[0].has_branch());
        assert_eq!(found.chains[0].orientation, Orientation::SameTier);
        assert_eq!(found.chains[0].slot_height, 40.0);
    }

    #[test]
    fn test_consumed_passives_not_repeated() {
        let buses = vec![Bus::new("A"), Bus::new("B").with_tier(1, 0)];
        let branches = vec![Branch::cable("C1").between("S1", "B")];
        let passives = vec![PassiveElement::switch("S1").between("A", "C1")];

        let found = discover_chains(&buses, &branches, &passives, &config());
        assert_eq!(found.chains.len(), 1);
        assert_eq!(found.chains[0].elements, vec!["S1", "C1"]);
    }

    #[test]
    fn test_cycle_omits_chain_with_warning() {
        let buses = vec![Bus::new("A")];
        let branches = vec![resolved(Branch::cable("C1").between("A", "S1"), "A", "X")];
        let passives = vec![
            PassiveElement::switch("S1").between("C1", "S2"),
            PassiveElement::switch("S2").between("S3", "S1"),
            PassiveElement::switch("S3").between("S2", "S1"),
        ];

        let found = discover_chains(&buses, &branches, &passives, &config());
        assert!(found.chains.is_empty());
        assert_eq!(found.warnings.len(), 1);
        assert_eq!(found.warnings[0].code, AlertCode::ChainCycle);
        assert!(found.warnings[0].message.contains("S1"));
    }

    #[test]
    fn test_passive_ring_reported_once() {
        let buses = vec![Bus::new("A")];
        let passives = vec![
            PassiveElement::switch("S1").between("S2", "S3"),
            PassiveElement::switch("S2").between("S1", "S3"),
            PassiveElement::switch("S3").between("S1", "S2"),
        ];

        let found = discover_chains(&buses, &[], &passives, &config());
        assert!(found.chains.is_empty());
        assert_eq!(found.warnings.len(), 1);
        assert_eq!(found.warnings[0].code, AlertCode::ChainCycle);
        assert_eq!(found.warnings[0].tag.as_deref(), Some("S1"));
    }

    #[test]
    fn test_branch_looping_onto_itself_lists_hops_once() {
        let buses = vec![Bus::new("S1-bus")];
        let branches = vec![resolved(Branch::cable("C1").between("S1", "S2"), "S1-bus", "S1-bus")];
        let passives = vec![
            PassiveElement::switch("S1").between("C1", "S2"),
            PassiveElement::switch("S2").between("S1", "C1"),
        ];

        let found = discover_chains(&buses, &branches, &passives, &config());
        assert!(found.warnings.is_empty());
        assert_eq!(found.chains.len(), 1);
        assert_eq!(found.chains[0].elements, vec!["S2", "S1", "C1"]);
        assert_eq!(found.chains[0].slot_height, 80.0 + 40.0 + 40.0);
    }

    #[test]
    fn test_unresolved_dead_end_aborts() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1").between("A", "F1")];
        let passives = vec![PassiveElement::fuse("F1").from_only("C1")];

        let found = discover_chains(&buses, &branches, &passives, &config());
        assert!(found.chains.is_empty());
        assert_eq!(found.warnings[0].code, AlertCode::ChainAborted);
    }

    #[test]
    fn test_junction_bus_terminates_chain() {
        let buses = vec![
            Bus::new("A"),
            Bus::new("B").with_tier(2, 0),
            Bus::synthetic("C1-to-bus", "C1").with_tier(1, 0),
        ];
        let branches = vec![
            resolved(Branch::cable("C1").between("A", "C2"), "A", "C1-to-bus"),
            resolved(Branch::cable("C2").between("C1", "B"), "C1-to-bus", "B"),
        ];

        let found = discover_chains(&buses, &branches, &[], &config());
        assert!(found.warnings.is_empty());
        assert_eq!(found.chains.len(), 2);
        assert_eq!(found.chains[0].to_bus, "C1-to-bus");
        assert_eq!(found.chains[1].from_bus, "C1-to-bus");
    }
}
