//! Validation phase
//!
//! Checks that connectivity declarations agree with each other before any
//! bus resolution happens. The central rule: if element A claims element B
//! on one of its sides, B must claim A on one of its own. Buses are
//! terminal and never claim anything.
//!
//! Loads are resolved here too: a load naming an unknown bus gets a bus of
//! its own (`<load>-bus`) and its reference is rewritten.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{Class, ElementIndex};
use crate::diagnostics::{IssueCode, Severity, ValidationIssue};
use crate::model::{Branch, Bus, ElementCategory, Load, PassiveElement, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadOutcome {
    Accepted,
    Created,
    Missing,
}

/// How one load's bus reference was settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadResolution {
    pub load_tag: String,
    pub requested_bus: Option<String>,
    pub resolved_bus: Option<String>,
    pub outcome: LoadOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub load_results: Vec<LoadResolution>,
    /// Buses created for loads that named an unknown bus
    pub synthetic_buses: Vec<Bus>,
    /// Number of loads per bus, after rewriting
    pub load_counts: BTreeMap<String, usize>,
    /// The loads with their bus references rewritten
    pub loads: Vec<Load>,
}

impl ValidationReport {
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn has_code(&self, code: IssueCode) -> bool {
        self.issues().any(|i| i.code == code)
    }
}

#[derive(Default)]
struct Collector {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Collector {
    fn push(&mut self, issue: ValidationIssue) {
        tracing::debug!("{}: {}", issue.code, issue.message);
        match issue.severity() {
            Severity::Error => self.errors.push(issue),
            Severity::Warning | Severity::Info => self.warnings.push(issue),
        }
    }
}

/// Validate all connectivity declarations and resolve load buses.
pub fn validate(
    buses: &[Bus],
    loads: &[Load],
    branches: &[Branch],
    passives: &[PassiveElement],
) -> ValidationReport {
    let index = ElementIndex::new(buses, branches, passives);
    let mut out = Collector::default();

    for (tag, category) in index.duplicates() {
        out.push(ValidationIssue::new(
            IssueCode::DuplicateTag,
            tag.as_str(),
            *category,
            format!("{} '{}' reuses a tag that is already declared", category, tag),
        ));
    }

    for branch in branches {
        let category = ElementCategory::from(branch.category);
        let refs = [branch.reference(Side::From), branch.reference(Side::To)];

        for side in Side::BOTH {
            if refs[side_slot(side)].is_none() {
                out.push(
                    ValidationIssue::new(
                        IssueCode::MissingEndpoint,
                        branch.tag.as_str(),
                        category,
                        format!(
                            "{} '{}' has no {}_element; a branch must connect on both sides",
                            category, branch.tag, side
                        ),
                    )
                    .on_side(side),
                );
            }
        }

        check_references(&index, &branch.tag, category, refs, &mut out);
    }

    for passive in passives {
        let category = ElementCategory::from(passive.category);
        let refs = [passive.reference(Side::From), passive.reference(Side::To)];

        if refs.iter().all(Option::is_none) {
            out.push(ValidationIssue::new(
                IssueCode::MissingEndpoints,
                passive.tag.as_str(),
                category,
                format!("{} '{}' references nothing on either side", category, passive.tag),
            ));
        }

        check_references(&index, &passive.tag, category, refs, &mut out);
    }

    let (loads, load_results, synthetic_buses, load_counts) =
        resolve_loads(buses, loads, &index, &mut out);

    let ok = out.errors.is_empty();
    tracing::info!(
        "Validation finished: {} errors, {} warnings, {} load buses created",
        out.errors.len(),
        out.warnings.len(),
        synthetic_buses.len()
    );

    ValidationReport {
        ok,
        errors: out.errors,
        warnings: out.warnings,
        load_results,
        synthetic_buses,
        load_counts,
        loads,
    }
}

fn side_slot(side: Side) -> usize {
    match side {
        Side::From => 0,
        Side::To => 1,
    }
}

/// Self reference, same-both-ends and bidirectional checks for one element
fn check_references(
    index: &ElementIndex,
    tag: &str,
    category: ElementCategory,
    refs: [Option<&str>; 2],
    out: &mut Collector,
) {
    if let [Some(from), Some(to)] = refs {
        if from == to {
            out.push(ValidationIssue::new(
                IssueCode::SameBothEnds,
                tag,
                category,
                format!(
                    "{} '{}' references '{}' on both its from and to side",
                    category, tag, from
                ),
            ));
        }
    }

    for side in Side::BOTH {
        let Some(target) = refs[side_slot(side)] else {
            continue;
        };

        if target == tag {
            out.push(
                ValidationIssue::new(
                    IssueCode::SelfReference,
                    tag,
                    category,
                    format!("{} '{}' references itself on its {} side", category, tag, side),
                )
                .on_side(side),
            );
            continue;
        }

        match index.classify(target) {
            Class::Bus => {}
            Class::Unknown => out.push(
                ValidationIssue::new(
                    IssueCode::UnknownTarget,
                    tag,
                    category,
                    format!(
                        "{} '{}' {} side references unknown tag '{}'; it may become a new bus",
                        category, tag, side, target
                    ),
                )
                .on_side(side),
            ),
            Class::Branch | Class::Passive => {
                let Some(descriptor) = index.get(target) else {
                    continue;
                };
                if !descriptor.references(tag) {
                    out.push(
                        ValidationIssue::new(
                            IssueCode::BidirectionalMismatch,
                            tag,
                            category,
                            format!(
                                "{} '{}' {} side references {} '{}', but '{}' references '{}' on neither side \
                                 (from: {}, to: {}); expected '{}' on its from or to side",
                                category,
                                tag,
                                side,
                                descriptor.category,
                                target,
                                target,
                                tag,
                                describe(descriptor.reference(Side::From)),
                                describe(descriptor.reference(Side::To)),
                                tag,
                            ),
                        )
                        .on_side(side),
                    );
                }
            }
        }
    }
}

fn describe(reference: Option<&str>) -> String {
    match reference {
        Some(r) => format!("'{}'", r),
        None => "empty".to_string(),
    }
}

type LoadPass = (
    Vec<Load>,
    Vec<LoadResolution>,
    Vec<Bus>,
    BTreeMap<String, usize>,
);

fn resolve_loads(
    buses: &[Bus],
    loads: &[Load],
    index: &ElementIndex,
    out: &mut Collector,
) -> LoadPass {
    let mut known: HashSet<String> = buses.iter().map(|b| b.tag.clone()).collect();
    let mut next_column = buses
        .iter()
        .filter(|b| b.tier_row == 0)
        .map(|b| b.tier_column + 1)
        .max()
        .unwrap_or(0);

    let mut rewritten = Vec::with_capacity(loads.len());
    let mut results = Vec::with_capacity(loads.len());
    let mut created = Vec::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for load in loads {
        let mut load = load.clone();
        let requested = load.bus().map(str::to_string);

        let (resolved, outcome) = match requested.as_deref() {
            None => {
                out.push(ValidationIssue::new(
                    IssueCode::MissingLoadBus,
                    load.tag.as_str(),
                    ElementCategory::Load,
                    format!("Load '{}' has no connected bus", load.tag),
                ));
                (None, LoadOutcome::Missing)
            }
            Some(bus) if index.is_bus(bus) || known.contains(bus) => {
                (Some(bus.to_string()), LoadOutcome::Accepted)
            }
            Some(bus) => {
                let synthetic = unused_bus_name(&format!("{}-bus", load.tag), &known, index);
                out.push(ValidationIssue::new(
                    IssueCode::LoadBusCreated,
                    load.tag.as_str(),
                    ElementCategory::Load,
                    format!(
                        "Load '{}' references unknown bus '{}'; connected to new bus '{}'",
                        load.tag, bus, synthetic
                    ),
                ));
                known.insert(synthetic.clone());
                let created_bus =
                    Bus::synthetic(synthetic.as_str(), load.tag.as_str()).with_tier(0, next_column);
                next_column += 1;
                tracing::info!("Created load bus {} for {}", created_bus.tag, load.tag);
                created.push(created_bus);
                load.connected_bus = Some(synthetic.clone());
                (Some(synthetic), LoadOutcome::Created)
            }
        };

        if let Some(bus) = &resolved {
            *counts.entry(bus.clone()).or_insert(0) += 1;
        }

        results.push(LoadResolution {
            load_tag: load.tag.clone(),
            requested_bus: requested,
            resolved_bus: resolved,
            outcome,
        });
        rewritten.push(load);
    }

    (rewritten, results, created, counts)
}

/// `base`, or `base-2`, `base-3`, ... when `base` already names a record
fn unused_bus_name(base: &str, known: &HashSet<String>, index: &ElementIndex) -> String {
    let taken = |tag: &str| known.contains(tag) || index.get(tag).is_some();
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Grow each bus so it is at least as many units long as it has loads.
pub fn apply_load_counts(buses: &mut [Bus], counts: &BTreeMap<String, usize>) {
    for bus in buses.iter_mut() {
        let loads = counts.get(&bus.tag).copied().unwrap_or(0) as u32;
        bus.length_units = bus.length_units.max(loads).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(issues: &[ValidationIssue]) -> Vec<IssueCode> {
        issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_mutual_claim_passes() {
        let buses = vec![Bus::new("BusA"), Bus::new("BusB")];
        let branches = vec![
            Branch::cable("C1").between("BusA", "C2"),
            Branch::cable("C2").between("C1", "BusB"),
        ];

        let report = validate(&buses, &[], &branches, &[]);
        assert!(report.ok, "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_one_sided_claim_is_error() {
        let buses = vec![Bus::new("BusA"), Bus::new("BusB")];
        let branches = vec![
            Branch::cable("C1").between("BusA", "C2"),
            Branch::cable("C2").between("BusA", "BusB"),
        ];

        let report = validate(&buses, &[], &branches, &[]);
        assert!(!report.ok);
        assert_eq!(codes(&report.errors), vec![IssueCode::BidirectionalMismatch]);

        let issue = &report.errors[0];
        assert_eq!(issue.source_tag, "C1");
        assert_eq!(issue.side, Some(Side::To));
        assert!(issue.message.contains("C2"));
        assert!(issue.message.contains("expected 'C1'"));
    }

    #[test]
    fn test_same_both_ends() {
        let passives = vec![PassiveElement::switch("S1").between("X1", "X1")];

        let report = validate(&[], &[], &[], &passives);
        assert!(!report.ok);
        assert_eq!(codes(&report.errors), vec![IssueCode::SameBothEnds]);
        assert!(report.has_code(IssueCode::UnknownTarget));
    }

    #[test]
    fn test_self_reference() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1").between("C1", "A")];

        let report = validate(&buses, &[], &branches, &[]);
        assert_eq!(codes(&report.errors), vec![IssueCode::SelfReference]);
        assert_eq!(report.errors[0].side, Some(Side::From));
    }

    #[test]
    fn test_missing_endpoints() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1")];
        let mut half = Branch::cable("C2");
        half.from_element = Some("A".to_string());
        let passives = vec![PassiveElement::fuse("F1")];

        let report = validate(&buses, &[], &[branches[0].clone(), half], &passives);
        assert_eq!(
            codes(&report.errors),
            vec![
                IssueCode::MissingEndpoint,
                IssueCode::MissingEndpoint,
                IssueCode::MissingEndpoint,
                IssueCode::MissingEndpoints,
            ]
        );
    }

    #[test]
    fn test_unknown_target_is_only_a_warning() {
        let buses = vec![Bus::new("A")];
        let branches = vec![Branch::cable("C1").between("A", "NewBus")];

        let report = validate(&buses, &[], &branches, &[]);
        assert!(report.ok);
        assert_eq!(codes(&report.warnings), vec![IssueCode::UnknownTarget]);
    }

    #[test]
    fn test_duplicate_tag() {
        let buses = vec![Bus::new("A")];
        let passives = vec![PassiveElement::switch("A").from_only("A")];

        let report = validate(&buses, &[], &[], &passives);
        assert!(report.has_code(IssueCode::DuplicateTag));
    }

    #[test]
    fn test_load_resolution() {
        let buses = vec![Bus::new("BusA")];
        let loads = vec![
            Load::new("L1", "BusZ"),
            Load::new("L2", "BusA"),
            Load::new("L3", "BusA"),
            Load {
                tag: "L4".to_string(),
                connected_bus: None,
            },
        ];

        let report = validate(&buses, &loads, &[], &[]);
        assert!(!report.ok);
        assert_eq!(codes(&report.errors), vec![IssueCode::MissingLoadBus]);
        assert_eq!(codes(&report.warnings), vec![IssueCode::LoadBusCreated]);

        assert_eq!(report.synthetic_buses.len(), 1);
        assert_eq!(report.synthetic_buses[0].tag, "L1-bus");
        assert!(report.synthetic_buses[0].is_synthetic());
        assert_eq!(report.loads[0].bus(), Some("L1-bus"));

        assert_eq!(report.load_counts.get("BusA"), Some(&2));
        assert_eq!(report.load_counts.get("L1-bus"), Some(&1));
        assert_eq!(report.load_results[3].outcome, LoadOutcome::Missing);
    }

    #[test]
    fn test_load_bus_name_taken_gets_suffix() {
        let buses = vec![Bus::new("M1-bus"), Bus::new("M1-bus-2")];
        let loads = vec![Load::new("M1", "Ghost")];

        let report = validate(&buses, &loads, &[], &[]);
        assert!(report.ok);
        assert_eq!(report.synthetic_buses[0].tag, "M1-bus-3");
        assert_eq!(report.loads[0].bus(), Some("M1-bus-3"));
        assert_eq!(report.load_counts.get("M1-bus"), None);
        assert!(report.warnings[0].message.contains("M1-bus-3"));
    }

    #[test]
    fn test_apply_load_counts() {
        let mut buses = vec![Bus::new("A").with_length(2), Bus::new("B"), Bus::new("C")];
        let counts = BTreeMap::from([("A".to_string(), 1), ("B".to_string(), 4)]);
        apply_load_counts(&mut buses, &counts);

        assert_eq!(buses[0].length_units, 2);
        assert_eq!(buses[1].length_units, 4);
        assert_eq!(buses[2].length_units, 1);
    }
}
