//! Integration tests for the oneline pipeline

use oneline::prelude::*;
use oneline::{AlertCode, IssueCode};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn run(network: Network) -> PipelineResult {
    OnelineCore::run(network, &PipelineOptions::default()).expect("default config is valid")
}

fn run_fixture(name: &str) -> PipelineResult {
    let network = OnelineCore::load_network(&fixture_path(name)).expect("fixture should load");
    run(network)
}

#[test]
fn test_single_cable_between_tiers() {
    let mut network = Network::new();
    network.buses = vec![Bus::new("A").swing(), Bus::new("B").with_tier(1, 0)];
    network.add_branch(Branch::cable("C1").between("A", "B"));

    let result = run(network);
    assert!(result.ok());

    let c1 = result.network.get_branch("C1").unwrap();
    assert_eq!(c1.from_bus.as_deref(), Some("A"));
    assert_eq!(c1.to_bus.as_deref(), Some("B"));

    let layout = result.layout.as_ref().unwrap();
    let a = layout.bus("A").unwrap().position.unwrap();
    let b = layout.bus("B").unwrap().position.unwrap();
    let at = layout.coordinate("C1").unwrap();
    assert_eq!(at.x, (a.x + b.x) / 2.0);
    assert!(at.y > a.y && at.y < b.y);
}

#[test]
fn test_passive_with_same_both_ends_is_rejected() {
    let mut network = Network::new();
    network.add_passive(PassiveElement::switch("S1").between("X1", "X1"));

    let result = run(network);

    assert!(result.has_errors());
    assert!(result.validation.has_code(IssueCode::SameBothEnds));
    assert!(result.evaluation.is_none());
    assert!(result.layout.is_none());
}

#[test]
fn test_branch_to_branch_creates_junction_bus() {
    let result = run_fixture("junction.json");

    assert!(result.validation.ok);
    assert!(result.ok(), "alerts: {:?}", result.all_alerts().collect::<Vec<_>>());

    let junction = result.network.get_bus("C1-to-bus").expect("junction bus");
    assert_eq!(junction.synthetic_source.as_deref(), Some("C1"));

    let c1 = result.network.get_branch("C1").unwrap();
    let c2 = result.network.get_branch("C2").unwrap();
    assert_eq!(c1.to_bus.as_deref(), Some("C1-to-bus"));
    assert_eq!(c2.from_bus.as_deref(), Some("C1-to-bus"));
    assert_eq!(c2.to_bus.as_deref(), Some("BusB"));

    let evaluation = result.evaluation.as_ref().unwrap();
    assert!(evaluation
        .alerts
        .iter()
        .any(|a| a.code == AlertCode::SyntheticBus && a.message.contains("C1-to-bus")));

    // Junction sits between its two neighbours
    let layout = result.layout.as_ref().unwrap();
    assert_eq!(layout.chains.len(), 2);
    assert_eq!(junction.tier_row, 1);
}

#[test]
fn test_load_on_missing_bus_gets_own_bus() {
    let result = run_fixture("orphan_load.json");

    assert!(result.validation.ok);
    assert!(result.validation.has_code(IssueCode::LoadBusCreated));
    assert_eq!(result.validation.synthetic_buses.len(), 1);
    assert_eq!(result.network.loads[0].connected_bus.as_deref(), Some("L1-bus"));
    assert!(result.network.get_bus("L1-bus").is_some());
    assert!(result
        .all_alerts()
        .any(|a| a.code == AlertCode::IslandWithoutSource && a.message.contains("L1-bus")));
}

#[test]
fn test_branch_against_branch_on_from_side() {
    let mut network = Network::new();
    network.buses = vec![Bus::new("BusA").swing(), Bus::new("BusB").with_tier(2, 0)];
    network.add_branch(Branch::transformer("T1").between("T2", "BusB"));
    network.add_branch(Branch::transformer("T2").between("BusA", "T1"));

    let result = run(network);
    assert!(result.ok());

    let t1 = result.network.get_branch("T1").unwrap();
    let t2 = result.network.get_branch("T2").unwrap();
    assert_eq!(t1.from_bus.as_deref(), Some("T1-from-bus"));
    assert_eq!(t2.to_bus.as_deref(), Some("T1-from-bus"));
    assert_eq!(t2.from_bus.as_deref(), Some("BusA"));
}

#[test]
fn test_parallel_cables_separated_by_offset() {
    let result = run_fixture("parallel.json");
    let layout = result.layout.as_ref().unwrap();

    for chain in &layout.chains {
        assert_eq!(chain.parallel_count, 2);
    }

    let c1 = layout.coordinate("C1").unwrap();
    let c2 = layout.coordinate("C2").unwrap();
    let offset = LayoutConfig::default().parallel_offset;
    assert!(((c1.x - c2.x).abs() - offset).abs() < 1e-9);
    assert_eq!(c1.y, c2.y);
}

#[test]
fn test_radial_feeder_through_switch_and_fuse() {
    let result = run_fixture("radial.json");
    assert!(result.ok());
    assert_eq!(result.stats.warnings, 0);

    let tx = result.network.get_branch("TX-1").unwrap();
    assert_eq!(tx.from_bus.as_deref(), Some("MCC-1"));
    assert_eq!(tx.to_bus.as_deref(), Some("LV-1"));

    let layout = result.layout.as_ref().unwrap();
    let chain = layout.chain_for("TX-1").unwrap();
    assert_eq!(chain.elements, vec!["SW-1", "FU-1", "TX-1"]);

    let sw = layout.coordinate("SW-1").unwrap();
    let fu = layout.coordinate("FU-1").unwrap();
    let tx = layout.coordinate("TX-1").unwrap();
    assert!(sw.y < fu.y && fu.y < tx.y);
    assert_eq!(sw.x, tx.x);

    // Three loads stretch LV-1 to three grid units
    let lv = layout.bus("LV-1").unwrap();
    assert_eq!(lv.length_units, 3);
    assert_eq!(lv.visual_length, Some(3.0 * 40.0));
}

#[test]
fn test_config_and_overrides_from_files() {
    let network = OnelineCore::load_network(&fixture_path("parallel.json")).unwrap();
    let options = PipelineOptions {
        layout: LayoutConfig::from_toml_file(&fixture_path("layout.toml")).unwrap(),
        overrides: OnelineCore::load_overrides(&fixture_path("overrides.json")).unwrap(),
        skip_layout: false,
    };

    let result = OnelineCore::run(network, &options).unwrap();
    let layout = result.layout.as_ref().unwrap();

    assert_eq!(layout.tier_gaps[&0], 200.0);
    assert_eq!(layout.coordinate("C1"), Some(Point::new(10.0, 20.0)));

    let bus_b = layout.bus("BusB").unwrap();
    assert_eq!(bus_b.position, Some(Point::new(400.0, 300.0)));
    assert_eq!(bus_b.visual_length, Some(120.0));

    // The "Widget" record is ignored, not fatal
    assert!(layout.ok);
    assert_eq!(
        layout
            .warnings
            .iter()
            .filter(|w| w.code == AlertCode::OverrideIgnored)
            .count(),
        1
    );
}

#[test]
fn test_invalid_fixture_reports_all_errors() {
    let result = run_fixture("invalid.json");

    assert!(!result.validation.ok);
    assert!(result.validation.has_code(IssueCode::SameBothEnds));
    assert!(result.validation.has_code(IssueCode::BidirectionalMismatch));
    assert!(result.validation.has_code(IssueCode::UnknownTarget));

    let mismatch = result
        .validation
        .errors
        .iter()
        .find(|e| e.code == IssueCode::BidirectionalMismatch)
        .unwrap();
    assert_eq!(mismatch.source_tag, "C1");
    assert!(mismatch.message.contains("expected 'C1'"));
}

#[test]
fn test_run_file_convenience() {
    let result = oneline::run_file(&fixture_path("radial.json")).unwrap();
    assert!(result.layout.is_some());

    let missing = oneline::run_file(&fixture_path("does_not_exist.json"));
    assert!(matches!(missing, Err(OnelineError::Io(_))));
}

#[test]
fn test_passive_ring_is_reported_not_dropped() {
    let mut network = Network::new();
    network.buses = vec![Bus::new("A").swing()];
    network.add_passive(PassiveElement::switch("S1").between("S2", "S3"));
    network.add_passive(PassiveElement::switch("S2").between("S1", "S3"));
    network.add_passive(PassiveElement::switch("S3").between("S1", "S2"));

    let result = run(network);
    assert!(result.validation.ok);
    assert!(result.ok());

    let layout = result.layout.as_ref().unwrap();
    assert!(layout.chains.is_empty());
    let cycles: Vec<_> = layout
        .warnings
        .iter()
        .filter(|w| w.code == AlertCode::ChainCycle)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].message.contains("S2") && cycles[0].message.contains("S3"));
}

#[test]
fn test_branch_looping_onto_itself_stops_before_layout() {
    let mut network = Network::new();
    network.buses = vec![Bus::new("A").swing()];
    network.add_branch(Branch::cable("C1").between("S1", "S2"));
    network.add_passive(PassiveElement::switch("S1").between("C1", "S2"));
    network.add_passive(PassiveElement::switch("S2").between("S1", "C1"));

    let result = run(network);
    assert!(result.validation.ok);
    assert!(result.has_errors());
    assert!(result.layout.is_none());

    let c1 = result.network.get_branch("C1").unwrap();
    assert_eq!(c1.from_bus, None);
    assert_eq!(c1.to_bus, None);
    assert!(result
        .all_alerts()
        .any(|a| a.code == AlertCode::BranchLoop && a.tag.as_deref() == Some("C1")));
}
