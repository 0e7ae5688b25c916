//! Oneline - single-line diagram topology resolver and layout engine
//!
//! This library takes the buses, branches (cables, transformers, bus ducts)
//! and passive elements (switches, fuses, bus ties) of an electrical
//! network, checks that their connectivity declarations agree, resolves
//! every branch to a bus on each end, and computes pixel coordinates for
//! drawing the network as a single-line diagram.
//!
//! # Quick Start
//!
//! ```
//! use oneline::prelude::*;
//!
//! let mut network = Network::new();
//! network.buses = vec![Bus::new("A").swing(), Bus::new("B").with_tier(1, 0)];
//! network.add_branch(Branch::cable("C1").between("A", "B"));
//!
//! let result = OnelineCore::run(network, &PipelineOptions::default()).unwrap();
//! assert!(result.ok());
//!
//! let layout = result.layout.unwrap();
//! let c1 = layout.coordinate("C1").unwrap();
//! println!("C1 at ({}, {})", c1.x, c1.y);
//! ```
//!
//! # Features
//!
//! - **Validation**: bidirectional claims, missing endpoints, self references, load buses
//! - **Evaluation**: passive-first endpoint resolution with synthetic buses
//! - **Layout**: chain discovery, tier gaps, stacked and same-tier chains
//! - **Overrides**: saved coordinates applied last, captured for persisting

pub mod core;
pub mod diagnostics;
pub mod graph;
pub mod layout;
pub mod model;
pub mod topology;

// Re-export main types
pub use crate::core::{OnelineCore, OnelineError, PipelineOptions, PipelineResult, PipelineStats};
pub use diagnostics::{Alert, AlertCode, AlertLevel, IssueCode, Severity, ValidationIssue};
pub use graph::{TopologyGraph, TopologyStats};
pub use layout::{build_layout, CoordinateOverride, LayoutConfig, LayoutResult};
pub use model::{
    Branch, BranchCategory, Bus, ElementCategory, Load, Network, PassiveCategory,
    PassiveElement, Point, Side,
};
pub use topology::{evaluate, validate, Evaluation, ValidationReport};

/// Load a network from a JSON file and run the full pipeline with defaults
/// (convenience wrapper).
pub fn run_file(path: &std::path::Path) -> Result<PipelineResult, OnelineError> {
    let network = OnelineCore::load_network(path)?;
    OnelineCore::run(network, &PipelineOptions::default())
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Branch, Bus, LayoutConfig, Load, Network, OnelineCore, OnelineError, PassiveElement,
        PipelineOptions, PipelineResult, Point,
    };
}
