//! Layout Engine
//!
//! Turns resolved topology into pixel coordinates for a single-line
//! diagram. A pure function of its inputs; nothing is kept between calls.
//!
//! ```text
//! buses + resolved branches + passives
//!     ↓ discover_chains      ordered element paths between bus pairs
//!     ↓ assign_coordinates   tier gaps, tier y, bus x, chain elements
//!     ↓ apply_overrides      caller's saved positions win
//! LayoutResult
//! ```

pub mod chains;
pub mod config;
pub mod coords;
pub mod overrides;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::diagnostics::{has_error, Alert};
use crate::model::{Branch, Bus, PassiveElement, Point};
use crate::topology::ElementIndex;

pub use chains::{discover_chains, Chain, ChainDiscovery, Orientation};
pub use config::LayoutConfig;
pub use coords::{assign_coordinates, Placement};
pub use overrides::{apply_overrides, capture_overrides, BusPlacement, CoordinateOverride, OverridePayload};

/// Everything the renderer needs to draw the diagram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutResult {
    /// False if any error alert was raised
    pub ok: bool,
    pub buses: Vec<Bus>,
    pub chains: Vec<Chain>,
    pub element_coordinates: BTreeMap<String, Point>,
    pub tier_gaps: BTreeMap<u32, f64>,
    pub tier_y: BTreeMap<u32, f64>,
    pub warnings: Vec<Alert>,
}

impl LayoutResult {
    pub fn coordinate(&self, tag: &str) -> Option<Point> {
        self.element_coordinates.get(tag).copied()
    }

    pub fn bus(&self, tag: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.tag == tag)
    }

    pub fn chain_for(&self, tag: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.elements.iter().any(|e| e == tag))
    }
}

/// Lay out resolved topology.
///
/// `branches` should carry resolved buses from evaluation; chains whose
/// ends cannot be traced to a bus are omitted with a warning.
pub fn build_layout(
    buses: &[Bus],
    branches: &[Branch],
    passives: &[PassiveElement],
    overrides: &[CoordinateOverride],
    config: &LayoutConfig,
) -> LayoutResult {
    let ChainDiscovery { chains, mut warnings } = discover_chains(buses, branches, passives, config);
    let placement = assign_coordinates(buses, &chains, config);
    warnings.extend(placement.warnings);

    let mut result = LayoutResult {
        ok: true,
        buses: placement.buses,
        chains,
        element_coordinates: placement.element_coordinates,
        tier_gaps: placement.tier_gaps,
        tier_y: placement.tier_y,
        warnings,
    };

    if !overrides.is_empty() {
        let index = ElementIndex::new(buses, branches, passives);
        apply_overrides(&mut result, overrides, &index);
    }

    result.ok = !has_error(&result.warnings);
    tracing::info!(
        "Layout complete: {} chains, {} elements placed, {} warnings",
        result.chains.len(),
        result.element_coordinates.len(),
        result.warnings.len()
    );
    result
}
