//! Network Records
//!
//! Plain records supplied by the caller on every run. All relationships
//! between records are expressed as tag references, never as owned links;
//! the resolver and layout engine look tags up in their own maps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A point in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Which end of a two-ended element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    From,
    To,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::From, Side::To];

    pub fn other(self) -> Side {
        match self {
            Side::From => Side::To,
            Side::To => Side::From,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::From => "from",
            Side::To => "to",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of every record that can carry a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementCategory {
    Bus,
    Cable,
    Transformer,
    BusDuct,
    Switch,
    Fuse,
    BusTie,
    Load,
}

impl ElementCategory {
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            ElementCategory::Cable | ElementCategory::Transformer | ElementCategory::BusDuct
        )
    }

    pub fn is_passive(self) -> bool {
        matches!(
            self,
            ElementCategory::Switch | ElementCategory::Fuse | ElementCategory::BusTie
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ElementCategory::Bus => "Bus",
            ElementCategory::Cable => "Cable",
            ElementCategory::Transformer => "Transformer",
            ElementCategory::BusDuct => "BusDuct",
            ElementCategory::Switch => "Switch",
            ElementCategory::Fuse => "Fuse",
            ElementCategory::BusTie => "BusTie",
            ElementCategory::Load => "Load",
        }
    }
}

impl fmt::Display for ElementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ElementCategory {
    type Err = String;

    /// Case-insensitive; `BusDuct`, `bus_duct` and `bus-duct` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "bus" => Ok(ElementCategory::Bus),
            "cable" => Ok(ElementCategory::Cable),
            "transformer" => Ok(ElementCategory::Transformer),
            "busduct" => Ok(ElementCategory::BusDuct),
            "switch" => Ok(ElementCategory::Switch),
            "fuse" => Ok(ElementCategory::Fuse),
            "bustie" => Ok(ElementCategory::BusTie),
            "load" => Ok(ElementCategory::Load),
            _ => Err(format!("unknown element category '{}'", s)),
        }
    }
}

/// Conductive element categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchCategory {
    Cable,
    Transformer,
    BusDuct,
}

impl From<BranchCategory> for ElementCategory {
    fn from(c: BranchCategory) -> Self {
        match c {
            BranchCategory::Cable => ElementCategory::Cable,
            BranchCategory::Transformer => ElementCategory::Transformer,
            BranchCategory::BusDuct => ElementCategory::BusDuct,
        }
    }
}

/// Passive (non-branch) element categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassiveCategory {
    Switch,
    Fuse,
    BusTie,
}

impl From<PassiveCategory> for ElementCategory {
    fn from(c: PassiveCategory) -> Self {
        match c {
            PassiveCategory::Switch => ElementCategory::Switch,
            PassiveCategory::Fuse => ElementCategory::Fuse,
            PassiveCategory::BusTie => ElementCategory::BusTie,
        }
    }
}

/// Treat `Some("")` the same as `None`.
fn non_empty(reference: &Option<String>) -> Option<&str> {
    reference.as_deref().filter(|s| !s.is_empty())
}

/// A terminal node of the diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub tag: String,

    /// Coarse vertical level, assigned upstream
    #[serde(default)]
    pub tier_row: u32,

    /// Order within the tier
    #[serde(default)]
    pub tier_column: u32,

    #[serde(default = "default_length_units")]
    pub length_units: u32,

    /// Source / swing bus
    #[serde(default)]
    pub is_swing: bool,

    /// Tag of the element or load whose resolution created this bus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic_source: Option<String>,

    #[serde(default)]
    pub adjacent_buses: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_length: Option<f64>,
}

fn default_length_units() -> u32 {
    1
}

impl Bus {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            tier_row: 0,
            tier_column: 0,
            length_units: 1,
            is_swing: false,
            synthetic_source: None,
            adjacent_buses: Vec::new(),
            position: None,
            visual_length: None,
        }
    }

    /// A bus created by the resolver on behalf of `source`
    pub fn synthetic(tag: impl Into<String>, source: impl Into<String>) -> Self {
        let mut bus = Self::new(tag);
        bus.synthetic_source = Some(source.into());
        bus
    }

    pub fn with_tier(mut self, row: u32, column: u32) -> Self {
        self.tier_row = row;
        self.tier_column = column;
        self
    }

    pub fn with_length(mut self, units: u32) -> Self {
        self.length_units = units;
        self
    }

    pub fn swing(mut self) -> Self {
        self.is_swing = true;
        self
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic_source.is_some()
    }

    /// Record `other` as adjacent unless it already is. Returns true on insert.
    pub fn add_adjacent(&mut self, other: &str) -> bool {
        if other == self.tag || self.adjacent_buses.iter().any(|b| b == other) {
            return false;
        }
        self.adjacent_buses.push(other.to_string());
        true
    }
}

/// A conductive two-ended element: cable, transformer or bus duct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub tag: String,
    pub category: BranchCategory,

    #[serde(default)]
    pub from_element: Option<String>,

    #[serde(default)]
    pub to_element: Option<String>,

    /// Resolved bus on the from side
    #[serde(default)]
    pub from_bus: Option<String>,

    /// Resolved bus on the to side
    #[serde(default)]
    pub to_bus: Option<String>,
}

impl Branch {
    pub fn new(tag: impl Into<String>, category: BranchCategory) -> Self {
        Self {
            tag: tag.into(),
            category,
            from_element: None,
            to_element: None,
            from_bus: None,
            to_bus: None,
        }
    }

    pub fn cable(tag: impl Into<String>) -> Self {
        Self::new(tag, BranchCategory::Cable)
    }

    pub fn transformer(tag: impl Into<String>) -> Self {
        Self::new(tag, BranchCategory::Transformer)
    }

    pub fn bus_duct(tag: impl Into<String>) -> Self {
        Self::new(tag, BranchCategory::BusDuct)
    }

    pub fn between(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_element = Some(from.into());
        self.to_element = Some(to.into());
        self
    }

    pub fn reference(&self, side: Side) -> Option<&str> {
        match side {
            Side::From => non_empty(&self.from_element),
            Side::To => non_empty(&self.to_element),
        }
    }

    pub fn resolved(&self, side: Side) -> Option<&str> {
        match side {
            Side::From => non_empty(&self.from_bus),
            Side::To => non_empty(&self.to_bus),
        }
    }

    pub fn set_resolved(&mut self, side: Side, bus: impl Into<String>) {
        let bus = Some(bus.into());
        match side {
            Side::From => self.from_bus = bus,
            Side::To => self.to_bus = bus,
        }
    }

    pub fn clear_resolved(&mut self) {
        self.from_bus = None;
        self.to_bus = None;
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved(Side::From).is_some() && self.resolved(Side::To).is_some()
    }
}

/// A passive two-ended element: switch, fuse or bus tie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveElement {
    pub tag: String,
    pub category: PassiveCategory,

    #[serde(default)]
    pub from_element: Option<String>,

    #[serde(default)]
    pub to_element: Option<String>,
}

impl PassiveElement {
    pub fn new(tag: impl Into<String>, category: PassiveCategory) -> Self {
        Self {
            tag: tag.into(),
            category,
            from_element: None,
            to_element: None,
        }
    }

    pub fn switch(tag: impl Into<String>) -> Self {
        Self::new(tag, PassiveCategory::Switch)
    }

    pub fn fuse(tag: impl Into<String>) -> Self {
        Self::new(tag, PassiveCategory::Fuse)
    }

    pub fn bus_tie(tag: impl Into<String>) -> Self {
        Self::new(tag, PassiveCategory::BusTie)
    }

    pub fn between(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_element = Some(from.into());
        self.to_element = Some(to.into());
        self
    }

    pub fn from_only(mut self, from: impl Into<String>) -> Self {
        self.from_element = Some(from.into());
        self
    }

    pub fn reference(&self, side: Side) -> Option<&str> {
        match side {
            Side::From => non_empty(&self.from_element),
            Side::To => non_empty(&self.to_element),
        }
    }
}

/// A load hanging off a single bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub tag: String,

    #[serde(default)]
    pub connected_bus: Option<String>,
}

impl Load {
    pub fn new(tag: impl Into<String>, bus: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            connected_bus: Some(bus.into()),
        }
    }

    pub fn bus(&self) -> Option<&str> {
        non_empty(&self.connected_bus)
    }
}

/// Everything the caller hands in for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub buses: Vec<Bus>,
    pub loads: Vec<Load>,
    pub cables: Vec<Branch>,
    pub transformers: Vec<Branch>,
    pub bus_ducts: Vec<Branch>,
    pub switches: Vec<PassiveElement>,
    pub fuses: Vec<PassiveElement>,
    pub bus_ties: Vec<PassiveElement>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a branch to the list matching its category
    pub fn add_branch(&mut self, branch: Branch) {
        match branch.category {
            BranchCategory::Cable => self.cables.push(branch),
            BranchCategory::Transformer => self.transformers.push(branch),
            BranchCategory::BusDuct => self.bus_ducts.push(branch),
        }
    }

    /// Add a passive element to the list matching its category
    pub fn add_passive(&mut self, passive: PassiveElement) {
        match passive.category {
            PassiveCategory::Switch => self.switches.push(passive),
            PassiveCategory::Fuse => self.fuses.push(passive),
            PassiveCategory::BusTie => self.bus_ties.push(passive),
        }
    }

    /// All branches in cable, transformer, bus-duct order
    pub fn branches(&self) -> Vec<Branch> {
        self.cables
            .iter()
            .chain(&self.transformers)
            .chain(&self.bus_ducts)
            .cloned()
            .collect()
    }

    /// All passive elements in switch, fuse, bus-tie order
    pub fn passives(&self) -> Vec<PassiveElement> {
        self.switches
            .iter()
            .chain(&self.fuses)
            .chain(&self.bus_ties)
            .cloned()
            .collect()
    }

    /// Replace the three branch lists, redistributing by category
    pub fn set_branches(&mut self, branches: Vec<Branch>) {
        self.cables.clear();
        self.transformers.clear();
        self.bus_ducts.clear();
        for branch in branches {
            self.add_branch(branch);
        }
    }

    pub fn get_bus(&self, tag: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.tag == tag)
    }

    pub fn get_branch(&self, tag: &str) -> Option<&Branch> {
        self.cables
            .iter()
            .chain(&self.transformers)
            .chain(&self.bus_ducts)
            .find(|b| b.tag == tag)
    }

    pub fn element_count(&self) -> usize {
        self.cables.len()
            + self.transformers.len()
            + self.bus_ducts.len()
            + self.switches.len()
            + self.fuses.len()
            + self.bus_ties.len()
    }
}
