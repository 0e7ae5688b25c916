//! Topology Resolver
//!
//! Two phases consumed in order:
//!
//! ```text
//! buses, loads, branches, passives
//!     ↓ validate   (bidirectional claims, completeness, load buses)
//! ValidationReport ── errors? stop here
//!     ↓ evaluate   (passives first, then branches; synthetic buses)
//! Evaluation       (every branch carries from_bus / to_bus)
//! ```
//!
//! Both phases share the [`ElementIndex`]: one owning map from tag to a
//! descriptor, with every cross reference treated as a lookup. Runs of
//! consecutive passive elements are walked with [`ElementIndex::trace`].

pub mod evaluate;
pub mod registry;
pub mod validate;

use std::collections::{HashMap, HashSet};

use crate::model::{Branch, Bus, ElementCategory, PassiveElement, Side};

pub use evaluate::{evaluate, Evaluation};
pub use registry::BusRegistry;
pub use validate::{apply_load_counts, validate, LoadOutcome, LoadResolution, ValidationReport};

/// What a tag refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Bus,
    Branch,
    Passive,
    /// Neither a known bus nor a known element; to be created
    Unknown,
}

/// Lookup entry for one tag
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub category: ElementCategory,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl Descriptor {
    pub fn reference(&self, side: Side) -> Option<&str> {
        let r = match side {
            Side::From => &self.from,
            Side::To => &self.to,
        };
        r.as_deref().filter(|s| !s.is_empty())
    }

    /// True if either side names `tag`
    pub fn references(&self, tag: &str) -> bool {
        Side::BOTH.iter().any(|&s| self.reference(s) == Some(tag))
    }
}

/// Where a walk through passive elements stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEnd {
    Bus(String),
    Branch(String),
    Unknown(String),
    /// The last passive has nothing on its far side
    DeadEnd,
    /// The walk came back to this passive
    Cycle(String),
}

/// A walk through a run of passive elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    /// Passive tags in walk order
    pub hops: Vec<String>,
    pub end: TraceEnd,
}

impl Trace {
    pub fn terminal_bus(&self) -> Option<&str> {
        match &self.end {
            TraceEnd::Bus(tag) => Some(tag),
            _ => None,
        }
    }
}

/// Tag → descriptor map over buses, branches and passive elements
#[derive(Debug, Clone, Default)]
pub struct ElementIndex {
    elements: HashMap<String, Descriptor>,
    bus_tags: HashSet<String>,
    duplicates: Vec<(String, ElementCategory)>,
}

impl ElementIndex {
    pub fn new(buses: &[Bus], branches: &[Branch], passives: &[PassiveElement]) -> Self {
        let mut index = Self::default();

        for bus in buses {
            index.insert(
                &bus.tag,
                Descriptor {
                    category: ElementCategory::Bus,
                    from: None,
                    to: None,
                },
            );
        }

        for branch in branches {
            index.insert(
                &branch.tag,
                Descriptor {
                    category: branch.category.into(),
                    from: branch.from_element.clone(),
                    to: branch.to_element.clone(),
                },
            );
        }

        for passive in passives {
            index.insert(
                &passive.tag,
                Descriptor {
                    category: passive.category.into(),
                    from: passive.from_element.clone(),
                    to: passive.to_element.clone(),
                },
            );
        }

        index
    }

    /// First declaration wins; later ones are remembered as duplicates.
    fn insert(&mut self, tag: &str, descriptor: Descriptor) {
        if self.elements.contains_key(tag) {
            self.duplicates.push((tag.to_string(), descriptor.category));
            return;
        }
        if descriptor.category == ElementCategory::Bus {
            self.bus_tags.insert(tag.to_string());
        }
        self.elements.insert(tag.to_string(), descriptor);
    }

    /// Register a bus created after the index was built
    pub fn insert_bus(&mut self, tag: &str) {
        if self.elements.contains_key(tag) {
            return;
        }
        self.insert(
            tag,
            Descriptor {
                category: ElementCategory::Bus,
                from: None,
                to: None,
            },
        );
    }

    pub fn get(&self, tag: &str) -> Option<&Descriptor> {
        self.elements.get(tag)
    }

    pub fn is_bus(&self, tag: &str) -> bool {
        self.bus_tags.contains(tag)
    }

    pub fn duplicates(&self) -> &[(String, ElementCategory)] {
        &self.duplicates
    }

    pub fn classify(&self, tag: &str) -> Class {
        match self.elements.get(tag).map(|d| d.category) {
            Some(ElementCategory::Bus) => Class::Bus,
            Some(c) if c.is_branch() => Class::Branch,
            Some(c) if c.is_passive() => Class::Passive,
            _ => Class::Unknown,
        }
    }

    /// Walk from `start` away from `entered_from` through consecutive
    /// passive elements until something that is not a passive is reached.
    ///
    /// The element we arrived from is tracked hop by hop, so the "other
    /// side" of each passive is always relative to the immediately prior
    /// hop regardless of run length.
    pub fn trace<'a>(&'a self, entered_from: &'a str, start: &'a str) -> Trace {
        let mut hops: Vec<String> = Vec::new();
        let mut visited: HashSet<&'a str> = HashSet::new();
        let mut previous = entered_from;
        let mut current = start;

        loop {
            let end = match self.classify(current) {
                Class::Bus => TraceEnd::Bus(current.to_string()),
                Class::Branch => TraceEnd::Branch(current.to_string()),
                Class::Unknown => TraceEnd::Unknown(current.to_string()),
                Class::Passive => {
                    if !visited.insert(current) {
                        TraceEnd::Cycle(current.to_string())
                    } else {
                        hops.push(current.to_string());
                        match self.next_hop(current, previous) {
                            Some(next) => {
                                previous = current;
                                current = next;
                                continue;
                            }
                            None => TraceEnd::DeadEnd,
                        }
                    }
                }
            };
            return Trace { hops, end };
        }
    }

    /// The side of `tag` that does not point back at `previous`
    fn next_hop(&self, tag: &str, previous: &str) -> Option<&str> {
        let descriptor = self.elements.get(tag)?;
        let from = descriptor.reference(Side::From);
        let to = descriptor.reference(Side::To);

        if from == Some(previous) {
            to
        } else if to == Some(previous) {
            from
        } else {
            None
        }
    }
}
