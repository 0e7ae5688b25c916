//! Bus Registry
//!
//! Owns the bus list for the duration of one evaluation. Synthetic buses
//! are created through [`BusRegistry::ensure`], which is a no-op when the
//! tag already exists, so evaluating a previous evaluation's output
//! creates nothing new.

use std::collections::{HashMap, HashSet};

use crate::model::Bus;

#[derive(Debug, Clone, Default)]
pub struct BusRegistry {
    buses: Vec<Bus>,
    indices: HashMap<String, usize>,
    created: Vec<String>,
}

impl BusRegistry {
    pub fn new(buses: Vec<Bus>) -> Self {
        let mut indices = HashMap::new();
        for (i, bus) in buses.iter().enumerate() {
            indices.entry(bus.tag.clone()).or_insert(i);
        }
        Self {
            buses,
            indices,
            created: Vec::new(),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.indices.contains_key(tag)
    }

    pub fn get(&self, tag: &str) -> Option<&Bus> {
        self.indices.get(tag).map(|&i| &self.buses[i])
    }

    fn get_mut(&mut self, tag: &str) -> Option<&mut Bus> {
        let i = *self.indices.get(tag)?;
        self.buses.get_mut(i)
    }

    /// Create a synthetic bus `tag` on behalf of `source` unless one exists.
    /// Returns true when a bus was created.
    pub fn ensure(&mut self, tag: &str, source: &str) -> bool {
        if self.contains(tag) {
            return false;
        }
        self.indices.insert(tag.to_string(), self.buses.len());
        self.buses.push(Bus::synthetic(tag, source));
        self.created.push(tag.to_string());
        true
    }

    /// Undirected, idempotent adjacency between two known buses
    pub fn add_adjacency(&mut self, a: &str, b: &str) {
        if a == b || !self.contains(a) || !self.contains(b) {
            return;
        }
        if let Some(bus) = self.get_mut(a) {
            bus.add_adjacent(b);
        }
        if let Some(bus) = self.get_mut(b) {
            bus.add_adjacent(a);
        }
    }

    /// Tags of buses created through this registry, in creation order
    pub fn created(&self) -> &[String] {
        &self.created
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn into_buses(self) -> Vec<Bus> {
        self.buses
    }

    /// Give every bus created in this run a tier slot.
    ///
    /// A created bus goes one tier below the shallowest placed bus it is
    /// adjacent to, in the next free column of that tier. Buses with no
    /// placed neighbour after all passes land at the end of tier 0.
    pub fn place_created(&mut self) {
        let mut pending: Vec<String> = self.created.clone();

        loop {
            let unplaced: HashSet<String> = pending.iter().cloned().collect();
            let mut still_pending = Vec::new();
            let mut progressed = false;

            for tag in pending {
                let anchor_row = self.get(&tag).and_then(|bus| {
                    bus.adjacent_buses
                        .iter()
                        .filter(|adj| !unplaced.contains(*adj))
                        .filter_map(|adj| self.get(adj))
                        .map(|adj| adj.tier_row)
                        .min()
                });

                match anchor_row {
                    Some(row) => {
                        self.place(&tag, row + 1);
                        progressed = true;
                    }
                    None => still_pending.push(tag),
                }
            }

            pending = still_pending;
            if pending.is_empty() || !progressed {
                break;
            }
        }

        for tag in pending {
            self.place(&tag, 0);
        }
    }

    fn place(&mut self, tag: &str, row: u32) {
        let column = self
            .buses
            .iter()
            .filter(|b| b.tag != tag && b.tier_row == row)
            .map(|b| b.tier_column + 1)
            .max()
            .unwrap_or(0);

        if let Some(bus) = self.get_mut(tag) {
            bus.tier_row = row;
            bus.tier_column = column;
            tracing::debug!("Placed synthetic bus {} at tier {} column {}", tag, row, column);
        }
    }
}
