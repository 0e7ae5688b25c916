//! Bus connectivity graph
//!
//! A petgraph view over resolved topology: buses are nodes, and each pair
//! of adjacent buses (joined by a branch or a bus tie) is an edge. Used for
//! island detection and path queries once evaluation has settled every
//! endpoint.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::Bus;

/// Node weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusNode {
    pub tag: String,
    pub tier_row: u32,
    pub is_swing: bool,
}

#[derive(Debug, Clone)]
pub struct TopologyGraph {
    graph: UnGraph<BusNode, ()>,
    bus_indices: HashMap<String, NodeIndex>,
}

impl TopologyGraph {
    fn with_buses(buses: &[Bus]) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut bus_indices = HashMap::new();

        for bus in buses {
            if bus_indices.contains_key(&bus.tag) {
                continue;
            }
            let idx = graph.add_node(BusNode {
                tag: bus.tag.clone(),
                tier_row: bus.tier_row,
                is_swing: bus.is_swing,
            });
            bus_indices.insert(bus.tag.clone(), idx);
        }

        Self { graph, bus_indices }
    }

    /// Connect two known buses; unknown tags and self loops are skipped
    fn connect(&mut self, a: &str, b: &str) {
        if let (Some(&ia), Some(&ib)) = (self.bus_indices.get(a), self.bus_indices.get(b)) {
            if ia != ib {
                self.graph.add_edge(ia, ib, ());
            }
        }
    }

    /// Edges from each bus's adjacency list, one per unordered pair
    pub fn from_buses(buses: &[Bus]) -> Self {
        let mut topology = Self::with_buses(buses);
        let mut pairs: BTreeSet<(&str, &str)> = BTreeSet::new();
        for bus in buses {
            for other in &bus.adjacent_buses {
                let (a, b) = (bus.tag.as_str(), other.as_str());
                pairs.insert(if a <= b { (a, b) } else { (b, a) });
            }
        }
        for (a, b) in pairs {
            topology.connect(a, b);
        }
        topology
    }

    pub fn bus_count(&self) -> usize {
        self.bus_indices.len()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Buses directly connected to `tag`, sorted
    pub fn neighbours(&self, tag: &str) -> Vec<&str> {
        let Some(&idx) = self.bus_indices.get(tag) else {
            return Vec::new();
        };
        let mut tags: Vec<&str> = self
            .graph
            .neighbors(idx)
            .map(|n| self.graph[n].tag.as_str())
            .collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    /// Connected groups of buses. Tags are sorted within each island and
    /// islands are ordered by their first tag.
    pub fn islands(&self) -> Vec<Vec<String>> {
        let mut sets: UnionFind<usize> = UnionFind::new(self.graph.node_count());
        for edge in self.graph.raw_edges() {
            sets.union(edge.source().index(), edge.target().index());
        }

        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for idx in self.graph.node_indices() {
            groups
                .entry(sets.find(idx.index()))
                .or_default()
                .push(self.graph[idx].tag.clone());
        }

        let mut islands: Vec<Vec<String>> = groups
            .into_values()
            .map(|mut tags| {
                tags.sort();
                tags
            })
            .collect();
        islands.sort();
        islands
    }

    /// Islands with no swing bus to feed them
    pub fn islands_without_source(&self) -> Vec<Vec<String>> {
        self.islands()
            .into_iter()
            .filter(|island| {
                !island.iter().any(|tag| {
                    self.bus_indices
                        .get(tag)
                        .map(|&idx| self.graph[idx].is_swing)
                        .unwrap_or(false)
                })
            })
            .collect()
    }

    /// Shortest bus-to-bus path by hop count
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        use petgraph::algo::astar;

        let from_idx = self.bus_indices.get(from)?;
        let to_idx = self.bus_indices.get(to)?;

        let result = astar(&self.graph, *from_idx, |n| n == *to_idx, |_| 1, |_| 0);

        result.map(|(_, path)| {
            path.into_iter()
                .map(|idx| self.graph[idx].tag.clone())
                .collect()
        })
    }

    pub fn stats(&self) -> TopologyStats {
        TopologyStats {
            bus_count: self.bus_count(),
            connection_count: self.connection_count(),
            island_count: self.islands().len(),
            swing_count: self.graph.node_weights().filter(|n| n.is_swing).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyStats {
    pub bus_count: usize,
    pub connection_count: usize,
    pub island_count: usize,
    pub swing_count: usize,
}
