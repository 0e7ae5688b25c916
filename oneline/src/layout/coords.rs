//! Coordinate assignment
//!
//! ```text
//! tier 0  ══A══════════        y = top_margin
//!              │ C1            chain stacked between the two bus lines,
//!              │ S1            stretched (never squeezed) to fill the gap
//! tier 1  ═══════B═════        y = top_margin + gap(0)
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::chains::{Chain, Orientation};
use super::LayoutConfig;
use crate::diagnostics::{Alert, AlertCode};
use crate::model::{Bus, Point};

/// Output of [`assign_coordinates`]
#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub buses: Vec<Bus>,
    pub element_coordinates: BTreeMap<String, Point>,
    /// Gap below each used tier row except the lowest, keyed by that row
    pub tier_gaps: BTreeMap<u32, f64>,
    pub tier_y: BTreeMap<u32, f64>,
    pub warnings: Vec<Alert>,
}

/// Place buses on their tier lines, then every chain element between them.
pub fn assign_coordinates(buses: &[Bus], chains: &[Chain], config: &LayoutConfig) -> Placement {
    let mut placement = Placement {
        buses: buses.to_vec(),
        ..Placement::default()
    };

    let rows: HashMap<&str, u32> = buses.iter().map(|b| (b.tag.as_str(), b.tier_row)).collect();
    let used: BTreeSet<u32> = buses.iter().map(|b| b.tier_row).collect();
    let profile = GapProfile::new(chains, &rows, config);
    placement.tier_gaps = tier_gaps(&used, &profile);
    placement.tier_y = tier_y(&used, &profile, config);
    place_buses(&mut placement.buses, &placement.tier_y, config);

    let positions: HashMap<String, Point> = placement
        .buses
        .iter()
        .filter_map(|b| b.position.map(|p| (b.tag.clone(), p)))
        .collect();

    for chain in chains {
        let (Some(&from), Some(&to)) = (positions.get(&chain.from_bus), positions.get(&chain.to_bus)) else {
            let missing = if positions.contains_key(&chain.from_bus) {
                &chain.to_bus
            } else {
                &chain.from_bus
            };
            let mut alert = Alert::error(
                AlertCode::ChainBusMissing,
                format!(
                    "Chain {} references bus '{}' which is not in the bus list",
                    chain.elements.join(" -> "),
                    missing
                ),
            );
            if let Some(branch) = &chain.branch {
                alert = alert.for_tag(branch.as_str());
            }
            tracing::warn!("{}", alert.message);
            placement.warnings.push(alert);
            continue;
        };

        match chain.orientation {
            Orientation::CrossTier => {
                place_cross_tier(chain, from, to, config, &mut placement.element_coordinates)
            }
            Orientation::SameTier => {
                place_same_tier(chain, from, to, config, &mut placement.element_coordinates)
            }
        }
    }

    tracing::debug!(
        "Placed {} buses and {} chain elements",
        placement.buses.len(),
        placement.element_coordinates.len()
    );
    placement
}

/// Cross-tier chain heights by the tier boundaries they straddle
struct GapProfile {
    /// (upper row, lower row, slot height)
    spans: Vec<(u32, u32, f64)>,
    min_gap: f64,
    padding: f64,
}

impl GapProfile {
    fn new(chains: &[Chain], rows: &HashMap<&str, u32>, config: &LayoutConfig) -> Self {
        let spans = chains
            .iter()
            .filter(|c| c.orientation == Orientation::CrossTier)
            .filter_map(|c| {
                let a = *rows.get(c.from_bus.as_str())?;
                let b = *rows.get(c.to_bus.as_str())?;
                Some((a.min(b), a.max(b), c.slot_height))
            })
            .collect();
        Self {
            spans,
            min_gap: config.min_tier_gap,
            padding: config.chain_padding,
        }
    }

    /// Gap between row `t` and row `t + 1`
    fn gap(&self, t: u32) -> f64 {
        self.spans
            .iter()
            .filter(|&&(low, high, _)| low <= t && high > t)
            .map(|&(_, _, h)| h + 2.0 * self.padding)
            .fold(self.min_gap, f64::max)
    }

    /// Total height from row `from` down to row `to`. The gap only changes
    /// where a chain starts or ends, so each constant run is summed at once.
    fn height(&self, from: u32, to: u32) -> f64 {
        let mut cuts: Vec<u32> = self
            .spans
            .iter()
            .flat_map(|&(low, high, _)| [low, high])
            .filter(|&c| c > from && c < to)
            .collect();
        cuts.push(to);
        cuts.sort_unstable();
        cuts.dedup();

        let mut start = from;
        let mut total = 0.0;
        for cut in cuts {
            total += f64::from(cut - start) * self.gap(start);
            start = cut;
        }
        total
    }
}

fn tier_gaps(rows: &BTreeSet<u32>, profile: &GapProfile) -> BTreeMap<u32, f64> {
    let last = rows.iter().next_back().copied();
    rows.iter()
        .filter(|&&t| Some(t) != last)
        .map(|&t| (t, profile.gap(t)))
        .collect()
}

fn tier_y(rows: &BTreeSet<u32>, profile: &GapProfile, config: &LayoutConfig) -> BTreeMap<u32, f64> {
    let mut ys = BTreeMap::new();
    let mut used = rows.iter().copied();
    let Some(first) = used.next() else {
        return ys;
    };

    let mut y = config.top_margin;
    ys.insert(first, y);
    let mut previous = first;
    for row in used {
        y += profile.height(previous, row);
        ys.insert(row, y);
        previous = row;
    }
    ys
}

fn place_buses(buses: &mut [Bus], tier_y: &BTreeMap<u32, f64>, config: &LayoutConfig) {
    let mut order: Vec<usize> = (0..buses.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&buses[a], &buses[b]);
        (a.tier_row, a.tier_column, &a.tag).cmp(&(b.tier_row, b.tier_column, &b.tag))
    });

    let mut cumulative: HashMap<u32, u32> = HashMap::new();
    for i in order {
        let bus = &mut buses[i];
        let units = bus.length_units.max(1);
        let running = cumulative.entry(bus.tier_row).or_insert(0);
        *running += units;

        let y = tier_y.get(&bus.tier_row).copied().unwrap_or(config.top_margin);
        let x = config.left_margin + config.grid_spacing * f64::from(*running);
        bus.position = Some(Point::new(x, y));
        bus.visual_length = Some(f64::from(units) * config.grid_spacing);
    }
}

/// Horizontal shift of a chain within its parallel group, centred on zero
fn parallel_shift(chain: &Chain, offset: f64) -> f64 {
    let centre = (chain.parallel_count.max(1) - 1) as f64 / 2.0;
    (chain.parallel_index as f64 - centre) * offset
}

fn place_cross_tier(
    chain: &Chain,
    from: Point,
    to: Point,
    config: &LayoutConfig,
    out: &mut BTreeMap<String, Point>,
) {
    let x = (from.x + to.x) / 2.0 + parallel_shift(chain, config.parallel_offset);

    let (top, bottom, ordered): (Point, Point, Vec<&String>) = if from.y <= to.y {
        (from, to, chain.elements.iter().collect())
    } else {
        (to, from, chain.elements.iter().rev().collect())
    };

    let available = (bottom.y - top.y) - 2.0 * config.chain_padding;
    let scale = if chain.slot_height > 0.0 {
        (available / chain.slot_height).max(1.0)
    } else {
        1.0
    };

    let mut offset = 0.0;
    for tag in ordered {
        let weight = chain.element_weight(tag, config);
        let y = top.y + config.chain_padding + scale * (offset + weight / 2.0);
        offset += weight;
        out.insert(tag.clone(), Point::new(x, y));
    }
}

fn place_same_tier(
    chain: &Chain,
    from: Point,
    to: Point,
    config: &LayoutConfig,
    out: &mut BTreeMap<String, Point>,
) {
    let mid = (from.x + to.x) / 2.0;
    let y = from.y - config.same_tier_offset - chain.parallel_index as f64 * config.parallel_offset;
    let centre = (chain.elements.len().max(1) - 1) as f64 / 2.0;
    // Elements run from the from-bus side, which may be on the right
    let direction = if from.x <= to.x { 1.0 } else { -1.0 };

    for (i, tag) in chain.elements.iter().enumerate() {
        let x = mid + direction * (i as f64 - centre) * config.element_spacing;
        out.insert(tag.clone(), Point::new(x, y));
    }
}
