//! Saved coordinate overrides
//!
//! Callers persist hand-adjusted positions and hand them back on the next
//! run. The JSON shape of each payload is part of the external contract:
//!
//! ```text
//! bus            {"position": {"x": 120.0, "y": 60.0}, "length": 160.0}
//! bus (source)   {"x": 120.0, "y": 60.0}
//! anything else  {"x": 120.0, "y": 60.0}
//! ```

use serde::{Deserialize, Serialize};

use super::LayoutResult;
use crate::diagnostics::{Alert, AlertCode};
use crate::model::{ElementCategory, Point};
use crate::topology::ElementIndex;

/// One persisted position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateOverride {
    pub tag: String,
    /// Category label, e.g. `Bus`, `Cable`, `BusTie`
    pub category: String,
    pub payload: serde_json::Value,
}

/// Payload of a placed bus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusPlacement {
    pub position: Point,
    pub length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverridePayload {
    Bus(BusPlacement),
    Point(Point),
}

impl CoordinateOverride {
    pub fn point(tag: impl Into<String>, category: ElementCategory, at: Point) -> Self {
        Self {
            tag: tag.into(),
            category: category.label().to_string(),
            payload: serde_json::json!({ "x": at.x, "y": at.y }),
        }
    }

    pub fn bus(tag: impl Into<String>, at: Point, length: f64) -> Self {
        Self {
            tag: tag.into(),
            category: ElementCategory::Bus.label().to_string(),
            payload: serde_json::json!({
                "position": { "x": at.x, "y": at.y },
                "length": length,
            }),
        }
    }

    pub fn parsed_payload(&self) -> Option<OverridePayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Overwrite computed coordinates with saved ones.
///
/// Records that cannot be applied are skipped with an `OVERRIDE_IGNORED`
/// warning: unknown category label, unknown tag, category not matching the
/// element, or a payload not shaped for its category.
pub fn apply_overrides(result: &mut LayoutResult, overrides: &[CoordinateOverride], index: &ElementIndex) {
    for record in overrides {
        if let Err(reason) = apply_one(result, record, index) {
            let alert = Alert::warning(
                AlertCode::OverrideIgnored,
                format!("Override for '{}' ignored: {}", record.tag, reason),
            )
            .for_tag(record.tag.as_str());
            tracing::warn!("{}", alert.message);
            result.warnings.push(alert);
        }
    }
}

fn apply_one(result: &mut LayoutResult, record: &CoordinateOverride, index: &ElementIndex) -> Result<(), String> {
    let category: ElementCategory = record.category.parse()?;
    let actual = index
        .get(&record.tag)
        .map(|d| d.category)
        .ok_or_else(|| "no element with this tag".to_string())?;
    if actual != category {
        return Err(format!("element is a {}, not a {}", actual, category));
    }

    let payload = record
        .parsed_payload()
        .ok_or_else(|| format!("payload does not match the {} shape", category))?;

    match (category, payload) {
        (ElementCategory::Bus, payload) => {
            let bus = result
                .buses
                .iter_mut()
                .find(|b| b.tag == record.tag)
                .ok_or_else(|| "bus missing from layout".to_string())?;
            match payload {
                OverridePayload::Bus(placed) => {
                    bus.position = Some(placed.position);
                    bus.visual_length = Some(placed.length);
                }
                OverridePayload::Point(at) => bus.position = Some(at),
            }
        }
        (_, OverridePayload::Point(at)) => {
            result.element_coordinates.insert(record.tag.clone(), at);
        }
        (_, OverridePayload::Bus(_)) => {
            return Err(format!("payload does not match the {} shape", category));
        }
    }

    tracing::debug!("Applied override for '{}'", record.tag);
    Ok(())
}

/// Records reproducing the current layout, for persisting.
///
/// Source buses are saved as a bare point, other buses with their length.
pub fn capture_overrides(result: &LayoutResult, index: &ElementIndex) -> Vec<CoordinateOverride> {
    let mut records = Vec::new();

    for bus in &result.buses {
        let Some(at) = bus.position else { continue };
        if bus.is_swing {
            records.push(CoordinateOverride::point(bus.tag.as_str(), ElementCategory::Bus, at));
        } else {
            let length = bus.visual_length.unwrap_or_default();
            records.push(CoordinateOverride::bus(bus.tag.as_str(), at, length));
        }
    }

    for (tag, &at) in &result.element_coordinates {
        if let Some(descriptor) = index.get(tag) {
            records.push(CoordinateOverride::point(tag.as_str(), descriptor.category, at));
        }
    }

    records
}
