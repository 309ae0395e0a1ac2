//! Building height estimation.
//!
//! Sources are tried in a fixed order and the first one producing a
//! strictly positive value is used:
//! `bldg:measuredHeight`, `uro:measuredHeight`, `uro:buildingHeight`,
//! the z-range of the building's coordinates, and finally the caller's
//! default. Unparseable, zero and negative values count as absent.

use tracing::debug;

use crate::building::Building;
use crate::footprint::parse_pos_list;
use crate::model::{HeightEstimate, HeightSource};
use crate::xml::{ElementKind, Namespace};

/// A z-range at or below this is treated as a flat building.
pub const Z_RANGE_EPSILON: f64 = 1e-6;

type HeightStep = (HeightSource, fn(&Building) -> Option<f64>);

static HEIGHT_CHAIN: [HeightStep; 4] = [
    (HeightSource::MeasuredHeight, measured_height),
    (HeightSource::UroMeasuredHeight, uro_measured_height),
    (HeightSource::UroBuildingHeight, uro_building_height),
    (HeightSource::ZRange, z_range),
];

pub fn estimate_height(building: &Building, default_height: f64) -> HeightEstimate {
    HEIGHT_CHAIN
        .iter()
        .find_map(|(source, step)| {
            step(building).map(|value| HeightEstimate {
                value,
                source: *source,
            })
        })
        .unwrap_or(HeightEstimate {
            value: default_height,
            source: HeightSource::Default,
        })
}

pub fn estimate_building_height(building: &Building, default_height: f64) -> f64 {
    estimate_height(building, default_height).value
}

fn measured_height(building: &Building) -> Option<f64> {
    tag_height(building, HeightSource::MeasuredHeight)
}

fn uro_measured_height(building: &Building) -> Option<f64> {
    tag_height(building, HeightSource::UroMeasuredHeight)
}

fn uro_building_height(building: &Building) -> Option<f64> {
    tag_height(building, HeightSource::UroBuildingHeight)
}

/// Value of the first tag of `source`, if it is a positive number.
fn tag_height(building: &Building, source: HeightSource) -> Option<f64> {
    let tag = building
        .height_tags()
        .into_iter()
        .find(|tag| tag.source == source)?;
    match tag.text.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => {
            debug!(
                "Building {}: ignoring {:?} value '{}'",
                building.display_id(),
                source,
                tag.text
            );
            None
        }
    }
}

/// max(z) - min(z) over every `gml:posList` / `gml:pos` under the building.
fn z_range(building: &Building) -> Option<f64> {
    let mut min_z = f64::INFINITY;
    let mut max_z = f64::NEG_INFINITY;

    let coordinate_lists = building.element().descendants().filter(|e| {
        e.kind() == ElementKind::Coordinates
            && (e.name.is(&Namespace::Gml, "posList") || e.name.is(&Namespace::Gml, "pos"))
    });
    for list in coordinate_lists {
        // 壊れた座標列はその列だけ読み飛ばす
        let Ok(points) = parse_pos_list(list.text()) else {
            continue;
        };
        for point in points {
            min_z = min_z.min(point.z);
            max_z = max_z.max(point.z);
        }
    }

    let range = max_z - min_z;
    (range.is_finite() && range > Z_RANGE_EPSILON).then_some(range)
}
