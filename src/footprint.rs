//! Footprint geometry selection.
//!
//! CityGML can describe a building's ground outline in several ways. The
//! categories are searched in a fixed order and the first one present
//! wins, even if none of its polygons turn out to be usable:
//!
//! 1. `bldg:lod0FootPrint`
//! 2. `bldg:lod0RoofEdge`
//! 3. `bldg:GroundSurface` under `bldg:boundedBy`

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::building::Building;
use crate::error::RingError;
use crate::index::{CrossReferenceIndex, Resolution};
use crate::model::{FootprintSource, LinearRing, Lod, Point3, Polygon};
use crate::xml::{Element, ElementKind, Namespace};

/// Polygons selected for one building and the category they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFootprint {
    pub source: FootprintSource,
    pub lod: Lod,
    pub polygons: Vec<Polygon>,
}

struct FootprintRule {
    source: FootprintSource,
    locate: fn(&Building) -> Vec<&Element>,
}

static FOOTPRINT_RULES: [FootprintRule; 3] = [
    FootprintRule {
        source: FootprintSource::Footprint,
        locate: Building::footprint_containers,
    },
    FootprintRule {
        source: FootprintSource::RoofEdge,
        locate: Building::roof_edge_containers,
    },
    FootprintRule {
        source: FootprintSource::GroundSurface,
        locate: Building::ground_surfaces,
    },
];

/// Picks the footprint category for `building` and extracts every polygon
/// in it. Returns `None` when no category is present at all.
///
/// `xlink:href` members are looked up in `index` when one is given.
pub fn resolve_footprint(
    building: &Building,
    index: Option<&CrossReferenceIndex>,
) -> Option<ResolvedFootprint> {
    let (rule, containers) = FOOTPRINT_RULES.iter().find_map(|rule| {
        let containers = (rule.locate)(building);
        (!containers.is_empty()).then_some((rule, containers))
    })?;

    let mut polygons = Vec::new();
    for container in &containers {
        collect_polygons(container, index, &mut polygons);
    }
    let lod = match rule.source {
        FootprintSource::GroundSurface => containers
            .iter()
            .find_map(|c| declared_lod(c))
            .unwrap_or(Lod::Lod2),
        _ => Lod::Lod0,
    };
    debug!(
        "Building {}: {} polygon(s) from {:?}",
        building.display_id(),
        polygons.len(),
        rule.source
    );
    Some(ResolvedFootprint {
        source: rule.source,
        lod,
        polygons,
    })
}

/// Footprint polygons of a building, empty when it has no footprint
/// geometry.
pub fn find_footprint_polygons(
    building: &Building,
    index: Option<&CrossReferenceIndex>,
) -> Vec<Polygon> {
    resolve_footprint(building, index)
        .map(|resolved| resolved.polygons)
        .unwrap_or_default()
}

fn declared_lod(element: &Element) -> Option<Lod> {
    element.descendants().find_map(|e| match e.kind() {
        ElementKind::GeometryContainer(lod) => Some(lod),
        _ => None,
    })
}

/// Walks `container` in document order, following references through the
/// index, and parses every `gml:Polygon` it reaches.
fn collect_polygons(
    container: &Element,
    index: Option<&CrossReferenceIndex>,
    out: &mut Vec<Polygon>,
) {
    let mut followed: HashSet<String> = HashSet::new();
    let mut stack: Vec<Rc<Element>> = container.children.iter().rev().cloned().collect();

    while let Some(element) = stack.pop() {
        match element.kind() {
            ElementKind::Polygon => match parse_polygon(&element) {
                Ok(polygon) => out.push(polygon),
                Err(e) => warn!(
                    "Skipping polygon {}: {}",
                    element.id().unwrap_or("<anonymous>"),
                    e
                ),
            },
            ElementKind::Reference => {
                let Some(href) = element.href() else { continue };
                if !followed.insert(href.to_string()) {
                    continue;
                }
                match index.map(|i| i.resolve(href)) {
                    Some(Resolution::Resolved(target)) => stack.push(target),
                    _ => debug!("Unresolved reference {}", href),
                }
            }
            _ => stack.extend(element.children.iter().rev().cloned()),
        }
    }
}

/// Parses a `gml:Polygon` into its exterior and interior rings.
pub fn parse_polygon(polygon: &Element) -> Result<Polygon, RingError> {
    let exterior = polygon
        .first_child_named(&Namespace::Gml, "exterior")
        .ok_or(RingError::MissingCoordinates)
        .and_then(parse_boundary)?;

    let mut interiors = Vec::new();
    for interior in polygon.children_named(&Namespace::Gml, "interior") {
        match parse_boundary(interior) {
            Ok(ring) => interiors.push(ring),
            Err(e) => warn!(
                "Skipping interior ring of polygon {}: {}",
                polygon.id().unwrap_or("<anonymous>"),
                e
            ),
        }
    }

    Ok(Polygon {
        id: polygon.id().map(str::to_string),
        exterior,
        interiors,
    })
}

/// `gml:exterior` / `gml:interior` → `gml:LinearRing` → coordinates.
fn parse_boundary(boundary: &Element) -> Result<LinearRing, RingError> {
    let ring = boundary
        .first_child_named(&Namespace::Gml, "LinearRing")
        .ok_or(RingError::MissingCoordinates)?;

    if let Some(pos_list) = ring.first_child_named(&Namespace::Gml, "posList") {
        return LinearRing::new(parse_pos_list(pos_list.text())?);
    }

    // posList が無い場合は gml:pos の並びを読む
    let positions = ring.children_named(&Namespace::Gml, "pos");
    if positions.is_empty() {
        return Err(RingError::MissingCoordinates);
    }
    let mut points = Vec::with_capacity(positions.len());
    for pos in positions {
        points.extend(parse_pos_list(pos.text())?);
    }
    LinearRing::new(points)
}

/// Splits whitespace-separated coordinates into `(x, y, z)` triples.
pub fn parse_pos_list(text: &str) -> Result<Vec<Point3>, RingError> {
    let values = text
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| RingError::InvalidNumber(token.to_string()))
        })
        .collect::<Result<Vec<f64>, _>>()?;

    if values.len() % 3 != 0 {
        return Err(RingError::IncompleteTuple(values.len()));
    }
    Ok(values
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}
