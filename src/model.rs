use serde::Serialize;

use crate::error::RingError;

/// Tolerance used when comparing the first and last point of a ring.
pub const RING_CLOSURE_TOLERANCE: f64 = 1e-9;

/// Height used when no tag or geometry yields one.
pub const DEFAULT_BUILDING_HEIGHT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn coincides(&self, other: &Point3) -> bool {
        (self.x - other.x).abs() <= RING_CLOSURE_TOLERANCE
            && (self.y - other.y).abs() <= RING_CLOSURE_TOLERANCE
            && (self.z - other.z).abs() <= RING_CLOSURE_TOLERANCE
    }
}

/// A closed ring of at least four points whose first and last points coincide.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRing {
    points: Vec<Point3>,
}

impl LinearRing {
    pub fn new(points: Vec<Point3>) -> Result<Self, RingError> {
        if points.len() < 4 {
            return Err(RingError::TooFewPoints(points.len()));
        }
        // 始点と終点が一致しないリングは受け付けない
        let first = points[0];
        let last = points[points.len() - 1];
        if !first.coincides(&last) {
            return Err(RingError::NotClosed);
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drops the z component of every point.
    pub fn to_2d(&self) -> Vec<(f64, f64)> {
        self.points.iter().map(|p| (p.x, p.y)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// `gml:id` of the source polygon, when it carried one.
    pub id: Option<String>,
    pub exterior: LinearRing,
    pub interiors: Vec<LinearRing>,
}

/// Level of detail of a CityGML geometry representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub enum Lod {
    Lod0,
    Lod1,
    Lod2,
    Lod3,
}

impl Lod {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Lod::Lod0),
            1 => Some(Lod::Lod1),
            2 => Some(Lod::Lod2),
            3 => Some(Lod::Lod3),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

impl From<Lod> for u8 {
    fn from(lod: Lod) -> Self {
        lod.level()
    }
}

/// Which geometry category a footprint was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FootprintSource {
    /// `bldg:lod0FootPrint`
    Footprint,
    /// `bldg:lod0RoofEdge`
    RoofEdge,
    /// `bldg:GroundSurface` under `bldg:boundedBy`
    GroundSurface,
}

/// Where a building height came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightSource {
    /// `bldg:measuredHeight`
    MeasuredHeight,
    /// `uro:measuredHeight`
    UroMeasuredHeight,
    /// `uro:buildingHeight`
    UroBuildingHeight,
    /// max(z) - min(z) over the building's coordinates
    ZRange,
    /// caller supplied default
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightEstimate {
    pub value: f64,
    pub source: HeightSource,
}

/// Canonical per-building output record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footprint {
    pub building_id: String,
    pub exterior: Vec<(f64, f64)>,
    pub height: f64,
    pub source: FootprintSource,
    pub source_lod: Lod,
}

/// Best-effort guess of a document's source CRS.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrsDetection {
    pub epsg_code: Option<String>,
    pub sample_lat: Option<f64>,
    pub sample_lon: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub total_buildings: usize,
    pub listed_building_ids: Vec<String>,
}
