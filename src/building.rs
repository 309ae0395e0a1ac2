use std::collections::BTreeSet;
use std::rc::Rc;

use crate::model::{HeightSource, Lod};
use crate::xml::{Element, ElementKind, Namespace, QName, SurfaceType};

/// One `bldg:Building` subtree as handed out by the parser.
#[derive(Debug, Clone)]
pub struct Building {
    element: Rc<Element>,
    id: Option<String>,
    ordinal: usize,
}

/// A height-bearing text node found under a building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightTag<'a> {
    pub source: HeightSource,
    pub text: &'a str,
}

impl Building {
    /// `ordinal` is the 1-based position of the building in its document.
    pub fn new(element: Rc<Element>, filter_attribute: &QName, ordinal: usize) -> Self {
        let id = element
            .attribute(filter_attribute)
            .or_else(|| element.id())
            .map(str::to_string);
        Self {
            element,
            id,
            ordinal,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The identifier, or `building_<ordinal>` when the building has none.
    pub fn display_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("building_{}", self.ordinal))
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Levels of detail for which the building carries geometry.
    pub fn lods(&self) -> BTreeSet<Lod> {
        self.element
            .descendants()
            .filter_map(|e| match e.kind() {
                ElementKind::GeometryContainer(lod) => Some(lod),
                _ => None,
            })
            .collect()
    }

    pub fn footprint_containers(&self) -> Vec<&Element> {
        self.building_elements("lod0FootPrint")
    }

    pub fn roof_edge_containers(&self) -> Vec<&Element> {
        self.building_elements("lod0RoofEdge")
    }

    /// `bldg:GroundSurface` elements under `bldg:boundedBy`.
    pub fn ground_surfaces(&self) -> Vec<&Element> {
        self.boundary_surfaces(SurfaceType::Ground)
    }

    pub fn wall_surfaces(&self) -> Vec<&Element> {
        self.boundary_surfaces(SurfaceType::Wall)
    }

    pub fn height_tags(&self) -> Vec<HeightTag<'_>> {
        self.element
            .descendants()
            .filter_map(|e| match e.kind() {
                ElementKind::HeightTag(source) => Some(HeightTag {
                    source,
                    text: e.text(),
                }),
                _ => None,
            })
            .collect()
    }

    /// `bldg:BuildingPart` elements under `bldg:consistsOfBuildingPart`.
    pub fn parts(&self) -> Vec<&Element> {
        self.element
            .children_named(&Namespace::Building, "consistsOfBuildingPart")
            .into_iter()
            .flat_map(|c| c.children_named(&Namespace::Building, "BuildingPart"))
            .collect()
    }

    pub fn polygon_count(&self) -> usize {
        self.element
            .descendants()
            .filter(|e| e.kind() == ElementKind::Polygon)
            .count()
    }

    fn building_elements(&self, local: &str) -> Vec<&Element> {
        self.element
            .descendants()
            .filter(|e| e.name.is(&Namespace::Building, local))
            .collect()
    }

    fn boundary_surfaces(&self, surface: SurfaceType) -> Vec<&Element> {
        self.building_elements("boundedBy")
            .into_iter()
            .flat_map(|b| b.children.iter().map(|c| c.as_ref()))
            .filter(|e| e.kind() == ElementKind::BoundarySurface(surface))
            .collect()
    }
}
