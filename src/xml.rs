//! Namespace-aware element tree used by every extraction stage.
//!
//! Only expanded namespace URIs and local names are significant. Prefixes
//! used in a document are discarded while parsing, so `bldg:Building` and
//! `b:Building` bound to the same URI are the same element.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use quick_xml::name::ResolveResult;

use crate::model::{HeightSource, Lod};

pub const GML_NS: &str = "http://www.opengis.net/gml";
pub const CORE_NS: &str = "http://www.opengis.net/citygml/2.0";
pub const BLDG_NS: &str = "http://www.opengis.net/citygml/building/2.0";
pub const URO_NS: &str = "https://www.geospatial.jp/iur/uro/3.1";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// The namespace families the extractor cares about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    /// GML 3.1.1 (`http://www.opengis.net/gml`) or any later `gml/x.y` URI
    Gml,
    /// CityGML core module
    Core,
    /// CityGML building module
    Building,
    /// PLATEAU urban object extension (`uro`)
    Uro,
    XLink,
    Other(String),
    #[default]
    None,
}

impl Namespace {
    pub fn from_uri(uri: &str) -> Self {
        if uri == GML_NS || uri.starts_with("http://www.opengis.net/gml/") {
            Namespace::Gml
        } else if uri.starts_with("http://www.opengis.net/citygml/building/") {
            Namespace::Building
        } else if uri == CORE_NS || uri == "http://www.opengis.net/citygml/1.0" {
            Namespace::Core
        } else if uri.contains("/iur/uro/") {
            Namespace::Uro
        } else if uri == XLINK_NS {
            Namespace::XLink
        } else {
            Namespace::Other(uri.to_string())
        }
    }

    /// Maps the conventional CityGML prefixes to their namespace.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "gml" => Some(Namespace::Gml),
            "core" => Some(Namespace::Core),
            "bldg" => Some(Namespace::Building),
            "uro" => Some(Namespace::Uro),
            "xlink" => Some(Namespace::XLink),
            _ => None,
        }
    }

    pub(crate) fn from_resolved(resolved: &ResolveResult<'_>) -> Self {
        match resolved {
            ResolveResult::Bound(ns) => Namespace::from_uri(&String::from_utf8_lossy(ns.as_ref())),
            ResolveResult::Unbound => Namespace::None,
            // 宣言されていない接頭辞は慣例的な名前なら受け入れる
            ResolveResult::Unknown(prefix) => {
                let prefix = String::from_utf8_lossy(prefix);
                Namespace::from_prefix(&prefix).unwrap_or_else(|| Namespace::Other(prefix.into_owned()))
            }
        }
    }
}

/// An expanded XML name: namespace plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QName {
    pub ns: Namespace,
    pub local: String,
}

impl QName {
    pub fn new(ns: Namespace, local: impl Into<String>) -> Self {
        Self {
            ns,
            local: local.into(),
        }
    }

    pub fn gml(local: &str) -> Self {
        Self::new(Namespace::Gml, local)
    }

    pub fn is(&self, ns: &Namespace, local: &str) -> bool {
        &self.ns == ns && self.local == local
    }

    /// The `gml:id` attribute name, default building filter attribute.
    pub fn gml_id() -> Self {
        Self::gml("id")
    }
}

/// Name of the attribute buildings are identified and filtered by.
pub type AttributeName = QName;

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match &self.ns {
            Namespace::Gml => "gml:",
            Namespace::Core => "core:",
            Namespace::Building => "bldg:",
            Namespace::Uro => "uro:",
            Namespace::XLink => "xlink:",
            Namespace::Other(uri) => return write!(f, "{{{}}}{}", uri, self.local),
            Namespace::None => "",
        };
        write!(f, "{}{}", prefix, self.local)
    }
}

/// Parses `gml:id`, `{http://www.opengis.net/gml}id` or a bare `id`.
impl FromStr for QName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("attribute name is empty".to_string());
        }
        if let Some(rest) = s.strip_prefix('{') {
            let (uri, local) = rest
                .split_once('}')
                .ok_or_else(|| format!("unterminated namespace in '{}'", s))?;
            return Ok(QName::new(Namespace::from_uri(uri), local));
        }
        match s.split_once(':') {
            Some((prefix, local)) => {
                let ns = Namespace::from_prefix(prefix)
                    .ok_or_else(|| format!("unknown namespace prefix '{}'", prefix))?;
                Ok(QName::new(ns, local))
            }
            None => Ok(QName::new(Namespace::None, s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Classification of an element by what the extractor does with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Building,
    BuildingPart,
    /// `bldg:lod0FootPrint`, `bldg:lod2MultiSurface`, ... with the LOD it declares
    GeometryContainer(Lod),
    /// `bldg:GroundSurface`, `bldg:WallSurface`, `bldg:RoofSurface`, ...
    BoundarySurface(SurfaceType),
    Polygon,
    /// `gml:posList`, `gml:pos`, `gml:lowerCorner`, `gml:upperCorner`
    Coordinates,
    HeightTag(HeightSource),
    /// An element that only points elsewhere through `xlink:href`
    Reference,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceType {
    Ground,
    Wall,
    Roof,
    Other,
}

/// One parsed XML element. Children are shared so the reference index can
/// point into a tree without copying it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub text: String,
    pub children: Vec<Rc<Element>>,
}

impl Element {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Unqualified attribute lookup, e.g. `srsName`.
    pub fn plain_attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.ns == Namespace::None && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// `gml:id`, falling back to an unqualified `id`.
    pub fn id(&self) -> Option<&str> {
        self.attribute(&QName::gml_id())
            .or_else(|| self.plain_attribute("id"))
    }

    pub fn href(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.ns == Namespace::XLink && a.name.local == "href")
            .map(|a| a.value.as_str())
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn kind(&self) -> ElementKind {
        let local = self.name.local.as_str();
        match &self.name.ns {
            Namespace::Building => match local {
                "Building" => ElementKind::Building,
                "BuildingPart" => ElementKind::BuildingPart,
                "measuredHeight" => ElementKind::HeightTag(HeightSource::MeasuredHeight),
                "GroundSurface" => ElementKind::BoundarySurface(SurfaceType::Ground),
                "WallSurface" => ElementKind::BoundarySurface(SurfaceType::Wall),
                "RoofSurface" => ElementKind::BoundarySurface(SurfaceType::Roof),
                "ClosureSurface" | "OuterCeilingSurface" | "OuterFloorSurface" => {
                    ElementKind::BoundarySurface(SurfaceType::Other)
                }
                _ => match lod_prefix(local) {
                    Some(lod) => ElementKind::GeometryContainer(lod),
                    None => self.reference_or_other(),
                },
            },
            Namespace::Uro => match local {
                "measuredHeight" => ElementKind::HeightTag(HeightSource::UroMeasuredHeight),
                "buildingHeight" => ElementKind::HeightTag(HeightSource::UroBuildingHeight),
                _ => self.reference_or_other(),
            },
            Namespace::Gml => match local {
                "Polygon" => ElementKind::Polygon,
                "posList" | "pos" | "lowerCorner" | "upperCorner" => ElementKind::Coordinates,
                _ => self.reference_or_other(),
            },
            _ => self.reference_or_other(),
        }
    }

    fn reference_or_other(&self) -> ElementKind {
        if self.children.is_empty() && self.href().is_some() {
            ElementKind::Reference
        } else {
            ElementKind::Other
        }
    }

    /// All descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().map(|c| c.as_ref()).collect(),
        }
    }

    /// Direct children with the given expanded name.
    pub fn children_named(&self, ns: &Namespace, local: &str) -> Vec<&Element> {
        self.children
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| c.name.is(ns, local))
            .collect()
    }

    pub fn first_child_named(&self, ns: &Namespace, local: &str) -> Option<&Element> {
        self.children
            .iter()
            .map(|c| c.as_ref())
            .find(|c| c.name.is(ns, local))
    }

    /// Copy of the element without its children, used to keep index
    /// entries for subtrees that are released after streaming.
    pub(crate) fn stub(&self) -> Element {
        Element {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            text: String::new(),
            children: Vec::new(),
        }
    }
}

impl Drop for Element {
    // 深くネストした木でも再帰せずに解放する
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Ok(mut child) = Rc::try_unwrap(child) {
                pending.append(&mut child.children);
            }
        }
    }
}

/// Reads the LOD out of names such as `lod0FootPrint` or `lod2Solid`.
fn lod_prefix(local: &str) -> Option<Lod> {
    let rest = local.strip_prefix("lod")?;
    let digit = rest.chars().next()?.to_digit(10)?;
    // "lod2" 単体や "lodX" は対象外
    if rest.len() <= 1 {
        return None;
    }
    Lod::from_level(digit as u8)
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack
            .extend(element.children.iter().rev().map(|c| c.as_ref()));
        Some(element)
    }
}
