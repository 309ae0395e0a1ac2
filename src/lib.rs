pub mod building;
pub mod crs;
pub mod error;
pub mod extract;
pub mod footprint;
pub mod height;
pub mod index;
pub mod model;
pub mod parser;
pub mod stream;
pub mod xml;
pub mod zip_handler;

pub use building::Building;
pub use crs::{detect_source_crs, detect_source_crs_from_reader, epsg_from_srs_name};
pub use error::{Error, Result, RingError};
pub use extract::{
    assemble_footprint, extract_footprints, extract_footprints_from_document,
    extract_footprints_from_reader, ExtractOptions,
};
pub use footprint::{find_footprint_polygons, resolve_footprint, ResolvedFootprint};
pub use height::{estimate_building_height, estimate_height};
pub use index::{CrossReferenceIndex, Resolution};
pub use model::{
    CrsDetection, DocumentSummary, Footprint, FootprintSource, HeightEstimate, HeightSource,
    LinearRing, Lod, Point3, Polygon, DEFAULT_BUILDING_HEIGHT,
};
pub use parser::Document;
pub use stream::{open_document, stream_parse, summarize, BuildingStream, StreamOptions};
pub use xml::{AttributeName, Element, ElementKind, Namespace, QName};
pub use zip_handler::ZipHandler;
