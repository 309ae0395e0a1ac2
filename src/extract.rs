//! Footprint assembly: resolver + height estimator over every building.

use std::io::BufRead;
use std::path::Path;

use tracing::{debug, info};

use crate::building::Building;
use crate::error::Result;
use crate::footprint::resolve_footprint;
use crate::height::estimate_height;
use crate::index::CrossReferenceIndex;
use crate::model::{Footprint, DEFAULT_BUILDING_HEIGHT};
use crate::parser::Document;
use crate::stream::{open_document, BuildingStream, StreamOptions};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub stream: StreamOptions,
    pub default_height: f64,
    /// Stream buildings instead of parsing the whole document first.
    pub use_streaming: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            stream: StreamOptions::default(),
            default_height: DEFAULT_BUILDING_HEIGHT,
            use_streaming: true,
        }
    }
}

/// Builds the output record for one building, or `None` when the building
/// has no usable footprint polygon.
pub fn assemble_footprint(
    building: &Building,
    index: Option<&CrossReferenceIndex>,
    default_height: f64,
) -> Option<Footprint> {
    let resolved = resolve_footprint(building, index)?;
    let Some(first) = resolved.polygons.first() else {
        debug!(
            "Building {}: {:?} present but no valid polygon",
            building.display_id(),
            resolved.source
        );
        return None;
    };
    let height = estimate_height(building, default_height);
    debug!(
        "Building {}: height {} from {:?}",
        building.display_id(),
        height.value,
        height.source
    );

    Some(Footprint {
        building_id: building.display_id(),
        exterior: first.exterior.to_2d(),
        height: height.value,
        source: resolved.source,
        source_lod: resolved.lod,
    })
}

/// Extracts footprints from a document read from `source`.
pub fn extract_footprints_from_reader<R: BufRead>(
    source: R,
    options: &ExtractOptions,
) -> Result<Vec<Footprint>> {
    if !options.use_streaming {
        let document = Document::from_reader(source)?;
        return Ok(extract_footprints_from_document(&document, options));
    }

    let limit = options.stream.limit;
    let mut footprints = Vec::new();
    for item in BuildingStream::new(source, options.stream.clone()) {
        if limit.is_some_and(|limit| footprints.len() >= limit) {
            break;
        }
        let (building, index) = item?;
        footprints.extend(assemble_footprint(
            &building,
            Some(&index),
            options.default_height,
        ));
    }
    info!("Extracted {} footprints", footprints.len());
    Ok(footprints)
}

/// Extracts footprints from an already parsed document. The filter and
/// limit in `options.stream` apply exactly as when streaming.
pub fn extract_footprints_from_document(
    document: &Document,
    options: &ExtractOptions,
) -> Vec<Footprint> {
    let stream = &options.stream;
    let limit = stream.limit.unwrap_or(usize::MAX);
    let footprints: Vec<Footprint> = document
        .buildings_with(&stream.filter_attribute)
        .iter()
        .filter(|building| stream.accepts(building))
        .take(limit)
        .filter_map(|building| {
            assemble_footprint(building, Some(document.index()), options.default_height)
        })
        .take(limit)
        .collect();
    info!("Extracted {} footprints", footprints.len());
    footprints
}

pub fn extract_footprints(path: impl AsRef<Path>, options: &ExtractOptions) -> Result<Vec<Footprint>> {
    let path = path.as_ref();
    info!("Extracting footprints from {:?}", path);
    extract_footprints_from_reader(open_document(path)?, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FootprintSource, Lod};
    use std::collections::HashSet;

    const TWO_BUILDINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
                xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
                xmlns:gml="http://www.opengis.net/gml">
  <core:cityObjectMember>
    <bldg:Building gml:id="BLD_001">
      <bldg:lod0FootPrint>
        <gml:MultiSurface>
          <gml:surfaceMember>
            <gml:Polygon>
              <gml:exterior>
                <gml:LinearRing>
                  <gml:posList>0 0 0 10 0 0 10 10 0 0 10 0 0 0 0</gml:posList>
                </gml:LinearRing>
              </gml:exterior>
            </gml:Polygon>
          </gml:surfaceMember>
        </gml:MultiSurface>
      </bldg:lod0FootPrint>
    </bldg:Building>
  </core:cityObjectMember>
  <core:cityObjectMember>
    <bldg:Building gml:id="BLD_002"/>
  </core:cityObjectMember>
</core:CityModel>"#;

    #[test]
    fn test_two_buildings_one_footprint() {
        for use_streaming in [true, false] {
            let options = ExtractOptions {
                use_streaming,
                ..Default::default()
            };
            let footprints =
                extract_footprints_from_reader(TWO_BUILDINGS.as_bytes(), &options).unwrap();
            assert_eq!(footprints.len(), 1);

            let fp = &footprints[0];
            assert_eq!(fp.building_id, "BLD_001");
            assert_eq!(fp.height, 10.0);
            assert_eq!(fp.exterior.len(), 5);
            assert_eq!(fp.exterior[1], (10.0, 0.0));
            assert_eq!(fp.source, FootprintSource::Footprint);
            assert_eq!(fp.source_lod, Lod::Lod0);
        }
    }

    #[test]
    fn test_default_height_is_used() {
        let options = ExtractOptions {
            default_height: 20.0,
            ..Default::default()
        };
        let footprints =
            extract_footprints_from_reader(TWO_BUILDINGS.as_bytes(), &options).unwrap();
        assert_eq!(footprints[0].height, 20.0);
    }

    #[test]
    fn test_limit_and_filter_on_document_path() {
        let options = ExtractOptions {
            stream: StreamOptions {
                building_ids: Some(HashSet::from(["BLD_002".to_string()])),
                ..Default::default()
            },
            use_streaming: false,
            ..Default::default()
        };
        let footprints =
            extract_footprints_from_reader(TWO_BUILDINGS.as_bytes(), &options).unwrap();
        assert!(footprints.is_empty());

        let options = ExtractOptions {
            stream: StreamOptions {
                limit: Some(0),
                ..Default::default()
            },
            use_streaming: false,
            ..Default::default()
        };
        let doc = Document::parse_str(TWO_BUILDINGS).unwrap();
        assert!(extract_footprints_from_document(&doc, &options).is_empty());
    }

    #[test]
    fn test_building_with_only_invalid_polygon_is_skipped() {
        let xml = r#"<bldg:Building xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
                         xmlns:gml="http://www.opengis.net/gml" gml:id="X">
               <bldg:lod0FootPrint><gml:Polygon><gml:exterior><gml:LinearRing>
                 <gml:posList>0 0 0 1 0 0 1 1 0</gml:posList>
               </gml:LinearRing></gml:exterior></gml:Polygon></bldg:lod0FootPrint>
             </bldg:Building>"#;
        let footprints =
            extract_footprints_from_reader(xml.as_bytes(), &ExtractOptions::default()).unwrap();
        assert!(footprints.is_empty());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let result = extract_footprints_from_reader(
            "<core:CityModel><bldg:Building>".as_bytes(),
            &ExtractOptions::default(),
        );
        assert!(result.is_err());
    }
}
