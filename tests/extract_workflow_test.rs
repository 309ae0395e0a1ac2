// tests/extract_workflow_test.rs

use citygml_footprint::{
    detect_source_crs, extract_footprints, find_footprint_polygons, stream_parse, Document,
    ExtractOptions, FootprintSource, HeightSource, Lod, StreamOptions, ZipHandler,
};

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

// 2棟: LOD0 フットプリント + 計測高さ、LOD2 の GroundSurface + xlink 参照
const PLATEAU_LIKE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
                xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
                xmlns:gml="http://www.opengis.net/gml"
                xmlns:uro="https://www.geospatial.jp/iur/uro/3.1"
                xmlns:xlink="http://www.w3.org/1999/xlink">
  <gml:boundedBy>
    <gml:Envelope srsName="http://www.opengis.net/def/crs/EPSG/0/6697">
      <gml:lowerCorner>35.68 139.76 0</gml:lowerCorner>
      <gml:upperCorner>35.69 139.77 50</gml:upperCorner>
    </gml:Envelope>
  </gml:boundedBy>
  <core:cityObjectMember>
    <bldg:Building gml:id="bldg_0001">
      <bldg:measuredHeight uom="m">25.5</bldg:measuredHeight>
      <bldg:lod0FootPrint>
        <gml:MultiSurface>
          <gml:surfaceMember>
            <gml:Polygon gml:id="fp_0001">
              <gml:exterior>
                <gml:LinearRing>
                  <gml:posList>35.680 139.760 0 35.680 139.761 0 35.681 139.761 0 35.681 139.760 0 35.680 139.760 0</gml:posList>
                </gml:LinearRing>
              </gml:exterior>
            </gml:Polygon>
          </gml:surfaceMember>
        </gml:MultiSurface>
      </bldg:lod0FootPrint>
    </bldg:Building>
  </core:cityObjectMember>
  <core:cityObjectMember>
    <bldg:Building gml:id="bldg_0002">
      <uro:buildingHeight>8.0</uro:buildingHeight>
      <bldg:lod2Solid>
        <gml:Solid>
          <gml:exterior>
            <gml:CompositeSurface>
              <gml:surfaceMember xlink:href="#ground_0002"/>
            </gml:CompositeSurface>
          </gml:exterior>
        </gml:Solid>
      </bldg:lod2Solid>
      <bldg:boundedBy>
        <bldg:GroundSurface gml:id="gs_0002">
          <bldg:lod2MultiSurface>
            <gml:MultiSurface>
              <gml:surfaceMember>
                <gml:Polygon gml:id="ground_0002">
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:pos>35.682 139.762 2</gml:pos>
                      <gml:pos>35.682 139.763 2</gml:pos>
                      <gml:pos>35.683 139.763 2</gml:pos>
                      <gml:pos>35.682 139.762 2</gml:pos>
                    </gml:LinearRing>
                  </gml:exterior>
                </gml:Polygon>
              </gml:surfaceMember>
            </gml:MultiSurface>
          </bldg:lod2MultiSurface>
        </bldg:GroundSurface>
      </bldg:boundedBy>
    </bldg:Building>
  </core:cityObjectMember>
  <core:cityObjectMember>
    <bldg:Building gml:id="bldg_0003"/>
  </core:cityObjectMember>
</core:CityModel>
"##;

fn write_fixture(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write fixture");
    path
}

#[test]
fn test_full_extraction_workflow() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "53394611_bldg_6697.gml", PLATEAU_LIKE);

    let footprints = extract_footprints(&path, &ExtractOptions::default())
        .expect("Integration Test: extraction failed");
    assert_eq!(footprints.len(), 2);

    let first = &footprints[0];
    assert_eq!(first.building_id, "bldg_0001");
    assert_eq!(first.height, 25.5);
    assert_eq!(first.source, FootprintSource::Footprint);
    assert_eq!(first.source_lod, Lod::Lod0);
    assert_eq!(first.exterior.len(), 5);
    assert_eq!(first.exterior.first(), first.exterior.last());

    let second = &footprints[1];
    assert_eq!(second.building_id, "bldg_0002");
    assert_eq!(second.height, 8.0);
    assert_eq!(second.source, FootprintSource::GroundSurface);
    assert_eq!(second.source_lod, Lod::Lod2);
    assert_eq!(second.exterior[2], (35.683, 139.763));

    let json = serde_json::to_value(&footprints).unwrap();
    assert_eq!(json[0]["building_id"], "bldg_0001");
    assert_eq!(json[0]["source_lod"], 0);
    assert_eq!(json[1]["source"], "ground_surface");
}

#[test]
fn test_streaming_and_full_parse_agree() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "city.gml", PLATEAU_LIKE);

    let streamed = extract_footprints(&path, &ExtractOptions::default()).unwrap();
    let full = extract_footprints(
        &path,
        &ExtractOptions {
            use_streaming: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(streamed, full);

    let streamed_ids: Vec<String> = stream_parse(&path, StreamOptions::default())
        .unwrap()
        .map(|item| item.unwrap().0.display_id())
        .collect();
    let document = Document::from_reader(PLATEAU_LIKE.as_bytes()).unwrap();
    let full_ids: Vec<String> = document.buildings().iter().map(|b| b.display_id()).collect();
    assert_eq!(streamed_ids, full_ids);
}

#[test]
fn test_stream_filter_and_limit() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "city.gml", PLATEAU_LIKE);

    let options = StreamOptions {
        building_ids: Some(HashSet::from(["bldg_0002".to_string()])),
        ..Default::default()
    };
    let buildings: Vec<_> = stream_parse(&path, options)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(buildings.len(), 1);

    let (building, index) = &buildings[0];
    assert_eq!(building.id(), Some("bldg_0002"));
    let polygons = find_footprint_polygons(building, Some(index));
    assert_eq!(polygons.len(), 1);
    assert_eq!(polygons[0].id.as_deref(), Some("ground_0002"));

    let limited = extract_footprints(
        &path,
        &ExtractOptions {
            stream: StreamOptions {
                limit: Some(1),
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].building_id, "bldg_0001");
}

#[test]
fn test_crs_detection_on_document() {
    let document = Document::from_reader(PLATEAU_LIKE.as_bytes()).unwrap();
    let detection = detect_source_crs(document.root());
    assert_eq!(detection.epsg_code.as_deref(), Some("EPSG:6697"));
    assert_eq!(detection.sample_lat, Some(35.68));
    assert_eq!(detection.sample_lon, Some(139.76));
}

#[test]
fn test_height_source_reported() {
    let document = Document::from_reader(PLATEAU_LIKE.as_bytes()).unwrap();
    let buildings = document.buildings();
    let sources: Vec<HeightSource> = buildings
        .iter()
        .map(|b| citygml_footprint::estimate_height(b, 10.0).source)
        .collect();
    assert_eq!(
        sources,
        vec![
            HeightSource::MeasuredHeight,
            HeightSource::UroBuildingHeight,
            HeightSource::Default
        ]
    );
}

#[test]
fn test_zip_archive_workflow() {
    let dir = TempDir::new().unwrap();
    let zip_path = dir.path().join("13100_tokyo.zip");
    {
        let file = fs::File::create(&zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("udx/bldg/53394611_bldg_6697.gml", options).unwrap();
        zip.write_all(PLATEAU_LIKE.as_bytes()).unwrap();
        zip.start_file("codelists/Building_usage.xml", options).unwrap();
        zip.write_all(b"<gml:Dictionary xmlns:gml=\"http://www.opengis.net/gml\"/>").unwrap();
        zip.finish().unwrap();
    }

    let handler = ZipHandler::new(&zip_path);
    let documents = handler.list_documents().unwrap();
    assert_eq!(
        documents,
        vec!["codelists/Building_usage.xml", "udx/bldg/53394611_bldg_6697.gml"]
    );

    let results = handler.extract_footprints(&ExtractOptions::default()).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_empty());
    assert_eq!(results[1].1.len(), 2);

    let detection = handler
        .detect_source_crs("udx/bldg/53394611_bldg_6697.gml")
        .unwrap();
    assert_eq!(detection.epsg_code.as_deref(), Some("EPSG:6697"));
}

#[test]
fn test_malformed_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(
        &dir,
        "broken.gml",
        &PLATEAU_LIKE.replace("</core:CityModel>", ""),
    );
    assert!(extract_footprints(&path, &ExtractOptions::default()).is_err());
}
