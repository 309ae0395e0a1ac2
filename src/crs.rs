//! Source CRS detection.
//!
//! A bounded breadth-first scan looking for the first recognizable
//! `srsName` and the first coordinate-bearing element. Nothing here is
//! fatal: unreadable values are skipped and the scan moves on.

use std::collections::VecDeque;
use std::io::BufRead;

use tracing::debug;

use crate::error::Result;
use crate::model::CrsDetection;
use crate::parser::Document;
use crate::xml::{Element, ElementKind};

/// Maximum number of elements visited by [`detect_source_crs`].
pub const MAX_SCAN_ELEMENTS: usize = 10_000;

/// Elements read from a stream before the scan runs on the prefix.
pub const PREFIX_ELEMENTS: usize = 100_000;

const LAT_WINDOW: (f64, f64) = (20.0, 50.0);
const LON_WINDOW: (f64, f64) = (120.0, 155.0);

pub fn detect_source_crs(root: &Element) -> CrsDetection {
    scan(root, MAX_SCAN_ELEMENTS).0
}

/// Parses the beginning of a document and runs [`detect_source_crs`] on it.
pub fn detect_source_crs_from_reader<R: BufRead>(source: R) -> Result<CrsDetection> {
    let document = Document::from_reader_prefix(source, PREFIX_ELEMENTS)?;
    Ok(detect_source_crs(document.root()))
}

/// Returns the detection and the number of elements visited.
fn scan(root: &Element, max_elements: usize) -> (CrsDetection, usize) {
    let mut result = CrsDetection::default();
    let mut queue: VecDeque<(&Element, usize)> = VecDeque::from([(root, 0)]);
    let mut seen = 0;

    while let Some((element, depth)) = queue.pop_front() {
        if seen >= max_elements {
            debug!("CRS scan stopped at the {} element cap", max_elements);
            break;
        }
        seen += 1;

        if result.epsg_code.is_none() {
            if let Some(srs) = element.plain_attribute("srsName") {
                result.epsg_code = epsg_from_srs_name(srs);
                if let Some(code) = &result.epsg_code {
                    debug!("srsName '{}' -> {} at depth {}", srs, code, depth);
                }
            }
        }

        if result.sample_lat.is_none() && element.kind() == ElementKind::Coordinates {
            if let Some((lat, lon)) = sample_pair(element.text()) {
                debug!("Sample coordinate from <{}> at depth {}", element.name, depth);
                result.sample_lat = Some(lat);
                result.sample_lon = Some(lon);
            }
        }

        if result.epsg_code.is_some() && result.sample_lat.is_some() {
            break;
        }

        queue.extend(element.children.iter().map(|c| (c.as_ref(), depth + 1)));
    }

    (result, seen)
}

/// First two numbers of a coordinate list as `(lat, lon)`, swapped when
/// they only fit the Japan window in reverse order.
fn sample_pair(text: &str) -> Option<(f64, f64)> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next()?.parse::<f64>().ok()?;
    let second = tokens.next()?.parse::<f64>().ok()?;

    let in_window = |v: f64, (lo, hi): (f64, f64)| (lo..=hi).contains(&v);
    if in_window(first, LAT_WINDOW) && in_window(second, LON_WINDOW) {
        Some((first, second))
    } else if in_window(first, LON_WINDOW) && in_window(second, LAT_WINDOW) {
        Some((second, first))
    } else {
        // 投影座標系とみなしてそのまま返す
        Some((first, second))
    }
}

/// Normalizes an `srsName` to `EPSG:<code>`.
///
/// Accepts `http://www.opengis.net/def/crs/EPSG/0/6668`,
/// `urn:ogc:def:crs:EPSG::6697`, `EPSG:6668` and compound forms (comma
/// separated URNs or `crs-compound?1=...&2=...` URLs), where the first EPSG
/// code wins.
pub fn epsg_from_srs_name(srs_name: &str) -> Option<String> {
    let upper = srs_name.to_ascii_uppercase();
    upper
        .match_indices("EPSG")
        .find_map(|(start, marker)| epsg_code_after(&srs_name[start + marker.len()..]))
        .map(|code| format!("EPSG:{}", code))
}

/// Code following an `EPSG` marker. Version segments such as the `0` in
/// `EPSG/0/6668` or `6.6` in `EPSG:6.6:6668` are skipped.
fn epsg_code_after(rest: &str) -> Option<&str> {
    let segment = rest
        .split(|c| c == ':' || c == '/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .find(|s| !is_version(s))?;
    let end = segment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(segment.len());
    let code = &segment[..end];
    (!code.is_empty()).then_some(code)
}

fn is_version(segment: &str) -> bool {
    segment == "0"
        || (segment.contains('.') && segment.bytes().all(|b| b.is_ascii_digit() || b == b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(srs: Option<&str>, body: &str) -> Document {
        let srs = srs
            .map(|s| format!(r#" srsName="{}""#, s))
            .unwrap_or_default();
        let xml = format!(
            r#"<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
                              xmlns:gml="http://www.opengis.net/gml">
                 <gml:boundedBy><gml:Envelope{}>{}</gml:Envelope></gml:boundedBy>
               </core:CityModel>"#,
            srs, body
        );
        Document::parse_str(&xml).unwrap()
    }

    fn detect(srs: Option<&str>, body: &str) -> CrsDetection {
        detect_source_crs(document(srs, body).root())
    }

    const SRS: &str = "http://www.opengis.net/def/crs/EPSG/0/6668";

    #[test]
    fn test_detects_epsg_and_sample() {
        let result = detect(Some(SRS), "<gml:posList>35.6 139.7 0.0</gml:posList>");
        assert_eq!(result.epsg_code.as_deref(), Some("EPSG:6668"));
        assert_eq!(result.sample_lat, Some(35.6));
        assert_eq!(result.sample_lon, Some(139.7));
    }

    #[test]
    fn test_swaps_reversed_axis_order() {
        let result = detect(Some(SRS), "<gml:posList>139.7 35.6 0.0</gml:posList>");
        assert!(result.epsg_code.is_some());
        assert_eq!(result.sample_lat, Some(35.6));
        assert_eq!(result.sample_lon, Some(139.7));
    }

    #[test]
    fn test_projected_pair_kept_as_is() {
        let result = detect(None, "<gml:pos>-12000.5 35000.25 3</gml:pos>");
        assert_eq!(result.epsg_code, None);
        assert_eq!(result.sample_lat, Some(-12000.5));
        assert_eq!(result.sample_lon, Some(35000.25));
    }

    #[test]
    fn test_empty_document() {
        let doc = Document::parse_str("<root/>").unwrap();
        assert_eq!(detect_source_crs(doc.root()), CrsDetection::default());
    }

    #[test]
    fn test_unusable_coordinates_fall_through() {
        let result = detect(
            Some(SRS),
            "<gml:posList></gml:posList>\
             <gml:posList>abc def</gml:posList>\
             <gml:posList>35.0</gml:posList>\
             <gml:lowerCorner>35.5 139.5 0</gml:lowerCorner>",
        );
        assert_eq!(result.sample_lat, Some(35.5));
        assert_eq!(result.sample_lon, Some(139.5));
    }

    #[test]
    fn test_breadth_order_decides_between_tag_kinds() {
        // upperCorner は浅い位置、posList は深い位置にある
        let result = detect(
            Some(SRS),
            "<gml:upperCorner>36.0 140.0 0</gml:upperCorner>\
             <gml:Polygon><gml:exterior><gml:LinearRing>\
               <gml:posList>35.0 139.0 0 35.0 139.1 0 35.1 139.1 0 35.0 139.0 0</gml:posList>\
             </gml:LinearRing></gml:exterior></gml:Polygon>",
        );
        assert_eq!(result.sample_lat, Some(36.0));
        assert_eq!(result.sample_lon, Some(140.0));
    }

    #[test]
    fn test_unrecognized_srs_keeps_scanning() {
        let xml = r#"<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
                                      xmlns:gml="http://www.opengis.net/gml">
               <gml:Envelope srsName="local-grid"/>
               <gml:Envelope srsName="urn:ogc:def:crs:EPSG::6697"/>
             </core:CityModel>"#;
        let doc = Document::parse_str(xml).unwrap();
        let result = detect_source_crs(doc.root());
        assert_eq!(result.epsg_code.as_deref(), Some("EPSG:6697"));
    }

    #[test]
    fn test_stops_once_both_found() {
        let body: String = (0..150)
            .map(|i| format!("<gml:posList>35.{} 139.7 0</gml:posList>", i))
            .collect();
        let doc = document(Some(SRS), &body);
        let total = doc.root().descendants().count() + 1;
        let (result, seen) = scan(doc.root(), MAX_SCAN_ELEMENTS);
        assert!(result.epsg_code.is_some());
        assert_eq!(result.sample_lat, Some(35.0));
        assert!(seen < total);
    }

    #[test]
    fn test_scan_cap() {
        let body: String = (0..20).map(|_| "<gml:Point/>").collect();
        let doc = document(None, &body);
        let (result, seen) = scan(doc.root(), 5);
        assert_eq!(seen, 5);
        assert_eq!(result, CrsDetection::default());
    }

    #[test]
    fn test_epsg_from_srs_name_forms() {
        assert_eq!(epsg_from_srs_name(SRS).as_deref(), Some("EPSG:6668"));
        assert_eq!(
            epsg_from_srs_name("urn:ogc:def:crs:EPSG::6697").as_deref(),
            Some("EPSG:6697")
        );
        assert_eq!(epsg_from_srs_name("EPSG:6668").as_deref(), Some("EPSG:6668"));
        assert_eq!(
            epsg_from_srs_name("urn:ogc:def:crs,crs:EPSG::6668,crs:EPSG::6697").as_deref(),
            Some("EPSG:6668")
        );
        assert_eq!(
            epsg_from_srs_name("urn:ogc:def:crs:EPSG:6.6:6668").as_deref(),
            Some("EPSG:6668")
        );
        assert_eq!(epsg_from_srs_name("local-grid"), None);
        assert_eq!(epsg_from_srs_name("EPSG:"), None);
    }

    #[test]
    fn test_epsg_from_compound_url_takes_first_code() {
        let compound = "http://www.opengis.net/def/crs-compound?\
                        1=http://www.opengis.net/def/crs/EPSG/0/6668&\
                        2=http://www.opengis.net/def/crs/EPSG/0/6697";
        assert_eq!(epsg_from_srs_name(compound).as_deref(), Some("EPSG:6668"));
        assert_eq!(
            detect(Some(&compound.replace('&', "&amp;")), "")
                .epsg_code
                .as_deref(),
            Some("EPSG:6668")
        );
    }

    #[test]
    fn test_from_reader() {
        let xml = format!(
            r#"<gml:Envelope xmlns:gml="http://www.opengis.net/gml" srsName="{}">
                 <gml:lowerCorner>35.6 139.7</gml:lowerCorner>
               </gml:Envelope>"#,
            SRS
        );
        let result = detect_source_crs_from_reader(xml.as_bytes()).unwrap();
        assert_eq!(result.epsg_code.as_deref(), Some("EPSG:6668"));
        assert_eq!(result.sample_lon, Some(139.7));
    }
}
