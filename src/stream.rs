//! Forward-only iteration over the buildings of a CityGML document.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::building::Building;
use crate::error::Result;
use crate::index::CrossReferenceIndex;
use crate::model::DocumentSummary;
use crate::parser::{Retention, TreeReader};
use crate::xml::AttributeName;

#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Stop after this many buildings have been yielded.
    pub limit: Option<usize>,
    /// Only yield buildings whose filter attribute is in this set.
    pub building_ids: Option<HashSet<String>>,
    pub filter_attribute: AttributeName,
}

impl StreamOptions {
    /// Whether `building` passes the identifier filter.
    pub fn accepts(&self, building: &Building) -> bool {
        match &self.building_ids {
            None => true,
            Some(ids) => building
                .element()
                .attribute(&self.filter_attribute)
                .is_some_and(|value| ids.contains(value)),
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            limit: None,
            building_ids: None,
            filter_attribute: AttributeName::gml_id(),
        }
    }
}

/// Lazily yields `(building, index snapshot)` pairs in document order.
///
/// The source is read once; the stream cannot be restarted. Each snapshot
/// holds every identified element closed so far, including those outside
/// the building and those in buildings that were filtered out.
pub struct BuildingStream<R: BufRead> {
    reader: TreeReader<R>,
    options: StreamOptions,
    buildings_seen: usize,
    yielded: usize,
    done: bool,
}

impl<R: BufRead> BuildingStream<R> {
    pub fn new(source: R, options: StreamOptions) -> Self {
        Self {
            reader: TreeReader::new(source, Retention::Streaming),
            options,
            buildings_seen: 0,
            yielded: 0,
            done: false,
        }
    }

    /// Index accumulated so far.
    pub fn index(&self) -> &CrossReferenceIndex {
        self.reader.index()
    }

    /// Number of top-level buildings read, whether yielded or not.
    pub fn buildings_seen(&self) -> usize {
        self.buildings_seen
    }
}

impl<R: BufRead> Iterator for BuildingStream<R> {
    type Item = Result<(Building, CrossReferenceIndex)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.options.limit.is_some_and(|limit| self.yielded >= limit) {
            debug!("Limit of {} buildings reached", self.yielded);
            self.done = true;
            return None;
        }

        loop {
            let element = match self.reader.next_building() {
                Ok(Some(element)) => element,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            self.buildings_seen += 1;
            let building = Building::new(
                element,
                &self.options.filter_attribute,
                self.buildings_seen,
            );
            if !self.options.accepts(&building) {
                debug!("Filtered out building {}", building.display_id());
                continue;
            }
            self.yielded += 1;
            return Some(Ok((building, self.reader.index().clone())));
        }
    }
}

/// Opens a `.gml` / `.xml` file for reading.
pub fn open_document(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

pub fn stream_parse(
    path: impl AsRef<Path>,
    options: StreamOptions,
) -> Result<BuildingStream<BufReader<File>>> {
    let path = path.as_ref();
    info!("Streaming buildings from {:?}", path);
    Ok(BuildingStream::new(open_document(path)?, options))
}

/// Counts every top-level building and lists the identifiers of the
/// first `limit` of them.
pub fn summarize<R: BufRead>(source: R, limit: Option<usize>) -> Result<DocumentSummary> {
    let mut summary = DocumentSummary::default();
    for item in BuildingStream::new(source, StreamOptions::default()) {
        let (building, _) = item?;
        summary.total_buildings += 1;
        if limit.map_or(true, |limit| summary.listed_building_ids.len() < limit) {
            summary.listed_building_ids.push(building.display_id());
        }
    }
    info!("Found {} buildings", summary.total_buildings);
    Ok(summary)
}
