use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::crs::detect_source_crs_from_reader;
use crate::error::{Error, Result};
use crate::extract::{extract_footprints_from_reader, ExtractOptions};
use crate::model::{CrsDetection, DocumentSummary, Footprint};
use crate::stream::summarize;

/// CityGML documents packed in a ZIP archive, as PLATEAU distributes them.
///
/// Members are read straight out of the archive; nothing is unpacked to
/// disk.
pub struct ZipHandler {
    path: PathBuf,
}

impl ZipHandler {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<ZipArchive<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(ZipArchive::new(BufReader::new(file))?)
    }

    /// `.gml` / `.xml` members, sorted by name.
    pub fn list_documents(&self) -> Result<Vec<String>> {
        let mut archive = self.open()?;
        let mut names = Vec::new();
        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name();
            // macOS のリソースフォークは除外
            if file.is_dir() || name.starts_with("__MACOSX/") {
                continue;
            }
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(".gml") || lower.ends_with(".xml") {
                names.push(name.to_string());
            }
        }
        names.sort();
        debug!("{:?}: {} CityGML member(s)", self.path, names.len());
        Ok(names)
    }

    /// Runs `f` over a buffered reader on the member `name`.
    pub fn with_document<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut dyn BufRead) -> Result<T>,
    ) -> Result<T> {
        let mut archive = self.open()?;
        let file = match archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(Error::DocumentNotFound(name.to_string())),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        f(&mut reader)
    }

    /// Footprints of every CityGML member, in member name order. Limits in
    /// `options` apply per member.
    pub fn extract_footprints(&self, options: &ExtractOptions) -> Result<Vec<(String, Vec<Footprint>)>> {
        let mut results = Vec::new();
        for name in self.list_documents()? {
            info!("Processing {}", name);
            let footprints =
                self.with_document(&name, |reader| extract_footprints_from_reader(reader, options))?;
            results.push((name, footprints));
        }
        Ok(results)
    }

    pub fn detect_source_crs(&self, name: &str) -> Result<CrsDetection> {
        self.with_document(name, |reader| detect_source_crs_from_reader(reader))
    }

    pub fn summarize(&self, name: &str, limit: Option<usize>) -> Result<DocumentSummary> {
        self.with_document(name, |reader| summarize(reader, limit))
    }
}
