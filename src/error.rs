use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Invalid UTF-8 in document: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Unexpected end of document: {0}")]
    UnexpectedEof(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Document not found in archive: {0}")]
    DocumentNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a coordinate ring is rejected.
///
/// These never leave the footprint resolver: the offending polygon is
/// skipped and logged instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RingError {
    #[error("ring has {0} points, at least 4 are required")]
    TooFewPoints(usize),

    #[error("ring is not closed: first and last points differ")]
    NotClosed,

    #[error("coordinate count {0} is not a multiple of 3")]
    IncompleteTuple(usize),

    #[error("non-numeric coordinate '{0}'")]
    InvalidNumber(String),

    #[error("ring has no coordinate list")]
    MissingCoordinates,
}
