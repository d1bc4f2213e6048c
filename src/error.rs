use std::path::PathBuf;

use thiserror::Error;

/// Failure inside a single document (one file or one archive member).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed timestamp {0:?}")]
    Timestamp(String),

    #[error("document has no `locations` array")]
    MissingLocations,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid GPX: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure that aborts a whole run. Every variant names the offending input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {source_name}: {source}")]
    Parse {
        source_name: String,
        #[source]
        source: ParseError,
    },

    #[error("unsupported file extension for {}: only .json, .kml, .gpx and .zip are supported", path.display())]
    UnsupportedExtension { path: PathBuf },

    #[error("unsupported extension for {member:?} in {}: only .json and .kml are supported", archive.display())]
    UnsupportedFormat { archive: PathBuf, member: String },

    #[error("{} is neither a Google Takeout nor an Apple Health export", archive.display())]
    UnsupportedArchive { archive: PathBuf },

    #[error("{}: expected exactly one entry matching {pattern}, found {found}", archive.display())]
    AmbiguousArchive {
        archive: PathBuf,
        pattern: String,
        found: usize,
    },

    #[error("cannot open zip archive {}: {source}", archive.display())]
    Zip {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn parse(source_name: impl Into<String>, source: ParseError) -> Self {
        Error::Parse {
            source_name: source_name.into(),
            source,
        }
    }
}
