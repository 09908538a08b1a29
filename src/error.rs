use std::path::PathBuf;

use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors surfaced to the caller of [`crate::VolumeLoader`].
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("No readable DICOM files found")]
    NoReadableFiles,

    #[error("Image info was both computed from this batch and supplied by the caller")]
    AmbiguousImageInfoSource,

    #[error("Parsing did not finish within {0:?}")]
    ParseDeadlineExceeded(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to turn one file into a [`crate::TagDataset`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: dicom::object::ReadError,
    },

    #[error("{}: pixel data could not be decoded: {reason}", path.display())]
    PixelData { path: PathBuf, reason: String },

    #[error("{}: parsing panicked: {reason}", path.display())]
    Panicked { path: PathBuf, reason: String },
}

impl ParseError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ParseError::Read { path, .. }
            | ParseError::PixelData { path, .. }
            | ParseError::Panicked { path, .. } => path,
        }
    }
}

/// Failure that drops a single series from the output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("series {series_instance_uid}: slice {} is {found:?}, expected {expected:?}", file.display())]
    InconsistentGeometry {
        series_instance_uid: String,
        file: PathBuf,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("series {series_instance_uid}: {} has no pixel data", file.display())]
    MissingPixelData {
        series_instance_uid: String,
        file: PathBuf,
    },

    #[error("series {0} has no slices")]
    Empty(String),

    #[error("series {0} is not an image series")]
    NotImageSeries(String),
}
