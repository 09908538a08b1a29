//! Structured record of everything the loader dropped or skipped.
//!
//! Loading is best effort over a heterogeneous folder, so per-file and
//! per-series problems never abort the run. Each one is logged and pushed here
//! so callers can report on it.

use std::fmt;
use std::path::PathBuf;

use log::{debug, warn};

use crate::error::{ParseError, SeriesError};

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The file could not be read or its pixel data not decoded.
    ParseFailure { path: PathBuf, reason: String },
    /// Modality missing or not one of the supported values.
    UnrecognizedModality {
        path: PathBuf,
        modality: Option<String>,
    },
    /// The series was dropped.
    SeriesDropped(SeriesError),
    /// The series has no affine and is excluded from contour projection.
    MissingRequiredGeometry {
        series_instance_uid: String,
        missing: &'static str,
    },
    /// An RTSTRUCT (or part of one) could not be used.
    MalformedStructureSet { path: PathBuf, reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ParseFailure { path, reason } => {
                write!(f, "skipped {}: {reason}", path.display())
            }
            Diagnostic::UnrecognizedModality { path, modality } => write!(
                f,
                "skipped {}: modality {}",
                path.display(),
                modality.as_deref().unwrap_or("<missing>")
            ),
            Diagnostic::SeriesDropped(err) => write!(f, "dropped {err}"),
            Diagnostic::MissingRequiredGeometry {
                series_instance_uid,
                missing,
            } => write!(f, "series {series_instance_uid} has no affine: {missing}"),
            Diagnostic::MalformedStructureSet { path, reason } => {
                write!(f, "structure set {}: {reason}", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and logs a diagnostic. Expected omissions log at debug level.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::UnrecognizedModality { .. } | Diagnostic::MissingRequiredGeometry { .. } => {
                debug!("{diagnostic}")
            }
            _ => warn!("{diagnostic}"),
        }
        self.entries.push(diagnostic);
    }

    pub fn parse_failure(&mut self, err: &ParseError) {
        self.push(Diagnostic::ParseFailure {
            path: err.path().clone(),
            reason: err.to_string(),
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn parse_failures(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::ParseFailure { .. }))
    }

    pub fn dropped_series(&self) -> impl Iterator<Item = &SeriesError> {
        self.entries.iter().filter_map(|d| match d {
            Diagnostic::SeriesDropped(err) => Some(err),
            _ => None,
        })
    }
}
