//! Error types for mesh interchange

use std::fmt;
use std::path::{Path, PathBuf};

use crate::format::FileFormat;

/// Result alias used throughout the crate
pub type MeshIoResult<T> = Result<T, MeshIoError>;

/// Where in a source file a parse failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Unknown,
    /// 1-based line number (text formats)
    Line(usize),
    /// Byte offset from the start of the file (binary formats)
    ByteOffset(u64),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unknown => Ok(()),
            Location::Line(line) => write!(f, " at line {}", line),
            Location::ByteOffset(offset) => write!(f, " at byte offset {}", offset),
        }
    }
}

/// Parse failure produced by a codec working on in-memory data.
///
/// Codecs don't know which file they are decoding; the facade attaches the
/// path when it turns this into a [`MeshIoError::Import`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}{location}")]
pub struct ParseError {
    pub location: Location,
    pub reason: String,
}

impl ParseError {
    pub fn new(location: Location, reason: impl Into<String>) -> Self {
        Self {
            location,
            reason: reason.into(),
        }
    }

    pub fn at_line(line: usize, reason: impl Into<String>) -> Self {
        Self::new(Location::Line(line), reason)
    }

    pub fn at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self::new(Location::ByteOffset(offset), reason)
    }
}

/// Mesh data that a target format cannot represent
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct EncodeError(pub String);

/// Errors surfaced by detection, validation, import and export
#[derive(Debug, thiserror::Error)]
pub enum MeshIoError {
    #[error("Cannot determine file format of '{}': {reason}", path.display())]
    FileFormat { path: PathBuf, reason: String },

    #[error("Failed to import {format} file '{}'{location}: {reason}", path.display())]
    Import {
        path: PathBuf,
        format: FileFormat,
        location: Location,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to export {format} file '{}': {reason}", path.display())]
    Export {
        path: PathBuf,
        format: FileFormat,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid configuration '{}': {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl MeshIoError {
    pub fn file_format(path: &Path, reason: impl Into<String>) -> Self {
        Self::FileFormat {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Attach a path and format to a codec parse error
    pub fn from_parse(path: &Path, format: FileFormat, err: ParseError) -> Self {
        Self::Import {
            path: path.to_path_buf(),
            format,
            location: err.location,
            reason: err.reason,
            source: None,
        }
    }

    pub fn import_io(path: &Path, format: FileFormat, err: std::io::Error) -> Self {
        Self::Import {
            path: path.to_path_buf(),
            format,
            location: Location::Unknown,
            reason: format!("could not read file: {}", err),
            source: Some(err),
        }
    }

    pub fn export(path: &Path, format: FileFormat, reason: impl Into<String>) -> Self {
        Self::Export {
            path: path.to_path_buf(),
            format,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn export_io(path: &Path, format: FileFormat, err: std::io::Error) -> Self {
        Self::Export {
            path: path.to_path_buf(),
            format,
            reason: format!("could not write file: {}", err),
            source: Some(err),
        }
    }
}
