//! File format identification and structural validation

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MeshIoError, MeshIoResult};
use crate::stl;

/// Formats handled by the interchange module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    Step,
    Stl,
    Obj,
}

impl FileFormat {
    /// Format from a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("step") | Some("stp") => Some(FileFormat::Step),
            Some("stl") => Some(FileFormat::Stl),
            Some("obj") => Some(FileFormat::Obj),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::Step => "STEP",
            FileFormat::Stl => "STL",
            FileFormat::Obj => "OBJ",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "step" | "stp" => Ok(FileFormat::Step),
            "stl" => Ok(FileFormat::Stl),
            "obj" => Ok(FileFormat::Obj),
            other => Err(format!("unknown format '{}' (expected step, stl or obj)", other)),
        }
    }
}

/// Marker every STEP physical file starts with
pub const STEP_MAGIC: &str = "ISO-10303-21";

/// Content signatures, evaluated in order by [`sniff_format`]
pub const CONTENT_SIGNATURES: &[(fn(&[u8]) -> bool, FileFormat)] = &[
    (looks_like_step, FileFormat::Step),
    (stl::is_binary_size_valid, FileFormat::Stl),
    (looks_like_ascii_stl, FileFormat::Stl),
    (looks_like_obj, FileFormat::Obj),
];

/// Classify content alone, without looking at a file name
pub fn sniff_format(bytes: &[u8]) -> Option<FileFormat> {
    CONTENT_SIGNATURES
        .iter()
        .find(|(matches, _)| matches(bytes))
        .map(|&(_, format)| format)
}

/// Classify a file from its name and content.
///
/// The extension wins when present. A `.stl` extension is still checked
/// against the content because it doesn't tell binary from ASCII and a file
/// matching neither encoding cannot be imported.
pub fn detect_format_from(path: &Path, bytes: &[u8]) -> MeshIoResult<FileFormat> {
    match FileFormat::from_path(path) {
        Some(FileFormat::Stl) => {
            if is_stl(bytes) {
                Ok(FileFormat::Stl)
            } else {
                Err(MeshIoError::file_format(
                    path,
                    format!(
                        "file has .stl extension but is neither binary STL \
                         ({} bytes does not match 84 + 50 * triangle count) nor ASCII STL \
                         (no leading 'solid')",
                        bytes.len()
                    ),
                ))
            }
        }
        Some(format) => Ok(format),
        None => sniff_format(bytes).ok_or_else(|| {
            MeshIoError::file_format(
                path,
                "unrecognized extension and content matches none of STEP, STL or OBJ",
            )
        }),
    }
}

/// Detect the format of a file on disk
pub fn detect_format(path: impl AsRef<Path>) -> MeshIoResult<FileFormat> {
    let path = path.as_ref();

    // Extension-only formats don't need the content
    if let Some(format @ (FileFormat::Step | FileFormat::Obj)) = FileFormat::from_path(path) {
        if !path.exists() {
            return Err(MeshIoError::file_format(path, "file not found"));
        }
        return Ok(format);
    }

    let bytes = read_for_detection(path)?;
    detect_format_from(path, &bytes)
}

/// Cheap structural check of a file against its detected (or expected) format.
///
/// Mismatches yield `Ok(false)`; only unreadable files are errors.
pub fn validate_file(
    path: impl AsRef<Path>,
    expected_format: Option<FileFormat>,
) -> MeshIoResult<bool> {
    let path = path.as_ref();
    let bytes = read_for_detection(path)?;

    if bytes.is_empty() {
        tracing::debug!("{}: empty file", path.display());
        return Ok(false);
    }

    let detected = match detect_format_from(path, &bytes) {
        Ok(format) => format,
        Err(e) => {
            tracing::debug!("{}", e);
            return Ok(false);
        }
    };

    if let Some(expected) = expected_format
        && expected != detected
    {
        tracing::debug!(
            "{}: expected {} but detected {}",
            path.display(),
            expected,
            detected
        );
        return Ok(false);
    }

    Ok(check_structure(detected, &bytes))
}

/// Structural well-formedness of `bytes` as `format`, without a full parse
pub fn check_structure(format: FileFormat, bytes: &[u8]) -> bool {
    match format {
        FileFormat::Stl => stl::is_binary_size_valid(bytes) || has_solid_pairing(bytes),
        FileFormat::Obj => has_vertex_line(bytes),
        FileFormat::Step => has_step_sections(bytes),
    }
}

fn read_for_detection(path: &Path) -> MeshIoResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        let reason = if e.kind() == std::io::ErrorKind::NotFound {
            "file not found".to_string()
        } else {
            format!("cannot read file: {}", e)
        };
        MeshIoError::file_format(path, reason)
    })
}

fn is_stl(bytes: &[u8]) -> bool {
    stl::is_binary_size_valid(bytes) || stl::starts_with_solid(bytes)
}

fn looks_like_step(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(STEP_MAGIC.as_bytes())
}

fn looks_like_ascii_stl(bytes: &[u8]) -> bool {
    if !stl::starts_with_solid(bytes) {
        return false;
    }
    let text = String::from_utf8_lossy(bytes);
    text.lines().any(|line| {
        let first = line.split_whitespace().next();
        matches!(first, Some("facet") | Some("endsolid"))
    })
}

fn looks_like_obj(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    text.lines().any(|line| {
        matches!(
            line.split_whitespace().next(),
            Some("v") | Some("vn") | Some("vt") | Some("f")
        )
    })
}

fn has_solid_pairing(bytes: &[u8]) -> bool {
    if !stl::starts_with_solid(bytes) {
        return false;
    }
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim_start().starts_with("endsolid"))
}

fn has_vertex_line(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .any(|line| line.split_whitespace().next() == Some("v"))
}

fn has_step_sections(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes).to_uppercase();
    if !text.contains(STEP_MAGIC) {
        return false;
    }
    let headers = text.matches("HEADER;").count();
    let data = text.matches("DATA;").count();
    let endsecs = text.matches("ENDSEC;").count();
    headers >= 1 && data >= 1 && endsecs == headers + data
}
