//! STEP passthrough codec
//!
//! STEP content is kept as opaque text. Only the presence of the section
//! markers is interpreted; BREP data is left to a CAD kernel.
//!
//! Content is decoded as UTF-8 and invalid sequences are replaced with
//! U+FFFD, so a file containing them is not written back byte for byte.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MeshIoError, MeshIoResult, ParseError};
use crate::format::{FileFormat, STEP_MAGIC};
use crate::io::{ExportData, ImportResult};
use crate::progress::ProgressReporter;

/// Section markers found in a STEP document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepMetadata {
    /// Content length in bytes
    pub size: usize,
    /// `HEADER;` and `ENDSEC;` are both present
    pub has_header: bool,
    /// `DATA;` and `ENDSEC;` are both present
    pub has_data: bool,
}

impl StepMetadata {
    /// Scan `content` for section markers (presence only, case-insensitive).
    ///
    /// A `HEADER;` without a matching `ENDSEC;` count still sets
    /// `has_header` as long as some `ENDSEC;` exists.
    pub fn scan(content: &str) -> Self {
        let upper = content.to_uppercase();
        let has_endsec = upper.contains("ENDSEC;");
        Self {
            size: content.len(),
            has_header: upper.contains("HEADER;") && has_endsec,
            has_data: upper.contains("DATA;") && has_endsec,
        }
    }
}

/// Raw STEP file content plus its section metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDocument {
    pub content: String,
    pub metadata: StepMetadata,
}

impl StepDocument {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let metadata = StepMetadata::scan(&content);
        Self { content, metadata }
    }

    /// Replace the content wholesale, refreshing the metadata
    pub fn set_content(&mut self, content: impl Into<String>) {
        *self = Self::new(content);
    }
}

/// Decode STEP text held in memory
pub fn decode(bytes: &[u8], progress: &mut ProgressReporter) -> Result<StepDocument, ParseError> {
    let content = String::from_utf8_lossy(bytes).into_owned();
    progress.report(50);

    if !content.contains(STEP_MAGIC) {
        return Err(ParseError::at_line(
            1,
            format!("missing {} header, not a STEP physical file", STEP_MAGIC),
        ));
    }

    let document = StepDocument::new(content);
    progress.finish();
    Ok(document)
}

/// Import a STEP file as raw content
pub fn import_step(path: impl AsRef<Path>) -> MeshIoResult<ImportResult> {
    read_step(path.as_ref(), &mut ProgressReporter::silent())
}

/// Write STEP content back out verbatim
pub fn export_step<'a>(path: impl AsRef<Path>, data: impl Into<ExportData<'a>>) -> MeshIoResult<()> {
    write_step(path.as_ref(), data.into(), &mut ProgressReporter::silent())
}

pub(crate) fn read_step(path: &Path, progress: &mut ProgressReporter) -> MeshIoResult<ImportResult> {
    let bytes =
        std::fs::read(path).map_err(|e| MeshIoError::import_io(path, FileFormat::Step, e))?;
    let document =
        decode(&bytes, progress).map_err(|e| MeshIoError::from_parse(path, FileFormat::Step, e))?;

    tracing::debug!(
        "Loaded STEP '{}': {} bytes (header: {}, data: {})",
        path.display(),
        document.metadata.size,
        document.metadata.has_header,
        document.metadata.has_data
    );

    Ok(ImportResult::Step(document))
}

pub(crate) fn write_step(
    path: &Path,
    data: ExportData,
    progress: &mut ProgressReporter,
) -> MeshIoResult<()> {
    let document = data.step().ok_or_else(|| {
        MeshIoError::export(
            path,
            FileFormat::Step,
            "STEP export requires document content; mesh data cannot be written as STEP",
        )
    })?;
    progress.report(50);

    std::fs::write(path, &document.content)
        .map_err(|e| MeshIoError::export_io(path, FileFormat::Step, e))?;
    progress.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use tempfile::tempdir;

    const SAMPLE: &str = "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION(('part'),'2;1');\nENDSEC;\nDATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\nENDSEC;\nEND-ISO-10303-21;\n";

    #[test]
    fn test_metadata_scan() {
        let metadata = StepMetadata::scan(SAMPLE);
        assert!(metadata.has_header);
        assert!(metadata.has_data);
        assert_eq!(metadata.size, SAMPLE.len());
    }

    #[test]
    fn test_metadata_is_presence_only() {
        let metadata = StepMetadata::scan("ISO-10303-21;\nheader;\nDATA;\nENDSEC;\n");
        assert!(metadata.has_header);
        assert!(metadata.has_data);

        let metadata = StepMetadata::scan("ISO-10303-21;\nHEADER;\n");
        assert!(!metadata.has_header);
        assert!(!metadata.has_data);
    }

    #[test]
    fn test_decode_requires_magic() {
        let err = decode(b"HEADER;\nENDSEC;\n", &mut ProgressReporter::silent()).unwrap_err();
        assert!(err.reason.contains("ISO-10303-21"));
    }

    #[test]
    fn test_set_content_refreshes_metadata() {
        let mut document = StepDocument::new(SAMPLE);
        document.set_content("ISO-10303-21;\n");
        assert!(!document.metadata.has_header);
        assert_eq!(document.metadata.size, 14);
    }

    #[test]
    fn test_round_trip_is_verbatim() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.step");
        let output = dir.path().join("out.stp");
        std::fs::write(&input, SAMPLE).unwrap();

        let result = import_step(&input).unwrap();
        export_step(&output, &result).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), SAMPLE);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("latin1.step");
        let output = dir.path().join("copy.step");
        let mut bytes = b"ISO-10303-21;\nHEADER;\nFILE_NAME('".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"');\nENDSEC;\n");
        std::fs::write(&input, &bytes).unwrap();

        let result = import_step(&input).unwrap();
        assert!(result.content().unwrap().contains("FILE_NAME('\u{FFFD}')"));

        export_step(&output, &result).unwrap();
        let written = std::fs::read(&output).unwrap();
        assert_ne!(written, bytes);
        assert_eq!(written.len(), bytes.len() + 2);
    }

    #[test]
    fn test_export_mesh_as_step_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mesh.step");
        let err = export_step(&path, &Mesh::default()).unwrap_err();
        assert!(matches!(err, MeshIoError::Export { format: FileFormat::Step, .. }));
        assert!(!path.exists());
    }
}
