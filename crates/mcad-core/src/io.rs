//! Dispatch facade: routes imports and exports to the format codecs

use std::path::Path;

use serde::Serialize;

use crate::config::MeshIoConfig;
use crate::error::{MeshIoError, MeshIoResult};
use crate::format::{FileFormat, detect_format};
use crate::mesh::Mesh;
use crate::obj::{self, ObjMetadata};
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::step::{self, StepDocument};
use crate::stl::{self, StlMetadata};

/// Data produced by an import, tagged by format
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format")]
pub enum ImportResult {
    Stl { mesh: Mesh, metadata: StlMetadata },
    Obj { mesh: Mesh, metadata: ObjMetadata },
    Step(StepDocument),
}

impl ImportResult {
    pub fn format(&self) -> FileFormat {
        match self {
            ImportResult::Stl { .. } => FileFormat::Stl,
            ImportResult::Obj { .. } => FileFormat::Obj,
            ImportResult::Step(_) => FileFormat::Step,
        }
    }

    /// Mesh of an STL or OBJ import
    pub fn mesh(&self) -> Option<&Mesh> {
        match self {
            ImportResult::Stl { mesh, .. } | ImportResult::Obj { mesh, .. } => Some(mesh),
            ImportResult::Step(_) => None,
        }
    }

    pub fn into_mesh(self) -> Option<Mesh> {
        match self {
            ImportResult::Stl { mesh, .. } | ImportResult::Obj { mesh, .. } => Some(mesh),
            ImportResult::Step(_) => None,
        }
    }

    /// Document of a STEP import
    pub fn step(&self) -> Option<&StepDocument> {
        match self {
            ImportResult::Step(document) => Some(document),
            _ => None,
        }
    }

    /// Raw text of a STEP import
    pub fn content(&self) -> Option<&str> {
        self.step().map(|d| d.content.as_str())
    }
}

/// Data handed to an export
#[derive(Debug, Clone, Copy)]
pub enum ExportData<'a> {
    Mesh(&'a Mesh),
    Step(&'a StepDocument),
}

impl<'a> ExportData<'a> {
    pub fn mesh(&self) -> Option<&'a Mesh> {
        match *self {
            ExportData::Mesh(mesh) => Some(mesh),
            ExportData::Step(_) => None,
        }
    }

    pub fn step(&self) -> Option<&'a StepDocument> {
        match *self {
            ExportData::Step(document) => Some(document),
            ExportData::Mesh(_) => None,
        }
    }
}

impl<'a> From<&'a Mesh> for ExportData<'a> {
    fn from(mesh: &'a Mesh) -> Self {
        ExportData::Mesh(mesh)
    }
}

impl<'a> From<&'a StepDocument> for ExportData<'a> {
    fn from(document: &'a StepDocument) -> Self {
        ExportData::Step(document)
    }
}

impl<'a> From<&'a ImportResult> for ExportData<'a> {
    fn from(result: &'a ImportResult) -> Self {
        match result {
            ImportResult::Stl { mesh, .. } | ImportResult::Obj { mesh, .. } => {
                ExportData::Mesh(mesh)
            }
            ImportResult::Step(document) => ExportData::Step(document),
        }
    }
}

/// Configured import/export entry point.
///
/// Calls are independent and keep no state between them, so one instance can
/// be shared freely.
#[derive(Debug, Clone, Default)]
pub struct MeshIo {
    config: MeshIoConfig,
}

impl MeshIo {
    pub fn new(config: MeshIoConfig) -> Self {
        Self { config }
    }

    /// Detect the format of `path` and import it
    pub fn import_file(
        &self,
        path: impl AsRef<Path>,
        progress: Option<ProgressCallback>,
    ) -> MeshIoResult<ImportResult> {
        let path = path.as_ref();
        let format = detect_format(path)?;
        self.import_file_as(path, format, progress)
    }

    /// Import `path` as `format` without detection. A wrong format is an
    /// error; there is no fallback to another codec.
    pub fn import_file_as(
        &self,
        path: impl AsRef<Path>,
        format: FileFormat,
        progress: Option<ProgressCallback>,
    ) -> MeshIoResult<ImportResult> {
        let path = path.as_ref();
        let mut reporter = ProgressReporter::new(progress, self.config.import.progress_step);

        tracing::debug!("Importing '{}' as {}", path.display(), format);
        match format {
            FileFormat::Stl => stl::read_stl(path, &mut reporter),
            FileFormat::Obj => obj::read_obj(path, &mut reporter),
            FileFormat::Step => step::read_step(path, &mut reporter),
        }
    }

    /// Export to `path`; the format comes from `format` or the path's extension
    pub fn export_file<'a>(
        &self,
        path: impl AsRef<Path>,
        data: impl Into<ExportData<'a>>,
        format: Option<FileFormat>,
    ) -> MeshIoResult<()> {
        self.export_file_with_progress(path, data, format, None)
    }

    pub fn export_file_with_progress<'a>(
        &self,
        path: impl AsRef<Path>,
        data: impl Into<ExportData<'a>>,
        format: Option<FileFormat>,
        progress: Option<ProgressCallback>,
    ) -> MeshIoResult<()> {
        let path = path.as_ref();
        let format = match format {
            Some(format) => format,
            None => FileFormat::from_path(path).ok_or_else(|| {
                MeshIoError::file_format(
                    path,
                    format!(
                        "cannot determine output format from extension '{}' \
                         (expected .step, .stp, .stl or .obj)",
                        path.extension()
                            .and_then(|e| e.to_str())
                            .unwrap_or("(none)")
                    ),
                )
            })?,
        };

        let data = data.into();
        let options = &self.config.export;
        // Exports share the import throttle step
        let mut reporter = ProgressReporter::new(progress, self.config.import.progress_step);

        tracing::debug!("Exporting '{}' as {}", path.display(), format);
        match format {
            FileFormat::Stl => stl::write_stl(path, data, options, &mut reporter),
            FileFormat::Obj => obj::write_obj(path, data, options, &mut reporter),
            FileFormat::Step => step::write_step(path, data, &mut reporter),
        }
    }
}

/// Detect the format of `path` and import it with default options
pub fn import_file(
    path: impl AsRef<Path>,
    progress: Option<ProgressCallback>,
) -> MeshIoResult<ImportResult> {
    MeshIo::default().import_file(path, progress)
}

/// Import `path` as an explicit format with default options
pub fn import_file_as(
    path: impl AsRef<Path>,
    format: FileFormat,
    progress: Option<ProgressCallback>,
) -> MeshIoResult<ImportResult> {
    MeshIo::default().import_file_as(path, format, progress)
}

/// Export with default options; the format comes from `format` or the extension
pub fn export_file<'a>(
    path: impl AsRef<Path>,
    data: impl Into<ExportData<'a>>,
    format: Option<FileFormat>,
) -> MeshIoResult<()> {
    MeshIo::default().export_file(path, data, format)
}
