//! marimocad mesh interchange
//!
//! This crate moves geometry in and out of marimocad:
//! - Format identification and structural validation (STEP, STL, OBJ)
//! - STL codec: binary and ASCII import with vertex merging, binary export
//! - OBJ codec: polygonal faces with normal/texcoord references
//! - STEP passthrough: raw content with section metadata
//!
//! All operations are synchronous and keep no state between calls.

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod mesh;
pub mod obj;
pub mod progress;
pub mod step;
pub mod stl;

pub use config::{ExportOptions, ImportOptions, MeshIoConfig};
pub use error::{Location, MeshIoError, MeshIoResult, ParseError};
pub use format::{FileFormat, detect_format, sniff_format, validate_file};
pub use io::{ExportData, ImportResult, MeshIo, export_file, import_file, import_file_as};
pub use mesh::{Face, FaceVertex, Mesh, triangle_normal};
pub use obj::{ObjMetadata, export_obj, import_obj};
pub use progress::{ProgressCallback, ProgressReporter};
pub use step::{StepDocument, StepMetadata, export_step, import_step};
pub use stl::{StlMetadata, export_stl, import_stl};
