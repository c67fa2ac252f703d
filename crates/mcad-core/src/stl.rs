//! STL codec
//!
//! Decodes both encodings into an indexed [`Mesh`], merging vertices that
//! compare exactly equal. Encodes binary STL only:
//!
//! ```text
//! UINT8[80]    header
//! UINT32       triangle count (LE)
//! foreach triangle
//!     REAL32[3]  normal
//!     REAL32[3]  vertex 1
//!     REAL32[3]  vertex 2
//!     REAL32[3]  vertex 3
//!     UINT16     attribute byte count
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ExportOptions, ImportOptions};
use crate::error::{EncodeError, Location, MeshIoError, MeshIoResult, ParseError};
use crate::format::FileFormat;
use crate::io::{ExportData, ImportResult};
use crate::mesh::{Face, FaceVertex, Mesh, triangle_normal};
use crate::progress::{ProgressCallback, ProgressReporter};

/// Binary header size in bytes
pub const HEADER_SIZE: usize = 80;

/// Size of one binary triangle record
pub const TRIANGLE_SIZE: usize = 50;

/// Share of the progress range spent decoding; the rest is the final report
const DECODE_PROGRESS_END: u8 = 90;

/// Details about a decoded STL file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StlMetadata {
    pub binary: bool,
    pub num_triangles: usize,
    pub num_vertices: usize,
}

/// True when `bytes.len() == 84 + 50 * N` for the count `N` stored at offset 80
pub fn is_binary_size_valid(bytes: &[u8]) -> bool {
    match triangle_count(bytes) {
        Some(count) => bytes.len() as u64 == expected_binary_size(count),
        None => false,
    }
}

/// True when the first non-whitespace token is `solid`
pub fn starts_with_solid(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"solid")
}

fn triangle_count(bytes: &[u8]) -> Option<u32> {
    let raw = bytes.get(HEADER_SIZE..HEADER_SIZE + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn expected_binary_size(count: u32) -> u64 {
    (HEADER_SIZE + 4) as u64 + TRIANGLE_SIZE as u64 * count as u64
}

/// Decode an STL file held in memory.
///
/// The binary size law is checked first so binary files whose header happens
/// to start with `solid` are not mistaken for ASCII.
pub fn decode(
    bytes: &[u8],
    progress: &mut ProgressReporter,
) -> Result<(Mesh, StlMetadata), ParseError> {
    let (mesh, binary) = if is_binary_size_valid(bytes) || !starts_with_solid(bytes) {
        (decode_binary(bytes, progress)?, true)
    } else {
        (decode_ascii(bytes, progress)?, false)
    };

    progress.finish();

    let metadata = StlMetadata {
        binary,
        num_triangles: mesh.faces.len(),
        num_vertices: mesh.vertices.len(),
    };
    Ok((mesh, metadata))
}

/// Collects vertices, handing out the index of the first exactly-equal one
#[derive(Default)]
struct VertexPool {
    vertices: Vec<[f64; 3]>,
    lookup: HashMap<[u64; 3], usize>,
}

impl VertexPool {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity),
            lookup: HashMap::with_capacity(capacity),
        }
    }

    fn insert(&mut self, v: [f64; 3]) -> usize {
        // -0.0 == 0.0 but their bit patterns differ
        let key = v.map(|c| if c == 0.0 { 0.0f64.to_bits() } else { c.to_bits() });
        *self.lookup.entry(key).or_insert_with(|| {
            self.vertices.push(v);
            self.vertices.len() - 1
        })
    }
}

/// Accumulates faces while decoding
struct MeshBuilder {
    pool: VertexPool,
    faces: Vec<Face>,
    normals: Vec<[f64; 3]>,
}

impl MeshBuilder {
    fn with_capacity(triangles: usize) -> Self {
        Self {
            pool: VertexPool::with_capacity(triangles * 3 / 2),
            faces: Vec::with_capacity(triangles),
            normals: Vec::with_capacity(triangles),
        }
    }

    fn push_triangle(&mut self, normal: [f64; 3], corners: [[f64; 3]; 3]) {
        let normal_idx = self.normals.len();
        self.normals.push(normal);
        let corners = corners
            .into_iter()
            .map(|v| FaceVertex::new(self.pool.insert(v)).with_normal(normal_idx))
            .collect();
        self.faces.push(Face { corners });
    }

    fn build(self) -> Mesh {
        Mesh {
            vertices: self.pool.vertices,
            faces: self.faces,
            normals: Some(self.normals),
            texcoords: None,
        }
    }
}

fn decode_binary(bytes: &[u8], progress: &mut ProgressReporter) -> Result<Mesh, ParseError> {
    let count = triangle_count(bytes).ok_or_else(|| {
        ParseError::at_offset(
            bytes.len() as u64,
            format!(
                "file is {} bytes, too small for the {}-byte binary STL header",
                bytes.len(),
                HEADER_SIZE + 4
            ),
        )
    })?;

    let expected = expected_binary_size(count);
    let actual = bytes.len() as u64;
    if actual < expected {
        let complete = (bytes.len() - (HEADER_SIZE + 4)) / TRIANGLE_SIZE;
        return Err(ParseError::new(
            record_offset(complete),
            format!(
                "truncated triangle record {} of {} (expected {} bytes, found {})",
                complete + 1,
                count,
                expected,
                actual
            ),
        ));
    }
    if actual > expected {
        tracing::warn!(
            "Ignoring {} trailing bytes after {} STL triangles",
            actual - expected,
            count
        );
    }

    let count = count as usize;
    let mut builder = MeshBuilder::with_capacity(count);
    progress.report(0);

    let records = &bytes[HEADER_SIZE + 4..HEADER_SIZE + 4 + count * TRIANGLE_SIZE];
    for (i, record) in records.chunks_exact(TRIANGLE_SIZE).enumerate() {
        let normal = read_vec3(&record[0..12]);
        let corners = [
            read_vec3(&record[12..24]),
            read_vec3(&record[24..36]),
            read_vec3(&record[36..48]),
        ];
        builder.push_triangle(normal, corners);
        progress.report_fraction(i + 1, count, 0, DECODE_PROGRESS_END);
    }

    Ok(builder.build())
}

fn read_vec3(buf: &[u8]) -> [f64; 3] {
    let component = |i: usize| {
        f64::from(f32::from_le_bytes([
            buf[i * 4],
            buf[i * 4 + 1],
            buf[i * 4 + 2],
            buf[i * 4 + 3],
        ]))
    };
    [component(0), component(1), component(2)]
}

/// Facet being read by the ASCII decoder
struct OpenFacet {
    line: usize,
    normal: [f64; 3],
    vertices: Vec<[f64; 3]>,
}

fn decode_ascii(bytes: &[u8], progress: &mut ProgressReporter) -> Result<Mesh, ParseError> {
    let text = String::from_utf8_lossy(bytes);
    let total_lines = text.lines().count();
    let mut builder = MeshBuilder::with_capacity(total_lines / 7);
    let mut open: Option<OpenFacet> = None;

    progress.report(0);

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens.first().copied() {
            Some("facet") => {
                if let Some(facet) = &open {
                    return Err(ParseError::at_line(
                        line_no,
                        format!("new facet before facet at line {} was closed", facet.line),
                    ));
                }
                let normal = if tokens.get(1) == Some(&"normal") {
                    parse_vec3(&tokens[2..], line_no, "facet normal")?
                } else {
                    [0.0; 3]
                };
                open = Some(OpenFacet {
                    line: line_no,
                    normal,
                    vertices: Vec::with_capacity(3),
                });
            }
            Some("vertex") => {
                let Some(facet) = open.as_mut() else {
                    tracing::warn!("Ignoring STL vertex outside a facet at line {}", line_no);
                    continue;
                };
                if facet.vertices.len() == 3 {
                    return Err(ParseError::at_line(
                        line_no,
                        format!("facet at line {} has more than 3 vertices", facet.line),
                    ));
                }
                facet
                    .vertices
                    .push(parse_vec3(&tokens[1..], line_no, "vertex")?);
            }
            Some("endfacet") => {
                let Some(facet) = open.take() else {
                    tracing::warn!("Ignoring unmatched endfacet at line {}", line_no);
                    continue;
                };
                let [v0, v1, v2] = <[[f64; 3]; 3]>::try_from(facet.vertices).map_err(|v| {
                    ParseError::at_line(
                        line_no,
                        format!(
                            "facet at line {} has {} vertices, expected 3",
                            facet.line,
                            v.len()
                        ),
                    )
                })?;
                builder.push_triangle(facet.normal, [v0, v1, v2]);
            }
            // solid, outer loop, endloop, endsolid and anything unexpected
            _ => {}
        }

        progress.report_fraction(line_no, total_lines, 0, DECODE_PROGRESS_END);
    }

    if let Some(facet) = open {
        return Err(ParseError::at_line(
            facet.line,
            "facet is never closed with endfacet",
        ));
    }

    Ok(builder.build())
}

fn parse_vec3(tokens: &[&str], line: usize, what: &str) -> Result<[f64; 3], ParseError> {
    if tokens.len() < 3 {
        return Err(ParseError::at_line(
            line,
            format!("{} needs 3 components, found {}", what, tokens.len()),
        ));
    }
    let mut out = [0.0; 3];
    for (slot, token) in out.iter_mut().zip(tokens) {
        *slot = token.parse::<f64>().map_err(|_| {
            ParseError::at_line(line, format!("invalid number '{}' in {}", token, what))
        })?;
    }
    Ok(out)
}

/// Encode a triangle mesh as binary STL.
///
/// Faces referencing a normal use it. A mesh whose corners reference no
/// normals may instead carry exactly one normal per face. Remaining faces get
/// the right-hand-rule normal of their winding.
pub fn encode(mesh: &Mesh, header: &str) -> Result<Vec<u8>, EncodeError> {
    if let Some((i, face)) = mesh.faces.iter().enumerate().find(|(_, f)| f.arity() != 3) {
        return Err(EncodeError(format!(
            "face {} has {} vertices, but STL can only store triangles",
            i,
            face.arity()
        )));
    }
    mesh.check_references().map_err(EncodeError)?;
    u32::try_from(mesh.faces.len()).map_err(|_| {
        EncodeError(format!(
            "{} triangles exceed the binary STL limit",
            mesh.faces.len()
        ))
    })?;
    let per_face = per_face_normals(mesh)?;

    let mut triangles = Vec::with_capacity(mesh.faces.len());
    for (i, face) in mesh.faces.iter().enumerate() {
        let [v0, v1, v2] = [0, 1, 2].map(|c| mesh.vertices[face.corners[c].vertex]);
        let supplied = match per_face {
            Some(normals) => normals.get(i),
            None => face
                .normal_ref()
                .and_then(|n| mesh.normals.as_ref().and_then(|normals| normals.get(n))),
        };
        let normal = supplied
            .copied()
            .unwrap_or_else(|| triangle_normal(v0, v1, v2));

        triangles.push(stl_io::Triangle {
            normal: stl_io::Normal::new(to_f32(normal)),
            vertices: [
                stl_io::Vertex::new(to_f32(v0)),
                stl_io::Vertex::new(to_f32(v1)),
                stl_io::Vertex::new(to_f32(v2)),
            ],
        });
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + 4 + TRIANGLE_SIZE * triangles.len());
    stl_io::write_stl(&mut out, triangles.iter())
        .map_err(|e| EncodeError(format!("failed to write STL records: {}", e)))?;

    // stl_io leaves the header zeroed
    let signature = header.as_bytes();
    let len = signature.len().min(HEADER_SIZE);
    out[..len].copy_from_slice(&signature[..len]);

    Ok(out)
}

/// Normals indexed by face, for meshes whose corners reference none.
///
/// Such normals are only meaningful when there is one per face; any other
/// count would be dropped, so it is rejected.
fn per_face_normals(mesh: &Mesh) -> Result<Option<&[[f64; 3]]>, EncodeError> {
    let Some(normals) = mesh.normals.as_deref().filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let referenced = mesh
        .faces
        .iter()
        .any(|f| f.corners.iter().any(|c| c.normal.is_some()));
    if referenced {
        return Ok(None);
    }
    if normals.len() != mesh.faces.len() {
        return Err(EncodeError(format!(
            "{} normals are not referenced by any face and do not match the {} faces",
            normals.len(),
            mesh.faces.len()
        )));
    }
    Ok(Some(normals))
}

fn to_f32(v: [f64; 3]) -> [f32; 3] {
    v.map(|c| c as f32)
}

/// Import an STL file (binary or ASCII)
pub fn import_stl(
    path: impl AsRef<Path>,
    progress: Option<ProgressCallback>,
) -> MeshIoResult<ImportResult> {
    let mut reporter = ProgressReporter::new(progress, ImportOptions::default().progress_step);
    read_stl(path.as_ref(), &mut reporter)
}

/// Export mesh data as binary STL
pub fn export_stl<'a>(path: impl AsRef<Path>, data: impl Into<ExportData<'a>>) -> MeshIoResult<()> {
    write_stl(
        path.as_ref(),
        data.into(),
        &ExportOptions::default(),
        &mut ProgressReporter::silent(),
    )
}

pub(crate) fn read_stl(path: &Path, progress: &mut ProgressReporter) -> MeshIoResult<ImportResult> {
    let bytes =
        std::fs::read(path).map_err(|e| MeshIoError::import_io(path, FileFormat::Stl, e))?;
    let (mesh, metadata) = decode(&bytes, progress)
        .map_err(|e| MeshIoError::from_parse(path, FileFormat::Stl, e))?;

    tracing::debug!(
        "Loaded {} STL '{}': {} triangles, {} vertices",
        if metadata.binary { "binary" } else { "ASCII" },
        path.display(),
        metadata.num_triangles,
        metadata.num_vertices
    );

    Ok(ImportResult::Stl { mesh, metadata })
}

pub(crate) fn write_stl(
    path: &Path,
    data: ExportData,
    options: &ExportOptions,
    progress: &mut ProgressReporter,
) -> MeshIoResult<()> {
    let mesh = data.mesh().ok_or_else(|| {
        MeshIoError::export(
            path,
            FileFormat::Stl,
            "STL export requires mesh data (vertices and faces), got a STEP document",
        )
    })?;

    // Encode fully before touching the destination
    let bytes = encode(mesh, &options.stl_header)
        .map_err(|e| MeshIoError::export(path, FileFormat::Stl, e.0))?;
    progress.report(50);

    std::fs::write(path, &bytes).map_err(|e| MeshIoError::export_io(path, FileFormat::Stl, e))?;
    progress.finish();

    tracing::debug!(
        "Wrote binary STL '{}': {} triangles",
        path.display(),
        mesh.faces.len()
    );
    Ok(())
}

/// Location of the `index`-th binary record, for diagnostics
pub fn record_offset(index: usize) -> Location {
    Location::ByteOffset((HEADER_SIZE + 4 + index * TRIANGLE_SIZE) as u64)
}
