//! Wavefront OBJ codec
//!
//! Handles `v`, `vn`, `vt` and polygonal `f` directives. Indices are 1-based
//! (negative ones count back from the end of the list read so far) in the
//! file and 0-based in [`Mesh`]. Groups, smoothing and materials are skipped.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ExportOptions;
use crate::error::{EncodeError, MeshIoError, MeshIoResult, ParseError};
use crate::format::FileFormat;
use crate::io::{ExportData, ImportResult};
use crate::mesh::{Face, FaceVertex, Mesh};
use crate::progress::ProgressReporter;

const DECODE_PROGRESS_END: u8 = 90;

/// Element counts of a decoded OBJ file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjMetadata {
    pub num_vertices: usize,
    pub num_normals: usize,
    pub num_texcoords: usize,
    pub num_faces: usize,
}

/// Decode OBJ text held in memory
pub fn decode(
    bytes: &[u8],
    progress: &mut ProgressReporter,
) -> Result<(Mesh, ObjMetadata), ParseError> {
    let text = String::from_utf8_lossy(bytes);
    let total_lines = text.lines().count();

    let mut vertices: Vec<[f64; 3]> = Vec::new();
    let mut normals: Vec<[f64; 3]> = Vec::new();
    let mut texcoords: Vec<[f64; 2]> = Vec::new();
    let mut faces: Vec<Face> = Vec::new();
    let mut face_lines: Vec<usize> = Vec::new();
    let mut material_refs = 0usize;

    progress.report(0);

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('#').next().unwrap_or_default();
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => vertices.push(parse_floats(tokens, 3, line_no, "vertex")?),
            Some("vn") => normals.push(parse_floats(tokens, 3, line_no, "normal")?),
            Some("vt") => texcoords.push(parse_floats(tokens, 1, line_no, "texcoord")?),
            Some("f") => {
                let counts = (vertices.len(), texcoords.len(), normals.len());
                let corners = tokens
                    .map(|element| parse_face_element(element, counts, line_no))
                    .collect::<Result<Vec<_>, _>>()?;
                if corners.len() < 3 {
                    return Err(ParseError::at_line(
                        line_no,
                        format!("face needs at least 3 vertices, found {}", corners.len()),
                    ));
                }
                faces.push(Face { corners });
                face_lines.push(line_no);
            }
            Some("mtllib") | Some("usemtl") => material_refs += 1,
            _ => {}
        }

        progress.report_fraction(line_no, total_lines, 0, DECODE_PROGRESS_END);
    }

    if material_refs > 0 {
        tracing::warn!(
            "Dropped {} OBJ material reference(s); materials are not supported",
            material_refs
        );
    }

    let metadata = ObjMetadata {
        num_vertices: vertices.len(),
        num_normals: normals.len(),
        num_texcoords: texcoords.len(),
        num_faces: faces.len(),
    };

    let mesh = Mesh {
        vertices,
        faces,
        normals: (!normals.is_empty()).then_some(normals),
        texcoords: (!texcoords.is_empty()).then_some(texcoords),
    };

    // Positive indices may point past what was declared by the end of the file
    if let Err(reason) = mesh.check_references() {
        let line = first_broken_face(&mesh).map_or(0, |i| face_lines[i]);
        return Err(ParseError::at_line(line, reason));
    }

    progress.finish();
    Ok((mesh, metadata))
}

fn first_broken_face(mesh: &Mesh) -> Option<usize> {
    let normal_count = mesh.normals.as_ref().map_or(0, Vec::len);
    let texcoord_count = mesh.texcoords.as_ref().map_or(0, Vec::len);
    mesh.faces.iter().position(|face| {
        face.corners.iter().any(|c| {
            c.vertex >= mesh.vertices.len()
                || c.normal.is_some_and(|n| n >= normal_count)
                || c.texcoord.is_some_and(|t| t >= texcoord_count)
        })
    })
}

/// Parse between `min` and `N` numbers; missing trailing components are 0.
/// Extra components (such as the optional `w`) are ignored.
fn parse_floats<'a, const N: usize>(
    tokens: impl Iterator<Item = &'a str>,
    min: usize,
    line: usize,
    what: &str,
) -> Result<[f64; N], ParseError> {
    let mut out = [0.0; N];
    let mut found = 0;
    for (slot, token) in out.iter_mut().zip(tokens) {
        *slot = token.parse::<f64>().map_err(|_| {
            ParseError::at_line(line, format!("invalid number '{}' in {}", token, what))
        })?;
        found += 1;
    }
    if found < min {
        return Err(ParseError::at_line(
            line,
            format!("{} needs at least {} components, found {}", what, min, found),
        ));
    }
    Ok(out)
}

/// Parse `v`, `v/t`, `v//n` or `v/t/n` into 0-based references.
///
/// `counts` are the (vertex, texcoord, normal) list lengths at this line,
/// used to resolve negative indices.
fn parse_face_element(
    element: &str,
    counts: (usize, usize, usize),
    line: usize,
) -> Result<FaceVertex, ParseError> {
    let parts: Vec<&str> = element.split('/').collect();
    if parts.len() > 3 {
        return Err(ParseError::at_line(
            line,
            format!("face element '{}' has more than 3 parts", element),
        ));
    }

    let optional = |i: usize, len: usize, what: &str| -> Result<Option<usize>, ParseError> {
        match parts.get(i) {
            Some(token) if !token.is_empty() => resolve_index(token, len, line, what).map(Some),
            _ => Ok(None),
        }
    };

    Ok(FaceVertex {
        vertex: resolve_index(parts[0], counts.0, line, "vertex")?,
        texcoord: optional(1, counts.1, "texcoord")?,
        normal: optional(2, counts.2, "normal")?,
    })
}

/// Convert a 1-based or negative OBJ index into a 0-based one
fn resolve_index(token: &str, len: usize, line: usize, what: &str) -> Result<usize, ParseError> {
    let raw: i64 = token.parse().map_err(|_| {
        ParseError::at_line(line, format!("invalid {} index '{}'", what, token))
    })?;

    match raw {
        0 => Err(ParseError::at_line(
            line,
            format!("{} index 0 is invalid (OBJ indices start at 1)", what),
        )),
        r if r > 0 => Ok((r - 1) as usize),
        r => {
            let back = r.unsigned_abs() as usize;
            len.checked_sub(back).ok_or_else(|| {
                ParseError::at_line(
                    line,
                    format!(
                        "relative {} index {} reaches before the first of {} declared",
                        what, r, len
                    ),
                )
            })
        }
    }
}

/// Encode a mesh as OBJ text.
///
/// Each face element is written in the shortest form that keeps its
/// references: `i`, `i/t`, `i//n` or `i/t/n`.
pub fn encode(
    mesh: &Mesh,
    options: &ExportOptions,
    progress: &mut ProgressReporter,
) -> Result<String, EncodeError> {
    if let Some((i, face)) = mesh.faces.iter().enumerate().find(|(_, f)| f.arity() < 3) {
        return Err(EncodeError(format!(
            "face {} has {} vertices, OBJ faces need at least 3",
            i,
            face.arity()
        )));
    }
    mesh.check_references().map_err(EncodeError)?;

    let mut obj = String::new();

    if options.obj_header {
        obj.push_str("# OBJ file generated by marimocad\n");
        obj.push_str(&format!("# Vertices: {}\n", mesh.vertices.len()));
        obj.push_str(&format!("# Faces: {}\n\n", mesh.faces.len()));
    }

    for v in &mesh.vertices {
        obj.push_str(&format!("v {} {} {}\n", v[0], v[1], v[2]));
    }
    if let Some(normals) = mesh.normals.as_ref().filter(|n| !n.is_empty()) {
        obj.push('\n');
        for n in normals {
            obj.push_str(&format!("vn {} {} {}\n", n[0], n[1], n[2]));
        }
    }
    if let Some(texcoords) = mesh.texcoords.as_ref().filter(|t| !t.is_empty()) {
        obj.push('\n');
        for t in texcoords {
            obj.push_str(&format!("vt {} {}\n", t[0], t[1]));
        }
    }
    progress.report(40);

    if !mesh.faces.is_empty() {
        obj.push('\n');
    }
    for (i, face) in mesh.faces.iter().enumerate() {
        obj.push('f');
        for corner in &face.corners {
            obj.push(' ');
            obj.push_str(&format_face_element(corner));
        }
        obj.push('\n');
        progress.report_fraction(i + 1, mesh.faces.len(), 40, DECODE_PROGRESS_END);
    }

    Ok(obj)
}

fn format_face_element(corner: &FaceVertex) -> String {
    let v = corner.vertex + 1;
    match (corner.texcoord, corner.normal) {
        (None, None) => v.to_string(),
        (Some(t), None) => format!("{}/{}", v, t + 1),
        (None, Some(n)) => format!("{}//{}", v, n + 1),
        (Some(t), Some(n)) => format!("{}/{}/{}", v, t + 1, n + 1),
    }
}

/// Import an OBJ file
pub fn import_obj(path: impl AsRef<Path>) -> MeshIoResult<ImportResult> {
    read_obj(path.as_ref(), &mut ProgressReporter::silent())
}

/// Export mesh data as OBJ
pub fn export_obj<'a>(path: impl AsRef<Path>, data: impl Into<ExportData<'a>>) -> MeshIoResult<()> {
    write_obj(
        path.as_ref(),
        data.into(),
        &ExportOptions::default(),
        &mut ProgressReporter::silent(),
    )
}

pub(crate) fn read_obj(path: &Path, progress: &mut ProgressReporter) -> MeshIoResult<ImportResult> {
    let bytes =
        std::fs::read(path).map_err(|e| MeshIoError::import_io(path, FileFormat::Obj, e))?;
    let (mesh, metadata) = decode(&bytes, progress)
        .map_err(|e| MeshIoError::from_parse(path, FileFormat::Obj, e))?;

    tracing::debug!(
        "Loaded OBJ '{}': {} vertices, {} faces",
        path.display(),
        metadata.num_vertices,
        metadata.num_faces
    );

    Ok(ImportResult::Obj { mesh, metadata })
}

pub(crate) fn write_obj(
    path: &Path,
    data: ExportData,
    options: &ExportOptions,
    progress: &mut ProgressReporter,
) -> MeshIoResult<()> {
    let mesh = data.mesh().ok_or_else(|| {
        MeshIoError::export(
            path,
            FileFormat::Obj,
            "OBJ export requires mesh data (vertices and faces), got a STEP document",
        )
    })?;

    let text = encode(mesh, options, progress)
        .map_err(|e| MeshIoError::export(path, FileFormat::Obj, e.0))?;
    std::fs::write(path, text).map_err(|e| MeshIoError::export_io(path, FileFormat::Obj, e))?;
    progress.finish();

    tracing::debug!(
        "Wrote OBJ '{}': {} vertices, {} faces",
        path.display(),
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;
    use tempfile::tempdir;

    fn decode_str(text: &str) -> Result<(Mesh, ObjMetadata), ParseError> {
        decode(text.as_bytes(), &mut ProgressReporter::silent())
    }

    fn encode_default(mesh: &Mesh) -> String {
        encode(mesh, &ExportOptions::default(), &mut ProgressReporter::silent()).unwrap()
    }

    fn unit_triangle() -> Mesh {
        Mesh::from_indexed(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[vec![0, 1, 2]],
        )
    }

    const CUBE: &str = "\
# cube
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 0 0 1
v 1 0 1
v 1 1 1
v 0 1 1
f 1 3 2
f 1 4 3
f 5 6 7
f 5 7 8
f 1 2 6
f 1 6 5
f 2 3 7
f 2 7 6
f 3 4 8
f 3 8 7
f 4 1 5
f 4 5 8
";

    #[test]
    fn test_decode_cube() {
        let (mesh, metadata) = decode_str(CUBE).unwrap();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.faces.len(), 12);
        assert_eq!(mesh.faces[0].vertex_indices(), vec![0, 2, 1]);
        assert!(mesh.normals.is_none());
        assert!(mesh.texcoords.is_none());
        assert_eq!(
            metadata,
            ObjMetadata {
                num_vertices: 8,
                num_normals: 0,
                num_texcoords: 0,
                num_faces: 12
            }
        );
    }

    #[test]
    fn test_negative_indices() {
        let (mesh, _) = decode_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.faces[0], Face::triangle(0, 1, 2));
    }

    #[test]
    fn test_negative_indices_are_relative_to_current_line() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\nv 1 1 0\nf -3 -2 -1\n";
        let (mesh, _) = decode_str(text).unwrap();
        assert_eq!(mesh.faces[1].vertex_indices(), vec![1, 2, 3]);
    }

    #[test]
    fn test_compound_face_elements() {
        let text = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0.5
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
f 1//1 2//1 3//1
f 1/1 2/2 3/3
";
        let (mesh, metadata) = decode_str(text).unwrap();
        assert_eq!(mesh.faces[0].arity(), 4);
        assert_eq!(
            mesh.faces[0].corners[3],
            FaceVertex::new(3).with_texcoord(3).with_normal(0)
        );
        assert_eq!(mesh.faces[1].corners[1], FaceVertex::new(1).with_normal(0));
        assert_eq!(mesh.faces[2].corners[2], FaceVertex::new(2).with_texcoord(2));
        assert_eq!(mesh.texcoords.as_ref().unwrap()[3], [0.5, 0.0]);
        assert_eq!(metadata.num_texcoords, 4);
        assert_eq!(metadata.num_normals, 1);
    }

    #[test]
    fn test_ignores_unsupported_directives() {
        let text = "mtllib cube.mtl\no Cube\ng side\ns off\nusemtl red\nv 0 0 0\nv 1 0 0\nv 0 1 0 # trailing comment\nf 1 2 3\n";
        let (mesh, _) = decode_str(text).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[2], [0.0, 1.0, 0.0]);
        assert_eq!(mesh.faces.len(), 1);
    }

    #[test]
    fn test_malformed_number_reports_line() {
        let err = decode_str("v 0 0 0\nv 1 x 0\n").unwrap_err();
        assert_eq!(err.location, Location::Line(2));
        assert!(err.reason.contains("'x'"));
    }

    #[test]
    fn test_short_vertex_is_error() {
        let err = decode_str("v 0 0\n").unwrap_err();
        assert_eq!(err.location, Location::Line(1));
    }

    #[test]
    fn test_zero_index_is_error() {
        let err = decode_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n").unwrap_err();
        assert_eq!(err.location, Location::Line(4));
    }

    #[test]
    fn test_out_of_range_index_reports_face_line() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n\nf 1 2 7\n";
        let err = decode_str(text).unwrap_err();
        assert_eq!(err.location, Location::Line(6));
        assert!(err.reason.contains("vertex 6"));
    }

    #[test]
    fn test_negative_index_before_start_is_error() {
        let err = decode_str("v 0 0 0\nf -1 -2 -1\n").unwrap_err();
        assert_eq!(err.location, Location::Line(2));
    }

    #[test]
    fn test_two_element_face_is_error() {
        assert!(decode_str("v 0 0 0\nv 1 0 0\nf 1 2\n").is_err());
    }

    #[test]
    fn test_encode_plain_face() {
        let text = encode_default(&unit_triangle());
        assert!(text.starts_with("# OBJ file generated by marimocad\n"));
        assert!(text.contains("v 1 0 0\n"));
        assert!(text.lines().any(|l| l == "f 1 2 3"));
    }

    #[test]
    fn test_encode_without_header() {
        let options = ExportOptions {
            obj_header: false,
            ..ExportOptions::default()
        };
        let text = encode(&unit_triangle(), &options, &mut ProgressReporter::silent()).unwrap();
        assert!(text.starts_with("v 0 0 0\n"));
    }

    #[test]
    fn test_encode_compound_forms() {
        let mut mesh = unit_triangle();
        mesh.normals = Some(vec![[0.0, 0.0, 1.0]]);
        mesh.texcoords = Some(vec![[0.0, 0.0], [1.0, 0.0]]);
        mesh.faces[0].corners = vec![
            FaceVertex::new(0).with_texcoord(0).with_normal(0),
            FaceVertex::new(1).with_normal(0),
            FaceVertex::new(2).with_texcoord(1),
        ];
        let text = encode_default(&mesh);
        assert!(text.lines().any(|l| l == "f 1/1/1 2//1 3/2"));
        assert!(text.contains("vn 0 0 1\n"));
        assert!(text.contains("vt 1 0\n"));
    }

    #[test]
    fn test_encode_rejects_bad_references() {
        let mut mesh = unit_triangle();
        mesh.faces[0].corners[0].normal = Some(0);
        let result = encode(&mesh, &ExportOptions::default(), &mut ProgressReporter::silent());
        assert!(result.is_err());

        let mut mesh = unit_triangle();
        mesh.faces.push(Face::from_indices(&[0, 1]));
        let result = encode(&mesh, &ExportOptions::default(), &mut ProgressReporter::silent());
        assert!(result.unwrap_err().0.contains("at least 3"));
    }

    #[test]
    fn test_round_trip_polygons() {
        let mut mesh = Mesh::from_indexed(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.5, 0.5, 1.25],
            ],
            &[vec![0, 1, 2, 3], vec![0, 1, 4]],
        );
        mesh.normals = Some(vec![[0.0, 0.0, -1.0]]);
        mesh.faces[0].corners.iter_mut().for_each(|c| c.normal = Some(0));

        let text = encode_default(&mesh);
        let (decoded, _) = decode_str(&text).unwrap();
        assert_eq!(decoded, mesh);
    }

    #[test]
    fn test_file_round_trip_and_tobj_interop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        export_obj(&path, &unit_triangle()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().any(|l| l == "f 1 2 3"));

        let result = import_obj(&path).unwrap();
        assert_eq!(result.format(), FileFormat::Obj);
        assert_eq!(result.mesh().unwrap().faces[0], Face::triangle(0, 1, 2));

        let (models, _) = tobj::load_obj(&path, &tobj::LoadOptions::default()).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].mesh.positions.len(), 9);
        assert_eq!(models[0].mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_progress_reaches_100() {
        let mut seen = Vec::new();
        {
            let mut record = |p: u8| seen.push(p);
            let mut reporter = ProgressReporter::new(Some(&mut record), 10);
            decode(CUBE.as_bytes(), &mut reporter).unwrap();
        }
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
