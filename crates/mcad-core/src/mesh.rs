//! Mesh data exchanged between the codecs and their callers

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// One corner of a face: a vertex plus optional texcoord and normal references.
///
/// All indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceVertex {
    pub vertex: usize,
    pub texcoord: Option<usize>,
    pub normal: Option<usize>,
}

impl FaceVertex {
    /// Corner referencing only a vertex
    pub fn new(vertex: usize) -> Self {
        Self {
            vertex,
            texcoord: None,
            normal: None,
        }
    }

    pub fn with_normal(mut self, normal: usize) -> Self {
        self.normal = Some(normal);
        self
    }

    pub fn with_texcoord(mut self, texcoord: usize) -> Self {
        self.texcoord = Some(texcoord);
        self
    }
}

/// Polygonal face (triangles for STL, 3 or more corners for OBJ)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Face {
    pub corners: Vec<FaceVertex>,
}

impl Face {
    /// Triangle over three vertex indices
    pub fn triangle(a: usize, b: usize, c: usize) -> Self {
        Self::from_indices(&[a, b, c])
    }

    /// Face over plain vertex indices, no normal or texcoord references
    pub fn from_indices(indices: &[usize]) -> Self {
        Self {
            corners: indices.iter().copied().map(FaceVertex::new).collect(),
        }
    }

    /// Number of corners
    pub fn arity(&self) -> usize {
        self.corners.len()
    }

    /// Vertex indices in winding order
    pub fn vertex_indices(&self) -> Vec<usize> {
        self.corners.iter().map(|c| c.vertex).collect()
    }

    /// First normal reference found on any corner
    pub fn normal_ref(&self) -> Option<usize> {
        self.corners.iter().find_map(|c| c.normal)
    }
}

/// Indexed polygon mesh
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<Face>,
    pub normals: Option<Vec<[f64; 3]>>,
    pub texcoords: Option<Vec<[f64; 2]>>,
}

impl Mesh {
    /// Mesh from vertices and plain vertex-index faces
    pub fn from_indexed(vertices: Vec<[f64; 3]>, faces: &[Vec<usize>]) -> Self {
        Self {
            vertices,
            faces: faces.iter().map(|f| Face::from_indices(f)).collect(),
            normals: None,
            texcoords: None,
        }
    }

    /// Check that every face reference points into its list.
    ///
    /// Returns a description of the first broken reference.
    pub fn check_references(&self) -> Result<(), String> {
        let normal_count = self.normals.as_ref().map_or(0, Vec::len);
        let texcoord_count = self.texcoords.as_ref().map_or(0, Vec::len);

        for (face_idx, face) in self.faces.iter().enumerate() {
            for corner in &face.corners {
                if corner.vertex >= self.vertices.len() {
                    return Err(format!(
                        "face {} references vertex {} but the mesh has {} vertices",
                        face_idx,
                        corner.vertex,
                        self.vertices.len()
                    ));
                }
                if let Some(n) = corner.normal
                    && n >= normal_count
                {
                    return Err(format!(
                        "face {} references normal {} but the mesh has {} normals",
                        face_idx, n, normal_count
                    ));
                }
                if let Some(t) = corner.texcoord
                    && t >= texcoord_count
                {
                    return Err(format!(
                        "face {} references texcoord {} but the mesh has {} texcoords",
                        face_idx, t, texcoord_count
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Unit normal of a triangle by the right-hand rule.
///
/// Zero-area triangles yield the zero vector.
pub fn triangle_normal(v0: [f64; 3], v1: [f64; 3], v2: [f64; 3]) -> [f64; 3] {
    let (a, b, c) = (DVec3::from(v0), DVec3::from(v1), DVec3::from(v2));
    (b - a).cross(c - a).normalize_or_zero().to_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Mesh {
        Mesh::from_indexed(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[vec![0, 1, 2]],
        )
    }

    #[test]
    fn test_triangle_normal_ccw() {
        let n = triangle_normal([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert_eq!(n, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_triangle_normal_cw_flips() {
        let n = triangle_normal([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]);
        assert_eq!(n, [0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_degenerate_triangle_normal_is_zero() {
        let n = triangle_normal([1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]);
        assert_eq!(n, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_check_references_ok() {
        assert!(unit_triangle().check_references().is_ok());
    }

    #[test]
    fn test_check_references_out_of_range_vertex() {
        let mut mesh = unit_triangle();
        mesh.faces.push(Face::triangle(0, 1, 3));
        let err = mesh.check_references().unwrap_err();
        assert!(err.contains("vertex 3"));
    }

    #[test]
    fn test_check_references_missing_normals() {
        let mut mesh = unit_triangle();
        mesh.faces[0].corners[0] = FaceVertex::new(0).with_normal(0);
        assert!(mesh.check_references().is_err());

        mesh.normals = Some(vec![[0.0, 0.0, 1.0]]);
        assert!(mesh.check_references().is_ok());
    }
}
