//! Mesh volume
//!
//! Reads the Wavefront OBJ written by the reconstruction tool and computes
//! the enclosed volume by summing signed tetrahedra over its triangles.
//! Two routines are offered; they agree on closed meshes and drift apart
//! on meshes with holes, which is why both are reported.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::VolumeCalculator;
use crate::error::{CollabResult, CollaboratorError};

type Vec3 = [f64; 3];

/// Triangle soup loaded from an OBJ file
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    vertices: Vec<Vec3>,
    triangles: Vec<[usize; 3]>,
}

impl TriangleMesh {
    pub fn load_obj(path: &Path) -> CollabResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::parse_obj(&source)
    }

    /// Parse `v` and `f` statements; everything else is ignored
    ///
    /// Faces may use `i`, `i/t`, `i//n` or `i/t/n` references, negative
    /// (relative) indices and more than three corners (fan-triangulated).
    pub fn parse_obj(source: &str) -> CollabResult<Self> {
        let mut mesh = TriangleMesh::default();

        for (line_num, line) in source.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let mut coords = [0.0; 3];
                    for coord in coords.iter_mut() {
                        *coord = tokens
                            .next()
                            .and_then(|t| t.parse::<f64>().ok())
                            .ok_or_else(|| {
                                CollaboratorError::Mesh(format!("line {}: bad vertex", line_num + 1))
                            })?;
                    }
                    mesh.vertices.push(coords);
                }
                Some("f") => {
                    let corners = tokens
                        .map(|t| resolve_index(t, mesh.vertices.len()))
                        .collect::<Option<Vec<usize>>>()
                        .ok_or_else(|| {
                            CollaboratorError::Mesh(format!("line {}: bad face index", line_num + 1))
                        })?;
                    if corners.len() < 3 {
                        return Err(CollaboratorError::Mesh(format!(
                            "line {}: face has fewer than 3 corners",
                            line_num + 1
                        )));
                    }
                    for i in 1..corners.len() - 1 {
                        mesh.triangles.push([corners[0], corners[i], corners[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if mesh.triangles.is_empty() {
            return Err(CollaboratorError::Mesh("mesh has no faces".to_string()));
        }
        Ok(mesh)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Mean of all vertex positions
    pub fn vertex_centroid(&self) -> Vec3 {
        if self.vertices.is_empty() {
            return [0.0; 3];
        }
        let mut sum = [0.0; 3];
        for v in &self.vertices {
            sum[0] += v[0];
            sum[1] += v[1];
            sum[2] += v[2];
        }
        let n = self.vertices.len() as f64;
        [sum[0] / n, sum[1] / n, sum[2] / n]
    }

    /// Sum of signed tetrahedron volumes spanned by each triangle and `apex`
    pub fn signed_volume_about(&self, apex: Vec3) -> f64 {
        let six_volume: f64 = self
            .triangles
            .iter()
            .map(|&[a, b, c]| {
                let a = sub(self.vertices[a], apex);
                let b = sub(self.vertices[b], apex);
                let c = sub(self.vertices[c], apex);
                dot(a, cross(b, c))
            })
            .sum();
        six_volume / 6.0
    }
}

/// 1-based (or negative, relative) OBJ vertex reference to a 0-based index
fn resolve_index(token: &str, vertex_count: usize) -> Option<usize> {
    let raw: i64 = token.split('/').next()?.parse().ok()?;
    let index = if raw > 0 {
        raw - 1
    } else if raw < 0 {
        vertex_count as i64 + raw
    } else {
        return None;
    };
    (index >= 0 && (index as usize) < vertex_count).then_some(index as usize)
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Available volume routines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeMethod {
    /// Tetrahedra against the coordinate origin (divergence theorem)
    Divergence,
    /// Tetrahedra against the vertex centroid
    Centroid,
}

impl VolumeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeMethod::Divergence => "divergence",
            VolumeMethod::Centroid => "centroid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "divergence" => Some(VolumeMethod::Divergence),
            "centroid" => Some(VolumeMethod::Centroid),
            _ => None,
        }
    }

    pub fn calculator(&self) -> Arc<dyn VolumeCalculator> {
        match self {
            VolumeMethod::Divergence => Arc::new(DivergenceVolume),
            VolumeMethod::Centroid => Arc::new(CentroidVolume),
        }
    }
}

/// Origin-referenced signed volume
#[derive(Debug, Clone, Copy, Default)]
pub struct DivergenceVolume;

impl VolumeCalculator for DivergenceVolume {
    fn method(&self) -> &'static str {
        VolumeMethod::Divergence.as_str()
    }

    fn volume_cubic_meters(&self, mesh: &Path) -> CollabResult<f64> {
        let mesh = TriangleMesh::load_obj(mesh)?;
        Ok(mesh.signed_volume_about([0.0; 3]).abs())
    }
}

/// Centroid-referenced signed volume
#[derive(Debug, Clone, Copy, Default)]
pub struct CentroidVolume;

impl VolumeCalculator for CentroidVolume {
    fn method(&self) -> &'static str {
        VolumeMethod::Centroid.as_str()
    }

    fn volume_cubic_meters(&self, mesh: &Path) -> CollabResult<f64> {
        let mesh = TriangleMesh::load_obj(mesh)?;
        let centroid = mesh.vertex_centroid();
        Ok(mesh.signed_volume_about(centroid).abs())
    }
}
