use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Errors from geometry validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("geometry has no triangles")]
    Empty,
    #[error("triangle {triangle} references vertex {index}, but only {vertex_count} exist")]
    IndexOutOfBounds {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("vertex {0} has a non-finite coordinate")]
    NonFinitePosition(usize),
    #[error("non-indexed geometry has {0} positions, not a multiple of 3")]
    RaggedTriangles(usize),
}

/// Triangle geometry in the surface's local space.
///
/// With `indices` set, each entry names three vertices. Without it, the
/// positions are read as consecutive triangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub indices: Option<Vec<[u32; 3]>>,
}

impl Geometry {
    pub fn new(positions: Vec<[f32; 3]>, indices: Option<Vec<[u32; 3]>>) -> Self {
        Self { positions, indices }
    }

    /// Axis-aligned box centered on the origin, outward-facing triangles.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let positions = vec![
            [-h.x, -h.y, -h.z],
            [h.x, -h.y, -h.z],
            [h.x, h.y, -h.z],
            [-h.x, h.y, -h.z],
            [-h.x, -h.y, h.z],
            [h.x, -h.y, h.z],
            [h.x, h.y, h.z],
            [-h.x, h.y, h.z],
        ];
        let indices = vec![
            // -z
            [0, 2, 1],
            [0, 3, 2],
            // +z
            [4, 5, 6],
            [4, 6, 7],
            // -x
            [0, 4, 7],
            [0, 7, 3],
            // +x
            [1, 2, 6],
            [1, 6, 5],
            // -y
            [0, 1, 5],
            [0, 5, 4],
            // +y
            [3, 7, 6],
            [3, 6, 2],
        ];
        Self::new(positions, Some(indices))
    }

    /// Flat quad in the XZ plane facing +Y.
    pub fn plane(width: f32, depth: f32) -> Self {
        let (w, d) = (width * 0.5, depth * 0.5);
        let positions = vec![[-w, 0.0, -d], [w, 0.0, -d], [w, 0.0, d], [-w, 0.0, d]];
        Self::new(positions, Some(vec![[0, 2, 1], [0, 3, 2]]))
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len(),
            None => self.positions.len() / 3,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangle_count() == 0
    }

    /// Triangle index triples, synthesized for non-indexed geometry.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        match &self.indices {
            Some(indices) => indices.clone(),
            None => (0..self.positions.len() as u32 / 3)
                .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
                .collect(),
        }
    }

    /// Min and max corners of the local-space bounding box.
    pub fn local_bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.positions.iter().map(|p| Vec3::from_array(*p));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }

    /// Check that the geometry can be handed to an acceleration structure.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if let Some(i) = self
            .positions
            .iter()
            .position(|p| p.iter().any(|c| !c.is_finite()))
        {
            return Err(GeometryError::NonFinitePosition(i));
        }
        match &self.indices {
            Some(indices) => {
                let vertex_count = self.positions.len();
                for (triangle, tri) in indices.iter().enumerate() {
                    if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                        return Err(GeometryError::IndexOutOfBounds {
                            triangle,
                            index,
                            vertex_count,
                        });
                    }
                }
            }
            None => {
                if self.positions.len() % 3 != 0 {
                    return Err(GeometryError::RaggedTriangles(self.positions.len()));
                }
            }
        }
        if self.is_empty() {
            return Err(GeometryError::Empty);
        }
        Ok(())
    }
}
