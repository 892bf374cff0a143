//! Triangle mesh geometry.
//!
//! Meshes are stored in local space; instances place them in the world.
//! Every mesh carries per-vertex shading normals because the renderer
//! interpolates them and feeds them to the shadow-terminator correction.

use kinema_math::Vec3;

use crate::error::{SceneError, SceneResult};

/// One triangle of a mesh with its vertex positions and shading normals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshTriangle {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
}

/// A mesh consisting of vertex positions, vertex normals and triangle indices.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (one per vertex, unit length)
    pub normals: Vec<Vec3>,

    /// Triangle indices (every 3 indices form a counter-clockwise triangle)
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a new mesh from positions and indices.
    ///
    /// If normals are missing or do not match the vertex count, smooth
    /// normals are computed from the faces.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let mut mesh = Self {
            positions,
            normals: normals.unwrap_or_default(),
            indices,
        };
        if mesh.normals.len() != mesh.positions.len() {
            if !mesh.normals.is_empty() {
                log::debug!(
                    "Normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                    mesh.normals.len(),
                    mesh.positions.len()
                );
            }
            mesh.compute_normals();
        }
        mesh
    }

    /// A `width` x `height` rectangle in the local XY plane, centered at the
    /// origin and facing +Z.
    pub fn quad(width: f32, height: f32) -> Self {
        let hx = 0.5 * width;
        let hy = 0.5 * height;
        let positions = vec![
            Vec3::new(-hx, -hy, 0.0),
            Vec3::new(hx, -hy, 0.0),
            Vec3::new(hx, hy, 0.0),
            Vec3::new(-hx, hy, 0.0),
        ];
        Self::new(positions, vec![0, 1, 2, 0, 2, 3], Some(vec![Vec3::Z; 4]))
    }

    /// Compute smooth vertex normals by averaging face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for face in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [face[0] as usize, face[1] as usize, face[2] as usize];
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }

            let p0 = self.positions[i0];
            let edge1 = self.positions[i1] - p0;
            let edge2 = self.positions[i2] - p0;
            // Area-weighted, counter-clockwise winding
            let face_normal = edge1.cross(edge2);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Z);
        }

        self.normals = normals;
    }

    /// Check that every index references an existing vertex.
    pub fn validate(&self) -> SceneResult<()> {
        if self.indices.len() % 3 != 0 {
            return Err(SceneError::RaggedIndices(self.indices.len()));
        }
        let vertex_count = self.positions.len();
        for (i, &index) in self.indices.iter().enumerate() {
            if index as usize >= vertex_count {
                return Err(SceneError::IndexOutOfRange {
                    triangle: i / 3,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get triangle `index` with its positions and normals.
    pub fn triangle(&self, index: usize) -> Option<MeshTriangle> {
        let face = self.indices.get(index * 3..index * 3 + 3)?;
        let mut positions = [Vec3::ZERO; 3];
        let mut normals = [Vec3::ZERO; 3];
        for (slot, &vertex) in face.iter().enumerate() {
            positions[slot] = *self.positions.get(vertex as usize)?;
            normals[slot] = *self.normals.get(vertex as usize)?;
        }
        Some(MeshTriangle { positions, normals })
    }

    /// Iterate over all triangles.
    pub fn triangles(&self) -> impl Iterator<Item = MeshTriangle> + '_ {
        (0..self.triangle_count()).filter_map(move |i| self.triangle(i))
    }
}
