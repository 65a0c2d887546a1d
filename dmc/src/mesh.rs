//! Owned mesh snapshots and mesh output
use crate::{
    Error,
    types::{Feature, Position, Triangle},
};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};

/// An indexed triangle mesh with per-vertex features
///
/// Built by [`MarchingCubes::mesh`](crate::MarchingCubes::mesh).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex positions, in grid-index space
    pub vertices: Vec<Position>,
    /// Interpolated feature of each vertex
    pub features: Vec<Feature>,
    /// Triangles, as indices into `vertices`
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    /// Checks whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Writes a binary STL to the given output
    ///
    /// Normals are computed from the winding; degenerate triangles get a
    /// zero normal.
    pub fn write_stl<F: Write>(&self, out: &mut F) -> Result<(), Error> {
        let count = stl_triangle_count(self.triangles.len())?;
        let mut out = BufWriter::new(out);
        let mut header = [0u8; STL_HEADER_LEN];
        header[..STL_NAME.len()].copy_from_slice(STL_NAME);
        out.write_all(&header)?;
        out.write_all(&count.to_le_bytes())?;
        for t in &self.triangles {
            out.write_all(&self.stl_record(t))?;
        }
        out.flush()?;
        Ok(())
    }

    /// Packs a triangle as normal, corners, and a zero attribute word
    fn stl_record(&self, t: &Triangle) -> [u8; STL_RECORD_LEN] {
        let [a, b, c] = [t.x, t.y, t.z].map(|i| self.vertices[i]);
        let normal = (b - a)
            .cross(&(c - a))
            .try_normalize(0.0)
            .unwrap_or_else(Position::zeros);
        let mut record = [0u8; STL_RECORD_LEN];
        let floats = [normal, a, b, c].into_iter().flat_map(|p| [p.x, p.y, p.z]);
        for (chunk, f) in record.chunks_exact_mut(4).zip(floats) {
            chunk.copy_from_slice(&f.to_le_bytes());
        }
        record
    }
}

const STL_HEADER_LEN: usize = 80;
const STL_RECORD_LEN: usize = 50;
const STL_NAME: &[u8] = b"Binary STL from differentiable marching cubes";
static_assertions::const_assert!(STL_NAME.len() <= STL_HEADER_LEN);

/// Converts a triangle count into the 32-bit field used by binary STL
fn stl_triangle_count(n: usize) -> Result<u32, Error> {
    u32::try_from(n).map_err(|_| Error::TooManyTriangles(n))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stl_layout() {
        let mesh = Mesh {
            vertices: vec![
                Position::new(0.0, 0.0, 0.0),
                Position::new(2.0, 0.0, 0.0),
                Position::new(0.0, 2.0, 0.0),
            ],
            features: vec![Feature::zeros(); 3],
            triangles: vec![Triangle::new(0, 1, 2)],
        };
        let mut out = vec![];
        mesh.write_stl(&mut out).unwrap();
        assert_eq!(out.len(), 80 + 4 + 50);
        assert_eq!(&out[80..84], &1u32.to_le_bytes());

        // Unit normal along +Z
        let z = f32::from_le_bytes(out[92..96].try_into().unwrap());
        assert_eq!(z, 1.0);
        let bx = f32::from_le_bytes(out[108..112].try_into().unwrap());
        assert_eq!(bx, 2.0);
        assert_eq!(&out[132..134], &[0, 0]);
    }

    #[test]
    fn stl_count_overflow() {
        assert_eq!(stl_triangle_count(7).unwrap(), 7);
        assert_eq!(stl_triangle_count(u32::MAX as usize).unwrap(), u32::MAX);
        if let Some(n) = (u32::MAX as usize).checked_add(1) {
            assert!(matches!(
                stl_triangle_count(n),
                Err(Error::TooManyTriangles(m)) if m == n
            ));
        }
    }

    #[test]
    fn stl_degenerate_normal() {
        let mesh = Mesh {
            vertices: vec![Position::new(1.0, 1.0, 1.0); 3],
            features: vec![Feature::zeros(); 3],
            triangles: vec![Triangle::new(0, 1, 2)],
        };
        let mut out = vec![];
        mesh.write_stl(&mut out).unwrap();
        assert!(out[84..96].iter().all(|b| *b == 0));
    }
}
