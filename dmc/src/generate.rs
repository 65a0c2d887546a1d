//! Mesh generation for used cells
use crate::{
    config::{ThreadPool, for_each_item},
    grid::Dims,
    scan::{UsedCells, split_at_offsets},
    tables::case,
    types::{CellMask, Edge, Feature, Position, Triangle},
};

/// Number of used cells handled by a single worker
const GENERATE_CHUNK: usize = 256;

/// Provenance of an output vertex: its owning used cell and edge
///
/// Packed as `used_cell << 4 | edge`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VertexTag(usize);

impl VertexTag {
    /// Builds a new tag
    pub fn new(used_cell: usize, edge: Edge) -> Self {
        debug_assert!(used_cell < (1 << (usize::BITS - 4)));
        Self((used_cell << 4) | edge.index())
    }
    /// Index of the owning used cell
    pub fn used_cell(self) -> usize {
        self.0 >> 4
    }
    /// Edge on which the vertex lies
    pub fn edge(self) -> Edge {
        Edge::new((self.0 & 0xF) as u8)
    }
}

/// Full provenance of an output vertex
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VertexSource {
    /// Linear index of the owning cell
    pub cell: usize,
    /// Edge within that cell
    pub edge: Edge,
    /// Linear index of the edge's start corner
    pub start: usize,
    /// Linear index of the edge's end corner
    pub end: usize,
    /// Interpolation parameter along the edge
    pub t: f32,
}

/// Interpolation parameter along an edge, with its partial derivatives
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EdgeLerp {
    /// Position along the edge, in `[0, 1]`
    pub t: f32,
    /// `∂t/∂s_a`
    pub dt_da: f32,
    /// `∂t/∂s_b`
    pub dt_db: f32,
}

impl EdgeLerp {
    /// Finds where the isovalue crosses an edge with endpoint values `sa, sb`
    ///
    /// If the edge is degenerate (equal endpoint values, or a non-finite
    /// result), the vertex is placed at the midpoint; if the crossing falls
    /// outside the edge, it is clamped.  In both cases, the derivatives are
    /// zero.
    #[inline]
    pub fn new(sa: f32, sb: f32, iso: f32) -> Self {
        let d = sb - sa;
        let t = (iso - sa) / d;
        if d == 0.0 || !d.is_finite() || !t.is_finite() {
            Self {
                t: 0.5,
                dt_da: 0.0,
                dt_db: 0.0,
            }
        } else if !(0.0..=1.0).contains(&t) {
            Self {
                t: t.clamp(0.0, 1.0),
                dt_da: 0.0,
                dt_db: 0.0,
            }
        } else {
            Self {
                t,
                dt_da: (t - 1.0) / d,
                dt_db: -t / d,
            }
        }
    }
}

/// Returns the grid-space position of a sample
#[inline]
pub fn sample_pos(dims: &Dims, i: usize) -> Position {
    let [x, y, z] = dims.pos(i);
    Position::new(x as f32, y as f32, z as f32)
}

/// Mutable views of the output buffers, sized to the mesh
pub struct MeshOut<'a> {
    /// Output vertex positions
    pub verts: &'a mut [Position],
    /// Output vertex features
    pub feats: &'a mut [Feature],
    /// Output vertex provenance
    pub types: &'a mut [VertexTag],
    /// Interpolation parameter of each output vertex
    pub ts: &'a mut [f32],
    /// Output triangles
    pub tris: &'a mut [Triangle],
}

/// Emits vertices and triangles for every used cell
///
/// Each used cell writes to its own range of the outputs, as given by the
/// offsets in `used`.  Triangles are wound so that their normals point toward
/// increasing scalar values.
pub fn generate(
    dims: &Dims,
    sdfs: &[f32],
    feats: &[Feature],
    iso: f32,
    used: UsedCells,
    out: MeshOut,
    threads: Option<&ThreadPool>,
) {
    let n_used = used.len();
    let starts: Vec<usize> = (0..n_used).step_by(GENERATE_CHUNK).collect();
    let vert_starts: Vec<usize> =
        starts.iter().map(|u| used.first_vert[*u]).collect();
    let tri_starts: Vec<usize> =
        starts.iter().map(|u| used.first_tri[*u]).collect();

    let items: Vec<_> = starts
        .into_iter()
        .zip(split_at_offsets(out.verts, &vert_starts))
        .zip(split_at_offsets(out.feats, &vert_starts))
        .zip(split_at_offsets(out.types, &vert_starts))
        .zip(split_at_offsets(out.ts, &vert_starts))
        .zip(split_at_offsets(out.tris, &tri_starts))
        .collect();

    for_each_item(threads, items, |(((((u0, verts), fs), types), ts), tris)| {
        let u1 = (u0 + GENERATE_CHUNK).min(n_used);
        let v0 = used.first_vert[u0];
        let t0 = used.first_tri[u0];
        for u in u0..u1 {
            let cell = used.index[u];
            let mc = case(CellMask::new(used.code[u]));
            let first_vert = used.first_vert[u];
            let first_tri = used.first_tri[u];

            for (slot, edge) in mc.edges().enumerate() {
                let a = dims.corner(cell, edge.start());
                let b = dims.corner(cell, edge.end());
                let lerp = EdgeLerp::new(sdfs[a], sdfs[b], iso);

                let pa = sample_pos(dims, a);
                let pb = sample_pos(dims, b);
                let i = first_vert + slot - v0;
                verts[i] = pa + (pb - pa) * lerp.t;
                fs[i] = Feature::lerp(&feats[a], &feats[b], lerp.t);
                types[i] = VertexTag::new(u, edge);
                ts[i] = lerp.t;
            }

            for (k, [a, b, c]) in mc.tris().enumerate() {
                tris[first_tri + k - t0] = Triangle::new(
                    first_vert + a,
                    first_vert + c,
                    first_vert + b,
                );
            }
        }
    });
}
