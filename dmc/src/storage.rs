//! Grow-only buffers owned by a [`MarchingCubes`](crate::MarchingCubes)
//! context
//!
//! Every extraction recomputes its full state, so buffers only need to be big
//! enough; they are never shrunk, and their contents are **not** preserved
//! when they grow.  Callers must treat a buffer as uninitialized after
//! requesting capacity and write every element they later read.
use crate::{
    Error,
    atomic::{AtomicF32, AtomicFeature},
    config::GrowthPolicy,
    generate::VertexTag,
    types::{Feature, Position, Triangle},
};
use log::trace;

/// A grow-only buffer with an explicit capacity
pub struct Buffer<T> {
    data: Vec<T>,
    fill: fn() -> T,
    kind: &'static str,
}

impl<T> Buffer<T> {
    /// Builds an empty buffer
    ///
    /// `fill` is used to initialize fresh elements when the buffer grows;
    /// `kind` names the buffer in logs and errors.
    pub fn new(kind: &'static str, fill: fn() -> T) -> Self {
        Self {
            data: vec![],
            fill,
            kind,
        }
    }

    /// Returns the number of elements that can be addressed
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Ensures that the buffer can address at least `n` elements
    ///
    /// If the buffer is too small, it is reallocated and its previous
    /// contents are discarded.  On allocation failure, the buffer keeps its
    /// old allocation (and contents).
    pub fn reset_and_ensure(
        &mut self,
        n: usize,
        policy: GrowthPolicy,
    ) -> Result<(), Error> {
        let current = self.data.len();
        if n <= current {
            return Ok(());
        }
        let target = policy.target(current, n);
        let data = match self.alloc(target) {
            Ok(d) => d,
            // Geometric growth may overshoot what's available; try again with
            // exactly what was asked for.
            Err(_) if target > n => self.alloc(n)?,
            Err(e) => return Err(e),
        };
        trace!("growing {} storage: {current} -> {}", self.kind, data.len());
        self.data = data;
        Ok(())
    }

    fn alloc(&self, n: usize) -> Result<Vec<T>, Error> {
        let mut data = Vec::new();
        data.try_reserve_exact(n)
            .map_err(|_| Error::AllocationFailure {
                kind: self.kind,
                requested: n,
            })?;
        data.resize_with(n, self.fill);
        Ok(data)
    }

    /// Borrows the first `n` elements
    ///
    /// # Panics
    /// If `n` exceeds the buffer's capacity
    pub fn get(&self, n: usize) -> &[T] {
        &self.data[..n]
    }

    /// Mutably borrows the first `n` elements
    ///
    /// # Panics
    /// If `n` exceeds the buffer's capacity
    pub fn get_mut(&mut self, n: usize) -> &mut [T] {
        &mut self.data[..n]
    }
}

/// Current capacity of each storage kind, in elements
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Capacity {
    /// Prefix-sum scratch
    pub temp: usize,
    /// Per-cell bookkeeping
    pub cells: usize,
    /// Per-used-cell bookkeeping
    pub used_cells: usize,
    /// Per-vertex provenance
    pub vert_types: usize,
    /// Output vertices and features
    pub verts: usize,
    /// Output triangles
    pub tris: usize,
    /// Gradient accumulators
    pub grads: usize,
}

/// All buffers used during extraction
pub struct Storage {
    pub(crate) policy: GrowthPolicy,

    /// Prefix-sum scratch (one partial sum per chunk)
    pub(crate) temp: Buffer<usize>,

    /// Configuration code of every cell
    pub(crate) cell_code: Buffer<u8>,
    /// Map from cell to used-cell index, or [`NOT_USED`]
    pub(crate) first_cell_used: Buffer<usize>,

    /// Map from used cell to cell index
    pub(crate) used_cell_index: Buffer<usize>,
    /// Configuration code of every used cell
    pub(crate) used_cell_code: Buffer<u8>,
    /// Offset of each used cell's first output vertex
    pub(crate) used_to_first_vert: Buffer<usize>,
    /// Offset of each used cell's first output triangle
    pub(crate) used_to_first_tri: Buffer<usize>,

    /// Provenance of each output vertex
    pub(crate) verts_type: Buffer<VertexTag>,
    /// Interpolation parameter of each output vertex along its edge
    pub(crate) verts_t: Buffer<f32>,
    pub(crate) verts: Buffer<Position>,
    pub(crate) feats: Buffer<Feature>,
    pub(crate) tris: Buffer<Triangle>,

    pub(crate) adj_sdfs: Buffer<AtomicF32>,
    pub(crate) adj_feats: Buffer<AtomicFeature>,
}

/// Sentinel stored in `first_cell_used` for cells that produce no geometry
pub const NOT_USED: usize = usize::MAX;

impl Storage {
    /// Builds empty storage
    pub fn new(policy: GrowthPolicy) -> Self {
        Self {
            policy,
            temp: Buffer::new("temp", || 0),
            cell_code: Buffer::new("cell code", || 0),
            first_cell_used: Buffer::new("cell", || NOT_USED),
            used_cell_index: Buffer::new("used cell index", || 0),
            used_cell_code: Buffer::new("used cell code", || 0),
            used_to_first_vert: Buffer::new("used cell vert offset", || 0),
            used_to_first_tri: Buffer::new("used cell tri offset", || 0),
            verts_type: Buffer::new("vert type", VertexTag::default),
            verts_t: Buffer::new("vert lerp", || 0.0),
            verts: Buffer::new("vert", Position::zeros),
            feats: Buffer::new("feature", Feature::zeros),
            tris: Buffer::new("tri", Triangle::zeros),
            adj_sdfs: Buffer::new("scalar gradient", AtomicF32::default),
            adj_feats: Buffer::new("feature gradient", AtomicFeature::default),
        }
    }

    /// Ensures prefix-sum scratch for `n` partial sums
    pub fn ensure_temp_storage(&mut self, n: usize) -> Result<(), Error> {
        self.temp.reset_and_ensure(n, self.policy)
    }

    /// Ensures per-cell bookkeeping for `n` cells
    pub fn ensure_cell_storage(&mut self, n: usize) -> Result<(), Error> {
        self.cell_code.reset_and_ensure(n, self.policy)?;
        self.first_cell_used.reset_and_ensure(n, self.policy)
    }

    /// Ensures per-used-cell bookkeeping for `n` used cells
    pub fn ensure_used_cell_storage(&mut self, n: usize) -> Result<(), Error> {
        self.used_cell_index.reset_and_ensure(n, self.policy)?;
        self.used_cell_code.reset_and_ensure(n, self.policy)?;
        self.used_to_first_vert.reset_and_ensure(n, self.policy)?;
        self.used_to_first_tri.reset_and_ensure(n, self.policy)
    }

    /// Ensures vertex provenance storage for `n` vertices
    pub fn ensure_vert_type_storage(&mut self, n: usize) -> Result<(), Error> {
        self.verts_type.reset_and_ensure(n, self.policy)?;
        self.verts_t.reset_and_ensure(n, self.policy)
    }

    /// Ensures output vertex and feature storage for `n` vertices
    pub fn ensure_vert_storage(&mut self, n: usize) -> Result<(), Error> {
        self.verts.reset_and_ensure(n, self.policy)?;
        self.feats.reset_and_ensure(n, self.policy)
    }

    /// Ensures output triangle storage for `n` triangles
    pub fn ensure_tri_storage(&mut self, n: usize) -> Result<(), Error> {
        self.tris.reset_and_ensure(n, self.policy)
    }

    /// Ensures gradient accumulators for `n` grid samples
    pub fn ensure_grad_storage(&mut self, n: usize) -> Result<(), Error> {
        self.adj_sdfs.reset_and_ensure(n, self.policy)?;
        self.adj_feats.reset_and_ensure(n, self.policy)
    }

    /// Reports current capacities
    pub fn capacity(&self) -> Capacity {
        Capacity {
            temp: self.temp.capacity(),
            cells: self.first_cell_used.capacity(),
            used_cells: self.used_cell_index.capacity(),
            vert_types: self.verts_type.capacity(),
            verts: self.verts.capacity(),
            tris: self.tris.capacity(),
            grads: self.adj_sdfs.capacity(),
        }
    }
}
