//! Extraction context, owning grid state and every buffer
use crate::{
    Error,
    adjoint::{AdjointIn, accumulate, clear, merge},
    classify::classify,
    config::{Settings, ThreadPool},
    generate::{MeshOut, VertexSource, VertexTag, generate},
    grid::Dims,
    mesh::Mesh,
    scan::{
        UsedCells, compact, count_used, offsets, scan_partials, tri_count,
        vert_count,
    },
    storage::{Capacity, Storage},
    types::{Feature, Position, Triangle},
};
use log::{debug, warn};

/// Record of the last successful forward pass
#[derive(Copy, Clone, Debug)]
struct ForwardRecord {
    dims: Dims,
    iso: f32,
}

/// Counts produced by a single extraction
#[derive(Copy, Clone, Debug, Default)]
struct Counts {
    used_cells: usize,
    verts: usize,
    tris: usize,
}

/// Differentiable marching cubes context
///
/// A context is bound to a grid resolution (see [`resize`](Self::resize)) and
/// owns every buffer used during extraction.  It's meant to be reused across
/// many calls: buffers only ever grow, so repeated calls at the same (or a
/// smaller) resolution don't allocate.
///
/// ```
/// use dmc::{Feature, MarchingCubes, Position};
///
/// // A 3×3×3 grid of samples with one sample below the isovalue
/// let mut mc = MarchingCubes::new(3, 3, 3)?;
/// let mut sdfs = vec![1.0; 27];
/// sdfs[0] = -1.0;
/// let feats = vec![Feature::zeros(); 27];
///
/// mc.forward(&sdfs, &feats, [3, 3, 3], 0.0, None)?;
/// assert_eq!(mc.n_used_cells(), 1);
/// assert_eq!(mc.n_verts(), 3);
/// assert_eq!(mc.n_tris(), 1);
///
/// // Pull every vertex along +X and see how the grid would need to change
/// let adj_verts = vec![Position::new(1.0, 0.0, 0.0); mc.n_verts()];
/// let adj_feats = vec![Feature::zeros(); mc.n_verts()];
/// let mut adj_sdfs = vec![0.0; 27];
/// let mut adj_grid_feats = vec![Feature::zeros(); 27];
/// mc.backward(
///     &sdfs,
///     &feats,
///     &adj_verts,
///     &adj_feats,
///     &mut adj_sdfs,
///     &mut adj_grid_feats,
///     0.0,
///     None,
/// )?;
///
/// // Raising the inside sample moves the X-edge crossing toward it
/// assert!(adj_sdfs[0] < 0.0);
/// # Ok::<(), dmc::Error>(())
/// ```
pub struct MarchingCubes {
    dims: Dims,
    settings: Settings,
    counts: Counts,
    forward: Option<ForwardRecord>,
    storage: Storage,
}

impl MarchingCubes {
    /// Builds a context for a grid of the given size, with default settings
    pub fn new(x: usize, y: usize, z: usize) -> Result<Self, Error> {
        Self::with_settings(x, y, z, Settings::default())
    }

    /// Builds a context for a grid of the given size
    pub fn with_settings(
        x: usize,
        y: usize,
        z: usize,
        settings: Settings,
    ) -> Result<Self, Error> {
        Ok(Self {
            dims: Dims::new(x, y, z)?,
            settings,
            counts: Counts::default(),
            forward: None,
            storage: Storage::new(settings.growth),
        })
    }

    /// Rebinds the context to a new grid size
    ///
    /// Buffers are kept (and grown lazily by the next call).  The last forward
    /// pass stays on record, so [`backward`](Self::backward) will report a
    /// [`DimensionMismatch`](Error::DimensionMismatch) until the next
    /// [`forward`](Self::forward) at the new size.
    pub fn resize(&mut self, x: usize, y: usize, z: usize) -> Result<(), Error> {
        let dims = Dims::new(x, y, z)?;
        if dims != self.dims {
            debug!("resizing context: {:?} -> {:?}", self.dims, dims);
        }
        self.dims = dims;
        Ok(())
    }

    /// Extracts the isosurface of `sdfs` at `iso`
    ///
    /// `sdfs` and `feats` hold one value per grid sample of a `dims` grid,
    /// addressed as described in [`Dims`].  If `dims` differs from the
    /// context's current size, the context is resized first.  Outputs are
    /// read back through [`vertices`](Self::vertices),
    /// [`features`](Self::features), and [`triangles`](Self::triangles).
    ///
    /// Arguments are validated before anything is touched: if validation
    /// fails, the context (including the last forward pass) is unchanged.
    /// If extraction itself fails, buffers may have been overwritten, so the
    /// context is left with no forward pass on record and every output
    /// accessor returns an empty slice.
    pub fn forward(
        &mut self,
        sdfs: &[f32],
        feats: &[Feature],
        dims: [usize; 3],
        iso: f32,
        threads: Option<&ThreadPool>,
    ) -> Result<(), Error> {
        let [x, y, z] = dims;
        let d = Dims::new(x, y, z)?;
        let n = d.n_cells();
        check_len("sdfs", n, sdfs.len())?;
        check_len("feats", n, feats.len())?;

        self.resize(x, y, z)?;
        self.forward = None;
        self.counts = Counts::default();

        let min_len = self.settings.min_len;
        let storage = &mut self.storage;
        let counts = guard(|| {
            extract(storage, &d, sdfs, feats, iso, threads, min_len)
        })?;
        debug!(
            "forward: {n} cells, {} used, {} verts, {} tris",
            counts.used_cells, counts.verts, counts.tris
        );

        self.counts = counts;
        self.forward = Some(ForwardRecord { dims: d, iso });
        Ok(())
    }

    /// Accumulates gradients of the last forward pass onto the input grids
    ///
    /// `sdfs` and `feats` must be the grids passed to the last
    /// [`forward`](Self::forward) call; `adj_verts` and `adj_feats` hold one
    /// adjoint per output vertex.  Gradients are **added** into `out_adj_sdfs`
    /// and `out_adj_feats`, so callers should zero them first.
    #[allow(clippy::too_many_arguments)]
    pub fn backward(
        &mut self,
        sdfs: &[f32],
        feats: &[Feature],
        adj_verts: &[Position],
        adj_feats: &[Feature],
        out_adj_sdfs: &mut [f32],
        out_adj_feats: &mut [Feature],
        iso: f32,
        threads: Option<&ThreadPool>,
    ) -> Result<(), Error> {
        let record = self.forward.ok_or(Error::NoForwardState)?;
        if record.dims != self.dims {
            return Err(Error::DimensionMismatch {
                expected: record.dims.get(),
                actual: self.dims.get(),
            });
        }
        if iso != record.iso {
            warn!(
                "backward isovalue {iso} differs from forward isovalue {}; \
                 using the forward topology",
                record.iso
            );
        }

        let n = record.dims.n_cells();
        let n_verts = self.counts.verts;
        check_len("sdfs", n, sdfs.len())?;
        check_len("feats", n, feats.len())?;
        check_len("adj_verts", n_verts, adj_verts.len())?;
        check_len("adj_feats", n_verts, adj_feats.len())?;
        check_len("out_adj_sdfs", n, out_adj_sdfs.len())?;
        check_len("out_adj_feats", n, out_adj_feats.len())?;

        let d = record.dims;
        let counts = self.counts;
        let min_len = self.settings.min_len;
        let s = &mut self.storage;
        guard(|| {
            s.ensure_grad_storage(n)?;
            clear(
                s.adj_sdfs.get_mut(n),
                s.adj_feats.get_mut(n),
                threads,
                min_len,
            );
            let input = AdjointIn {
                sdfs,
                feats,
                types: s.verts_type.get(counts.verts),
                used_cell_index: s.used_cell_index.get(counts.used_cells),
                adj_verts,
                adj_feats,
            };
            let grad_sdfs = s.adj_sdfs.get(n);
            let grad_feats = s.adj_feats.get(n);
            accumulate(&d, iso, input, grad_sdfs, grad_feats, threads, min_len);
            merge(
                grad_sdfs,
                grad_feats,
                out_adj_sdfs,
                out_adj_feats,
                threads,
                min_len,
            );
            Ok(())
        })?;
        debug!("backward: {n_verts} verts scattered onto {n} samples");
        Ok(())
    }

    /// Returns the grid size this context is bound to
    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// Returns the number of cells (and grid samples)
    pub fn n_cells(&self) -> usize {
        self.dims.n_cells()
    }

    /// Number of cells that produced geometry in the last forward pass
    pub fn n_used_cells(&self) -> usize {
        self.counts.used_cells
    }

    /// Number of output vertices from the last forward pass
    pub fn n_verts(&self) -> usize {
        self.counts.verts
    }

    /// Number of output triangles from the last forward pass
    pub fn n_tris(&self) -> usize {
        self.counts.tris
    }

    /// Output vertex positions, in grid-index space
    pub fn vertices(&self) -> &[Position] {
        self.storage.verts.get(self.counts.verts)
    }

    /// Output vertex features
    pub fn features(&self) -> &[Feature] {
        self.storage.feats.get(self.counts.verts)
    }

    /// Output triangles, as indices into [`vertices`](Self::vertices)
    pub fn triangles(&self) -> &[Triangle] {
        self.storage.tris.get(self.counts.tris)
    }

    /// Packed provenance of each output vertex
    pub fn vertex_tags(&self) -> &[VertexTag] {
        self.storage.verts_type.get(self.counts.verts)
    }

    /// Map from used cell to cell index (strictly increasing)
    pub fn used_cell_index(&self) -> &[usize] {
        self.storage.used_cell_index.get(self.counts.used_cells)
    }

    /// Configuration code of each used cell
    pub fn used_cell_code(&self) -> &[u8] {
        self.storage.used_cell_code.get(self.counts.used_cells)
    }

    /// Offset of each used cell's first vertex
    pub fn used_to_first_vert(&self) -> &[usize] {
        self.storage.used_to_first_vert.get(self.counts.used_cells)
    }

    /// Offset of each used cell's first triangle
    pub fn used_to_first_tri(&self) -> &[usize] {
        self.storage.used_to_first_tri.get(self.counts.used_cells)
    }

    /// Map from cell to used-cell index, or [`NOT_USED`](crate::NOT_USED)
    pub fn first_cell_used(&self) -> &[usize] {
        let n = self.forward.map(|f| f.dims.n_cells()).unwrap_or(0);
        self.storage.first_cell_used.get(n)
    }

    /// Looks up where an output vertex came from
    pub fn vertex_source(&self, i: usize) -> Option<VertexSource> {
        let record = self.forward?;
        let tag = *self.vertex_tags().get(i)?;
        let cell = self.used_cell_index()[tag.used_cell()];
        let edge = tag.edge();
        let dims = &record.dims;
        let start = dims.corner(cell, edge.start());
        let end = dims.corner(cell, edge.end());
        let t = self.storage.verts_t.get(self.counts.verts)[i];
        Some(VertexSource {
            cell,
            edge,
            start,
            end,
            t,
        })
    }

    /// Copies the output of the last forward pass into an owned mesh
    pub fn mesh(&self) -> Mesh {
        Mesh {
            vertices: self.vertices().to_vec(),
            features: self.features().to_vec(),
            triangles: self.triangles().to_vec(),
        }
    }

    /// Reports current buffer capacities
    pub fn capacity(&self) -> Capacity {
        self.storage.capacity()
    }
}

fn check_len(
    name: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::BadSliceLength {
            name,
            expected,
            actual,
        })
    }
}

/// Runs a stage sequence, converting worker panics into errors
fn guard<T>(f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(e) => {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = e.downcast_ref::<String>() {
                s.clone()
            } else {
                "worker panicked".to_owned()
            };
            warn!("extraction failed: {msg}");
            Err(Error::DeviceExecution(msg))
        }
    }
}

/// Classify, scan, grow, and generate
fn extract(
    s: &mut Storage,
    dims: &Dims,
    sdfs: &[f32],
    feats: &[Feature],
    iso: f32,
    threads: Option<&ThreadPool>,
    min_len: usize,
) -> Result<Counts, Error> {
    let n = dims.n_cells();
    let p = scan_partials(n);
    s.ensure_cell_storage(n)?;
    s.ensure_temp_storage(p)?;

    classify(dims, sdfs, iso, s.cell_code.get_mut(n), threads, min_len);
    let n_used = count_used(
        s.cell_code.get(n),
        s.first_cell_used.get_mut(n),
        s.temp.get_mut(p),
        threads,
        min_len,
    );
    debug!("classify: {n_used} of {n} cells used");

    s.ensure_used_cell_storage(n_used)?;
    compact(
        s.cell_code.get(n),
        s.first_cell_used.get_mut(n),
        s.temp.get(p),
        s.used_cell_index.get_mut(n_used),
        s.used_cell_code.get_mut(n_used),
        threads,
    );
    let n_verts = offsets(
        s.used_cell_code.get(n_used),
        s.used_to_first_vert.get_mut(n_used),
        s.temp.get_mut(p),
        vert_count,
        threads,
        min_len,
    );
    let n_tris = offsets(
        s.used_cell_code.get(n_used),
        s.used_to_first_tri.get_mut(n_used),
        s.temp.get_mut(p),
        tri_count,
        threads,
        min_len,
    );

    s.ensure_vert_type_storage(n_verts)?;
    s.ensure_vert_storage(n_verts)?;
    s.ensure_tri_storage(n_tris)?;
    let used = UsedCells {
        index: s.used_cell_index.get(n_used),
        code: s.used_cell_code.get(n_used),
        first_vert: s.used_to_first_vert.get(n_used),
        first_tri: s.used_to_first_tri.get(n_used),
    };
    let out = MeshOut {
        verts: s.verts.get_mut(n_verts),
        feats: s.feats.get_mut(n_verts),
        types: s.verts_type.get_mut(n_verts),
        ts: s.verts_t.get_mut(n_verts),
        tris: s.tris.get_mut(n_tris),
    };
    generate(dims, sdfs, feats, iso, used, out, threads);

    Ok(Counts {
        used_cells: n_used,
        verts: n_verts,
        tris: n_tris,
    })
}
