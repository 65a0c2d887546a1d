//! Reverse-mode pass: scatters output adjoints back onto the input grids
//!
//! A vertex on edge `(a, b)` is `p = p_a + t (p_b - p_a)` with
//! `t = (iso - s_a) / (s_b - s_a)`, and its feature is
//! `f = f_a + t (f_b - f_a)`.  Given adjoints `p̄` and `f̄`, the adjoint of `t`
//! is `t̄ = p̄ · (p_b - p_a) + f̄ · (f_b - f_a)`, which flows into `s_a` and
//! `s_b` through `∂t/∂s`; the feature adjoint flows into `f_a` and `f_b` with
//! weights `1 - t` and `t`.
use crate::{
    atomic::{AtomicF32, AtomicFeature},
    config::{ThreadPool, for_each_index, for_each_mut},
    generate::{EdgeLerp, VertexTag, sample_pos},
    grid::Dims,
    types::{Feature, Position},
};

/// Inputs to the adjoint pass
#[derive(Copy, Clone)]
pub struct AdjointIn<'a> {
    /// Scalar grid used in the forward pass
    pub sdfs: &'a [f32],
    /// Feature grid used in the forward pass
    pub feats: &'a [Feature],
    /// Provenance of each output vertex
    pub types: &'a [VertexTag],
    /// Map from used cell to cell index
    pub used_cell_index: &'a [usize],
    /// Adjoint of each output vertex position
    pub adj_verts: &'a [Position],
    /// Adjoint of each output vertex feature
    pub adj_feats: &'a [Feature],
}

/// Scatters per-vertex adjoints into atomic grid accumulators
///
/// One unit of work per output vertex; contributions to shared grid samples
/// are combined with atomic adds, so the result is independent of scheduling
/// up to floating-point rounding.
pub fn accumulate(
    dims: &Dims,
    iso: f32,
    input: AdjointIn,
    adj_sdfs: &[AtomicF32],
    adj_feats: &[AtomicFeature],
    threads: Option<&ThreadPool>,
    min_len: usize,
) {
    let n_verts = input.types.len();
    debug_assert_eq!(input.adj_verts.len(), n_verts);
    debug_assert_eq!(input.adj_feats.len(), n_verts);

    for_each_index(threads, min_len, n_verts, |i| {
        let tag = input.types[i];
        let cell = input.used_cell_index[tag.used_cell()];
        let edge = tag.edge();
        let a = dims.corner(cell, edge.start());
        let b = dims.corner(cell, edge.end());

        let lerp = EdgeLerp::new(input.sdfs[a], input.sdfs[b], iso);
        let fa = input.feats[a];
        let fb = input.feats[b];
        let adj_v = input.adj_verts[i];
        let adj_f = input.adj_feats[i];

        let dp = sample_pos(dims, b) - sample_pos(dims, a);
        let adj_t = adj_v.dot(&dp) + adj_f.dot(&(fb - fa));
        if adj_t != 0.0 {
            adj_sdfs[a].fetch_add(adj_t * lerp.dt_da);
            adj_sdfs[b].fetch_add(adj_t * lerp.dt_db);
        }
        adj_feats[a].fetch_add(&(adj_f * (1.0 - lerp.t)));
        adj_feats[b].fetch_add(&(adj_f * lerp.t));
    });
}

/// Adds accumulated gradients into caller-owned outputs
pub fn merge(
    adj_sdfs: &[AtomicF32],
    adj_feats: &[AtomicFeature],
    out_sdfs: &mut [f32],
    out_feats: &mut [Feature],
    threads: Option<&ThreadPool>,
    min_len: usize,
) {
    for_each_mut(threads, min_len, out_sdfs, |i, o| *o += adj_sdfs[i].load());
    for_each_mut(threads, min_len, out_feats, |i, o| {
        *o += adj_feats[i].load()
    });
}

/// Resets gradient accumulators to zero
pub fn clear(
    adj_sdfs: &mut [AtomicF32],
    adj_feats: &mut [AtomicFeature],
    threads: Option<&ThreadPool>,
    min_len: usize,
) {
    for_each_mut(threads, min_len, adj_sdfs, |_, a| a.store(0.0));
    for_each_mut(threads, min_len, adj_feats, |_, a| a.clear());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Edge;

    #[test]
    fn single_edge() {
        let dims = Dims::new(2, 2, 2).unwrap();
        let mut sdfs = vec![1.0; 8];
        sdfs[0] = -1.0;
        sdfs[4] = 3.0; // sample (1, 0, 0)
        let mut feats = vec![Feature::zeros(); 8];
        feats[4] = Feature::splat(2.0);

        let types = [VertexTag::new(0, Edge::new(0))];
        let used_cell_index = [0];
        let adj_verts = [Position::new(1.0, 0.0, 0.0)];
        let mut adj_f = Feature::zeros();
        adj_f[0] = 1.0;
        let adj_feats_in = [adj_f];

        let input = AdjointIn {
            sdfs: &sdfs,
            feats: &feats,
            types: &types,
            used_cell_index: &used_cell_index,
            adj_verts: &adj_verts,
            adj_feats: &adj_feats_in,
        };
        let mut adj_sdfs: Vec<AtomicF32> =
            (0..8).map(|_| AtomicF32::default()).collect();
        let mut adj_feats: Vec<AtomicFeature> =
            (0..8).map(|_| AtomicFeature::default()).collect();
        accumulate(&dims, 0.0, input, &adj_sdfs, &adj_feats, None, 1);

        // t = 0.25; dt/dsa = -0.75 / 4, dt/dsb = -0.25 / 4
        // adj_t = 1 * (1 - 0) + 1 * (2 - 0) = 3
        assert_eq!(adj_sdfs[0].load(), 3.0 * -0.75 / 4.0);
        assert_eq!(adj_sdfs[4].load(), 3.0 * -0.25 / 4.0);
        assert_eq!(adj_sdfs[1].load(), 0.0);
        assert_eq!(adj_feats[0].load()[0], 0.75);
        assert_eq!(adj_feats[4].load()[0], 0.25);
        assert_eq!(adj_feats[4].load()[1], 0.0);

        let mut out_sdfs = vec![1.0; 8];
        let mut out_feats = vec![Feature::zeros(); 8];
        merge(&adj_sdfs, &adj_feats, &mut out_sdfs, &mut out_feats, None, 1);
        assert_eq!(out_sdfs[0], 1.0 + 3.0 * -0.75 / 4.0);
        assert_eq!(out_sdfs[2], 1.0);
        assert_eq!(out_feats[0][0], 0.75);

        clear(&mut adj_sdfs, &mut adj_feats, None, 1);
        assert_eq!(adj_sdfs[0].load(), 0.0);
        assert_eq!(adj_feats[4].load(), Feature::zeros());
    }
}
