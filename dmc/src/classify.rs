//! Per-cell classification
use crate::{
    config::{ThreadPool, for_each_mut},
    grid::Dims,
    types::CellMask,
};

/// Computes the configuration code of every cell
///
/// `codes` must have one slot per cell.  Cells that don't have all 8 corners
/// inside the grid are given code 0, i.e. they never produce geometry.
pub fn classify(
    dims: &Dims,
    sdfs: &[f32],
    iso: f32,
    codes: &mut [u8],
    threads: Option<&ThreadPool>,
    min_len: usize,
) {
    debug_assert_eq!(codes.len(), dims.n_cells());
    for_each_mut(threads, min_len, codes, |cell, code| {
        *code = cell_mask(dims, sdfs, iso, cell).code();
    });
}

/// Computes the configuration code of a single cell
#[inline]
pub fn cell_mask(dims: &Dims, sdfs: &[f32], iso: f32, cell: usize) -> CellMask {
    if !dims.is_full_cell(cell) {
        return CellMask::new(0);
    }
    let values = dims.corners(cell).map(|i| sdfs[i]);
    CellMask::from_values(&values, iso)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_corner() {
        let dims = Dims::new(2, 2, 2).unwrap();
        let mut sdfs = vec![1.0; 8];
        sdfs[0] = -1.0;
        let mut codes = vec![0xAA; 8];
        classify(&dims, &sdfs, 0.0, &mut codes, None, 1);
        assert_eq!(codes, vec![1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn corner_order() {
        let dims = Dims::new(2, 2, 2).unwrap();
        // Corner 6 is the (1, 1, 1) sample
        let mut sdfs = vec![1.0; 8];
        sdfs[dims.index(1, 1, 1)] = -1.0;
        assert_eq!(cell_mask(&dims, &sdfs, 0.0, 0).code(), 1 << 6);

        // Corner 3 is the (0, 1, 0) sample
        let mut sdfs = vec![1.0; 8];
        sdfs[dims.index(0, 1, 0)] = -1.0;
        assert_eq!(cell_mask(&dims, &sdfs, 0.0, 0).code(), 1 << 3);
    }

    #[test]
    fn parallel_matches_serial() {
        let dims = Dims::new(9, 7, 5).unwrap();
        let sdfs: Vec<f32> = (0..dims.n_cells())
            .map(|i| ((i * 7919) % 13) as f32 - 6.0)
            .collect();
        let mut a = vec![0; dims.n_cells()];
        let mut b = vec![0; dims.n_cells()];
        classify(&dims, &sdfs, 0.5, &mut a, None, 1);
        let pool = ThreadPool::new(4).unwrap();
        classify(&dims, &sdfs, 0.5, &mut b, Some(&pool), 3);
        assert_eq!(a, b);
    }
}
