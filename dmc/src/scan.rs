//! Stream compaction of used cells and output offsets
//!
//! All scans are done in fixed-size chunks: each chunk is summed in parallel,
//! the chunk totals are scanned serially (into the scratch buffer), and then
//! each chunk is scanned locally starting from its total.  Chunking doesn't
//! depend on the thread count, so results are identical with any pool.
use crate::{
    config::{ThreadPool, for_each_item, for_each_mut},
    storage::NOT_USED,
    tables::case,
    types::CellMask,
};

/// Number of elements in each scan chunk
pub const SCAN_CHUNK: usize = 4096;

/// Returns the number of partial sums needed to scan `n` elements
pub fn scan_partials(n: usize) -> usize {
    n.div_ceil(SCAN_CHUNK)
}

/// Compacted view of the used cells
#[derive(Copy, Clone)]
pub struct UsedCells<'a> {
    /// Map from used cell to cell index
    pub index: &'a [usize],
    /// Configuration code of each used cell
    pub code: &'a [u8],
    /// Offset of each used cell's first output vertex
    pub first_vert: &'a [usize],
    /// Offset of each used cell's first output triangle
    pub first_tri: &'a [usize],
}

impl UsedCells<'_> {
    /// Number of used cells
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Checks whether there are no used cells
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// In-place exclusive prefix sum, returning the total
///
/// `partials` must hold at least [`scan_partials(data.len())`](scan_partials)
/// elements; on return, its first entries are the starting offset of each
/// chunk.
pub fn exclusive_scan(
    data: &mut [usize],
    partials: &mut [usize],
    threads: Option<&ThreadPool>,
) -> usize {
    let partials = &mut partials[..scan_partials(data.len())];

    // Sum each chunk
    let items: Vec<_> = data.chunks(SCAN_CHUNK).zip(partials.iter_mut()).collect();
    for_each_item(threads, items, |(chunk, p)| *p = chunk.iter().sum());

    // Scan chunk totals
    let mut total = 0;
    for p in partials.iter_mut() {
        let v = *p;
        *p = total;
        total += v;
    }

    // Scan within each chunk
    let items: Vec<_> = data
        .chunks_mut(SCAN_CHUNK)
        .zip(partials.iter().copied())
        .collect();
    for_each_item(threads, items, |(chunk, start)| {
        let mut acc = start;
        for v in chunk {
            let n = *v;
            *v = acc;
            acc += n;
        }
    });
    total
}

/// Splits `data` into consecutive pieces beginning at the given offsets
///
/// `starts` must be non-decreasing and begin at 0; the last piece runs to the
/// end of `data`.
pub fn split_at_offsets<'a, T>(
    mut data: &'a mut [T],
    starts: &[usize],
) -> Vec<&'a mut [T]> {
    let total = data.len();
    let mut out = Vec::with_capacity(starts.len());
    for (i, s) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(total);
        let (head, tail) = std::mem::take(&mut data).split_at_mut(end - s);
        out.push(head);
        data = tail;
    }
    out
}

/// Counts used cells, leaving each cell's exclusive offset in `first_cell_used`
///
/// Returns the number of used cells.  Unused cells are not yet marked with
/// the sentinel; that happens in [`compact`], which must be called before
/// `partials` is reused.
pub fn count_used(
    codes: &[u8],
    first_cell_used: &mut [usize],
    partials: &mut [usize],
    threads: Option<&ThreadPool>,
    min_len: usize,
) -> usize {
    for_each_mut(threads, min_len, first_cell_used, |i, f| {
        *f = usize::from(!CellMask::new(codes[i]).is_uniform());
    });
    exclusive_scan(first_cell_used, partials, threads)
}

/// Writes the compacted used-cell list
///
/// `partials` must be the chunk offsets left by [`count_used`]; the output
/// slices must have exactly one slot per used cell.
pub fn compact(
    codes: &[u8],
    first_cell_used: &mut [usize],
    partials: &[usize],
    used_cell_index: &mut [usize],
    used_cell_code: &mut [u8],
    threads: Option<&ThreadPool>,
) {
    let partials = &partials[..scan_partials(codes.len())];
    let index_out = split_at_offsets(used_cell_index, partials);
    let code_out = split_at_offsets(used_cell_code, partials);

    let items: Vec<_> = codes
        .chunks(SCAN_CHUNK)
        .zip(first_cell_used.chunks_mut(SCAN_CHUNK))
        .zip(index_out.into_iter().zip(code_out))
        .enumerate()
        .collect();
    for_each_item(threads, items, |(c, ((codes, first), (index, code)))| {
        let base = c * SCAN_CHUNK;
        let mut k = 0;
        for (i, (m, f)) in codes.iter().zip(first.iter_mut()).enumerate() {
            if CellMask::new(*m).is_uniform() {
                *f = NOT_USED;
            } else {
                index[k] = base + i;
                code[k] = *m;
                k += 1;
            }
        }
        debug_assert_eq!(k, index.len());
    });
}

/// Computes per-used-cell output offsets, returning the total
///
/// `count` maps a configuration to the number of elements it emits.
pub fn offsets(
    used_cell_code: &[u8],
    out: &mut [usize],
    partials: &mut [usize],
    count: fn(CellMask) -> usize,
    threads: Option<&ThreadPool>,
    min_len: usize,
) -> usize {
    for_each_mut(threads, min_len, out, |u, o| {
        *o = count(CellMask::new(used_cell_code[u]));
    });
    exclusive_scan(out, partials, threads)
}

/// Number of vertices emitted by a configuration
pub fn vert_count(m: CellMask) -> usize {
    case(m).vert_count()
}

/// Number of triangles emitted by a configuration
pub fn tri_count(m: CellMask) -> usize {
    case(m).tri_count()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scan_small() {
        let mut data = vec![3, 0, 2, 5];
        let mut partials = vec![0; 1];
        let total = exclusive_scan(&mut data, &mut partials, None);
        assert_eq!(data, vec![0, 3, 3, 5]);
        assert_eq!(total, 10);
    }

    #[test]
    fn scan_chunked() {
        let n = SCAN_CHUNK * 3 + 17;
        let input: Vec<usize> = (0..n).map(|i| i % 5).collect();
        let mut expected = Vec::with_capacity(n);
        let mut acc = 0;
        for v in &input {
            expected.push(acc);
            acc += v;
        }

        let pool = ThreadPool::new(3).unwrap();
        let mut data = input.clone();
        let mut partials = vec![0; scan_partials(n)];
        let total = exclusive_scan(&mut data, &mut partials, Some(&pool));
        assert_eq!(total, acc);
        assert_eq!(data, expected);
        assert_eq!(partials[1], expected[SCAN_CHUNK]);
    }

    #[test]
    fn split() {
        let mut data = [0, 1, 2, 3, 4, 5];
        let pieces = split_at_offsets(&mut data, &[0, 2, 2, 5]);
        let lens: Vec<usize> = pieces.iter().map(|p| p.len()).collect();
        assert_eq!(lens, vec![2, 0, 3, 1]);
        assert_eq!(pieces[2][0], 2);
    }

    #[test]
    fn compaction_is_stable() {
        let n = SCAN_CHUNK + 10;
        let mut codes = vec![0u8; n];
        for i in [1, 7, SCAN_CHUNK - 1, SCAN_CHUNK, SCAN_CHUNK + 9] {
            codes[i] = 3;
        }
        codes[20] = 255; // uniform, so not used

        let mut first = vec![0; n];
        let mut partials = vec![0; scan_partials(n)];
        let n_used = count_used(&codes, &mut first, &mut partials, None, 1);
        assert_eq!(n_used, 5);

        let mut index = vec![0; n_used];
        let mut code = vec![0; n_used];
        compact(&codes, &mut first, &partials, &mut index, &mut code, None);
        assert_eq!(index, vec![1, 7, SCAN_CHUNK - 1, SCAN_CHUNK, SCAN_CHUNK + 9]);
        assert!(code.iter().all(|c| *c == 3));
        assert_eq!(first[7], 1);
        assert_eq!(first[SCAN_CHUNK + 9], 4);
        assert_eq!(first[20], NOT_USED);
        assert_eq!(first[0], NOT_USED);
    }

    #[test]
    fn vert_offsets() {
        let codes = [1u8, 3, 1];
        let mut out = vec![0; 3];
        let mut partials = vec![0; 1];
        let total =
            offsets(&codes, &mut out, &mut partials, vert_count, None, 1);
        // case 1 has 3 vertices, case 3 has 4
        assert_eq!(out, vec![0, 3, 7]);
        assert_eq!(total, 10);
    }
}
