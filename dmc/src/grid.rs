//! Linear addressing of a dense 3D grid
use crate::{Error, types::Corner};
use serde::{Deserialize, Serialize};

/// Dimensions of a sampled grid, with conversions to and from linear indices
///
/// Samples are stored with Z varying fastest, i.e. the linear index of
/// `(x, y, z)` is `z + nz * (y + ny * x)`.  Cells share this indexing: cell
/// `(x, y, z)` has its minimum corner at sample `(x, y, z)`, so cells on the
/// upper face of any axis are incomplete and never produce geometry.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Dims([usize; 3]);

impl Dims {
    /// Builds a new set of dimensions
    ///
    /// Returns an error if any axis is empty or if the total count overflows
    pub fn new(x: usize, y: usize, z: usize) -> Result<Self, Error> {
        let dims = [x, y, z];
        if dims.contains(&0) {
            return Err(Error::BadDims(dims));
        }
        x.checked_mul(y)
            .and_then(|xy| xy.checked_mul(z))
            .ok_or(Error::BadDims(dims))?;
        Ok(Self(dims))
    }

    /// Returns the raw dimensions
    pub fn get(&self) -> [usize; 3] {
        self.0
    }

    /// Total number of samples (and cells)
    pub fn n_cells(&self) -> usize {
        self.0[0] * self.0[1] * self.0[2]
    }

    /// Converts a 3D position into a linear index
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        z + self.0[2] * (y + self.0[1] * x)
    }

    /// Recovers the X coordinate from a linear index
    #[inline]
    pub fn x(&self, i: usize) -> usize {
        i / (self.0[2] * self.0[1])
    }

    /// Recovers the Y coordinate from a linear index
    #[inline]
    pub fn y(&self, i: usize) -> usize {
        (i / self.0[2]) % self.0[1]
    }

    /// Recovers the Z coordinate from a linear index
    #[inline]
    pub fn z(&self, i: usize) -> usize {
        i % self.0[2]
    }

    /// Recovers all three coordinates from a linear index
    #[inline]
    pub fn pos(&self, i: usize) -> [usize; 3] {
        [self.x(i), self.y(i), self.z(i)]
    }

    /// Checks whether the cell at the given index has all 8 corners in the grid
    #[inline]
    pub fn is_full_cell(&self, i: usize) -> bool {
        let [x, y, z] = self.pos(i);
        x + 1 < self.0[0] && y + 1 < self.0[1] && z + 1 < self.0[2]
    }

    /// Returns the linear index of a corner of the given cell
    ///
    /// The cell must satisfy [`Dims::is_full_cell`]
    #[inline]
    pub fn corner(&self, cell: usize, c: Corner) -> usize {
        let [dx, dy, dz] = c.offset();
        cell + self.index(dx, dy, dz)
    }

    /// Returns the linear indices of all 8 corners of the given cell
    #[inline]
    pub fn corners(&self, cell: usize) -> [usize; 8] {
        let mut out = [0; 8];
        for c in Corner::iter() {
            out[c.index()] = self.corner(cell, c);
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let d = Dims::new(3, 4, 5).unwrap();
        assert_eq!(d.n_cells(), 60);
        for i in 0..d.n_cells() {
            let [x, y, z] = d.pos(i);
            assert!(x < 3 && y < 4 && z < 5);
            assert_eq!(d.index(x, y, z), i);
        }
        assert_eq!(d.index(1, 2, 3), 3 + 5 * (2 + 4));
    }

    #[test]
    fn corners() {
        let d = Dims::new(3, 3, 3).unwrap();
        let cell = d.index(1, 0, 1);
        assert!(d.is_full_cell(cell));
        assert!(!d.is_full_cell(d.index(2, 0, 0)));
        assert!(!d.is_full_cell(d.index(0, 0, 2)));

        let cs = d.corners(cell);
        assert_eq!(cs[0], cell);
        assert_eq!(cs[1], d.index(2, 0, 1));
        assert_eq!(cs[6], d.index(2, 1, 2));
        assert_eq!(cs[7], d.index(1, 1, 2));
    }

    #[test]
    fn bad_dims() {
        assert!(matches!(Dims::new(0, 2, 2), Err(Error::BadDims(..))));
        assert!(matches!(
            Dims::new(usize::MAX, 2, 2),
            Err(Error::BadDims(..))
        ));
    }
}
