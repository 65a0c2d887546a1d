//! Strongly-typed values used throughout extraction
//!
//! Cell corners and edges follow the classic marching cubes numbering, which
//! is what the case tables in [`crate::tables`] are written against:
//!
//! ```text
//!         7 -------- 6
//!        /          /       Z
//!       / |        / |      ^  _ Y
//!      4----------5  |      | /
//!      |  |       |  |      |/
//!      |  3-------|--2      ---> X
//!      | /        | /
//!      |/         |/
//!      0----------1
//! ```
use serde::{Deserialize, Serialize};

/// A point in grid-index space
pub type Position = nalgebra::Vector3<f32>;

/// Three indices into the output vertex array
pub type Triangle = nalgebra::Vector3<usize>;

/// Number of channels in a [`Feature`]
pub const FEATURE_SIZE: usize = 8;

/// Fixed-size feature vector attached to every grid sample
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature(pub [f32; FEATURE_SIZE]);

static_assertions::const_assert_eq!(
    std::mem::size_of::<Feature>(),
    FEATURE_SIZE * std::mem::size_of::<f32>()
);

impl Feature {
    /// Builds a feature with every channel set to `v`
    pub const fn splat(v: f32) -> Self {
        Self([v; FEATURE_SIZE])
    }

    /// Returns the all-zero feature
    pub const fn zeros() -> Self {
        Self::splat(0.0)
    }

    /// Inner product of two features
    pub fn dot(&self, other: &Feature) -> f32 {
        self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum()
    }

    /// Returns `a + (b - a) * t`
    pub fn lerp(a: &Feature, b: &Feature, t: f32) -> Feature {
        *a + (*b - *a) * t
    }

    fn zip_with(self, rhs: Feature, f: impl Fn(f32, f32) -> f32) -> Feature {
        let mut out = self;
        for (o, r) in out.0.iter_mut().zip(rhs.0) {
            *o = f(*o, r);
        }
        out
    }
}

impl From<[f32; FEATURE_SIZE]> for Feature {
    fn from(v: [f32; FEATURE_SIZE]) -> Self {
        Self(v)
    }
}

impl std::ops::Index<usize> for Feature {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        &self.0[i]
    }
}

impl std::ops::IndexMut<usize> for Feature {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.0[i]
    }
}

impl std::ops::Add for Feature {
    type Output = Feature;
    fn add(self, rhs: Feature) -> Feature {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl std::ops::Sub for Feature {
    type Output = Feature;
    fn sub(self, rhs: Feature) -> Feature {
        self.zip_with(rhs, |a, b| a - b)
    }
}

/// Component-wise product
impl std::ops::Mul<Feature> for Feature {
    type Output = Feature;
    fn mul(self, rhs: Feature) -> Feature {
        self.zip_with(rhs, |a, b| a * b)
    }
}

impl std::ops::Mul<f32> for Feature {
    type Output = Feature;
    fn mul(self, rhs: f32) -> Feature {
        self.zip_with(self, |a, _| a * rhs)
    }
}

impl std::ops::AddAssign for Feature {
    fn add_assign(&mut self, rhs: Feature) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for Feature {
    fn sub_assign(&mut self, rhs: Feature) {
        *self = *self - rhs;
    }
}

impl std::ops::MulAssign<f32> for Feature {
    fn mul_assign(&mut self, rhs: f32) {
        *self = *self * rhs;
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Offset of each corner relative to the cell's minimum corner
const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Start and end corner of each edge
const EDGE_CORNERS: [(u8, u8); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Strongly-typed cell corner, in the 0-8 range
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Corner(u8);

impl Corner {
    /// Builds a new corner
    ///
    /// # Panics
    /// If `i >= 8`, which is not a valid corner index
    pub const fn new(i: u8) -> Self {
        assert!(i < 8);
        Self(i)
    }
    /// Returns the value of this corner as an index
    pub fn index(self) -> usize {
        self.0 as usize
    }
    /// Iterates over all 8 corners
    pub fn iter() -> impl Iterator<Item = Self> {
        (0..8).map(Corner)
    }
    /// Returns the `(dx, dy, dz)` offset from the cell's minimum corner
    pub fn offset(self) -> [usize; 3] {
        CORNER_OFFSETS[self.index()]
    }
}

/// An edge within a cell, in the 0-12 range
///
/// Edges are directed from [`Edge::start`] to [`Edge::end`]; interpolation
/// parameters are measured along that direction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Edge(u8);

impl Edge {
    /// Builds a new edge
    ///
    /// # Panics
    /// If `i >= 12`, since that's an invalid edge
    pub const fn new(i: u8) -> Self {
        assert!(i < 12);
        Self(i)
    }
    /// Converts from an edge to an index
    pub fn index(self) -> usize {
        self.0 as usize
    }
    /// Iterates over all 12 edges
    pub fn iter() -> impl Iterator<Item = Self> {
        (0..12).map(Edge)
    }
    /// Returns the starting corner
    pub fn start(self) -> Corner {
        Corner(EDGE_CORNERS[self.index()].0)
    }
    /// Returns the ending corner
    pub fn end(self) -> Corner {
        Corner(EDGE_CORNERS[self.index()].1)
    }
}

/// Bitmask of which corners in a cell are inside the surface
///
/// This is the configuration code used to index the case tables.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CellMask(u8);

impl CellMask {
    /// Builds a new `CellMask`
    pub const fn new(i: u8) -> Self {
        Self(i)
    }

    /// Builds a mask from corner values, marking those below `iso` as inside
    pub fn from_values(values: &[f32; 8], iso: f32) -> Self {
        let mut mask = 0;
        for (i, v) in values.iter().enumerate() {
            if *v < iso {
                mask |= 1 << i;
            }
        }
        Self(mask)
    }

    /// Returns the bitmask as an index
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw configuration code
    pub fn code(self) -> u8 {
        self.0
    }

    /// Checks whether every corner is on the same side of the surface
    pub fn is_uniform(self) -> bool {
        self.0 == 0 || self.0 == u8::MAX
    }

    /// Checks whether the given edge has a sign change
    pub fn crosses(self, e: Edge) -> bool {
        (self & e.start()) != (self & e.end())
    }
}

impl std::ops::BitAnd<Corner> for CellMask {
    type Output = bool;
    fn bitand(self, c: Corner) -> bool {
        (self.0 & (1 << c.index())) != 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn feature_ops() {
        let mut a = Feature::splat(1.0);
        let mut b = Feature::zeros();
        for i in 0..FEATURE_SIZE {
            b[i] = i as f32;
        }
        assert_eq!((a + b)[3], 4.0);
        assert_eq!((b - a)[0], -1.0);
        assert_eq!((b * b)[2], 4.0);
        assert_eq!((b * 0.5)[4], 2.0);
        assert_eq!(a.dot(&b), 28.0);

        a += b;
        assert_eq!(a[7], 8.0);
        a -= b;
        assert_eq!(a, Feature::splat(1.0));
        a *= 3.0;
        assert_eq!(a, Feature::splat(3.0));

        let m = Feature::lerp(&Feature::zeros(), &b, 0.25);
        assert_eq!(m[4], 1.0);
    }

    #[test]
    fn edges_are_axis_aligned() {
        for e in Edge::iter() {
            let a = e.start().offset();
            let b = e.end().offset();
            let diff = (0..3).filter(|&i| a[i] != b[i]).count();
            assert_eq!(diff, 1, "edge {e:?} is not axis-aligned");
        }
    }

    #[test]
    fn mask_crossings() {
        let m = CellMask::from_values(
            &[-1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            0.0,
        );
        assert_eq!(m.code(), 1);
        assert!(!m.is_uniform());
        let crossed: Vec<usize> =
            Edge::iter().filter(|e| m.crosses(*e)).map(Edge::index).collect();
        assert_eq!(crossed, vec![0, 3, 8]);

        assert!(CellMask::from_values(&[2.0; 8], 0.0).is_uniform());
        assert!(CellMask::from_values(&[-2.0; 8], 0.0).is_uniform());

        // Values equal to the isovalue are outside
        assert!(CellMask::from_values(&[0.0; 8], 0.0).is_uniform());
    }
}
