//! Differentiable marching cubes on dense scalar grids
//!
//! A [`MarchingCubes`] context extracts a triangle mesh from a grid of scalar
//! values at a chosen isovalue, carrying an 8-component [`Feature`] from every
//! grid sample through to the output vertices.  It can then run the reverse
//! pass: given the gradient of some objective with respect to each output
//! vertex and feature, it accumulates the gradient with respect to every
//! input scalar and feature.
//!
//! Extraction runs as a sequence of data-parallel stages:
//! - classify every cell against the isovalue
//! - compact the cells that cross the surface, and compute output offsets by
//!   prefix sum
//! - grow storage to fit the output
//! - generate vertices (one per crossing edge per cell) and triangles
//!
//! Each stage runs on a [`ThreadPool`], or in the calling thread if none is
//! given.  Results are independent of the thread count.
//!
//! ```
//! use dmc::{Feature, MarchingCubes, Position};
//!
//! // Sample a sphere of radius 6 on a 16³ grid
//! let n = 16;
//! let mut sdfs = vec![];
//! for x in 0..n {
//!     for y in 0..n {
//!         for z in 0..n {
//!             let p = Position::new(x as f32, y as f32, z as f32)
//!                 - Position::repeat(7.5);
//!             sdfs.push(p.norm() - 6.0);
//!         }
//!     }
//! }
//! let feats = vec![Feature::zeros(); sdfs.len()];
//!
//! let mut mc = MarchingCubes::new(n, n, n)?;
//! mc.forward(&sdfs, &feats, [n, n, n], 0.0, None)?;
//! assert!(mc.n_tris() > 0);
//!
//! let mesh = mc.mesh();
//! for v in &mesh.vertices {
//!     let r = (v - Position::repeat(7.5)).norm();
//!     assert!((r - 6.0).abs() < 0.5);
//! }
//! # Ok::<(), dmc::Error>(())
//! ```
pub mod adjoint;
pub mod classify;
pub mod generate;
pub mod scan;
pub mod tables;

mod atomic;
mod config;
mod context;
mod error;
mod grid;
mod mesh;
mod storage;
mod types;

pub use atomic::{AtomicF32, AtomicFeature};
pub use config::{GrowthPolicy, Settings, ThreadPool};
pub use context::MarchingCubes;
pub use error::Error;
pub use generate::{VertexSource, VertexTag};
pub use grid::Dims;
pub use mesh::Mesh;
pub use storage::{Capacity, NOT_USED};
pub use types::{CellMask, Corner, Edge, FEATURE_SIZE, Feature, Position, Triangle};
