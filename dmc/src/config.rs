//! Types used in configuration structures
use crate::Error;
use serde::{Deserialize, Serialize};

/// Thread pool to use for parallel stages
///
/// Most users will use the global Rayon pool, but it's possible to provide your
/// own as well.  Passing `None` instead of a pool runs every stage in the
/// calling thread.
pub enum ThreadPool {
    /// User-provided pool
    Custom(rayon::ThreadPool),
    /// Global Rayon pool
    Global,
}

impl ThreadPool {
    /// Builds a custom pool with the given number of threads
    pub fn new(threads: usize) -> Result<Self, Error> {
        let p = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(ThreadPool::Custom(p))
    }

    /// Runs a function across the thread pool
    pub fn run<F: FnOnce() -> V + Send, V: Send>(&self, f: F) -> V {
        match self {
            ThreadPool::Custom(p) => p.install(f),
            ThreadPool::Global => f(),
        }
    }

    /// Returns the number of threads in the pool
    pub fn thread_count(&self) -> usize {
        match self {
            ThreadPool::Custom(p) => p.current_num_threads(),
            ThreadPool::Global => rayon::current_num_threads(),
        }
    }
}

/// Runs `f` on every element of `out` along with its index
///
/// Work is spread across the pool if one is given; otherwise, it runs in the
/// calling thread.
pub(crate) fn for_each_mut<T, F>(
    threads: Option<&ThreadPool>,
    min_len: usize,
    out: &mut [T],
    f: F,
) where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    use rayon::prelude::*;
    match threads {
        None => out.iter_mut().enumerate().for_each(|(i, o)| f(i, o)),
        Some(p) => p.run(|| {
            out.par_iter_mut()
                .with_min_len(min_len.max(1))
                .enumerate()
                .for_each(|(i, o)| f(i, o))
        }),
    }
}

/// Runs `f` on every index in `0..n`, in parallel if a pool is given
pub(crate) fn for_each_index<F>(
    threads: Option<&ThreadPool>,
    min_len: usize,
    n: usize,
    f: F,
) where
    F: Fn(usize) + Sync + Send,
{
    use rayon::prelude::*;
    match threads {
        None => (0..n).for_each(f),
        Some(p) => p.run(|| {
            (0..n).into_par_iter().with_min_len(min_len.max(1)).for_each(f)
        }),
    }
}

/// Runs `f` on every item, in parallel if a pool is given
pub(crate) fn for_each_item<I, F>(threads: Option<&ThreadPool>, items: Vec<I>, f: F)
where
    I: Send,
    F: Fn(I) + Sync + Send,
{
    use rayon::prelude::*;
    match threads {
        None => items.into_iter().for_each(f),
        Some(p) => p.run(|| items.into_par_iter().for_each(f)),
    }
}

/// Policy used when a buffer must grow
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum GrowthPolicy {
    /// Allocate exactly the requested number of elements
    Exact,
    /// Allocate at least double the previous capacity
    #[default]
    Geometric,
}

impl GrowthPolicy {
    /// Returns the capacity to allocate when `requested` exceeds `current`
    pub fn target(&self, current: usize, requested: usize) -> usize {
        match self {
            GrowthPolicy::Exact => requested,
            GrowthPolicy::Geometric => {
                requested.max(current.saturating_mul(2))
            }
        }
    }
}

/// Settings for a [`MarchingCubes`](crate::MarchingCubes) context
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Storage growth policy
    pub growth: GrowthPolicy,

    /// Minimum number of items handed to a single worker in parallel stages
    pub min_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            growth: GrowthPolicy::default(),
            min_len: 256,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn growth() {
        assert_eq!(GrowthPolicy::Exact.target(100, 101), 101);
        assert_eq!(GrowthPolicy::Geometric.target(100, 101), 200);
        assert_eq!(GrowthPolicy::Geometric.target(100, 500), 500);
        assert_eq!(GrowthPolicy::Geometric.target(0, 3), 3);
    }

    #[test]
    fn custom_pool() {
        let p = ThreadPool::new(2).unwrap();
        assert_eq!(p.thread_count(), 2);
        assert_eq!(p.run(|| 1 + 1), 2);
    }
}
