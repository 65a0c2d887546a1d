//! Lock-free floating-point accumulators
//!
//! Several cells may scatter gradient into the same grid sample at once, so
//! plain `+=` on shared storage is not enough.  These types wrap an
//! [`AtomicU32`] holding the bits of an `f32` and add with a CAS loop.
use crate::types::{FEATURE_SIZE, Feature};
use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` supporting atomic addition
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    /// Builds a new atomic value
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    /// Reads the current value
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Overwrites the current value
    pub fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed)
    }

    /// Adds `v`, returning the previous value
    pub fn fetch_add(&self, v: f32) -> f32 {
        let mut prev = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(prev) + v).to_bits();
            match self.0.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(p) => return f32::from_bits(p),
                Err(p) => prev = p,
            }
        }
    }
}

/// A [`Feature`] whose channels can be accumulated atomically
///
/// Each channel is updated independently; a concurrent reader may observe a
/// partially-applied addition, which is fine for pure accumulation.
#[derive(Debug, Default)]
pub struct AtomicFeature([AtomicF32; FEATURE_SIZE]);

impl AtomicFeature {
    /// Adds every channel of `f`
    pub fn fetch_add(&self, f: &Feature) {
        for (a, v) in self.0.iter().zip(f.0) {
            if v != 0.0 {
                a.fetch_add(v);
            }
        }
    }

    /// Reads the current value
    pub fn load(&self) -> Feature {
        let mut out = Feature::zeros();
        for (o, a) in out.0.iter_mut().zip(&self.0) {
            *o = a.load();
        }
        out
    }

    /// Resets every channel to zero
    pub fn clear(&self) {
        for a in &self.0 {
            a.store(0.0);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_add() {
        let a = AtomicF32::new(0.0);
        (0..1000).into_par_iter().for_each(|_| {
            a.fetch_add(1.0);
        });
        assert_eq!(a.load(), 1000.0);
    }

    #[test]
    fn feature_add() {
        let f = AtomicFeature::default();
        let mut g = Feature::zeros();
        g[2] = 0.5;
        g[7] = -1.0;
        (0..64).into_par_iter().for_each(|_| f.fetch_add(&g));
        let out = f.load();
        assert_eq!(out[2], 32.0);
        assert_eq!(out[7], -64.0);
        assert_eq!(out[0], 0.0);

        f.clear();
        assert_eq!(f.load(), Feature::zeros());
    }
}
