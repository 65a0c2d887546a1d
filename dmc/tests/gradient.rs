use approx::assert_relative_eq;
use dmc::{Feature, MarchingCubes, Position, Settings, ThreadPool};
use rand::{Rng, SeedableRng, rngs::StdRng};

const DIMS: [usize; 3] = [5, 5, 5];
const ISO: f32 = 0.25;
const EPS: f32 = 5e-3;

/// Builds a random grid whose values stay well away from the isovalue, so
/// that small perturbations never change the mesh topology
fn grid(rng: &mut StdRng) -> (Vec<f32>, Vec<Feature>) {
    let n: usize = DIMS.iter().product();
    let sdfs = (0..n)
        .map(|_| {
            let v = rng.gen_range(0.5..1.5);
            if rng.gen_bool(0.5) { v } else { -v }
        })
        .collect();
    let feats = (0..n)
        .map(|_| Feature(std::array::from_fn(|_| rng.gen_range(-1.0..1.0))))
        .collect();
    (sdfs, feats)
}

/// Linear objective over the output mesh, `Σ w·v + Σ u·f`
struct Objective {
    w: Vec<Position>,
    u: Vec<Feature>,
}

impl Objective {
    fn new(rng: &mut StdRng, n_verts: usize) -> Self {
        let w = (0..n_verts)
            .map(|_| {
                Position::from_fn(|_, _| rng.gen_range(-1.0..1.0))
            })
            .collect();
        let u = (0..n_verts)
            .map(|_| Feature(std::array::from_fn(|_| rng.gen_range(-1.0..1.0))))
            .collect();
        Self { w, u }
    }

    fn eval(&self, mc: &MarchingCubes) -> f64 {
        let mut out = 0.0;
        for (w, v) in self.w.iter().zip(mc.vertices()) {
            out += w.dot(v) as f64;
        }
        for (u, f) in self.u.iter().zip(mc.features()) {
            out += u.dot(f) as f64;
        }
        out
    }
}

fn gradients(
    mc: &mut MarchingCubes,
    sdfs: &[f32],
    feats: &[Feature],
    obj: &Objective,
    iso: f32,
    threads: Option<&ThreadPool>,
) -> (Vec<f32>, Vec<Feature>) {
    let mut adj_sdfs = vec![0.0; sdfs.len()];
    let mut adj_feats = vec![Feature::zeros(); sdfs.len()];
    mc.backward(
        sdfs,
        feats,
        &obj.w,
        &obj.u,
        &mut adj_sdfs,
        &mut adj_feats,
        iso,
        threads,
    )
    .unwrap();
    (adj_sdfs, adj_feats)
}

#[test]
fn matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(1234);
    let (mut sdfs, mut feats) = grid(&mut rng);
    let mut mc = MarchingCubes::new(DIMS[0], DIMS[1], DIMS[2]).unwrap();
    mc.forward(&sdfs, &feats, DIMS, ISO, None).unwrap();
    let n_verts = mc.n_verts();
    let n_tris = mc.n_tris();
    assert!(n_verts > 0);

    let obj = Objective::new(&mut rng, n_verts);
    let (adj_sdfs, adj_feats) = gradients(&mut mc, &sdfs, &feats, &obj, ISO, None);

    let mut eval = |sdfs: &[f32], feats: &[Feature]| {
        mc.forward(sdfs, feats, DIMS, ISO, None).unwrap();
        assert_eq!(mc.n_verts(), n_verts);
        assert_eq!(mc.n_tris(), n_tris);
        obj.eval(&mc)
    };

    for i in 0..sdfs.len() {
        let v = sdfs[i];
        sdfs[i] = v + EPS;
        let hi = eval(&sdfs, &feats);
        sdfs[i] = v - EPS;
        let lo = eval(&sdfs, &feats);
        sdfs[i] = v;

        let fd = (hi - lo) / (2.0 * EPS as f64);
        assert_relative_eq!(
            fd,
            adj_sdfs[i] as f64,
            epsilon = 1e-2,
            max_relative = 1e-2
        );
    }

    for i in 0..feats.len() {
        for k in [0, 5] {
            let v = feats[i][k];
            feats[i][k] = v + EPS;
            let hi = eval(&sdfs, &feats);
            feats[i][k] = v - EPS;
            let lo = eval(&sdfs, &feats);
            feats[i][k] = v;

            let fd = (hi - lo) / (2.0 * EPS as f64);
            assert_relative_eq!(
                fd,
                adj_feats[i][k] as f64,
                epsilon = 1e-3,
                max_relative = 1e-3
            );
        }
    }
}

#[test]
fn untouched_samples_get_no_gradient() {
    let mut rng = StdRng::seed_from_u64(99);
    let (sdfs, feats) = grid(&mut rng);
    let mut mc = MarchingCubes::new(DIMS[0], DIMS[1], DIMS[2]).unwrap();
    mc.forward(&sdfs, &feats, DIMS, ISO, None).unwrap();
    let obj = Objective::new(&mut rng, mc.n_verts());
    let (adj_sdfs, adj_feats) = gradients(&mut mc, &sdfs, &feats, &obj, ISO, None);

    // Only edge endpoints of output vertices can receive gradient
    let mut touched = vec![false; sdfs.len()];
    for i in 0..mc.n_verts() {
        let s = mc.vertex_source(i).unwrap();
        touched[s.start] = true;
        touched[s.end] = true;
    }
    for (i, t) in touched.iter().enumerate() {
        if !t {
            assert_eq!(adj_sdfs[i], 0.0);
            assert_eq!(adj_feats[i], Feature::zeros());
        }
    }
}

#[test]
fn backward_accumulates() {
    let mut rng = StdRng::seed_from_u64(7);
    let (sdfs, feats) = grid(&mut rng);
    let mut mc = MarchingCubes::new(DIMS[0], DIMS[1], DIMS[2]).unwrap();
    mc.forward(&sdfs, &feats, DIMS, ISO, None).unwrap();
    let obj = Objective::new(&mut rng, mc.n_verts());
    let (once, once_f) = gradients(&mut mc, &sdfs, &feats, &obj, ISO, None);

    let mut adj_sdfs = once.clone();
    let mut adj_feats = once_f.clone();
    mc.backward(
        &sdfs,
        &feats,
        &obj.w,
        &obj.u,
        &mut adj_sdfs,
        &mut adj_feats,
        ISO,
        None,
    )
    .unwrap();
    for (a, b) in adj_sdfs.iter().zip(&once) {
        assert_eq!(*a, 2.0 * b);
    }
    for (a, b) in adj_feats.iter().zip(&once_f) {
        assert_eq!(*a, *b * 2.0);
    }
}

#[test]
fn parallel_matches_serial() {
    let n = 24;
    let dims = [n, n, n];
    let mut rng = StdRng::seed_from_u64(42);
    let center = Position::repeat(11.5);
    let mut sdfs = vec![];
    for x in 0..n {
        for y in 0..n {
            for z in 0..n {
                let p = Position::new(x as f32, y as f32, z as f32);
                sdfs.push((p - center).norm() - 8.0 + rng.gen_range(-0.2..0.2));
            }
        }
    }
    let feats: Vec<Feature> = (0..sdfs.len())
        .map(|_| Feature(std::array::from_fn(|_| rng.gen_range(-1.0..1.0))))
        .collect();

    let settings = Settings {
        min_len: 32,
        ..Settings::default()
    };
    let mut serial = MarchingCubes::with_settings(n, n, n, settings).unwrap();
    serial.forward(&sdfs, &feats, dims, 0.0, None).unwrap();
    let obj = Objective::new(&mut rng, serial.n_verts());
    let (a, af) = gradients(&mut serial, &sdfs, &feats, &obj, 0.0, None);

    let pool = ThreadPool::new(4).unwrap();
    let mut par = MarchingCubes::with_settings(n, n, n, settings).unwrap();
    par.forward(&sdfs, &feats, dims, 0.0, Some(&pool)).unwrap();
    assert_eq!(par.vertices(), serial.vertices());
    let (b, bf) = gradients(&mut par, &sdfs, &feats, &obj, 0.0, Some(&pool));

    // Atomic accumulation order varies, so allow for rounding
    for (a, b) in a.iter().zip(&b) {
        assert_relative_eq!(*a, *b, epsilon = 1e-4, max_relative = 1e-4);
    }
    for (a, b) in af.iter().zip(&bf) {
        for k in 0..dmc::FEATURE_SIZE {
            assert_relative_eq!(a[k], b[k], epsilon = 1e-4, max_relative = 1e-4);
        }
    }
}
