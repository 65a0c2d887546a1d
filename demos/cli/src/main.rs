use std::io::BufWriter;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;

use dmc::{Feature, GrowthPolicy, MarchingCubes, Position, Settings, ThreadPool};

/// Marching cubes test program
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extracts a mesh and optionally saves it
    Mesh {
        #[clap(flatten)]
        settings: GridSettings,

        /// Name of the file to write
        #[clap(short, long)]
        out: Option<PathBuf>,

        /// Output file format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Stl)]
        format: OutputFormat,
    },

    /// Extracts a mesh, then pushes every vertex outward and reports the
    /// resulting gradient on the grid
    Grad {
        #[clap(flatten)]
        settings: GridSettings,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum Shape {
    Sphere,
    Torus,
    Box,
    Gyroid,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    /// Binary STL
    Stl,
    /// `bincode`-encoded vertices, features, and triangles
    Bincode,
}

#[derive(Parser)]
struct GridSettings {
    /// Shape to sample
    #[clap(short, long, value_enum, default_value_t = Shape::Sphere)]
    shape: Shape,

    /// Number of samples along each axis
    #[clap(short, long, default_value_t = 64)]
    resolution: usize,

    /// Isovalue
    #[clap(long, default_value_t = 0.0)]
    iso: f32,

    /// Number of threads to use
    #[clap(short, long)]
    threads: Option<NonZeroUsize>,

    /// Allocate exactly what each call needs, instead of growing geometrically
    #[clap(long)]
    exact: bool,

    /// Number of times to run (for benchmarking)
    #[clap(short = 'N', default_value_t = 1)]
    n: usize,
}

////////////////////////////////////////////////////////////////////////////////

impl Shape {
    /// Evaluates the shape's distance field in the `[-1, 1]` cube
    fn eval(self, p: Position) -> f32 {
        match self {
            Shape::Sphere => p.norm() - 0.7,
            Shape::Torus => {
                let q = (p.x.powi(2) + p.y.powi(2)).sqrt() - 0.55;
                (q.powi(2) + p.z.powi(2)).sqrt() - 0.2
            }
            Shape::Box => {
                let q = p.abs() - Position::repeat(0.6);
                q.map(|v| v.max(0.0)).norm() + q.max().min(0.0)
            }
            Shape::Gyroid => {
                let s = p * std::f32::consts::PI * 2.0;
                let g = s.x.sin() * s.y.cos()
                    + s.y.sin() * s.z.cos()
                    + s.z.sin() * s.x.cos();
                (g / 6.0).max(p.norm() - 0.9)
            }
        }
    }
}

/// Sampled grid, with each sample's model-space position as its feature
struct Grid {
    n: usize,
    sdfs: Vec<f32>,
    feats: Vec<Feature>,
}

impl Grid {
    fn sample(shape: Shape, n: usize) -> Self {
        let scale = 2.0 / (n.max(2) - 1) as f32;
        let mut sdfs = Vec::with_capacity(n * n * n);
        let mut feats = Vec::with_capacity(n * n * n);
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    let p = Position::new(x as f32, y as f32, z as f32) * scale
                        - Position::repeat(1.0);
                    sdfs.push(shape.eval(p));
                    let mut f = Feature::zeros();
                    f[0] = p.x;
                    f[1] = p.y;
                    f[2] = p.z;
                    feats.push(f);
                }
            }
        }
        Self { n, sdfs, feats }
    }

    fn dims(&self) -> [usize; 3] {
        [self.n; 3]
    }

    fn center(&self) -> Position {
        Position::repeat((self.n - 1) as f32 / 2.0)
    }
}

fn pool(settings: &GridSettings) -> Result<Option<ThreadPool>> {
    Ok(match settings.threads {
        Some(n) if n.get() == 1 => None,
        Some(n) => Some(ThreadPool::new(n.get())?),
        None => Some(ThreadPool::Global),
    })
}

fn context(settings: &GridSettings) -> Result<MarchingCubes> {
    let growth = if settings.exact {
        GrowthPolicy::Exact
    } else {
        GrowthPolicy::Geometric
    };
    let n = settings.resolution;
    let cfg = Settings {
        growth,
        ..Settings::default()
    };
    Ok(MarchingCubes::with_settings(n, n, n, cfg)?)
}

fn run_mesh(
    settings: &GridSettings,
    out: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let start = Instant::now();
    let grid = Grid::sample(settings.shape, settings.resolution);
    info!("Sampled grid in {:?}", start.elapsed());

    let threads = pool(settings)?;
    let mut mc = context(settings)?;
    let start = Instant::now();
    for _ in 0..settings.n {
        mc.forward(
            &grid.sdfs,
            &grid.feats,
            grid.dims(),
            settings.iso,
            threads.as_ref(),
        )?;
    }
    info!(
        "Extracted {}x at {:?} ms/iter",
        settings.n,
        start.elapsed().as_micros() as f64 / 1000.0 / (settings.n as f64)
    );
    info!(
        "{} used cells, {} vertices, {} triangles",
        mc.n_used_cells(),
        mc.n_verts(),
        mc.n_tris()
    );

    if let Some(path) = out {
        let mesh = mc.mesh();
        let mut f = std::fs::File::create(&path)?;
        match format {
            OutputFormat::Stl => mesh.write_stl(&mut f)?,
            OutputFormat::Bincode => {
                bincode::serialize_into(BufWriter::new(f), &mesh)?
            }
        }
        info!("Wrote {path:?}");
    }
    Ok(())
}

fn run_grad(settings: &GridSettings) -> Result<()> {
    let grid = Grid::sample(settings.shape, settings.resolution);
    let threads = pool(settings)?;
    let mut mc = context(settings)?;
    mc.forward(
        &grid.sdfs,
        &grid.feats,
        grid.dims(),
        settings.iso,
        threads.as_ref(),
    )?;

    // Push every vertex away from the center of the grid
    let center = grid.center();
    let adj_verts: Vec<Position> = mc
        .vertices()
        .iter()
        .map(|v| (v - center).try_normalize(1e-6).unwrap_or_else(Position::zeros))
        .collect();
    let adj_feats = vec![Feature::zeros(); mc.n_verts()];

    let mut adj_sdfs = vec![0.0; grid.sdfs.len()];
    let mut adj_grid = vec![Feature::zeros(); grid.sdfs.len()];
    let start = Instant::now();
    for _ in 0..settings.n {
        adj_sdfs.fill(0.0);
        adj_grid.fill(Feature::zeros());
        mc.backward(
            &grid.sdfs,
            &grid.feats,
            &adj_verts,
            &adj_feats,
            &mut adj_sdfs,
            &mut adj_grid,
            settings.iso,
            threads.as_ref(),
        )?;
    }
    info!(
        "Backward {}x at {:?} ms/iter",
        settings.n,
        start.elapsed().as_micros() as f64 / 1000.0 / (settings.n as f64)
    );

    let norm = adj_sdfs.iter().map(|g| g * g).sum::<f32>().sqrt();
    let max = adj_sdfs.iter().fold(0.0f32, |a, g| a.max(g.abs()));
    let touched = adj_sdfs.iter().filter(|g| **g != 0.0).count();
    let net = adj_sdfs.iter().sum::<f32>();
    info!("{} vertices pushed outward", mc.n_verts());
    info!("scalar gradient: |g| = {norm}, max |g_i| = {max}, sum = {net}");
    info!("{touched} of {} samples received gradient", adj_sdfs.len());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Mesh {
            settings,
            out,
            format,
        } => run_mesh(&settings, out, format),
        Command::Grad { settings } => run_grad(&settings),
    }
}
