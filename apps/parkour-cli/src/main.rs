mod scene_file;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use parkour_bvh::{BvhConfig, BvhManager, GroundProbe, Ray, SphereCast};
use tracing_subscriber::EnvFilter;

use scene_file::{LoadedScene, SceneFile};

#[derive(Parser)]
#[command(name = "parkour-cli", about = "Probe level collision from the command line")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// BVH config file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Build every surface and print registry statistics
    Stats {
        /// Scene file (YAML, or JSON by extension)
        scene: PathBuf,
    },
    /// Closest hit along a ray
    Raycast {
        scene: PathBuf,
        /// Ray origin as x,y,z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        origin: Vec3,
        /// Ray direction as x,y,z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        direction: Vec3,
        /// Maximum distance; defaults to the config's max_ray_distance
        #[arg(long)]
        max_distance: Option<f32>,
        /// Print every surface hit, nearest first
        #[arg(long)]
        all: bool,
    },
    /// Ground height and slope below a point
    Ground {
        scene: PathBuf,
        /// Feet position as x,y,z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        at: Vec3,
    },
    /// First contact of a swept sphere
    SphereCast {
        scene: PathBuf,
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        origin: Vec3,
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        direction: Vec3,
        #[arg(long, default_value = "0.5")]
        radius: f32,
        #[arg(long)]
        max_distance: Option<f32>,
    },
    /// Surfaces touching a sphere
    Overlap {
        scene: PathBuf,
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        center: Vec3,
        #[arg(long, default_value = "0.5")]
        radius: f32,
    },
}

/// Parse "x,y,z" into a vector.
fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z, got {s:?}"));
    }
    let mut v = [0.0f32; 3];
    for (slot, part) in v.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|e| format!("bad component {part:?}: {e}"))?;
    }
    Ok(Vec3::from_array(v))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BvhConfig> {
    match path {
        Some(path) => BvhConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(BvhConfig::default()),
    }
}

/// Load the scene and register every surface that has geometry.
fn prepare(scene: &Path, config: BvhConfig) -> anyhow::Result<(LoadedScene, BvhManager)> {
    let loaded = SceneFile::load(scene)?.build()?;
    let mut bvh = BvhManager::new(config);
    let built = bvh.build_all(&loaded.scene);
    tracing::info!(
        surfaces = loaded.scene.surface_count(),
        built,
        "registered scene surfaces"
    );
    Ok((loaded, bvh))
}

fn fmt_vec(v: Vec3) -> String {
    format!("({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("parkour-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("scene: {}", parkour_scene::crate_info());
            println!("bvh: {}", parkour_bvh::crate_info());
            println!(
                "config: refresh={:?}, max_ray_distance={}, share_geometry={}",
                config.refresh_interval(),
                config.max_ray_distance,
                config.share_geometry
            );
        }
        Commands::Stats { scene } => {
            let (loaded, bvh) = prepare(&scene, config)?;
            println!("{}", bvh.stats());
            for id in bvh.surfaces() {
                if let Some(entry) = bvh.get(id) {
                    let bounds = entry.world_bounds();
                    println!(
                        "  {:<16} triangles={:<6} bounds={}..{}",
                        loaded.label(id),
                        entry.triangle_count(),
                        fmt_vec(bounds.min),
                        fmt_vec(bounds.max)
                    );
                }
            }
        }
        Commands::Raycast {
            scene,
            origin,
            direction,
            max_distance,
            all,
        } => {
            let max = max_distance.unwrap_or(config.max_ray_distance);
            let (loaded, bvh) = prepare(&scene, config)?;
            let ray = Ray::new(origin, direction);
            if all {
                let hits = bvh.raycast_all(&ray, max);
                if hits.is_empty() {
                    println!("no hit within {max}");
                }
                for hit in hits {
                    println!(
                        "{} at {} distance={:.3} normal={}",
                        loaded.label(hit.surface),
                        fmt_vec(hit.point),
                        hit.distance,
                        fmt_vec(hit.normal)
                    );
                }
            } else {
                match bvh.raycast(&ray, max) {
                    Some(hit) => println!(
                        "hit {} at {} distance={:.3} normal={}",
                        loaded.label(hit.surface),
                        fmt_vec(hit.point),
                        hit.distance,
                        fmt_vec(hit.normal)
                    ),
                    None => println!("no hit within {max}"),
                }
            }
        }
        Commands::Ground { scene, at } => {
            let probe = GroundProbe::from_config(&config.ground);
            let (loaded, bvh) = prepare(&scene, config)?;
            match probe.probe(&bvh, at) {
                Some(contact) => println!(
                    "ground {} height={:.3} below_feet={:.3} walkable={} normal={}",
                    loaded.label(contact.surface),
                    contact.height,
                    contact.distance,
                    contact.walkable,
                    fmt_vec(contact.normal)
                ),
                None => println!("no ground below {}", fmt_vec(at)),
            }
        }
        Commands::SphereCast {
            scene,
            origin,
            direction,
            radius,
            max_distance,
        } => {
            let max = max_distance.unwrap_or(config.max_ray_distance);
            let (loaded, bvh) = prepare(&scene, config)?;
            let cast = SphereCast::new(origin, direction, radius, max);
            match bvh.sphere_cast(&cast) {
                Some(hit) => println!(
                    "hit {} center={} contact={} distance={:.3}",
                    loaded.label(hit.surface),
                    fmt_vec(hit.center),
                    fmt_vec(hit.point),
                    hit.distance
                ),
                None => println!("no hit within {max}"),
            }
        }
        Commands::Overlap {
            scene,
            center,
            radius,
        } => {
            let (loaded, bvh) = prepare(&scene, config)?;
            let touching = bvh.overlapping(center, radius);
            println!("{} surface(s) touching", touching.len());
            for id in touching {
                println!("  {}", loaded.label(id));
            }
        }
    }

    Ok(())
}
