use anyhow::Result;
use clap::Parser;
use env_logger;
use nalgebra::base::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use mcf_skel_3d::params::{PoissonParams, SkeletonParams};
use mcf_skel_3d::reconstruction::poisson;
use mcf_skel_3d::skeletonize_pcd_with_params;

/// Fibonacci sampling of the unit sphere, positions jittered along the normal
fn sample_sphere(nb_points: usize, noise: f64, rng: &mut StdRng) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    let mut points = Vec::with_capacity(nb_points);
    let mut normals = Vec::with_capacity(nb_points);
    for ind in 0..nb_points {
        let z = 1.0 - 2.0 * (ind as f64 + 0.5) / nb_points as f64;
        let rad = (1.0 - z * z).sqrt();
        let ang = golden * ind as f64;
        let normal = Vector3::new(rad * ang.cos(), rad * ang.sin(), z);
        let point = normal * (1.0 + noise * rng.gen_range(-1.0..=1.0));
        points.push([point[0], point[1], point[2]]);
        normals.push([normal[0], normal[1], normal[2]]);
    }
    (points, normals)
}

/// Random samples of a closed cylinder along z
fn sample_cylinder(nb_points: usize, length: f64, radius: f64, rng: &mut StdRng) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    let side_area = 2.0 * std::f64::consts::PI * radius * length;
    let cap_area = std::f64::consts::PI * radius * radius;
    let mut points = Vec::with_capacity(nb_points);
    let mut normals = Vec::with_capacity(nb_points);
    for _ in 0..nb_points {
        let ang = rng.gen_range(0.0..2.0 * std::f64::consts::PI);
        let pick = rng.gen_range(0.0..side_area + 2.0 * cap_area);
        if pick < side_area {
            let z = rng.gen_range(0.0..length);
            points.push([radius * ang.cos(), radius * ang.sin(), z]);
            normals.push([ang.cos(), ang.sin(), 0.0]);
        } else {
            let rad = radius * rng.gen_range(0.0_f64..1.0).sqrt();
            let top = pick > side_area + cap_area;
            let (z, nz) = if top { (length, 1.0) } else { (0.0, -1.0) };
            points.push([rad * ang.cos(), rad * ang.sin(), z]);
            normals.push([0.0, 0.0, nz]);
        }
    }
    (points, normals)
}

#[derive(Parser)]
struct Cli {
    #[arg(default_value = "3000", long = "points")]
    nb_points: usize,
    #[arg(default_value = "0.005", long = "noise")]
    noise: f64,
    #[arg(long = "depth")]
    depth: Option<usize>,
    #[arg(long = "cylinder")]
    cylinder: bool,
    #[arg(default_value = "42", long = "seed")]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let params = match args.depth {
        Some(depth) => PoissonParams::with_depth(depth),
        None => PoissonParams::default(),
    };

    let (points, normals) = sample_sphere(args.nb_points, args.noise, &mut rng);

    println!("Poisson reconstruction of a sampled sphere");
    let now = Instant::now();
    let (vertices, triangles, report) = poisson::reconstruct(&points, &normals, &params)?;
    let duration = now.elapsed();
    let sec = duration.as_secs();
    let min = sec / 60;
    let sec = sec - min * 60;
    println!("Reconstruction computed in {}m{}s", min, sec);
    println!(
        "Depth {}, average spacing {:.4}, iso value {:.4e}, {} solver iterations",
        report.depth, report.average_spacing, report.iso_value, report.solver_iterations
    );
    let max_dev = vertices
        .iter()
        .map(|vert| (Vector3::new(vert[0], vert[1], vert[2]).norm() - 1.0).abs())
        .fold(0.0, f64::max);
    println!(
        "Mesh: {} vertices, {} triangles, max distance to the sphere {:.4}",
        vertices.len(),
        triangles.len(),
        max_dev
    );
    println!("");

    if args.cylinder {
        let (points, normals) = sample_cylinder(args.nb_points, 4.0, 0.5, &mut rng);
        println!("Skeletonization of a sampled cylinder");
        let now = Instant::now();
        let (nodes, edges) =
            skeletonize_pcd_with_params(&points, &normals, &params, &SkeletonParams::default())?;
        let duration = now.elapsed();
        let sec = duration.as_secs();
        let min = sec / 60;
        let sec = sec - min * 60;
        println!("Skeleton computed in {}m{}s", min, sec);
        println!("Skeleton: {} nodes, {} edges", nodes.len(), edges.len());
    }

    Ok(())
}
