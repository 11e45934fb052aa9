use anyhow::Result;
use clap::{Parser, ValueEnum};
use env_logger;
use std::time::Instant;

use mcf_skel_3d::algorithm::skeleton_alg;
use mcf_skel_3d::mesh3d::HalfedgeMesh3D;
use mcf_skel_3d::params::{ContractionParams, SkeletonParams};

fn generate_cylinder(nb_rings: usize, nb_segments: usize, length: f64, radius: f64) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for ring in 0..nb_rings {
        let z = length * (ring as f64) / ((nb_rings - 1) as f64);
        for seg in 0..nb_segments {
            let ang = 2.0 * std::f64::consts::PI * (seg as f64) / (nb_segments as f64);
            vertices.push([radius * ang.cos(), radius * ang.sin(), z]);
        }
    }
    let bottom = vertices.len();
    vertices.push([0.0, 0.0, 0.0]);
    let top = vertices.len();
    vertices.push([0.0, 0.0, length]);

    let ind = |ring: usize, seg: usize| ring * nb_segments + seg % nb_segments;
    for ring in 0..nb_rings - 1 {
        for seg in 0..nb_segments {
            faces.push([ind(ring, seg), ind(ring, seg + 1), ind(ring + 1, seg + 1)]);
            faces.push([ind(ring, seg), ind(ring + 1, seg + 1), ind(ring + 1, seg)]);
        }
    }
    for seg in 0..nb_segments {
        faces.push([bottom, ind(0, seg + 1), ind(0, seg)]);
        faces.push([top, ind(nb_rings - 1, seg), ind(nb_rings - 1, seg + 1)]);
    }
    (vertices, faces)
}

fn generate_torus(nb_major: usize, nb_minor: usize, major_radius: f64, minor_radius: f64) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for i in 0..nb_major {
        let theta = 2.0 * std::f64::consts::PI * (i as f64) / (nb_major as f64);
        for j in 0..nb_minor {
            let phi = 2.0 * std::f64::consts::PI * (j as f64) / (nb_minor as f64);
            let rad = major_radius + minor_radius * phi.cos();
            vertices.push([rad * theta.cos(), rad * theta.sin(), minor_radius * phi.sin()]);
        }
    }
    let ind = |i: usize, j: usize| (i % nb_major) * nb_minor + j % nb_minor;
    for i in 0..nb_major {
        for j in 0..nb_minor {
            faces.push([ind(i, j), ind(i + 1, j), ind(i + 1, j + 1)]);
            faces.push([ind(i, j), ind(i + 1, j + 1), ind(i, j + 1)]);
        }
    }
    (vertices, faces)
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Cylinder,
    Torus,
}

#[derive(Parser)]
struct Cli {
    #[arg(value_enum, default_value = "cylinder", long = "shape")]
    shape: Shape,
    #[arg(default_value = "20", long = "rings")]
    nb_rings: usize,
    #[arg(default_value = "10", long = "segments")]
    nb_segments: usize,
    #[arg(default_value = "500", long = "maxiter")]
    max_iterations: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let (vertices, faces) = match args.shape {
        Shape::Cylinder => generate_cylinder(args.nb_rings.max(2), args.nb_segments.max(3), 10.0, 0.5),
        Shape::Torus => generate_torus(args.nb_rings.max(3), args.nb_segments.max(3), 2.0, 0.5),
    };
    println!("Mesh: {} vertices, {} faces", vertices.len(), faces.len());
    println!("");

    println!("Checking mesh");
    let mesh = HalfedgeMesh3D::from_arrays(&vertices, &faces)?;
    mesh.check_mesh()?;
    println!("Closed mesh: {}", mesh.is_closed());
    println!("");

    let params = SkeletonParams {
        contraction: ContractionParams::with_max_iterations(args.max_iterations),
        ..Default::default()
    };

    println!("Skeletonization");
    let now = Instant::now();
    let (skeleton, corres, report) = skeleton_alg::mesh_skeletonization(&vertices, &faces, &params)?;
    let duration = now.elapsed();
    let sec = duration.as_secs();
    let min = sec / 60;
    let sec = sec - min * 60;
    println!("Skeleton computed in {}m{}s", min, sec);
    println!("");

    println!(
        "Contraction: {} iterations ({:?}), {} merges, {} fallbacks",
        report.iterations, report.stop_reason, report.nb_merges, report.nb_fallbacks
    );
    println!(
        "Skeleton: {} nodes, {} edges, connected: {}",
        skeleton.get_nb_nodes(),
        skeleton.get_nb_edges(),
        skeleton.is_connected()
    );
    for (ind_node, node) in skeleton.get_nodes().iter().enumerate() {
        let nb_vertices = corres.iter().filter(|&&ind| ind == ind_node).count();
        println!(
            "  node {}: ({:.3}, {:.3}, {:.3}), degree {}, {} mesh vertices",
            ind_node,
            node[0],
            node[1],
            node[2],
            skeleton.degree(ind_node),
            nb_vertices
        );
    }

    Ok(())
}
