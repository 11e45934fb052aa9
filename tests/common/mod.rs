#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Closed cylinder along z: rings of vertices plus one center vertex per cap
pub fn cylinder(nb_rings: usize, nb_segments: usize, length: f64, radius: f64) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for ring in 0..nb_rings {
        let z = length * (ring as f64) / ((nb_rings - 1) as f64);
        for seg in 0..nb_segments {
            let ang = 2.0 * PI * (seg as f64) / (nb_segments as f64);
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

/// Torus around z
pub fn torus(nb_major: usize, nb_minor: usize, major_radius: f64, minor_radius: f64) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for i in 0..nb_major {
        let theta = 2.0 * PI * (i as f64) / (nb_major as f64);
        for j in 0..nb_minor {
            let phi = 2.0 * PI * (j as f64) / (nb_minor as f64);
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

/// Closed box with one corner at the origin, two triangles per side
pub fn box_mesh(size: [f64; 3]) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    // vertex i is corner (i & 1, (i >> 1) & 1, (i >> 2) & 1)
    let vertices = (0..8)
        .map(|ind| {
            [
                size[0] * (ind & 1) as f64,
                size[1] * ((ind >> 1) & 1) as f64,
                size[2] * ((ind >> 2) & 1) as f64,
            ]
        })
        .collect();
    let faces = vec![
        [0, 2, 3],
        [0, 3, 1],
        [4, 5, 7],
        [4, 7, 6],
        [0, 1, 5],
        [0, 5, 4],
        [2, 6, 7],
        [2, 7, 3],
        [0, 4, 6],
        [0, 6, 2],
        [1, 3, 7],
        [1, 7, 5],
    ];
    (vertices, faces)
}

/// Unit square split in two triangles
pub fn planar_quad() -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let vertices = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    (vertices, vec![[0, 1, 2], [0, 2, 3]])
}

/// Fibonacci sampling of the unit sphere with outward normals
pub fn fibonacci_sphere(nb_points: usize) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    let golden = PI * (3.0 - 5.0_f64.sqrt());
    let mut points = Vec::with_capacity(nb_points);
    for ind in 0..nb_points {
        let z = 1.0 - 2.0 * (ind as f64 + 0.5) / nb_points as f64;
        let rad = (1.0 - z * z).sqrt();
        let ang = golden * ind as f64;
        points.push([rad * ang.cos(), rad * ang.sin(), z]);
    }
    (points.clone(), points)
}

/// Random samples of a closed cylinder along z, with outward normals
pub fn sampled_cylinder(nb_points: usize, length: f64, radius: f64, seed: u64) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let side_area = 2.0 * PI * radius * length;
    let cap_area = PI * radius * radius;
    let mut points = Vec::with_capacity(nb_points);
    let mut normals = Vec::with_capacity(nb_points);
    for _ in 0..nb_points {
        let ang = rng.gen_range(0.0..2.0 * PI);
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

/// Checks every edge references existing nodes, without self loop or duplicate
pub fn check_graph(nb_nodes: usize, edges: &[[usize; 2]]) {
    let mut seen = std::collections::HashSet::new();
    for &[ind1, ind2] in edges.iter() {
        assert!(ind1 < nb_nodes && ind2 < nb_nodes);
        assert_ne!(ind1, ind2);
        assert!(seen.insert([ind1.min(ind2), ind1.max(ind2)]));
    }
}

/// Checks the graph is connected
pub fn is_connected(nb_nodes: usize, edges: &[[usize; 2]]) -> bool {
    let mut neighbors = vec![Vec::new(); nb_nodes];
    for &[ind1, ind2] in edges.iter() {
        neighbors[ind1].push(ind2);
        neighbors[ind2].push(ind1);
    }
    let mut visited = vec![false; nb_nodes];
    let mut stack = vec![0];
    visited[0] = true;
    while let Some(ind) = stack.pop() {
        for &ind_neigh in neighbors[ind].iter() {
            if !visited[ind_neigh] {
                visited[ind_neigh] = true;
                stack.push(ind_neigh);
            }
        }
    }
    visited.iter().all(|&vis| vis)
}
