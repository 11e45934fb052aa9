mod common;

use mcf_skel_3d::algorithm::contraction_alg::{self, StopReason};
use mcf_skel_3d::mesh3d::HalfedgeMesh3D;
use mcf_skel_3d::skeleton3d::CorrespondenceTracker;
use mcf_skel_3d::{
    skeletonize_mesh, skeletonize_mesh_with_corres, skeletonize_mesh_with_params, skeletonize_pcd_with_params,
    ContractionParams, PoissonParams, SkelError, SkeletonParams,
};

#[test]
fn cylinder_gives_a_line() {
    let (vertices, faces) = common::cylinder(19, 10, 10.0, 0.5);
    assert_eq!(vertices.len(), 192);
    let (nodes, edges) = skeletonize_mesh(&vertices, &faces).unwrap();

    assert!(nodes.len() >= 2);
    assert!(!edges.is_empty());
    assert!(nodes.len() < 60);
    common::check_graph(nodes.len(), &edges);
    assert!(common::is_connected(nodes.len(), &edges));

    for node in nodes.iter() {
        assert!((node[0] * node[0] + node[1] * node[1]).sqrt() < 0.1);
    }
    let z_min = nodes.iter().map(|node| node[2]).fold(f64::INFINITY, f64::min);
    let z_max = nodes.iter().map(|node| node[2]).fold(f64::NEG_INFINITY, f64::max);
    assert!(z_max - z_min > 5.0);
}

#[test]
fn correspondence_covers_every_vertex() {
    let (vertices, faces) = common::cylinder(19, 10, 10.0, 0.5);
    let (nodes, edges, corres) = skeletonize_mesh_with_corres(&vertices, &faces).unwrap();
    assert_eq!(corres.len(), vertices.len());
    assert!(corres.iter().all(|&ind| ind < nodes.len()));
    common::check_graph(nodes.len(), &edges);
    // every node is the survivor of at least one vertex
    for ind_node in 0..nodes.len() {
        assert!(corres.contains(&ind_node));
    }
    // vertices map to nodes near their own height
    for (vert, &ind_node) in vertices.iter().zip(corres.iter()) {
        assert!((vert[2] - nodes[ind_node][2]).abs() < 2.0);
    }
}

#[test]
fn face_order_has_no_influence() {
    let (vertices, faces) = common::cylinder(19, 10, 10.0, 0.5);
    let shuffled: Vec<[usize; 3]> = faces
        .iter()
        .rev()
        .enumerate()
        .map(|(ind, &[v0, v1, v2])| match ind % 3 {
            0 => [v0, v1, v2],
            1 => [v1, v2, v0],
            _ => [v2, v0, v1],
        })
        .collect();

    let (nodes_a, edges_a, corres_a) = skeletonize_mesh_with_corres(&vertices, &faces).unwrap();
    let (nodes_b, edges_b, corres_b) = skeletonize_mesh_with_corres(&vertices, &shuffled).unwrap();
    assert_eq!(nodes_a.len(), nodes_b.len());
    assert_eq!(edges_a, edges_b);
    assert_eq!(corres_a, corres_b);
    for (node_a, node_b) in nodes_a.iter().zip(nodes_b.iter()) {
        for axis in 0..3 {
            assert!((node_a[axis] - node_b[axis]).abs() < 1e-9);
        }
    }
}

#[test]
fn contraction_area_decreases() {
    let (vertices, faces) = common::cylinder(19, 10, 10.0, 0.5);
    let mut mesh = HalfedgeMesh3D::from_arrays(&vertices, &faces).unwrap();
    let mut tracker = CorrespondenceTracker::new(vertices.len());
    let report = contraction_alg::contract(&mut mesh, &mut tracker, &ContractionParams::default()).unwrap();

    assert_eq!(report.area_history.len(), report.iterations + 1);
    assert_ne!(report.stop_reason, StopReason::MaxIterations);
    let slack = 1e-3 * report.area_history[0];
    for pair in report.area_history.windows(2) {
        assert!(pair[1] <= pair[0] + slack);
    }
    assert!(report.nb_merges > 0);
    assert_eq!(mesh.get_nb_vertices() + report.nb_merges, vertices.len());
    mesh.check_mesh().unwrap();
}

#[test]
fn torus_keeps_its_loop() {
    let (vertices, faces) = common::torus(24, 8, 2.0, 0.5);
    let (nodes, edges) = skeletonize_mesh(&vertices, &faces).unwrap();
    assert!(nodes.len() >= 2);
    assert!(!edges.is_empty());
    common::check_graph(nodes.len(), &edges);
    assert!(common::is_connected(nodes.len(), &edges));
    for node in nodes.iter() {
        let rad = (node[0] * node[0] + node[1] * node[1]).sqrt();
        assert!(rad > 0.5 && rad < 2.5);
    }
}

#[test]
fn planar_quad_is_degenerate() {
    let (vertices, faces) = common::planar_quad();
    assert!(matches!(
        skeletonize_mesh(&vertices, &faces),
        Err(SkelError::DegenerateInput(_))
    ));
}

#[test]
fn closed_boxes_keep_an_edge() {
    for size in [[1.0, 1.0, 1.0], [2.0, 1.0, 0.5]] {
        let (vertices, faces) = common::box_mesh(size);
        let (nodes, edges, corres) = skeletonize_mesh_with_corres(&vertices, &faces).unwrap();
        assert!(nodes.len() >= 2);
        assert!(!edges.is_empty());
        common::check_graph(nodes.len(), &edges);
        assert!(common::is_connected(nodes.len(), &edges));
        assert_eq!(corres.len(), 8);
        assert!(corres.iter().all(|&ind| ind < nodes.len()));
    }
}

#[test]
fn malformed_meshes_are_rejected() {
    let (vertices, _) = common::planar_quad();
    assert!(matches!(
        skeletonize_mesh(&vertices, &[[0, 1, 4]]),
        Err(SkelError::InvalidTopology(_))
    ));
    assert!(matches!(
        skeletonize_mesh(&vertices, &[[0, 2, 2]]),
        Err(SkelError::InvalidTopology(_))
    ));
    assert!(matches!(
        skeletonize_mesh(&vertices, &[]),
        Err(SkelError::InvalidTopology(_))
    ));
    let mut bad = vertices.clone();
    bad[1] = [f64::NAN, 0.0, 0.0];
    assert!(matches!(
        skeletonize_mesh(&bad, &[[0, 1, 2]]),
        Err(SkelError::InvalidGeometry(_))
    ));
}

#[test]
fn unreferenced_vertex_stays_isolated() {
    let (mut vertices, faces) = common::cylinder(19, 10, 10.0, 0.5);
    vertices.push([20.0, 0.0, 5.0]);
    let (nodes, edges, corres) = skeletonize_mesh_with_corres(&vertices, &faces).unwrap();
    let ind_node = corres[vertices.len() - 1];
    assert_eq!(nodes[ind_node], [20.0, 0.0, 5.0]);
    assert!(edges.iter().all(|edge| !edge.contains(&ind_node)));
    assert_eq!(corres.iter().filter(|&&ind| ind == ind_node).count(), 1);
}

#[test]
fn iteration_cap_still_gives_a_skeleton() {
    let (vertices, faces) = common::cylinder(19, 10, 10.0, 0.5);
    let params = SkeletonParams {
        contraction: ContractionParams::with_max_iterations(1),
        ..Default::default()
    };
    let (nodes, edges) = skeletonize_mesh_with_params(&vertices, &faces, &params).unwrap();
    assert!(nodes.len() >= 2);
    common::check_graph(nodes.len(), &edges);
    assert!(common::is_connected(nodes.len(), &edges));
}

#[test]
fn failed_solves_are_recovered_or_reported() {
    let (vertices, faces) = common::cylinder(19, 10, 10.0, 0.5);
    let broken = ContractionParams {
        laplacian_weight: f64::INFINITY,
        ..Default::default()
    };

    let mut mesh = HalfedgeMesh3D::from_arrays(&vertices, &faces).unwrap();
    let mut tracker = CorrespondenceTracker::new(vertices.len());
    let report = contraction_alg::contract(&mut mesh, &mut tracker, &broken).unwrap();
    assert!(report.nb_fallbacks >= 1);
    mesh.check_mesh().unwrap();

    let params = SkeletonParams {
        contraction: ContractionParams {
            max_consecutive_fallbacks: 0,
            ..broken
        },
        ..Default::default()
    };
    assert!(matches!(
        skeletonize_mesh_with_params(&vertices, &faces, &params),
        Err(SkelError::NumericInstability(_))
    ));
}

#[test]
fn point_cloud_of_cylinder() {
    let (points, normals) = common::sampled_cylinder(3000, 3.0, 0.4, 7);
    let (nodes, edges) =
        skeletonize_pcd_with_params(&points, &normals, &PoissonParams::with_depth(5), &SkeletonParams::default())
            .unwrap();
    assert!(nodes.len() >= 2);
    assert!(!edges.is_empty());
    common::check_graph(nodes.len(), &edges);
    let z_min = nodes.iter().map(|node| node[2]).fold(f64::INFINITY, f64::min);
    let z_max = nodes.iter().map(|node| node[2]).fold(f64::NEG_INFINITY, f64::max);
    assert!(z_max - z_min > 1.0);
}
