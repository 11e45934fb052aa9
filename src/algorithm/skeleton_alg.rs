use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Result, SkelError};
use crate::geometry::geometry_operations;
use crate::mesh3d::{mesh_operations, HalfedgeMesh3D};
use crate::params::{PoissonParams, SkeletonParams};
use crate::reconstruction::poisson;
use crate::skeleton3d::{CorrespondenceTracker, Skeleton3D};

use super::contraction_alg::{self, ContractionReport};

// min-heap entry on edge length, ties broken on vertex indices
#[derive(PartialEq)]
struct EdgeCandidate {
    length: f64,
    edge: [usize; 2],
}

impl Eq for EdgeCandidate {}

impl Ord for EdgeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .length
            .total_cmp(&self.length)
            .then_with(|| other.edge.cmp(&self.edge))
    }
}

impl PartialOrd for EdgeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn face_edges(mesh: &HalfedgeMesh3D, ind_vertex: usize, heap: &mut BinaryHeap<EdgeCandidate>) -> Result<()> {
    for face in mesh.get_vertex(ind_vertex)?.faces() {
        for halfedge in face.halfedges() {
            let [ind1, ind2] = halfedge.halfedge();
            heap.push(EdgeCandidate {
                length: halfedge.length(),
                edge: [ind1.min(ind2), ind1.max(ind2)],
            });
        }
    }
    Ok(())
}

fn shares_live_face(mesh: &HalfedgeMesh3D, edge: [usize; 2]) -> Result<bool> {
    Ok(mesh
        .get_vertex(edge[0])?
        .faces()
        .iter()
        .any(|face| face.face().contains(&edge[1])))
}

/// Collapses every face left by the contraction, shortest edge first
///
/// Returns the number of collapses.
pub fn collapse_faces(mesh: &mut HalfedgeMesh3D, tracker: &mut CorrespondenceTracker) -> Result<usize> {
    let mut heap = BinaryHeap::new();
    for halfedge in mesh.halfedges() {
        let [ind1, ind2] = halfedge.halfedge();
        heap.push(EdgeCandidate {
            length: halfedge.length(),
            edge: [ind1.min(ind2), ind1.max(ind2)],
        });
    }

    let mut nb_collapses = 0;
    while mesh.get_nb_faces() != 0 {
        let candidate = match heap.pop() {
            Some(candidate) => candidate,
            None => {
                return Err(SkelError::InvalidTopology(format!(
                    "collapse_faces(): {} faces left without candidate edge",
                    mesh.get_nb_faces()
                )))
            }
        };
        let [ind1, ind2] = candidate.edge;
        if !mesh.is_vertex_alive(ind1) || !mesh.is_vertex_alive(ind2) {
            continue;
        }
        if !shares_live_face(mesh, candidate.edge)? {
            continue;
        }
        let length = mesh_operations::edge_length(mesh, candidate.edge).unwrap_or(f64::INFINITY);
        if length != candidate.length {
            // an endpoint moved since the candidate was pushed
            heap.push(EdgeCandidate {
                length,
                edge: candidate.edge,
            });
            continue;
        }

        let merge = mesh_operations::collapse_edge(mesh, tracker, ind1, ind2)?;
        face_edges(mesh, merge.kept, &mut heap)?;
        nb_collapses = nb_collapses + 1;
    }
    Ok(nb_collapses)
}

/// Turns a contracted and compacted mesh into a skeleton graph
///
/// Remaining faces are collapsed, neighbors closer than `merge_tolerance` are
/// merged, then live vertices become skeleton nodes (by increasing index) and
/// mesh edges become skeleton edges. With `keep_last_edge` (closed input
/// surface), the merge of coincident neighbors never reduces a connected
/// component to a single node. Also returns, for every vertex of the given
/// mesh, the skeleton node it ends up in.
pub fn extract_skeleton(
    mesh: &HalfedgeMesh3D,
    merge_tolerance: f64,
    keep_last_edge: bool,
) -> Result<(Skeleton3D, Vec<usize>)> {
    let mut mesh = mesh.clone();
    let mut tracker = CorrespondenceTracker::new(mesh.get_nb_vertex_slots());

    let nb_collapses = collapse_faces(&mut mesh, &mut tracker)?;
    let nb_dedup =
        mesh_operations::collapse_short_edges(&mut mesh, &mut tracker, merge_tolerance, keep_last_edge)?.len();
    log::debug!(
        "Skeleton extraction: {} face collapses, {} coincident merges",
        nb_collapses,
        nb_dedup
    );

    if mesh.get_nb_vertices() < 2 {
        return Err(SkelError::DegenerateInput(format!(
            "extract_skeleton(): contraction left {} vertex",
            mesh.get_nb_vertices()
        )));
    }

    let mut skeleton = Skeleton3D::new();
    let mut vert_to_node = vec![None; mesh.get_nb_vertex_slots()];
    for vertex in mesh.vertices() {
        vert_to_node[vertex.ind()] = Some(skeleton.add_node(&vertex.vertex()));
    }
    for [ind1, ind2] in mesh.edges() {
        if let (Some(node1), Some(node2)) = (vert_to_node[ind1], vert_to_node[ind2]) {
            skeleton.add_edge(node1, node2)?;
        }
    }

    let corres = tracker.resolve(|ind| vert_to_node[ind])?;
    Ok((skeleton, corres))
}

/// Contracts a mesh and extracts its skeleton
///
/// Returns the skeleton, the correspondence from every input vertex to a
/// skeleton node, and the contraction report.
pub fn mesh_skeletonization(
    vertices: &[[f64; 3]],
    faces: &[[usize; 3]],
    params: &SkeletonParams,
) -> Result<(Skeleton3D, Vec<usize>, ContractionReport)> {
    let mut mesh = HalfedgeMesh3D::from_arrays(vertices, faces)?;
    let closed = mesh.is_closed();
    let diagonal = geometry_operations::bounding_diagonal(
        mesh.vertices().map(|vertex| vertex.vertex()).collect::<Vec<_>>().iter(),
    );
    let mut tracker = CorrespondenceTracker::new(mesh.get_nb_vertex_slots());

    let report = contraction_alg::contract(&mut mesh, &mut tracker, &params.contraction)?;

    let (compact, old_to_new) = mesh.compact();
    let (skeleton, compact_to_node) =
        extract_skeleton(&compact, params.merge_tolerance_ratio * diagonal, closed)?;
    let corres = tracker.resolve(|ind| old_to_new[ind].map(|ind_compact| compact_to_node[ind_compact]))?;

    log::info!(
        "Skeleton: {} nodes, {} edges",
        skeleton.get_nb_nodes(),
        skeleton.get_nb_edges()
    );
    Ok((skeleton, corres, report))
}

/// Skeletonizes a triangle mesh with default parameters
pub fn skeletonize_mesh(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Result<(Vec<[f64; 3]>, Vec<[usize; 2]>)> {
    skeletonize_mesh_with_params(vertices, faces, &SkeletonParams::default())
}

/// Skeletonizes a triangle mesh
pub fn skeletonize_mesh_with_params(
    vertices: &[[f64; 3]],
    faces: &[[usize; 3]],
    params: &SkeletonParams,
) -> Result<(Vec<[f64; 3]>, Vec<[usize; 2]>)> {
    let (skeleton, _, _) = mesh_skeletonization(vertices, faces, params)?;
    Ok(skeleton.to_arrays())
}

/// Skeletonizes a triangle mesh and maps every input vertex to a skeleton node
pub fn skeletonize_mesh_with_corres(
    vertices: &[[f64; 3]],
    faces: &[[usize; 3]],
) -> Result<(Vec<[f64; 3]>, Vec<[usize; 2]>, Vec<usize>)> {
    skeletonize_mesh_with_corres_with_params(vertices, faces, &SkeletonParams::default())
}

/// Skeletonizes a triangle mesh and maps every input vertex to a skeleton node
pub fn skeletonize_mesh_with_corres_with_params(
    vertices: &[[f64; 3]],
    faces: &[[usize; 3]],
    params: &SkeletonParams,
) -> Result<(Vec<[f64; 3]>, Vec<[usize; 2]>, Vec<usize>)> {
    let (skeleton, corres, _) = mesh_skeletonization(vertices, faces, params)?;
    let (nodes, edges) = skeleton.to_arrays();
    Ok((nodes, edges, corres))
}

/// Skeletonizes an oriented point cloud with default parameters
pub fn skeletonize_pcd(points: &[[f64; 3]], normals: &[[f64; 3]]) -> Result<(Vec<[f64; 3]>, Vec<[usize; 2]>)> {
    skeletonize_pcd_with_params(points, normals, &PoissonParams::default(), &SkeletonParams::default())
}

/// Skeletonizes an oriented point cloud through its Poisson reconstruction
pub fn skeletonize_pcd_with_params(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    poisson_params: &PoissonParams,
    skeleton_params: &SkeletonParams,
) -> Result<(Vec<[f64; 3]>, Vec<[usize; 2]>)> {
    let (vertices, triangles) = poisson::poisson_mesh_with_params(points, normals, poisson_params)?;
    if triangles.is_empty() {
        return Err(SkelError::DegenerateInput(
            "skeletonize_pcd(): reconstruction produced no triangle".to_string(),
        ));
    }
    skeletonize_mesh_with_params(&vertices, &triangles, skeleton_params)
}
