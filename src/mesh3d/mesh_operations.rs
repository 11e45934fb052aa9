use crate::error::Result;
use crate::mesh3d::halfedge_mesh3d::Merge;
use crate::mesh3d::HalfedgeMesh3D;
use crate::skeleton3d::CorrespondenceTracker;

/// Collapses edge (ind_vertex1, ind_vertex2) at its midpoint
///
/// The vertex with the smallest index survives. The merge is recorded in the
/// correspondence tracker.
pub fn collapse_edge(
    mesh: &mut HalfedgeMesh3D,
    tracker: &mut CorrespondenceTracker,
    ind_vertex1: usize,
    ind_vertex2: usize,
) -> Result<Merge> {
    let (ind_keep, ind_removed) = if ind_vertex1 < ind_vertex2 {
        (ind_vertex1, ind_vertex2)
    } else {
        (ind_vertex2, ind_vertex1)
    };
    let midpoint =
        (mesh.get_vertex(ind_keep)?.vertex() + mesh.get_vertex(ind_removed)?.vertex()) * 0.5;

    let merge = mesh.merge_vertices(ind_keep, ind_removed)?;
    mesh.set_vertex_position(ind_keep, &midpoint)?;
    tracker.record_merge(ind_keep, ind_removed)?;
    Ok(merge)
}

/// Edges shorter than `threshold`, sorted by length then indices
pub fn short_edges(mesh: &HalfedgeMesh3D, threshold: f64) -> Vec<(f64, [usize; 2])> {
    let mut edges: Vec<(f64, [usize; 2])> = mesh
        .edges()
        .into_iter()
        .filter_map(|edge| {
            let length = edge_length(mesh, edge)?;
            if length < threshold {
                Some((length, edge))
            } else {
                None
            }
        })
        .collect();
    edges.sort_by(|(len1, edg1), (len2, edg2)| len1.total_cmp(len2).then(edg1.cmp(edg2)));
    edges
}

/// Length of an edge between two live vertices
pub fn edge_length(mesh: &HalfedgeMesh3D, edge: [usize; 2]) -> Option<f64> {
    let vert1 = mesh.get_vertex(edge[0]).ok()?.vertex();
    let vert2 = mesh.get_vertex(edge[1]).ok()?.vertex();
    Some((vert2 - vert1).norm())
}

/// Serial pass collapsing every edge shorter than `threshold`
///
/// Candidates are visited shortest first; an edge is skipped if one of its
/// vertices already disappeared or if earlier collapses moved its endpoints
/// apart. With `keep_last_edge`, an edge that is the whole of its connected
/// component is never collapsed, so no component shrinks to a single vertex.
/// Returns the merges performed.
pub fn collapse_short_edges(
    mesh: &mut HalfedgeMesh3D,
    tracker: &mut CorrespondenceTracker,
    threshold: f64,
    keep_last_edge: bool,
) -> Result<Vec<Merge>> {
    let mut merges = Vec::new();
    loop {
        let candidates = short_edges(mesh, threshold);
        let nb_merges_prev = merges.len();
        for (_, edge) in candidates {
            if !mesh.is_edge_in(edge[0], edge[1]) {
                continue;
            }
            if keep_last_edge && mesh.is_isolated_edge(edge[0], edge[1]) {
                continue;
            }
            match edge_length(mesh, edge) {
                Some(length) if length < threshold => {
                    merges.push(collapse_edge(mesh, tracker, edge[0], edge[1])?);
                }
                _ => (),
            }
        }
        if merges.len() == nb_merges_prev {
            break;
        }
    }
    Ok(merges)
}
