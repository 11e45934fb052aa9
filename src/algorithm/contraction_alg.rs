use nalgebra::base::*;
use nalgebra::DVector;

use crate::error::{Result, SkelError};
use crate::geometry::geometry_operations;
use crate::linalg::sparse::{self, AnchoredLeastSquares, CsrMatrix};
use crate::mesh3d::halfedge_mesh3d::Vertex;
use crate::mesh3d::{mesh_operations, HalfedgeMesh3D};
use crate::params::ContractionParams;
use crate::skeleton3d::CorrespondenceTracker;

// cotangents are clamped to [0, COT_LIMIT]: obtuse angles do not push, needles do not explode
const COT_LIMIT: f64 = 1e3;
const FALLBACK_STEP: f64 = 0.5;

/// Why the contraction loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Area ratio fell under the threshold (or no face is left)
    Converged,
    /// No merge and no significant area decrease for several iterations
    Stalled,
    /// Iteration cap reached
    MaxIterations,
}

/// Summary of a contraction run
#[derive(Debug, Clone)]
pub struct ContractionReport {
    /// Performed iterations
    pub iterations: usize,
    /// Total area before contraction, then after each iteration
    pub area_history: Vec<f64>,
    /// Number of vertex merges
    pub nb_merges: usize,
    /// Number of iterations that fell back to local averaging
    pub nb_fallbacks: usize,
    /// Stop reason
    pub stop_reason: StopReason,
}

/// Per run contraction state, dropped when the loop ends
pub struct ContractionState {
    original_area: f64,
    // one-ring area at start, indexed by vertex slot, summed on merge
    original_ring_area: Vec<f64>,
    laplacian_weight: f64,
    min_edge_length: f64,
    // closed inputs keep at least one edge per connected component
    keep_last_edge: bool,
    stalled_iterations: usize,
    consecutive_fallbacks: usize,
    report: ContractionReport,
}

impl ContractionState {
    /// Snapshots the mesh before the first iteration
    pub fn init(mesh: &HalfedgeMesh3D, params: &ContractionParams) -> ContractionState {
        let original_area = mesh.area();
        let mut original_ring_area = vec![0.0; mesh.get_nb_vertex_slots()];
        for vertex in mesh.vertices() {
            original_ring_area[vertex.ind()] = vertex.one_ring_area();
        }
        let diagonal = geometry_operations::bounding_diagonal(
            mesh.vertices().map(|vertex| vertex.vertex()).collect::<Vec<_>>().iter(),
        );

        ContractionState {
            original_area,
            original_ring_area,
            laplacian_weight: params.laplacian_weight,
            min_edge_length: params.min_edge_length_ratio * diagonal,
            keep_last_edge: mesh.is_closed(),
            stalled_iterations: 0,
            consecutive_fallbacks: 0,
            report: ContractionReport {
                iterations: 0,
                area_history: vec![original_area],
                nb_merges: 0,
                nb_fallbacks: 0,
                stop_reason: StopReason::MaxIterations,
            },
        }
    }

    /// Current area over original area
    pub fn area_ratio(&self) -> f64 {
        match self.report.area_history.last() {
            Some(&area) if self.original_area > 0.0 => area / self.original_area,
            _ => 0.0,
        }
    }

    /// Edge length under which neighbors are merged
    pub fn min_edge_length(&self) -> f64 {
        self.min_edge_length
    }
}

/// Vertices taking part in the linear system: live vertices with a live face
///
/// Vertices without faces are skeletal and stay where they are.
fn free_vertices(mesh: &HalfedgeMesh3D) -> (Vec<usize>, Vec<Option<usize>>) {
    let mut slot_to_row = vec![None; mesh.get_nb_vertex_slots()];
    let mut free = Vec::new();
    for vertex in mesh.vertices() {
        if !vertex.face_indices().is_empty() {
            slot_to_row[vertex.ind()] = Some(free.len());
            free.push(vertex.ind());
        }
    }
    (free, slot_to_row)
}

/// Cotangent Laplacian over the free vertices
pub fn cotangent_laplacian(mesh: &HalfedgeMesh3D, slot_to_row: &[Option<usize>], nb_rows: usize) -> CsrMatrix {
    let mut triplets = Vec::new();
    for halfedge in mesh.halfedges() {
        let [ind1, ind2] = halfedge.halfedge();
        if let (Some(row1), Some(row2)) = (slot_to_row[ind1], slot_to_row[ind2]) {
            let weight = 0.5 * halfedge.cotangent().clamp(0.0, COT_LIMIT);
            triplets.push((row1, row2, weight));
            triplets.push((row2, row1, weight));
            triplets.push((row1, row1, -weight));
            triplets.push((row2, row2, -weight));
        }
    }
    CsrMatrix::from_triplets(nb_rows, nb_rows, triplets)
}

fn attraction_weights(
    mesh: &HalfedgeMesh3D,
    state: &ContractionState,
    free: &[usize],
    params: &ContractionParams,
) -> DVector<f64> {
    DVector::from_iterator(
        free.len(),
        free.iter().map(|&ind| {
            let ring_area = mesh
                .get_vertex(ind)
                .map(|vertex| vertex.one_ring_area())
                .unwrap_or(0.0);
            let original = state.original_ring_area[ind];
            let weight = if original <= 0.0 {
                params.attraction_weight
            } else if ring_area <= original * f64::EPSILON {
                params.max_attraction_weight
            } else {
                params.attraction_weight * (original / ring_area).sqrt()
            };
            weight.min(params.max_attraction_weight)
        }),
    )
}

/// Moves each free vertex halfway to the average of its neighbors
pub fn local_average_positions(mesh: &HalfedgeMesh3D, free: &[usize]) -> Result<Vec<Vertex>> {
    free.iter()
        .map(|&ind| {
            let vertex = mesh.get_vertex(ind)?;
            let neighbors = vertex.neighbors();
            if neighbors.is_empty() {
                return Ok(vertex.vertex());
            }
            let average = neighbors
                .iter()
                .fold(Vector3::zeros(), |sum, neigh| sum + neigh.vertex())
                / neighbors.len() as f64;
            Ok(vertex.vertex() + (average - vertex.vertex()) * FALLBACK_STEP)
        })
        .collect()
}

/// Solves the contraction system for the free vertices
///
/// Each coordinate minimizes `|w_L L x|^2 + sum_i w_H,i^2 (x_i - p_i)^2`.
/// A vertex gets `None` when one of its coordinates is not solved: the solve
/// of that coordinate broke down, or gave a non finite value for it.
fn solve_positions(
    mesh: &HalfedgeMesh3D,
    state: &ContractionState,
    free: &[usize],
    slot_to_row: &[Option<usize>],
    params: &ContractionParams,
) -> Result<Vec<Option<Vertex>>> {
    let laplacian = cotangent_laplacian(mesh, slot_to_row, free.len());
    let anchors = attraction_weights(mesh, state, free, params);
    let system = AnchoredLeastSquares::new(&laplacian, state.laplacian_weight, &anchors);

    let mut positions: Vec<Vertex> = free
        .iter()
        .map(|&ind| mesh.get_vertex(ind).map(|vertex| vertex.vertex()))
        .collect::<Result<_>>()?;
    let mut solved = vec![true; free.len()];

    for coord in 0..3 {
        let current = DVector::from_iterator(free.len(), positions.iter().map(|pos| pos[coord]));
        match sparse::conjugate_gradient(
            &system,
            &system.rhs(&current),
            Some(&current),
            params.solver_max_iterations,
            params.solver_tolerance,
        ) {
            Ok((solution, solve_report)) => {
                if !solve_report.converged {
                    log::debug!(
                        "Coordinate {} solve stopped after {} iterations (residual {:.3e})",
                        coord,
                        solve_report.iterations,
                        solve_report.relative_residual
                    );
                }
                for (row, &val) in solution.iter().enumerate() {
                    if val.is_finite() {
                        positions[row][coord] = val;
                    } else {
                        solved[row] = false;
                    }
                }
            }
            Err(err) => {
                log::debug!("Coordinate {} solve failed: {}", coord, err);
                solved.iter_mut().for_each(|row_solved| *row_solved = false);
            }
        }
    }

    Ok(positions
        .into_iter()
        .zip(solved)
        .map(|(pos, row_solved)| if row_solved { Some(pos) } else { None })
        .collect())
}

/// Runs one contraction iteration: solve, move, merge
///
/// Vertices the solve could not place fall back to local averaging for this
/// iteration. Returns the number of merges performed.
pub fn contraction_step(
    mesh: &mut HalfedgeMesh3D,
    tracker: &mut CorrespondenceTracker,
    state: &mut ContractionState,
    params: &ContractionParams,
) -> Result<usize> {
    let (free, slot_to_row) = free_vertices(mesh);

    if !free.is_empty() {
        let positions = solve_positions(mesh, state, &free, &slot_to_row, params)?;
        let failed: Vec<usize> = free
            .iter()
            .zip(positions.iter())
            .filter(|(_, pos)| pos.is_none())
            .map(|(&ind, _)| ind)
            .collect();

        if failed.is_empty() {
            state.consecutive_fallbacks = 0;
        } else {
            state.consecutive_fallbacks = state.consecutive_fallbacks + 1;
            state.report.nb_fallbacks = state.report.nb_fallbacks + 1;
            log::warn!(
                "Iteration {}: solve failed for {} of {} vertices, falling back to local averaging",
                state.report.iterations + 1,
                failed.len(),
                free.len()
            );
            if state.consecutive_fallbacks > params.max_consecutive_fallbacks {
                return Err(SkelError::NumericInstability(format!(
                    "contraction_step(): {} consecutive failed solves",
                    state.consecutive_fallbacks
                )));
            }
        }

        // averages read the positions of the previous iteration
        let averaged = local_average_positions(mesh, &failed)?;
        for (&ind, pos) in free.iter().zip(positions.iter()) {
            if let Some(pos) = pos {
                mesh.set_vertex_position(ind, pos)?;
            }
        }
        for (&ind, pos) in failed.iter().zip(averaged.iter()) {
            mesh.set_vertex_position(ind, pos)?;
        }
    }

    // merges run serially once every position of the iteration is known
    let merges =
        mesh_operations::collapse_short_edges(mesh, tracker, state.min_edge_length, state.keep_last_edge)?;
    for merge in merges.iter() {
        state.original_ring_area[merge.kept] =
            state.original_ring_area[merge.kept] + state.original_ring_area[merge.removed];
    }

    state.laplacian_weight =
        (state.laplacian_weight * params.laplacian_weight_factor).min(params.max_laplacian_weight);
    state.report.iterations = state.report.iterations + 1;
    state.report.nb_merges = state.report.nb_merges + merges.len();
    state.report.area_history.push(mesh.area());

    Ok(merges.len())
}

/// Contracts the mesh towards its medial structure
///
/// Iterates until the area ratio drops under `area_ratio_threshold`, the
/// contraction stalls, or `max_iterations` is reached. Every merge is
/// recorded in `tracker`.
pub fn contract(
    mesh: &mut HalfedgeMesh3D,
    tracker: &mut CorrespondenceTracker,
    params: &ContractionParams,
) -> Result<ContractionReport> {
    let mut state = ContractionState::init(mesh, params);
    log::info!(
        "Contracting mesh: {} vertices, {} faces, area {:.6}, edge threshold {:.3e}",
        mesh.get_nb_vertices(),
        mesh.get_nb_faces(),
        state.original_area,
        state.min_edge_length()
    );

    if state.original_area <= 0.0 || mesh.get_nb_faces() == 0 {
        state.report.stop_reason = StopReason::Converged;
        return Ok(state.report);
    }

    for _ in 0..params.max_iterations {
        let area_prev = state.area_ratio();
        let nb_merges = contraction_step(mesh, tracker, &mut state, params)?;
        let area_ratio = state.area_ratio();
        log::debug!(
            "Iteration {}: area ratio {:.3e}, {} merges, {} vertices, {} faces",
            state.report.iterations,
            area_ratio,
            nb_merges,
            mesh.get_nb_vertices(),
            mesh.get_nb_faces()
        );

        if mesh.get_nb_faces() == 0 || area_ratio < params.area_ratio_threshold {
            state.report.stop_reason = StopReason::Converged;
            break;
        }

        if nb_merges == 0 && area_prev - area_ratio < params.area_variation_factor {
            state.stalled_iterations = state.stalled_iterations + 1;
        } else {
            state.stalled_iterations = 0;
        }
        if state.stalled_iterations >= params.stall_iterations {
            state.report.stop_reason = StopReason::Stalled;
            break;
        }
    }

    log::info!(
        "Contraction done in {} iterations ({:?}): {} vertices, {} faces left",
        state.report.iterations,
        state.report.stop_reason,
        mesh.get_nb_vertices(),
        mesh.get_nb_faces()
    );
    Ok(state.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_quad() -> HalfedgeMesh3D {
        let vertices = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        HalfedgeMesh3D::from_arrays(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    #[test]
    fn laplacian_of_quad() {
        let mesh = unit_quad();
        let (free, slot_to_row) = free_vertices(&mesh);
        assert_eq!(free, vec![0, 1, 2, 3]);
        let laplacian = cotangent_laplacian(&mesh, &slot_to_row, free.len());
        // constants are in the kernel
        let ones = DVector::from_element(4, 1.0);
        assert_relative_eq!(laplacian.mul_vec(&ones).norm(), 0.0, epsilon = 1e-12);
        // diagonal edge faces right angles: no weight
        assert!(laplacian.row(0).all(|(col, val)| col != 2 || val.abs() < 1e-12));
        let row1: Vec<(usize, f64)> = laplacian.row(1).collect();
        assert_eq!(row1.len(), 3);
    }

    #[test]
    fn quad_collapses_to_a_point() {
        let mut mesh = unit_quad();
        let mut tracker = CorrespondenceTracker::new(4);
        let report = contract(&mut mesh, &mut tracker, &ContractionParams::default()).unwrap();
        assert_eq!(report.stop_reason, StopReason::Converged);
        assert_eq!(mesh.get_nb_vertices(), 1);
        assert_eq!(mesh.get_nb_faces(), 0);
        let center = mesh.get_vertex(0).unwrap().vertex();
        assert_relative_eq!(center, Vector3::new(0.5, 0.5, 0.0), epsilon = 1e-2);
        for ind in 0..4 {
            assert_eq!(tracker.survivor(ind), 0);
        }
    }

    #[test]
    fn quad_area_decreases() {
        let mut mesh = unit_quad();
        let mut tracker = CorrespondenceTracker::new(4);
        let report = contract(&mut mesh, &mut tracker, &ContractionParams::default()).unwrap();
        assert_relative_eq!(report.area_history[0], 1.0, epsilon = 1e-12);
        for pair in report.area_history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    #[test]
    fn local_average_moves_towards_neighbors() {
        let mesh = unit_quad();
        let positions = local_average_positions(&mesh, &[1]).unwrap();
        // neighbors of 1 are 0 and 2
        assert_relative_eq!(positions[0], Vector3::new(0.75, 0.25, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn failed_solve_falls_back_to_local_average() {
        let mut mesh = unit_quad();
        let mut tracker = CorrespondenceTracker::new(4);
        let params = ContractionParams {
            laplacian_weight: f64::INFINITY,
            ..Default::default()
        };
        let mut state = ContractionState::init(&mesh, &params);
        let nb_merges = contraction_step(&mut mesh, &mut tracker, &mut state, &params).unwrap();
        assert_eq!(nb_merges, 0);
        assert_eq!(state.report.nb_fallbacks, 1);
        assert_eq!(state.consecutive_fallbacks, 1);
        // neighbors of 1 are 0 and 2, neighbors of 0 are 1, 2 and 3
        assert_relative_eq!(mesh.get_vertex(1).unwrap().vertex(), Vector3::new(0.75, 0.25, 0.0), epsilon = 1e-12);
        assert_relative_eq!(
            mesh.get_vertex(0).unwrap().vertex(),
            Vector3::new(1.0 / 3.0, 1.0 / 3.0, 0.0),
            epsilon = 1e-12
        );
        // the weight is capped again for the next iteration
        assert_eq!(state.laplacian_weight, params.max_laplacian_weight);
    }

    #[test]
    fn contraction_recovers_from_a_failed_solve() {
        let mut mesh = unit_quad();
        let mut tracker = CorrespondenceTracker::new(4);
        let params = ContractionParams {
            laplacian_weight: f64::INFINITY,
            ..Default::default()
        };
        let report = contract(&mut mesh, &mut tracker, &params).unwrap();
        assert!(report.nb_fallbacks >= 1);
        assert!(report.area_history.iter().all(|area| area.is_finite()));
        for vertex in mesh.vertices() {
            assert!(geometry_operations::is_finite(&vertex.vertex()));
        }
        mesh.check_mesh().unwrap();
    }

    #[test]
    fn repeated_failures_abort() {
        let mut mesh = unit_quad();
        let mut tracker = CorrespondenceTracker::new(4);
        let params = ContractionParams {
            laplacian_weight: f64::INFINITY,
            max_consecutive_fallbacks: 0,
            ..Default::default()
        };
        assert!(matches!(
            contract(&mut mesh, &mut tracker, &params),
            Err(SkelError::NumericInstability(_))
        ));
    }

    #[test]
    fn iteration_cap_is_honored() {
        let mut mesh = unit_quad();
        let mut tracker = CorrespondenceTracker::new(4);
        let report =
            contract(&mut mesh, &mut tracker, &ContractionParams::with_max_iterations(1)).unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.stop_reason, StopReason::MaxIterations);
        assert_eq!(report.area_history.len(), 2);
        assert!(report.area_history[1] < report.area_history[0]);
    }
}
