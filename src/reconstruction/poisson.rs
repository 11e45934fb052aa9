use nalgebra::base::*;
use nalgebra::DVector;
use std::collections::HashMap;

use crate::error::{Result, SkelError};
use crate::geometry::geometry_operations;
use crate::linalg::sparse::{self, CsrMatrix, SolveReport};
use crate::params::PoissonParams;

use super::isosurface;
use super::octree::{self, NodeField, NodeKey, Octree};

// deepest level solved on the whole root cube; finer levels only exist near the samples
const FULL_GRID_MAX_DEPTH: usize = 5;
// band of cells around occupied cells refined and solved on finer levels
const SOLVE_BAND: usize = 3;
// band of cells around occupied cells polygonized
const EXTRACTION_BAND: usize = 1;
const SPACING_NEIGHBORS: usize = 6;

/// Summary of a reconstruction
#[derive(Debug, Clone)]
pub struct PoissonReport {
    /// Finest octree depth
    pub depth: usize,
    /// Mean distance of samples to their nearest neighbors
    pub average_spacing: f64,
    /// Field value of the extracted level set
    pub iso_value: f64,
    /// Conjugate gradient iterations, all levels included
    pub solver_iterations: usize,
    /// Unknowns of the finest level
    pub nb_unknowns: usize,
    /// Nodes stored at the finest level
    pub nb_nodes: usize,
}

/// Oriented sample
#[derive(Debug, Clone, Copy)]
pub struct PointSample {
    pub position: Vector3<f64>,
    pub normal: Vector3<f64>,
}

/// Checks and converts points and normals
pub fn validate_samples(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    params: &PoissonParams,
) -> Result<Vec<PointSample>> {
    if points.len() != normals.len() {
        return Err(SkelError::InvalidGeometry(format!(
            "validate_samples(): {} points for {} normals",
            points.len(),
            normals.len()
        )));
    }
    if points.len() < params.min_samples {
        return Err(SkelError::InsufficientSamples {
            found: points.len(),
            required: params.min_samples,
        });
    }

    let mut samples = Vec::with_capacity(points.len());
    for (index, (&[px, py, pz], &[nx, ny, nz])) in points.iter().zip(normals.iter()).enumerate() {
        let position = Vector3::new(px, py, pz);
        if !geometry_operations::is_finite(&position) {
            return Err(SkelError::InvalidGeometry(format!(
                "validate_samples(): point {} is not finite",
                index
            )));
        }
        let normal = Vector3::new(nx, ny, nz);
        let norm = normal.norm();
        if !norm.is_finite() || (norm - 1.0).abs() > params.normal_tolerance {
            return Err(SkelError::InvalidNormals { index });
        }
        samples.push(PointSample {
            position,
            normal: normal / norm,
        });
    }
    Ok(samples)
}

/// Normal field splatted on cell edges, one map per axis
///
/// Edge along axis `a` starting at node `n` holds the normal component `a` of
/// nearby samples, trilinearly weighted around the edge midpoint. Only edges
/// touched by a sample are stored.
struct EdgeField {
    values: [HashMap<NodeKey, f64>; 3],
}

impl EdgeField {
    /// Splats the samples on the edges of the field grid
    ///
    /// Each sample stands for `sample_area` of surface, so the jump of the
    /// solved field across the surface does not depend on the depth.
    fn splat(samples: &[PointSample], field: &NodeField, sample_area: f64) -> EdgeField {
        let res = field.resolution();
        let scale = sample_area / (field.cell_size() * field.cell_size());
        let mut values = [HashMap::new(), HashMap::new(), HashMap::new()];

        for sample in samples.iter() {
            let local = (sample.position - field.origin()) / field.cell_size();
            for axis in 0..3 {
                let mut dims = [res + 1; 3];
                dims[axis] = res;
                let mut coord = local;
                coord[axis] = coord[axis] - 0.5;
                let base = coord.map(|val| val.floor());
                let frac = coord - base;
                for corner in 0..8 {
                    let offset = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
                    let mut edge = [0usize; 3];
                    let mut weight = scale;
                    let mut inside = true;
                    for dim in 0..3 {
                        let ind = base[dim] + offset[dim] as f64;
                        if ind < 0.0 || ind >= dims[dim] as f64 {
                            inside = false;
                            break;
                        }
                        edge[dim] = ind as usize;
                        weight = weight * if offset[dim] == 1 { frac[dim] } else { 1.0 - frac[dim] };
                    }
                    if inside {
                        *values[axis].entry(edge).or_insert(0.0) += weight * sample.normal[axis];
                    }
                }
            }
        }
        EdgeField { values }
    }

    fn value(&self, axis: usize, edge: NodeKey) -> f64 {
        self.values[axis].get(&edge).copied().unwrap_or(0.0)
    }

    /// Divergence term at a node: incoming minus outgoing edge values
    fn divergence(&self, node: NodeKey) -> f64 {
        let mut div = 0.0;
        for axis in 0..3 {
            if node[axis] >= 1 {
                let mut edge = node;
                edge[axis] = edge[axis] - 1;
                div = div + self.value(axis, edge);
            }
            div = div - self.value(axis, node);
        }
        div
    }
}

fn neighbor_nodes(node: NodeKey) -> [NodeKey; 6] {
    let [i, j, k] = node;
    [
        [i - 1, j, k],
        [i + 1, j, k],
        [i, j - 1, k],
        [i, j + 1, k],
        [i, j, k - 1],
        [i, j, k + 1],
    ]
}

/// Solves the field of one depth, starting from `guess`
///
/// Unknowns are the stored nodes off the root cube boundary whose six
/// neighbors are stored too. The other nodes keep their `guess` value: zero
/// on the root cube boundary, the coarser solution on the rim of the band.
fn solve_level(
    samples: &[PointSample],
    guess: NodeField,
    sample_area: f64,
    params: &PoissonParams,
) -> Result<(NodeField, SolveReport, usize)> {
    let mut field = guess;
    let edges = EdgeField::splat(samples, &field, sample_area);

    let mut rows = vec![None; field.nb_nodes()];
    let mut unknowns = Vec::new();
    for index in 0..field.nb_nodes() {
        let node = field.node(index);
        if field.is_boundary(node) {
            continue;
        }
        if neighbor_nodes(node).iter().all(|&neigh| field.index(neigh).is_some()) {
            rows[index] = Some(unknowns.len());
            unknowns.push(index);
        }
    }

    let mut triplets = Vec::with_capacity(7 * unknowns.len());
    let mut rhs: DVector<f64> = DVector::zeros(unknowns.len());
    for (row, &index) in unknowns.iter().enumerate() {
        let node = field.node(index);
        triplets.push((row, row, 6.0));
        let mut val = edges.divergence(node);
        for neigh in neighbor_nodes(node) {
            if let Some(index_neigh) = field.index(neigh) {
                match rows[index_neigh] {
                    Some(row_neigh) => triplets.push((row, row_neigh, -1.0)),
                    None => val = val + field.values()[index_neigh],
                }
            }
        }
        rhs[row] = val;
    }

    let laplacian = CsrMatrix::from_triplets(unknowns.len(), unknowns.len(), triplets);
    let x0 = DVector::from_iterator(unknowns.len(), unknowns.iter().map(|&index| field.values()[index]));
    let (solution, report) = sparse::conjugate_gradient(
        &laplacian,
        &rhs,
        Some(&x0),
        params.solver_max_iterations,
        params.solver_tolerance,
    )?;
    if !report.converged {
        log::warn!(
            "Poisson solve at resolution {} stopped after {} iterations (residual {:.3e})",
            field.resolution(),
            report.iterations,
            report.relative_residual
        );
    }

    for (row, &index) in unknowns.iter().enumerate() {
        field.values_mut()[index] = solution[row];
    }
    Ok((field, report, unknowns.len()))
}

/// Median of the field at the samples
fn iso_value(field: &NodeField, samples: &[PointSample]) -> f64 {
    let mut values: Vec<f64> = samples
        .iter()
        .filter_map(|sample| field.interpolate(&sample.position))
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Reconstructs a surface from oriented points
///
/// The field is the least squares fit of its gradient (finite differences on
/// cell edges) to the splatted normals, with zero on the root cube boundary.
/// The coarsest level covers the whole root cube; each finer level only
/// refines the cells near the samples and starts from the previous solution.
/// The surface is the level set through the median field value at the
/// samples.
pub fn reconstruct(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    params: &PoissonParams,
) -> Result<(Vec<[f64; 3]>, Vec<[usize; 3]>, PoissonReport)> {
    let samples = validate_samples(points, normals, params)?;
    let positions: Vec<Vector3<f64>> = samples.iter().map(|sample| sample.position).collect();
    let spacing = octree::average_spacing(&positions, SPACING_NEIGHBORS);
    let octree = Octree::build(&positions, spacing, params)?;
    let depth = octree.depth();
    let sample_area = if spacing > 0.0 {
        spacing * spacing
    } else {
        octree.cell_size(depth) * octree.cell_size(depth)
    };

    let first_depth = depth
        .saturating_sub(params.coarse_depth_offset)
        .clamp(1, FULL_GRID_MAX_DEPTH)
        .min(depth);
    log::info!(
        "Poisson reconstruction: {} samples, average spacing {:.4e}, depth {} (solved from {})",
        samples.len(),
        spacing,
        depth,
        first_depth
    );

    let mut field = octree.node_field(first_depth, octree.all_cells(first_depth));
    let mut solver_iterations = 0;
    let mut nb_unknowns = 0;
    for cur_depth in first_depth..=depth {
        if cur_depth > first_depth {
            field = field.prolongate(octree.dilated_cells(cur_depth, SOLVE_BAND));
        }
        let (solved, report, nb) = solve_level(&samples, field, sample_area, params)?;
        log::debug!(
            "Level {}: {} nodes, {} unknowns, {} iterations, residual {:.3e}",
            cur_depth,
            solved.nb_nodes(),
            nb,
            report.iterations,
            report.relative_residual
        );
        field = solved;
        solver_iterations = solver_iterations + report.iterations;
        nb_unknowns = nb;
    }

    let iso = iso_value(&field, &samples);
    let cells = octree.dilated_cells(depth, EXTRACTION_BAND);
    let (vertices, triangles) = isosurface::extract(&field, &cells, iso);
    log::info!(
        "Reconstructed mesh: {} vertices, {} triangles (iso value {:.4e})",
        vertices.len(),
        triangles.len(),
        iso
    );

    Ok((
        vertices,
        triangles,
        PoissonReport {
            depth,
            average_spacing: spacing,
            iso_value: iso,
            solver_iterations,
            nb_unknowns,
            nb_nodes: field.nb_nodes(),
        },
    ))
}

/// Poisson surface reconstruction with default parameters
pub fn poisson_mesh(points: &[[f64; 3]], normals: &[[f64; 3]]) -> Result<(Vec<[f64; 3]>, Vec<[usize; 3]>)> {
    poisson_mesh_with_params(points, normals, &PoissonParams::default())
}

/// Poisson surface reconstruction
pub fn poisson_mesh_with_params(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    params: &PoissonParams,
) -> Result<(Vec<[f64; 3]>, Vec<[usize; 3]>)> {
    let (vertices, triangles, _) = reconstruct(points, normals, params)?;
    Ok((vertices, triangles))
}
