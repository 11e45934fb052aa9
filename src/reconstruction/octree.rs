use nalgebra::base::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Result, SkelError};
use crate::geometry::geometry_operations;
use crate::params::PoissonParams;

/// Cell key: integer coordinates of a cell at a given depth
pub type CellKey = [usize; 3];

/// Sparse octree over the samples
///
/// The root cell is a padded cube around the samples; a cell at depth `d` has
/// side `size / 2^d`. Only occupied cells are stored, level by level.
pub struct Octree {
    origin: Vector3<f64>,
    size: f64,
    depth: usize,
    // occupied cells and their sample count, for depths 0..=depth
    levels: Vec<BTreeMap<CellKey, usize>>,
}

impl Octree {
    /// Builds the octree and picks its finest depth
    ///
    /// The depth is the smallest one in `[min_depth, max_depth]` where occupied
    /// cells hold at most `samples_per_node` samples on average, lowered so
    /// that finest cells stay larger than half the average sample spacing.
    pub fn build(points: &[Vector3<f64>], average_spacing: f64, params: &PoissonParams) -> Result<Octree> {
        let (min, max) = match geometry_operations::bounding_box(points.iter()) {
            Some(bbox) => bbox,
            None => {
                return Err(SkelError::InsufficientSamples {
                    found: 0,
                    required: params.min_samples,
                })
            }
        };
        let extent = (max - min).max();
        if !(extent > 0.0) {
            return Err(SkelError::DegenerateInput(
                "Octree::build(): samples span an empty box".to_string(),
            ));
        }
        let size = extent * (1.0 + 2.0 * params.padding);
        let center = (min + max) * 0.5;
        let origin = center - Vector3::from_element(0.5 * size);

        let min_depth = params.min_depth.min(params.max_depth);
        let mut octree = Octree {
            origin,
            size,
            depth: params.max_depth,
            levels: Vec::new(),
        };
        for depth in 0..=params.max_depth {
            let mut level = BTreeMap::new();
            for point in points.iter() {
                *level.entry(octree.cell_of(point, depth)).or_insert(0) += 1;
            }
            octree.levels.push(level);
        }

        let mut depth = params.max_depth;
        for cur_depth in min_depth..=params.max_depth {
            let density = points.len() as f64 / octree.levels[cur_depth].len() as f64;
            if density <= params.samples_per_node {
                depth = cur_depth;
                break;
            }
        }
        if average_spacing > 0.0 {
            let spacing_depth = (size / (0.5 * average_spacing)).log2().floor().max(0.0) as usize;
            depth = depth.min(spacing_depth);
        }
        octree.depth = depth.max(min_depth);
        octree.levels.truncate(octree.depth + 1);

        log::debug!(
            "Octree: depth {}, {} occupied finest cells, cube size {:.4}",
            octree.depth,
            octree.levels[octree.depth].len(),
            size
        );
        Ok(octree)
    }

    /// Finest depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Lowest corner of the root cube
    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    /// Side of the root cube
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Cells per axis at a depth
    pub fn resolution(&self, depth: usize) -> usize {
        1 << depth
    }

    /// Cell side at a depth
    pub fn cell_size(&self, depth: usize) -> f64 {
        self.size / self.resolution(depth) as f64
    }

    /// Cell containing a point (clamped to the root cube)
    pub fn cell_of(&self, point: &Vector3<f64>, depth: usize) -> CellKey {
        let res = self.resolution(depth);
        let local = (point - self.origin) / self.cell_size(depth);
        [0, 1, 2].map(|axis| (local[axis].max(0.0) as usize).min(res - 1))
    }

    /// Occupied cells at a depth, with their sample count
    pub fn occupied(&self, depth: usize) -> Option<&BTreeMap<CellKey, usize>> {
        self.levels.get(depth)
    }

    /// Occupied cells at a depth grown by `ring` cells in every direction
    pub fn dilated_cells(&self, depth: usize, ring: usize) -> BTreeSet<CellKey> {
        let res = self.resolution(depth);
        let mut cells = BTreeSet::new();
        if let Some(level) = self.levels.get(depth) {
            for key in level.keys() {
                let lo = key.map(|ind| ind.saturating_sub(ring));
                let hi = key.map(|ind| (ind + ring).min(res - 1));
                for i in lo[0]..=hi[0] {
                    for j in lo[1]..=hi[1] {
                        for k in lo[2]..=hi[2] {
                            cells.insert([i, j, k]);
                        }
                    }
                }
            }
        }
        cells
    }

    /// Every cell of a depth
    pub fn all_cells(&self, depth: usize) -> BTreeSet<CellKey> {
        let res = self.resolution(depth);
        let mut cells = BTreeSet::new();
        for i in 0..res {
            for j in 0..res {
                for k in 0..res {
                    cells.insert([i, j, k]);
                }
            }
        }
        cells
    }

    /// Node field over the corners of `cells`, initialized to zero
    pub fn node_field(&self, depth: usize, cells: BTreeSet<CellKey>) -> NodeField {
        NodeField::new(self.resolution(depth), self.origin, self.cell_size(depth), cells)
    }
}

/// Node key: integer coordinates of a cell corner at a given depth
pub type NodeKey = [usize; 3];

/// Corners of a cell, as bits (x = 1, y = 2, z = 4)
pub fn cell_corners(cell: CellKey) -> [NodeKey; 8] {
    [0, 1, 2, 3, 4, 5, 6, 7].map(|corner| {
        [
            cell[0] + (corner & 1),
            cell[1] + ((corner >> 1) & 1),
            cell[2] + ((corner >> 2) & 1),
        ]
    })
}

/// Scalar values on the corners of a set of cells of one octree depth
///
/// Only the nodes of the stored cells exist, numbered by increasing key.
#[derive(Clone)]
pub struct NodeField {
    res: usize,
    origin: Vector3<f64>,
    cell_size: f64,
    cells: BTreeSet<CellKey>,
    nodes: Vec<NodeKey>,
    node_index: HashMap<NodeKey, usize>,
    values: Vec<f64>,
}

impl NodeField {
    fn new(res: usize, origin: Vector3<f64>, cell_size: f64, cells: BTreeSet<CellKey>) -> NodeField {
        let cells: BTreeSet<CellKey> = cells
            .into_iter()
            .filter(|cell| cell.iter().all(|&ind| ind < res))
            .collect();
        let nodes: Vec<NodeKey> = cells
            .iter()
            .flat_map(|&cell| cell_corners(cell))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(index, &node)| (node, index))
            .collect();
        let values = vec![0.0; nodes.len()];
        NodeField {
            res,
            origin,
            cell_size,
            cells,
            nodes,
            node_index,
            values,
        }
    }

    /// Cells per axis
    pub fn resolution(&self) -> usize {
        self.res
    }

    /// Cell side
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Lowest corner of the root cube
    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    /// Cells covered by the field
    pub fn cells(&self) -> &BTreeSet<CellKey> {
        &self.cells
    }

    /// Number of stored nodes
    pub fn nb_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Index of a node, if stored
    pub fn index(&self, node: NodeKey) -> Option<usize> {
        self.node_index.get(&node).copied()
    }

    /// Node of an index
    pub fn node(&self, index: usize) -> NodeKey {
        self.nodes[index]
    }

    /// Checks if a node lies on the root cube boundary
    pub fn is_boundary(&self, node: NodeKey) -> bool {
        node.iter().any(|&ind| ind == 0 || ind == self.res)
    }

    /// Node position
    pub fn position(&self, node: NodeKey) -> Vector3<f64> {
        self.origin + Vector3::new(node[0] as f64, node[1] as f64, node[2] as f64) * self.cell_size
    }

    /// Node value, if stored
    pub fn value(&self, node: NodeKey) -> Option<f64> {
        self.index(node).map(|index| self.values[index])
    }

    /// Values of the stored nodes
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable values of the stored nodes
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Trilinear interpolation at a point (clamped to the root cube)
    ///
    /// None if the cell holding the point is not covered.
    pub fn interpolate(&self, point: &Vector3<f64>) -> Option<f64> {
        let local = (point - self.origin) / self.cell_size;
        let mut base = [0usize; 3];
        let mut frac = [0.0; 3];
        for axis in 0..3 {
            let coord = local[axis].clamp(0.0, self.res as f64);
            base[axis] = (coord.floor() as usize).min(self.res - 1);
            frac[axis] = coord - base[axis] as f64;
        }
        let mut val = 0.0;
        for (corner, node) in cell_corners(base).iter().enumerate() {
            let offset = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            let weight: f64 = (0..3)
                .map(|axis| if offset[axis] == 1 { frac[axis] } else { 1.0 - frac[axis] })
                .product();
            val = val + weight * self.value(*node)?;
        }
        Some(val)
    }

    /// Field of the next depth over `cells`, interpolated from this one
    ///
    /// Fine nodes whose coarse neighbors are not stored start at zero.
    pub fn prolongate(&self, cells: BTreeSet<CellKey>) -> NodeField {
        let mut fine = NodeField::new(2 * self.res, self.origin, 0.5 * self.cell_size, cells);
        for index in 0..fine.nb_nodes() {
            let [i, j, k] = fine.node(index);
            let mut val = 0.0;
            let mut nb = 0;
            // coarse nodes around fine node: itself if even, both sides if odd
            for dk in 0..=(k % 2) {
                for dj in 0..=(j % 2) {
                    for di in 0..=(i % 2) {
                        if let Some(coarse) = self.value([i / 2 + di, j / 2 + dj, k / 2 + dk]) {
                            val = val + coarse;
                            nb = nb + 1;
                        }
                    }
                }
            }
            if nb > 0 {
                fine.values[index] = val / nb as f64;
            }
        }
        fine
    }
}

/// Mean distance of the samples to their `nb_neighbors` nearest neighbors
///
/// Neighbors are searched in a hash grid, ring by ring around the sample
/// cell, until no unvisited cell can hold a closer sample.
pub fn average_spacing(points: &[Vector3<f64>], nb_neighbors: usize) -> f64 {
    if points.len() < 2 || nb_neighbors == 0 {
        return 0.0;
    }
    let (min, max) = match geometry_operations::bounding_box(points.iter()) {
        Some(bbox) => bbox,
        None => return 0.0,
    };
    let extent = (max - min).max();
    if !(extent > 0.0) {
        return 0.0;
    }
    let nb_neighbors = nb_neighbors.min(points.len() - 1);
    let cells_per_axis = ((points.len() as f64).sqrt().ceil() as usize).max(1);
    let cell_size = extent / cells_per_axis as f64;
    let cell_of = |point: &Vector3<f64>| -> [i64; 3] {
        [0, 1, 2].map(|axis| ((point[axis] - min[axis]) / cell_size).floor() as i64)
    };

    let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
    for (ind, point) in points.iter().enumerate() {
        grid.entry(cell_of(point)).or_default().push(ind);
    }

    let mut total = 0.0;
    for (ind, point) in points.iter().enumerate() {
        let center = cell_of(point);
        let mut nearest: Vec<f64> = Vec::with_capacity(nb_neighbors + 1);
        let mut ring = 0i64;
        loop {
            for dk in -ring..=ring {
                for dj in -ring..=ring {
                    for di in -ring..=ring {
                        // visit only the shell of the current ring
                        if di.abs().max(dj.abs()).max(dk.abs()) != ring {
                            continue;
                        }
                        let key = [center[0] + di, center[1] + dj, center[2] + dk];
                        if let Some(cell) = grid.get(&key) {
                            for &ind_other in cell.iter().filter(|&&other| other != ind) {
                                let dist = (points[ind_other] - point).norm();
                                let pos = nearest.partition_point(|&val| val <= dist);
                                if pos < nb_neighbors {
                                    nearest.insert(pos, dist);
                                    nearest.truncate(nb_neighbors);
                                }
                            }
                        }
                    }
                }
            }
            let searched = ring as f64 * cell_size;
            let done = nearest.len() == nb_neighbors
                && nearest.last().map_or(false, |&dist| dist <= searched);
            if done || ring as usize > cells_per_axis {
                break;
            }
            ring = ring + 1;
        }
        total = total + nearest.iter().sum::<f64>() / nearest.len().max(1) as f64;
    }
    total / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_points(nb: usize, step: f64) -> Vec<Vector3<f64>> {
        let mut points = Vec::new();
        for i in 0..nb {
            for j in 0..nb {
                points.push(Vector3::new(i as f64 * step, j as f64 * step, 0.0));
            }
        }
        points
    }

    #[test]
    fn spacing_of_regular_grid() {
        let points = grid_points(10, 0.5);
        // 4 neighbors at the grid step for interior points, fewer on the border
        let spacing = average_spacing(&points, 4);
        assert!(spacing >= 0.5 - 1e-12);
        assert!(spacing < 0.6);
        assert_relative_eq!(average_spacing(&points[..2], 3), 0.5);
    }

    #[test]
    fn depth_follows_density() {
        let points = grid_points(20, 0.05);
        let params = PoissonParams::default();
        let octree = Octree::build(&points, average_spacing(&points, 6), &params).unwrap();
        assert!(octree.depth() >= params.min_depth && octree.depth() <= params.max_depth);
        let level = octree.occupied(octree.depth()).unwrap();
        assert_eq!(level.values().sum::<usize>(), points.len());

        let pinned = Octree::build(&points, 0.0, &PoissonParams::with_depth(3)).unwrap();
        assert_eq!(pinned.depth(), 3);
        assert!(pinned.occupied(4).is_none());
        for point in points.iter() {
            let cell = pinned.cell_of(point, 3);
            assert!(cell.iter().all(|&ind| ind < 8));
        }
    }

    #[test]
    fn flat_cloud_is_degenerate() {
        let points = vec![Vector3::new(1.0, 1.0, 1.0); 5];
        assert!(matches!(
            Octree::build(&points, 0.0, &PoissonParams::default()),
            Err(SkelError::DegenerateInput(_))
        ));
    }

    #[test]
    fn prolongation_keeps_linear_fields() {
        let points = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)];
        let octree = Octree::build(&points, 0.0, &PoissonParams::with_depth(2)).unwrap();
        let mut field = octree.node_field(2, octree.all_cells(2));
        assert_eq!(field.nb_nodes(), 125);
        let linear = |pos: Vector3<f64>| pos[0] + 2.0 * pos[1] - pos[2];
        for index in 0..field.nb_nodes() {
            field.values_mut()[index] = linear(field.position(field.node(index)));
        }

        let fine = field.prolongate(octree.all_cells(3));
        assert_eq!(fine.resolution(), 8);
        assert_eq!(fine.nb_nodes(), 729);
        for index in 0..fine.nb_nodes() {
            assert_relative_eq!(fine.values()[index], linear(fine.position(fine.node(index))), epsilon = 1e-12);
        }

        let mut corner = BTreeSet::new();
        corner.insert([5, 2, 7]);
        let partial = field.prolongate(corner);
        assert_eq!(partial.nb_nodes(), 8);
        for index in 0..partial.nb_nodes() {
            assert_relative_eq!(
                partial.values()[index],
                linear(partial.position(partial.node(index))),
                epsilon = 1e-12
            );
        }

        let point = Vector3::new(0.3, 0.7, 0.1);
        assert_relative_eq!(field.interpolate(&point).unwrap(), 0.3 + 1.4 - 0.1, epsilon = 1e-12);
    }

    #[test]
    fn field_only_covers_given_cells() {
        let points = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)];
        let octree = Octree::build(&points, 0.0, &PoissonParams::with_depth(6)).unwrap();
        let cells = octree.dilated_cells(6, 3);
        assert!(cells.len() <= 2 * 7 * 7 * 7);
        let field = octree.node_field(6, cells.clone());

        // two small blocks of nodes instead of the 65^3 grid
        assert!(field.nb_nodes() <= 2 * 8 * 8 * 8);
        for cell in cells.iter() {
            assert!(cell_corners(*cell).iter().all(|&node| field.index(node).is_some()));
        }
        assert!(field.index([32, 32, 32]).is_none());
        assert!(field.interpolate(&Vector3::new(0.5, 0.5, 0.5)).is_none());
        assert_eq!(field.interpolate(&points[0]), Some(0.0));
    }
}
