use nalgebra::base::*;
use std::collections::{BTreeSet, HashMap};

use super::octree::{self, CellKey, NodeField};

// Kuhn subdivision of a cube along its main diagonal, corners as bits (x = 1, y = 2, z = 4).
// Neighbor cubes agree on the diagonals of their shared faces.
const CUBE_TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

// crossings this close to a node are moved onto the node
const NODE_SNAP: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CrossingKey {
    Node(usize),
    Edge(usize, usize),
}

struct IsoMeshBuilder<'a> {
    field: &'a NodeField,
    iso: f64,
    vertices: Vec<[f64; 3]>,
    triangles: Vec<[usize; 3]>,
    crossings: HashMap<CrossingKey, usize>,
}

impl<'a> IsoMeshBuilder<'a> {
    fn position(&self, index: usize) -> Vector3<f64> {
        self.field.position(self.field.node(index))
    }

    fn value(&self, index: usize) -> f64 {
        self.field.values()[index] - self.iso
    }

    /// Mesh vertex where the level set crosses edge (ind1, ind2)
    fn crossing(&mut self, ind1: usize, ind2: usize) -> usize {
        let (ind_a, ind_b) = if ind1 < ind2 { (ind1, ind2) } else { (ind2, ind1) };
        let val_a = self.value(ind_a);
        let val_b = self.value(ind_b);
        let t = val_a / (val_a - val_b);
        let key = if t < NODE_SNAP {
            CrossingKey::Node(ind_a)
        } else if t > 1.0 - NODE_SNAP {
            CrossingKey::Node(ind_b)
        } else {
            CrossingKey::Edge(ind_a, ind_b)
        };

        if let Some(&ind_vertex) = self.crossings.get(&key) {
            return ind_vertex;
        }
        let point = match key {
            CrossingKey::Node(index) => self.position(index),
            CrossingKey::Edge(_, _) => {
                self.position(ind_a) + (self.position(ind_b) - self.position(ind_a)) * t
            }
        };
        let ind_vertex = self.vertices.len();
        self.vertices.push([point[0], point[1], point[2]]);
        self.crossings.insert(key, ind_vertex);
        ind_vertex
    }

    fn add_triangle(&mut self, tri: [usize; 3], outward: &Vector3<f64>) {
        let [v0, v1, v2] = tri;
        if v0 == v1 || v1 == v2 || v2 == v0 {
            return;
        }
        let [p0, p1, p2] = tri.map(|ind| Vector3::from(self.vertices[ind]));
        let normal = (p1 - p0).cross(&(p2 - p0));
        if normal.dot(outward) < 0.0 {
            self.triangles.push([v0, v2, v1]);
        } else {
            self.triangles.push(tri);
        }
    }

    fn polygonize_tetrahedron(&mut self, nodes: [usize; 4]) {
        let (inside, outside): (Vec<usize>, Vec<usize>) =
            nodes.iter().copied().partition(|&index| self.value(index) < 0.0);
        if inside.is_empty() || outside.is_empty() {
            return;
        }

        let centroid = |indices: &[usize]| {
            indices
                .iter()
                .fold(Vector3::zeros(), |sum, &index| sum + self.position(index))
                / indices.len() as f64
        };
        let outward = centroid(&outside) - centroid(&inside);

        match (inside.len(), outside.len()) {
            (1, 3) => {
                let tri = outside.iter().map(|&out| self.crossing(inside[0], out)).collect::<Vec<_>>();
                self.add_triangle([tri[0], tri[1], tri[2]], &outward);
            }
            (3, 1) => {
                let tri = inside.iter().map(|&ins| self.crossing(ins, outside[0])).collect::<Vec<_>>();
                self.add_triangle([tri[0], tri[1], tri[2]], &outward);
            }
            _ => {
                // quad on edges ac, ad, bd, bc
                let [a, b] = [inside[0], inside[1]];
                let [c, d] = [outside[0], outside[1]];
                let x_ac = self.crossing(a, c);
                let x_ad = self.crossing(a, d);
                let x_bd = self.crossing(b, d);
                let x_bc = self.crossing(b, c);
                self.add_triangle([x_ac, x_ad, x_bd], &outward);
                self.add_triangle([x_ac, x_bd, x_bc], &outward);
            }
        }
    }
}

/// Polygonizes the level set `iso` of a node field over the given cells
///
/// Every cell is split into six tetrahedra, and the field is linear on each
/// one. Crossing vertices are shared between neighbor cells. Triangles face
/// the side where the field is above `iso`. Cells with a corner missing from
/// the field are skipped.
pub fn extract(field: &NodeField, cells: &BTreeSet<CellKey>, iso: f64) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let mut builder = IsoMeshBuilder {
        field,
        iso,
        vertices: Vec::new(),
        triangles: Vec::new(),
        crossings: HashMap::new(),
    };
    let res = field.resolution();

    for cell in cells.iter().filter(|cell| cell.iter().all(|&ind| ind < res)) {
        let mut corners = [0usize; 8];
        let mut covered = true;
        for (corner, node) in octree::cell_corners(*cell).iter().enumerate() {
            match field.index(*node) {
                Some(index) => corners[corner] = index,
                None => covered = false,
            }
        }
        if !covered {
            continue;
        }
        for tet in CUBE_TETRAHEDRA.iter() {
            builder.polygonize_tetrahedron(tet.map(|corner| corners[corner]));
        }
    }

    (builder.vertices, builder.triangles)
}
