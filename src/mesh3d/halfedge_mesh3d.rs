use nalgebra::base::*;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, SkelError};
use crate::geometry::geometry_operations;

/// Mesh vertex
pub type Vertex = Vector3<f64>;
/// Mesh face (array of vertex indices, counter clockwise seen from outside)
pub type Face = [usize; 3];

#[derive(Clone)]
/// Triangle mesh stored in an arena of vertex and face slots
///
/// Removal is logical: dead slots keep their index so that every index held
/// outside the mesh stays valid until `compact` renumbers the survivors.
pub struct HalfedgeMesh3D {
    pub(super) vertices: Vec<Vertex>,
    pub(super) vertex_alive: Vec<bool>,
    pub(super) faces: Vec<Face>,
    pub(super) face_alive: Vec<bool>,
    pub(super) nb_live_vertices: usize,
    pub(super) nb_live_faces: usize,

    // live incident faces, sorted
    pub(super) map_vert_face: Vec<Vec<usize>>,
    // undirected edges, including edges no live face holds anymore
    pub(super) map_vert_neigh: Vec<BTreeSet<usize>>,
}

#[derive(Copy, Clone)]
/// Vertex iterator
pub struct IterVertex<'a> {
    mesh: &'a HalfedgeMesh3D,
    ind_vertex: usize,
}

#[derive(Copy, Clone)]
/// Halfedge iterator: corner `ind_corner` of a face, going to the next corner
pub struct IterHalfEdge<'a> {
    mesh: &'a HalfedgeMesh3D,
    ind_face: usize,
    ind_corner: usize,
}

#[derive(Copy, Clone)]
/// Face iterator
pub struct IterFace<'a> {
    mesh: &'a HalfedgeMesh3D,
    ind_face: usize,
}

/// Outcome of a vertex merge
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Merge {
    /// Surviving vertex
    pub kept: usize,
    /// Vertex marked dead
    pub removed: usize,
    /// Number of faces that became degenerate and were dropped
    pub dropped_faces: usize,
}

impl HalfedgeMesh3D {
    /// Builds a mesh from vertex positions and triangles
    ///
    /// Faces are stored in a canonical order (each face rotated to start at its
    /// smallest index, then sorted) so that the input face order has no
    /// influence on later computations.
    pub fn from_arrays(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Result<HalfedgeMesh3D> {
        let vertices: Vec<Vertex> = vertices
            .iter()
            .map(|&[x, y, z]| Vector3::new(x, y, z))
            .collect();
        if let Some(ind) = vertices
            .iter()
            .position(|vert| !geometry_operations::is_finite(vert))
        {
            return Err(SkelError::InvalidGeometry(format!(
                "from_arrays(): vertex {} is not finite",
                ind
            )));
        }
        if faces.is_empty() {
            return Err(SkelError::InvalidTopology(
                "from_arrays(): mesh has no faces".to_string(),
            ));
        }

        let mut canonical = Vec::with_capacity(faces.len());
        for (ind_face, face) in faces.iter().enumerate() {
            if let Some(&ind) = face.iter().find(|&&ind| ind >= vertices.len()) {
                return Err(SkelError::InvalidTopology(format!(
                    "from_arrays(): face {} references vertex {} out of {}",
                    ind_face,
                    ind,
                    vertices.len()
                )));
            }
            if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
                return Err(SkelError::InvalidTopology(format!(
                    "from_arrays(): face {} is degenerate ({}, {}, {})",
                    ind_face, face[0], face[1], face[2]
                )));
            }
            canonical.push(canonical_face(*face));
        }
        canonical.sort();

        let edges = canonical
            .iter()
            .flat_map(|&[v0, v1, v2]| [[v0, v1], [v1, v2], [v2, v0]])
            .collect::<Vec<_>>();

        Ok(HalfedgeMesh3D::from_parts(vertices, canonical, &edges))
    }

    fn from_parts(vertices: Vec<Vertex>, faces: Vec<Face>, edges: &[[usize; 2]]) -> HalfedgeMesh3D {
        let nb_vertices = vertices.len();
        let nb_faces = faces.len();
        let mut map_vert_face = vec![Vec::new(); nb_vertices];
        let mut map_vert_neigh = vec![BTreeSet::new(); nb_vertices];

        for (ind_face, face) in faces.iter().enumerate() {
            for &ind_vertex in face.iter() {
                map_vert_face[ind_vertex].push(ind_face);
            }
        }
        for &[ind_vertex1, ind_vertex2] in edges.iter() {
            if ind_vertex1 != ind_vertex2 {
                map_vert_neigh[ind_vertex1].insert(ind_vertex2);
                map_vert_neigh[ind_vertex2].insert(ind_vertex1);
            }
        }

        HalfedgeMesh3D {
            vertices,
            vertex_alive: vec![true; nb_vertices],
            faces,
            face_alive: vec![true; nb_faces],
            nb_live_vertices: nb_vertices,
            nb_live_faces: nb_faces,
            map_vert_face,
            map_vert_neigh,
        }
    }

    fn get_vertex_uncheck(&self, ind_vertex: usize) -> IterVertex {
        IterVertex {
            mesh: self,
            ind_vertex,
        }
    }

    /// Vertex getter (live vertices only)
    pub fn get_vertex(&self, ind_vertex: usize) -> Result<IterVertex> {
        if !self.is_vertex_alive(ind_vertex) {
            return Err(SkelError::InvalidTopology(format!(
                "get_vertex(): no live vertex {}",
                ind_vertex
            )));
        }
        Ok(self.get_vertex_uncheck(ind_vertex))
    }

    /// Checks if a vertex slot exists and is alive
    pub fn is_vertex_alive(&self, ind_vertex: usize) -> bool {
        ind_vertex < self.vertices.len() && self.vertex_alive[ind_vertex]
    }

    /// Gets number of live vertices
    pub fn get_nb_vertices(&self) -> usize {
        self.nb_live_vertices
    }

    /// Gets number of vertex slots, dead ones included
    pub fn get_nb_vertex_slots(&self) -> usize {
        self.vertices.len()
    }

    /// Live vertices, by increasing index
    pub fn vertices(&self) -> impl Iterator<Item = IterVertex> + '_ {
        (0..self.vertices.len())
            .filter(move |&ind| self.vertex_alive[ind])
            .map(move |ind| self.get_vertex_uncheck(ind))
    }

    /// Position update
    pub fn set_vertex_position(&mut self, ind_vertex: usize, point: &Vertex) -> Result<()> {
        if !self.is_vertex_alive(ind_vertex) {
            return Err(SkelError::InvalidTopology(format!(
                "set_vertex_position(): no live vertex {}",
                ind_vertex
            )));
        }
        self.vertices[ind_vertex] = *point;
        Ok(())
    }

    /// Live faces adjacent to a vertex
    pub fn vertex_faces(&self, ind_vertex: usize) -> Result<&[usize]> {
        self.get_vertex(ind_vertex)?;
        Ok(&self.map_vert_face[ind_vertex])
    }

    fn get_face_uncheck(&self, ind_face: usize) -> IterFace {
        IterFace {
            mesh: self,
            ind_face,
        }
    }

    /// Face getter (live faces only)
    pub fn get_face(&self, ind_face: usize) -> Result<IterFace> {
        if ind_face >= self.faces.len() || !self.face_alive[ind_face] {
            return Err(SkelError::InvalidTopology(format!(
                "get_face(): no live face {}",
                ind_face
            )));
        }
        Ok(self.get_face_uncheck(ind_face))
    }

    /// Gets number of live faces
    pub fn get_nb_faces(&self) -> usize {
        self.nb_live_faces
    }

    /// Live faces, by increasing index
    pub fn faces(&self) -> impl Iterator<Item = IterFace> + '_ {
        (0..self.faces.len())
            .filter(move |&ind| self.face_alive[ind])
            .map(move |ind| self.get_face_uncheck(ind))
    }

    /// Halfedges of all live faces
    pub fn halfedges(&self) -> impl Iterator<Item = IterHalfEdge> + '_ {
        self.faces().flat_map(|face| face.halfedges())
    }

    /// Undirected edges `[a, b]` with `a < b`, sorted
    pub fn edges(&self) -> Vec<[usize; 2]> {
        let mut edges = Vec::new();
        for vertex in self.vertices() {
            for &ind_neigh in self.map_vert_neigh[vertex.ind()].range(vertex.ind() + 1..) {
                edges.push([vertex.ind(), ind_neigh]);
            }
        }
        edges
    }

    /// Checks if two live vertices are connected by an edge
    pub fn is_edge_in(&self, ind_vertex1: usize, ind_vertex2: usize) -> bool {
        self.is_vertex_alive(ind_vertex1)
            && self.is_vertex_alive(ind_vertex2)
            && self.map_vert_neigh[ind_vertex1].contains(&ind_vertex2)
    }

    /// Checks if an edge is all that is left of its connected component
    ///
    /// True when each endpoint has the other one as only neighbor.
    pub fn is_isolated_edge(&self, ind_vertex1: usize, ind_vertex2: usize) -> bool {
        self.is_edge_in(ind_vertex1, ind_vertex2)
            && self.map_vert_neigh[ind_vertex1].len() == 1
            && self.map_vert_neigh[ind_vertex2].len() == 1
    }

    /// Checks if every edge of a live face is shared by exactly two live faces
    pub fn is_closed(&self) -> bool {
        let mut edge_faces: BTreeMap<[usize; 2], usize> = BTreeMap::new();
        for halfedge in self.halfedges() {
            let [ind1, ind2] = halfedge.halfedge();
            *edge_faces.entry([ind1.min(ind2), ind1.max(ind2)]).or_insert(0) += 1;
        }
        !edge_faces.is_empty() && edge_faces.values().all(|&nb| nb == 2)
    }

    /// Sum of live face areas
    pub fn area(&self) -> f64 {
        self.faces().map(|face| face.area()).sum()
    }

    fn kill_face(&mut self, ind_face: usize) {
        self.face_alive[ind_face] = false;
        self.nb_live_faces = self.nb_live_faces - 1;
        for ind_vertex in self.faces[ind_face] {
            self.map_vert_face[ind_vertex].retain(|&ind| ind != ind_face);
        }
    }

    /// Collapses vertex `ind_removed` into vertex `ind_keep`
    ///
    /// Faces referencing the removed vertex are redirected to the kept one,
    /// faces holding both become degenerate and are dropped. Edges of the
    /// removed vertex are transferred, so connectivity carried only by dropped
    /// faces survives as plain edges.
    pub fn merge_vertices(&mut self, ind_keep: usize, ind_removed: usize) -> Result<Merge> {
        if ind_keep == ind_removed {
            return Err(SkelError::InvalidTopology(format!(
                "merge_vertices(): cannot merge vertex {} with itself",
                ind_keep
            )));
        }
        self.get_vertex(ind_keep)?;
        self.get_vertex(ind_removed)?;

        let mut dropped_faces = 0;
        let faces_removed = std::mem::take(&mut self.map_vert_face[ind_removed]);
        for ind_face in faces_removed {
            if self.faces[ind_face].contains(&ind_keep) {
                self.kill_face(ind_face);
                dropped_faces = dropped_faces + 1;
            } else {
                for ind_vertex in self.faces[ind_face].iter_mut() {
                    if *ind_vertex == ind_removed {
                        *ind_vertex = ind_keep;
                    }
                }
                let faces_keep = &mut self.map_vert_face[ind_keep];
                if let Err(pos) = faces_keep.binary_search(&ind_face) {
                    faces_keep.insert(pos, ind_face);
                }
            }
        }

        let neighs_removed = std::mem::take(&mut self.map_vert_neigh[ind_removed]);
        for ind_neigh in neighs_removed {
            self.map_vert_neigh[ind_neigh].remove(&ind_removed);
            if ind_neigh != ind_keep {
                self.map_vert_neigh[ind_neigh].insert(ind_keep);
                self.map_vert_neigh[ind_keep].insert(ind_neigh);
            }
        }

        self.vertex_alive[ind_removed] = false;
        self.nb_live_vertices = self.nb_live_vertices - 1;

        Ok(Merge {
            kept: ind_keep,
            removed: ind_removed,
            dropped_faces,
        })
    }

    /// Renumbers live vertices and faces contiguously
    ///
    /// Returns the compacted mesh and, for every vertex slot of this mesh, its
    /// new index (None for dead slots). Relative order is preserved.
    pub fn compact(&self) -> (HalfedgeMesh3D, Vec<Option<usize>>) {
        let mut old_to_new = vec![None; self.vertices.len()];
        let mut vertices = Vec::with_capacity(self.nb_live_vertices);
        for vertex in self.vertices() {
            old_to_new[vertex.ind()] = Some(vertices.len());
            vertices.push(vertex.vertex());
        }

        let remap = |ind: usize| old_to_new[ind].unwrap_or(usize::MAX);
        let faces: Vec<Face> = self
            .faces()
            .map(|face| face.face().map(remap))
            .collect();
        let edges: Vec<[usize; 2]> = self
            .edges()
            .iter()
            .map(|edge| edge.map(remap))
            .collect();

        (HalfedgeMesh3D::from_parts(vertices, faces, &edges), old_to_new)
    }

    /// Checks integrity of the mesh
    pub fn check_mesh(&self) -> Result<()> {
        for face in self.faces() {
            let [v0, v1, v2] = face.face();
            if v0 == v1 || v1 == v2 || v2 == v0 {
                return Err(SkelError::InvalidTopology(format!(
                    "check_mesh(): face {} is degenerate",
                    face.ind()
                )));
            }
            for ind_vertex in face.face() {
                if !self.is_vertex_alive(ind_vertex) {
                    return Err(SkelError::InvalidTopology(format!(
                        "check_mesh(): face {} references dead vertex {}",
                        face.ind(),
                        ind_vertex
                    )));
                }
                if self.map_vert_face[ind_vertex]
                    .binary_search(&face.ind())
                    .is_err()
                {
                    return Err(SkelError::InvalidTopology(format!(
                        "check_mesh(): face {} missing from vertex {}",
                        face.ind(),
                        ind_vertex
                    )));
                }
            }
            for halfedge in face.halfedges() {
                if !self.is_edge_in(halfedge.first_vertex().ind(), halfedge.last_vertex().ind()) {
                    return Err(SkelError::InvalidTopology(format!(
                        "check_mesh(): face {} has an unregistered edge",
                        face.ind()
                    )));
                }
            }
        }

        for vertex in self.vertices() {
            for &ind_face in vertex.face_indices() {
                if !self.face_alive[ind_face] || !self.faces[ind_face].contains(&vertex.ind()) {
                    return Err(SkelError::InvalidTopology(format!(
                        "check_mesh(): vertex {} holds non coherent face {}",
                        vertex.ind(),
                        ind_face
                    )));
                }
            }
            for &ind_neigh in self.map_vert_neigh[vertex.ind()].iter() {
                if ind_neigh == vertex.ind()
                    || !self.is_vertex_alive(ind_neigh)
                    || !self.map_vert_neigh[ind_neigh].contains(&vertex.ind())
                {
                    return Err(SkelError::InvalidTopology(format!(
                        "check_mesh(): vertex {} holds non coherent edge to {}",
                        vertex.ind(),
                        ind_neigh
                    )));
                }
            }
        }

        Ok(())
    }
}

fn canonical_face(face: Face) -> Face {
    let [v0, v1, v2] = face;
    if v0 < v1 && v0 < v2 {
        [v0, v1, v2]
    } else if v1 < v2 {
        [v1, v2, v0]
    } else {
        [v2, v0, v1]
    }
}

impl<'a> IterVertex<'a> {
    /// Gets vertex coordinates
    pub fn vertex(&self) -> Vertex {
        self.mesh.vertices[self.ind_vertex]
    }

    /// Gets vertex index
    pub fn ind(&self) -> usize {
        self.ind_vertex
    }

    /// Indices of live adjacent faces
    pub fn face_indices(&self) -> &'a [usize] {
        &self.mesh.map_vert_face[self.ind_vertex]
    }

    /// Live adjacent faces
    pub fn faces(&self) -> Vec<IterFace<'a>> {
        self.mesh.map_vert_face[self.ind_vertex]
            .iter()
            .map(|&ind_face| self.mesh.get_face_uncheck(ind_face))
            .collect()
    }

    /// Neighbor vertices (sorted by index)
    pub fn neighbors(&self) -> Vec<IterVertex<'a>> {
        self.mesh.map_vert_neigh[self.ind_vertex]
            .iter()
            .map(|&ind| self.mesh.get_vertex_uncheck(ind))
            .collect()
    }

    /// Number of neighbor vertices
    pub fn degree(&self) -> usize {
        self.mesh.map_vert_neigh[self.ind_vertex].len()
    }

    /// Area of adjacent faces
    pub fn one_ring_area(&self) -> f64 {
        self.faces().iter().map(|face| face.area()).sum()
    }
}

impl<'a> IterHalfEdge<'a> {
    /// Gets halfedge (array of vertex indices)
    pub fn halfedge(&self) -> [usize; 2] {
        [self.first_vertex().ind(), self.last_vertex().ind()]
    }

    /// First vertex iterator
    pub fn first_vertex(&self) -> IterVertex<'a> {
        self.mesh
            .get_vertex_uncheck(self.mesh.faces[self.ind_face][self.ind_corner])
    }

    /// Last vertex iterator
    pub fn last_vertex(&self) -> IterVertex<'a> {
        self.mesh
            .get_vertex_uncheck(self.mesh.faces[self.ind_face][(self.ind_corner + 1) % 3])
    }

    /// Vertex of the face not on this halfedge
    pub fn opposite_vertex(&self) -> IterVertex<'a> {
        self.mesh
            .get_vertex_uncheck(self.mesh.faces[self.ind_face][(self.ind_corner + 2) % 3])
    }

    /// Next halfedge on same face
    pub fn next_halfedge(&self) -> IterHalfEdge<'a> {
        IterHalfEdge {
            mesh: self.mesh,
            ind_face: self.ind_face,
            ind_corner: (self.ind_corner + 1) % 3,
        }
    }

    /// Face containing halfedge
    pub fn face(&self) -> IterFace<'a> {
        self.mesh.get_face_uncheck(self.ind_face)
    }

    /// Euclidean length
    pub fn length(&self) -> f64 {
        (self.last_vertex().vertex() - self.first_vertex().vertex()).norm()
    }

    /// Cotangent of the angle facing this halfedge
    pub fn cotangent(&self) -> f64 {
        geometry_operations::cotangent(
            &self.opposite_vertex().vertex(),
            &self.first_vertex().vertex(),
            &self.last_vertex().vertex(),
        )
    }
}

impl<'a> IterFace<'a> {
    /// Gets face (array of vertex indices)
    pub fn face(&self) -> Face {
        self.mesh.faces[self.ind_face]
    }

    /// Gets face index
    pub fn ind(&self) -> usize {
        self.ind_face
    }

    /// Surrounding halfedges
    pub fn halfedges(&self) -> [IterHalfEdge<'a>; 3] {
        [0, 1, 2].map(|ind_corner| IterHalfEdge {
            mesh: self.mesh,
            ind_face: self.ind_face,
            ind_corner,
        })
    }

    /// Surrounding vertices
    pub fn vertices(&self) -> [IterVertex<'a>; 3] {
        self.face().map(|ind| self.mesh.get_vertex_uncheck(ind))
    }

    /// Triangle area
    pub fn area(&self) -> f64 {
        let [p0, p1, p2] = self.face().map(|ind| self.mesh.vertices[ind]);
        geometry_operations::triangle_area(&p0, &p1, &p2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> HalfedgeMesh3D {
        let vertices = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let faces = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
        HalfedgeMesh3D::from_arrays(&vertices, &faces).unwrap()
    }

    #[test]
    fn build_tetrahedron() {
        let mesh = tetrahedron();
        mesh.check_mesh().unwrap();
        assert_eq!(mesh.get_nb_vertices(), 4);
        assert_eq!(mesh.get_nb_faces(), 4);
        assert_eq!(mesh.edges().len(), 6);
        assert_eq!(mesh.halfedges().count(), 12);
        assert_eq!(mesh.vertex_faces(0).unwrap().len(), 3);
    }

    #[test]
    fn reject_bad_faces() {
        let vertices = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert!(matches!(
            HalfedgeMesh3D::from_arrays(&vertices, &[[0, 1, 3]]),
            Err(SkelError::InvalidTopology(_))
        ));
        assert!(matches!(
            HalfedgeMesh3D::from_arrays(&vertices, &[[0, 1, 1]]),
            Err(SkelError::InvalidTopology(_))
        ));
        assert!(matches!(
            HalfedgeMesh3D::from_arrays(&vertices, &[]),
            Err(SkelError::InvalidTopology(_))
        ));
        assert!(matches!(
            HalfedgeMesh3D::from_arrays(&[[f64::NAN, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[[0, 1, 2]]),
            Err(SkelError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn canonical_face_order() {
        let vertices = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let mesh_a = HalfedgeMesh3D::from_arrays(&vertices, &[[0, 2, 1], [3, 1, 2]]).unwrap();
        let mesh_b = HalfedgeMesh3D::from_arrays(&vertices, &[[2, 3, 1], [1, 0, 2]]).unwrap();
        let faces_a: Vec<Face> = mesh_a.faces().map(|face| face.face()).collect();
        let faces_b: Vec<Face> = mesh_b.faces().map(|face| face.face()).collect();
        assert_eq!(faces_a, faces_b);
        assert_eq!(faces_a, vec![[0, 2, 1], [1, 2, 3]]);
    }

    #[test]
    fn merge_drops_degenerate_faces() {
        let mut mesh = tetrahedron();
        let merge = mesh.merge_vertices(0, 1).unwrap();
        assert_eq!(merge.dropped_faces, 2);
        assert_eq!(mesh.get_nb_vertices(), 3);
        assert_eq!(mesh.get_nb_faces(), 2);
        assert!(!mesh.is_vertex_alive(1));
        assert!(mesh.get_vertex(1).is_err());
        assert!(mesh.is_edge_in(0, 2) && mesh.is_edge_in(0, 3) && mesh.is_edge_in(2, 3));
        mesh.check_mesh().unwrap();

        let merge = mesh.merge_vertices(2, 3).unwrap();
        assert_eq!(merge.dropped_faces, 2);
        assert_eq!(mesh.get_nb_faces(), 0);
        assert_eq!(mesh.edges(), vec![[0, 2]]);
        mesh.check_mesh().unwrap();
    }

    #[test]
    fn closed_and_isolated() {
        let mut mesh = tetrahedron();
        assert!(mesh.is_closed());
        assert!(!mesh.is_isolated_edge(0, 1));

        // two faces over the same three vertices still close up
        mesh.merge_vertices(0, 1).unwrap();
        assert!(mesh.is_closed());
        mesh.merge_vertices(2, 3).unwrap();
        assert!(!mesh.is_closed());
        assert!(mesh.is_isolated_edge(0, 2));
        assert!(mesh.is_isolated_edge(2, 0));

        let vertices = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let triangle = HalfedgeMesh3D::from_arrays(&vertices, &[[0, 1, 2]]).unwrap();
        assert!(!triangle.is_closed());
        assert!(!triangle.is_isolated_edge(0, 1));
    }

    #[test]
    fn compact_renumbers_survivors() {
        let mut mesh = tetrahedron();
        mesh.merge_vertices(0, 1).unwrap();
        let (compact, old_to_new) = mesh.compact();
        assert_eq!(old_to_new, vec![Some(0), None, Some(1), Some(2)]);
        assert_eq!(compact.get_nb_vertices(), 3);
        assert_eq!(compact.get_nb_faces(), 2);
        assert_eq!(compact.edges(), vec![[0, 1], [0, 2], [1, 2]]);
        compact.check_mesh().unwrap();
    }
}
