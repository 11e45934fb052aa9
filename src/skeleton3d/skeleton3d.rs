use nalgebra::base::*;
use std::collections::BTreeSet;

use crate::error::{Result, SkelError};

#[derive(Clone, Debug, Default)]
/// Curve skeleton: 3D nodes and undirected edges
pub struct Skeleton3D {
    pub(super) nodes: Vec<Vector3<f64>>,
    pub(super) edges: Vec<[usize; 2]>, // connects two nodes, smallest index first
    pub(super) edge_set: BTreeSet<[usize; 2]>,
}

impl Skeleton3D {
    /// Skeleton 3D constructor
    pub fn new() -> Skeleton3D {
        Skeleton3D::default()
    }

    /// Adds a node to the skeleton
    pub fn add_node(&mut self, point: &Vector3<f64>) -> usize {
        self.nodes.push(*point);
        self.nodes.len() - 1
    }

    /// Adds an edge to the skeleton
    ///
    /// Returns false if the edge (in either direction) was already there.
    pub fn add_edge(&mut self, ind_node1: usize, ind_node2: usize) -> Result<bool> {
        if ind_node1 == ind_node2 {
            return Err(SkelError::InvalidTopology(format!(
                "add_edge(): self loop on node {}",
                ind_node1
            )));
        }
        if ind_node1 >= self.nodes.len() || ind_node2 >= self.nodes.len() {
            return Err(SkelError::InvalidTopology(format!(
                "add_edge(): ({}, {}) out of {} nodes",
                ind_node1,
                ind_node2,
                self.nodes.len()
            )));
        }
        let edge = if ind_node1 < ind_node2 {
            [ind_node1, ind_node2]
        } else {
            [ind_node2, ind_node1]
        };
        if !self.edge_set.insert(edge) {
            return Ok(false);
        }
        self.edges.push(edge);
        Ok(true)
    }

    /// Get nodes
    pub fn get_nodes(&self) -> &[Vector3<f64>] {
        &self.nodes
    }

    /// Get edges
    pub fn get_edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Gets number of nodes
    pub fn get_nb_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Gets number of edges
    pub fn get_nb_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges incident to a node
    pub fn degree(&self, ind_node: usize) -> usize {
        self.edges.iter().filter(|edge| edge.contains(&ind_node)).count()
    }

    /// Checks if every node can be reached from node 0
    pub fn is_connected(&self) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        let mut neighbors = vec![Vec::new(); self.nodes.len()];
        for &[ind1, ind2] in self.edges.iter() {
            neighbors[ind1].push(ind2);
            neighbors[ind2].push(ind1);
        }
        let mut visited = vec![false; self.nodes.len()];
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

    /// Plain arrays: node positions and edge index pairs
    pub fn to_arrays(&self) -> (Vec<[f64; 3]>, Vec<[usize; 2]>) {
        let nodes = self.nodes.iter().map(|node| [node[0], node[1], node[2]]).collect();
        (nodes, self.edges.clone())
    }
}
