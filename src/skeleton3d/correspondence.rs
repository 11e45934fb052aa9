use crate::error::{Result, SkelError};

/// Tracks which original vertices each surviving mesh vertex stands for
///
/// Disjoint sets over original vertex indices: every merge of mesh vertex
/// `removed` into `kept` unions their sets, and the set remembers `kept` as
/// its surviving vertex. Mesh vertex indices never change during contraction,
/// so a live vertex `v` always belongs to the set containing original `v`.
#[derive(Debug, Clone)]
pub struct CorrespondenceTracker {
    parent: Vec<usize>,
    rank: Vec<u8>,
    survivor: Vec<usize>,
}

impl CorrespondenceTracker {
    /// One singleton set per original vertex
    pub fn new(nb_vertices: usize) -> CorrespondenceTracker {
        CorrespondenceTracker {
            parent: (0..nb_vertices).collect(),
            rank: vec![0; nb_vertices],
            survivor: (0..nb_vertices).collect(),
        }
    }

    /// Number of tracked original vertices
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Checks if no vertex is tracked
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    fn find(&mut self, ind: usize) -> usize {
        let mut cur = ind;
        while self.parent[cur] != cur {
            self.parent[cur] = self.parent[self.parent[cur]];
            cur = self.parent[cur];
        }
        cur
    }

    /// Records that mesh vertex `removed` collapsed into mesh vertex `kept`
    pub fn record_merge(&mut self, kept: usize, removed: usize) -> Result<()> {
        if kept >= self.len() || removed >= self.len() {
            return Err(SkelError::InvalidTopology(format!(
                "record_merge(): ({}, {}) out of {} tracked vertices",
                kept,
                removed,
                self.len()
            )));
        }
        let root_kept = self.find(kept);
        let root_removed = self.find(removed);
        if root_kept == root_removed {
            return Ok(());
        }
        let root = if self.rank[root_kept] < self.rank[root_removed] {
            self.parent[root_kept] = root_removed;
            root_removed
        } else {
            self.parent[root_removed] = root_kept;
            if self.rank[root_kept] == self.rank[root_removed] {
                self.rank[root_kept] = self.rank[root_kept] + 1;
            }
            root_kept
        };
        self.survivor[root] = kept;
        Ok(())
    }

    /// Surviving mesh vertex an original vertex collapsed into
    pub fn survivor(&mut self, ind: usize) -> usize {
        let root = self.find(ind);
        self.survivor[root]
    }

    /// Flattens the sets into a per original vertex target index
    ///
    /// `to_target` translates a surviving mesh vertex into the final index
    /// (after compaction and skeleton extraction); a survivor without target
    /// is an internal inconsistency.
    pub fn resolve<F>(&mut self, to_target: F) -> Result<Vec<usize>>
    where
        F: Fn(usize) -> Option<usize>,
    {
        (0..self.len())
            .map(|ind| {
                let survivor = self.survivor(ind);
                to_target(survivor).ok_or(SkelError::DegenerateInput(format!(
                    "resolve(): vertex {} collapsed into {} which has no target",
                    ind, survivor
                )))
            })
            .collect()
    }
}
