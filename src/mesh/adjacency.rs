use anyhow::{Result, bail};

/// Symmetric vertex adjacency in CSR form.
#[derive(Debug, Clone)]
pub struct Adjacency {
    offsets: Vec<usize>,
    neighbors: Vec<u32>,
}

impl Adjacency {
    pub fn from_edges(n_vertices: usize, edges: &[(usize, usize)]) -> Result<Self> {
        if n_vertices > u32::MAX as usize {
            bail!("mesh too large for u32 vertex ids: {}", n_vertices);
        }
        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); n_vertices];
        for &(a, b) in edges {
            if a >= n_vertices || b >= n_vertices {
                bail!(
                    "edge ({}, {}) out of range for {} vertices",
                    a,
                    b,
                    n_vertices
                );
            }
            if a == b {
                continue;
            }
            lists[a].push(b as u32);
            lists[b].push(a as u32);
        }

        let mut offsets = Vec::with_capacity(n_vertices + 1);
        let mut neighbors = Vec::new();
        offsets.push(0);
        for list in &mut lists {
            list.sort_unstable();
            list.dedup();
            neighbors.extend_from_slice(list);
            offsets.push(neighbors.len());
        }
        Ok(Self { offsets, neighbors })
    }

    pub fn n_vertices(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn n_edges(&self) -> usize {
        self.neighbors.len() / 2
    }

    pub fn neighbors(&self, vertex: usize) -> &[u32] {
        &self.neighbors[self.offsets[vertex]..self.offsets[vertex + 1]]
    }
}
