//! Cortical surface mesh: hemisphere bookkeeping, the cortex mask and the
//! vertex adjacency shared by both (mirrored) hemispheres.

mod adjacency;
mod loader;

use anyhow::{Result, bail};

pub use adjacency::Adjacency;
pub use loader::{ADJACENCY_FILE, CORTEX_LABEL_FILE, MESH_META_FILE, load_cohort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    pub const ALL: [Hemisphere; 2] = [Hemisphere::Left, Hemisphere::Right];

    pub fn code(self) -> &'static str {
        match self {
            Hemisphere::Left => "lh",
            Hemisphere::Right => "rh",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "lh" => Some(Hemisphere::Left),
            "rh" => Some(Hemisphere::Right),
            _ => None,
        }
    }
}

impl std::fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One value per hemisphere, always addressed by [`Hemisphere`].
#[derive(Debug, Clone, PartialEq)]
pub struct HemiPair<T> {
    pub left: T,
    pub right: T,
}

impl<T> HemiPair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn get(&self, hemi: Hemisphere) -> &T {
        match hemi {
            Hemisphere::Left => &self.left,
            Hemisphere::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, hemi: Hemisphere) -> &mut T {
        match hemi {
            Hemisphere::Left => &mut self.left,
            Hemisphere::Right => &mut self.right,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Hemisphere, T) -> U) -> HemiPair<U> {
        HemiPair {
            left: f(Hemisphere::Left, self.left),
            right: f(Hemisphere::Right, self.right),
        }
    }

    pub fn try_map<U>(self, mut f: impl FnMut(Hemisphere, T) -> Result<U>) -> Result<HemiPair<U>> {
        Ok(HemiPair {
            left: f(Hemisphere::Left, self.left)?,
            right: f(Hemisphere::Right, self.right)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Hemisphere, &T)> {
        [(Hemisphere::Left, &self.left), (Hemisphere::Right, &self.right)].into_iter()
    }
}

impl<T: Clone> HemiPair<Vec<T>> {
    /// Left then right, the order every concatenated array uses.
    pub fn concat(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.left.len() + self.right.len());
        out.extend_from_slice(&self.left);
        out.extend_from_slice(&self.right);
        out
    }
}

#[derive(Debug, Clone)]
pub struct CortexMask {
    mask: Vec<bool>,
    indices: Vec<usize>,
}

impl CortexMask {
    pub fn from_mask(mask: Vec<bool>) -> Self {
        let indices = mask
            .iter()
            .enumerate()
            .filter(|(_, inside)| **inside)
            .map(|(i, _)| i)
            .collect();
        Self { mask, indices }
    }

    pub fn from_label(n_vertices: usize, label: &[usize]) -> Result<Self> {
        let mut mask = vec![false; n_vertices];
        for &v in label {
            if v >= n_vertices {
                bail!("cortex label vertex {} out of range (n_vertices={})", v, n_vertices);
            }
            mask[v] = true;
        }
        Ok(Self::from_mask(mask))
    }

    pub fn all(n_vertices: usize) -> Self {
        Self::from_mask(vec![true; n_vertices])
    }

    pub fn n_vertices(&self) -> usize {
        self.mask.len()
    }

    pub fn n_cortex(&self) -> usize {
        self.indices.len()
    }

    /// Cortex vertex indices in ascending order.
    pub fn label(&self) -> &[usize] {
        &self.indices
    }

    /// Full-length (`V`) array to cortex-only (`Vc`).
    pub fn restrict<T: Clone>(&self, full: &[T]) -> Result<Vec<T>> {
        if full.len() != self.mask.len() {
            bail!(
                "cannot restrict array of length {} to cortex (expected full length {})",
                full.len(),
                self.mask.len()
            );
        }
        Ok(self.indices.iter().map(|&i| full[i].clone()).collect())
    }

    /// Cortex-only (`Vc`) array back to full length, `fill` outside the cortex.
    pub fn expand<T: Clone>(&self, masked: &[T], fill: T) -> Result<Vec<T>> {
        if masked.len() != self.indices.len() {
            bail!(
                "cannot expand array of length {} to full mesh (expected cortex length {})",
                masked.len(),
                self.indices.len()
            );
        }
        let mut out = vec![fill; self.mask.len()];
        for (value, &i) in masked.iter().zip(&self.indices) {
            out[i] = value.clone();
        }
        Ok(out)
    }
}

/// Mesh-level facts shared by every subject of an evaluation run.
#[derive(Debug, Clone)]
pub struct Cohort {
    pub cortex: CortexMask,
    pub adjacency: Adjacency,
}

impl Cohort {
    pub fn new(cortex: CortexMask, adjacency: Adjacency) -> Result<Self> {
        if cortex.n_vertices() != adjacency.n_vertices() {
            bail!(
                "cortex mask covers {} vertices but adjacency has {}",
                cortex.n_vertices(),
                adjacency.n_vertices()
            );
        }
        Ok(Self { cortex, adjacency })
    }

    pub fn n_vertices(&self) -> usize {
        self.cortex.n_vertices()
    }

    pub fn n_cortex(&self) -> usize {
        self.cortex.n_cortex()
    }

    /// Splits a hemisphere-concatenated array (either both full or both cortex-only).
    pub fn split_hemispheres<T: Clone>(&self, concatenated: &[T]) -> Result<HemiPair<Vec<T>>> {
        let half = if concatenated.len() == 2 * self.n_cortex() {
            self.n_cortex()
        } else if concatenated.len() == 2 * self.n_vertices() {
            self.n_vertices()
        } else {
            bail!(
                "array length {} is neither 2x cortex ({}) nor 2x full mesh ({})",
                concatenated.len(),
                2 * self.n_cortex(),
                2 * self.n_vertices()
            );
        };
        Ok(HemiPair::new(
            concatenated[..half].to_vec(),
            concatenated[half..].to_vec(),
        ))
    }

    /// Cortex-only concatenated array to full-length per-hemisphere arrays.
    pub fn expand_hemispheres<T: Clone>(&self, masked: &[T], fill: T) -> Result<HemiPair<Vec<T>>> {
        if masked.len() != 2 * self.n_cortex() {
            bail!(
                "array length {} does not match 2x cortex vertices ({})",
                masked.len(),
                2 * self.n_cortex()
            );
        }
        self.split_hemispheres(masked)?
            .try_map(|_, half| self.cortex.expand(&half, fill.clone()))
    }

    /// Full-length per-hemisphere arrays to the cortex-only concatenation.
    pub fn restrict_hemispheres<T: Clone>(&self, full: &HemiPair<Vec<T>>) -> Result<Vec<T>> {
        let mut out = self.cortex.restrict(&full.left)?;
        out.extend(self.cortex.restrict(&full.right)?);
        Ok(out)
    }
}
