use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

use crate::io::open_maybe_gz;
use crate::mesh::{Adjacency, Cohort, CortexMask};

pub const ADJACENCY_FILE: &str = "adjacency.tsv";
pub const CORTEX_LABEL_FILE: &str = "cortex.label";
pub const MESH_META_FILE: &str = "mesh.json";

#[derive(Debug, Deserialize)]
struct MeshMeta {
    n_vertices: usize,
}

pub fn load_cohort(dir: &Path) -> Result<Cohort> {
    let adjacency_path = resolve_maybe_gz(dir, ADJACENCY_FILE)?;
    let label_path = resolve_maybe_gz(dir, CORTEX_LABEL_FILE)?;

    let edges = read_edges(&adjacency_path)?;
    let label = read_label(&label_path)?;

    let n_vertices = match read_meta(dir)? {
        Some(meta) => meta.n_vertices,
        None => {
            let max_edge = edges.iter().map(|&(a, b)| a.max(b)).max();
            let max_label = label.iter().copied().max();
            match max_edge.max(max_label) {
                Some(max) => max + 1,
                None => bail!("mesh in {} has no edges and no cortex vertices", dir.display()),
            }
        }
    };

    let adjacency = Adjacency::from_edges(n_vertices, &edges)
        .with_context(|| format!("invalid adjacency {}", adjacency_path.display()))?;
    let cortex = CortexMask::from_label(n_vertices, &label)
        .with_context(|| format!("invalid cortex label {}", label_path.display()))?;

    info!(
        n_vertices,
        n_cortex = cortex.n_cortex(),
        n_edges = adjacency.n_edges(),
        "mesh loaded"
    );
    Cohort::new(cortex, adjacency)
}

fn resolve_maybe_gz(dir: &Path, name: &str) -> Result<PathBuf> {
    let plain = dir.join(name);
    if plain.exists() {
        return Ok(plain);
    }
    let gz = dir.join(format!("{}.gz", name));
    if gz.exists() {
        return Ok(gz);
    }
    bail!("missing {} (or {}.gz) in {}", name, name, dir.display())
}

fn read_meta(dir: &Path) -> Result<Option<MeshMeta>> {
    let path = dir.join(MESH_META_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let meta = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(meta))
}

fn read_edges(path: &Path) -> Result<Vec<(usize, usize)>> {
    let reader = BufReader::new(open_maybe_gz(path)?);
    let mut edges = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
            bail!("{}:{} malformed edge (expected 2 columns)", path.display(), idx + 1);
        };
        let a: usize = a
            .parse()
            .with_context(|| format!("{}:{} invalid vertex index", path.display(), idx + 1))?;
        let b: usize = b
            .parse()
            .with_context(|| format!("{}:{} invalid vertex index", path.display(), idx + 1))?;
        edges.push((a, b));
    }
    Ok(edges)
}

fn read_label(path: &Path) -> Result<Vec<usize>> {
    let reader = BufReader::new(open_maybe_gz(path)?);
    let mut label = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let first = trimmed.split_whitespace().next().unwrap_or(trimmed);
        let vertex: usize = first
            .parse()
            .with_context(|| format!("{}:{} invalid vertex index", path.display(), idx + 1))?;
        label.push(vertex);
    }
    label.sort_unstable();
    label.dedup();
    Ok(label)
}
