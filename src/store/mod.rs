//! Persistent `subject / hemisphere / dataset_kind` array store.
//!
//! Every per-hemisphere array is stored at the full mesh length the store was
//! opened with. Concurrent processes cooperate through a lock file next to the
//! store; a held lock is reported as [`StoreError::Busy`] and retried by the
//! store's [`RetryPolicy`].

mod binary;
mod h5;
mod retry;

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, warn};

use crate::mesh::{HemiPair, Hemisphere};

pub use binary::BinaryStore;
pub use retry::{LockGuard, RetryPolicy};

pub const PREDICTION: &str = "prediction";
pub const PREDICTION_CLUSTERED: &str = "prediction_clustered";
pub const DISTANCE_MAP: &str = "distance_map";
pub const LABELS: &str = "labels";
pub const FEATURES: &str = "features";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store {path} is busy")]
    Busy { path: PathBuf },
    #[error(
        "store {path} still busy after {attempts} attempts; another process holds {lock}"
    )]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        lock: PathBuf,
    },
    #[error("dataset {key}: expected {expected} vertices per hemisphere, got {got}")]
    LengthMismatch {
        key: String,
        expected: usize,
        got: usize,
    },
    #[error("dataset {key} exists as {existing} but {requested} was requested")]
    LayoutMismatch {
        key: String,
        existing: String,
        requested: String,
    },
    #[error("dataset {key} failed its checksum")]
    Corrupt { key: String },
    #[error("invalid key component '{0}'")]
    InvalidKey(String),
    #[error("invalid store file {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
    U32,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::U32 => "u32",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    F32(Vec<f32>),
    U32(Vec<u32>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::F32(v) => v.len(),
            ArrayData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::F32(_) => DType::F32,
            ArrayData::U32(_) => DType::U32,
        }
    }
}

/// Row-major per-vertex array with `width` values per vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexArray {
    pub width: usize,
    pub data: ArrayData,
}

impl VertexArray {
    pub fn f32(values: Vec<f32>) -> Self {
        Self {
            width: 1,
            data: ArrayData::F32(values),
        }
    }

    pub fn u32(values: Vec<u32>) -> Self {
        Self {
            width: 1,
            data: ArrayData::U32(values),
        }
    }

    pub fn f32_rows(values: Vec<f32>, width: usize) -> Self {
        Self {
            width: width.max(1),
            data: ArrayData::F32(values),
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.data.len() / self.width.max(1)
    }

    pub fn layout(&self) -> Layout {
        Layout {
            dtype: self.data.dtype(),
            n_vertices: self.n_vertices(),
            width: self.width,
        }
    }

    pub fn to_f32(&self) -> Vec<f32> {
        match &self.data {
            ArrayData::F32(v) => v.clone(),
            ArrayData::U32(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    pub fn into_f32(self) -> Vec<f32> {
        match self.data {
            ArrayData::F32(v) => v,
            ArrayData::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        }
    }

    pub fn into_u32(self) -> Result<Vec<u32>> {
        match self.data {
            ArrayData::U32(v) => Ok(v),
            ArrayData::F32(v) => v
                .into_iter()
                .map(|x| {
                    if x.is_finite() && x >= 0.0 {
                        Ok(x.round() as u32)
                    } else {
                        anyhow::bail!("cannot read {} as a non-negative integer", x)
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub dtype: DType,
    pub n_vertices: usize,
    pub width: usize,
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}x{}]", self.dtype.name(), self.n_vertices, self.width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoreKey {
    pub subject: String,
    pub hemi: Hemisphere,
    pub dataset: String,
}

impl StoreKey {
    pub fn new(subject: &str, hemi: Hemisphere, dataset: &str) -> Result<Self, StoreError> {
        for part in [subject, dataset] {
            if part.is_empty() || part.contains('/') || part.contains('\0') {
                return Err(StoreError::InvalidKey(part.to_string()));
            }
        }
        Ok(Self {
            subject: subject.to_string(),
            hemi,
            dataset: dataset.to_string(),
        })
    }

    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.subject, self.hemi.code(), self.dataset)
    }
}

/// Hierarchical key-value backend. `require` creates a dataset of the given
/// layout when absent (and rejects a different existing layout);
/// `overwrite` replaces the contents of a required dataset in place.
pub trait StoreBackend {
    fn require(&mut self, key: &StoreKey, layout: Layout) -> Result<(), StoreError>;
    fn overwrite(&mut self, key: &StoreKey, array: &VertexArray) -> Result<(), StoreError>;
    fn read(&self, key: &StoreKey) -> Result<Option<VertexArray>, StoreError>;
    fn subjects(&self) -> Result<Vec<String>, StoreError>;
    fn flush(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Binary,
    Hdf5,
}

impl BackendKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("hdf5") | Some("h5") => BackendKind::Hdf5,
            _ => BackendKind::Binary,
        }
    }
}

fn open_backend(
    path: &Path,
    kind: BackendKind,
    writable: bool,
) -> Result<Box<dyn StoreBackend>, StoreError> {
    match kind {
        BackendKind::Binary => Ok(Box::new(BinaryStore::open(path, writable)?)),
        BackendKind::Hdf5 => Ok(Box::new(h5::Hdf5Store::open(path, writable)?)),
    }
}

#[derive(Debug, Clone)]
pub struct PredictionStore {
    path: PathBuf,
    kind: BackendKind,
    n_vertices: usize,
    retry: RetryPolicy,
}

impl PredictionStore {
    pub fn new(path: impl Into<PathBuf>, n_vertices: usize, retry: RetryPolicy) -> Self {
        let path = path.into();
        let kind = BackendKind::from_path(&path);
        Self {
            path,
            kind,
            n_vertices,
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, subject: &str, arrays: &HemiPair<VertexArray>, dataset: &str) -> Result<()> {
        let mut keys = Vec::with_capacity(2);
        for (hemi, array) in arrays.iter() {
            let key = StoreKey::new(subject, hemi, dataset)?;
            if array.width == 0
                || array.data.len() % array.width != 0
                || array.n_vertices() != self.n_vertices
            {
                return Err(StoreError::LengthMismatch {
                    key: key.path(),
                    expected: self.n_vertices,
                    got: array.n_vertices(),
                }
                .into());
            }
            keys.push((key, array));
        }

        self.retry.run(&self.path, || {
            let _lock = LockGuard::acquire(&self.path)?;
            let mut backend = open_backend(&self.path, self.kind, true)?;
            for (key, array) in &keys {
                backend.require(key, array.layout())?;
                backend.overwrite(key, array)?;
            }
            backend.flush()
        })?;
        debug!(subject, dataset, store = %self.path.display(), "dataset saved");
        Ok(())
    }

    /// `Ok(None)` when the file, the subject or the dataset is absent.
    pub fn load(&self, subject: &str, dataset: &str) -> Result<Option<HemiPair<VertexArray>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let keys = HemiPair::new(
            StoreKey::new(subject, Hemisphere::Left, dataset)?,
            StoreKey::new(subject, Hemisphere::Right, dataset)?,
        );

        let loaded = self.retry.run(&self.path, || {
            let _lock = LockGuard::acquire(&self.path)?;
            let backend = open_backend(&self.path, self.kind, false)?;
            let left = backend.read(&keys.left)?;
            let right = backend.read(&keys.right)?;
            Ok(left.zip(right))
        });

        let (left, right) = match loaded {
            Ok(Some(pair)) => pair,
            Ok(None) => return Ok(None),
            Err(StoreError::Corrupt { key }) => {
                warn!(key = %key, store = %self.path.display(), "corrupt dataset treated as missing");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        for (key, array) in [(&keys.left, &left), (&keys.right, &right)] {
            if array.n_vertices() != self.n_vertices {
                return Err(StoreError::LengthMismatch {
                    key: key.path(),
                    expected: self.n_vertices,
                    got: array.n_vertices(),
                }
                .into());
            }
        }
        Ok(Some(HemiPair::new(left, right)))
    }

    pub fn subjects(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let subjects = self.retry.run(&self.path, || {
            let _lock = LockGuard::acquire(&self.path)?;
            open_backend(&self.path, self.kind, false)?.subjects()
        })?;
        Ok(subjects)
    }
}
