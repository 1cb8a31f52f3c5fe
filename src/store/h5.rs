//! HDF5 backend: `/<subject>/<lh|rh>/<dataset>` datasets shaped `[V, width]`.

#[cfg(feature = "hdf5")]
mod imp {
    use std::path::{Path, PathBuf};

    use crate::mesh::Hemisphere;
    use crate::store::{ArrayData, DType, Layout, StoreBackend, StoreError, StoreKey, VertexArray};

    pub struct Hdf5Store {
        path: PathBuf,
        file: hdf5::File,
    }

    impl Hdf5Store {
        pub fn open(path: &Path, writable: bool) -> Result<Self, StoreError> {
            let file = if writable {
                if path.exists() {
                    hdf5::File::open_rw(path)
                } else {
                    hdf5::File::create(path)
                }
            } else {
                hdf5::File::open(path)
            }
            .map_err(|err| map_err(path, err))?;
            Ok(Self {
                path: path.to_path_buf(),
                file,
            })
        }

        fn group(&self, key: &StoreKey, create: bool) -> Result<Option<hdf5::Group>, StoreError> {
            let name = format!("{}/{}", key.subject, key.hemi.code());
            if self.file.link_exists(&name) {
                return self
                    .file
                    .group(&name)
                    .map(Some)
                    .map_err(|err| map_err(&self.path, err));
            }
            if !create {
                return Ok(None);
            }
            let subject = if self.file.link_exists(&key.subject) {
                self.file.group(&key.subject)
            } else {
                self.file.create_group(&key.subject)
            }
            .map_err(|err| map_err(&self.path, err))?;
            subject
                .create_group(key.hemi.code())
                .map(Some)
                .map_err(|err| map_err(&self.path, err))
        }

        fn dataset(&self, key: &StoreKey) -> Result<Option<hdf5::Dataset>, StoreError> {
            let Some(group) = self.group(key, false)? else {
                return Ok(None);
            };
            if !group.link_exists(&key.dataset) {
                return Ok(None);
            }
            group
                .dataset(&key.dataset)
                .map(Some)
                .map_err(|err| map_err(&self.path, err))
        }

        fn layout_of(&self, ds: &hdf5::Dataset) -> Result<Layout, StoreError> {
            let shape = ds.shape();
            let (n_vertices, width) = match shape.as_slice() {
                [n] => (*n, 1),
                [n, w] => (*n, *w),
                _ => {
                    return Err(StoreError::Format {
                        path: self.path.clone(),
                        reason: format!("unexpected dataset rank {}", shape.len()),
                    });
                }
            };
            let dtype = ds.dtype().map_err(|err| map_err(&self.path, err))?;
            let dtype = if dtype.is::<u32>() { DType::U32 } else { DType::F32 };
            Ok(Layout {
                dtype,
                n_vertices,
                width,
            })
        }
    }

    impl StoreBackend for Hdf5Store {
        fn require(&mut self, key: &StoreKey, layout: Layout) -> Result<(), StoreError> {
            if let Some(ds) = self.dataset(key)? {
                let existing = self.layout_of(&ds)?;
                if existing != layout {
                    return Err(StoreError::LayoutMismatch {
                        key: key.path(),
                        existing: existing.to_string(),
                        requested: layout.to_string(),
                    });
                }
                return Ok(());
            }
            let group = self
                .group(key, true)?
                .ok_or_else(|| StoreError::Backend(format!("cannot create group for {}", key.path())))?;
            let shape = (layout.n_vertices, layout.width);
            let created = match layout.dtype {
                DType::F32 => group.new_dataset::<f32>().shape(shape).create(key.dataset.as_str()),
                DType::U32 => group.new_dataset::<u32>().shape(shape).create(key.dataset.as_str()),
            };
            created.map(|_| ()).map_err(|err| map_err(&self.path, err))
        }

        fn overwrite(&mut self, key: &StoreKey, array: &VertexArray) -> Result<(), StoreError> {
            let ds = self.dataset(key)?.ok_or_else(|| {
                StoreError::Backend(format!("dataset {} must be required before writing", key.path()))
            })?;
            let written = match &array.data {
                ArrayData::F32(v) => ds.write_raw(v),
                ArrayData::U32(v) => ds.write_raw(v),
            };
            written.map_err(|err| map_err(&self.path, err))
        }

        fn read(&self, key: &StoreKey) -> Result<Option<VertexArray>, StoreError> {
            let Some(ds) = self.dataset(key)? else {
                return Ok(None);
            };
            let layout = self.layout_of(&ds)?;
            let data = match layout.dtype {
                DType::F32 => ds.read_raw::<f32>().map(ArrayData::F32),
                DType::U32 => ds.read_raw::<u32>().map(ArrayData::U32),
            }
            .map_err(|err| map_err(&self.path, err))?;
            Ok(Some(VertexArray {
                width: layout.width,
                data,
            }))
        }

        fn subjects(&self) -> Result<Vec<String>, StoreError> {
            let mut out = Vec::new();
            let names = self
                .file
                .member_names()
                .map_err(|err| map_err(&self.path, err))?;
            for name in names {
                let group = self.file.group(&name).map_err(|err| map_err(&self.path, err))?;
                let has_hemi = Hemisphere::ALL
                    .iter()
                    .any(|hemi| group.link_exists(hemi.code()));
                if has_hemi {
                    out.push(name);
                }
            }
            out.sort();
            Ok(out)
        }

        fn flush(&mut self) -> Result<(), StoreError> {
            self.file.flush().map_err(|err| map_err(&self.path, err))
        }
    }

    fn map_err(path: &Path, err: hdf5::Error) -> StoreError {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("lock") || lowered.contains("unavailable") {
            StoreError::Busy {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Backend(format!("{}: {}", path.display(), message))
        }
    }
}

#[cfg(feature = "hdf5")]
pub use imp::Hdf5Store;

/// Uninhabited without the `hdf5` feature; `open` always fails.
#[cfg(not(feature = "hdf5"))]
pub enum Hdf5Store {}

#[cfg(not(feature = "hdf5"))]
impl Hdf5Store {
    pub fn open(_path: &std::path::Path, _writable: bool) -> Result<Self, super::StoreError> {
        Err(super::StoreError::Backend(
            "HDF5 support not enabled. Rebuild with --features hdf5".to_string(),
        ))
    }
}

#[cfg(not(feature = "hdf5"))]
impl super::StoreBackend for Hdf5Store {
    fn require(&mut self, _: &super::StoreKey, _: super::Layout) -> Result<(), super::StoreError> {
        match *self {}
    }

    fn overwrite(
        &mut self,
        _: &super::StoreKey,
        _: &super::VertexArray,
    ) -> Result<(), super::StoreError> {
        match *self {}
    }

    fn read(&self, _: &super::StoreKey) -> Result<Option<super::VertexArray>, super::StoreError> {
        match *self {}
    }

    fn subjects(&self) -> Result<Vec<String>, super::StoreError> {
        match *self {}
    }

    fn flush(&mut self) -> Result<(), super::StoreError> {
        match *self {}
    }
}
