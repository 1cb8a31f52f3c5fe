//! Single-file append/overwrite record store.
//!
//! Layout: a 16-byte file header (`FCDSTORE`, version, reserved) followed by
//! records. Each record is a 40-byte header, the UTF-8 key and a little-endian
//! payload. Re-writing a key with the same layout overwrites its payload in
//! place; a key whose record is listed twice resolves to the last one. A torn
//! trailing record (process killed mid-append) is cut off on the next write.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc::{CRC_64_ECMA_182, Crc};
use memmap2::Mmap;
use tracing::warn;

use crate::mesh::Hemisphere;
use crate::store::{
    ArrayData, DType, Layout, StoreBackend, StoreError, StoreKey, VertexArray,
};

pub const MAGIC: [u8; 8] = *b"FCDSTORE";
pub const VERSION: u32 = 1;
pub const FILE_HEADER_SIZE: usize = 16;
pub const RECORD_MAGIC: u32 = u32::from_le_bytes(*b"REC1");
pub const RECORD_HEADER_SIZE: usize = 40;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[derive(Debug, Clone, Copy)]
struct Entry {
    layout: Layout,
    crc_offset: u64,
    payload_offset: u64,
}

pub struct BinaryStore {
    path: PathBuf,
    file: File,
    index: BTreeMap<String, Entry>,
    end: u64,
}

impl BinaryStore {
    pub fn open(path: &Path, writable: bool) -> Result<Self, StoreError> {
        let file = if writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
        } else {
            File::open(path)
        }
        .map_err(|source| io_err(path, source))?;

        let len = file.metadata().map_err(|source| io_err(path, source))?.len();
        let mut store = Self {
            path: path.to_path_buf(),
            file,
            index: BTreeMap::new(),
            end: FILE_HEADER_SIZE as u64,
        };

        if len == 0 {
            if writable {
                store.write_file_header()?;
            }
            return Ok(store);
        }

        store.scan(len)?;
        if store.end < len && writable {
            warn!(
                store = %path.display(),
                valid_bytes = store.end,
                file_bytes = len,
                "dropping torn trailing record"
            );
            store
                .file
                .set_len(store.end)
                .map_err(|source| io_err(path, source))?;
        }
        Ok(store)
    }

    fn write_file_header(&mut self) -> Result<(), StoreError> {
        let mut header = [0u8; FILE_HEADER_SIZE];
        header[..8].copy_from_slice(&MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        self.write_at(0, &header)?;
        self.end = FILE_HEADER_SIZE as u64;
        Ok(())
    }

    fn scan(&mut self, len: u64) -> Result<(), StoreError> {
        let mmap = unsafe { Mmap::map(&self.file) }.map_err(|source| io_err(&self.path, source))?;
        if mmap.len() < FILE_HEADER_SIZE || mmap[..8] != MAGIC {
            return Err(self.format_err("magic mismatch"));
        }
        let version = read_u32(&mmap, 8);
        if version != VERSION {
            return Err(self.format_err(&format!("unsupported version {}", version)));
        }

        let len = len as usize;
        let mut offset = FILE_HEADER_SIZE;
        while offset + RECORD_HEADER_SIZE <= len {
            if read_u32(&mmap, offset) != RECORD_MAGIC {
                break;
            }
            let key_len = read_u32(&mmap, offset + 4) as usize;
            let dtype = match read_u32(&mmap, offset + 8) {
                1 => DType::F32,
                2 => DType::U32,
                _ => break,
            };
            let n_vertices = read_u64(&mmap, offset + 16) as usize;
            let width = read_u64(&mmap, offset + 24) as usize;
            let key_start = offset + RECORD_HEADER_SIZE;
            // Header fields are untrusted until the record fits inside the file.
            let Some(record_end) = key_start.checked_add(key_len).and_then(|payload_start| {
                n_vertices
                    .checked_mul(width)
                    .and_then(|n| n.checked_mul(4))
                    .and_then(|payload_len| payload_start.checked_add(payload_len))
            }) else {
                break;
            };
            if record_end <= offset || record_end > len {
                break;
            }
            let payload_start = key_start + key_len;
            let Ok(key) = std::str::from_utf8(&mmap[key_start..payload_start]) else {
                break;
            };
            self.index.insert(
                key.to_string(),
                Entry {
                    layout: Layout {
                        dtype,
                        n_vertices,
                        width,
                    },
                    crc_offset: (offset + 32) as u64,
                    payload_offset: payload_start as u64,
                },
            );
            offset = record_end;
        }
        self.end = offset as u64;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), StoreError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(bytes))
            .map_err(|source| io_err(&self.path, source))
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        let mut buf = vec![0u8; len];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|source| {
                if source.kind() == ErrorKind::UnexpectedEof {
                    self.format_err("record extends past end of file")
                } else {
                    io_err(&self.path, source)
                }
            })?;
        Ok(buf)
    }

    fn format_err(&self, reason: &str) -> StoreError {
        StoreError::Format {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl StoreBackend for BinaryStore {
    fn require(&mut self, key: &StoreKey, layout: Layout) -> Result<(), StoreError> {
        let path = key.path();
        if let Some(entry) = self.index.get(&path) {
            if entry.layout != layout {
                return Err(StoreError::LayoutMismatch {
                    key: path,
                    existing: entry.layout.to_string(),
                    requested: layout.to_string(),
                });
            }
            return Ok(());
        }

        let payload = vec![0u8; layout.n_vertices * layout.width * 4];
        let mut header = [0u8; RECORD_HEADER_SIZE];
        header[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&(path.len() as u32).to_le_bytes());
        let dtype_code: u32 = match layout.dtype {
            DType::F32 => 1,
            DType::U32 => 2,
        };
        header[8..12].copy_from_slice(&dtype_code.to_le_bytes());
        header[16..24].copy_from_slice(&(layout.n_vertices as u64).to_le_bytes());
        header[24..32].copy_from_slice(&(layout.width as u64).to_le_bytes());
        header[32..40].copy_from_slice(&CRC64.checksum(&payload).to_le_bytes());

        let start = self.end;
        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + path.len() + payload.len());
        record.extend_from_slice(&header);
        record.extend_from_slice(path.as_bytes());
        record.extend_from_slice(&payload);
        self.write_at(start, &record)?;

        self.index.insert(
            path.clone(),
            Entry {
                layout,
                crc_offset: start + 32,
                payload_offset: start + (RECORD_HEADER_SIZE + path.len()) as u64,
            },
        );
        self.end = start + record.len() as u64;
        Ok(())
    }

    fn overwrite(&mut self, key: &StoreKey, array: &VertexArray) -> Result<(), StoreError> {
        let path = key.path();
        let entry = *self.index.get(&path).ok_or_else(|| {
            StoreError::Backend(format!("dataset {} must be required before writing", path))
        })?;
        if entry.layout != array.layout() {
            return Err(StoreError::LayoutMismatch {
                key: path,
                existing: entry.layout.to_string(),
                requested: array.layout().to_string(),
            });
        }
        let payload = encode(&array.data);
        self.write_at(entry.payload_offset, &payload)?;
        self.write_at(entry.crc_offset, &CRC64.checksum(&payload).to_le_bytes())?;
        Ok(())
    }

    fn read(&self, key: &StoreKey) -> Result<Option<VertexArray>, StoreError> {
        let path = key.path();
        let Some(entry) = self.index.get(&path) else {
            return Ok(None);
        };
        let payload_len = entry.layout.n_vertices * entry.layout.width * 4;
        let payload = self.read_at(entry.payload_offset, payload_len)?;
        let stored_crc = u64::from_le_bytes(
            self.read_at(entry.crc_offset, 8)?
                .try_into()
                .map_err(|_| self.format_err("short checksum"))?,
        );
        if CRC64.checksum(&payload) != stored_crc {
            return Err(StoreError::Corrupt { key: path });
        }
        Ok(Some(VertexArray {
            width: entry.layout.width,
            data: decode(&payload, entry.layout.dtype),
        }))
    }

    fn subjects(&self) -> Result<Vec<String>, StoreError> {
        let subjects: BTreeSet<String> = self
            .index
            .keys()
            .filter_map(|k| {
                let mut parts = k.splitn(3, '/');
                let subject = parts.next()?;
                Hemisphere::from_code(parts.next()?)?;
                Some(subject.to_string())
            })
            .collect();
        Ok(subjects.into_iter().collect())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.file
            .sync_data()
            .map_err(|source| io_err(&self.path, source))
    }
}

fn encode(data: &ArrayData) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 4);
    match data {
        ArrayData::F32(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        ArrayData::U32(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
    out
}

fn decode(bytes: &[u8], dtype: DType) -> ArrayData {
    let words = bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]);
    match dtype {
        DType::F32 => ArrayData::F32(words.map(f32::from_le_bytes).collect()),
        DType::U32 => ArrayData::U32(words.map(u32::from_le_bytes).collect()),
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    if matches!(source.kind(), ErrorKind::WouldBlock) {
        return StoreError::Busy {
            path: path.to_path_buf(),
        };
    }
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
