//! Единый тип ошибок SpanDB.
//!
//! Таксономия повторяет слои движка: region (файл/mmap), pager (экстенты) и db (записи).
//! Бинарники и тесты оборачивают её в anyhow.

use std::path::PathBuf;

use thiserror::Error;

use crate::consts::MAX_EXTENT_BLOCKS;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // ----- region -----
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("file is locked by another handle: {}", .0.display())]
    Locked(PathBuf),

    #[error("store is read-only")]
    ReadOnly,

    #[error("store is closed")]
    Closed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ----- structure -----
    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("extent capacity exceeded: requested {requested} blocks, ceiling {}", MAX_EXTENT_BLOCKS)]
    CapacityExceeded { requested: u64 },

    #[error("logical block {index} out of range (extent has {len} blocks)")]
    OutOfRange { index: u32, len: u32 },

    #[error("physical block address space exhausted")]
    AddressSpaceExhausted,

    // ----- blob / array -----
    #[error("byte range {offset}+{len} is outside blob of {size} bytes")]
    ByteRange { offset: u64, len: u64, size: u64 },

    #[error("index {index} out of range (array has {len} items)")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("item of {got} bytes, array holds {expected}-byte items")]
    ItemSize { expected: u32, got: usize },

    // ----- kv -----
    #[error("out of space in bucket {bucket}: {source}")]
    OutOfSpace {
        bucket: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    #[error("record too large: {len} bytes (max {max})")]
    RecordTooLarge { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Ошибка целостности (checksum, layout, диапазоны указателей).
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }
}
