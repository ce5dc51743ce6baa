//! Centralized configuration and builder for SpanDB.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - SpanConfig::from_env() reads SPDB_* env vars; DbBuilder starts from env and allows overrides.
//! - Geometry (buckets, hash_kind) applies only when a new file is initialised;
//!   an existing file keeps whatever its superblock records.

use std::fmt;

use crate::consts::DEFAULT_BUCKETS;
use crate::error::Result;
use crate::hash::{HashKind, HASH_KIND_DEFAULT};
use crate::region::OpenMode;

/// Top-level configuration for SpanDB (writer/reader).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanConfig {
    /// Number of buckets for a freshly initialised file (1 ..= 1007).
    /// Env: SPDB_BUCKETS (default 256)
    pub buckets: u32,

    /// Key hash recorded in block 0 of a fresh file.
    /// Env: SPDB_HASH = xx64 | xx32 (default xx64)
    pub hash_kind: HashKind,

    /// Open the file read-only (shared lock; mutations fail with ReadOnly).
    /// Env: SPDB_READ_ONLY = 0|1|true|false (default false)
    pub read_only: bool,

    /// Truncate the file on open.
    /// Env: SPDB_OVERWRITE = 0|1|true|false (default false)
    pub overwrite: bool,

    /// Extra blocks added to the file every time it has to grow (hot preallocation).
    /// Env: SPDB_PREALLOC_BLOCKS (default 0)
    pub prealloc_blocks: u32,

    /// Flush the mapping when the Db is closed or dropped.
    /// Env: SPDB_FLUSH_ON_CLOSE (default true)
    pub flush_on_close: bool,
}

impl Default for SpanConfig {
    fn default() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS,
            hash_kind: HASH_KIND_DEFAULT,
            read_only: false,
            overwrite: false,
            prealloc_blocks: 0,
            flush_on_close: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let v = std::env::var(name).ok()?;
    let s = v.trim().to_ascii_lowercase();
    Some(s == "1" || s == "true" || s == "on" || s == "yes")
}

impl SpanConfig {
    /// Load configuration from environment variables. Unparsable values keep the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SPDB_BUCKETS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.buckets = n;
            }
        }

        if let Ok(v) = std::env::var("SPDB_HASH") {
            if let Ok(k) = v.parse::<HashKind>() {
                cfg.hash_kind = k;
            }
        }

        if let Some(on) = env_flag("SPDB_READ_ONLY") {
            cfg.read_only = on;
        }
        if let Some(on) = env_flag("SPDB_OVERWRITE") {
            cfg.overwrite = on;
        }

        if let Ok(v) = std::env::var("SPDB_PREALLOC_BLOCKS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.prealloc_blocks = n;
            }
        }

        if let Some(on) = env_flag("SPDB_FLUSH_ON_CLOSE") {
            cfg.flush_on_close = on;
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_buckets(mut self, n: u32) -> Self {
        self.buckets = n;
        self
    }

    pub fn with_hash_kind(mut self, kind: HashKind) -> Self {
        self.hash_kind = kind;
        self
    }

    pub fn with_read_only(mut self, on: bool) -> Self {
        self.read_only = on;
        self
    }

    pub fn with_overwrite(mut self, on: bool) -> Self {
        self.overwrite = on;
        self
    }

    pub fn with_prealloc_blocks(mut self, n: u32) -> Self {
        self.prealloc_blocks = n;
        self
    }

    pub fn with_flush_on_close(mut self, on: bool) -> Self {
        self.flush_on_close = on;
        self
    }

    /// Открытие файла по флагам. read_only + overwrite -> InvalidConfig.
    pub fn open_mode(&self) -> Result<OpenMode> {
        OpenMode::from_flags(self.read_only, self.overwrite)
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for SpanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpanConfig {{ \
             buckets: {}, \
             hash_kind: {}, \
             read_only: {}, \
             overwrite: {}, \
             prealloc_blocks: {}, \
             flush_on_close: {} \
             }}",
            self.buckets,
            self.hash_kind,
            self.read_only,
            self.overwrite,
            self.prealloc_blocks,
            self.flush_on_close,
        )
    }
}

/// Lightweight builder that produces a SpanConfig.
/// Db exposes `Db::builder()` returning this builder.
#[derive(Clone, Debug)]
pub struct DbBuilder {
    cfg: SpanConfig,
}

impl Default for DbBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: SpanConfig::from_env(),
        }
    }
}

impl DbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: SpanConfig::default(),
        }
    }

    pub fn buckets(mut self, n: u32) -> Self {
        self.cfg.buckets = n;
        self
    }

    pub fn hash_kind(mut self, kind: HashKind) -> Self {
        self.cfg.hash_kind = kind;
        self
    }

    pub fn read_only(mut self, on: bool) -> Self {
        self.cfg.read_only = on;
        self
    }

    pub fn overwrite(mut self, on: bool) -> Self {
        self.cfg.overwrite = on;
        self
    }

    pub fn prealloc_blocks(mut self, n: u32) -> Self {
        self.cfg.prealloc_blocks = n;
        self
    }

    pub fn flush_on_close(mut self, on: bool) -> Self {
        self.cfg.flush_on_close = on;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> SpanConfig {
        self.cfg
    }
}
