//! db/maintenance - сводные статистики и обслуживающие writer-операции.
//!
//! - Db::stats(): сводка по геометрии, заполнению и free-цепочке (Serialize + Display).
//! - Db::sweep_orphans(): блоки без владельца ниже next_block -> во free-цепочку.
//!   Отказывается работать, если структура несогласована (иначе можно освободить живой блок).
//! - Db::repair_bucket(b): битый экстент бакета переинициализируется пустым small-экстентом.
//!   Содержимое бакета теряется; прежние блоки становятся сиротами для sweep_orphans.

use log::{info, warn};
use serde::Serialize;
use std::fmt;

use crate::consts::NO_BLOCK;
use crate::error::{Error, Result};

use super::core::Db;

#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub file_bytes: u64,
    pub file_blocks: u64,
    pub next_block: u32,
    pub free_blocks: u32,
    pub bucket_count: u32,
    pub used_buckets: u32,
    pub hash_kind: String,
    pub largest_extent_blocks: u32,
    pub quarantined: Vec<u32>,
}

impl fmt::Display for DbStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "file_bytes            = {}", self.file_bytes)?;
        writeln!(f, "file_blocks           = {}", self.file_blocks)?;
        writeln!(f, "next_block            = {}", self.next_block)?;
        writeln!(f, "free_blocks           = {}", self.free_blocks)?;
        writeln!(f, "buckets               = {}", self.bucket_count)?;
        writeln!(f, "used_buckets          = {}", self.used_buckets)?;
        writeln!(f, "hash_kind             = {}", self.hash_kind)?;
        writeln!(f, "largest_extent_blocks = {}", self.largest_extent_blocks)?;
        write!(f, "quarantined           = {:?}", self.quarantined)
    }
}

impl Db {
    pub fn stats(&self) -> Result<DbStats> {
        self.ensure_open()?;
        let mut largest = 0u32;
        for b in 0..self.dir.bucket_count {
            let head = self.bucket_head(b)?;
            if head == NO_BLOCK || self.pager.is_quarantined(head) {
                continue;
            }
            if let Ok(ext) = self.pager.extent(head) {
                largest = largest.max(ext.len());
            }
        }
        Ok(DbStats {
            file_bytes: self.file_size(),
            file_blocks: self.pager.region().block_count(),
            next_block: self.pager.meta.next_block,
            free_blocks: self.pager.meta.free_count,
            bucket_count: self.dir.bucket_count,
            used_buckets: self.dir.count_used_buckets(&self.pager)?,
            hash_kind: self.dir.hash_kind.to_string(),
            largest_extent_blocks: largest,
            quarantined: self.pager.quarantined(),
        })
    }

    /// Вернуть недостижимые блоки во free-цепочку. Возвращает число освобождённых блоков.
    pub fn sweep_orphans(&mut self) -> Result<u64> {
        self.ensure_writable()?;
        let rep = self.doctor()?;
        if !rep.is_consistent() {
            return Err(Error::corrupt(format!(
                "sweep refused: {} corrupt bucket(s), {} aliased block(s), free chain: {}",
                rep.corrupt_buckets.len(),
                rep.aliased_blocks.len(),
                rep.free_chain_error.as_deref().unwrap_or("ok")
            )));
        }
        let n = rep.orphan_blocks.len() as u64;
        self.pager.release_many(&rep.orphan_blocks)?;
        self.pager.metrics.record_sweep(n);
        if n > 0 {
            info!("sweep: {} orphan block(s) returned to the free list", n);
        }
        Ok(n)
    }

    /// Починить бакет, если его экстент битый. Возвращает true, если была переинициализация.
    pub fn repair_bucket(&mut self, bucket: u32) -> Result<bool> {
        self.ensure_writable()?;
        let head = self.bucket_head(bucket)?;
        if head == NO_BLOCK {
            return Ok(false);
        }
        let broken = self.pager.is_quarantined(head)
            || self.pager.verify_extent(head).is_err()
            || self.scan_extent(head, |_, _| {}).is_err();
        if !broken {
            return Ok(false);
        }
        self.pager.reinit_extent(head)?;
        warn!(
            "bucket {}: extent {} reinitialised empty; former blocks are orphans until sweep",
            bucket, head
        );
        Ok(true)
    }
}
