//! pager/core - ядро Pager: структура, init()/open(), доступ к блокам, superblock, карантин.
//!
//! Pager владеет Region и кэшем заголовка superblock (MetaHeader). Любое изменение
//! meta (free_head/free_count/next_block) или головы бакета сразу пишется в block 0
//! и запечатывается crc, так что файл на диске всегда самосогласован по block 0.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::consts::{BLOCK_SIZE, BLOCK_SIZE_U64, NO_BLOCK};
use crate::error::{Error, Result};
use crate::hash::HashKind;
use crate::meta::{head_read, head_write, meta_init, meta_read, meta_seal, meta_write, MetaHeader};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::region::Region;

/// Менеджер блоков поверх одного отображённого файла.
pub struct Pager {
    pub(crate) region: Region,
    pub meta: MetaHeader,
    /// Сколько блоков добавлять сверх нужного при каждом расширении файла.
    pub(crate) prealloc_blocks: u32,
    /// Головы экстентов, у которых не сошёлся checksum. Мутации запрещены до reinit.
    quarantined: Mutex<HashSet<u32>>,
    pub(crate) metrics: Metrics,
}

impl Pager {
    /// Инициализировать пустой регион: ровно один блок (superblock), все головы = 0.
    pub fn init(
        mut region: Region,
        buckets: u32,
        hash_kind: HashKind,
        prealloc_blocks: u32,
    ) -> Result<Self> {
        if region.is_read_only() {
            return Err(Error::ReadOnly);
        }
        let meta = MetaHeader::new(buckets, hash_kind);
        region.ensure_capacity(BLOCK_SIZE_U64)?;
        meta_init(&mut region.bytes_mut()?[..BLOCK_SIZE], &meta)?;
        region.flush_range(0, BLOCK_SIZE)?;
        info!(
            "init {} buckets={} hash={}",
            region.path().display(),
            buckets,
            hash_kind
        );
        Ok(Self::with_meta(region, meta, prealloc_blocks))
    }

    /// Открыть существующий регион: прочитать и проверить superblock.
    /// Проверку экстентов делает вызывающий (Db::open) - см. verify_extent.
    pub fn open(region: Region, prealloc_blocks: u32) -> Result<Self> {
        let bytes = region.bytes();
        if bytes.len() < BLOCK_SIZE {
            return Err(Error::corrupt("file is smaller than one block"));
        }
        let meta = meta_read(&bytes[..BLOCK_SIZE])?;

        let blocks = region.block_count();
        if meta.next_block as u64 > blocks {
            return Err(Error::corrupt(format!(
                "next_block {} is beyond file end ({} blocks)",
                meta.next_block, blocks
            )));
        }
        if meta.free_count >= meta.next_block {
            return Err(Error::corrupt(format!(
                "free_count {} is not below next_block {}",
                meta.free_count, meta.next_block
            )));
        }
        if meta.free_head >= meta.next_block || ((meta.free_head == NO_BLOCK) != (meta.free_count == 0)) {
            return Err(Error::corrupt(format!(
                "free list head {} / count {} inconsistent (next_block {})",
                meta.free_head, meta.free_count, meta.next_block
            )));
        }
        debug!(
            "pager open {} blocks={} next_block={} free={}",
            region.path().display(),
            blocks,
            meta.next_block,
            meta.free_count
        );
        Ok(Self::with_meta(region, meta, prealloc_blocks))
    }

    fn with_meta(region: Region, meta: MetaHeader, prealloc_blocks: u32) -> Self {
        Self {
            region,
            meta,
            prealloc_blocks,
            quarantined: Mutex::new(HashSet::new()),
            metrics: Metrics::new(),
        }
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.region.is_read_only()
    }

    #[inline]
    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ---------------- block access ----------------

    /// Проверить, что p - выделенный блок (1 .. next_block). Иначе Corrupt.
    #[inline]
    pub(crate) fn check_ptr(&self, owner: u32, p: u32) -> Result<u32> {
        if p == NO_BLOCK || p >= self.meta.next_block {
            return Err(Error::corrupt(format!(
                "extent {}: pointer {} outside allocated range [1 .. {})",
                owner, p, self.meta.next_block
            )));
        }
        Ok(p)
    }

    /// Срез выделенного блока idx (без block 0).
    pub fn block(&self, idx: u32) -> Result<&[u8]> {
        self.check_ptr(idx, idx)?;
        self.region
            .read(idx as u64 * BLOCK_SIZE_U64, BLOCK_SIZE)
    }

    pub(crate) fn block_mut(&mut self, idx: u32) -> Result<&mut [u8]> {
        self.check_ptr(idx, idx)?;
        let off = idx as usize * BLOCK_SIZE;
        let bytes = self.region.bytes_mut()?;
        bytes
            .get_mut(off..off + BLOCK_SIZE)
            .ok_or_else(|| Error::corrupt(format!("block {} is beyond region end", idx)))
    }

    /// Скопировать байты [0 .. len) блока src в блок dst.
    pub(crate) fn copy_block_prefix(&mut self, src: u32, dst: u32, len: usize) -> Result<()> {
        self.check_ptr(src, src)?;
        self.check_ptr(dst, dst)?;
        let s = src as usize * BLOCK_SIZE;
        let d = dst as usize * BLOCK_SIZE;
        self.region.bytes_mut()?.copy_within(s..s + len, d);
        Ok(())
    }

    // ---------------- superblock ----------------

    /// Записать кэш meta в block 0 и перезапечатать crc.
    pub(crate) fn persist_meta(&mut self) -> Result<()> {
        let meta = self.meta.clone();
        let b0 = self.superblock_mut()?;
        meta_write(b0, &meta);
        meta_seal(b0);
        Ok(())
    }

    fn superblock_mut(&mut self) -> Result<&mut [u8]> {
        self.region
            .bytes_mut()?
            .get_mut(..BLOCK_SIZE)
            .ok_or_else(|| Error::corrupt("superblock is not mapped"))
    }

    /// Голова бакета из block 0 (0 = у бакета нет экстента).
    /// После close() -> Error::Closed.
    pub fn bucket_head(&self, bucket: u32) -> Result<u32> {
        Ok(head_read(self.region.read(0, BLOCK_SIZE)?, bucket))
    }

    pub(crate) fn set_bucket_head(&mut self, bucket: u32, head: u32) -> Result<()> {
        let b0 = self.superblock_mut()?;
        head_write(b0, bucket, head);
        meta_seal(b0);
        Ok(())
    }

    // ---------------- quarantine ----------------

    pub fn is_quarantined(&self, head: u32) -> bool {
        match self.quarantined.lock() {
            Ok(q) => q.contains(&head),
            Err(poisoned) => poisoned.into_inner().contains(&head),
        }
    }

    pub(crate) fn quarantine(&self, head: u32, why: &Error) {
        let inserted = match self.quarantined.lock() {
            Ok(mut q) => q.insert(head),
            Err(poisoned) => poisoned.into_inner().insert(head),
        };
        if inserted {
            self.metrics.record_quarantine();
            warn!("extent {} quarantined: {}", head, why);
        }
    }

    pub(crate) fn unquarantine(&self, head: u32) {
        match self.quarantined.lock() {
            Ok(mut q) => q.remove(&head),
            Err(poisoned) => poisoned.into_inner().remove(&head),
        };
    }

    pub fn quarantined(&self) -> Vec<u32> {
        let mut v: Vec<u32> = match self.quarantined.lock() {
            Ok(q) => q.iter().copied().collect(),
            Err(poisoned) => poisoned.into_inner().iter().copied().collect(),
        };
        v.sort_unstable();
        v
    }

    /// Общая проверка перед структурной мутацией экстента.
    pub(crate) fn ensure_mutable(&self, head: u32) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if self.is_quarantined(head) {
            return Err(Error::corrupt(format!(
                "extent {} is quarantined; reinit or repair it first",
                head
            )));
        }
        Ok(())
    }

    // ---------------- durability ----------------

    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }

    pub fn close(&mut self) -> Result<()> {
        self.region.close()
    }
}
