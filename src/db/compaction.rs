//! db/compaction - переупаковка бакета в минимальный экстент (только явный вызов).
//!
//! - Есть живые записи: собираем их в новый экстент, переключаем голову бакета,
//!   затем освобождаем старый экстент целиком (copy-on-write: до переключения старый
//!   экстент не тронут).
//! - Живых записей нет: экстент сжимается до small-состояния на месте, payload головы
//!   зануляется. Голова бакета не меняется.

use log::{info, warn};
use serde::Serialize;

use crate::consts::{BLOCK_PAYLOAD, NO_BLOCK};
use crate::error::Result;
use crate::page::{encode_into, record_len};

use super::core::Db;

#[derive(Debug, Default, Clone, Serialize)]
pub struct CompactBucketReport {
    pub bucket: u32,
    pub records_before: u64,
    pub keys_kept: u64,
    pub blocks_before: u64,
    pub blocks_after: u64,
    pub old_head: u32,
    pub new_head: u32,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CompactSummary {
    pub buckets_total: u32,
    pub buckets_compacted: u32,
    pub keys_kept_sum: u64,
    pub blocks_before_sum: u64,
    pub blocks_after_sum: u64,
}

impl Db {
    pub fn compact_bucket(&mut self, bucket: u32) -> Result<CompactBucketReport> {
        self.ensure_writable()?;
        let mut rep = CompactBucketReport {
            bucket,
            ..Default::default()
        };
        let head = self.bucket_head(bucket)?;
        if head == NO_BLOCK {
            return Ok(rep);
        }
        self.pager.ensure_mutable(head)?;

        let scan = self.scan_bucket(bucket)?;
        rep.records_before = scan.records;
        rep.keys_kept = scan.live.len() as u64;
        rep.blocks_before = self.pager.collect_blocks(head)?.len() as u64;
        rep.old_head = head;

        if scan.live.is_empty() {
            self.pager.shrink(head, 0)?;
            let ext = self.pager.extent(head)?;
            self.pager.with_data_mut(&ext, 0, |d| d.fill(0))?;
            rep.new_head = head;
            rep.blocks_after = 1;
        } else {
            let new_head = self.pager.create_extent()?;
            if let Err(e) = self.fill_extent(new_head, &scan.live) {
                if let Err(e2) = self.pager.destroy_extent(new_head) {
                    warn!("compact bucket {}: cleanup of {} failed: {}", bucket, new_head, e2);
                }
                return Err(e);
            }
            self.dir.set_head(&mut self.pager, bucket, new_head)?;
            self.pager.destroy_extent(head)?;
            rep.new_head = new_head;
            rep.blocks_after = self.pager.collect_blocks(new_head)?.len() as u64;
        }

        self.pager.metrics.record_compaction();
        info!(
            "compact bucket {}: records {} -> {}, blocks {} -> {}",
            bucket, rep.records_before, rep.keys_kept, rep.blocks_before, rep.blocks_after
        );
        Ok(rep)
    }

    /// Компактация всех бакетов, у которых есть экстент.
    pub fn compact_all(&mut self) -> Result<CompactSummary> {
        self.ensure_writable()?;
        let mut sum = CompactSummary {
            buckets_total: self.dir.bucket_count,
            ..Default::default()
        };
        for b in 0..self.dir.bucket_count {
            if self.bucket_head(b)? == NO_BLOCK {
                continue;
            }
            let r = self.compact_bucket(b)?;
            sum.buckets_compacted += 1;
            sum.keys_kept_sum += r.keys_kept;
            sum.blocks_before_sum += r.blocks_before;
            sum.blocks_after_sum += r.blocks_after;
        }
        Ok(sum)
    }

    /// Упаковать пары в пустой small-экстент head: блок за блоком, без разрывов записей.
    fn fill_extent(&mut self, head: u32, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        // раскладка: номер блока для каждой записи
        let mut plan = Vec::with_capacity(pairs.len());
        let (mut blk, mut used) = (0u32, 0usize);
        for (k, v) in pairs {
            let len = record_len(k.len(), Some(v.len()));
            if used + len > BLOCK_PAYLOAD {
                blk += 1;
                used = 0;
            }
            plan.push((blk, used));
            used += len;
        }
        let blocks = blk + 1;
        if blocks > 1 {
            self.pager.grow(head, blocks)?;
        }

        let ext = self.pager.extent(head)?;
        for ((k, v), &(blk, off)) in pairs.iter().zip(plan.iter()) {
            self.pager
                .with_data_mut(&ext, blk, |data| encode_into(&mut data[off..], k, Some(v)))?;
        }
        Ok(())
    }
}
