//! db/doctor - проверка целостности хранилища с JSON-отчётом.
//!
//! Семантика:
//! - Каждый блок из [1 .. next_block) должен принадлежать ровно одному владельцу:
//!   экстенту бакета (голова, index-блоки, данные) либо free-цепочке.
//! - Блок с двумя владельцами - aliased; блок без владельца - orphan.
//! - Экстенты проверяются полностью: заголовок, checksum, диапазоны указателей, записи.
//! - Free-цепочка: маркеры, диапазоны, длина == free_count, отсутствие циклов.
//!
//! Doctor только читает; единственный побочный эффект - карантин битых экстентов.

use serde::Serialize;

use crate::consts::NO_BLOCK;
use crate::error::Result;

use super::core::Db;

#[derive(Debug, Clone, Serialize)]
pub struct BucketIssue {
    pub bucket: u32,
    pub head: u32,
    pub error: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DoctorReport {
    pub file_blocks: u64,
    pub next_block: u32,
    pub bucket_count: u32,
    pub used_buckets: u32,
    pub extent_blocks: u64,
    pub free_count: u32,
    pub free_chain_error: Option<String>,
    pub corrupt_buckets: Vec<BucketIssue>,
    pub aliased_blocks: Vec<u32>,
    pub orphan_blocks: Vec<u32>,
    pub records: u64,
    pub tombstones: u64,
    pub live_keys: u64,
}

impl DoctorReport {
    /// Нет ни битых бакетов, ни алиасов, ни проблем free-цепочки.
    /// Сироты допустимы (их собирает sweep_orphans).
    pub fn is_consistent(&self) -> bool {
        self.corrupt_buckets.is_empty()
            && self.aliased_blocks.is_empty()
            && self.free_chain_error.is_none()
    }

    pub fn is_clean(&self) -> bool {
        self.is_consistent() && self.orphan_blocks.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Db {
    pub fn doctor(&self) -> Result<DoctorReport> {
        self.ensure_open()?;
        let meta = &self.pager.meta;
        let next = meta.next_block as usize;
        let mut rep = DoctorReport {
            file_blocks: self.pager.region().block_count(),
            next_block: meta.next_block,
            bucket_count: self.dir.bucket_count,
            free_count: meta.free_count,
            ..Default::default()
        };

        // owners[i] - сколько раз блок i встретился
        let mut owners = vec![0u8; next];
        owners[0] = 1; // superblock
        let mut mark = |b: u32, rep: &mut DoctorReport| {
            let slot = &mut owners[b as usize];
            if *slot == 1 {
                rep.aliased_blocks.push(b);
            }
            *slot = slot.saturating_add(1);
        };

        for b in 0..self.dir.bucket_count {
            let head = self.bucket_head(b)?;
            if head == NO_BLOCK {
                continue;
            }
            rep.used_buckets += 1;
            match self.pager.collect_blocks(head) {
                Ok(blocks) => {
                    rep.extent_blocks += blocks.len() as u64;
                    for blk in blocks {
                        mark(blk, &mut rep);
                    }
                }
                Err(e) => {
                    rep.corrupt_buckets.push(BucketIssue {
                        bucket: b,
                        head,
                        error: e.to_string(),
                    });
                    // голову всё равно считаем занятой, чтобы не объявить её сиротой
                    if (head as usize) < next {
                        mark(head, &mut rep);
                    }
                    continue;
                }
            }
            match self.scan_bucket(b) {
                Ok(scan) => {
                    rep.records += scan.records;
                    rep.tombstones += scan.tombstones;
                    rep.live_keys += scan.live.len() as u64;
                }
                Err(e) => rep.corrupt_buckets.push(BucketIssue {
                    bucket: b,
                    head,
                    error: e.to_string(),
                }),
            }
        }

        match self.pager.free_chain() {
            Ok(chain) => {
                for blk in chain {
                    mark(blk, &mut rep);
                }
            }
            Err(e) => rep.free_chain_error = Some(e.to_string()),
        }

        rep.orphan_blocks = owners
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == 0)
            .map(|(i, _)| i as u32)
            .collect();
        rep.aliased_blocks.sort_unstable();
        Ok(rep)
    }
}
