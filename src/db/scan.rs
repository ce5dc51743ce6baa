//! db/scan - обход записей экстента бакета и сборка живых пар.
//!
//! Порядок обхода = порядок записи: логические блоки 0..len, внутри блока - по смещению.
//! Поэтому "последняя запись по ключу побеждает".

use std::collections::HashMap;

use crate::consts::NO_BLOCK;
use crate::error::Result;
use crate::page::{for_each_record, RecordRef};

use super::core::Db;

/// Итог обхода одного бакета.
#[derive(Debug, Default, Clone)]
pub struct BucketScan {
    /// Живые пары в порядке первого появления ключа.
    pub live: Vec<(Vec<u8>, Vec<u8>)>,
    pub records: u64,
    pub tombstones: u64,
}

impl Db {
    /// Обойти все записи экстента по порядку. f(logical_index, record).
    /// Битая запись -> Corrupt, экстент уходит в карантин.
    pub(crate) fn scan_extent<F>(&self, head: u32, mut f: F) -> Result<()>
    where
        F: FnMut(u32, RecordRef<'_>),
    {
        let res = self.walk_extent(head, &mut f);
        if let Err(e) = &res {
            if e.is_corrupt() {
                self.pager.quarantine(head, e);
            }
        }
        res
    }

    fn walk_extent<F>(&self, head: u32, f: &mut F) -> Result<()>
    where
        F: FnMut(u32, RecordRef<'_>),
    {
        let ext = self.pager.extent(head)?;
        for i in 0..ext.len() {
            let phys = self.pager.resolve_in(&ext, i)?;
            let block = self.pager.block(phys)?;
            for_each_record(block, phys, |r| f(i, r))?;
        }
        Ok(())
    }

    /// Живые пары бакета + счётчики записей/надгробий.
    pub fn scan_bucket(&self, bucket: u32) -> Result<BucketScan> {
        let head = self.bucket_head(bucket)?;
        let mut out = BucketScan::default();
        if head == NO_BLOCK {
            return Ok(out);
        }

        let mut order: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();
        let mut pos: HashMap<Vec<u8>, usize> = HashMap::new();
        self.scan_extent(head, |_, r| {
            out.records += 1;
            if r.is_tombstone() {
                out.tombstones += 1;
            }
            let v = r.value.map(|v| v.to_vec());
            match pos.get(r.key) {
                Some(&idx) => order[idx].1 = v,
                None => {
                    pos.insert(r.key.to_vec(), order.len());
                    order.push((r.key.to_vec(), v));
                }
            }
        })?;

        out.live = order
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
        Ok(out)
    }

    /// Обойти все живые пары хранилища (бакет за бакетом).
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]),
    {
        self.ensure_open()?;
        for b in 0..self.dir.bucket_count {
            let scan = self.scan_bucket(b)?;
            for (k, v) in &scan.live {
                f(k, v);
            }
        }
        Ok(())
    }

    /// Число живых ключей.
    pub fn len(&self) -> Result<u64> {
        let mut n = 0u64;
        for b in 0..self.dir.bucket_count {
            n += self.scan_bucket(b)?.live.len() as u64;
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
