// src/dir.rs - каталог бакетов: bucket -> голова экстента.
//
// Сам массив голов живёт в block 0 (после заголовка superblock), поэтому Directory -
// лёгкий дескриптор геометрии (bucket_count + hash_kind), а чтение/запись голов идёт
// через Pager. Голова 0 - у бакета ещё нет экстента.

use crate::consts::NO_BLOCK;
use crate::error::{Error, Result};
use crate::hash::{bucket_of_key, HashKind};
use crate::meta::MetaHeader;
use crate::pager::Pager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    pub bucket_count: u32,
    pub hash_kind: HashKind,
}

impl Directory {
    pub fn from_meta(meta: &MetaHeader) -> Self {
        Self {
            bucket_count: meta.bucket_count,
            hash_kind: meta.hash_kind,
        }
    }

    #[inline]
    pub fn bucket_of_key(&self, key: &[u8]) -> u32 {
        bucket_of_key(self.hash_kind, key, self.bucket_count)
    }

    fn check(&self, bucket: u32) -> Result<()> {
        if bucket >= self.bucket_count {
            return Err(Error::InvalidConfig(format!(
                "bucket {} out of range 0..{}",
                bucket, self.bucket_count
            )));
        }
        Ok(())
    }

    pub fn head(&self, pager: &Pager, bucket: u32) -> Result<u32> {
        self.check(bucket)?;
        pager.bucket_head(bucket)
    }

    /// Перезаписать голову бакета (block 0 перезапечатывается).
    pub fn set_head(&self, pager: &mut Pager, bucket: u32, head: u32) -> Result<()> {
        self.check(bucket)?;
        pager.set_bucket_head(bucket, head)
    }

    /// Число бакетов, у которых уже есть экстент.
    pub fn count_used_buckets(&self, pager: &Pager) -> Result<u32> {
        let mut n = 0;
        for b in 0..self.bucket_count {
            if pager.bucket_head(b)? != NO_BLOCK {
                n += 1;
            }
        }
        Ok(n)
    }
}
