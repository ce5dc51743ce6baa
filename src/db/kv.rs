//! db/kv - одиночные операции put/get/delete для Db.
//!
//! - put: дописывает запись в последний логический блок экстента бакета; если не влезает,
//!   экстент растёт на один блок (записи никогда не пересекают границу блока).
//!   Потолок экстента (CapacityExceeded) наружу выходит как OutOfSpace.
//! - delete: надгробие, только если ключ сейчас живой.
//! - get: полный проход по записям, последняя по ключу побеждает; надгробие -> None.

use log::debug;

use crate::consts::{BLOCK_PAYLOAD, NO_BLOCK};
use crate::error::{Error, Result};
use crate::page::{check_record, encode_into, used_bytes};

use super::core::Db;

impl Db {
    /// Получить значение по ключу.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(Error::InvalidKey("key must not be empty"));
        }
        let bucket = self.dir.bucket_of_key(key);
        let head = self.bucket_head(bucket)?;
        if head == NO_BLOCK {
            return Ok(None);
        }
        let mut found: Option<Option<Vec<u8>>> = None;
        self.scan_extent(head, |_, r| {
            if r.key == key {
                found = Some(r.value.map(|v| v.to_vec()));
            }
        })?;
        Ok(found.flatten())
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Записать ключ/значение (новая запись затеняет прежние).
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let len = check_record(key, Some(value))?;
        self.append(key, Some(value), len)
    }

    /// Удалить ключ. Возвращает true, если ключ был живым (и записано надгробие).
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.ensure_writable()?;
        let len = check_record(key, None)?;
        if self.get(key)?.is_none() {
            return Ok(false);
        }
        self.append(key, None, len)?;
        Ok(true)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>, len: usize) -> Result<()> {
        let bucket = self.dir.bucket_of_key(key);
        let mut head = self.bucket_head(bucket)?;
        if head == NO_BLOCK {
            head = self.pager.create_extent()?;
            self.dir.set_head(&mut self.pager, bucket, head)?;
            debug!("bucket {} got extent {}", bucket, head);
        }
        self.pager.ensure_mutable(head)?;

        let mut ext = self.pager.extent(head)?;
        let mut last = ext.len() - 1;
        let mut off = {
            let phys = self.pager.resolve_in(&ext, last)?;
            used_bytes(self.pager.block(phys)?, phys)?
        };

        if off + len > BLOCK_PAYLOAD {
            // small-экстент сразу становится regular из двух блоков
            let target = if ext.is_small() { 2 } else { ext.block_count + 1 };
            self.pager.grow(head, target).map_err(|e| match e {
                Error::CapacityExceeded { .. } => Error::OutOfSpace {
                    bucket,
                    source: Box::new(e),
                },
                other => other,
            })?;
            ext = self.pager.extent(head)?;
            last = ext.len() - 1;
            off = 0;
        }

        self.pager
            .with_data_mut(&ext, last, |data| encode_into(&mut data[off..], key, value))?;
        Ok(())
    }
}
