//! pager/array - массив элементов фиксированного размера поверх Blob.
//!
//! Элемент i лежит в байтах [i * item_size .. (i + 1) * item_size) blob-а и может
//! пересекать границу блока. Длина массива = длина blob-а / item_size; размер
//! элемента не хранится в файле, его задаёт тот, кто открывает массив.

use crate::error::{Error, Result};

use super::blob::Blob;
use super::core::Pager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Array {
    pub blob: Blob,
    pub item_size: u32,
}

impl Array {
    pub fn create(pager: &mut Pager, item_size: u32) -> Result<Self> {
        check_item_size(item_size)?;
        Ok(Self {
            blob: Blob::create(pager)?,
            item_size,
        })
    }

    /// Открыть массив: длина blob-а обязана делиться на item_size.
    pub fn open(pager: &Pager, head: u32, item_size: u32) -> Result<Self> {
        check_item_size(item_size)?;
        let blob = Blob::open(pager, head)?;
        let bytes = blob.len(pager)?;
        if bytes % item_size as u64 != 0 {
            return Err(Error::corrupt(format!(
                "array {}: {} bytes is not a whole number of {}-byte items",
                head, bytes, item_size
            )));
        }
        Ok(Self { blob, item_size })
    }

    #[inline]
    pub fn head(&self) -> u32 {
        self.blob.head
    }

    pub fn len(&self, pager: &Pager) -> Result<u64> {
        Ok(self.blob.len(pager)? / self.item_size as u64)
    }

    pub fn is_empty(&self, pager: &Pager) -> Result<bool> {
        Ok(self.len(pager)? == 0)
    }

    pub fn get(&self, pager: &Pager, i: u64) -> Result<Vec<u8>> {
        let off = self.offset(pager, i)?;
        self.blob.read(pager, off, self.item_size as usize)
    }

    pub fn set(&self, pager: &mut Pager, i: u64, item: &[u8]) -> Result<()> {
        self.check_item(item)?;
        let off = self.offset(pager, i)?;
        self.blob.write(pager, off, item)
    }

    /// Добавить элемент в конец. Возвращает его индекс.
    pub fn push(&self, pager: &mut Pager, item: &[u8]) -> Result<u64> {
        self.check_item(item)?;
        let n = self.len(pager)?;
        let off = n * self.item_size as u64;
        self.blob.resize(pager, off + self.item_size as u64)?;
        self.blob.write(pager, off, item)?;
        Ok(n)
    }

    /// Снять последний элемент (None для пустого массива).
    pub fn pop(&self, pager: &mut Pager) -> Result<Option<Vec<u8>>> {
        let n = self.len(pager)?;
        if n == 0 {
            return Ok(None);
        }
        let item = self.get(pager, n - 1)?;
        self.blob.resize(pager, (n - 1) * self.item_size as u64)?;
        Ok(Some(item))
    }

    /// Изменить число элементов; новые элементы нулевые.
    pub fn resize(&self, pager: &mut Pager, items: u64) -> Result<()> {
        let bytes = items
            .checked_mul(self.item_size as u64)
            .ok_or(Error::CapacityExceeded { requested: u64::MAX })?;
        self.blob.resize(pager, bytes)
    }

    pub fn destroy(self, pager: &mut Pager) -> Result<()> {
        self.blob.destroy(pager)
    }

    fn offset(&self, pager: &Pager, i: u64) -> Result<u64> {
        let len = self.len(pager)?;
        if i >= len {
            return Err(Error::IndexOutOfRange { index: i, len });
        }
        Ok(i * self.item_size as u64)
    }

    fn check_item(&self, item: &[u8]) -> Result<()> {
        if item.len() != self.item_size as usize {
            return Err(Error::ItemSize {
                expected: self.item_size,
                got: item.len(),
            });
        }
        Ok(())
    }
}

fn check_item_size(item_size: u32) -> Result<()> {
    if item_size == 0 {
        return Err(Error::InvalidConfig("array item size must be positive".into()));
    }
    Ok(())
}
