//! pager/blob - байтовый blob поверх экстента: чтение/запись по смещению и resize.
//!
//! Поток байт blob-а - это payload логических блоков экстента подряд (по BLOCK_PAYLOAD
//! на блок). Первые BLOB_HDR_SIZE байт потока - длина (u64 LE), затем содержимое.
//! Пока blob помещается в голову, экстент остаётся small и длина с данными покрыты
//! checksum головы.
//!
//! Инварианты:
//! - длина <= ёмкость экстента; иначе Corrupt при открытии;
//! - байты потока за длиной нулевые (усечение зануляет хвост, новые блоки выдаются
//!   занулёнными), поэтому рост blob-а не зануляет ничего сам;
//! - рост: сначала экстент (header_commit), потом длина; усечение: хвост, длина,
//!   потом shrink. Оборванная операция оставляет длину не больше ёмкости.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::consts::{BLOB_HDR_SIZE, BLOCK_PAYLOAD, MAX_EXTENT_BLOCKS};
use crate::error::{Error, Result};

use super::core::Pager;
use super::extent::Extent;

/// Ручка blob-а: голова его экстента. Как и Directory, сама ничего не хранит,
/// все операции идут через Pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    pub head: u32,
}

/// Сколько логических блоков нужно под blob длины len (минимум 1 - голова).
fn blocks_for(len: u64) -> Result<u32> {
    let total = len
        .checked_add(BLOB_HDR_SIZE as u64)
        .ok_or(Error::CapacityExceeded { requested: u64::MAX })?;
    let blocks = (total + BLOCK_PAYLOAD as u64 - 1) / BLOCK_PAYLOAD as u64;
    if blocks > MAX_EXTENT_BLOCKS as u64 {
        return Err(Error::CapacityExceeded { requested: blocks });
    }
    Ok(blocks as u32)
}

/// Ёмкость blob-а (в байтах содержимого) для экстента ext.
#[inline]
fn capacity(ext: &Extent) -> u64 {
    ext.len() as u64 * BLOCK_PAYLOAD as u64 - BLOB_HDR_SIZE as u64
}

/// Логический блок и смещение в нём для позиции потока.
fn split(pos: u64) -> Result<(u32, usize)> {
    let blk = u32::try_from(pos / BLOCK_PAYLOAD as u64)
        .map_err(|_| Error::CapacityExceeded { requested: u64::MAX })?;
    Ok((blk, (pos % BLOCK_PAYLOAD as u64) as usize))
}

impl Blob {
    /// Новый пустой blob (small-экстент длины 0).
    pub fn create(pager: &mut Pager) -> Result<Self> {
        let head = pager.create_extent()?;
        Ok(Self { head })
    }

    /// Открыть существующий blob: полная проверка экстента и длины.
    pub fn open(pager: &Pager, head: u32) -> Result<Self> {
        let ext = pager.verify_extent(head)?;
        let blob = Self { head };
        if let Err(e) = blob.len_in(pager, &ext) {
            if e.is_corrupt() {
                pager.quarantine(head, &e);
            }
            return Err(e);
        }
        Ok(blob)
    }

    pub fn len(&self, pager: &Pager) -> Result<u64> {
        let ext = pager.extent(self.head)?;
        self.len_in(pager, &ext)
    }

    pub fn is_empty(&self, pager: &Pager) -> Result<bool> {
        Ok(self.len(pager)? == 0)
    }

    /// Сколько байт помещается без роста экстента.
    pub fn capacity(&self, pager: &Pager) -> Result<u64> {
        Ok(capacity(&pager.extent(self.head)?))
    }

    fn len_in(&self, pager: &Pager, ext: &Extent) -> Result<u64> {
        let mut buf = [0u8; BLOB_HDR_SIZE];
        stream_read(pager, ext, 0, &mut buf)?;
        let len = LittleEndian::read_u64(&buf);
        if len > capacity(ext) {
            return Err(Error::corrupt(format!(
                "blob {}: length {} exceeds capacity {}",
                self.head,
                len,
                capacity(ext)
            )));
        }
        Ok(len)
    }

    /// Прочитать len байт с offset. Диапазон обязан лежать внутри blob-а.
    pub fn read(&self, pager: &Pager, offset: u64, len: usize) -> Result<Vec<u8>> {
        let ext = pager.extent(self.head)?;
        check_range(offset, len as u64, self.len_in(pager, &ext)?)?;
        let mut out = vec![0u8; len];
        stream_read(pager, &ext, BLOB_HDR_SIZE as u64 + offset, &mut out)?;
        Ok(out)
    }

    pub fn read_all(&self, pager: &Pager) -> Result<Vec<u8>> {
        let len = self.len(pager)?;
        let len = usize::try_from(len)
            .map_err(|_| Error::InvalidConfig(format!("blob of {} bytes exceeds address space", len)))?;
        self.read(pager, 0, len)
    }

    /// Перезаписать байты [offset .. offset + data.len()). Длина не меняется.
    pub fn write(&self, pager: &mut Pager, offset: u64, data: &[u8]) -> Result<()> {
        pager.ensure_mutable(self.head)?;
        let ext = pager.extent(self.head)?;
        check_range(offset, data.len() as u64, self.len_in(pager, &ext)?)?;
        stream_write(pager, &ext, BLOB_HDR_SIZE as u64 + offset, data)
    }

    /// Изменить длину: рост дописывает нули, усечение зануляет отброшенные байты
    /// и возвращает лишние блоки во free-цепочку.
    pub fn resize(&self, pager: &mut Pager, new_len: u64) -> Result<()> {
        pager.ensure_mutable(self.head)?;
        let ext = pager.extent(self.head)?;
        let old_len = self.len_in(pager, &ext)?;
        if new_len == old_len {
            return Ok(());
        }
        let need = blocks_for(new_len)?;
        let target = if need <= 1 { 0 } else { need };

        if new_len > old_len {
            if need > ext.len() {
                pager.grow(self.head, target)?;
            }
            let ext = pager.extent(self.head)?;
            write_len(pager, &ext, new_len)?;
        } else {
            // хвост внутри остающихся блоков; остальное уходит вместе с блоками
            let keep = (need as u64 * BLOCK_PAYLOAD as u64 - BLOB_HDR_SIZE as u64).min(old_len);
            if keep > new_len {
                let zeros = vec![0u8; (keep - new_len) as usize];
                stream_write(pager, &ext, BLOB_HDR_SIZE as u64 + new_len, &zeros)?;
            }
            write_len(pager, &ext, new_len)?;
            if need < ext.len() {
                pager.shrink(self.head, target)?;
            }
        }
        debug!("blob {} resized {} -> {} bytes", self.head, old_len, new_len);
        Ok(())
    }

    /// Заменить содержимое целиком (хвост за новой длиной зануляет resize).
    pub fn set(&self, pager: &mut Pager, data: &[u8]) -> Result<()> {
        self.resize(pager, data.len() as u64)?;
        self.write(pager, 0, data)
    }

    /// Освободить blob вместе с головой.
    pub fn destroy(self, pager: &mut Pager) -> Result<()> {
        pager.destroy_extent(self.head)
    }
}

fn check_range(offset: u64, len: u64, size: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::ByteRange { offset, len, size }),
    }
}

fn write_len(pager: &mut Pager, ext: &Extent, len: u64) -> Result<()> {
    let mut buf = [0u8; BLOB_HDR_SIZE];
    LittleEndian::write_u64(&mut buf, len);
    stream_write(pager, ext, 0, &buf)
}

fn stream_read(pager: &Pager, ext: &Extent, pos: u64, out: &mut [u8]) -> Result<()> {
    let mut done = 0usize;
    while done < out.len() {
        let (blk, off) = split(pos + done as u64)?;
        let n = (BLOCK_PAYLOAD - off).min(out.len() - done);
        let data = pager.data(ext, blk)?;
        out[done..done + n].copy_from_slice(&data[off..off + n]);
        done += n;
    }
    Ok(())
}

fn stream_write(pager: &mut Pager, ext: &Extent, pos: u64, src: &[u8]) -> Result<()> {
    let mut done = 0usize;
    while done < src.len() {
        let (blk, off) = split(pos + done as u64)?;
        let n = (BLOCK_PAYLOAD - off).min(src.len() - done);
        let chunk = &src[done..done + n];
        pager.with_data_mut(ext, blk, |d| d[off..off + n].copy_from_slice(chunk))?;
        done += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_math() {
        assert_eq!(blocks_for(0).unwrap(), 1);
        assert_eq!(blocks_for((BLOCK_PAYLOAD - BLOB_HDR_SIZE) as u64).unwrap(), 1);
        assert_eq!(blocks_for((BLOCK_PAYLOAD - BLOB_HDR_SIZE) as u64 + 1).unwrap(), 2);
        let max = MAX_EXTENT_BLOCKS as u64 * BLOCK_PAYLOAD as u64 - BLOB_HDR_SIZE as u64;
        assert_eq!(blocks_for(max).unwrap(), MAX_EXTENT_BLOCKS);
        assert!(matches!(
            blocks_for(max + 1),
            Err(Error::CapacityExceeded { .. })
        ));
        assert!(blocks_for(u64::MAX).is_err());
        assert_eq!(split(BLOCK_PAYLOAD as u64 + 3).unwrap(), (1, 3));
    }

    #[test]
    fn ranges() {
        assert!(check_range(0, 0, 0).is_ok());
        assert!(check_range(5, 5, 10).is_ok());
        assert!(matches!(
            check_range(6, 5, 10),
            Err(Error::ByteRange { offset: 6, len: 5, size: 10 })
        ));
        assert!(check_range(u64::MAX, 1, 10).is_err());
    }
}
