// src/meta.rs - superblock (block 0)
//
// Формат block 0 (LE):
// MAGIC8 = "SPDBMETA"
// u32 version      = 1
// u32 block_size   = 4096
// u32 bucket_count (1 ..= MAX_BUCKETS)
// u32 hash_kind    (1 = xxhash64(seed=0), 2 = xxhash32(seed=0))
// u32 free_head    (0 = free-цепочка пуста)
// u32 free_count
// u32 next_block   (high-water mark: блоки [next_block .. size/4096) - предаллокация)
// u32 flags        (зарезервировано, 0)
// ... нули до 64
// [64 ..] u32 head × bucket_count (0 = у бакета ещё нет экстента)
// [4092 .. 4096) crc32 по байтам [0 .. 4092)
//
// Политика:
// - Любое изменение полей или голов бакетов заканчивается meta_seal (пересчёт crc).
// - meta_read проверяет magic/version/block_size/crc и диапазоны; любое нарушение -> Corrupt.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::consts::{
    BLOCK_SIZE, MAX_BUCKETS, META_HDR_SIZE, META_MAGIC, META_OFF_CRC, META_VERSION, NO_BLOCK,
};
use crate::error::{Error, Result};
use crate::hash::HashKind;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_BLOCK_SIZE: usize = 12;
const OFF_BUCKETS: usize = 16;
const OFF_HASH_KIND: usize = 20;
const OFF_FREE_HEAD: usize = 24;
const OFF_FREE_COUNT: usize = 28;
const OFF_NEXT_BLOCK: usize = 32;
const OFF_FLAGS: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaHeader {
    pub version: u32,
    pub block_size: u32,
    pub bucket_count: u32,
    pub hash_kind: HashKind,
    pub free_head: u32,
    pub free_count: u32,
    pub next_block: u32,
    pub flags: u32,
}

impl MetaHeader {
    pub fn new(bucket_count: u32, hash_kind: HashKind) -> Self {
        Self {
            version: META_VERSION,
            block_size: BLOCK_SIZE as u32,
            bucket_count,
            hash_kind,
            free_head: NO_BLOCK,
            free_count: 0,
            next_block: 1, // block 0 занят самим superblock
            flags: 0,
        }
    }
}

pub fn validate_bucket_count(buckets: u32) -> Result<()> {
    if buckets == 0 || buckets > MAX_BUCKETS {
        return Err(Error::InvalidConfig(format!(
            "buckets must be in [1 .. {}], got {}",
            MAX_BUCKETS, buckets
        )));
    }
    Ok(())
}

/// Записать поля заголовка (crc не трогает - см. meta_seal).
pub fn meta_write(block0: &mut [u8], h: &MetaHeader) {
    block0[OFF_MAGIC..OFF_MAGIC + 8].copy_from_slice(META_MAGIC);
    LittleEndian::write_u32(&mut block0[OFF_VERSION..], h.version);
    LittleEndian::write_u32(&mut block0[OFF_BLOCK_SIZE..], h.block_size);
    LittleEndian::write_u32(&mut block0[OFF_BUCKETS..], h.bucket_count);
    LittleEndian::write_u32(&mut block0[OFF_HASH_KIND..], h.hash_kind.to_u32());
    LittleEndian::write_u32(&mut block0[OFF_FREE_HEAD..], h.free_head);
    LittleEndian::write_u32(&mut block0[OFF_FREE_COUNT..], h.free_count);
    LittleEndian::write_u32(&mut block0[OFF_NEXT_BLOCK..], h.next_block);
    LittleEndian::write_u32(&mut block0[OFF_FLAGS..], h.flags);
}

/// Пересчитать crc block 0.
pub fn meta_seal(block0: &mut [u8]) {
    let crc = meta_crc(block0);
    LittleEndian::write_u32(&mut block0[META_OFF_CRC..META_OFF_CRC + 4], crc);
}

/// Полная инициализация block 0: нули, заголовок, все головы = 0, crc.
pub fn meta_init(block0: &mut [u8], h: &MetaHeader) -> Result<()> {
    validate_bucket_count(h.bucket_count)?;
    block0.fill(0);
    meta_write(block0, h);
    meta_seal(block0);
    Ok(())
}

/// Прочитать и проверить заголовок block 0.
pub fn meta_read(block0: &[u8]) -> Result<MetaHeader> {
    if block0.len() < BLOCK_SIZE {
        return Err(Error::corrupt("superblock is truncated"));
    }
    if &block0[OFF_MAGIC..OFF_MAGIC + 8] != META_MAGIC {
        return Err(Error::corrupt(format!(
            "bad superblock magic (expected {:?}, got {:?})",
            META_MAGIC,
            &block0[OFF_MAGIC..OFF_MAGIC + 8]
        )));
    }
    let stored = LittleEndian::read_u32(&block0[META_OFF_CRC..META_OFF_CRC + 4]);
    let calc = meta_crc(block0);
    if stored != calc {
        return Err(Error::corrupt(format!(
            "superblock crc mismatch (stored={:#010x}, calc={:#010x})",
            stored, calc
        )));
    }

    let version = LittleEndian::read_u32(&block0[OFF_VERSION..]);
    if version != META_VERSION {
        return Err(Error::corrupt(format!(
            "unsupported superblock version {} (expected {})",
            version, META_VERSION
        )));
    }
    let block_size = LittleEndian::read_u32(&block0[OFF_BLOCK_SIZE..]);
    if block_size as usize != BLOCK_SIZE {
        return Err(Error::corrupt(format!(
            "block size {} unsupported (expected {})",
            block_size, BLOCK_SIZE
        )));
    }
    let bucket_count = LittleEndian::read_u32(&block0[OFF_BUCKETS..]);
    validate_bucket_count(bucket_count).map_err(|e| Error::corrupt(e.to_string()))?;
    let hk = LittleEndian::read_u32(&block0[OFF_HASH_KIND..]);
    let hash_kind =
        HashKind::from_u32(hk).ok_or_else(|| Error::corrupt(format!("unknown hash kind {}", hk)))?;
    let next_block = LittleEndian::read_u32(&block0[OFF_NEXT_BLOCK..]);
    if next_block == 0 {
        return Err(Error::corrupt("next_block must be >= 1"));
    }

    Ok(MetaHeader {
        version,
        block_size,
        bucket_count,
        hash_kind,
        free_head: LittleEndian::read_u32(&block0[OFF_FREE_HEAD..]),
        free_count: LittleEndian::read_u32(&block0[OFF_FREE_COUNT..]),
        next_block,
        flags: LittleEndian::read_u32(&block0[OFF_FLAGS..]),
    })
}

#[inline]
pub fn head_read(block0: &[u8], bucket: u32) -> u32 {
    let off = META_HDR_SIZE + bucket as usize * 4;
    LittleEndian::read_u32(&block0[off..off + 4])
}

/// Записать голову бакета. crc - отдельно через meta_seal.
#[inline]
pub fn head_write(block0: &mut [u8], bucket: u32, head: u32) {
    let off = META_HDR_SIZE + bucket as usize * 4;
    LittleEndian::write_u32(&mut block0[off..off + 4], head);
}

fn meta_crc(block0: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(&block0[..META_OFF_CRC]);
    h.finalize()
}
