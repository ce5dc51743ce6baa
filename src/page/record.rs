//! page/record - упакованные KV-записи внутри блока экстента.
//!
//! Формат записи (LE):
//!   [key_len u32][key][value_len u32][value]
//! value_len == TOMBSTONE (u32::MAX) - надгробие, байтов значения нет.
//! key_len == 0 - конец записей в блоке (хвост блока занулён), поэтому пустые ключи запрещены.
//!
//! Запись никогда не пересекает границу блока; полезная ёмкость блока - BLOCK_PAYLOAD.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{BLOCK_PAYLOAD, REC_HDR_SIZE, TOMBSTONE};
use crate::error::{Error, Result};

/// Одна разобранная запись (ссылки в буфер блока).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    pub offset: usize,
    pub key: &'a [u8],
    /// None - tombstone.
    pub value: Option<&'a [u8]>,
}

impl RecordRef<'_> {
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Размер записи на диске.
#[inline]
pub fn record_len(key_len: usize, value: Option<usize>) -> usize {
    REC_HDR_SIZE + key_len + value.unwrap_or(0)
}

/// Проверить, что запись допустима и влезает в один блок.
pub fn check_record(key: &[u8], value: Option<&[u8]>) -> Result<usize> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty"));
    }
    let len = record_len(key.len(), value.map(|v| v.len()));
    if len > BLOCK_PAYLOAD {
        return Err(Error::RecordTooLarge {
            len,
            max: BLOCK_PAYLOAD,
        });
    }
    Ok(len)
}

/// Записать запись в buf (длина buf >= record_len). Возвращает число байт.
pub fn encode_into(buf: &mut [u8], key: &[u8], value: Option<&[u8]>) -> usize {
    let mut off = 0;
    LittleEndian::write_u32(&mut buf[off..off + 4], key.len() as u32);
    off += 4;
    buf[off..off + key.len()].copy_from_slice(key);
    off += key.len();
    match value {
        Some(v) => {
            LittleEndian::write_u32(&mut buf[off..off + 4], v.len() as u32);
            off += 4;
            buf[off..off + v.len()].copy_from_slice(v);
            off += v.len();
        }
        None => {
            LittleEndian::write_u32(&mut buf[off..off + 4], TOMBSTONE);
            off += 4;
        }
    }
    off
}

/// Обойти записи блока в порядке записи. Возвращает смещение конца записей (used bytes).
/// Выход записи за пределы payload -> Corrupt.
pub fn for_each_record<'a, F>(block: &'a [u8], block_no: u32, mut f: F) -> Result<usize>
where
    F: FnMut(RecordRef<'a>),
{
    let payload = &block[..BLOCK_PAYLOAD.min(block.len())];
    let mut off = 0usize;
    while off + 4 <= payload.len() {
        let key_len = LittleEndian::read_u32(&payload[off..off + 4]) as usize;
        if key_len == 0 {
            break;
        }
        let start = off;
        let key_end = off + 4 + key_len;
        if key_end + 4 > payload.len() {
            return Err(bad_record(block_no, start, "key overruns block"));
        }
        let key = &payload[off + 4..key_end];
        let vlen = LittleEndian::read_u32(&payload[key_end..key_end + 4]);
        off = key_end + 4;
        let value = if vlen == TOMBSTONE {
            None
        } else {
            let vend = off + vlen as usize;
            if vend > payload.len() {
                return Err(bad_record(block_no, start, "value overruns block"));
            }
            let v = &payload[off..vend];
            off = vend;
            Some(v)
        };
        f(RecordRef {
            offset: start,
            key,
            value,
        });
    }
    Ok(off)
}

/// Занятые байты блока (конец последней записи).
pub fn used_bytes(block: &[u8], block_no: u32) -> Result<usize> {
    for_each_record(block, block_no, |_| {})
}

fn bad_record(block_no: u32, off: usize, what: &str) -> Error {
    Error::corrupt(format!("block {} record @{}: {}", block_no, off, what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::BLOCK_SIZE;

    #[test]
    fn encode_and_scan_with_tombstones() {
        let mut block = vec![0u8; BLOCK_SIZE];
        let mut off = 0;
        off += encode_into(&mut block[off..], b"a", Some(b"1"));
        off += encode_into(&mut block[off..], b"bb", None);
        off += encode_into(&mut block[off..], b"a", Some(b""));

        let mut seen = Vec::new();
        let used = for_each_record(&block, 9, |r| {
            seen.push((r.key.to_vec(), r.value.map(|v| v.to_vec()), r.offset))
        })
        .unwrap();
        assert_eq!(used, off);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (b"a".to_vec(), Some(b"1".to_vec()), 0));
        assert_eq!(seen[1].1, None);
        assert_eq!(seen[2].1, Some(Vec::new()));
    }

    #[test]
    fn limits() {
        assert!(matches!(check_record(b"", Some(b"x")), Err(Error::InvalidKey(_))));
        let max_val = vec![0u8; BLOCK_PAYLOAD - REC_HDR_SIZE - 1];
        assert_eq!(check_record(b"k", Some(&max_val)).unwrap(), BLOCK_PAYLOAD);
        let too_big = vec![0u8; BLOCK_PAYLOAD];
        assert!(matches!(
            check_record(b"k", Some(&too_big)),
            Err(Error::RecordTooLarge { .. })
        ));
    }

    #[test]
    fn overrun_is_corrupt() {
        let mut block = vec![0u8; BLOCK_SIZE];
        LittleEndian::write_u32(&mut block[0..4], 3);
        block[4..7].copy_from_slice(b"key");
        LittleEndian::write_u32(&mut block[7..11], 5000);
        assert!(used_bytes(&block, 1).unwrap_err().is_corrupt());
    }
}
