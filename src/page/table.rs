//! page/table - page-table блок экстента: слоты указателей + трейлер PageHeader.
//!
//! Layout (LE), см. consts:
//!   [0    .. 2048) прямые слоты, логический i < LEVEL_ONE -> физический индекс
//!   [2048 .. 4088) косвенные слоты: LEVEL_ONE + ((i - LEVEL_ONE) >> INDEX_BITS) -> index-блок
//!   [4088 .. 4096) PageHeader { block_count u32, checksum u32 }
//!
//! block_count == 0 - small-экстент: сама голова и есть единственный блок данных,
//! байты [0 .. 4088) - полезная нагрузка, а не слоты.
//!
//! Checksum (crc32) покрывает block_count и живую часть блока:
//! - small: весь payload [0 .. 4088), поэтому каждая запись в small-голову
//!   перезапечатывает заголовок;
//! - regular: только живые слоты (прямые 0..min(n, LEVEL_ONE) и косвенные
//!   LEVEL_ONE..LEVEL_ONE + index_blocks_for(n)). Слоты за ними - мусор, который
//!   никто не читает; grow пишет туда до коммита, не ломая прежний checksum.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::consts::{
    BLOCK_SIZE, INDEX_BITS, INDEX_MASK, INDEX_SIZE, LEVEL_ONE, MAX_EXTENT_BLOCKS,
    PAGE_HDR_OFF, PAGE_OFF_BLOCK_COUNT, PAGE_OFF_CHECKSUM,
};
use crate::error::{Error, Result};

/// Трейлер page-table блока.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageHeader {
    pub block_count: u32,
    pub checksum: u32,
}

/// Где лежит указатель на логический блок i.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Прямо в page-table: слот i.
    Direct(u32),
    /// Через index-блок: page-table слот `i0` -> index-блок, в нём слот `i1`.
    Indirect { i0: u32, i1: u32 },
}

/// Разложить логический индекс по схеме двух уровней.
/// Вызывающий обязан проверить i < MAX_EXTENT_BLOCKS.
#[inline]
pub fn locate(i: u32) -> Slot {
    debug_assert!(i < MAX_EXTENT_BLOCKS);
    if i < LEVEL_ONE {
        Slot::Direct(i)
    } else {
        let rel = i - LEVEL_ONE;
        Slot::Indirect {
            i0: LEVEL_ONE + (rel >> INDEX_BITS),
            i1: rel & INDEX_MASK,
        }
    }
}

/// Нужен ли новый index-блок при добавлении логического блока i
/// (i - первый блок своего index-блока).
#[inline]
pub fn starts_index_block(i: u32) -> bool {
    i >= LEVEL_ONE && (i - LEVEL_ONE) & INDEX_MASK == 0
}

/// Сколько index-блоков нужно экстенту из n логических блоков.
#[inline]
pub fn index_blocks_for(n: u32) -> u32 {
    if n <= LEVEL_ONE {
        0
    } else {
        (n - LEVEL_ONE + INDEX_SIZE - 1) / INDEX_SIZE
    }
}

// ---------------- header ----------------

pub fn header_read(block: &[u8]) -> PageHeader {
    debug_assert_eq!(block.len(), BLOCK_SIZE);
    PageHeader {
        block_count: LittleEndian::read_u32(&block[PAGE_OFF_BLOCK_COUNT..PAGE_OFF_BLOCK_COUNT + 4]),
        checksum: LittleEndian::read_u32(&block[PAGE_OFF_CHECKSUM..PAGE_OFF_CHECKSUM + 4]),
    }
}

/// Посчитать checksum по текущему содержимому блока для заданного block_count.
/// block_count не выше MAX_EXTENT_BLOCKS (header_verify проверяет это раньше).
pub fn compute_checksum(block: &[u8], block_count: u32) -> u32 {
    let mut h = Crc32::new();
    let mut buf4 = [0u8; 4];
    LittleEndian::write_u32(&mut buf4, block_count);
    h.update(&buf4);
    if block_count == 0 {
        h.update(&block[..PAGE_HDR_OFF]);
    } else {
        let direct = block_count.min(LEVEL_ONE) as usize * 4;
        let indirect = index_blocks_for(block_count) as usize * 4;
        let ind_off = LEVEL_ONE as usize * 4;
        h.update(&block[..direct]);
        h.update(&block[ind_off..ind_off + indirect]);
    }
    h.finalize()
}

/// Закоммитить заголовок: block_count + пересчитанный checksum.
/// Вызывать последним шагом структурной мутации.
pub fn header_commit(block: &mut [u8], block_count: u32) {
    let crc = compute_checksum(block, block_count);
    LittleEndian::write_u32(
        &mut block[PAGE_OFF_BLOCK_COUNT..PAGE_OFF_BLOCK_COUNT + 4],
        block_count,
    );
    LittleEndian::write_u32(&mut block[PAGE_OFF_CHECKSUM..PAGE_OFF_CHECKSUM + 4], crc);
}

/// Прочитать и проверить заголовок. Несовпадение checksum или block_count выше
/// потолка -> Corrupt.
pub fn header_verify(block: &[u8], head: u32) -> Result<PageHeader> {
    let h = header_read(block);
    if h.block_count > MAX_EXTENT_BLOCKS {
        return Err(Error::corrupt(format!(
            "page table {}: block_count {} exceeds ceiling {}",
            head, h.block_count, MAX_EXTENT_BLOCKS
        )));
    }
    let calc = compute_checksum(block, h.block_count);
    if calc != h.checksum {
        return Err(Error::corrupt(format!(
            "page table {}: checksum mismatch (stored={:#010x}, calc={:#010x})",
            head, h.checksum, calc
        )));
    }
    Ok(h)
}

/// Инициализировать блок как пустой small-экстент.
pub fn init_small(block: &mut [u8]) {
    block.fill(0);
    header_commit(block, 0);
}

// ---------------- slots ----------------

#[inline]
pub fn slot_get(block: &[u8], slot: u32) -> u32 {
    let off = slot as usize * 4;
    LittleEndian::read_u32(&block[off..off + 4])
}

#[inline]
pub fn slot_set(block: &mut [u8], slot: u32, value: u32) {
    let off = slot as usize * 4;
    LittleEndian::write_u32(&mut block[off..off + 4], value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::INDIRECT_SLOTS;

    #[test]
    fn locate_two_levels() {
        assert_eq!(locate(0), Slot::Direct(0));
        assert_eq!(locate(511), Slot::Direct(511));
        assert_eq!(locate(512), Slot::Indirect { i0: 512, i1: 0 });
        assert_eq!(locate(512 + 1023), Slot::Indirect { i0: 512, i1: 1023 });
        assert_eq!(locate(512 + 1024), Slot::Indirect { i0: 513, i1: 0 });
        let last = MAX_EXTENT_BLOCKS - 1;
        assert_eq!(
            locate(last),
            Slot::Indirect { i0: LEVEL_ONE + INDIRECT_SLOTS - 1, i1: INDEX_MASK }
        );
        // последний косвенный слот лежит строго до трейлера
        assert!((LEVEL_ONE + INDIRECT_SLOTS) as usize * 4 <= PAGE_HDR_OFF);
    }

    #[test]
    fn index_block_accounting() {
        assert_eq!(index_blocks_for(0), 0);
        assert_eq!(index_blocks_for(512), 0);
        assert_eq!(index_blocks_for(513), 1);
        assert_eq!(index_blocks_for(512 + 1024), 1);
        assert_eq!(index_blocks_for(512 + 1025), 2);
        assert_eq!(index_blocks_for(MAX_EXTENT_BLOCKS), INDIRECT_SLOTS);
        let started = (0..3000).filter(|&i| starts_index_block(i)).count() as u32;
        assert_eq!(started, index_blocks_for(3000));
    }

    #[test]
    fn small_checksum_covers_payload() {
        let mut b = vec![0u8; BLOCK_SIZE];
        init_small(&mut b);
        assert_eq!(header_verify(&b, 7).unwrap().block_count, 0);
        b[100] = 0xAA;
        assert!(header_verify(&b, 7).unwrap_err().is_corrupt());
        header_commit(&mut b, 0);
        assert!(header_verify(&b, 7).is_ok());
        b[PAGE_HDR_OFF - 1] ^= 0x01;
        assert!(header_verify(&b, 7).is_err());
    }

    #[test]
    fn regular_checksum_covers_live_slots_only() {
        let mut b = vec![0u8; BLOCK_SIZE];
        let n = LEVEL_ONE + INDEX_SIZE + 1; // 2 index-блока
        for s in 0..LEVEL_ONE + 2 {
            slot_set(&mut b, s, 100 + s);
        }
        header_commit(&mut b, n);
        assert_eq!(header_verify(&b, 7).unwrap().block_count, n);

        // мусор за живыми слотами (то, что grow пишет до коммита) не мешает
        slot_set(&mut b, LEVEL_ONE + 2, 999);
        slot_set(&mut b, LEVEL_ONE + INDIRECT_SLOTS - 1, 999);
        assert!(header_verify(&b, 7).is_ok());

        for s in [0, LEVEL_ONE - 1, LEVEL_ONE, LEVEL_ONE + 1] {
            let mut c = b.clone();
            slot_set(&mut c, s, 5);
            assert!(header_verify(&c, 7).unwrap_err().is_corrupt(), "slot {}", s);
        }

        // короткий экстент: прямые слоты за block_count тоже не покрыты
        let mut b = vec![0u8; BLOCK_SIZE];
        slot_set(&mut b, 0, 42);
        header_commit(&mut b, 1);
        slot_set(&mut b, 1, 43);
        assert!(header_verify(&b, 7).is_ok());
        b[1] ^= 0x01;
        assert!(header_verify(&b, 7).unwrap_err().is_corrupt());
    }

    #[test]
    fn torn_promotion_is_detected() {
        // small-голова с записью, затем то, что успевает сделать grow до коммита
        let mut b = vec![0u8; BLOCK_SIZE];
        b[..9].copy_from_slice(b"\x05\0\0\0alpha");
        header_commit(&mut b, 0);
        b[..PAGE_HDR_OFF].fill(0);
        slot_set(&mut b, 0, 3);
        slot_set(&mut b, 1, 4);
        assert!(header_verify(&b, 7).unwrap_err().is_corrupt());
    }

    #[test]
    fn zeroed_block_is_not_a_valid_header() {
        let b = vec![0u8; BLOCK_SIZE];
        assert!(header_verify(&b, 3).is_err());
    }

    #[test]
    fn over_ceiling_count_is_corrupt() {
        let mut b = vec![0u8; BLOCK_SIZE];
        header_commit(&mut b, MAX_EXTENT_BLOCKS + 1);
        assert!(header_verify(&b, 1).unwrap_err().is_corrupt());
    }
}
