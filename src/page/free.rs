//! page/free - звено free-цепочки: [next u32][FREE_MARKER u32], остальное - нули.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{FREE_MARKER, NO_BLOCK};
use crate::error::{Error, Result};

/// Превратить блок в звено цепочки, указывающее на next.
pub fn free_link_write(block: &mut [u8], next: u32) {
    block.fill(0);
    LittleEndian::write_u32(&mut block[0..4], next);
    LittleEndian::write_u32(&mut block[4..8], FREE_MARKER);
}

/// Прочитать next из звена. Блок без маркера - free-цепочка испорчена.
pub fn free_link_read(block: &[u8], idx: u32) -> Result<u32> {
    if LittleEndian::read_u32(&block[4..8]) != FREE_MARKER {
        return Err(Error::corrupt(format!(
            "free chain: block {} has no free marker",
            idx
        )));
    }
    Ok(LittleEndian::read_u32(&block[0..4]))
}

#[inline]
pub fn is_end(next: u32) -> bool {
    next == NO_BLOCK
}
