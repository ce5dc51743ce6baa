//! Общие константы формата (геометрия блоков, page table, superblock, записи).

// -------- Blocks --------
pub const BLOCK_BITS: u32 = 12;
pub const BLOCK_SIZE: usize = 1 << BLOCK_BITS; // 4096
pub const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;
pub const BLOCK_MASK: u64 = BLOCK_SIZE_U64 - 1;

/// Физический индекс 0 - superblock, в экстенты не выдаётся; поэтому 0 = "нет блока".
pub const NO_BLOCK: u32 = 0;

// -------- Page table (v1) --------
// Layout page-table блока (LE):
//   [0    .. 2048) - прямые слоты 0..LEVEL_ONE (u32 физический индекс)
//   [2048 .. 4088) - косвенные слоты LEVEL_ONE..LEVEL_ONE+INDIRECT_SLOTS (u32 → index block)
//   [4088 .. 4092) - block_count u32
//   [4092 .. 4096) - checksum u32
pub const LEVEL_ONE: u32 = 512;
pub const INDEX_BITS: u32 = 10;
pub const INDEX_SIZE: u32 = 1 << INDEX_BITS; // 1024 указателя в index-блоке
pub const INDEX_MASK: u32 = INDEX_SIZE - 1;

pub const PAGE_HDR_SIZE: usize = 8;
pub const PAGE_HDR_OFF: usize = BLOCK_SIZE - PAGE_HDR_SIZE; // 4088
pub const PAGE_OFF_BLOCK_COUNT: usize = PAGE_HDR_OFF;
pub const PAGE_OFF_CHECKSUM: usize = PAGE_HDR_OFF + 4;

/// Сколько косвенных слотов помещается перед трейлером заголовка.
pub const INDIRECT_SLOTS: u32 = (PAGE_HDR_OFF / 4) as u32 - LEVEL_ONE; // 510

/// Потолок логических блоков на экстент (две косвенности максимум).
pub const MAX_EXTENT_BLOCKS: u32 = LEVEL_ONE + INDIRECT_SLOTS * INDEX_SIZE; // 522_752

/// Полезная ёмкость блока под записи. Одинакова для small-головы и data-блоков,
/// чтобы перевод small <-> regular не терял байт.
pub const BLOCK_PAYLOAD: usize = PAGE_HDR_OFF;

// -------- Blob --------
// Поток байт blob-а = payload логических блоков 0..len подряд.
// [0 .. 8) потока - длина blob-а (u64 LE), дальше содержимое.
pub const BLOB_HDR_SIZE: usize = 8;

// -------- Free chain --------
// Свободный блок: [next u32][FREE_MARKER u32][нули...]
pub const FREE_MARKER: u32 = 0x4545_5246; // "FREE" (LE)

// -------- Superblock (block 0) --------
pub const META_MAGIC: &[u8; 8] = b"SPDBMETA";
pub const META_VERSION: u32 = 1;
pub const META_HDR_SIZE: usize = 64;
pub const META_OFF_CRC: usize = BLOCK_SIZE - 4;
pub const MAX_BUCKETS: u32 = ((META_OFF_CRC - META_HDR_SIZE) / 4) as u32; // 1007
pub const DEFAULT_BUCKETS: u32 = 256;

// -------- Records --------
pub const REC_HDR_SIZE: usize = 8; // key_len u32 + value_len u32
pub const TOMBSTONE: u32 = u32::MAX;
