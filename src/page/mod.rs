//! page - on-disk раскладки блоков.
//!
//! - table.rs  - page-table блок экстента (слоты + PageHeader, checksum).
//! - record.rs - KV-записи внутри блоков данных.
//! - free.rs   - звено free-цепочки внутри освобождённого блока.

pub mod free;
pub mod record;
pub mod table;

pub use record::{check_record, encode_into, for_each_record, record_len, used_bytes, RecordRef};
pub use table::{
    compute_checksum, header_commit, header_read, header_verify, index_blocks_for, init_small,
    locate, slot_get, slot_set, starts_index_block, PageHeader, Slot,
};
