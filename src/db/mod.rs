//! db - high-level API слоя Bucket Table.
//!
//! Разделение по подмодулям:
//! - core.rs        - структура Db, общие проверки, flush/close, Drop
//! - open.rs        - открытие/инициализация (open/open_ro/create + _with_config), проверка экстентов
//! - kv.rs          - одиночные операции (put/get/delete), надгробия
//! - scan.rs        - обход записей бакета, for_each/len
//! - compaction.rs  - компактация бакета (copy-on-write) и всех бакетов
//! - doctor.rs      - проверка целостности с JSON-отчётом
//! - maintenance.rs - stats, sweep_orphans, repair_bucket

pub mod compaction;
pub mod core;
pub mod doctor;
pub mod kv;
pub mod maintenance;
pub mod open;
pub mod scan;

pub use compaction::{CompactBucketReport, CompactSummary};
pub use core::Db;
pub use doctor::{BucketIssue, DoctorReport};
pub use maintenance::DbStats;
pub use scan::BucketScan;
