#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod error;
pub mod hash;
pub mod lock;
pub mod meta;
pub mod dir;
pub mod metrics;
pub mod config;

// Слои: region -> page/pager -> db
pub mod region; // src/region.rs
pub mod page;   // src/page/{mod,table,record,free}.rs
pub mod pager;  // src/pager/{mod,core,alloc,extent,blob,array}.rs
pub mod db;     // src/db/{mod,core,open,kv,scan,compaction,doctor,maintenance}.rs

// Удобные реэкспорты
pub use config::{DbBuilder, SpanConfig};
pub use db::{Db, DbStats, DoctorReport};
pub use dir::Directory;
pub use error::{Error, Result};
pub use hash::HashKind;
pub use meta::MetaHeader;
pub use metrics::MetricsSnapshot;
pub use pager::{Array, Blob, Extent, Pager, ResolvePath};
pub use region::{OpenMode, Region};
