//! pager - Block Store: блоки по 4096 байт внутри одного отображённого файла.
//!
//! Подмодули:
//! - core.rs   - структура Pager, init()/open(), доступ к блокам, superblock, карантин.
//! - alloc.rs  - alloc_many/release_many, free-цепочка, hot preallocation.
//! - extent.rs - экстенты: resolve/grow/shrink/create/destroy/reinit.
//! - blob.rs   - байтовый blob поверх экстента (read/write по смещению, resize).
//! - array.rs  - массив элементов фиксированного размера поверх blob-а.

pub mod alloc;
pub mod array;
pub mod blob;
pub mod core;
pub mod extent;

pub use array::Array;
pub use blob::Blob;
pub use core::Pager;
pub use extent::{Extent, ResolvePath};
