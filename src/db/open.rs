//! db/open - открытие Db (writer/read-only) с конфигом.
//!
//! Правила:
//! - read_only + overwrite -> InvalidConfig до любого I/O.
//! - Пустой файл (0 байт или ровно один нулевой блок) -> инициализация block 0.
//!   Read-only открыть пустой файл нельзя (Corrupt): инициализировать его некому.
//! - Существующий файл: superblock (magic/crc/диапазоны), затем каждый экстент бакета
//!   (заголовок, checksum, диапазоны указателей). Любая ошибка -> Corrupt, open прерван.

use log::info;
use std::path::Path;

use crate::config::SpanConfig;
use crate::consts::{BLOCK_SIZE, NO_BLOCK};
use crate::dir::Directory;
use crate::error::{Error, Result};
use crate::meta::validate_bucket_count;
use crate::pager::Pager;
use crate::region::Region;

use super::core::Db;

impl Db {
    pub fn open_with_config(path: &Path, cfg: SpanConfig) -> Result<Self> {
        let mode = cfg.open_mode()?;
        validate_bucket_count(cfg.buckets)?;

        let region = Region::open(path, mode)?;
        let fresh = is_fresh(&region);

        let pager = if fresh {
            if region.is_read_only() {
                return Err(Error::corrupt(format!(
                    "{} is empty and cannot be initialised read-only",
                    path.display()
                )));
            }
            Pager::init(region, cfg.buckets, cfg.hash_kind, cfg.prealloc_blocks)?
        } else {
            let pager = Pager::open(region, cfg.prealloc_blocks)?;
            verify_buckets(&pager)?;
            pager
        };

        let dir = Directory::from_meta(&pager.meta);
        info!(
            "open {} mode={:?} buckets={} hash={} blocks={}{}",
            path.display(),
            mode,
            dir.bucket_count,
            dir.hash_kind,
            pager.region().block_count(),
            if fresh { " (initialised)" } else { "" }
        );
        Ok(Self {
            path: path.to_path_buf(),
            readonly: mode.is_read_only(),
            pager,
            dir,
            config: cfg,
        })
    }

    /// Writer (ReadWrite), конфиг из env.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, SpanConfig::from_env())
    }

    /// Reader (shared lock), конфиг из env.
    pub fn open_ro(path: &Path) -> Result<Self> {
        let cfg = SpanConfig::from_env()
            .with_read_only(true)
            .with_overwrite(false);
        Self::open_with_config(path, cfg)
    }

    /// Создать (или усечь) файл и инициализировать пустое хранилище.
    pub fn create(path: &Path, buckets: u32) -> Result<Self> {
        let cfg = SpanConfig::from_env()
            .with_read_only(false)
            .with_overwrite(true)
            .with_buckets(buckets);
        Self::open_with_config(path, cfg)
    }
}

fn is_fresh(region: &Region) -> bool {
    let size = region.current_size();
    size == 0 || (size == BLOCK_SIZE as u64 && region.bytes().iter().all(|&b| b == 0))
}

/// Проверить все экстенты бакетов (fail closed).
fn verify_buckets(pager: &Pager) -> Result<()> {
    for b in 0..pager.meta.bucket_count {
        let head = pager.bucket_head(b)?;
        if head == NO_BLOCK {
            continue;
        }
        pager.verify_extent(head).map_err(|e| match e {
            Error::Corrupt(msg) => Error::Corrupt(format!("bucket {}: {}", b, msg)),
            other => other,
        })?;
    }
    Ok(())
}
