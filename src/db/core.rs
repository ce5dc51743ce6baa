//! db/core - ядро high-level API: структура Db, общие проверки, flush/close, Drop.
//!
//! Db = Pager (блоки/экстенты) + Directory (bucket -> голова экстента) + конфиг.
//! Один writer на файл гарантирует эксклюзивный лок региона; читатели работают через &Db.

use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::config::{DbBuilder, SpanConfig};
use crate::dir::Directory;
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;
use crate::pager::Pager;

pub struct Db {
    pub path: PathBuf,
    pub pager: Pager,
    pub dir: Directory,
    pub(crate) readonly: bool,
    pub(crate) config: SpanConfig,
}

impl Db {
    /// Builder, стартующий с env (SPDB_*).
    pub fn builder() -> DbBuilder {
        DbBuilder::new()
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn config(&self) -> &SpanConfig {
        &self.config
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.readonly
    }

    /// Любая операция после close() -> Error::Closed (а не паника на пустом маппинге).
    #[inline]
    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.pager.region().ensure_open()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.pager.region().is_closed()
    }

    #[inline]
    pub(crate) fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.readonly {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Голова экстента бакета (0 - у бакета ещё нет хранилища).
    pub fn bucket_head(&self, bucket: u32) -> Result<u32> {
        self.ensure_open()?;
        self.dir.head(&self.pager, bucket)
    }

    /// Размер файла в байтах.
    pub fn file_size(&self) -> u64 {
        self.pager.region().current_size()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.pager.metrics()
    }

    /// Синхронно сбросить маппинг на диск.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        if self.readonly {
            return Ok(());
        }
        self.pager.flush()
    }

    /// Закрыть хранилище: flush (если flush_on_close) и освобождение региона. Идемпотентно.
    pub fn close(&mut self) -> Result<()> {
        if self.pager.region().is_closed() {
            return Ok(());
        }
        let flushed = if self.config.flush_on_close {
            self.flush()
        } else {
            Ok(())
        };
        let closed = self.pager.close();
        debug!("db {} closed", self.path.display());
        flushed.and(closed)
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("db {}: close on drop failed: {}", self.path.display(), e);
        }
    }
}
