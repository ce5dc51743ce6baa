//! region - отображённый в память файл данных (Mapped Region).
//!
//! Один тип-владелец на файл: дескриптор, advisory lock и mmap живут и умирают вместе.
//! Освобождение гарантировано на любом пути (включая ошибки открытия) через Drop.
//!
//! Контракт:
//! - current_size() всегда кратен BLOCK_SIZE; невыровненный файл при открытии -> Corrupt.
//! - ensure_capacity() только растит файл. При ошибке mmap длина файла откатывается,
//!   так что частично расширенного файла не остаётся.
//! - После роста адреса маппинга могут смениться, смещения - нет. Поэтому наружу
//!   отдаются только срезы, живущие не дольше заимствования региона.

use log::{debug, warn};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::consts::{BLOCK_MASK, BLOCK_SIZE, BLOCK_SIZE_U64};
use crate::error::{Error, Result};
use crate::lock::{try_lock_file, LockGuard, LockMode};

/// Режим открытия файла данных.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Только чтение; файл обязан существовать.
    ReadOnly,
    /// Чтение/запись; создать, если нет, содержимое сохраняется.
    ReadWrite,
    /// Создать или усечь до нуля.
    CreateOverwrite,
}

impl OpenMode {
    /// Собрать режим из пары флагов. read_only + overwrite - ошибка конфигурации
    /// (проверяется до любого I/O).
    pub fn from_flags(read_only: bool, overwrite: bool) -> Result<Self> {
        match (read_only, overwrite) {
            (true, true) => Err(Error::InvalidConfig(
                "read_only and overwrite are mutually exclusive".into(),
            )),
            (true, false) => Ok(OpenMode::ReadOnly),
            (false, true) => Ok(OpenMode::CreateOverwrite),
            (false, false) => Ok(OpenMode::ReadWrite),
        }
    }

    #[inline]
    pub fn is_read_only(self) -> bool {
        self == OpenMode::ReadOnly
    }
}

enum Mapping {
    Unmapped,
    Ro(Mmap),
    Rw(MmapMut),
}

pub struct Region {
    path: PathBuf,
    mode: OpenMode,
    size: u64,
    // Порядок полей = порядок Drop: сначала mmap, потом lock, потом файл.
    map: Mapping,
    lock: Option<LockGuard>,
    file: Option<File>,
}

impl Region {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        if !mode.is_read_only() {
            // truncate делаем сами после взятия лока, чтобы не усечь чужой живой файл
            opts.write(true).create(true);
        }
        let file = opts.open(path).map_err(|e| map_open_err(e, path))?;

        let lock_mode = if mode.is_read_only() {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        let lock = try_lock_file(&file, path, lock_mode)?;

        if mode == OpenMode::CreateOverwrite {
            file.set_len(0)?;
        }

        let size = file.metadata()?.len();
        if size & BLOCK_MASK != 0 {
            return Err(Error::corrupt(format!(
                "file size {} of {} is not a multiple of {}",
                size,
                path.display(),
                BLOCK_SIZE
            )));
        }

        let mut region = Self {
            path: path.to_path_buf(),
            mode,
            size,
            map: Mapping::Unmapped,
            lock: Some(lock),
            file: Some(file),
        };
        region.remap()?;
        debug!(
            "region open {} mode={:?} size={}",
            region.path.display(),
            mode,
            size
        );
        Ok(region)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.mode.is_read_only()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Текущий размер в байтах (кратен BLOCK_SIZE).
    #[inline]
    pub fn current_size(&self) -> u64 {
        self.size
    }

    /// Число целых блоков в файле.
    #[inline]
    pub fn block_count(&self) -> u64 {
        self.size / BLOCK_SIZE_U64
    }

    /// Весь отображённый диапазон [0 .. current_size).
    pub fn bytes(&self) -> &[u8] {
        match &self.map {
            Mapping::Unmapped => &[],
            Mapping::Ro(m) => &m[..],
            Mapping::Rw(m) => &m[..],
        }
    }

    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        self.ensure_open()?;
        match &mut self.map {
            Mapping::Rw(m) => Ok(&mut m[..]),
            Mapping::Ro(_) => Err(Error::ReadOnly),
            Mapping::Unmapped if self.mode.is_read_only() => Err(Error::ReadOnly),
            Mapping::Unmapped => Ok(&mut []),
        }
    }

    /// После close() любое обращение к байтам -> Error::Closed.
    #[inline]
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Чтение диапазона с проверкой границ.
    pub fn read(&self, offset: u64, len: usize) -> Result<&[u8]> {
        self.ensure_open()?;
        let (start, end) = self.range(offset, len)?;
        self.bytes()
            .get(start..end)
            .ok_or_else(|| Error::corrupt(format!("range {}+{} is not mapped", offset, len)))
    }

    /// Запись диапазона с проверкой границ.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let (start, end) = self.range(offset, data.len())?;
        self.bytes_mut()?[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Дорастить файл и маппинг до new_size (кратно BLOCK_SIZE). Уменьшение не делается.
    pub fn ensure_capacity(&mut self, new_size: u64) -> Result<()> {
        if new_size <= self.size {
            return Ok(());
        }
        if self.mode.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if new_size & BLOCK_MASK != 0 {
            return Err(Error::InvalidConfig(format!(
                "capacity {} is not a multiple of {}",
                new_size, BLOCK_SIZE
            )));
        }
        let old_size = self.size;
        let file = self.file.as_ref().ok_or(Error::Closed)?;

        // Старый маппинг сбрасываем на диск до переотображения.
        if let Mapping::Rw(m) = &self.map {
            m.flush_async()?;
        }
        file.set_len(new_size)?;
        self.size = new_size;
        if let Err(e) = self.remap() {
            // Откат: файл не должен остаться частично расширенным.
            if let Some(f) = self.file.as_ref() {
                if let Err(re) = f.set_len(old_size) {
                    warn!(
                        "region {}: rollback to {} bytes failed after mmap error: {}",
                        self.path.display(),
                        old_size,
                        re
                    );
                }
            }
            self.size = old_size;
            if let Err(re) = self.remap() {
                warn!("region {}: remap after rollback failed: {}", self.path.display(), re);
            }
            return Err(e);
        }
        debug!(
            "region {} extended {} -> {} bytes",
            self.path.display(),
            old_size,
            new_size
        );
        Ok(())
    }

    /// Синхронный flush всего маппинга (no-op для RO/пустого).
    pub fn flush(&self) -> Result<()> {
        if let Mapping::Rw(m) = &self.map {
            m.flush()?;
        }
        Ok(())
    }

    pub fn flush_range(&self, offset: u64, len: usize) -> Result<()> {
        let (start, end) = self.range(offset, len)?;
        if let Mapping::Rw(m) = &self.map {
            m.flush_range(start, end - start)?;
        }
        Ok(())
    }

    /// Освободить маппинг, лок и дескриптор. Идемпотентно.
    /// Синхронный flush здесь не делается: это решение владельца (см. flush()).
    pub fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.map = Mapping::Unmapped;
        self.lock = None;
        self.file = None;
        debug!("region {} closed", self.path.display());
        Ok(())
    }

    // ---------------- internal ----------------

    fn range(&self, offset: u64, len: usize) -> Result<(usize, usize)> {
        let end = offset.checked_add(len as u64).filter(|&e| e <= self.size);
        match end {
            Some(end) => Ok((offset as usize, end as usize)),
            None => Err(Error::corrupt(format!(
                "range {}+{} is beyond region size {}",
                offset, len, self.size
            ))),
        }
    }

    fn remap(&mut self) -> Result<()> {
        self.map = Mapping::Unmapped;
        let file = match self.file.as_ref() {
            Some(f) => f,
            None => return Ok(()),
        };
        if self.size == 0 {
            return Ok(());
        }
        let len = usize::try_from(self.size)
            .map_err(|_| Error::InvalidConfig(format!("region size {} exceeds address space", self.size)))?;
        self.map = if self.mode.is_read_only() {
            Mapping::Ro(unsafe { MmapOptions::new().len(len).map(file)? })
        } else {
            Mapping::Rw(unsafe { MmapOptions::new().len(len).map_mut(file)? })
        };
        Ok(())
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn map_open_err(e: std::io::Error, path: &Path) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
        _ => Error::Io(e),
    }
}
