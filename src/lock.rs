//! Advisory lock on the data file for single-writer safety.
//!
//! Cross-platform (fs2) advisory locks:
//! - Exclusive: writer (ReadWrite / CreateOverwrite). Other handles fail fast.
//! - Shared: read-only handles; any number may coexist, but not with a writer.
//!
//! Лок берётся на сам файл данных (отдельного LOCK-файла нет) и снимается в Drop.

use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        // std (1.89+) имеет одноимённые методы File, поэтому вызов через трейт явно.
        let _ = FileExt::unlock(&self.file);
    }
}

/// Try to lock `file` in the requested mode. Never blocks: contention -> Error::Locked.
///
/// Держим собственный дубликат дескриптора, чтобы лок жил ровно столько, сколько guard.
pub fn try_lock_file(file: &File, path: &Path, mode: LockMode) -> Result<LockGuard> {
    let dup = file.try_clone()?;
    let res = match mode {
        LockMode::Shared => FileExt::try_lock_shared(&dup),
        LockMode::Exclusive => FileExt::try_lock_exclusive(&dup),
    };
    match res {
        Ok(()) => Ok(LockGuard {
            file: dup,
            path: path.to_path_buf(),
            mode,
        }),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            Err(Error::Locked(path.to_path_buf()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}
