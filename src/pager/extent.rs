//! pager/extent - растущие/сжимающиеся экстенты с двухуровневой адресацией.
//!
//! Экстент = page-table блок (голова) + логические блоки 0..len.
//! - small (block_count == 0): голова сама хранит данные, len = 1.
//! - regular: слоты головы -> блоки данных, либо -> index-блок -> блоки данных.
//!   Разрешение индекса никогда не делает больше двух прыжков.
//!
//! Порядок коммита (checksum головы покрывает только живую часть, см. page/table):
//! - grow regular: выделение (единственный шаг, который может упасть) -> ссылки в
//!   слоты за живой частью и в index-блоки -> header_commit последним. До коммита
//!   прежний заголовок остаётся валидным.
//! - grow small -> regular и shrink -> 0: payload и слоты делят одни байты головы,
//!   поэтому оборванная на середине операция даёт Corrupt при проверке, но не
//!   чужие данные под видом записей.
//! - shrink -> n > 0: сбор и проверка указателей (только чтение) -> header_commit
//!   -> возврат блоков во free-цепочку. Слоты за новой границей не зануляются.
//! Упавшая (с ошибкой) операция оставляет прежнее закоммиченное состояние.

use log::debug;

use crate::consts::{BLOCK_PAYLOAD, MAX_EXTENT_BLOCKS};
use crate::error::{Error, Result};
use crate::page::{
    header_commit, header_verify, index_blocks_for, init_small, locate, slot_get, slot_set,
    starts_index_block, Slot,
};

use super::core::Pager;

/// Проверенный снимок заголовка экстента. Годится, пока экстент не меняли.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub head: u32,
    pub block_count: u32,
}

impl Extent {
    /// Число логических блоков: small-экстент всё равно имеет один (саму голову).
    #[inline]
    pub fn len(&self) -> u32 {
        self.block_count.max(1)
    }

    #[inline]
    pub fn is_small(&self) -> bool {
        self.block_count == 0
    }
}

/// Прыжки, сделанные при разрешении логического индекса.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePath {
    pub page_table: u32,
    /// Index-блок второго уровня, если понадобился.
    pub index_block: Option<u32>,
    pub physical: u32,
}

impl ResolvePath {
    /// Число прыжков от головы до блока данных (0 для small-экстента).
    pub fn hops(&self) -> u32 {
        if self.physical == self.page_table {
            0
        } else if self.index_block.is_some() {
            2
        } else {
            1
        }
    }
}

impl Pager {
    /// Прочитать и проверить заголовок экстента. Несовпадение checksum -> Corrupt + карантин.
    pub fn extent(&self, head: u32) -> Result<Extent> {
        let block = self.block(head)?;
        match header_verify(block, head) {
            Ok(h) => Ok(Extent {
                head,
                block_count: h.block_count,
            }),
            Err(e) => {
                self.metrics.record_checksum_failure();
                self.quarantine(head, &e);
                Err(e)
            }
        }
    }

    /// Разрешить логический индекс по уже проверенному снимку.
    pub fn resolve_in(&self, ext: &Extent, i: u32) -> Result<u32> {
        Ok(self.resolve_path_in(ext, i)?.physical)
    }

    pub fn resolve_path_in(&self, ext: &Extent, i: u32) -> Result<ResolvePath> {
        if i >= MAX_EXTENT_BLOCKS {
            return Err(Error::CapacityExceeded {
                requested: i as u64 + 1,
            });
        }
        if i >= ext.len() {
            return Err(Error::OutOfRange {
                index: i,
                len: ext.len(),
            });
        }
        self.metrics.record_resolve();
        if ext.is_small() {
            return Ok(ResolvePath {
                page_table: ext.head,
                index_block: None,
                physical: ext.head,
            });
        }
        let pt = self.block(ext.head)?;
        match locate(i) {
            Slot::Direct(s) => Ok(ResolvePath {
                page_table: ext.head,
                index_block: None,
                physical: self.check_ptr(ext.head, slot_get(pt, s))?,
            }),
            Slot::Indirect { i0, i1 } => {
                let ib = self.check_ptr(ext.head, slot_get(pt, i0))?;
                let physical = self.check_ptr(ext.head, slot_get(self.block(ib)?, i1))?;
                Ok(ResolvePath {
                    page_table: ext.head,
                    index_block: Some(ib),
                    physical,
                })
            }
        }
    }

    /// Физический блок логического индекса i (заголовок проверяется каждый раз).
    pub fn resolve(&self, head: u32, i: u32) -> Result<u32> {
        if i >= MAX_EXTENT_BLOCKS {
            return Err(Error::CapacityExceeded {
                requested: i as u64 + 1,
            });
        }
        let ext = self.extent(head)?;
        self.resolve_in(&ext, i)
    }

    pub fn resolve_path(&self, head: u32, i: u32) -> Result<ResolvePath> {
        if i >= MAX_EXTENT_BLOCKS {
            return Err(Error::CapacityExceeded {
                requested: i as u64 + 1,
            });
        }
        let ext = self.extent(head)?;
        self.resolve_path_in(&ext, i)
    }

    /// Создать новый пустой small-экстент. Возвращает голову.
    pub fn create_extent(&mut self) -> Result<u32> {
        let head = self.alloc_one()?;
        init_small(self.block_mut(head)?);
        debug!("extent {} created", head);
        Ok(head)
    }

    /// Дорастить экстент до target логических блоков (no-op, если уже не меньше).
    pub fn grow(&mut self, head: u32, target: u32) -> Result<()> {
        if target > MAX_EXTENT_BLOCKS {
            return Err(Error::CapacityExceeded {
                requested: target as u64,
            });
        }
        self.ensure_mutable(head)?;
        let ext = self.extent(head)?;
        let cur = ext.block_count;
        if target <= cur {
            return Ok(());
        }

        let data = target - cur;
        let index = index_blocks_for(target) - index_blocks_for(cur);
        let fresh = self.alloc_many(data + index)?;
        let mut it = fresh.into_iter();
        let mut take = move || {
            it.next()
                .ok_or_else(|| Error::corrupt("allocation shortfall during grow"))
        };

        for i in cur..target {
            match locate(i) {
                Slot::Direct(s) => {
                    let d = take()?;
                    if i == 0 {
                        // small -> regular: payload головы переезжает в логический блок 0
                        self.copy_block_prefix(head, d, BLOCK_PAYLOAD)?;
                        self.block_mut(head)?[..BLOCK_PAYLOAD].fill(0);
                    }
                    slot_set(self.block_mut(head)?, s, d);
                }
                Slot::Indirect { i0, i1 } => {
                    let ib = if starts_index_block(i) {
                        let ib = take()?;
                        slot_set(self.block_mut(head)?, i0, ib);
                        ib
                    } else {
                        self.check_ptr(head, slot_get(self.block(head)?, i0))?
                    };
                    let d = take()?;
                    slot_set(self.block_mut(ib)?, i1, d);
                }
            }
        }

        header_commit(self.block_mut(head)?, target);
        self.metrics.record_grow();
        debug!("extent {} grown {} -> {} blocks", head, cur, target);
        Ok(())
    }

    /// Сжать экстент до target логических блоков (no-op, если уже не больше).
    /// target == 0 возвращает small-состояние: данные блока 0 копируются в голову.
    pub fn shrink(&mut self, head: u32, target: u32) -> Result<()> {
        self.ensure_mutable(head)?;
        let ext = self.extent(head)?;
        let cur = ext.block_count;
        if target >= cur {
            return Ok(());
        }

        // 1) Сбор (только чтение, все указатели проверены).
        let mut release = Vec::with_capacity((cur - target) as usize);
        {
            let pt = self.block(head)?;
            for i in (target..cur).rev() {
                match locate(i) {
                    Slot::Direct(s) => release.push(self.check_ptr(head, slot_get(pt, s))?),
                    Slot::Indirect { i0, i1 } => {
                        let ib = self.check_ptr(head, slot_get(pt, i0))?;
                        release.push(self.check_ptr(head, slot_get(self.block(ib)?, i1))?);
                        // index-блок освобождается вместе со своим первым элементом
                        if i1 == 0 {
                            release.push(ib);
                        }
                    }
                }
            }
        }
        if target == 0 {
            // regular -> small: payload логического блока 0 возвращается в голову
            let b0 = self.check_ptr(head, slot_get(self.block(head)?, 0))?;
            self.copy_block_prefix(b0, head, BLOCK_PAYLOAD)?;
        }

        // 2) Заголовок, затем free-цепочка.
        header_commit(self.block_mut(head)?, target);
        self.release_many(&release)?;
        self.metrics.record_shrink();
        debug!(
            "extent {} shrunk {} -> {} blocks ({} released)",
            head,
            cur,
            target,
            release.len()
        );
        Ok(())
    }

    /// Все физические блоки экстента: голова, index-блоки, блоки данных.
    /// Проверяет заголовок и диапазоны всех указателей.
    pub fn collect_blocks(&self, head: u32) -> Result<Vec<u32>> {
        let ext = self.extent(head)?;
        let mut out = Vec::with_capacity(ext.len() as usize + 1);
        out.push(head);
        if ext.is_small() {
            return Ok(out);
        }
        let pt = self.block(head)?;
        for i in 0..ext.block_count {
            match locate(i) {
                Slot::Direct(s) => out.push(self.check_ptr(head, slot_get(pt, s))?),
                Slot::Indirect { i0, i1 } => {
                    let ib = self.check_ptr(head, slot_get(pt, i0))?;
                    if i1 == 0 {
                        out.push(ib);
                    }
                    out.push(self.check_ptr(head, slot_get(self.block(ib)?, i1))?);
                }
            }
        }
        Ok(out)
    }

    /// Полная проверка экстента (заголовок + указатели). Нарушение -> Corrupt + карантин.
    pub fn verify_extent(&self, head: u32) -> Result<Extent> {
        let ext = self.extent(head)?;
        if let Err(e) = self.collect_blocks(head) {
            self.quarantine(head, &e);
            return Err(e);
        }
        Ok(ext)
    }

    /// Освободить экстент целиком (голова тоже уходит во free-цепочку).
    pub fn destroy_extent(&mut self, head: u32) -> Result<()> {
        self.ensure_mutable(head)?;
        let blocks = self.collect_blocks(head)?;
        self.release_many(&blocks)?;
        debug!("extent {} destroyed ({} blocks)", head, blocks.len());
        Ok(())
    }

    /// Переинициализировать голову как пустой small-экстент и снять карантин.
    /// Прежние блоки экстента становятся сиротами (их собирает sweep).
    pub fn reinit_extent(&mut self, head: u32) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        init_small(self.block_mut(head)?);
        self.unquarantine(head);
        debug!("extent {} reinitialised", head);
        Ok(())
    }

    /// Данные логического блока (BLOCK_PAYLOAD байт).
    pub fn data(&self, ext: &Extent, i: u32) -> Result<&[u8]> {
        let b = self.resolve_in(ext, i)?;
        Ok(&self.block(b)?[..BLOCK_PAYLOAD])
    }

    /// Изменить данные логического блока i. Для small-экстента заголовок
    /// перезапечатывается сразу после правки: его checksum покрывает payload головы.
    pub(crate) fn with_data_mut<R>(
        &mut self,
        ext: &Extent,
        i: u32,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        if self.is_quarantined(ext.head) {
            return Err(Error::corrupt(format!("extent {} is quarantined", ext.head)));
        }
        let b = self.resolve_in(ext, i)?;
        let out = f(&mut self.block_mut(b)?[..BLOCK_PAYLOAD]);
        if ext.is_small() {
            header_commit(self.block_mut(ext.head)?, 0);
        }
        Ok(out)
    }
}
