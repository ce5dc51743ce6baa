//! pager/alloc - выделение и освобождение блоков.
//!
//! Правила:
//! - alloc_many(n) - всё или ничего. Единственный шаг, который может упасть "по-настоящему"
//!   (расширение файла), делается первым; обход free-цепочки только читает, и meta
//!   меняется одним persist_meta в конце. Ошибка на любом шаге -> состояние не изменилось.
//! - Free-цепочка предпочтительнее хвоста файла.
//! - Hot preallocation: при расширении файла добавляем prealloc_blocks сверху. Это меняет
//!   только длину файла, но не next_block (логическую границу выделенного).
//! - Выделенные блоки возвращаются занулёнными.

use log::debug;

use crate::consts::{BLOCK_SIZE_U64, NO_BLOCK};
use crate::error::{Error, Result};
use crate::page::free::{free_link_read, free_link_write, is_end};

use super::core::Pager;

impl Pager {
    /// Выделить n блоков. Возвращает физические индексы (порядок не гарантирован).
    pub fn alloc_many(&mut self, n: u32) -> Result<Vec<u32>> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let reuse = n.min(self.meta.free_count);
        let fresh = n - reuse;

        // 1) Расширение файла под свежие блоки.
        let new_next = self
            .meta
            .next_block
            .checked_add(fresh)
            .ok_or(Error::AddressSpaceExhausted)?;
        if fresh > 0 {
            self.reserve_tail(new_next)?;
        }

        // 2) Обход free-цепочки (только чтение).
        let mut out = Vec::with_capacity(n as usize);
        let mut cur = self.meta.free_head;
        for _ in 0..reuse {
            if is_end(cur) {
                return Err(Error::corrupt(format!(
                    "free chain ended early (free_count={})",
                    self.meta.free_count
                )));
            }
            let next = free_link_read(self.block(cur)?, cur)?;
            out.push(cur);
            cur = next;
        }

        // 3) Коммит в памяти + block 0.
        let first_fresh = self.meta.next_block;
        self.meta.free_head = cur;
        self.meta.free_count -= reuse;
        self.meta.next_block = new_next;
        out.extend(first_fresh..new_next);

        for &b in &out {
            self.block_mut(b)?.fill(0);
        }
        self.persist_meta()?;
        self.metrics.record_alloc(fresh as u64, reuse as u64);
        Ok(out)
    }

    pub fn alloc_one(&mut self) -> Result<u32> {
        let v = self.alloc_many(1)?;
        v.into_iter()
            .next()
            .ok_or_else(|| Error::corrupt("allocator returned no block"))
    }

    /// Вернуть блоки во free-цепочку (LIFO). Блоки должны быть выделенными.
    pub fn release_many(&mut self, blocks: &[u32]) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if blocks.is_empty() {
            return Ok(());
        }
        for &b in blocks {
            self.check_ptr(NO_BLOCK, b)?;
        }
        for &b in blocks {
            let next = self.meta.free_head;
            free_link_write(self.block_mut(b)?, next);
            self.meta.free_head = b;
            self.meta.free_count += 1;
        }
        self.persist_meta()?;
        self.metrics.record_free(blocks.len() as u64);
        Ok(())
    }

    /// Пройти free-цепочку целиком. Ошибки формата/диапазона/цикла -> Corrupt.
    pub fn free_chain(&self) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(self.meta.free_count as usize);
        let mut cur = self.meta.free_head;
        while !is_end(cur) {
            if out.len() as u32 >= self.meta.free_count {
                return Err(Error::corrupt(format!(
                    "free chain longer than free_count {} (cycle?)",
                    self.meta.free_count
                )));
            }
            out.push(cur);
            cur = free_link_read(self.block(cur)?, cur)?;
        }
        if out.len() as u32 != self.meta.free_count {
            return Err(Error::corrupt(format!(
                "free chain has {} blocks, free_count says {}",
                out.len(),
                self.meta.free_count
            )));
        }
        Ok(out)
    }

    /// Гарантировать, что файл вмещает блоки [0 .. upto).
    fn reserve_tail(&mut self, upto: u32) -> Result<()> {
        let need = upto as u64 * BLOCK_SIZE_U64;
        let cur = self.region.current_size();
        if need <= cur {
            return Ok(());
        }
        let slack = (self.prealloc_blocks as u64).min(u32::MAX as u64 - upto as u64);
        let target = need + slack * BLOCK_SIZE_U64;
        match self.region.ensure_capacity(target) {
            Ok(()) => {}
            Err(e) if slack > 0 => {
                debug!("prealloc of {} blocks failed ({}), retrying exact", slack, e);
                self.region.ensure_capacity(need)?;
            }
            Err(e) => return Err(e),
        }
        let grown = self.region.current_size() - cur;
        self.metrics.record_region_extension(grown);
        Ok(())
    }
}
