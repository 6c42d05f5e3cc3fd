//! Heap files: tables stored as unordered collections of fixed-size pages.

use crate::buffer_pool::BufferPool;
use crate::errors::StorageError;
use crate::heap_page::HeapPage;
use crate::lock_manager::LockMode;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::{PageId, PAGE_SIZE};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::fs::{create_dir_all, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A table stored as a sequence of [`PAGE_SIZE`] pages with no file header.
/// Page `i` occupies bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`.
///
/// All operations on one file serialize on its handle.
pub struct HeapFile {
    file: Mutex<File>,
    path: PathBuf,
    desc: TupleDesc,
    table_id: u32,
}

impl HeapFile {
    /// Opens the backing file, creating it (and its parent directories) if
    /// needed.
    pub fn open<P: AsRef<Path>>(path: P, desc: TupleDesc) -> std::io::Result<HeapFile> {
        let path_ref = path.as_ref();
        crate::strata_debug_log!("[HeapFile::open] opening table file at {path_ref:?}");
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        let path = path_ref.canonicalize()?;
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let table_id = hasher.finish() as u32;

        Ok(HeapFile {
            file: Mutex::new(file),
            path,
            desc,
            table_id,
        })
    }

    /// A deterministic table id: the hash of the canonical path, stable
    /// across reopens of the same file.
    pub fn id(&self) -> u32 {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole pages in the file.
    pub fn num_pages(&self) -> usize {
        let file = self.file.lock();
        file.metadata()
            .map(|meta| meta.len() as usize / PAGE_SIZE)
            .unwrap_or(0)
    }

    /// Reads the page at `pid`. Requesting the page exactly one past the
    /// end allocates it: an empty page is written through and returned,
    /// which is how the file grows during insertion.
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage, StorageError> {
        let mut file = self.file.lock();
        let len = file
            .metadata()
            .map_err(|_| StorageError::PageLookup(pid))?
            .len() as usize;
        let num_pages = len / PAGE_SIZE;
        let offset = (pid.page_no * PAGE_SIZE) as u64;

        if pid.page_no == num_pages {
            let page = HeapPage::empty(pid, self.desc.clone());
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.write_all(&page.page_data()))
                .map_err(|_| StorageError::PageLookup(pid))?;
            crate::strata_debug_log!(
                "[HeapFile::read_page] allocated page {} of table {}",
                pid.page_no,
                self.table_id
            );
            return Ok(page);
        }
        if pid.page_no > num_pages {
            return Err(StorageError::PageLookup(pid));
        }

        let mut data = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut data))
            .map_err(|_| StorageError::PageLookup(pid))?;
        drop(file);
        HeapPage::from_bytes(pid, self.desc.clone(), &data)
    }

    /// Writes the page at its offset: exactly [`PAGE_SIZE`] bytes.
    pub fn write_page(&self, page: &HeapPage) -> Result<(), StorageError> {
        let mut file = self.file.lock();
        let offset = (page.id().page_no * PAGE_SIZE) as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.page_data())?;
        file.sync_all()?;
        Ok(())
    }

    /// Stores `tuple` on the first page with a free slot, growing the file
    /// when every existing page is full. Pages are probed under a shared
    /// lock; the probe lock on a full page is released again right away
    /// rather than held to transaction end. Returns the dirtied page ids.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageId>, StorageError> {
        for page_no in 0..self.num_pages() {
            let pid = PageId {
                table_id: self.table_id,
                page_no,
            };
            let frame = pool.get_page(tid, pid, LockMode::Shared)?;
            let has_room = frame.read().empty_slot_count() > 0;
            if has_room {
                let frame = pool.get_page(tid, pid, LockMode::Exclusive)?;
                frame.write().insert_tuple(tuple)?;
                return Ok(vec![pid]);
            }
            pool.release_page(tid, pid);
        }

        let pid = PageId {
            table_id: self.table_id,
            page_no: self.num_pages(),
        };
        let frame = pool.get_page(tid, pid, LockMode::Exclusive)?;
        frame.write().insert_tuple(tuple)?;
        Ok(vec![pid])
    }

    /// Removes the tuple named by its record id, which must be set.
    /// Returns the dirtied page ids.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>, StorageError> {
        let rid = tuple.record_id().ok_or_else(|| {
            StorageError::Invariant("delete of a tuple with no record id".to_string())
        })?;
        let frame = pool.get_page(tid, rid.page_id, LockMode::Exclusive)?;
        frame.write().delete_tuple(tuple)?;
        Ok(vec![rid.page_id])
    }

    /// A page-ordered scan of every tuple, each page fetched read-locked
    /// through the buffer pool.
    pub fn iter(self: &Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator {
            file: Arc::clone(self),
            pool,
            tid,
            next_page_no: 0,
            current: Vec::new().into_iter(),
            open: false,
        }
    }
}

/// Pull iterator over every tuple of a heap file, in page order.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    next_page_no: usize,
    current: std::vec::IntoIter<Tuple>,
    open: bool,
}

impl HeapFileIterator {
    pub fn open(&mut self) {
        self.open = true;
        self.next_page_no = 0;
        self.current = Vec::new().into_iter();
    }

    pub fn rewind(&mut self) {
        self.open();
    }

    pub fn close(&mut self) {
        self.open = false;
        self.current = Vec::new().into_iter();
    }

    /// The next tuple, or `None` once every page is exhausted. A closed
    /// iterator yields nothing.
    pub fn next_tuple(&mut self) -> Result<Option<Tuple>, StorageError> {
        if !self.open {
            return Ok(None);
        }
        loop {
            if let Some(tuple) = self.current.next() {
                return Ok(Some(tuple));
            }
            if self.next_page_no >= self.file.num_pages() {
                return Ok(None);
            }
            let pid = PageId {
                table_id: self.file.id(),
                page_no: self.next_page_no,
            };
            self.next_page_no += 1;
            let frame = self.pool.get_page(self.tid, pid, LockMode::Shared)?;
            let tuples: Vec<Tuple> = frame.read().iter().cloned().collect();
            self.current = tuples.into_iter();
        }
    }
}
