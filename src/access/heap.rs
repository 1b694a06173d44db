use crate::access::scan::HeapScan;
use crate::access::schema::Schema;
use crate::access::tuple::{RecordId, Tuple};
use crate::catalog::TableId;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::PageFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, Page, PageId, Permission};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// A table stored as an unordered collection of fixed-length tuples spread
/// over the pages of one file.
///
/// Pages are only ever touched through the [`BufferPool`], under the lock
/// the requesting transaction holds, except for the empty image of a freshly
/// appended page, which is written straight to disk so that the page count
/// grows before anyone else looks at it.
pub struct HeapFile {
    table_id: TableId,
    schema: Schema,
    file: PageFile,
    /// Serializes appends so that two writers never claim the same new page.
    append_latch: Mutex<()>,
}

impl HeapFile {
    /// Creates an empty heap file at `path`, truncating anything there.
    pub fn create(
        path: &Path,
        table_id: TableId,
        schema: Schema,
        page_size: usize,
    ) -> StorageResult<Self> {
        Self::check_fits(&schema, page_size)?;
        let file = PageFile::create(path, page_size)?;
        Ok(Self::with_file(table_id, schema, file))
    }

    /// Opens the heap file at `path`, creating it empty if it is missing.
    pub fn open(
        path: &Path,
        table_id: TableId,
        schema: Schema,
        page_size: usize,
    ) -> StorageResult<Self> {
        Self::check_fits(&schema, page_size)?;
        let file = PageFile::open(path, page_size)?;
        Ok(Self::with_file(table_id, schema, file))
    }

    fn with_file(table_id: TableId, schema: Schema, file: PageFile) -> Self {
        Self {
            table_id,
            schema,
            file,
            append_latch: Mutex::new(()),
        }
    }

    fn check_fits(schema: &Schema, page_size: usize) -> StorageResult<()> {
        let slots = HeapPage::<&[u8]>::slots_per_page(page_size, schema.tuple_size());
        if schema.is_empty() || slots == 0 {
            return Err(StorageError::SchemaMismatch(format!(
                "a {}-byte tuple does not fit on a {}-byte page",
                schema.tuple_size(),
                page_size
            )));
        }
        // Slot numbers are stored as u16
        if slots > usize::from(u16::MAX) {
            return Err(StorageError::SchemaMismatch(format!(
                "a {}-byte page holds {} {}-byte tuples, more than {} slots",
                page_size,
                slots,
                schema.tuple_size(),
                u16::MAX
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn page_size(&self) -> usize {
        self.file.page_size()
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        self.file.num_pages()
    }

    pub fn read_page(&self, page_id: PageId) -> StorageResult<Page> {
        if page_id.table_id != self.table_id {
            return Err(StorageError::PageNotFound(page_id));
        }
        self.file.read_page(page_id)
    }

    pub fn write_page(&self, page: &Page) -> StorageResult<()> {
        if page.id().table_id != self.table_id {
            return Err(StorageError::PageNotFound(page.id()));
        }
        self.file.write_page(page)
    }

    /// Decodes every tuple stored on `page`, in slot order.
    pub fn tuples_on(&self, page: &Page) -> StorageResult<Vec<Tuple>> {
        HeapPage::new(page.data(), self.schema.tuple_size())
            .tuples()
            .map(|(slot, data)| {
                let values = self.schema.decode(data)?;
                Ok(Tuple::with_record_id(values, RecordId::new(page.id(), slot)))
            })
            .collect()
    }

    /// Places `tuple` on the first page with a free slot, appending a page
    /// when every page is full. Sets the tuple's record id and returns the
    /// modified page.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<Page>> {
        let data = self.schema.encode(tuple.values())?;
        let tuple_size = self.schema.tuple_size();

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let held_before = pool.holds_lock(tid, page_id);

            let mut page = pool.fetch_page(tid, page_id, Permission::ReadWrite)?;
            let slot = HeapPage::new(page.data_mut(), tuple_size).insert_tuple(&data);
            if let Some(slot) = slot {
                tuple.set_record_id(Some(RecordId::new(page_id, slot)));
                return Ok(vec![page]);
            }

            // Nothing was read or written; let other writers probe it too.
            if !held_before {
                pool.release_page(tid, page_id);
            }
        }

        let _latch = self.append_latch.lock();
        let page_id = PageId::new(self.table_id, self.num_pages()?);
        pool.lock_page(tid, page_id, Permission::ReadWrite)?;

        let mut page = Page::empty(page_id, self.page_size());
        self.file.write_page(&page)?;
        debug!("{} appended page {}", tid, page_id);

        let slot = HeapPage::new(page.data_mut(), tuple_size)
            .insert_tuple(&data)
            .ok_or(StorageError::PageFull(page_id))?;
        tuple.set_record_id(Some(RecordId::new(page_id, slot)));

        Ok(vec![page])
    }

    /// Removes `tuple` from the slot its record id names, clears the record
    /// id, and returns the modified page.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<Page>> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::TupleNotFound("tuple has no record id".to_string()))?;
        if record_id.page_id.table_id != self.table_id {
            return Err(StorageError::TupleNotFound(format!(
                "{} is not in table {}",
                record_id, self.table_id
            )));
        }
        if record_id.page_id.page_no >= self.num_pages()? {
            return Err(StorageError::TupleNotFound(format!(
                "{} is past the end of table {}",
                record_id, self.table_id
            )));
        }

        let mut page = pool.fetch_page(tid, record_id.page_id, Permission::ReadWrite)?;
        if !HeapPage::new(page.data_mut(), self.schema.tuple_size()).delete_tuple(record_id.slot) {
            return Err(StorageError::TupleNotFound(format!("slot {} is empty", record_id)));
        }
        tuple.set_record_id(None);

        Ok(vec![page])
    }

    /// Lazily iterates over every tuple of the table, page by page, reading
    /// each page through `pool` with read-only permission.
    pub fn scan<'a>(self: &Arc<Self>, pool: &'a BufferPool, tid: TransactionId) -> HeapScan<'a> {
        HeapScan::new(Arc::clone(self), pool, tid)
    }
}
