use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Page-granular access to one backing file.
///
/// Page `n` always occupies bytes `[n * page_size, (n + 1) * page_size)`.
pub struct PageFile {
    path: PathBuf,
    file: Mutex<File>,
    page_size: usize,
}

impl PageFile {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self::with_file(path, file, page_size))
    }

    /// Opens the file at `path`, creating it empty if it does not exist.
    pub fn open(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self::with_file(path, file, page_size))
    }

    fn with_file(path: &Path, file: File, page_size: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            page_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of whole pages stored in the file.
    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.lock().metadata()?.len();
        Ok((file_size / self.page_size as u64) as u32)
    }

    pub fn read_page(&self, page_id: PageId) -> StorageResult<Page> {
        let offset = self.page_offset(page_id);
        let mut file = self.file.lock();

        if offset + self.page_size as u64 > file.metadata()?.len() {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut buf = vec![0u8; self.page_size];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;

        Ok(Page::from_bytes(page_id, buf))
    }

    /// Writes the full image of `page` at its offset, growing the file if
    /// needed.
    pub fn write_page(&self, page: &Page) -> StorageResult<()> {
        if page.data().len() != self.page_size {
            return Err(StorageError::Corrupted(format!(
                "page {} is {} bytes, expected {}",
                page.id(),
                page.data().len(),
                self.page_size
            )));
        }

        let offset = self.page_offset(page.id());
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.data())?;
        file.sync_data()?;

        Ok(())
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        page_id.page_no as u64 * self.page_size as u64
    }
}
