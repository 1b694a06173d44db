mod page_file;

pub use page_file::PageFile;
