//! Access layer for tuple-oriented operations.
//!
//! - **HeapFile**: a table stored as unordered fixed-length tuples over pages
//! - **HeapScan**: forward-only iteration over a heap file
//! - **Schema**: column layout and the fixed-length tuple encoding
//! - **Tuple**: a row of values plus the slot it lives in
//! - **Value**: typed column values

pub mod heap;
pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use heap::HeapFile;
pub use scan::HeapScan;
pub use schema::{Column, Schema};
pub use tuple::{RecordId, Tuple};
pub use value::{DataType, Value, STRING_LEN};
