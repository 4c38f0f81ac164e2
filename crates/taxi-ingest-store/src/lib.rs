pub mod bucket;
pub mod decode;
pub mod schema;
pub mod warehouse;

pub use bucket::DirectoryObjectStore;
pub use decode::{Column, ColumnType, DecodeError, ObjectReader, Schema};
pub use warehouse::{DEFAULT_BATCH_SIZE, SqliteWarehouse, StoreError};
