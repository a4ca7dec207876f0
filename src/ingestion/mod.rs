//! Ingestion: fetch, validate and load uploaded CSV bytes.

pub mod loader;
pub mod source;
pub mod validator;

pub use loader::{LoadOptions, TabularLoader};
pub use source::{ByteSource, HttpByteSource, LocalFileSource, RawUpload, ReferenceSource};
pub use validator::{split_csv_line, validate_csv, CsvShape};
