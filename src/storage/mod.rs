//! Storage layer
//!
//! JSON files with atomic writes backing the record stores, the user
//! directory and the secret caches.

pub mod file_io;
pub mod records;
pub mod users;

pub use file_io::{read_json, read_json_input, write_json_atomic, write_json_private};
pub use records::JsonRecordStore;
pub use users::JsonUserDirectory;
