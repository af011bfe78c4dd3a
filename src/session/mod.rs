//! Key sessions
//!
//! Unlocking, secret recovery and bulk re-encryption of the record stores.

pub mod cache;
pub mod manager;
pub mod progress;
pub mod remote;

pub use cache::{recovery_key, session_key, FileCache, MemoryCache, SecretCache};
pub use manager::{Collaborators, KeySessionManager, Session, SessionState};
pub use progress::{Progress, ProgressKind, SubProgress};
pub use remote::{RecordStore, TokenOracle, UserDirectory, UserRecord, UserRecordPatch};
