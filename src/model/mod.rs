//! Environment records and the merge/normalization rules applied to them.
//!
//! This module holds the local model of a project environment and the pure
//! functions that move data between it and the Semaphore UI wire format:
//! - Tri-state optional attributes
//! - Composite import identifier parsing
//! - Variable map encoding and decoding
//! - Merging value-less server responses into local records

mod attr;
mod identifier;
mod merge;
mod record;
pub mod vars;

pub use attr::Attr;
pub use identifier::{ImportFields, parse_import_id};
pub use merge::{by_identity, merge_response};
pub use record::{EnvironmentRecord, SecretEntry, SecretKind, VarMap, ensure_unique_identities};
