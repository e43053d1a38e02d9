//! State management.
//!
//! State tracks every managed environment by address, with the full record
//! last written to the server, secret values included.

mod local;
mod lock;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR, STATE_FILE};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use store::StateStore;
pub use types::{
    EnvironmentState, HistoryEntry, ProviderState, STATE_VERSION, StateOperation,
};
