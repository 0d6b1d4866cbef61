//! Persistence for the in-memory adapters.

mod snapshot;

pub use snapshot::{SNAPSHOT_VERSION, Snapshot};
