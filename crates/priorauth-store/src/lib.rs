//! Storage layer: write-once case files, policy texts, and the flat vector index snapshot.

mod atomic;
mod cases;
mod error;
mod flat;
mod policies;
mod raw;
mod snapshot;
mod summary;

pub use atomic::{write_atomic, write_json_atomic};
pub use cases::{CaseLedger, CaseStore, StoredCase};
pub use error::StoreError;
pub use flat::{FlatIndex, Hit};
pub use policies::PolicyStore;
pub use raw::read_raw_records;
pub use snapshot::{IndexSnapshot, SnapshotInfo};
pub use summary::RunSummary;
