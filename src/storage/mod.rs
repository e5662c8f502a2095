//! Storage module for persisting crawl output
//!
//! Layout under the data directory:
//!
//! ```text
//! raw/{site}/{date}/{sha256(url)}.{ext}   exact fetched bytes
//! processed/{site}/{date}.jsonl           one Product per line, appended
//! reports/{site}/{date}.json              change report envelope
//! reports/{site}/{date}.md                the same report for humans
//! ```

mod fs;
mod traits;

pub use fs::FsSnapshotStore;
pub use traits::{SnapshotStore, StorageError, StorageResult};
