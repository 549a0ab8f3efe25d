//! File fingerprinting.
//!
//! ```text
//! path ──stat──▶ HashEngine (sha256 + xxh3-128, one pass)
//!          └───▶ NeighborResolver (same directory, ranked)
//!                        │
//!                        ▼
//!                   FileRecord
//! ```

mod error;
pub mod hash;
pub mod neighbors;
mod prospector;

pub use error::{ProspectError, ProspectResult};
pub use hash::{CHUNK_SIZE, HashEngine, HashError};
pub use neighbors::{NeighborResolver, SIDECAR_KEYWORDS};
pub use prospector::Prospector;
