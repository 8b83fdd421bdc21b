//! Bounded response cache.
//!
//! [`BoundedCache`] is a key-value store with a hard ceiling on both entry
//! count and total estimated size. When either bound would be exceeded, the
//! least-recently-used entries are evicted. A single entry larger than the
//! size ceiling is rejected instead of inserted.

mod bounded;
mod size;

pub use bounded::{BoundedCache, CacheLimits, CacheStats, PutResult};
pub use size::SizeEstimate;
