//! Keyed query cache shared by every resource.
//!
//! This module is resource-agnostic:
//! - Entries are keyed by entity kind, scope and the exact parameter tuple
//! - Reads inside the staleness window never touch the network
//! - Identical concurrent reads share one in-flight request
//! - Sequence floors keep slower, older responses from overwriting newer data
//! - Mutations write, invalidate or remove entries through `CacheUpdate`

mod key;
mod layer;
mod mutation;
mod storage;
mod traits;

pub use key::{CacheKey, EntityKind, KeyPattern, KeyScope};
pub use layer::{CacheEvent, CacheLayer, RetryPolicy};
pub use mutation::{MutationEffects, Mutator};
pub use storage::{MemoryStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, Cacheable};
