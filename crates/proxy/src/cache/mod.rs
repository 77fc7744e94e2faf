//! Shared per-project caches: the static channel and the extended
//! prompt-cache keeper.

pub mod extended;
pub mod splice;
pub mod static_cache;

pub use extended::{CacheEntry, ExtendedCache, TickReport};
pub use static_cache::{StaticCache, StaticEntry};
