//! Cache tiers: the context-wide group cache for global folders and the
//! per-user session map for everything else.

pub mod group;
pub mod session_map;
pub mod tiers;

#[cfg(test)]
mod tiers_test;

pub use group::{GroupCache, InMemoryGroupCache};
pub use session_map::SessionFolderMap;
pub use tiers::CacheTiers;
