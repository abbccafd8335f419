pub mod index_map;
pub mod split;
pub mod tiered_map;

pub use tiered_map::{TieredMap, COMMON};
