//! Blocks and chains, the integrity engine that stamps and checks them, and
//! the scans that answer access-key lookups.

pub mod block;
pub mod integrity;
pub mod search;

pub use block::*;
pub use integrity::*;
pub use search::*;
