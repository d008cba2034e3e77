mod block;
mod memory;

pub use block::{BlockNumber, BlockStorage};
pub use memory::{MemoryDisk, MemoryDiskBuilder};
