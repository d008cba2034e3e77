//! A simulated block based file system kept entirely in memory.
//!
//! A fixed number of equally sized blocks backs a table of descriptors for
//! ordinary files, directories and symbolic links. Directories form a tree
//! rooted at descriptor 0 and paths are resolved against a working directory
//! cursor owned by the [`FileSystem`] value.
#[macro_use]
extern crate log;

mod alloc;
mod file;
mod fs;
pub mod io;
mod link;
mod node;
mod path;
mod rng;
mod sb;
mod store;

pub use crate::alloc::{AllocationPolicy, Bitmap, NextAvailableAllocation, RandomAllocation, State};
pub use crate::file::BlockWrite;
pub use crate::fs::{FileSystem, FileSystemBuilder, FsError};
pub use crate::node::{
    Descriptor, DescriptorId, DescriptorKind, Directory, Fd, FileType, Link, OrdinaryFile,
    Symlink, ROOT_ID, ROOT_NAME,
};
pub use crate::path::MAX_SYMLINK_HOPS;
pub use crate::rng::{Lcg, RandomSource};
pub use crate::sb::SuperBlock;
