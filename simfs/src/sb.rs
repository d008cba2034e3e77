/// Geometry of a mounted file system.
///
/// Keeps the size of the file system by tracking the number of blocks carved
/// out of the device and the number of descriptors it may hold. The number of
/// descriptors ultimately sets the upper bound on how many file system objects
/// (files, directories and symlinks, root included) can exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// Total capacity in units.
    pub size: usize,
    /// Units per block.
    pub block_size: usize,
    /// `size / block_size`.
    pub blocks_count: usize,
    /// Upper bound on live descriptors.
    pub max_descriptors: usize,
}

impl SuperBlock {
    pub fn new(block_size: usize, blocks_count: usize, max_descriptors: usize) -> Self {
        Self {
            size: block_size * blocks_count,
            block_size,
            blocks_count,
            max_descriptors,
        }
    }
}
