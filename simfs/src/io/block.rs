/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// A fixed array of equally sized blocks addressed by index.
///
/// Devices know nothing about which blocks are in use or who owns them, that
/// bookkeeping lives in the block store layered on top.
pub trait BlockStorage {
    /// Number of units held by every block.
    fn block_size(&self) -> usize;
    /// Total number of blocks on the device.
    fn block_count(&self) -> usize;
    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or into a buffer shorter than
    /// one block, will return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes provided buffer into the specified block number. Buffers shorter
    /// than a block only overwrite the leading units.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
}
