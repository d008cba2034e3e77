use crate::io::{BlockNumber, BlockStorage};
use std::io::ErrorKind;

/// Emulates block storage in memory. Nothing survives the value being dropped.
pub struct MemoryDisk {
    blocks: Vec<Vec<u8>>,
    block_size: usize,
}

impl MemoryDisk {
    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr >= self.blocks.len() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        Ok(())
    }
}

impl BlockStorage for MemoryDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        if buf.len() < self.block_size {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        buf[..self.block_size].copy_from_slice(&self.blocks[blocknr]);
        Ok(())
    }

    /// This method truncates writes that exceed the block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        let max = self.block_size.min(buf.len());
        self.blocks[blocknr][..max].copy_from_slice(&buf[..max]);
        Ok(())
    }
}

pub struct MemoryDiskBuilder {
    block_count: usize,
    block_size: usize,
}

impl Default for MemoryDiskBuilder {
    fn default() -> Self {
        MemoryDiskBuilder {
            block_count: 0,
            block_size: 4,
        }
    }
}

impl MemoryDiskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Sets the number of units held by each block.
    pub fn with_block_size(mut self, units: usize) -> Self {
        self.block_size = units;
        self
    }

    /// Allocates every block up front, zero filled.
    pub fn build(self) -> std::io::Result<MemoryDisk> {
        if self.block_count == 0 || self.block_size == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "disk needs at least one non-empty block",
            ));
        }
        Ok(MemoryDisk {
            blocks: vec![vec![0x00; self.block_size]; self.block_count],
            block_size: self.block_size,
        })
    }
}
