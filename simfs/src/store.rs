use crate::alloc::{AllocationPolicy, Bitmap, State};
use crate::fs::FsError;
use crate::io::{BlockNumber, BlockStorage};
use crate::rng::RandomSource;

/// How freshly allocated blocks are initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Pseudo-random digits standing in for whatever the medium held.
    Simulated,
    /// Uninitialised data reads as zero.
    Zeroed,
}

/// A block device paired with the bitmap recording which of its blocks are
/// owned by a descriptor.
pub struct BlockStore<T: BlockStorage> {
    dev: T,
    bitmap: Bitmap,
    policy: Box<dyn AllocationPolicy>,
}

impl<T: BlockStorage> BlockStore<T> {
    pub fn new(dev: T, policy: Box<dyn AllocationPolicy>) -> Self {
        let bitmap = Bitmap::new(dev.block_count());
        Self {
            dev,
            bitmap,
            policy,
        }
    }

    pub fn block_size(&self) -> usize {
        self.dev.block_size()
    }

    pub fn free_count(&self) -> usize {
        self.bitmap.free_count()
    }

    pub fn is_used(&self, blocknr: BlockNumber) -> bool {
        blocknr < self.bitmap.len() && self.bitmap.get(blocknr) == State::Used
    }

    /// Number of blocks needed to hold `units`.
    pub fn blocks_for(&self, units: usize) -> usize {
        let size = self.block_size();
        units / size + (units % size != 0) as usize
    }

    /// Claims a specific block, zero filled. Used for the root directory.
    pub fn reserve(&mut self, blocknr: BlockNumber) -> Result<(), FsError> {
        if self.bitmap.get(blocknr) == State::Used {
            return Err(FsError::OutOfSpace);
        }
        self.fill(blocknr, Fill::Zeroed, None)?;
        self.bitmap.set_reserved(blocknr);
        Ok(())
    }

    /// Claims `n` distinct free blocks chosen by the allocation policy.
    ///
    /// Either all `n` blocks are handed out or none are.
    pub fn allocate(
        &mut self,
        n: usize,
        fill: Fill,
        rng: &mut dyn RandomSource,
    ) -> Result<Vec<BlockNumber>, FsError> {
        if self.free_count() < n {
            return Err(FsError::OutOfSpace);
        }

        let mut blocks = Vec::with_capacity(n);
        for _ in 0..n {
            match self.policy.select(&self.bitmap, rng) {
                Some(blocknr) if self.bitmap.get(blocknr) == State::Free => {
                    self.bitmap.set_reserved(blocknr);
                    blocks.push(blocknr);
                }
                _ => {
                    for &blocknr in &blocks {
                        self.bitmap.set_free(blocknr);
                    }
                    return Err(FsError::OutOfSpace);
                }
            }
        }

        for &blocknr in &blocks {
            self.fill(blocknr, fill, Some(&mut *rng))?;
        }
        debug!("allocated blocks {:?} ({:?})", blocks, fill);
        Ok(blocks)
    }

    /// Zero fills the block and returns it to the free pool. Freeing an
    /// already free block is a no-op.
    pub fn free(&mut self, blocknr: BlockNumber) -> Result<(), FsError> {
        if self.bitmap.get(blocknr) == State::Free {
            return Ok(());
        }
        self.fill(blocknr, Fill::Zeroed, None)?;
        self.bitmap.set_free(blocknr);
        debug!("freed block {}", blocknr);
        Ok(())
    }

    pub fn read(&mut self, blocknr: BlockNumber) -> Result<Vec<u8>, FsError> {
        let mut buf = vec![0; self.block_size()];
        self.dev.read_block(blocknr, &mut buf)?;
        trace!("read block {}: {:?}", blocknr, buf);
        Ok(buf)
    }

    pub fn write(&mut self, blocknr: BlockNumber, data: &[u8]) -> Result<(), FsError> {
        trace!("write block {}: {:?}", blocknr, data);
        self.dev.write_block(blocknr, data)?;
        Ok(())
    }

    /// Zeroes every unit of the block from `offset` to its end.
    pub fn zero_from(&mut self, blocknr: BlockNumber, offset: usize) -> Result<(), FsError> {
        let mut buf = self.read(blocknr)?;
        if offset >= buf.len() {
            return Ok(());
        }
        buf[offset..].iter_mut().for_each(|unit| *unit = 0);
        self.write(blocknr, &buf)
    }

    fn fill(
        &mut self,
        blocknr: BlockNumber,
        fill: Fill,
        rng: Option<&mut dyn RandomSource>,
    ) -> Result<(), FsError> {
        let mut buf = vec![0; self.block_size()];
        if let (Fill::Simulated, Some(rng)) = (fill, rng) {
            buf.iter_mut().for_each(|unit| *unit = rng.between(0, 9) as u8);
        }
        self.write(blocknr, &buf)
    }
}
