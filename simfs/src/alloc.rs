use crate::io::BlockNumber;
use crate::rng::RandomSource;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One bit per block, set while the block belongs to a descriptor.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    /// Number of blocks tracked. The last word may be partially used.
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, blocknr: BlockNumber) -> State {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        // Grab of the u64 containing the significant bit.
        let outer_offset = self.bitmap[blocknr / 64];

        let inner_offset = blocknr % 64;
        let mask = 0b01_u64 << inner_offset;
        match (outer_offset & mask) >> inner_offset {
            0 => State::Free,
            1 => State::Used,
            _ => unreachable!("Block state returned a non 0 or 1 value. This likely indicates an error with bitmasking"),
        }
    }

    pub fn set_reserved(&mut self, blocknr: BlockNumber) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        self.bitmap[blocknr / 64] |= 0b01_u64 << (blocknr % 64);
    }

    pub fn set_free(&mut self, blocknr: BlockNumber) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        self.bitmap[blocknr / 64] &= !(0b01_u64 << (blocknr % 64));
    }

    pub fn used_count(&self) -> usize {
        self.bitmap.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn free_count(&self) -> usize {
        self.len - self.used_count()
    }

    /// Iterates free block numbers in ascending order.
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            marker: 0,
            bitmap: self,
        }
    }
}

pub struct FreeBlocks<'a> {
    /// Keeps track of the next starting place for looking for available blocks.
    marker: usize,
    bitmap: &'a Bitmap,
}

impl Iterator for FreeBlocks<'_> {
    type Item = BlockNumber;

    fn next(&mut self) -> Option<Self::Item> {
        while self.marker < self.bitmap.len {
            let i = self.marker;
            self.marker += 1;
            if let State::Free = self.bitmap.get(i) {
                return Some(i);
            }
        }
        None
    }
}

/// Decides which free block satisfies the next single-block request.
pub trait AllocationPolicy {
    /// Returns a currently free block, or `None` when the bitmap is full.
    fn select(&mut self, bitmap: &Bitmap, rng: &mut dyn RandomSource) -> Option<BlockNumber>;
}

/// Implements a naive block allocation policy for new data block requirements. This policy will
/// always hand out the lowest numbered free block, which keeps tests able to predict exact
/// block numbers.
///
/// ## Other Pre-Allocation Policies
///
/// 1. Allocation that attempts to find enough contiguous available blocks so data can be allocated
///    close together (speed ups through sequential reads).
/// 2. Allocation that attempts to spread randomly over blocks to prevent wear of physical devices
///    in the front section (that may be rewritten many times before allocating to the back), see
///    [`RandomAllocation`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NextAvailableAllocation;

impl AllocationPolicy for NextAvailableAllocation {
    fn select(&mut self, bitmap: &Bitmap, _rng: &mut dyn RandomSource) -> Option<BlockNumber> {
        bitmap.free_blocks().next()
    }
}

/// Picks uniformly among the free blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomAllocation;

impl AllocationPolicy for RandomAllocation {
    fn select(&mut self, bitmap: &Bitmap, rng: &mut dyn RandomSource) -> Option<BlockNumber> {
        let free = bitmap.free_count();
        if free == 0 {
            return None;
        }
        let nth = rng.below(free as u64) as usize;
        bitmap.free_blocks().nth(nth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Lcg;

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new(16);

        bmp.set_reserved(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new(130);

        bmp.set_reserved(0);
        bmp.set_reserved(63);
        bmp.set_reserved(64);
        bmp.set_reserved(129);

        assert_eq!(bmp.get(0), State::Used);
        assert_eq!(bmp.get(63), State::Used);
        assert_eq!(bmp.get(64), State::Used);
        assert_eq!(bmp.get(129), State::Used);
        assert_eq!(bmp.used_count(), 4);
        assert_eq!(bmp.free_count(), 126);
    }

    #[test]
    fn can_toggle_block_between_free_and_used() {
        let mut bmp = Bitmap::new(16);
        bmp.set_reserved(9);
        bmp.set_reserved(10);
        assert_eq!(bmp.get(10), State::Used);

        bmp.set_free(10);
        assert_eq!(bmp.get(10), State::Free);
        // Neighbours are untouched.
        assert_eq!(bmp.get(9), State::Used);
    }

    #[test]
    fn freeing_a_free_block_is_a_no_op() {
        let mut bmp = Bitmap::new(8);
        bmp.set_free(3);
        assert_eq!(bmp.free_count(), 8);
    }

    #[test]
    #[should_panic]
    fn access_past_length_panics() {
        Bitmap::new(8).get(8);
    }

    #[test]
    fn free_blocks_skips_used_ones() {
        let mut bmp = Bitmap::new(6);
        bmp.set_reserved(0);
        bmp.set_reserved(2);
        bmp.set_reserved(3);
        assert_eq!(bmp.free_blocks().collect::<Vec<_>>(), vec![1, 4, 5]);
    }

    #[test]
    fn next_available_returns_lowest_free_block() {
        let mut bmp = Bitmap::new(4);
        bmp.set_reserved(0);
        bmp.set_reserved(1);
        let mut rng = Lcg::seeded(0);
        assert_eq!(NextAvailableAllocation.select(&bmp, &mut rng), Some(2));
    }

    #[test]
    fn random_allocation_only_returns_free_blocks() {
        let mut bmp = Bitmap::new(32);
        let mut rng = Lcg::seeded(99);
        let mut policy = RandomAllocation;
        while let Some(block) = policy.select(&bmp, &mut rng) {
            assert_eq!(bmp.get(block), State::Free);
            bmp.set_reserved(block);
        }
        assert_eq!(bmp.free_count(), 0);
    }
}
