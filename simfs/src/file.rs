use crate::fs::{FileSystem, FsError, FD_MAX};
use crate::io::{BlockNumber, BlockStorage};
use crate::node::{Descriptor, DescriptorId, Fd};
use crate::path::Resolver;
use crate::store::Fill;

/// Contents of a block before and after a `write`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWrite {
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

impl<T: BlockStorage> FileSystem<T> {
    /// Opens the ordinary file at `path` and returns its handle. A file holds
    /// one handle at a time, opening it again replaces the previous one.
    pub fn open(&mut self, path: &str) -> Result<Fd, FsError> {
        let (_, link) = Resolver::new(&self.nodes).entry(self.cwd.descriptor, path, true)?;
        let id = link.descriptor;
        self.ordinary(id, path)?;

        let fd = self.fresh_fd();
        if let Some(file) = self.nodes.get_mut(id).and_then(Descriptor::as_ordinary_mut) {
            if let Some(old) = file.fd.replace(fd) {
                debug!("descriptor {} reopened, fd {} dropped", id, old);
            }
        }
        debug!("opened {} (descriptor {}) as fd {}", path, id, fd);
        Ok(fd)
    }

    /// Releases `fd`. Unknown handles are ignored.
    pub fn close(&mut self, fd: Fd) {
        match self.nodes.fd_holder(fd) {
            Some(id) => {
                if let Some(file) = self.nodes.get_mut(id).and_then(Descriptor::as_ordinary_mut) {
                    file.fd = None;
                }
                debug!("closed fd {} (descriptor {})", fd, id);
            }
            None => debug!("close of unknown fd {}", fd),
        }
    }

    /// Reads up to `size` units from the start of block number `offset` of the
    /// file. The offset counts blocks, not units.
    pub fn read(&mut self, fd: Fd, offset: usize, size: usize) -> Result<Vec<u8>, FsError> {
        let id = self.nodes.fd_holder(fd).ok_or(FsError::BadHandle(fd))?;
        let blocknr = self.block_at(id, offset)?;
        let mut data = self.store.read(blocknr)?;
        data.truncate(size);
        Ok(data)
    }

    /// Replaces block number `offset` of the file with `size` freshly generated
    /// units followed by zeroes.
    pub fn write(&mut self, fd: Fd, offset: usize, size: usize) -> Result<BlockWrite, FsError> {
        let block_size = self.super_block.block_size;
        if size > block_size {
            return Err(FsError::TooMuchData { size, block_size });
        }
        let id = self.nodes.fd_holder(fd).ok_or(FsError::BadHandle(fd))?;
        let blocknr = self.block_at(id, offset)?;

        let before = self.store.read(blocknr)?;
        let mut after = vec![0; block_size];
        for unit in after.iter_mut().take(size) {
            *unit = self.rng.between(1, 9) as u8;
        }
        self.store.write(blocknr, &after)?;
        debug!("wrote {} units to block {} of descriptor {}", size, blocknr, id);
        Ok(BlockWrite { before, after })
    }

    /// Grows or shrinks the file at `path` to `new_size` units. New space
    /// reads as zero.
    pub fn truncate(&mut self, path: &str, new_size: usize) -> Result<(), FsError> {
        let (_, link) = Resolver::new(&self.nodes).entry(self.cwd.descriptor, path, true)?;
        let id = link.descriptor;
        let node = self.ordinary(id, path)?;
        let old_size = node.size();
        let mut blocks = node.blocks().to_vec();
        if new_size == old_size {
            return Ok(());
        }

        let wanted = self.store.blocks_for(new_size);
        if new_size > old_size {
            let extra = wanted.saturating_sub(blocks.len());
            if self.store.free_count() < extra {
                return Err(FsError::OutOfSpace);
            }
            let grown = self.store.allocate(extra, Fill::Zeroed, self.rng.as_mut())?;
            // Whatever sits past the old size in its last block becomes file data.
            if let Some(&last) = blocks.last() {
                let tail = self.tail_offset(old_size);
                self.store.zero_from(last, tail)?;
            }
            blocks.extend(grown);
        } else {
            for blocknr in blocks.split_off(wanted.min(blocks.len())) {
                self.store.free(blocknr)?;
            }
            if let Some(&last) = blocks.last() {
                let tail = self.tail_offset(new_size);
                self.store.zero_from(last, tail)?;
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            *node.blocks_mut() = blocks;
            node.set_size(new_size);
        }
        info!("truncated {} from {} to {} units", path, old_size, new_size);
        Ok(())
    }

    fn ordinary(&self, id: DescriptorId, path: &str) -> Result<&Descriptor, FsError> {
        self.nodes
            .get(id)
            .filter(|node| node.as_ordinary().is_some())
            .ok_or_else(|| FsError::NotAFile(path.to_string()))
    }

    fn block_at(&self, id: DescriptorId, offset: usize) -> Result<BlockNumber, FsError> {
        let blocks = self.nodes.get(id).map(Descriptor::blocks).unwrap_or(&[]);
        blocks.get(offset).copied().ok_or(FsError::OffsetTooLarge {
            offset,
            blocks: blocks.len(),
        })
    }

    /// Draws a handle no open file currently holds.
    fn fresh_fd(&mut self) -> Fd {
        let mut fd = self.rng.between(1, u64::from(FD_MAX)) as Fd;
        while self.nodes.fd_holder(fd).is_some() {
            fd = if fd == FD_MAX { 1 } else { fd + 1 };
        }
        fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::NextAvailableAllocation;
    use crate::io::MemoryDisk;

    fn create_test_fs() -> FileSystem<MemoryDisk> {
        FileSystem::builder()
            .with_size(64)
            .with_block_size(4)
            .with_max_descriptors(15)
            .with_seed(3)
            .with_allocation_policy(NextAvailableAllocation)
            .build()
            .unwrap()
    }

    #[test]
    fn write_then_read_pads_with_zero() {
        let mut fs = create_test_fs();
        fs.create_file_with_size("a", 8).unwrap();
        let fd = fs.open("a").unwrap();
        assert_ne!(fd, 0);

        let written = fs.write(fd, 0, 3).unwrap();
        let data = fs.read(fd, 0, 4).unwrap();

        assert_eq!(data, written.after);
        assert!(data[..3].iter().all(|&unit| (1..=9).contains(&unit)));
        assert_eq!(data[3], 0);
    }

    #[test]
    fn read_is_limited_to_block_size() {
        let mut fs = create_test_fs();
        fs.create_file_with_size("a", 4).unwrap();
        let fd = fs.open("a").unwrap();
        assert_eq!(fs.read(fd, 0, 100).unwrap().len(), 4);
        assert_eq!(fs.read(fd, 0, 2).unwrap().len(), 2);
    }

    #[test]
    fn closed_handle_is_rejected() {
        let mut fs = create_test_fs();
        fs.create_file_with_size("a", 4).unwrap();
        let fd = fs.open("a").unwrap();
        fs.close(fd);

        assert!(matches!(fs.read(fd, 0, 4), Err(FsError::BadHandle(_))));
        assert!(matches!(fs.write(fd, 0, 1), Err(FsError::BadHandle(_))));
        // Closing twice is harmless.
        fs.close(fd);
    }

    #[test]
    fn reopen_replaces_handle() {
        let mut fs = create_test_fs();
        fs.create_file_with_size("a", 4).unwrap();
        let first = fs.open("a").unwrap();
        let second = fs.open("a").unwrap();

        assert_ne!(first, second);
        assert!(matches!(fs.read(first, 0, 1), Err(FsError::BadHandle(_))));
        assert!(fs.read(second, 0, 1).is_ok());
    }

    #[test]
    fn open_handles_are_unique() {
        let mut fs = create_test_fs();
        let mut fds = Vec::new();
        for i in 0..10 {
            let name = format!("f{}", i);
            fs.create_file_with_size(&name, 1).unwrap();
            fds.push(fs.open(&name).unwrap());
        }
        fds.sort_unstable();
        fds.dedup();
        assert_eq!(fds.len(), 10);
    }

    #[test]
    fn offsets_past_block_map_fail() {
        let mut fs = create_test_fs();
        fs.create_file_with_size("a", 8).unwrap();
        let fd = fs.open("a").unwrap();

        assert!(fs.read(fd, 1, 4).is_ok());
        assert!(matches!(
            fs.read(fd, 2, 4),
            Err(FsError::OffsetTooLarge { offset: 2, blocks: 2 })
        ));
        assert!(matches!(fs.write(fd, 2, 1), Err(FsError::OffsetTooLarge { .. })));
    }

    #[test]
    fn oversized_write_is_rejected_first() {
        let mut fs = create_test_fs();
        assert!(matches!(
            fs.write(999, 0, 5),
            Err(FsError::TooMuchData { size: 5, block_size: 4 })
        ));
    }

    #[test]
    fn open_missing_or_directory_fails() {
        let mut fs = create_test_fs();
        fs.mkdir("d").unwrap();
        assert!(matches!(fs.open("nope"), Err(FsError::NotFound(_))));
        assert!(matches!(fs.open("d"), Err(FsError::NotAFile(_))));
    }

    #[test]
    fn open_follows_symlink_to_file() {
        let mut fs = create_test_fs();
        let id = fs.create_file_with_size("a", 4).unwrap();
        fs.symlink("a", "l").unwrap();

        let fd = fs.open("l").unwrap();
        assert_eq!(fs.nodes.fd_holder(fd), Some(id));
    }

    #[test]
    fn truncate_grows_with_zeroed_blocks() {
        let mut fs = create_test_fs();
        let id = fs.create_file_with_size("a", 5).unwrap();
        let fd = fs.open("a").unwrap();
        // Dirty the slack past the end of the file.
        fs.write(fd, 1, 4).unwrap();

        fs.truncate("a", 12).unwrap();

        let node = fs.file_stat(id).unwrap();
        assert_eq!(node.size(), 12);
        assert_eq!(node.blocks().len(), 3);
        assert_eq!(&fs.read(fd, 1, 4).unwrap()[1..], &[0, 0, 0]);
        assert_eq!(fs.read(fd, 2, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn truncate_within_block_keeps_block_count() {
        let mut fs = create_test_fs();
        let id = fs.create_file_with_size("a", 5).unwrap();
        let free = fs.free_blocks();

        fs.truncate("a", 7).unwrap();

        assert_eq!(fs.file_stat(id).unwrap().blocks().len(), 2);
        assert_eq!(fs.free_blocks(), free);
    }

    #[test]
    fn truncate_shrinks_and_frees_tail() {
        let mut fs = create_test_fs();
        let id = fs.create_file_with_size("a", 12).unwrap();
        let fd = fs.open("a").unwrap();
        fs.write(fd, 0, 4).unwrap();
        let dropped = fs.file_stat(id).unwrap().blocks()[1..].to_vec();

        fs.truncate("a", 2).unwrap();

        let node = fs.file_stat(id).unwrap();
        assert_eq!(node.size(), 2);
        assert_eq!(node.blocks().len(), 1);
        assert!(dropped.iter().all(|&b| !fs.is_block_used(b)));
        assert_eq!(&fs.read(fd, 0, 4).unwrap()[2..], &[0, 0]);
    }

    #[test]
    fn truncate_to_zero_releases_every_block() {
        let mut fs = create_test_fs();
        let id = fs.create_file_with_size("a", 8).unwrap();
        fs.truncate("a", 0).unwrap();
        assert!(fs.file_stat(id).unwrap().blocks().is_empty());
        assert_eq!(fs.free_blocks(), 15);

        fs.truncate("a", 3).unwrap();
        assert_eq!(fs.file_stat(id).unwrap().blocks().len(), 1);
    }

    #[test]
    fn truncate_without_space_changes_nothing() {
        let mut fs = create_test_fs();
        let id = fs.create_file_with_size("a", 4).unwrap();
        let before = fs.file_stat(id).unwrap().clone();

        assert!(matches!(fs.truncate("a", 100), Err(FsError::OutOfSpace)));
        assert_eq!(fs.file_stat(id).unwrap(), &before);
        assert_eq!(fs.free_blocks(), 14);
    }

    #[test]
    fn truncate_to_huge_size_is_out_of_space() {
        let mut fs = create_test_fs();
        let id = fs.create_file_with_size("a", 4).unwrap();
        let before = fs.file_stat(id).unwrap().clone();

        assert!(matches!(fs.truncate("a", usize::MAX), Err(FsError::OutOfSpace)));
        assert!(matches!(fs.truncate("a", usize::MAX - 1), Err(FsError::OutOfSpace)));
        assert_eq!(fs.file_stat(id).unwrap(), &before);
        assert_eq!(fs.free_blocks(), 14);
    }

    #[test]
    fn symlink_cycle_fails_open_and_truncate() {
        let mut fs = create_test_fs();
        fs.symlink("l2", "l1").unwrap();
        fs.symlink("l1", "l2").unwrap();

        assert!(matches!(fs.open("l1"), Err(FsError::SymlinkLoop(_))));
        assert!(matches!(fs.truncate("l1", 3), Err(FsError::SymlinkLoop(_))));
        assert!(matches!(fs.link("l3", "l2"), Err(FsError::SymlinkLoop(_))));
    }

    #[test]
    fn truncate_rejects_directories() {
        let mut fs = create_test_fs();
        fs.mkdir("d").unwrap();
        assert!(matches!(fs.truncate("d", 3), Err(FsError::NotAFile(_))));
    }
}
