use crate::alloc::{AllocationPolicy, RandomAllocation};
use crate::io::{BlockNumber, BlockStorage, MemoryDisk, MemoryDiskBuilder};
use crate::node::{
    Descriptor, DescriptorId, DescriptorKind, DescriptorTable, Directory, Link, OrdinaryFile,
    Symlink, ROOT_ID, ROOT_NAME,
};
use crate::path::{validate_name, Resolver};
use crate::rng::{Lcg, RandomSource};
use crate::sb::SuperBlock;
use crate::store::{BlockStore, Fill};

use thiserror::Error;

/// Root directory always lives in the first block.
const ROOT_BLOCK: BlockNumber = 0;
/// Handles are drawn from `1..=FD_MAX`.
pub(crate) const FD_MAX: u32 = 0xFFFF;
/// Randomly sized files span at most this many blocks.
const MAX_RANDOM_FILE_BLOCKS: usize = 4;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("unable to allocate blocks: not enough free space")]
    OutOfSpace,
    #[error("unable to create a descriptor: descriptor limit reached")]
    TooManyDescriptors,
    #[error("the name is already taken: {0}")]
    NameTaken(String),
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("wrong fd provided: {0}")]
    BadHandle(u32),
    #[error("offset {offset} is past the last block ({blocks} blocks)")]
    OffsetTooLarge { offset: usize, blocks: usize },
    #[error("too much data: {size} units do not fit in a {block_size} unit block")]
    TooMuchData { size: usize, block_size: usize },
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not an ordinary file: {0}")]
    NotAFile(String),
    #[error("too many levels of symbolic links: {0}")]
    SymlinkLoop(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid file system block layout")]
    InvalidBlock(#[from] std::io::Error),
    #[error("unable to seed random source")]
    Entropy(#[from] getrandom::Error),
}

/// Collects mount parameters for an in-memory file system.
///
/// ```
/// use simfs::{FileSystemBuilder, NextAvailableAllocation};
///
/// let fs = FileSystemBuilder::new()
///     .with_size(64)
///     .with_block_size(4)
///     .with_max_descriptors(15)
///     .with_seed(7)
///     .with_allocation_policy(NextAvailableAllocation)
///     .build()
///     .unwrap();
/// assert_eq!(fs.super_block().blocks_count, 16);
/// ```
pub struct FileSystemBuilder {
    size: usize,
    block_size: usize,
    max_descriptors: usize,
    rng: Option<Box<dyn RandomSource>>,
    policy: Box<dyn AllocationPolicy>,
}

impl Default for FileSystemBuilder {
    fn default() -> Self {
        FileSystemBuilder {
            size: 128,
            block_size: 4,
            max_descriptors: 15,
            rng: None,
            policy: Box::new(RandomAllocation),
        }
    }
}

impl FileSystemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total capacity in units. Must be a multiple of the block size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Upper bound on live descriptors, the root directory included.
    pub fn with_max_descriptors(mut self, max: usize) -> Self {
        self.max_descriptors = max;
        self
    }

    /// Makes every random choice reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_random_source(Lcg::seeded(seed))
    }

    pub fn with_random_source<R: RandomSource + 'static>(mut self, rng: R) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn with_allocation_policy<P: AllocationPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn build(self) -> Result<FileSystem<MemoryDisk>, FsError> {
        if self.block_size == 0 || self.size == 0 || self.size % self.block_size != 0 {
            return Err(FsError::InvalidArgument(format!(
                "size {} is not a positive multiple of block size {}",
                self.size, self.block_size
            )));
        }
        let rng = match self.rng {
            Some(rng) => rng,
            None => Box::new(Lcg::from_entropy()?),
        };
        let dev = MemoryDiskBuilder::new()
            .with_block_count(self.size / self.block_size)
            .with_block_size(self.block_size)
            .build()?;
        FileSystem::create(dev, self.max_descriptors, rng, self.policy)
    }
}

/// A block based file system kept entirely in memory.
///
/// # Layout
/// =================================================================
/// | Root directory (block 0) | Blocks handed out to descriptors  |
/// =================================================================
pub struct FileSystem<T: BlockStorage = MemoryDisk> {
    pub(crate) super_block: SuperBlock,
    pub(crate) store: BlockStore<T>,
    pub(crate) nodes: DescriptorTable,
    /// The working directory cursor.
    pub(crate) cwd: Link,
    pub(crate) rng: Box<dyn RandomSource>,
}

impl FileSystem<MemoryDisk> {
    /// Mounts a fresh file system of `size` units split into `block_size`
    /// unit blocks.
    pub fn mount(size: usize, block_size: usize, max_descriptors: usize) -> Result<Self, FsError> {
        FileSystemBuilder::new()
            .with_size(size)
            .with_block_size(block_size)
            .with_max_descriptors(max_descriptors)
            .build()
    }

    pub fn builder() -> FileSystemBuilder {
        FileSystemBuilder::new()
    }
}

impl<T: BlockStorage> FileSystem<T> {
    /// Initializes the file system onto owned block storage. The geometry is
    /// taken from the device.
    pub fn create(
        dev: T,
        max_descriptors: usize,
        rng: Box<dyn RandomSource>,
        policy: Box<dyn AllocationPolicy>,
    ) -> Result<Self, FsError> {
        if dev.block_size() == 0 || dev.block_count() == 0 {
            return Err(FsError::InvalidArgument(format!(
                "device has {} blocks of {} units",
                dev.block_count(),
                dev.block_size()
            )));
        }
        if max_descriptors == 0 || max_descriptors >= FD_MAX as usize {
            return Err(FsError::InvalidArgument(format!(
                "descriptor limit must be between 1 and {}",
                FD_MAX - 1
            )));
        }
        let super_block = SuperBlock::new(dev.block_size(), dev.block_count(), max_descriptors);
        let mut store = BlockStore::new(dev, policy);
        store.reserve(ROOT_BLOCK)?;
        let nodes = DescriptorTable::new(max_descriptors, ROOT_BLOCK, super_block.block_size);

        info!(
            "mounted {} blocks of {} units, {} descriptors",
            super_block.blocks_count, super_block.block_size, super_block.max_descriptors
        );
        Ok(FileSystem {
            super_block,
            store,
            nodes,
            cwd: Link::new(ROOT_NAME, ROOT_ID),
            rng,
        })
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn free_blocks(&self) -> usize {
        self.store.free_count()
    }

    pub fn is_block_used(&self, blocknr: BlockNumber) -> bool {
        self.store.is_used(blocknr)
    }

    /// Number of live descriptors, root included.
    pub fn descriptor_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every live descriptor, ordered by id.
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.nodes.iter()
    }

    /// Returns the descriptor with the given id.
    pub fn file_stat(&self, id: DescriptorId) -> Result<&Descriptor, FsError> {
        self.nodes
            .get(id)
            .ok_or_else(|| FsError::NotFound(format!("descriptor {}", id)))
    }

    /// Entries of the working directory.
    pub fn list_directory(&self) -> &[Link] {
        self.nodes
            .directory(self.cwd.descriptor)
            .map(|dir| dir.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Name of the working directory.
    pub fn pwd(&self) -> &str {
        &self.cwd.name
    }

    pub fn cwd(&self) -> &Link {
        &self.cwd
    }

    /// Absolute path of the working directory.
    pub fn cwd_path(&self) -> String {
        let mut names = Vec::new();
        let mut id = self.cwd.descriptor;
        while id != ROOT_ID {
            match self.nodes.directory(id) {
                Some(dir) => {
                    names.push(dir.name.as_str());
                    id = dir.parent.descriptor;
                }
                None => break,
            }
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Moves the working directory. The cursor only changes when the whole
    /// path resolves.
    pub fn cd(&mut self, path: &str) -> Result<(), FsError> {
        let id = Resolver::new(&self.nodes).directory(self.cwd.descriptor, path)?;
        let name = self
            .nodes
            .directory(id)
            .map(|dir| dir.name.clone())
            .ok_or_else(|| FsError::NotADirectory(path.to_string()))?;
        debug!("cd {} -> {} ({})", path, name, id);
        self.cwd = Link::new(name, id);
        Ok(())
    }

    /// Creates an ordinary file in the working directory with a random size of
    /// one to four blocks worth of simulated data.
    pub fn create_file(&mut self, name: &str) -> Result<DescriptorId, FsError> {
        let max = MAX_RANDOM_FILE_BLOCKS.saturating_mul(self.super_block.block_size);
        let size = self.rng.between(1, max as u64) as usize;
        self.create_file_with_size(name, size)
    }

    /// Creates an ordinary file of `size` units in the working directory.
    pub fn create_file_with_size(&mut self, name: &str, size: usize) -> Result<DescriptorId, FsError> {
        validate_name(name)?;
        self.ensure_name_free(name)?;
        let needed = self.store.blocks_for(size);
        if self.store.free_count() < needed {
            return Err(FsError::OutOfSpace);
        }
        if self.nodes.is_full() {
            return Err(FsError::TooManyDescriptors);
        }

        let blocks = self.store.allocate(needed, Fill::Simulated, self.rng.as_mut())?;
        if let Some(&last) = blocks.last() {
            let tail = self.tail_offset(size);
            self.store.zero_from(last, tail)?;
        }
        let id = self.nodes.next_id();
        self.nodes.insert(Descriptor::new(
            id,
            size,
            blocks,
            DescriptorKind::Ordinary(OrdinaryFile {
                names: vec![name.to_string()],
                fd: None,
            }),
        ));
        self.add_entry(Link::new(name, id));
        info!("created file {} ({} units) as descriptor {}", name, size, id);
        Ok(id)
    }

    /// Creates an empty directory inside the working directory.
    pub fn mkdir(&mut self, name: &str) -> Result<DescriptorId, FsError> {
        validate_name(name)?;
        let (id, block) = self.claim_single_block(name)?;
        self.nodes.insert(Descriptor::new(
            id,
            self.super_block.block_size,
            vec![block],
            DescriptorKind::Directory(Directory {
                name: name.to_string(),
                entries: Vec::new(),
                current: Link::new(name, id),
                parent: self.cwd.clone(),
            }),
        ));
        self.add_entry(Link::new(name, id));
        info!("created directory {} as descriptor {}", name, id);
        Ok(id)
    }

    /// Removes an empty directory.
    pub fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let (_, link) = Resolver::new(&self.nodes).entry(self.cwd.descriptor, path, false)?;
        let id = link.descriptor;
        let dir = self
            .nodes
            .directory(id)
            .ok_or_else(|| FsError::NotADirectory(path.to_string()))?;
        if id == ROOT_ID {
            return Err(FsError::InvalidArgument(
                "the root directory cannot be removed".to_string(),
            ));
        }
        if !dir.is_empty() {
            return Err(FsError::DirectoryNotEmpty(path.to_string()));
        }
        let parent = dir.parent.clone();

        if let Some(parent_dir) = self.nodes.directory_mut(parent.descriptor) {
            parent_dir.entries.retain(|entry| entry.descriptor != id);
        }
        self.release(id)?;
        if self.cwd.descriptor == id {
            self.cwd = parent;
        }
        info!("removed directory {}", path);
        Ok(())
    }

    /// Creates a symlink named `name` in the working directory. The target is
    /// not checked until the link is followed.
    pub fn symlink(&mut self, target: &str, name: &str) -> Result<DescriptorId, FsError> {
        validate_name(name)?;
        if target.is_empty() {
            return Err(FsError::InvalidArgument("empty symlink target".to_string()));
        }
        let (id, block) = self.claim_single_block(name)?;
        self.nodes.insert(Descriptor::new(
            id,
            target.len(),
            vec![block],
            DescriptorKind::Symlink(Symlink {
                name: name.to_string(),
                value: target.to_string(),
            }),
        ));
        self.add_entry(Link::new(name, id));
        info!("created symlink {} -> {} as descriptor {}", name, target, id);
        Ok(id)
    }

    /// Fails when `name` is a hard link name anywhere or an entry of the
    /// working directory.
    pub(crate) fn ensure_name_free(&self, name: &str) -> Result<(), FsError> {
        let in_cwd = self
            .nodes
            .directory(self.cwd.descriptor)
            .map_or(false, |dir| dir.entry(name).is_some());
        if in_cwd || self.nodes.is_name_taken(name) {
            return Err(FsError::NameTaken(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn add_entry(&mut self, link: Link) {
        if let Some(dir) = self.nodes.directory_mut(self.cwd.descriptor) {
            dir.entries.push(link);
        }
    }

    /// Offset within the last block where data of a `size` unit file ends.
    pub(crate) fn tail_offset(&self, size: usize) -> usize {
        match size % self.super_block.block_size {
            0 => self.super_block.block_size,
            rem => rem,
        }
    }

    /// Frees every block of a descriptor and drops it from the table.
    pub(crate) fn release(&mut self, id: DescriptorId) -> Result<(), FsError> {
        if let Some(node) = self.nodes.remove(id) {
            for &blocknr in node.blocks() {
                self.store.free(blocknr)?;
            }
            debug!("released descriptor {} and blocks {:?}", id, node.blocks());
        }
        Ok(())
    }

    fn claim_single_block(&mut self, name: &str) -> Result<(DescriptorId, BlockNumber), FsError> {
        self.ensure_name_free(name)?;
        if self.store.free_count() == 0 {
            return Err(FsError::OutOfSpace);
        }
        if self.nodes.is_full() {
            return Err(FsError::TooManyDescriptors);
        }
        let blocks = self.store.allocate(1, Fill::Zeroed, self.rng.as_mut())?;
        Ok((self.nodes.next_id(), blocks[0]))
    }
}
