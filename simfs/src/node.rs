use std::collections::BTreeMap;

use crate::io::BlockNumber;

pub type DescriptorId = u32;
/// Handle handed out by `open`.
pub type Fd = u32;

pub const ROOT_ID: DescriptorId = 0;
pub const ROOT_NAME: &str = "root";

/// A `{name, descriptor}` pair: a directory entry, or a pointer to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub descriptor: DescriptorId,
}

impl Link {
    pub fn new(name: impl Into<String>, descriptor: DescriptorId) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Ordinary,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinaryFile {
    /// Every hard link name bound to this file. The link count is its length.
    pub names: Vec<String>,
    pub fd: Option<Fd>,
}

impl OrdinaryFile {
    pub fn links_number(&self) -> usize {
        self.names.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub name: String,
    /// Children in insertion order.
    pub entries: Vec<Link>,
    pub current: Link,
    /// Root is its own parent.
    pub parent: Link,
}

impl Directory {
    pub fn entry(&self, name: &str) -> Option<&Link> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    pub name: String,
    /// Target path, stored verbatim and resolved on use.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorKind {
    Ordinary(OrdinaryFile),
    Directory(Directory),
    Symlink(Symlink),
}

/// Metadata record for one stored entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    id: DescriptorId,
    size: usize,
    blocks: Vec<BlockNumber>,
    kind: DescriptorKind,
}

impl Descriptor {
    pub fn new(id: DescriptorId, size: usize, blocks: Vec<BlockNumber>, kind: DescriptorKind) -> Self {
        Self {
            id,
            size,
            blocks,
            kind,
        }
    }

    pub fn id(&self) -> DescriptorId {
        self.id
    }

    /// Size in units.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Block map: indices of the blocks holding this descriptor's data, in order.
    pub fn blocks(&self) -> &[BlockNumber] {
        &self.blocks
    }

    pub fn kind(&self) -> &DescriptorKind {
        &self.kind
    }

    pub fn file_type(&self) -> FileType {
        match self.kind {
            DescriptorKind::Ordinary(_) => FileType::Ordinary,
            DescriptorKind::Directory(_) => FileType::Directory,
            DescriptorKind::Symlink(_) => FileType::Symlink,
        }
    }

    pub fn as_ordinary(&self) -> Option<&OrdinaryFile> {
        match &self.kind {
            DescriptorKind::Ordinary(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match &self.kind {
            DescriptorKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_symlink(&self) -> Option<&Symlink> {
        match &self.kind {
            DescriptorKind::Symlink(link) => Some(link),
            _ => None,
        }
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<BlockNumber> {
        &mut self.blocks
    }

    pub(crate) fn as_ordinary_mut(&mut self) -> Option<&mut OrdinaryFile> {
        match &mut self.kind {
            DescriptorKind::Ordinary(file) => Some(file),
            _ => None,
        }
    }

    pub(crate) fn as_directory_mut(&mut self) -> Option<&mut Directory> {
        match &mut self.kind {
            DescriptorKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }
}

/// Flat table of every live descriptor keyed by id. Directory links refer to
/// each other through ids only.
pub struct DescriptorTable {
    nodes: BTreeMap<DescriptorId, Descriptor>,
    next_id: DescriptorId,
    capacity: usize,
}

impl DescriptorTable {
    /// Creates the table holding only the root directory, which owns `root_block`.
    pub fn new(capacity: usize, root_block: BlockNumber, root_size: usize) -> Self {
        let root = Descriptor::new(
            ROOT_ID,
            root_size,
            vec![root_block],
            DescriptorKind::Directory(Directory {
                name: ROOT_NAME.to_string(),
                entries: Vec::new(),
                current: Link::new(ROOT_NAME, ROOT_ID),
                parent: Link::new(ROOT_NAME, ROOT_ID),
            }),
        );
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_ID, root);

        Self {
            nodes,
            next_id: ROOT_ID + 1,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() >= self.capacity
    }

    /// Hands out the next id. Ids are never reused.
    pub fn next_id(&mut self) -> DescriptorId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, node: Descriptor) {
        debug_assert!(!self.is_full());
        self.nodes.insert(node.id(), node);
    }

    pub fn remove(&mut self, id: DescriptorId) -> Option<Descriptor> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: DescriptorId) -> Option<&Descriptor> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: DescriptorId) -> Option<&mut Descriptor> {
        self.nodes.get_mut(&id)
    }

    pub fn directory(&self, id: DescriptorId) -> Option<&Directory> {
        self.get(id).and_then(Descriptor::as_directory)
    }

    pub fn directory_mut(&mut self, id: DescriptorId) -> Option<&mut Directory> {
        self.get_mut(id).and_then(Descriptor::as_directory_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.nodes.values()
    }

    /// Whether any ordinary file carries `name` among its hard link names,
    /// in any directory.
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.iter()
            .filter_map(Descriptor::as_ordinary)
            .any(|file| file.names.iter().any(|n| n == name))
    }

    /// The ordinary file currently opened as `fd`.
    pub fn fd_holder(&self, fd: Fd) -> Option<DescriptorId> {
        self.iter()
            .find(|node| node.as_ordinary().map_or(false, |file| file.fd == Some(fd)))
            .map(Descriptor::id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinary(id: DescriptorId, name: &str) -> Descriptor {
        Descriptor::new(
            id,
            3,
            vec![1],
            DescriptorKind::Ordinary(OrdinaryFile {
                names: vec![name.to_string()],
                fd: None,
            }),
        )
    }

    #[test]
    fn new_table_holds_root_as_own_parent() {
        let table = DescriptorTable::new(4, 0, 4);
        let root = table.directory(ROOT_ID).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(root.parent.descriptor, ROOT_ID);
        assert_eq!(root.current.descriptor, ROOT_ID);
        assert!(root.is_empty());
    }

    #[test]
    fn ids_increase_monotonically() {
        let mut table = DescriptorTable::new(4, 0, 4);
        let a = table.next_id();
        let b = table.next_id();
        assert_eq!((a, b), (1, 2));

        table.insert(ordinary(a, "a"));
        table.remove(a);
        assert_eq!(table.next_id(), 3);
    }

    #[test]
    fn capacity_counts_root() {
        let mut table = DescriptorTable::new(2, 0, 4);
        assert!(!table.is_full());
        let id = table.next_id();
        table.insert(ordinary(id, "a"));
        assert!(table.is_full());
    }

    #[test]
    fn names_are_looked_up_across_files() {
        let mut table = DescriptorTable::new(4, 0, 4);
        let id = table.next_id();
        table.insert(ordinary(id, "a"));

        assert!(table.is_name_taken("a"));
        assert!(!table.is_name_taken("b"));
        // Directory names are not hard link names.
        assert!(!table.is_name_taken(ROOT_NAME));
    }

    #[test]
    fn fd_holder_finds_open_file() {
        let mut table = DescriptorTable::new(4, 0, 4);
        let id = table.next_id();
        table.insert(ordinary(id, "a"));
        table.get_mut(id).and_then(Descriptor::as_ordinary_mut).unwrap().fd = Some(42);

        assert_eq!(table.fd_holder(42), Some(id));
        assert_eq!(table.fd_holder(43), None);
    }

    #[test]
    fn descriptor_reports_its_type() {
        let node = ordinary(1, "a");
        assert_eq!(node.file_type(), FileType::Ordinary);
        assert_eq!(node.as_ordinary().unwrap().links_number(), 1);
        assert!(node.as_directory().is_none());
    }
}
