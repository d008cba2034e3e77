use crate::fs::{FileSystem, FsError};
use crate::io::BlockStorage;
use crate::node::{Descriptor, FileType, Link};
use crate::path::{validate_name, Resolver};

impl<T: BlockStorage> FileSystem<T> {
    /// Adds `new_name` to the working directory as another hard link to the
    /// ordinary file at `existing`, which may live in any directory.
    pub fn link(&mut self, new_name: &str, existing: &str) -> Result<(), FsError> {
        validate_name(new_name)?;
        let (_, target) = Resolver::new(&self.nodes).entry(self.cwd.descriptor, existing, true)?;
        let id = target.descriptor;
        if self.nodes.get(id).and_then(Descriptor::as_ordinary).is_none() {
            return Err(FsError::NotAFile(existing.to_string()));
        }
        self.ensure_name_free(new_name)?;

        let links = match self.nodes.get_mut(id).and_then(Descriptor::as_ordinary_mut) {
            Some(file) => {
                file.names.push(new_name.to_string());
                file.links_number()
            }
            None => return Err(FsError::NotAFile(existing.to_string())),
        };
        self.add_entry(Link::new(new_name, id));
        info!("linked {} -> {} (descriptor {}, {} links)", new_name, existing, id, links);
        Ok(())
    }

    /// Removes the entry at `path`. An ordinary file loses one link and is
    /// freed along with its blocks once none are left; a symlink is freed
    /// right away.
    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let (parent, link) = Resolver::new(&self.nodes).entry(self.cwd.descriptor, path, false)?;
        let id = link.descriptor;
        match self.nodes.get(id).map(Descriptor::file_type) {
            Some(FileType::Ordinary) | Some(FileType::Symlink) => {}
            _ => return Err(FsError::NotAFile(path.to_string())),
        }

        if let Some(dir) = self.nodes.directory_mut(parent) {
            dir.entries.retain(|entry| entry.name != link.name);
        }
        let remaining = match self.nodes.get_mut(id).and_then(Descriptor::as_ordinary_mut) {
            Some(file) => {
                file.names.retain(|name| *name != link.name);
                file.links_number()
            }
            None => 0,
        };

        if remaining == 0 {
            self.release(id)?;
            info!("unlinked {}, descriptor {} freed", path, id);
        } else {
            info!("unlinked {}, descriptor {} keeps {} links", path, id, remaining);
        }
        Ok(())
    }
}
