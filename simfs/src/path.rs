//! Path resolution.
//!
//! Paths are slash separated. A leading `/` starts at the root directory,
//! anything else starts at the directory the caller passes in (normally the
//! working directory). `.` stays put, `..` moves to the parent (root is its own
//! parent) and symlinks met along the way are spliced into the remaining path.

use std::collections::VecDeque;

use crate::fs::FsError;
use crate::node::{DescriptorId, DescriptorKind, DescriptorTable, Link, ROOT_ID};

/// Upper bound on symlinks followed while resolving a single path.
pub const MAX_SYMLINK_HOPS: usize = 16;

/// Splits a path into its parent part and final component, ignoring trailing
/// slashes. `"/"` names the root itself.
pub fn split_last(path: &str) -> Result<(&str, &str), FsError> {
    if path.is_empty() {
        return Err(FsError::InvalidArgument("empty path".to_string()));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(("/", "."));
    }
    match trimmed.rfind('/') {
        Some(0) => Ok(("/", &trimmed[1..])),
        Some(pos) => Ok((&trimmed[..pos], &trimmed[pos + 1..])),
        None => Ok(("", trimmed)),
    }
}

/// Rejects names that cannot be stored as a single directory entry.
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FsError::InvalidArgument(format!(
            "\"{}\" is not a valid file name",
            name
        )));
    }
    Ok(())
}

fn segments(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Walks paths over a descriptor table without touching the working
/// directory. Symlink hops are counted across the whole resolution.
pub struct Resolver<'a> {
    table: &'a DescriptorTable,
    hops: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a DescriptorTable) -> Self {
        Self { table, hops: 0 }
    }

    /// Resolves `path` to a directory, starting from `start` unless the path
    /// is absolute.
    pub fn directory(&mut self, start: DescriptorId, path: &str) -> Result<DescriptorId, FsError> {
        let table = self.table;
        let mut cursor = if path.starts_with('/') { ROOT_ID } else { start };
        let mut pending: VecDeque<String> = segments(path).collect();

        while let Some(segment) = pending.pop_front() {
            let dir = table
                .directory(cursor)
                .ok_or_else(|| FsError::NotFound(segment.clone()))?;
            match segment.as_str() {
                "." => {}
                ".." => cursor = dir.parent.descriptor,
                name => {
                    let entry = dir
                        .entry(name)
                        .ok_or_else(|| FsError::NotFound(name.to_string()))?;
                    match table.get(entry.descriptor).map(|node| node.kind()) {
                        Some(DescriptorKind::Directory(_)) => cursor = entry.descriptor,
                        Some(DescriptorKind::Symlink(link)) => {
                            self.hop(name)?;
                            debug!("following symlink {} -> {}", name, link.value);
                            if link.value.starts_with('/') {
                                cursor = ROOT_ID;
                            }
                            for (i, spliced) in segments(&link.value).enumerate() {
                                pending.insert(i, spliced);
                            }
                        }
                        _ => return Err(FsError::NotFound(name.to_string())),
                    }
                }
            }
        }

        Ok(cursor)
    }

    /// Resolves `path` to the directory holding its final component and the
    /// entry naming it. With `follow` set, a final component that is a symlink
    /// is replaced by whatever its target resolves to.
    ///
    /// `.` and `..` as final components resolve to the directory they name,
    /// the returned link then carries that component as its name.
    pub fn entry(
        &mut self,
        start: DescriptorId,
        path: &str,
        follow: bool,
    ) -> Result<(DescriptorId, Link), FsError> {
        let table = self.table;
        let (parent_path, name) = split_last(path)?;
        let parent = self.directory(start, parent_path)?;

        if name == "." || name == ".." {
            let target = self.directory(parent, name)?;
            return Ok((parent, Link::new(name, target)));
        }

        let link = table
            .directory(parent)
            .and_then(|dir| dir.entry(name))
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        if follow {
            if let Some(symlink) = table.get(link.descriptor).and_then(|n| n.as_symlink()) {
                self.hop(path)?;
                debug!("following symlink {} -> {}", path, symlink.value);
                return self.entry(parent, &symlink.value, true);
            }
        }
        Ok((parent, link))
    }

    fn hop(&mut self, at: &str) -> Result<(), FsError> {
        self.hops += 1;
        if self.hops > MAX_SYMLINK_HOPS {
            return Err(FsError::SymlinkLoop(at.to_string()));
        }
        Ok(())
    }
}
