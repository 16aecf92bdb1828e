//! Path resolution: walks a `/`-separated path one component at a time,
//! lazily resolving dentries as it goes.

use crate::device::BlockDevice;
use crate::errno::Result;
use crate::graph::{DentryHandle, DentryState};
use crate::record::FileType;
use crate::superblock::Filesystem;

/// The outcome of resolving a path against the live tree.
pub struct LookupResult {
    /// The dentry reached: the target itself on a hit, or the last
    /// directory successfully traversed on a miss.
    pub dentry: DentryHandle,
    /// Whether the full path was found.
    pub found: bool,
    /// Whether `dentry` is the root.
    pub is_root: bool,
}

impl<D: BlockDevice> Filesystem<D> {
    /// Resolves `path` against the tree, loading any unresolved dentry it
    /// passes through along the way.
    pub fn lookup(&mut self, path: &str) -> Result<LookupResult> {
        let root = self.graph().root();
        self.ensure_resolved(root)?;

        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if components.is_empty() {
            return Ok(LookupResult {
                dentry: root,
                found: true,
                is_root: true,
            });
        }

        let mut cursor = root;
        let mut found = false;
        let total = components.len();
        for (level, component) in components.iter().enumerate() {
            self.ensure_resolved(cursor)?;
            let cursor_ino = self.graph().dentry(cursor).state.ino();
            let cursor_ftype = self.graph().inode(cursor_ino).expect("resolved").ftype;
            if cursor_ftype == FileType::Regular {
                // cursor is a file; there's nothing to descend into for
                // this (or any further) component.
                found = false;
                break;
            }
            match self.graph().find_child(cursor_ino, component) {
                Some(child) => {
                    cursor = child;
                    found = level + 1 == total;
                }
                None => {
                    found = false;
                    break;
                }
            }
        }

        self.ensure_resolved(cursor)?;
        // Matches the original: `is_root` is set only for the zero-component
        // (empty path / "/") case handled above, never by final cursor
        // identity — a miss or a hit partway down the tree that happens to
        // land back on the root dentry is still not "the root path".
        Ok(LookupResult {
            dentry: cursor,
            found,
            is_root: false,
        })
    }

    /// Loads `handle`'s inode from disk if it hasn't been already.
    pub(crate) fn ensure_resolved(&mut self, handle: DentryHandle) -> Result<()> {
        let state = self.graph().dentry(handle).state;
        if let DentryState::Unresolved(ino) = state {
            self.load_inode(handle, ino)?;
        }
        Ok(())
    }
}
