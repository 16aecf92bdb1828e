//! The in-memory object graph: inodes and dentries linked by owner/child/
//! sibling relationships, rooted at a single root dentry.
//!
//! A C version of this graph would hold these links together with raw
//! pointers, including back-edges (inode → owning dentry, dentry → parent,
//! dentry → next sibling). This arena models the same shape with a stable
//! handle per dentry and a sparse map of inodes keyed by `ino` (the inode
//! bitmap index doubles as the inode's handle, so no separate indirection is
//! needed there).

use crate::record::FileType;
use std::collections::HashMap;

/// A stable handle into the dentry arena. Never reused once issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DentryHandle(u32);

/// Whether a dentry's target inode has been loaded from disk yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DentryState {
    /// The ino is known but the inode record hasn't been read yet.
    Unresolved(u32),
    /// The inode is live in the `inodes` map under this ino.
    Resolved(u32),
}

impl DentryState {
    pub fn ino(&self) -> u32 {
        match self {
            DentryState::Unresolved(ino) => *ino,
            DentryState::Resolved(ino) => *ino,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, DentryState::Resolved(_))
    }
}

/// A named reference to an inode, plus the tree-structure pointers.
pub struct Dentry {
    pub name: String,
    /// Cached from the target inode, so `readdir` needn't load it.
    pub ftype: FileType,
    pub state: DentryState,
    pub parent: Option<DentryHandle>,
    pub next_sibling: Option<DentryHandle>,
}

/// An in-memory inode: the on-disk fields plus the graph's back-pointers
/// and, for a regular file, the loaded payload buffer.
pub struct Inode {
    pub ino: u32,
    pub size: u32,
    pub link: u32,
    pub ftype: FileType,
    pub block_pointer: [Option<u32>; 6],
    pub dir_cnt: u32,
    /// The dentry that names this inode in the tree.
    pub dentry: DentryHandle,
    /// Head of the child dentry list (directories only); head-insertion order.
    pub children: Option<DentryHandle>,
    /// `6 * blk_size` bytes, allocated eagerly once the inode is created or loaded.
    pub payload: Option<Vec<u8>>,
}

/// The dentry/inode arena plus the root handle.
pub struct Graph {
    dentries: Vec<Option<Dentry>>,
    inodes: HashMap<u32, Inode>,
    root: DentryHandle,
}

impl Graph {
    /// Builds a fresh graph with a single, unresolved root dentry naming inode 0.
    pub fn new() -> Self {
        let root_dentry = Dentry {
            name: "/".to_string(),
            ftype: FileType::Directory,
            state: DentryState::Unresolved(0),
            parent: None,
            next_sibling: None,
        };
        Self {
            dentries: vec![Some(root_dentry)],
            inodes: HashMap::new(),
            root: DentryHandle(0),
        }
    }

    pub fn root(&self) -> DentryHandle {
        self.root
    }

    pub fn dentry(&self, handle: DentryHandle) -> &Dentry {
        self.dentries[handle.0 as usize]
            .as_ref()
            .expect("dangling dentry handle")
    }

    pub fn dentry_mut(&mut self, handle: DentryHandle) -> &mut Dentry {
        self.dentries[handle.0 as usize]
            .as_mut()
            .expect("dangling dentry handle")
    }

    pub fn inode(&self, ino: u32) -> Option<&Inode> {
        self.inodes.get(&ino)
    }

    pub fn inode_mut(&mut self, ino: u32) -> Option<&mut Inode> {
        self.inodes.get_mut(&ino)
    }

    /// Inserts a just-allocated or just-loaded inode into the arena.
    pub fn insert_inode(&mut self, inode: Inode) {
        self.inodes.insert(inode.ino, inode);
    }

    /// Removes an inode (unlink/rmdir), returning it so the caller can
    /// free any data blocks it still owns.
    pub fn remove_inode(&mut self, ino: u32) -> Option<Inode> {
        self.inodes.remove(&ino)
    }

    /// Tombstones a dentry that no longer names anything reachable.
    pub fn remove_dentry(&mut self, handle: DentryHandle) {
        self.dentries[handle.0 as usize] = None;
    }

    /// Allocates a new, parentless dentry and returns its handle.
    pub fn new_dentry(&mut self, name: String, ftype: FileType, ino: u32) -> DentryHandle {
        let handle = DentryHandle(self.dentries.len() as u32);
        self.dentries.push(Some(Dentry {
            name,
            ftype,
            state: DentryState::Unresolved(ino),
            parent: None,
            next_sibling: None,
        }));
        handle
    }

    /// Head-inserts `child` into `parent_ino`'s child list, setting the
    /// child's `parent` pointer. Does not touch block pointers, `dir_cnt`,
    /// or `size` — those are the caller's concern (see `Superblock::alloc_dentry`).
    pub fn link_child(&mut self, parent_ino: u32, parent_dentry: DentryHandle, child: DentryHandle) {
        let old_head = self.inode(parent_ino).and_then(|i| i.children);
        self.dentry_mut(child).parent = Some(parent_dentry);
        self.dentry_mut(child).next_sibling = old_head;
        self.inode_mut(parent_ino).expect("parent inode must be loaded").children = Some(child);
    }

    /// Removes `child` from `parent_ino`'s sibling chain. Returns `true` if found.
    pub fn unlink_child(&mut self, parent_ino: u32, child: DentryHandle) -> bool {
        let Some(inode) = self.inode(parent_ino) else {
            return false;
        };
        let mut cursor = inode.children;
        let mut prev: Option<DentryHandle> = None;
        while let Some(cur) = cursor {
            let next = self.dentry(cur).next_sibling;
            if cur == child {
                match prev {
                    Some(p) => self.dentry_mut(p).next_sibling = next,
                    None => self.inode_mut(parent_ino).unwrap().children = next,
                }
                return true;
            }
            prev = Some(cur);
            cursor = next;
        }
        false
    }

    /// Collects the child dentry handles of `ino`, in head-insertion (most
    /// recent first) order.
    pub fn children_of(&self, ino: u32) -> Vec<DentryHandle> {
        let mut out = Vec::new();
        let Some(inode) = self.inode(ino) else {
            return out;
        };
        let mut cursor = inode.children;
        while let Some(cur) = cursor {
            out.push(cur);
            cursor = self.dentry(cur).next_sibling;
        }
        out
    }

    /// Finds a child of `ino` whose name matches `component`: a prefix match
    /// over `component`'s length, not a full equality check. Ties resolve to
    /// the first hit in sibling order.
    pub fn find_child(&self, ino: u32, component: &str) -> Option<DentryHandle> {
        for handle in self.children_of(ino) {
            let name = &self.dentry(handle).name;
            if name.as_bytes().get(..component.len()) == Some(component.as_bytes()) {
                return Some(handle);
            }
        }
        None
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
