//! File and directory operations built on top of the allocation and
//! write-back primitives in [`crate::superblock`] — the concrete actions a
//! VFS adapter needs (create, read, write, truncate, unlink, rmdir).
//!
//! Every operation here takes an already-resolved `ino` for its primary
//! subject, which the FUSE contract guarantees (a kernel never passes an
//! inode number to a handler without a prior successful `lookup`).

use crate::device::BlockDevice;
use crate::errno::{Error, Result};
use crate::record::FileType;
use crate::superblock::Filesystem;

/// Maximum number of data blocks a single file or directory may use.
const DATA_PER_FILE: u32 = 6;

/// The attributes a VFS adapter needs to answer `getattr`.
#[derive(Clone, Copy, Debug)]
pub struct Attrs {
    pub ino: u32,
    pub size: u32,
    pub link: u32,
    pub ftype: FileType,
}

impl<D: BlockDevice> Filesystem<D> {
    /// Attributes of an already-loaded inode.
    pub fn attrs(&self, ino: u32) -> Option<Attrs> {
        self.graph().inode(ino).map(|inode| Attrs {
            ino: inode.ino,
            size: inode.size,
            link: inode.link,
            ftype: inode.ftype,
        })
    }

    /// Resolves `path` and returns its attributes, or `None` if it doesn't
    /// exist. A convenience for callers working in terms of paths rather
    /// than inode numbers (tests, and any future path-based tooling).
    pub fn stat(&mut self, path: &str) -> Result<Option<Attrs>> {
        let result = self.lookup(path)?;
        if !result.found {
            return Ok(None);
        }
        let ino = self.graph().dentry(result.dentry).state.ino();
        Ok(self.attrs(ino))
    }

    /// Lists `ino`'s directory entries, in head-insertion order. Doesn't
    /// require entries to be resolved — a directory entry's name, target
    /// ino, and cached type are all stored in the dentry itself.
    pub fn readdir_entries(&self, ino: u32) -> Vec<(String, u32, FileType)> {
        self.graph()
            .children_of(ino)
            .into_iter()
            .map(|h| {
                let d = self.graph().dentry(h);
                (d.name.clone(), d.state.ino(), d.ftype)
            })
            .collect()
    }

    /// The ino of `ino`'s parent directory, via its owning dentry's
    /// `parent` link. `None` for the root, which has no parent.
    pub fn parent_ino(&self, ino: u32) -> Option<u32> {
        let owning_dentry = self.graph().inode(ino)?.dentry;
        let parent = self.graph().dentry(owning_dentry).parent?;
        Some(self.graph().dentry(parent).state.ino())
    }

    /// Resolves a single path component under `parent_ino`, loading the
    /// child's inode if this is the first time it's been reached.
    pub fn lookup_child(&mut self, parent_ino: u32, name: &str) -> Result<Option<u32>> {
        let Some(handle) = self.graph().find_child(parent_ino, name) else {
            return Ok(None);
        };
        self.ensure_resolved(handle)?;
        Ok(Some(self.graph().dentry(handle).state.ino()))
    }

    /// Creates a new file or directory named `name` under `parent_ino`.
    pub fn create_entry(&mut self, parent_ino: u32, name: &str, ftype: FileType) -> Result<u32> {
        if self.graph().inode(parent_ino).map(|i| i.ftype) != Some(FileType::Directory) {
            return Err(Error::NotADirectory);
        }
        if self.graph().find_child(parent_ino, name).is_some() {
            return Err(Error::AlreadyExists);
        }
        let dentry = self.graph_mut().new_dentry(name.to_string(), ftype, 0);
        let ino = match self.alloc_inode(dentry) {
            Ok(ino) => ino,
            Err(e) => {
                self.graph_mut().remove_dentry(dentry);
                return Err(e);
            }
        };
        if let Err(e) = self.alloc_dentry(parent_ino, dentry) {
            self.free_inode(ino);
            self.graph_mut().remove_dentry(dentry);
            return Err(e);
        }
        log::trace!("create_entry: parent={parent_ino} name={name} ino={ino}");
        Ok(ino)
    }

    /// Reads up to `size` bytes of `ino`'s payload starting at `offset`.
    pub fn read_file(&self, ino: u32, offset: u64, size: u32) -> Result<Vec<u8>> {
        let inode = self.graph().inode(ino).ok_or(Error::NotFound)?;
        if inode.ftype != FileType::Regular {
            return Err(Error::IsADirectory);
        }
        let payload = inode.payload.as_deref().unwrap_or(&[]);
        let start = (offset as usize).min(inode.size as usize);
        let end = (start + size as usize).min(inode.size as usize).min(payload.len());
        Ok(payload[start..end].to_vec())
    }

    /// Writes `data` into `ino`'s payload at `offset`, growing `size` and
    /// allocating any newly touched data blocks.
    pub fn write_file(&mut self, ino: u32, offset: u64, data: &[u8]) -> Result<u32> {
        let blk_size = self.blk_size();
        let max_size = DATA_PER_FILE * blk_size;
        let end = offset + data.len() as u64;
        if end > max_size as u64 {
            return Err(Error::NoSpace);
        }
        {
            let inode = self.graph().inode(ino).ok_or(Error::NotFound)?;
            if inode.ftype != FileType::Regular {
                return Err(Error::IsADirectory);
            }
        }

        let first_block = (offset / blk_size as u64) as usize;
        let last_block = ((end.saturating_sub(1)) / blk_size as u64) as usize;
        for slot in first_block..=last_block {
            let already = self.graph().inode(ino).unwrap().block_pointer[slot].is_some();
            if !already {
                let blk = self.alloc_data_block()?;
                self.graph_mut().inode_mut(ino).unwrap().block_pointer[slot] = Some(blk);
            }
        }

        let inode = self.graph_mut().inode_mut(ino).unwrap();
        let payload = inode.payload.get_or_insert_with(|| vec![0u8; max_size as usize]);
        payload[offset as usize..end as usize].copy_from_slice(data);
        inode.size = inode.size.max(end as u32);
        Ok(data.len() as u32)
    }

    /// Grows or shrinks `ino` to exactly `new_size` bytes.
    pub fn truncate_file(&mut self, ino: u32, new_size: u32) -> Result<()> {
        let blk_size = self.blk_size();
        if new_size > DATA_PER_FILE * blk_size {
            return Err(Error::NoSpace);
        }
        {
            let inode = self.graph().inode(ino).ok_or(Error::NotFound)?;
            if inode.ftype != FileType::Regular {
                return Err(Error::IsADirectory);
            }
        }
        if new_size > 0 {
            let last_block = ((new_size - 1) / blk_size) as usize;
            for slot in 0..=last_block {
                let already = self.graph().inode(ino).unwrap().block_pointer[slot].is_some();
                if !already {
                    let blk = self.alloc_data_block()?;
                    self.graph_mut().inode_mut(ino).unwrap().block_pointer[slot] = Some(blk);
                }
            }
        }
        let inode = self.graph_mut().inode_mut(ino).unwrap();
        let payload = inode
            .payload
            .get_or_insert_with(|| vec![0u8; (DATA_PER_FILE * blk_size) as usize]);
        if (new_size as usize) < (inode.size as usize) {
            payload[new_size as usize..inode.size as usize].fill(0);
        }
        inode.size = new_size;
        Ok(())
    }

    /// Removes the regular file named `name` under `parent_ino`.
    pub fn unlink_entry(&mut self, parent_ino: u32, name: &str) -> Result<()> {
        let Some(handle) = self.graph().find_child(parent_ino, name) else {
            return Err(Error::NotFound);
        };
        self.ensure_resolved(handle)?;
        let ino = self.graph().dentry(handle).state.ino();
        let ftype = self.graph().inode(ino).unwrap().ftype;
        if ftype != FileType::Regular {
            return Err(Error::IsADirectory);
        }
        self.free_inode(ino);
        self.graph_mut().unlink_child(parent_ino, handle);
        self.graph_mut().remove_dentry(handle);
        self.shrink_dir_count(parent_ino);
        log::trace!("unlink_entry: parent={parent_ino} name={name} ino={ino}");
        Ok(())
    }

    /// Removes the empty directory named `name` under `parent_ino`.
    pub fn rmdir_entry(&mut self, parent_ino: u32, name: &str) -> Result<()> {
        let Some(handle) = self.graph().find_child(parent_ino, name) else {
            return Err(Error::NotFound);
        };
        self.ensure_resolved(handle)?;
        let ino = self.graph().dentry(handle).state.ino();
        let inode = self.graph().inode(ino).unwrap();
        if inode.ftype != FileType::Directory {
            return Err(Error::NotADirectory);
        }
        if inode.dir_cnt != 0 {
            return Err(Error::NotEmpty);
        }
        self.free_inode(ino);
        self.graph_mut().unlink_child(parent_ino, handle);
        self.graph_mut().remove_dentry(handle);
        self.shrink_dir_count(parent_ino);
        log::trace!("rmdir_entry: parent={parent_ino} name={name} ino={ino}");
        Ok(())
    }

    fn shrink_dir_count(&mut self, parent_ino: u32) {
        let inode = self.graph_mut().inode_mut(parent_ino).unwrap();
        inode.dir_cnt = inode.dir_cnt.saturating_sub(1);
        inode.size = inode.dir_cnt * crate::record::DENTRY_RECORD_SIZE as u32;
    }
}
