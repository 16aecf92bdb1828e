//! Mount/unmount protocol, inode allocation, and write-back.
//!
//! `Filesystem<D>` is the single resource tree owned by a mount session: the
//! aligned device, both bitmaps, and the object graph, rooted at inode 0.
//! No global state: every operation takes this value explicitly instead of
//! reaching for a module-level singleton.

use crate::aligned_io::AlignedDevice;
use crate::bitmap::Bitmap;
use crate::device::BlockDevice;
use crate::errno::{Error, Result};
use crate::graph::{DentryHandle, DentryState, Graph, Inode};
use crate::record::{
    FileType, InodeRecord, SuperblockRecord, DENTRY_RECORD_SIZE, INODE_RECORD_SIZE, MAGIC,
    SUPERBLOCK_RECORD_SIZE,
};

/// Logical blocks reserved for the superblock record.
const SUPERBLOCK_BLKS: u32 = 1;
/// Logical blocks reserved for the inode bitmap.
const INO_MAP_BLKS: u32 = 1;
/// Logical blocks reserved for the data-block bitmap.
const DATA_MAP_BLKS: u32 = 1;
/// Logical blocks reserved for the inode table on a freshly initialized device.
const INO_TABLE_BLKS: u32 = 585;
/// Inode records packed per logical block, regardless of block size.
const INO_PER_BLK: u32 = 20;
/// Maximum number of data blocks a single file (or directory) may use.
const DATA_PER_FILE: u32 = 6;

/// A mounted filesystem session: device, geometry, bitmaps, and object graph.
pub struct Filesystem<D> {
    device: AlignedDevice<D>,
    blk_size: u32,
    blk_count: u32,
    ino_map_offset: u32,
    ino_map_blks: u32,
    data_map_offset: u32,
    data_map_blks: u32,
    ino_offset: u32,
    ino_blks: u32,
    data_offset: u32,
    data_blks: u32,
    ino_max: u32,
    size_used: u32,
    ino_bitmap: Bitmap,
    data_bitmap: Bitmap,
    graph: Graph,
    mounted: bool,
}

impl<D: BlockDevice> Filesystem<D> {
    /// Mounts the filesystem over `device`, initializing it on first mount.
    pub fn mount(device: D) -> Result<Self> {
        let mut aligned = AlignedDevice::new(device)?;
        let io_sz = aligned.io_size();
        let device_size = aligned.device_size()?;

        let sb_bytes: [u8; SUPERBLOCK_RECORD_SIZE] = aligned
            .read_at(0, SUPERBLOCK_RECORD_SIZE)?
            .try_into()
            .unwrap();
        let on_disk = SuperblockRecord::from_bytes(&sb_bytes);
        let is_init = on_disk.magic != MAGIC;

        let geometry = if is_init {
            let blk_size = (2 * io_sz) as u32;
            let blk_count = (device_size / blk_size as u64) as u32;
            let ino_map_offset = SUPERBLOCK_BLKS * blk_size;
            let data_map_offset = (SUPERBLOCK_BLKS + INO_MAP_BLKS) * blk_size;
            let ino_offset = (SUPERBLOCK_BLKS + INO_MAP_BLKS + DATA_MAP_BLKS) * blk_size;
            let data_offset =
                (SUPERBLOCK_BLKS + INO_MAP_BLKS + DATA_MAP_BLKS + INO_TABLE_BLKS) * blk_size;
            let reserved_blocks = SUPERBLOCK_BLKS + INO_MAP_BLKS + DATA_MAP_BLKS + INO_TABLE_BLKS;
            let data_blks = blk_count.saturating_sub(reserved_blocks);
            SuperblockRecord {
                magic: MAGIC,
                blk_size,
                blk_count,
                ino_map_offset,
                ino_map_blks: INO_MAP_BLKS,
                data_map_offset,
                data_map_blks: DATA_MAP_BLKS,
                ino_offset,
                ino_blks: INO_TABLE_BLKS,
                data_offset,
                data_blks,
                ino_max: INO_TABLE_BLKS * INO_PER_BLK,
                size_used: 0,
            }
        } else {
            on_disk
        };

        // Bitmaps are read unconditionally, whether this is a fresh or an
        // existing image: a freshly initialized device is expected to
        // arrive zero-filled.
        let ino_map_bytes = aligned.read_at(
            geometry.ino_map_offset as u64,
            (geometry.ino_map_blks * geometry.blk_size) as usize,
        )?;
        let data_map_bytes = aligned.read_at(
            geometry.data_map_offset as u64,
            (geometry.data_map_blks * geometry.blk_size) as usize,
        )?;

        let mut fs = Filesystem {
            device: aligned,
            blk_size: geometry.blk_size,
            blk_count: geometry.blk_count,
            ino_map_offset: geometry.ino_map_offset,
            ino_map_blks: geometry.ino_map_blks,
            data_map_offset: geometry.data_map_offset,
            data_map_blks: geometry.data_map_blks,
            ino_offset: geometry.ino_offset,
            ino_blks: geometry.ino_blks,
            data_offset: geometry.data_offset,
            data_blks: geometry.data_blks,
            ino_max: geometry.ino_max,
            size_used: geometry.size_used,
            ino_bitmap: Bitmap::new(ino_map_bytes, geometry.ino_max),
            data_bitmap: Bitmap::new(data_map_bytes, geometry.data_blks),
            graph: Graph::new(),
            mounted: false,
        };

        if is_init {
            let root = fs.graph.root();
            fs.alloc_inode(root)?;
            fs.sync_inode(0)?;
        }
        // Unconditionally (re)load inode 0 into the root dentry, establishing
        // the canonical live object for this session.
        let root = fs.graph.root();
        fs.load_inode(root, 0)?;
        fs.mounted = true;
        log::debug!(
            "mounted: blk_size={} blk_count={} ino_max={} data_blks={}",
            fs.blk_size,
            fs.blk_count,
            fs.ino_max,
            fs.data_blks
        );
        Ok(fs)
    }

    /// Flushes the live graph and bitmaps back to disk and releases the
    /// session, handing back the underlying device.
    pub fn unmount(mut self) -> Result<D> {
        if !self.mounted {
            return Ok(self.device.into_inner());
        }
        self.sync_inode(0)?;
        let rec = SuperblockRecord {
            magic: MAGIC,
            blk_size: self.blk_size,
            blk_count: self.blk_count,
            ino_map_offset: self.ino_map_offset,
            ino_map_blks: self.ino_map_blks,
            data_map_offset: self.data_map_offset,
            data_map_blks: self.data_map_blks,
            ino_offset: self.ino_offset,
            ino_blks: self.ino_blks,
            data_offset: self.data_offset,
            data_blks: self.data_blks,
            ino_max: self.ino_max,
            size_used: self.size_used,
        };
        self.device.write_at(0, &rec.to_bytes())?;
        self.device
            .write_at(self.ino_map_offset as u64, self.ino_bitmap.as_bytes())?;
        self.device
            .write_at(self.data_map_offset as u64, self.data_bitmap.as_bytes())?;
        self.mounted = false;
        log::debug!("unmounted");
        Ok(self.device.into_inner())
    }

    /// The filesystem's logical block size, `2 * io_size`.
    pub fn blk_size(&self) -> u32 {
        self.blk_size
    }

    pub(crate) fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    fn ino_offset_bytes(&self, ino: u32) -> u64 {
        self.ino_offset as u64
            + (ino / INO_PER_BLK) as u64 * self.blk_size as u64
            + INODE_RECORD_SIZE as u64 * (ino % INO_PER_BLK) as u64
    }

    fn data_offset_bytes(&self, blk: u32) -> u64 {
        self.data_offset as u64 + blk as u64 * self.blk_size as u64
    }

    /// Obtains a free inode index from the bitmap and links it to `dentry`.
    pub fn alloc_inode(&mut self, dentry: DentryHandle) -> Result<u32> {
        let ino = self.ino_bitmap.alloc().ok_or(Error::NoSpace)?;
        let ftype = self.graph.dentry(dentry).ftype;
        let payload = match ftype {
            FileType::Regular => Some(vec![0u8; DATA_PER_FILE as usize * self.blk_size as usize]),
            FileType::Directory => None,
        };
        let inode = Inode {
            ino,
            size: 0,
            link: 1,
            ftype,
            block_pointer: [None; 6],
            dir_cnt: 0,
            dentry,
            children: None,
            payload,
        };
        self.graph.insert_inode(inode);
        self.graph.dentry_mut(dentry).state = DentryState::Resolved(ino);
        log::trace!("alloc_inode: ino={ino} ftype={ftype:?}");
        Ok(ino)
    }

    /// Head-inserts `child` into `parent_ino`'s directory entries, growing
    /// its on-disk footprint and allocating data blocks as needed.
    pub fn alloc_dentry(&mut self, parent_ino: u32, child: DentryHandle) -> Result<()> {
        let (dir_cnt_before, size_before, parent_dentry) = {
            let inode = self
                .graph
                .inode(parent_ino)
                .expect("parent inode must be loaded");
            (inode.dir_cnt, inode.size, inode.dentry)
        };
        let record_size = DENTRY_RECORD_SIZE as u32;
        let size_after = size_before + record_size;
        if size_after > DATA_PER_FILE * self.blk_size {
            return Err(Error::NoSpace);
        }
        let new_block_slot = if dir_cnt_before == 0 {
            Some(0usize)
        } else if size_before % self.blk_size == 0 {
            Some((size_before / self.blk_size) as usize)
        } else {
            None
        };
        if let Some(slot) = new_block_slot {
            let blk = self.data_bitmap.alloc().ok_or(Error::NoSpace)?;
            self.graph.inode_mut(parent_ino).unwrap().block_pointer[slot] = Some(blk);
        }
        self.graph.link_child(parent_ino, parent_dentry, child);
        let inode = self.graph.inode_mut(parent_ino).unwrap();
        inode.dir_cnt = dir_cnt_before + 1;
        inode.size = size_after;
        Ok(())
    }

    /// Loads the on-disk inode `ino` into the graph and binds it to `dentry`.
    pub fn load_inode(&mut self, dentry: DentryHandle, ino: u32) -> Result<()> {
        let bytes: [u8; INODE_RECORD_SIZE] =
            self.device.read_at(self.ino_offset_bytes(ino), INODE_RECORD_SIZE)?
                .try_into()
                .unwrap();
        let rec = InodeRecord::from_bytes(&bytes);

        let mut inode = Inode {
            ino: rec.ino,
            size: rec.size,
            link: rec.link,
            ftype: rec.ftype,
            block_pointer: rec.block_pointer,
            dir_cnt: 0,
            dentry,
            children: None,
            payload: None,
        };

        match rec.ftype {
            FileType::Directory => {
                let mut loaded = Vec::new();
                if let Some(blk0) = rec.block_pointer[0] {
                    let base = self.data_offset_bytes(blk0);
                    for i in 0..rec.dir_cnt {
                        let off = base + i as u64 * DENTRY_RECORD_SIZE as u64;
                        let bytes: [u8; DENTRY_RECORD_SIZE] =
                            self.device.read_at(off, DENTRY_RECORD_SIZE)?.try_into().unwrap();
                        loaded.push(crate::record::DentryRecord::from_bytes(&bytes));
                    }
                }
                self.graph.insert_inode(inode);
                for d in loaded {
                    let child = self.graph.new_dentry(d.name, d.ftype, d.ino);
                    self.graph.link_child(ino, dentry, child);
                }
                self.graph.inode_mut(ino).unwrap().dir_cnt = rec.dir_cnt;
            }
            FileType::Regular => {
                let mut payload = vec![0u8; DATA_PER_FILE as usize * self.blk_size as usize];
                for (i, ptr) in rec.block_pointer.iter().enumerate() {
                    if let Some(blk) = ptr {
                        let off = self.data_offset_bytes(*blk);
                        let chunk = self.device.read_at(off, self.blk_size as usize)?;
                        let start = i * self.blk_size as usize;
                        payload[start..start + self.blk_size as usize].copy_from_slice(&chunk);
                    }
                }
                inode.payload = Some(payload);
                self.graph.insert_inode(inode);
            }
        }

        self.graph.dentry_mut(dentry).state = DentryState::Resolved(ino);
        self.graph.dentry_mut(dentry).ftype = rec.ftype;
        Ok(())
    }

    /// Obtains a single free data block index from the bitmap.
    pub fn alloc_data_block(&mut self) -> Result<u32> {
        self.data_bitmap.alloc().ok_or(Error::NoSpace)
    }

    /// Frees `ino`'s data blocks and its bitmap slot, and drops it from the graph.
    pub fn free_inode(&mut self, ino: u32) {
        if let Some(inode) = self.graph.remove_inode(ino) {
            for blk in inode.block_pointer.into_iter().flatten() {
                self.data_bitmap.free(blk);
            }
        }
        self.ino_bitmap.free(ino);
    }

    /// Recursively (via an explicit work stack, bounding recursion depth)
    /// writes `ino` and everything transitively reachable from it back to disk.
    pub fn sync_inode(&mut self, ino: u32) -> Result<()> {
        let mut stack = vec![ino];
        while let Some(ino) = stack.pop() {
            let rec = {
                let inode = self.graph.inode(ino).expect("inode must be loaded to sync");
                InodeRecord {
                    ino: inode.ino,
                    size: inode.size,
                    link: inode.link,
                    ftype: inode.ftype,
                    block_pointer: inode.block_pointer,
                    dir_cnt: inode.dir_cnt,
                }
            };
            self.device.write_at(self.ino_offset_bytes(ino), &rec.to_bytes())?;

            match rec.ftype {
                FileType::Directory => {
                    let Some(blk0) = rec.block_pointer[0] else {
                        continue;
                    };
                    let base = self.data_offset_bytes(blk0);
                    for (i, child) in self.graph.children_of(ino).into_iter().enumerate() {
                        let (name, child_ino, ftype, resolved) = {
                            let d = self.graph.dentry(child);
                            (
                                d.name.clone(),
                                d.state.ino(),
                                d.ftype,
                                d.state.is_resolved(),
                            )
                        };
                        let drec = crate::record::DentryRecord {
                            name,
                            ino: child_ino,
                            ftype,
                        };
                        let off = base + i as u64 * DENTRY_RECORD_SIZE as u64;
                        self.device.write_at(off, &drec.to_bytes())?;
                        if resolved {
                            stack.push(child_ino);
                        }
                    }
                }
                FileType::Regular => {
                    let payload = self.graph.inode(ino).unwrap().payload.clone();
                    let Some(payload) = payload else { continue };
                    for (i, ptr) in rec.block_pointer.iter().enumerate() {
                        let Some(blk) = ptr else { continue };
                        let start = i * self.blk_size as usize;
                        let end = start + self.blk_size as usize;
                        self.device
                            .write_at(self.data_offset_bytes(*blk), &payload[start..end])?;
                    }
                }
            }
        }
        Ok(())
    }
}
