//! Fixed-layout on-disk records: superblock, inode, directory entry.
//!
//! Each record type encodes/decodes through an explicit fixed-size byte
//! buffer rather than a raw `#[repr(C, packed)]` transmute, since the
//! inode and dentry records pack fields at byte offsets that don't match
//! their natural Rust alignment (the name field of a dentry record isn't a
//! multiple of 4 bytes, which would make `ino` unaligned under a direct
//! struct transmute). `to_le_bytes`/`from_le_bytes` keeps the layout
//! exact and portable.

/// Filesystem format magic, written to the superblock on first mount.
pub const MAGIC: u32 = 880818;

/// Maximum length of a dentry name, trailing-zero-padded.
pub const MAX_NAME_LEN: usize = 128;

/// Size in bytes of an on-disk inode record (§3: fixed 50-byte slot).
pub const INODE_RECORD_SIZE: usize = 50;

/// Size in bytes of an on-disk dentry record: name + ino + ftype.
pub const DENTRY_RECORD_SIZE: usize = MAX_NAME_LEN + 4 + 1;

/// A file's type, as stored in both inode and dentry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Regular = 0,
    Directory = 1,
}

impl FileType {
    fn from_byte(b: u8) -> Self {
        match b {
            1 => FileType::Directory,
            _ => FileType::Regular,
        }
    }
}

/// The on-disk superblock record, read from and written to offset 0.
#[derive(Clone, Copy, Debug)]
pub struct SuperblockRecord {
    pub magic: u32,
    pub blk_size: u32,
    pub blk_count: u32,
    pub ino_map_offset: u32,
    pub ino_map_blks: u32,
    pub data_map_offset: u32,
    pub data_map_blks: u32,
    pub ino_offset: u32,
    pub ino_blks: u32,
    pub data_offset: u32,
    pub data_blks: u32,
    pub ino_max: u32,
    pub size_used: u32,
}

/// Size in bytes of an on-disk superblock record.
pub const SUPERBLOCK_RECORD_SIZE: usize = 4 * 13;

impl SuperblockRecord {
    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_RECORD_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_RECORD_SIZE];
        let fields = [
            self.magic,
            self.blk_size,
            self.blk_count,
            self.ino_map_offset,
            self.ino_map_blks,
            self.data_map_offset,
            self.data_map_blks,
            self.ino_offset,
            self.ino_blks,
            self.data_offset,
            self.data_blks,
            self.ino_max,
            self.size_used,
        ];
        for (i, field) in fields.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8; SUPERBLOCK_RECORD_SIZE]) -> Self {
        let read = |i: usize| u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
        Self {
            magic: read(0),
            blk_size: read(1),
            blk_count: read(2),
            ino_map_offset: read(3),
            ino_map_blks: read(4),
            data_map_offset: read(5),
            data_map_blks: read(6),
            ino_offset: read(7),
            ino_blks: read(8),
            data_offset: read(9),
            data_blks: read(10),
            ino_max: read(11),
            size_used: read(12),
        }
    }
}

/// The on-disk inode record: exactly [`INODE_RECORD_SIZE`] bytes.
///
/// Layout: `ino`(4) `size`(4) `link`(4) `ftype`(1) `block_pointer[6]`(24)
/// `dir_cnt`(4) = 41 bytes of payload, padded to the fixed 50-byte slot.
#[derive(Clone, Copy, Debug)]
pub struct InodeRecord {
    pub ino: u32,
    pub size: u32,
    pub link: u32,
    pub ftype: FileType,
    /// An unset slot is `None` (on-disk sentinel: `-1` as `i32`).
    pub block_pointer: [Option<u32>; 6],
    pub dir_cnt: u32,
}

impl InodeRecord {
    pub fn to_bytes(&self) -> [u8; INODE_RECORD_SIZE] {
        let mut buf = [0u8; INODE_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.ino.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.link.to_le_bytes());
        buf[12] = self.ftype as u8;
        for (i, ptr) in self.block_pointer.iter().enumerate() {
            let raw: i32 = ptr.map(|v| v as i32).unwrap_or(-1);
            let off = 13 + i * 4;
            buf[off..off + 4].copy_from_slice(&raw.to_le_bytes());
        }
        buf[37..41].copy_from_slice(&self.dir_cnt.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; INODE_RECORD_SIZE]) -> Self {
        let ino = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let link = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let ftype = FileType::from_byte(buf[12]);
        let mut block_pointer = [None; 6];
        for (i, slot) in block_pointer.iter_mut().enumerate() {
            let off = 13 + i * 4;
            let raw = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            *slot = if raw < 0 { None } else { Some(raw as u32) };
        }
        let dir_cnt = u32::from_le_bytes(buf[37..41].try_into().unwrap());
        Self {
            ino,
            size,
            link,
            ftype,
            block_pointer,
            dir_cnt,
        }
    }
}

/// The on-disk directory-entry record: name, target inode, cached type.
#[derive(Clone, Debug)]
pub struct DentryRecord {
    pub name: String,
    pub ino: u32,
    pub ftype: FileType,
}

impl DentryRecord {
    pub fn to_bytes(&self) -> [u8; DENTRY_RECORD_SIZE] {
        let mut buf = [0u8; DENTRY_RECORD_SIZE];
        let name_bytes = self.name.as_bytes();
        let len = name_bytes.len().min(MAX_NAME_LEN);
        buf[0..len].copy_from_slice(&name_bytes[0..len]);
        buf[MAX_NAME_LEN..MAX_NAME_LEN + 4].copy_from_slice(&self.ino.to_le_bytes());
        buf[MAX_NAME_LEN + 4] = self.ftype as u8;
        buf
    }

    pub fn from_bytes(buf: &[u8; DENTRY_RECORD_SIZE]) -> Self {
        let nul = buf[0..MAX_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);
        let name = String::from_utf8_lossy(&buf[0..nul]).into_owned();
        let ino = u32::from_le_bytes(
            buf[MAX_NAME_LEN..MAX_NAME_LEN + 4]
                .try_into()
                .unwrap(),
        );
        let ftype = FileType::from_byte(buf[MAX_NAME_LEN + 4]);
        Self { name, ino, ftype }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inode_round_trip() {
        let rec = InodeRecord {
            ino: 3,
            size: 128,
            link: 1,
            ftype: FileType::Regular,
            block_pointer: [Some(10), None, Some(12), None, None, None],
            dir_cnt: 0,
        };
        let bytes = rec.to_bytes();
        let back = InodeRecord::from_bytes(&bytes);
        assert_eq!(back.ino, 3);
        assert_eq!(back.size, 128);
        assert_eq!(back.link, 1);
        assert_eq!(back.ftype, FileType::Regular);
        assert_eq!(back.block_pointer, [Some(10), None, Some(12), None, None, None]);
        assert_eq!(back.dir_cnt, 0);
    }

    #[test]
    fn dentry_round_trip() {
        let rec = DentryRecord {
            name: "hello.txt".to_string(),
            ino: 7,
            ftype: FileType::Regular,
        };
        let back = DentryRecord::from_bytes(&rec.to_bytes());
        assert_eq!(back.name, "hello.txt");
        assert_eq!(back.ino, 7);
        assert_eq!(back.ftype, FileType::Regular);
    }

    #[test]
    fn superblock_round_trip() {
        let rec = SuperblockRecord {
            magic: MAGIC,
            blk_size: 1024,
            blk_count: 4096,
            ino_map_offset: 1024,
            ino_map_blks: 1,
            data_map_offset: 2048,
            data_map_blks: 1,
            ino_offset: 3072,
            ino_blks: 585,
            data_offset: 602112,
            data_blks: 3508,
            ino_max: 11700,
            size_used: 0,
        };
        let back = SuperblockRecord::from_bytes(&rec.to_bytes());
        assert_eq!(back.magic, MAGIC);
        assert_eq!(back.blk_count, 4096);
        assert_eq!(back.ino_max, 11700);
    }
}
