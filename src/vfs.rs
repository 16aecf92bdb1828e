//! Thin `fuser::Filesystem` adapter over `newfs::Filesystem`.
//!
//! FUSE reserves inode `0` and fixes the root at `1`; this filesystem's own
//! inodes are zero-based with the root at `0`, so every inode number
//! crossing the boundary is shifted by one (`fuse_ino = ino + 1`).

use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType as FuseFileType, Filesystem as FuseFilesystem, ReplyAttr, ReplyCreate,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyWrite, Request, TimeOrNow,
};
use libc::ENOENT;

use newfs::device::BlockDevice;
use newfs::ops::Attrs;
use newfs::record::FileType;
use newfs::Filesystem as CoreFilesystem;

/// How long the kernel may cache attribute/entry replies before re-asking.
const ATTR_TTL: Duration = Duration::from_secs(1);

fn to_fuse_ino(ino: u32) -> u64 {
    ino as u64 + 1
}

fn to_core_ino(fuse_ino: u64) -> u32 {
    (fuse_ino - 1) as u32
}

fn to_fuse_attr(attrs: Attrs) -> FileAttr {
    let kind = match attrs.ftype {
        FileType::Regular => FuseFileType::RegularFile,
        FileType::Directory => FuseFileType::Directory,
    };
    let perm = match attrs.ftype {
        FileType::Regular => 0o644,
        FileType::Directory => 0o755,
    };
    let now = SystemTime::now();
    FileAttr {
        ino: to_fuse_ino(attrs.ino),
        size: attrs.size as u64,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind,
        perm,
        nlink: attrs.link,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn to_fuse_kind(ftype: FileType) -> FuseFileType {
    match ftype {
        FileType::Regular => FuseFileType::RegularFile,
        FileType::Directory => FuseFileType::Directory,
    }
}

/// Adapts a mounted core [`CoreFilesystem`] to `fuser`'s callback surface.
///
/// Holds the mount as `Option` so `destroy` can take ownership and call
/// [`CoreFilesystem::unmount`], which `fuser::Filesystem::destroy` can't do
/// through `&mut self` alone.
pub struct Vfs<D> {
    fs: Option<CoreFilesystem<D>>,
}

impl<D: BlockDevice> Vfs<D> {
    pub fn new(fs: CoreFilesystem<D>) -> Self {
        Self { fs: Some(fs) }
    }

    fn fs(&mut self) -> &mut CoreFilesystem<D> {
        self.fs.as_mut().expect("filesystem used after destroy")
    }
}

impl<D: BlockDevice> FuseFilesystem for Vfs<D> {
    fn destroy(&mut self) {
        if let Some(fs) = self.fs.take() {
            if let Err(e) = fs.unmount() {
                log::error!("unmount failed: {e}");
            }
        }
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let parent_ino = to_core_ino(parent);
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        match self.fs().lookup_child(parent_ino, name) {
            Ok(Some(ino)) => match self.fs().attrs(ino) {
                Some(attrs) => reply.entry(&ATTR_TTL, &to_fuse_attr(attrs), 0),
                None => reply.error(ENOENT),
            },
            Ok(None) => reply.error(ENOENT),
            Err(e) => reply.error(e.to_positive_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.fs().attrs(to_core_ino(ino)) {
            Some(attrs) => reply.attr(&ATTR_TTL, &to_fuse_attr(attrs)),
            None => reply.error(ENOENT),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let core_ino = to_core_ino(ino);
        if let Some(size) = size {
            if let Err(e) = self.fs().truncate_file(core_ino, size as u32) {
                reply.error(e.to_positive_errno());
                return;
            }
        }
        match self.fs().attrs(core_ino) {
            Some(attrs) => reply.attr(&ATTR_TTL, &to_fuse_attr(attrs)),
            None => reply.error(ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let core_ino = to_core_ino(ino);
        // The root has no parent; ".." loops back to itself there, as on any
        // real filesystem.
        let parent_ino = self.fs().parent_ino(core_ino).unwrap_or(core_ino);
        let mut entries = vec![
            (core_ino, FuseFileType::Directory, ".".to_string()),
            (parent_ino, FuseFileType::Directory, "..".to_string()),
        ];
        for (name, child_ino, ftype) in self.fs().readdir_entries(core_ino) {
            entries.push((child_ino, to_fuse_kind(ftype), name));
        }
        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(to_fuse_ino(ino), (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.fs().read_file(to_core_ino(ino), offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_positive_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.fs().write_file(to_core_ino(ino), offset as u64, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.to_positive_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        match self
            .fs()
            .create_entry(to_core_ino(parent), name, FileType::Directory)
        {
            Ok(ino) => match self.fs().attrs(ino) {
                Some(attrs) => reply.entry(&ATTR_TTL, &to_fuse_attr(attrs), 0),
                None => reply.error(ENOENT),
            },
            Err(e) => reply.error(e.to_positive_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        match self
            .fs()
            .create_entry(to_core_ino(parent), name, FileType::Regular)
        {
            Ok(ino) => match self.fs().attrs(ino) {
                Some(attrs) => reply.created(&ATTR_TTL, &to_fuse_attr(attrs), 0, 0, 0),
                None => reply.error(ENOENT),
            },
            Err(e) => reply.error(e.to_positive_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        match self.fs().unlink_entry(to_core_ino(parent), name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_positive_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        match self.fs().rmdir_entry(to_core_ino(parent), name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_positive_errno()),
        }
    }
}
