//! End-to-end tests against an in-memory device: format, mount, basic file
//! and directory operations, boundary behavior, and remount persistence.

use newfs::device::MemDevice;
use newfs::errno::Error;
use newfs::record::FileType;
use newfs::Filesystem;

/// Reserved blocks (superblock + 2 bitmaps + inode table) at the default
/// 1024-byte block size, plus headroom for data blocks used by a test.
fn fresh_device(extra_data_blocks: u64) -> MemDevice {
    let io_sz = 512u64;
    let blk_size = 2 * io_sz;
    let reserved_blocks = 588u64;
    let size = (reserved_blocks + extra_data_blocks) * blk_size;
    MemDevice::new(size, io_sz)
}

#[test]
fn fresh_mount_creates_root() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let result = fs.lookup("/").unwrap();
    assert!(result.found);
    assert!(result.is_root);
    let ino = fs.attrs(0).unwrap();
    assert_eq!(ino.ftype, FileType::Directory);
}

#[test]
fn create_write_read_roundtrip() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let ino = fs.create_entry(0, "hello.txt", FileType::Regular).unwrap();
    fs.write_file(ino, 0, b"hello world").unwrap();
    let data = fs.read_file(ino, 0, 11).unwrap();
    assert_eq!(&data, b"hello world");
    assert_eq!(fs.attrs(ino).unwrap().size, 11);
}

#[test]
fn write_across_block_boundary() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let ino = fs.create_entry(0, "big.bin", FileType::Regular).unwrap();
    let blk_size = fs.blk_size() as usize;
    let payload = vec![0xABu8; blk_size + 10];
    fs.write_file(ino, 0, &payload).unwrap();
    let back = fs.read_file(ino, 0, payload.len() as u32).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn parent_ino_resolves_to_real_parent() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let sub_ino = fs.create_entry(0, "sub", FileType::Directory).unwrap();
    let leaf_ino = fs
        .create_entry(sub_ino, "leaf", FileType::Directory)
        .unwrap();

    assert_eq!(fs.parent_ino(leaf_ino), Some(sub_ino));
    assert_eq!(fs.parent_ino(sub_ino), Some(0));
    assert_eq!(fs.parent_ino(0), None);
}

#[test]
fn mkdir_and_nested_lookup() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let dir_ino = fs.create_entry(0, "sub", FileType::Directory).unwrap();
    fs.create_entry(dir_ino, "leaf.txt", FileType::Regular)
        .unwrap();

    let result = fs.lookup("/sub/leaf.txt").unwrap();
    assert!(result.found);
    assert!(!result.is_root);
}

#[test]
fn lookup_miss_is_not_root() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let result = fs.lookup("/nonexistent").unwrap();
    assert!(!result.found);
    assert!(!result.is_root);
}

#[test]
fn lookup_hit_is_not_root() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    fs.create_entry(0, "file.txt", FileType::Regular).unwrap();
    let result = fs.lookup("/file.txt").unwrap();
    assert!(result.found);
    assert!(!result.is_root);
}

#[test]
fn lookup_through_file_stops() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    fs.create_entry(0, "file.txt", FileType::Regular).unwrap();
    let result = fs.lookup("/file.txt/nested").unwrap();
    assert!(!result.found);
}

#[test]
fn lookup_prefix_match_quirk() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    fs.create_entry(0, "foobar.txt", FileType::Regular)
        .unwrap();
    // Reproduces the on-disk comparison rule: a component matches any name
    // that starts with it, not just an exact name.
    let result = fs.lookup("/foo").unwrap();
    assert!(result.found);
}

#[test]
fn create_rejects_duplicate_name() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    fs.create_entry(0, "dup.txt", FileType::Regular).unwrap();
    let err = fs
        .create_entry(0, "dup.txt", FileType::Regular)
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists));
}

#[test]
fn directory_overflow_leaves_child_unlinked() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let blk_size = fs.blk_size();
    let record_size = 133u32;
    let max_entries = (6 * blk_size) / record_size;

    for i in 0..max_entries {
        fs.create_entry(0, &format!("f{i}"), FileType::Regular)
            .unwrap();
    }
    let size_before = fs.attrs(0).unwrap().size;
    let err = fs
        .create_entry(0, "overflow", FileType::Regular)
        .unwrap_err();
    assert!(matches!(err, Error::NoSpace));
    // The failed entry must not have been linked into the directory.
    let result = fs.lookup("/overflow").unwrap();
    assert!(!result.found);
    assert_eq!(fs.attrs(0).unwrap().size, size_before);
}

#[test]
fn unlink_frees_inode_for_reuse() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let ino = fs.create_entry(0, "temp.txt", FileType::Regular).unwrap();
    fs.unlink_entry(0, "temp.txt").unwrap();
    assert!(fs.attrs(ino).is_none());
    let result = fs.lookup("/temp.txt").unwrap();
    assert!(!result.found);

    let new_ino = fs.create_entry(0, "temp2.txt", FileType::Regular).unwrap();
    assert_eq!(new_ino, ino);
}

#[test]
fn rmdir_requires_empty_directory() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let dir_ino = fs.create_entry(0, "full", FileType::Directory).unwrap();
    fs.create_entry(dir_ino, "leaf.txt", FileType::Regular)
        .unwrap();
    let err = fs.rmdir_entry(0, "full").unwrap_err();
    assert!(matches!(err, Error::NotEmpty));

    fs.unlink_entry(dir_ino, "leaf.txt").unwrap();
    fs.rmdir_entry(0, "full").unwrap();
    let result = fs.lookup("/full").unwrap();
    assert!(!result.found);
}

#[test]
fn truncate_grows_then_shrinks() {
    let mut fs = Filesystem::mount(fresh_device(16)).unwrap();
    let ino = fs.create_entry(0, "trunc.txt", FileType::Regular).unwrap();
    fs.write_file(ino, 0, b"abc").unwrap();
    fs.truncate_file(ino, 10).unwrap();
    assert_eq!(fs.attrs(ino).unwrap().size, 10);
    let data = fs.read_file(ino, 0, 10).unwrap();
    assert_eq!(&data[0..3], b"abc");
    assert_eq!(&data[3..10], &[0u8; 7]);

    fs.truncate_file(ino, 2).unwrap();
    assert_eq!(fs.attrs(ino).unwrap().size, 2);
    assert_eq!(fs.read_file(ino, 0, 2).unwrap(), b"ab");
}

#[test]
fn data_survives_unmount_and_remount() {
    let device = fresh_device(16);
    let mut fs = Filesystem::mount(device).unwrap();
    let ino = fs.create_entry(0, "persist.txt", FileType::Regular).unwrap();
    fs.write_file(ino, 0, b"durable").unwrap();
    let dir_ino = fs
        .create_entry(0, "persist_dir", FileType::Directory)
        .unwrap();
    fs.create_entry(dir_ino, "nested.txt", FileType::Regular)
        .unwrap();
    let device = fs.unmount().unwrap();

    let mut fs = Filesystem::mount(device).unwrap();
    let attrs = fs.stat("/persist.txt").unwrap().expect("file persisted");
    assert_eq!(attrs.size, 7);
    assert_eq!(attrs.ftype, FileType::Regular);
    let data = fs.read_file(attrs.ino, 0, 7).unwrap();
    assert_eq!(&data, b"durable");

    let nested = fs
        .stat("/persist_dir/nested.txt")
        .unwrap()
        .expect("nested file persisted");
    assert_eq!(nested.ftype, FileType::Regular);
}
