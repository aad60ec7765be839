mod common;

use common::{fresh, get, put, release};
use xv6fs::{FsError, OpenFlags, DIRENT_SIZE, ROOTINO};

fn names(fs: &xv6fs::Xv6Fs, cwd: &xv6fs::Inode, path: &str) -> Vec<String> {
    fs.readdir(cwd, path)
        .unwrap()
        .iter()
        .map(|de| String::from_utf8_lossy(de.name()).into_owned())
        .collect()
}

#[test]
fn names_are_unique_within_a_directory() {
    let (fs, _) = fresh();
    let root = fs.root();
    put(&fs, &root, "/a", b"1");
    fs.mkdir(&root, "/d").unwrap();

    assert_eq!(fs.mkdir(&root, "/a"), Err(FsError::Exists));
    assert_eq!(fs.mkdir(&root, "/d"), Err(FsError::Exists));
    assert_eq!(fs.mknod(&root, "/a", 1, 0), Err(FsError::Exists));
    assert_eq!(
        fs.open(&root, "/d", OpenFlags::CREATE | OpenFlags::RDONLY),
        Err(FsError::Exists)
    );
    // creating an existing regular file opens it
    let fd = fs.open(&root, "/a", OpenFlags::CREATE | OpenFlags::RDONLY).unwrap();
    fs.close(fd);

    assert_eq!(names(&fs, &root, "/"), vec![".", "..", "a", "d"]);
    release(&fs, root);
}

#[test]
fn freed_entries_are_reused() {
    let (fs, _) = fresh();
    let root = fs.root();
    put(&fs, &root, "/a", b"1");
    put(&fs, &root, "/b", b"2");
    let size = fs.stat(&root, "/").unwrap().size;
    assert_eq!(size, 4 * DIRENT_SIZE as u32);

    fs.unlink(&root, "/a").unwrap();
    put(&fs, &root, "/c", b"3");
    assert_eq!(fs.stat(&root, "/").unwrap().size, size);
    assert_eq!(names(&fs, &root, "/"), vec![".", "..", "c", "b"]);
    release(&fs, root);
}

#[test]
fn path_resolution() {
    let (fs, _) = fresh();
    let root = fs.root();
    fs.mkdir(&root, "/a").unwrap();
    fs.mkdir(&root, "/a/b").unwrap();
    put(&fs, &root, "/a/b/c", b"leaf");

    let leaf = fs.stat(&root, "/a/b/c").unwrap().ino;
    assert_eq!(fs.stat(&root, "///a//b/c").unwrap().ino, leaf);
    assert_eq!(fs.stat(&root, "a/b/c").unwrap().ino, leaf);
    assert_eq!(fs.stat(&root, "/a/./b/../b/c").unwrap().ino, leaf);
    assert_eq!(fs.stat(&root, "/..").unwrap().ino, ROOTINO);
    assert_eq!(fs.stat(&root, "/").unwrap().ino, ROOTINO);

    assert_eq!(fs.stat(&root, "/a/b/c/d"), Err(FsError::NotDir));
    assert_eq!(fs.stat(&root, "/a/x/c"), Err(FsError::NotFound));

    let b = fs.stat(&root, "/a/b").unwrap().ino;
    let tx = fs.begin_op();
    let a = fs.namei(&tx, &root, "/a").unwrap();
    // relative to a working directory
    let c = fs.namei(&tx, &a, "b/c").unwrap();
    assert_eq!(c.inum(), leaf);
    let (parent, name) = fs.nameiparent(&tx, &a, "b/c").unwrap();
    assert_eq!(name, b"c");
    assert_eq!(parent.inum(), b);
    assert!(matches!(fs.nameiparent(&tx, &a, "/"), Err(FsError::NotFound)));
    fs.iput(&tx, parent);
    fs.iput(&tx, c);
    fs.iput(&tx, a);
    tx.end();
    release(&fs, root);
}

#[test]
fn long_names_are_truncated() {
    let (fs, _) = fresh();
    let root = fs.root();
    put(&fs, &root, "/abcdefghijklmnopqrstu", b"x");
    assert_eq!(names(&fs, &root, "/")[2], "abcdefghijklmn");
    assert_eq!(get(&fs, &root, "/abcdefghijklmn"), b"x");
    assert_eq!(get(&fs, &root, "/abcdefghijklmnzzz"), b"x");
    release(&fs, root);
}

#[test]
fn directory_tree_teardown() {
    let (fs, _) = fresh();
    let root = fs.root();
    let free_before: Vec<bool> = (0..20)
        .map(|i| fs.block_in_use(fs.superblock().data_start() + i))
        .collect();

    fs.mkdir(&root, "/x").unwrap();
    fs.mkdir(&root, "/x/y").unwrap();
    put(&fs, &root, "/x/y/z", &[1; 1200]);
    assert_eq!(fs.unlink(&root, "/x/y"), Err(FsError::NotEmpty));
    fs.unlink(&root, "/x/y/z").unwrap();
    fs.unlink(&root, "/x/y").unwrap();
    fs.unlink(&root, "/x").unwrap();

    let free_after: Vec<bool> = (0..20)
        .map(|i| fs.block_in_use(fs.superblock().data_start() + i))
        .collect();
    assert_eq!(free_before, free_after);
    assert_eq!(fs.stat(&root, "/").unwrap().nlink, 1);
    release(&fs, root);
}
