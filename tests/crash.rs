mod common;

use std::sync::Arc;

use common::{init_logger, pattern, reboot, release, CrashDisk};
use xv6fs::mkfs::mkfs;
use xv6fs::{FileKind, FsError, MkfsParams, RamDisk, Xv6Fs, FSSIZE, ROOTDEV};

/// Create "/x" with 700 bytes in a single transaction, losing every disk write past
/// `budget`, then reboot from what reached the disk.
fn crash_during_create(budget: usize) -> Xv6Fs {
    init_logger();
    let ram = Arc::new(RamDisk::new(FSSIZE));
    mkfs(&*ram, &MkfsParams::default()).unwrap();
    let disk = Arc::new(CrashDisk::new(ram.clone()));
    let fs = Xv6Fs::mount(ROOTDEV, disk.clone());
    let root = fs.root();

    disk.crash_after(budget);
    let tx = fs.begin_op();
    let ip = fs
        .create(&tx, &root, "/x", FileKind::File, 0, 0)
        .unwrap();
    let mut guard = fs.ilock(&ip);
    fs.writei(&tx, &mut guard, &pattern(700, 1), 0).unwrap();
    fs.iunlockput(&tx, guard, ip);
    fs.iput(&tx, root);
    tx.end();

    reboot(&ram)
}

#[test]
fn create_is_all_or_nothing() {
    let mut seen = (false, false);
    for budget in 0..40 {
        let fs = crash_during_create(budget);
        let root = fs.root();
        let first_data = fs.superblock().data_start() + 1;
        match fs.stat(&root, "/x") {
            Ok(st) => {
                seen.1 = true;
                assert_eq!(st.size, 700, "budget {}", budget);
                assert_eq!(common::get(&fs, &root, "/x"), pattern(700, 1));
                assert!(fs.block_in_use(first_data), "budget {}", budget);
            }
            Err(e) => {
                seen.0 = true;
                assert_eq!(e, FsError::NotFound, "budget {}", budget);
                assert!(!fs.block_in_use(first_data), "budget {}", budget);
                assert_eq!(fs.stat(&root, "/").unwrap().size, 32, "budget {}", budget);
            }
        }
        assert_eq!(fs.log().pending(), 0);
        release(&fs, root);
    }
    assert_eq!(seen, (true, true));
}

#[test]
fn recovery_is_idempotent() {
    init_logger();
    let ram = Arc::new(RamDisk::new(FSSIZE));
    mkfs(&*ram, &MkfsParams::default()).unwrap();
    let disk = Arc::new(CrashDisk::new(ram.clone()));
    let fs = Xv6Fs::mount(ROOTDEV, disk.clone());
    let root = fs.root();

    let tx = fs.begin_op();
    let ip = fs
        .create(&tx, &root, "/d", FileKind::Directory, 0, 0)
        .unwrap();
    fs.iput(&tx, ip);
    fs.iput(&tx, root);
    // the log blocks and the header reach the disk, installation does not
    let n = fs.log().pending();
    assert!(n > 2);
    disk.crash_after(n + 1);
    tx.end();

    // crash again halfway through recovery
    let copy = Arc::new(RamDisk::from_image(ram.image()));
    let replay = Arc::new(CrashDisk::new(copy.clone()));
    replay.crash_after(2);
    drop(Xv6Fs::mount(ROOTDEV, replay));

    for disk in [&copy, &ram] {
        let fs = reboot(disk);
        let root = fs.root();
        let st = fs.stat(&root, "/d").unwrap();
        assert_eq!((st.kind, st.nlink), (FileKind::Directory, 1));
        assert_eq!(fs.stat(&root, "/").unwrap().nlink, 2);
        assert_eq!(fs.readdir(&root, "/d").unwrap().len(), 2);
        release(&fs, root);
    }
}
