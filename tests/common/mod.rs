#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use xv6fs::mkfs::mkfs;
use xv6fs::{BlockDevice, Inode, MkfsParams, OpenFlags, RamDisk, Xv6Fs, FSSIZE, ROOTDEV};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A default-sized, freshly formatted file system on a RAM disk.
pub fn fresh() -> (Xv6Fs, Arc<RamDisk>) {
    init_logger();
    let disk = Arc::new(RamDisk::new(FSSIZE));
    mkfs(&*disk, &MkfsParams::default()).unwrap();
    let fs = Xv6Fs::mount(ROOTDEV, disk.clone());
    (fs, disk)
}

/// Mount a copy of `disk` as it is right now, as after a reboot.
pub fn reboot(disk: &RamDisk) -> Xv6Fs {
    Xv6Fs::mount(ROOTDEV, Arc::new(RamDisk::from_image(disk.image())))
}

pub fn put(fs: &Xv6Fs, cwd: &Inode, path: &str, data: &[u8]) {
    let fd = fs
        .open(cwd, path, OpenFlags::CREATE | OpenFlags::WRONLY | OpenFlags::TRUNC)
        .unwrap();
    assert_eq!(fs.write(&fd, data).unwrap(), data.len());
    fs.close(fd);
}

pub fn get(fs: &Xv6Fs, cwd: &Inode, path: &str) -> Vec<u8> {
    let fd = fs.open(cwd, path, OpenFlags::RDONLY).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 700];
    loop {
        let n = fs.read(&fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    fs.close(fd);
    out
}

pub fn release(fs: &Xv6Fs, ip: Inode) {
    let tx = fs.begin_op();
    fs.iput(&tx, ip);
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Device that silently drops every write once its budget is spent, like a machine
/// losing power in the middle of a commit.
pub struct CrashDisk {
    pub inner: Arc<RamDisk>,
    budget: AtomicUsize,
}

impl CrashDisk {
    pub fn new(inner: Arc<RamDisk>) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn crash_after(&self, writes: usize) {
        self.budget.store(writes, Ordering::SeqCst);
    }
}

impl BlockDevice for CrashDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) {
        self.inner.read_block(blockno, buf);
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) {
        let granted = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
            .is_ok();
        if granted {
            self.inner.write_block(blockno, buf);
        }
    }
}
