//! Block devices: the only place physical I/O happens.

use super::*;

use std::any::Any;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use log::error;

/// A synchronous block device. `buf` is always exactly one block.
///
/// Implementations treat a failed transfer as fatal: there is no redundancy to retry against.
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, blockno: usize, buf: &mut [u8]);
    fn write_block(&self, blockno: usize, buf: &[u8]);
}

/// A disk held entirely in memory.
pub struct RamDisk {
    blocks: Mutex<Vec<u8>>,
}

impl RamDisk {
    /// A zero-filled disk of `nblocks` blocks.
    pub fn new(nblocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![0; nblocks * BSIZE]),
        }
    }

    pub fn from_image(image: Vec<u8>) -> Self {
        assert!(image.len() % BSIZE == 0, "ramdisk: image not block aligned");
        Self {
            blocks: Mutex::new(image),
        }
    }

    /// Copy of the whole disk, e.g. to "reboot" from it.
    pub fn image(&self) -> Vec<u8> {
        self.blocks.lock().unwrap().clone()
    }

    pub fn nblocks(&self) -> usize {
        self.blocks.lock().unwrap().len() / BSIZE
    }

    fn range(&self, blockno: usize, len: usize) -> core::ops::Range<usize> {
        assert_eq!(len, BSIZE, "ramdisk: not a complete block!");
        let start = blockno * BSIZE;
        if blockno >= self.nblocks() {
            error!("ramdisk: block {} out of range", blockno);
            panic!("ramdisk: block {} out of range", blockno);
        }
        start..start + BSIZE
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) {
        let range = self.range(blockno, buf.len());
        buf.copy_from_slice(&self.blocks.lock().unwrap()[range]);
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) {
        let range = self.range(blockno, buf.len());
        self.blocks.lock().unwrap()[range].copy_from_slice(buf);
    }
}

/// A disk image stored in a host file.
pub struct FileDisk(pub Mutex<File>);

impl FileDisk {
    pub fn new(file: File) -> Self {
        Self(Mutex::new(file))
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        let res = file
            .seek(SeekFrom::Start((blockno * BSIZE) as u64))
            .and_then(|_| file.read_exact(buf));
        if let Err(e) = res {
            error!("filedisk: reading block {} failed: {}", blockno, e);
            panic!("filedisk: read error");
        }
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        let res = file
            .seek(SeekFrom::Start((blockno * BSIZE) as u64))
            .and_then(|_| file.write_all(buf));
        if let Err(e) = res {
            error!("filedisk: writing block {} failed: {}", blockno, e);
            panic!("filedisk: write error");
        }
    }
}
