//! Disk layout:
//! [ boot block | super block | log header + log slots | inode blocks | free bit map | data blocks ]
//!
//! mkfs computes the super block and builds an initial file system. The super block
//! describes the disk layout and is read once at mount.

use super::*;
use buf::BufCache;

use serde::{Deserialize, Serialize};

/// block holding the super block
pub const SBLOCK: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SuperBlock {
    /// Size of file system image (blocks)
    pub size: u32,
    /// Number of data blocks
    pub nblocks: u32,
    /// Number of inodes.
    pub ninodes: u32,
    /// Number of log blocks
    pub nlog: u32,
    /// Block number of first log block
    pub logstart: u32,
    /// Block number of first inode block
    pub inodestart: u32,
    /// Block number of first free map block
    pub bmapstart: u32,
}

impl SuperBlock {
    /// Read the super block of `dev`.
    pub fn read(bcache: &BufCache, dev: u32) -> Self {
        let bp = bcache.read(dev, SBLOCK);
        let sb: SuperBlock = bp.read_obj(0);
        bp.release();
        if !sb.is_sane() {
            panic!("readsb: bad super block on dev {}: {:?}", dev, sb);
        }
        sb
    }

    fn is_sane(&self) -> bool {
        self.logstart >= 2
            && self.nlog >= 2
            && self.inodestart >= self.logstart + self.nlog
            && self.bmapstart > self.inodestart
            && self.nblocks < self.size
            && self.data_start() > self.bmapstart
            && self.ninodes > ROOTINO
    }

    /// Block of free map containing bit for block b
    pub fn bblock(&self, b: u32) -> u32 {
        self.bmapstart + b / (BPB as u32)
    }

    /// Block containing inode i
    pub fn iblock(&self, inum: u32) -> u32 {
        self.inodestart + inum / (IPB as u32)
    }

    /// First block of the data region.
    pub fn data_start(&self) -> u32 {
        self.size - self.nblocks
    }
}

/// Byte offset of inode `inum` inside its inode block.
pub fn ioffset(inum: u32) -> usize {
    (inum as usize % IPB) * DINODE_SIZE
}
