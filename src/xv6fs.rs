use super::*;
use blk_dev::BlockDevice;
use buf::BufCache;
use dev::{DevSwitch, DeviceHandler};
use file::FileTable;
use fs::SuperBlock;
use inode::{Inode, InodeCache};
use trans::{Log, Transaction};

use std::sync::Arc;

use log::info;

/// Sizes of the in-memory tables of a mounted file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    /// buffer cache slots
    pub nbuf: usize,
    /// inode table entries
    pub ninode: usize,
    /// open file table entries
    pub nfile: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            ninode: NINODE,
            nfile: NFILE,
        }
    }
}

/// A mounted file system and all of its in-memory state.
pub struct Xv6Fs {
    pub(crate) dev: u32,
    pub(crate) sb: SuperBlock,
    pub(crate) bcache: BufCache,
    pub(crate) log: Log,
    pub(crate) itable: InodeCache,
    pub(crate) devsw: DevSwitch,
    pub(crate) ftable: FileTable,
}

impl Xv6Fs {
    pub fn mount(dev: u32, disk: Arc<dyn BlockDevice>) -> Self {
        Self::mount_with(dev, disk, FsConfig::default())
    }

    /// Read the super block and recover the log before anything else touches the disk.
    pub fn mount_with(dev: u32, disk: Arc<dyn BlockDevice>, config: FsConfig) -> Self {
        let bcache = BufCache::new(config.nbuf);
        bcache.attach(dev, disk);
        let sb = SuperBlock::read(&bcache, dev);
        // a full log stays pinned while commit needs a log slot and a home block
        let need = Log::capacity_for(sb.nlog) + 2;
        assert!(
            bcache.capacity() >= need,
            "binit: {} buffers cannot commit a full log, need {}",
            bcache.capacity(),
            need
        );
        let log = Log::new(dev, sb.logstart, sb.nlog, &bcache);
        info!(
            "mount: dev {} size {} nblocks {} ninodes {} nlog {}",
            dev, sb.size, sb.nblocks, sb.ninodes, sb.nlog
        );
        Self {
            dev,
            sb,
            bcache,
            log,
            itable: InodeCache::new(config.ninode),
            devsw: DevSwitch::new(),
            ftable: FileTable::new(config.nfile),
        }
    }

    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn bcache(&self) -> &BufCache {
        &self.bcache
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn register_device(&self, major: i16, handler: Arc<dyn DeviceHandler>) -> Result<()> {
        self.devsw.register(major, handler)
    }

    /// Open a file system operation.
    pub fn begin_op(&self) -> Transaction<'_> {
        self.log.begin_op(&self.bcache)
    }

    /// A fresh reference to the root directory, e.g. as a starting working directory.
    pub fn root(&self) -> Inode {
        self.iget(ROOTINO)
    }
}
