pub mod bitmap; // free block allocation
pub mod blk_dev; // block devices
pub mod buf; // cache for block devices
pub mod common;
pub mod dev; // device switch
pub mod dir;
pub mod error;
pub mod file; // open files and descriptors
pub mod fs; // on-disk layout
pub mod inode;
pub mod mkfs;
pub mod ops; // create, link, unlink, ...
pub mod path;
pub mod trans; // write-ahead log
pub mod xv6fs;

pub use blk_dev::{BlockDevice, FileDisk, RamDisk};
pub use common::*;
pub use dev::DeviceHandler;
pub use dir::DirEnt;
pub use error::{FsError, Result};
pub use file::{Fd, OpenFlags};
pub use fs::SuperBlock;
pub use inode::{FileKind, Inode, Stat};
pub use mkfs::MkfsParams;
pub use xv6fs::{FsConfig, Xv6Fs};
