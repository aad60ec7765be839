use core::mem::size_of;

/// root i-number
pub const ROOTINO: u32 = 1;

/// device number the root file system is mounted on
pub const ROOTDEV: u32 = 1;

/// block size
pub const BSIZE: usize = 512;

/// direct blocks in inode
pub const NDIRECT: usize = 12;

/// block pointers held by the indirect block
pub const NINDIRECT: usize = BSIZE / size_of::<u32>();

/// max # of blocks a file can have
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

/// size of an on-disk inode: 4 x i16, u32 size, NDIRECT + 1 addresses
pub const DINODE_SIZE: usize = 4 * size_of::<i16>() + size_of::<u32>() * (NDIRECT + 2);

/// inodes per block
pub const IPB: usize = BSIZE / DINODE_SIZE;

/// bitmap bits per block
pub const BPB: usize = BSIZE * 8;

/// Directory is a file containing a sequence of dirent structures.
pub const DIRSIZ: usize = 14;

/// size of an on-disk directory entry
pub const DIRENT_SIZE: usize = size_of::<u16>() + DIRSIZ;

/// max # of blocks any FS op writes
pub const MAXOPBLOCKS: usize = 10;

/// max data blocks in on-disk log
pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

/// size of disk block cache, enough for a full log of pinned blocks plus commit scratch
pub const NBUF: usize = MAXOPBLOCKS * 4;

/// max # of active in-memory inodes
pub const NINODE: usize = 50;

/// open files per system
pub const NFILE: usize = 100;

/// maximum major device number
pub const NDEV: usize = 10;

/// size of file system in blocks
pub const FSSIZE: usize = 1000;

/// # of inodes created by mkfs
pub const NINODES: usize = 200;

const _: () = assert!(DINODE_SIZE == 64);
const _: () = assert!(BSIZE % DINODE_SIZE == 0);
const _: () = assert!(BSIZE % DIRENT_SIZE == 0);
// the log header is one count plus LOGSIZE block numbers
const _: () = assert!(size_of::<u32>() * (LOGSIZE + 1) <= BSIZE);
