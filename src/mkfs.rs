//! Build a fresh file system image on a block device.

use super::*;
use blk_dev::BlockDevice;
use dir::DirEnt;
use fs::{ioffset, SuperBlock, SBLOCK};
use inode::{DInode, FileKind};
use trans::Log;

use log::info;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MkfsParams {
    /// total blocks in the image
    pub size: u32,
    /// inodes to create, including the unused inode 0
    pub ninodes: u32,
    /// log blocks, header included
    pub nlog: u32,
}

impl Default for MkfsParams {
    fn default() -> Self {
        Self {
            size: FSSIZE as u32,
            ninodes: NINODES as u32,
            nlog: LOGSIZE as u32 + 1,
        }
    }
}

fn put<T: Serialize>(block: &mut [u8; BSIZE], offset: usize, obj: &T) {
    if let Err(e) = bincode::serialize_into(&mut block[offset..], obj) {
        panic!("mkfs: encode at offset {}: {}", offset, e);
    }
}

/// Format `disk` and return the super block written to it.
///
/// The root directory gets inode `ROOTINO` and the first data block; every metadata
/// block and that data block are marked in use.
pub fn mkfs(disk: &dyn BlockDevice, params: &MkfsParams) -> Result<SuperBlock> {
    let size = params.size;
    let nbitmap = size / BPB as u32 + 1;
    let ninodeblocks = params.ninodes / IPB as u32 + 1;
    let nlog = params.nlog;
    // boot block, super block, log, inodes, bitmap
    let nmeta = 2 + nlog + ninodeblocks + nbitmap;

    if params.ninodes <= ROOTINO || params.ninodes > u16::MAX as u32 {
        return Err(FsError::Invalid);
    }
    if Log::capacity_for(nlog) < MAXOPBLOCKS {
        return Err(FsError::Invalid);
    }
    if nmeta >= size {
        return Err(FsError::Invalid);
    }

    let sb = SuperBlock {
        size,
        nblocks: size - nmeta,
        ninodes: params.ninodes,
        nlog,
        logstart: 2,
        inodestart: 2 + nlog,
        bmapstart: 2 + nlog + ninodeblocks,
    };
    info!(
        "mkfs: nmeta {} (boot, super, log blocks {} inode blocks {}, bitmap blocks {}) blocks {} total {}",
        nmeta, nlog, ninodeblocks, nbitmap, sb.nblocks, size
    );

    let zeroes = [0u8; BSIZE];
    for bno in 0..size as usize {
        disk.write_block(bno, &zeroes);
    }

    let mut block = [0u8; BSIZE];
    put(&mut block, 0, &sb);
    disk.write_block(SBLOCK as usize, &block);

    // root directory: "." and ".." both name itself
    let rootblock = nmeta;
    let mut root = DInode {
        typ: FileKind::Directory as i16,
        nlink: 1,
        size: 2 * DIRENT_SIZE as u32,
        ..DInode::default()
    };
    root.addrs[0] = rootblock;

    let mut block = [0u8; BSIZE];
    put(&mut block, 0, &DirEnt::new(ROOTINO as u16, b"."));
    put(&mut block, DIRENT_SIZE, &DirEnt::new(ROOTINO as u16, b".."));
    disk.write_block(rootblock as usize, &block);

    let mut block = [0u8; BSIZE];
    put(&mut block, ioffset(ROOTINO), &root);
    disk.write_block(sb.iblock(ROOTINO) as usize, &block);

    // mark metadata and the root's block in use
    let used = nmeta as usize + 1;
    let mut bitmap = vec![0u8; nbitmap as usize * BSIZE];
    for b in 0..used {
        bitmap[b / 8] |= 1 << (b % 8);
    }
    for (i, chunk) in bitmap.chunks(BSIZE).enumerate() {
        disk.write_block(sb.bmapstart as usize + i, chunk);
    }

    info!("mkfs: first free block {}", used);
    Ok(sb)
}
