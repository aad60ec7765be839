//! Inodes.
//!
//! An inode describes a single unnamed file. The inode disk structure holds metadata: the
//! file's type, its size, the number of links referring to it, and the list of blocks
//! holding the file's content.
//!
//! The inodes are laid out sequentially on disk at `sb.inodestart`. Each inode has a number,
//! indicating its position on the disk.
//!
//! The kernel keeps a table of in-use inodes in memory to provide a place for synchronizing
//! access to inodes used by multiple threads. The in-memory inodes include book-keeping
//! information that is not stored on disk: the reference count and the valid flag.
//!
//! An inode and its in-memory representation go through a sequence of states before they
//! can be used by the rest of the file system code.
//!
//! * Allocation: an inode is allocated if its type (on disk) is non-zero. `ialloc()`
//!   allocates, and `iput()` frees if the reference and link counts have fallen to zero.
//!
//! * Referencing in table: an entry in the inode table is free if its reference count is
//!   zero. Otherwise the reference count tracks the number of in-memory handles to the entry
//!   (open files and current directories). `iget()` finds or creates a table entry and
//!   increments its count; `iput()` decrements it.
//!
//! * Valid: the information (type, size, &c) in an inode table entry is only correct when
//!   the valid flag is set. `ilock()` reads the inode from the disk and sets the flag, while
//!   `iput()` clears it if the reference count has fallen to zero.
//!
//! * Locked: file system code may only examine and modify the information in an inode and
//!   its content if it has first locked the inode.
//!
//! Thus a typical sequence is:
//!   let ip = fs.iget(inum);
//!   let mut guard = fs.ilock(&ip);
//!   ... examine and modify guard.xxx ...
//!   drop(guard);
//!   fs.iput(&tx, ip);
//!
//! `ilock()` is separate from `iget()` so that callers can get a long-term reference to an
//! inode (as for an open file) and only lock it for short periods (e.g., in `read()`).
//! The separation also helps avoid deadlock and races during pathname lookup. `iget()`
//! increments the reference count so that the inode stays in the table and handles to it
//! remain valid.

use super::*;
use fs::ioffset;
use trans::Transaction;

use core::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// On-disk type of a free inode.
pub const T_FREE: i16 = 0;

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory = 1,
    File = 2,
    Device = 3,
}

impl FileKind {
    pub fn from_raw(typ: i16) -> Option<Self> {
        match typ {
            1 => Some(FileKind::Directory),
            2 => Some(FileKind::File),
            3 => Some(FileKind::Device),
            _ => None,
        }
    }
}

/// inode on disk
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DInode {
    /// File type, `T_FREE` when unallocated
    pub typ: i16,
    /// Major device number (Device only)
    pub major: i16,
    /// Minor device number (Device only)
    pub minor: i16,
    /// Number of hard links to inode in file system
    pub nlink: i16,
    /// Size of file (bytes)
    pub size: u32,
    /// Data block addresses: NDIRECT direct blocks, then the indirect block
    pub addrs: [u32; NDIRECT + 1],
}

impl DInode {
    pub fn kind(&self) -> FileKind {
        match FileKind::from_raw(self.typ) {
            Some(kind) => kind,
            None => panic!("inode: unknown type {}", self.typ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// file system's disk device
    pub dev: u32,
    /// inode number
    pub ino: u32,
    pub kind: FileKind,
    /// number of links to file
    pub nlink: i16,
    /// size of file in bytes
    pub size: u32,
}

struct InodeMeta {
    dev: u32,
    inum: u32,
    refcnt: u32,
    /// inode has been read from disk?
    valid: bool,
}

/// Fixed-size table of in-memory inodes.
pub struct InodeCache {
    /// protects dev, inum, refcnt and valid of every entry
    meta: Mutex<Vec<InodeMeta>>,
    /// copy of the disk inode, protected by the per-entry lock
    inodes: Vec<Mutex<DInode>>,
}

/// A counted, unlocked reference to an inode table entry. Hand it back with `iput`.
#[derive(Debug)]
pub struct Inode {
    idx: usize,
    dev: u32,
    inum: u32,
}

/// A locked inode. Dropping it unlocks.
pub struct InodeGuard<'a> {
    dev: u32,
    inum: u32,
    inner: MutexGuard<'a, DInode>,
}

impl InodeCache {
    pub fn new(ninode: usize) -> Self {
        Self {
            meta: Mutex::new(
                (0..ninode)
                    .map(|_| InodeMeta {
                        dev: 0,
                        inum: 0,
                        refcnt: 0,
                        valid: false,
                    })
                    .collect(),
            ),
            inodes: (0..ninode).map(|_| Mutex::new(DInode::default())).collect(),
        }
    }

    /// Find the inode with number `inum` on device `dev` and return a reference to it.
    /// Does not lock the inode and does not read it from disk.
    pub fn get(&self, dev: u32, inum: u32) -> Inode {
        let mut meta = self.meta.lock().unwrap();

        // Is the inode already in the table?
        let mut empty = None;
        for (idx, m) in meta.iter_mut().enumerate() {
            if m.refcnt > 0 && m.dev == dev && m.inum == inum {
                m.refcnt += 1;
                return Inode { idx, dev, inum };
            }
            if empty.is_none() && m.refcnt == 0 {
                // Remember empty slot.
                empty = Some(idx);
            }
        }

        // Recycle an inode entry.
        let Some(idx) = empty else {
            drop(meta);
            panic!("iget: no inodes");
        };
        trace!("iget: dev {} inum {} -> entry {}", dev, inum, idx);
        meta[idx] = InodeMeta {
            dev,
            inum,
            refcnt: 1,
            valid: false,
        };
        Inode { idx, dev, inum }
    }

    /// Increment the reference count.
    pub fn dup(&self, ip: &Inode) -> Inode {
        self.meta.lock().unwrap()[ip.idx].refcnt += 1;
        Inode {
            idx: ip.idx,
            dev: ip.dev,
            inum: ip.inum,
        }
    }

    pub fn refcnt(&self, ip: &Inode) -> u32 {
        self.meta.lock().unwrap()[ip.idx].refcnt
    }

    fn is_valid(&self, idx: usize) -> bool {
        self.meta.lock().unwrap()[idx].valid
    }

    fn set_valid(&self, idx: usize, valid: bool) {
        self.meta.lock().unwrap()[idx].valid = valid;
    }

    fn lock_entry(&self, ip: &Inode) -> InodeGuard<'_> {
        InodeGuard {
            dev: ip.dev,
            inum: ip.inum,
            inner: self.inodes[ip.idx].lock().unwrap(),
        }
    }

    /// Lock the entry of `ip` if `ip` is its only reference and the entry has been read
    /// from disk. The entry lock is taken under the table lock, so no `iget` can slip in
    /// between; any other holder of the entry lock would hold a reference too.
    fn lock_if_last(&self, ip: &Inode) -> Option<InodeGuard<'_>> {
        let meta = self.meta.lock().unwrap();
        let m = &meta[ip.idx];
        if m.refcnt != 1 || !m.valid {
            return None;
        }
        let guard = self.lock_entry(ip);
        drop(meta);
        Some(guard)
    }

    /// Drop a reference.
    fn drop_ref(&self, ip: Inode) {
        let mut meta = self.meta.lock().unwrap();
        let m = &mut meta[ip.idx];
        assert!(m.refcnt > 0, "iput: refcnt underflow");
        m.refcnt -= 1;
    }
}

impl Inode {
    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn inum(&self) -> u32 {
        self.inum
    }
}

impl<'a> InodeGuard<'a> {
    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn inum(&self) -> u32 {
        self.inum
    }

    pub fn unlock(self) {
        drop(self);
    }
}

impl Deref for InodeGuard<'_> {
    type Target = DInode;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for InodeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Xv6Fs {
    /// Allocate an inode on the device. Mark it as allocated by giving it type `kind`.
    /// Returns an unlocked but allocated and referenced inode.
    pub fn ialloc(&self, tx: &Transaction<'_>, kind: FileKind) -> Inode {
        for inum in 1..self.sb.ninodes {
            let mut bp = self.bcache.read(self.dev, self.sb.iblock(inum));
            let dip: DInode = bp.read_obj(ioffset(inum));
            if dip.typ == T_FREE {
                // a free inode
                let dip = DInode {
                    typ: kind as i16,
                    ..DInode::default()
                };
                bp.write_obj(ioffset(inum), &dip);
                // mark it allocated on the disk
                tx.write(&bp);
                bp.release();
                debug!("ialloc: inum {} as {:?}", inum, kind);
                return self.iget(inum);
            }
            bp.release();
        }
        panic!("ialloc: no inodes");
    }

    /// Reference to inode `inum` of this file system.
    pub fn iget(&self, inum: u32) -> Inode {
        self.itable.get(self.dev, inum)
    }

    /// Increment reference count for ip.
    pub fn idup(&self, ip: &Inode) -> Inode {
        self.itable.dup(ip)
    }

    /// Lock the given inode.
    /// Reads the inode from disk if necessary.
    pub fn ilock<'a>(&'a self, ip: &Inode) -> InodeGuard<'a> {
        let mut guard = self.itable.lock_entry(ip);
        if !self.itable.is_valid(ip.idx) {
            let bp = self.bcache.read(ip.dev, self.sb.iblock(ip.inum));
            *guard.inner = bp.read_obj(ioffset(ip.inum));
            bp.release();
            if FileKind::from_raw(guard.typ).is_none() {
                let typ = guard.typ;
                drop(guard);
                panic!("ilock: inode {} has type {}", ip.inum, typ);
            }
            self.itable.set_valid(ip.idx, true);
        }
        guard
    }

    /// Unlock the given inode.
    pub fn iunlock(&self, guard: InodeGuard<'_>) {
        guard.unlock();
    }

    /// Copy a modified in-memory inode to disk.
    /// Must be called after every change to an inode field that lives on disk.
    /// Caller must hold the inode lock.
    pub fn iupdate(&self, tx: &Transaction<'_>, ip: &InodeGuard<'_>) {
        let mut bp = self.bcache.read(ip.dev, self.sb.iblock(ip.inum));
        bp.write_obj(ioffset(ip.inum), &*ip.inner);
        tx.write(&bp);
        bp.release();
    }

    /// Drop a reference to an in-memory inode.
    /// If that was the last reference, the inode table entry can be recycled.
    /// If that was the last reference and the inode has no links to it, free the inode
    /// (and its content) on disk.
    /// All calls to iput() must be inside a transaction in case it has to free the inode.
    pub fn iput(&self, tx: &Transaction<'_>, ip: Inode) {
        if let Some(mut guard) = self.itable.lock_if_last(&ip) {
            // No links means no directory names it, so no one can iget it meanwhile.
            if guard.nlink == 0 {
                // inode has no links and no other references: truncate and free.
                debug!("iput: freeing inode {}", ip.inum);
                self.itrunc(tx, &mut guard);
                guard.typ = T_FREE;
                self.iupdate(tx, &guard);
                self.itable.set_valid(ip.idx, false);
            }
        }
        self.itable.drop_ref(ip);
    }

    /// Common idiom: unlock, then put.
    pub fn iunlockput(&self, tx: &Transaction<'_>, guard: InodeGuard<'_>, ip: Inode) {
        drop(guard);
        self.iput(tx, ip);
    }

    /// Truncate inode (discard contents).
    /// Caller must hold the inode lock.
    pub fn itrunc(&self, tx: &Transaction<'_>, ip: &mut InodeGuard<'_>) {
        for i in 0..NDIRECT {
            if ip.addrs[i] != 0 {
                self.bfree(tx, ip.addrs[i]);
                ip.addrs[i] = 0;
            }
        }

        if ip.addrs[NDIRECT] != 0 {
            let bp = self.bcache.read(ip.dev, ip.addrs[NDIRECT]);
            let addrs: Vec<u32> = (0..NINDIRECT)
                .map(|j| bp.read_obj::<u32>(4 * j))
                .filter(|&a| a != 0)
                .collect();
            bp.release();
            for a in addrs {
                self.bfree(tx, a);
            }
            self.bfree(tx, ip.addrs[NDIRECT]);
            ip.addrs[NDIRECT] = 0;
        }

        ip.size = 0;
        self.iupdate(tx, ip);
    }

    /// Copy stat information from inode.
    /// Caller must hold the inode lock.
    pub fn stati(&self, ip: &InodeGuard<'_>) -> Stat {
        Stat {
            dev: ip.dev,
            ino: ip.inum,
            kind: ip.kind(),
            nlink: ip.nlink,
            size: ip.size,
        }
    }

    /// Return the disk block address of the nth block in inode ip.
    /// If there is no such block, bmap allocates one.
    pub fn bmap(&self, tx: &Transaction<'_>, ip: &mut InodeGuard<'_>, bn: usize) -> u32 {
        self.bmap_internal(Some(tx), ip, bn)
    }

    fn bmap_internal(
        &self,
        tx: Option<&Transaction<'_>>,
        ip: &mut InodeGuard<'_>,
        bn: usize,
    ) -> u32 {
        let alloc = |what: &str| match tx {
            Some(tx) => self.balloc(tx),
            None => panic!("bmap: unallocated {} block {} outside a transaction", what, bn),
        };

        if bn < NDIRECT {
            let mut addr = ip.addrs[bn];
            if addr == 0 {
                addr = alloc("direct");
                ip.addrs[bn] = addr;
            }
            return addr;
        }

        let bn = bn - NDIRECT;
        if bn >= NINDIRECT {
            panic!("bmap: out of range");
        }

        // Load indirect block, allocating if necessary.
        let mut indirect = ip.addrs[NDIRECT];
        if indirect == 0 {
            indirect = alloc("indirect");
            ip.addrs[NDIRECT] = indirect;
        }
        let mut bp = self.bcache.read(ip.dev, indirect);
        let mut addr: u32 = bp.read_obj(4 * bn);
        if addr == 0 {
            addr = alloc("data");
            bp.write_obj(4 * bn, &addr);
            if let Some(tx) = tx {
                tx.write(&bp);
            }
        }
        bp.release();
        addr
    }

    /// Read data from inode.
    /// Caller must hold the inode lock.
    /// Returns the number of bytes read, short at end of file.
    pub fn readi(&self, ip: &mut InodeGuard<'_>, dst: &mut [u8], off: u32) -> Result<usize> {
        if ip.kind() == FileKind::Device {
            return self.devsw.read(ip.major, ip.minor, dst);
        }

        let size = ip.size as u64;
        let off = off as u64;
        if off > size {
            return Err(FsError::OutOfRange);
        }
        let n = (dst.len() as u64).min(size - off) as usize;

        let mut tot = 0;
        let mut off = off as usize;
        while tot < n {
            let addr = self.bmap_internal(None, ip, off / BSIZE);
            let bp = self.bcache.read(ip.dev, addr);
            let start = off % BSIZE;
            let m = (n - tot).min(BSIZE - start);
            dst[tot..tot + m].copy_from_slice(&bp.data()[start..start + m]);
            bp.release();
            tot += m;
            off += m;
        }
        Ok(n)
    }

    /// Write data to inode.
    /// Caller must hold the inode lock.
    /// Returns the number of bytes written; a write extending the file updates its size.
    pub fn writei(
        &self,
        tx: &Transaction<'_>,
        ip: &mut InodeGuard<'_>,
        src: &[u8],
        off: u32,
    ) -> Result<usize> {
        if ip.kind() == FileKind::Device {
            return self.devsw.write(ip.major, ip.minor, src);
        }

        let n = src.len() as u64;
        if off > ip.size {
            return Err(FsError::OutOfRange);
        }
        if off as u64 + n > (MAXFILE * BSIZE) as u64 {
            return Err(FsError::FileTooLarge);
        }

        let n = src.len();
        let mut tot = 0;
        let mut off = off as usize;
        while tot < n {
            let addr = self.bmap(tx, ip, off / BSIZE);
            let mut bp = self.bcache.read(ip.dev, addr);
            let start = off % BSIZE;
            let m = (n - tot).min(BSIZE - start);
            bp.data_mut()[start..start + m].copy_from_slice(&src[tot..tot + m]);
            tx.write(&bp);
            bp.release();
            tot += m;
            off += m;
        }

        if off as u32 > ip.size {
            ip.size = off as u32;
        }

        // write the i-node back to disk even if the size didn't change because the loop
        // above might have called bmap() and added a new block to ip.addrs[].
        self.iupdate(tx, ip);
        Ok(n)
    }
}
