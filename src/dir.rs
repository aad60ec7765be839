//! Directories: files holding a sequence of fixed-size `DirEnt` records.

use super::*;
use inode::{FileKind, Inode, InodeGuard};
use trans::Transaction;

use serde::{Deserialize, Serialize};

#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DirEnt {
    /// inode num, 0 for a free slot
    pub inum: u16,
    pub name: [u8; DIRSIZ],
}

impl DirEnt {
    /// Names longer than DIRSIZ are truncated.
    pub fn new(inum: u16, name: &[u8]) -> Self {
        let mut de = DirEnt {
            inum,
            name: [0; DIRSIZ],
        };
        let len = name.len().min(DIRSIZ);
        de.name[..len].copy_from_slice(&name[..len]);
        de
    }

    /// The name without NUL padding.
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(DIRSIZ);
        &self.name[..len]
    }

    fn decode(raw: &[u8; DIRENT_SIZE]) -> Self {
        match bincode::deserialize(raw) {
            Ok(de) => de,
            Err(e) => panic!("dirent: corrupt entry: {}", e),
        }
    }

    fn encode(&self) -> [u8; DIRENT_SIZE] {
        let mut raw = [0; DIRENT_SIZE];
        if let Err(e) = bincode::serialize_into(&mut raw[..], self) {
            panic!("dirent: encode: {}", e);
        }
        raw
    }
}

/// Compare names the way they are stored: at most DIRSIZ bytes.
pub fn namecmp(a: &[u8], b: &[u8]) -> bool {
    a[..a.len().min(DIRSIZ)] == b[..b.len().min(DIRSIZ)]
}

impl Xv6Fs {
    fn read_dirent(&self, dp: &mut InodeGuard<'_>, off: u32) -> DirEnt {
        let mut raw = [0; DIRENT_SIZE];
        match self.readi(dp, &mut raw, off) {
            Ok(n) if n == DIRENT_SIZE => DirEnt::decode(&raw),
            _ => panic!("dirent: short read at {} of dir {}", off, dp.inum()),
        }
    }

    fn write_dirent(&self, tx: &Transaction<'_>, dp: &mut InodeGuard<'_>, off: u32, de: &DirEnt) {
        match self.writei(tx, dp, &de.encode(), off) {
            Ok(n) if n == DIRENT_SIZE => {}
            _ => panic!("dirent: short write at {} of dir {}", off, dp.inum()),
        }
    }

    /// Look for a directory entry in a directory.
    /// If found, return a reference to its inode and the byte offset of the entry.
    pub fn dirlookup(&self, dp: &mut InodeGuard<'_>, name: &[u8]) -> Option<(Inode, u32)> {
        if dp.kind() != FileKind::Directory {
            panic!("dirlookup not DIR");
        }

        for off in (0..dp.size).step_by(DIRENT_SIZE) {
            let de = self.read_dirent(dp, off);
            if de.inum == 0 {
                continue;
            }
            if namecmp(name, de.name()) {
                // entry matches path element
                return Some((self.iget(de.inum as u32), off));
            }
        }
        None
    }

    /// Write a new directory entry (name, inum) into the directory dp.
    pub fn dirlink(
        &self,
        tx: &Transaction<'_>,
        dp: &mut InodeGuard<'_>,
        name: &[u8],
        inum: u32,
    ) -> Result<()> {
        // Check that name is not present.
        if let Some((ip, _)) = self.dirlookup(dp, name) {
            self.iput(tx, ip);
            return Err(FsError::Exists);
        }

        // Look for an empty dirent, else append.
        let off = (0..dp.size)
            .step_by(DIRENT_SIZE)
            .find(|&off| self.read_dirent(dp, off).inum == 0)
            .unwrap_or(dp.size);

        self.write_dirent(tx, dp, off, &DirEnt::new(inum as u16, name));
        Ok(())
    }

    /// Clear the entry at `off`.
    pub fn dirunlink(&self, tx: &Transaction<'_>, dp: &mut InodeGuard<'_>, off: u32) {
        self.write_dirent(tx, dp, off, &DirEnt::default());
    }

    /// Is the directory dp empty except for "." and ".." ?
    pub fn is_dir_empty(&self, dp: &mut InodeGuard<'_>) -> bool {
        (2 * DIRENT_SIZE as u32..dp.size)
            .step_by(DIRENT_SIZE)
            .all(|off| self.read_dirent(dp, off).inum == 0)
    }

    /// Live entries of the directory dp, in on-disk order.
    pub fn dirents(&self, dp: &mut InodeGuard<'_>) -> Vec<DirEnt> {
        (0..dp.size)
            .step_by(DIRENT_SIZE)
            .map(|off| self.read_dirent(dp, off))
            .filter(|de| de.inum != 0)
            .collect()
    }
}
