//! Name-space operations built from the inode, directory and path layers.
//! Each public operation runs in a transaction of its own.

use super::*;
use dir::{namecmp, DirEnt};
use inode::{FileKind, Inode, Stat};
use trans::Transaction;

use log::debug;

impl Xv6Fs {
    /// Create `path` as an inode of type `kind` and return it unlocked.
    ///
    /// Asking for a regular file that already exists returns the existing file (or device).
    /// Any other existing name is an error.
    pub fn create(
        &self,
        tx: &Transaction<'_>,
        cwd: &Inode,
        path: &str,
        kind: FileKind,
        major: i16,
        minor: i16,
    ) -> Result<Inode> {
        let (dp, name) = self.nameiparent(tx, cwd, path)?;
        let mut dguard = self.ilock(&dp);

        if let Some((ip, _)) = self.dirlookup(&mut dguard, name) {
            self.iunlockput(tx, dguard, dp);
            let guard = self.ilock(&ip);
            if kind == FileKind::File && matches!(guard.kind(), FileKind::File | FileKind::Device)
            {
                self.iunlock(guard);
                return Ok(ip);
            }
            self.iunlockput(tx, guard, ip);
            return Err(FsError::Exists);
        }

        let ip = self.ialloc(tx, kind);
        let mut guard = self.ilock(&ip);
        guard.major = major;
        guard.minor = minor;
        guard.nlink = 1;
        self.iupdate(tx, &guard);

        if kind == FileKind::Directory {
            // No nlink++ for ".": avoid cyclic ref count.
            if self.dirlink(tx, &mut guard, b".", ip.inum()).is_err()
                || self.dirlink(tx, &mut guard, b"..", dp.inum()).is_err()
            {
                panic!("create: dots");
            }
            // for ".."
            dguard.nlink += 1;
            self.iupdate(tx, &dguard);
        }

        if self.dirlink(tx, &mut dguard, name, ip.inum()).is_err() {
            panic!("create: dirlink");
        }
        debug!("create: {:?} as inode {} ({:?})", path, ip.inum(), kind);

        self.iunlock(guard);
        self.iunlockput(tx, dguard, dp);
        Ok(ip)
    }

    pub fn mkdir(&self, cwd: &Inode, path: &str) -> Result<()> {
        let tx = self.begin_op();
        let ip = self.create(&tx, cwd, path, FileKind::Directory, 0, 0)?;
        self.iput(&tx, ip);
        Ok(())
    }

    /// Create a device inode served by the handler registered for `major`.
    pub fn mknod(&self, cwd: &Inode, path: &str, major: i16, minor: i16) -> Result<()> {
        let tx = self.begin_op();
        let ip = self.create(&tx, cwd, path, FileKind::Device, major, minor)?;
        self.iput(&tx, ip);
        Ok(())
    }

    /// Create the path `new` as a link to the same inode as `old`.
    pub fn link(&self, cwd: &Inode, old: &str, new: &str) -> Result<()> {
        let tx = self.begin_op();
        let ip = self.namei(&tx, cwd, old)?;

        let mut guard = self.ilock(&ip);
        if guard.kind() == FileKind::Directory {
            self.iunlockput(&tx, guard, ip);
            return Err(FsError::IsDir);
        }
        guard.nlink += 1;
        self.iupdate(&tx, &guard);
        self.iunlock(guard);

        if let Err(e) = self.link_into(&tx, cwd, new, &ip) {
            let mut guard = self.ilock(&ip);
            guard.nlink -= 1;
            self.iupdate(&tx, &guard);
            self.iunlockput(&tx, guard, ip);
            return Err(e);
        }

        self.iput(&tx, ip);
        Ok(())
    }

    fn link_into(&self, tx: &Transaction<'_>, cwd: &Inode, new: &str, ip: &Inode) -> Result<()> {
        let (dp, name) = self.nameiparent(tx, cwd, new)?;
        let mut dguard = self.ilock(&dp);
        let res = self.dirlink(tx, &mut dguard, name, ip.inum());
        self.iunlockput(tx, dguard, dp);
        res
    }

    /// Remove the directory entry `path`. The inode itself is freed by the last `iput`
    /// once no link and no reference remains.
    pub fn unlink(&self, cwd: &Inode, path: &str) -> Result<()> {
        let tx = self.begin_op();
        let (dp, name) = self.nameiparent(&tx, cwd, path)?;
        let mut dguard = self.ilock(&dp);

        // Cannot unlink "." or "..".
        if namecmp(name, b".") || namecmp(name, b"..") {
            self.iunlockput(&tx, dguard, dp);
            return Err(FsError::Invalid);
        }

        let Some((ip, off)) = self.dirlookup(&mut dguard, name) else {
            self.iunlockput(&tx, dguard, dp);
            return Err(FsError::NotFound);
        };
        let mut guard = self.ilock(&ip);

        if guard.nlink < 1 {
            panic!("unlink: nlink < 1");
        }
        let is_dir = guard.kind() == FileKind::Directory;
        if is_dir && !self.is_dir_empty(&mut guard) {
            self.iunlockput(&tx, guard, ip);
            self.iunlockput(&tx, dguard, dp);
            return Err(FsError::NotEmpty);
        }

        self.dirunlink(&tx, &mut dguard, off);
        if is_dir {
            // the ".." of the removed directory
            dguard.nlink -= 1;
            self.iupdate(&tx, &dguard);
        }
        self.iunlockput(&tx, dguard, dp);

        guard.nlink -= 1;
        self.iupdate(&tx, &guard);
        debug!("unlink: {:?} (inode {} nlink {})", path, ip.inum(), guard.nlink);
        self.iunlockput(&tx, guard, ip);
        Ok(())
    }

    /// Live entries of the directory `path`.
    pub fn readdir(&self, cwd: &Inode, path: &str) -> Result<Vec<DirEnt>> {
        let tx = self.begin_op();
        let ip = self.namei(&tx, cwd, path)?;
        let mut guard = self.ilock(&ip);
        if guard.kind() != FileKind::Directory {
            self.iunlockput(&tx, guard, ip);
            return Err(FsError::NotDir);
        }
        let entries = self.dirents(&mut guard);
        self.iunlockput(&tx, guard, ip);
        Ok(entries)
    }

    pub fn stat(&self, cwd: &Inode, path: &str) -> Result<Stat> {
        let tx = self.begin_op();
        let ip = self.namei(&tx, cwd, path)?;
        let guard = self.ilock(&ip);
        let st = self.stati(&guard);
        self.iunlockput(&tx, guard, ip);
        Ok(st)
    }
}
