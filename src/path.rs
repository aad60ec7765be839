//! Path names: element decomposition and lookup.

use super::*;
use inode::{FileKind, Inode};
use trans::Transaction;

/// Returns `Some((name, path))` where,
///  - `name` is the next path element from `path`, truncated to DIRSIZ bytes, and
///  - `path` is the remaining path.
///
/// The returned path has no leading slashes, so the caller can check `path.is_empty()` to
/// see if the name is the last one.
///
/// If no name to remove, returns `None`.
///
/// ```
/// use xv6fs::path::skipelem;
///
/// assert_eq!(skipelem(b"a/bb/c"), Some((&b"a"[..], &b"bb/c"[..])));
/// assert_eq!(skipelem(b"///a//bb"), Some((&b"a"[..], &b"bb"[..])));
/// assert_eq!(skipelem(b"a"), Some((&b"a"[..], &b""[..])));
/// assert_eq!(skipelem(b""), None);
/// assert_eq!(skipelem(b"////"), None);
/// ```
pub fn skipelem(path: &[u8]) -> Option<(&[u8], &[u8])> {
    let name_start = path.iter().position(|ch| *ch != b'/')?;
    let path = &path[name_start..];

    let len = path.iter().position(|ch| *ch == b'/').unwrap_or(path.len());
    let name = &path[..len.min(DIRSIZ)];

    let path = &path[len..];
    let next_start = path.iter().position(|ch| *ch != b'/').unwrap_or(path.len());
    Some((name, &path[next_start..]))
}

/// All elements of `path`, in order.
pub fn elements(mut path: &[u8]) -> impl Iterator<Item = &[u8]> {
    core::iter::from_fn(move || {
        let (name, rest) = skipelem(path)?;
        path = rest;
        Some(name)
    })
}

impl Xv6Fs {
    /// Look up and return the inode for a path name.
    /// If parent is set, return the inode for the parent and the final path element.
    /// Must be called inside a transaction since it calls iput().
    fn namex<'p>(
        &self,
        tx: &Transaction<'_>,
        cwd: &Inode,
        path: &'p str,
        parent: bool,
    ) -> Result<(Inode, Option<&'p [u8]>)> {
        let mut path = path.as_bytes();
        let mut ip = if path.first() == Some(&b'/') {
            self.iget(ROOTINO)
        } else {
            self.idup(cwd)
        };

        while let Some((name, rest)) = skipelem(path) {
            path = rest;

            let mut guard = self.ilock(&ip);
            if guard.kind() != FileKind::Directory {
                self.iunlockput(tx, guard, ip);
                return Err(FsError::NotDir);
            }
            if parent && path.is_empty() {
                // Stop one level early.
                self.iunlock(guard);
                return Ok((ip, Some(name)));
            }
            let next = self.dirlookup(&mut guard, name);
            self.iunlockput(tx, guard, ip);
            match next {
                Some((next, _)) => ip = next,
                None => return Err(FsError::NotFound),
            }
        }

        if parent {
            // no final element to hand back
            self.iput(tx, ip);
            return Err(FsError::NotFound);
        }
        Ok((ip, None))
    }

    /// Inode named by `path`, relative to `cwd` unless absolute.
    pub fn namei(&self, tx: &Transaction<'_>, cwd: &Inode, path: &str) -> Result<Inode> {
        let (ip, _) = self.namex(tx, cwd, path, false)?;
        Ok(ip)
    }

    /// Parent directory of the final element of `path`, plus that element uninterpreted.
    pub fn nameiparent<'p>(
        &self,
        tx: &Transaction<'_>,
        cwd: &Inode,
        path: &'p str,
    ) -> Result<(Inode, &'p [u8])> {
        match self.namex(tx, cwd, path, true)? {
            (ip, Some(name)) => Ok((ip, name)),
            (ip, None) => {
                self.iput(tx, ip);
                Err(FsError::NotFound)
            }
        }
    }
}
