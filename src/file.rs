//! Open files: an inode plus an offset and an access mode.
//!
//! Descriptors index one system-wide table with per-entry reference counts. `dup`
//! shares an entry, and the last `close` hands the inode back inside its own transaction.

use super::*;
use inode::{FileKind, Inode, Stat};

use std::sync::Mutex;

use bitflags::bitflags;
use log::{debug, trace};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const RDONLY = 0;
        const WRONLY = 0x1;
        const RDWR = 0x2;
        const CREATE = 0x200;
        const TRUNC = 0x400;
    }
}

impl OpenFlags {
    /// (readable, writable)
    pub fn access(self) -> (bool, bool) {
        let readable = !self.contains(OpenFlags::WRONLY);
        let writable = self.intersects(OpenFlags::WRONLY | OpenFlags::RDWR);
        (readable, writable)
    }
}

/// Blocks of file data one write chunk may cover when aligned.
///
/// A chunk straddling block boundaries touches one more data block than it covers, and
/// every data block may need its own bitmap block. On top of that one transaction may
/// write the inode, the indirect block and the indirect block's bitmap block.
pub const MAX_WRITE_BLOCKS: usize = (MAXOPBLOCKS - 3) / 2 - 1;

/// Bytes written per transaction by `write`.
pub const MAX_WRITE_BYTES: usize = MAX_WRITE_BLOCKS * BSIZE;

const _: () = assert!(MAX_WRITE_BLOCKS > 0);
const _: () = assert!(2 * (MAX_WRITE_BLOCKS + 1) + 3 <= MAXOPBLOCKS);

/// A file descriptor. Every descriptor must be given back with `close`.
#[derive(Debug, PartialEq, Eq)]
pub struct Fd(usize);

pub struct OpenFile {
    ip: Inode,
    readable: bool,
    writable: bool,
    off: u32,
}

pub struct FileTable {
    /// per-entry reference counts, 0 for a free entry
    refs: Mutex<Vec<u32>>,
    files: Vec<Mutex<Option<OpenFile>>>,
}

impl FileTable {
    pub fn new(nfile: usize) -> Self {
        Self {
            refs: Mutex::new(vec![0; nfile]),
            files: (0..nfile).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Allocate a table entry for `file`. A full table hands `file` back.
    fn alloc(&self, file: OpenFile) -> core::result::Result<Fd, OpenFile> {
        let mut refs = self.refs.lock().unwrap();
        let Some(idx) = refs.iter().position(|&r| r == 0) else {
            return Err(file);
        };
        refs[idx] = 1;
        *self.files[idx].lock().unwrap() = Some(file);
        trace!("filealloc: entry {}", idx);
        Ok(Fd(idx))
    }

    /// Increment ref count for the entry of `fd`.
    fn dup(&self, fd: &Fd) -> Fd {
        let mut refs = self.refs.lock().unwrap();
        if refs[fd.0] < 1 {
            drop(refs);
            panic!("filedup: entry {} not open", fd.0);
        }
        refs[fd.0] += 1;
        Fd(fd.0)
    }

    /// Decrement ref count; the file comes back once nothing refers to it.
    fn release(&self, fd: Fd) -> Option<OpenFile> {
        let mut refs = self.refs.lock().unwrap();
        if refs[fd.0] < 1 {
            drop(refs);
            panic!("fileclose: entry {} not open", fd.0);
        }
        refs[fd.0] -= 1;
        if refs[fd.0] > 0 {
            return None;
        }
        // taken under the table lock so the entry cannot be reallocated first
        self.files[fd.0].lock().unwrap().take()
    }

    /// # of entries in use.
    pub fn in_use(&self) -> usize {
        self.refs.lock().unwrap().iter().filter(|&&r| r > 0).count()
    }
}

impl Xv6Fs {
    /// Open `path`, creating a regular file first under `OpenFlags::CREATE`.
    pub fn open(&self, cwd: &Inode, path: &str, flags: OpenFlags) -> Result<Fd> {
        let tx = self.begin_op();

        let ip = if flags.contains(OpenFlags::CREATE) {
            self.create(&tx, cwd, path, FileKind::File, 0, 0)?
        } else {
            self.namei(&tx, cwd, path)?
        };

        let (readable, writable) = flags.access();
        let mut guard = self.ilock(&ip);
        match guard.kind() {
            FileKind::Directory if writable => {
                self.iunlockput(&tx, guard, ip);
                return Err(FsError::IsDir);
            }
            FileKind::Device if !(0..NDEV as i16).contains(&guard.major) => {
                let major = guard.major;
                self.iunlockput(&tx, guard, ip);
                return Err(FsError::NoDevice(major));
            }
            FileKind::File if flags.contains(OpenFlags::TRUNC) => self.itrunc(&tx, &mut guard),
            _ => {}
        }
        self.iunlock(guard);

        let file = OpenFile {
            ip,
            readable,
            writable,
            off: 0,
        };
        match self.ftable.alloc(file) {
            Ok(fd) => {
                debug!("open: {:?} as entry {}", path, fd.0);
                Ok(fd)
            }
            Err(file) => {
                self.iput(&tx, file.ip);
                Err(FsError::FileTableFull)
            }
        }
    }

    /// Another descriptor for the same open file, sharing its offset.
    pub fn dup(&self, fd: &Fd) -> Fd {
        self.ftable.dup(fd)
    }

    pub fn close(&self, fd: Fd) {
        if let Some(file) = self.ftable.release(fd) {
            let tx = self.begin_op();
            self.iput(&tx, file.ip);
        }
    }

    /// Read from the current offset, advancing it by the number of bytes read.
    pub fn read(&self, fd: &Fd, dst: &mut [u8]) -> Result<usize> {
        let mut slot = self.ftable.files[fd.0].lock().unwrap();
        let file = slot.as_mut().ok_or(FsError::Invalid)?;
        if !file.readable {
            return Err(FsError::NotReadable);
        }

        let mut guard = self.ilock(&file.ip);
        let n = self.readi(&mut guard, dst, file.off)?;
        if guard.kind() != FileKind::Device {
            file.off += n as u32;
        }
        Ok(n)
    }

    /// Write at the current offset, advancing it.
    ///
    /// Each chunk of at most `MAX_WRITE_BYTES` is its own transaction, so a large write is
    /// not atomic but never exceeds the log. A failure after some chunks succeeded reports
    /// the bytes written so far.
    pub fn write(&self, fd: &Fd, src: &[u8]) -> Result<usize> {
        let mut slot = self.ftable.files[fd.0].lock().unwrap();
        let file = slot.as_mut().ok_or(FsError::Invalid)?;
        if !file.writable {
            return Err(FsError::NotWritable);
        }

        let mut written = 0;
        while written < src.len() {
            let n1 = (src.len() - written).min(MAX_WRITE_BYTES);
            let tx = self.begin_op();
            let mut guard = self.ilock(&file.ip);
            let res = self.writei(&tx, &mut guard, &src[written..written + n1], file.off);
            let is_dev = guard.kind() == FileKind::Device;
            self.iunlock(guard);
            tx.end();

            match res {
                Ok(n) => {
                    if !is_dev {
                        file.off += n as u32;
                    }
                    written += n;
                    if n < n1 {
                        break;
                    }
                }
                Err(e) if written == 0 => return Err(e),
                Err(_) => break,
            }
        }
        Ok(written)
    }

    pub fn fstat(&self, fd: &Fd) -> Result<Stat> {
        let slot = self.ftable.files[fd.0].lock().unwrap();
        let file = slot.as_ref().ok_or(FsError::Invalid)?;
        let guard = self.ilock(&file.ip);
        Ok(self.stati(&guard))
    }
}
