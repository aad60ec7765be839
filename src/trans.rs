//! Simple logging that allows concurrent FS operations.
//!
//! A log transaction contains the updates of multiple FS operations.
//! The logging system only commits when there are no FS operations active.
//! Thus there is never any reasoning required about whether a commit might
//! write an uncommitted operation's updates to disk.
//!
//! An operation calls `begin_op()` to get a `Transaction` and ends it by dropping
//! it (or calling `end()`). Usually `begin_op()` just increments the count of
//! in-progress operations and returns. But if it thinks the log is close to
//! running out, it sleeps until the last outstanding `end_op()` commits.
//!
//! The log is a physical re-do log containing disk blocks.
//! The on-disk log format:
//!   header block, containing block #s for block A, B, C, ...
//!   block A
//!   block B
//!   block C
//!   ...
//! Log appends are synchronous.
//!
//! A typical use is:
//!   let tx = log.begin_op(&bcache);
//!   let mut bp = bcache.read(...);
//!   modify bp.data_mut()
//!   tx.write(&bp);
//!   bp.release();
//!   tx.end();

use super::*;
use buf::{Buf, BufCache};

use std::sync::{Condvar, Mutex};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

/// Contents of the header block on disk.
#[derive(Serialize, Deserialize)]
struct LogHeader {
    n: u32,
    block: [u32; LOGSIZE],
}

struct LogState {
    /// how many FS operations are executing
    outstanding: usize,
    /// in commit(), please wait
    committing: bool,
    /// home block numbers logged by the open transaction, in order of first write
    blocks: Vec<u32>,
}

pub struct Log {
    dev: u32,
    start: u32,
    size: u32,
    state: Mutex<LogState>,
    cv: Condvar,
}

/// An open FS operation. Dropping it ends the operation.
pub struct Transaction<'a> {
    log: &'a Log,
    bcache: &'a BufCache,
}

impl Log {
    /// Set up the log living in blocks `start..start + size` of `dev` and replay any
    /// committed transaction found there.
    pub fn new(dev: u32, start: u32, size: u32, bcache: &BufCache) -> Self {
        let log = Self {
            dev,
            start,
            size,
            state: Mutex::new(LogState {
                outstanding: 0,
                committing: false,
                blocks: Vec::with_capacity(LOGSIZE),
            }),
            cv: Condvar::new(),
        };
        assert!(
            log.capacity() >= MAXOPBLOCKS,
            "initlog: log of {} blocks cannot hold one operation",
            size
        );
        log.recover_from_log(bcache);
        log
    }

    /// Max # of blocks one transaction may log.
    pub fn capacity(&self) -> usize {
        Self::capacity_for(self.size)
    }

    /// Capacity of a log of `size` blocks, header included.
    pub fn capacity_for(size: u32) -> usize {
        LOGSIZE.min(size.saturating_sub(1) as usize)
    }

    /// # of distinct blocks logged by the open transaction.
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().blocks.len()
    }

    /// # of operations currently between begin_op and end_op.
    pub fn outstanding(&self) -> usize {
        self.state.lock().unwrap().outstanding
    }

    /// Read the log header from disk.
    fn read_head(&self, bcache: &BufCache) -> Vec<u32> {
        let buf = bcache.read(self.dev, self.start);
        let lh: LogHeader = buf.read_obj(0);
        buf.release();
        let n = lh.n as usize;
        if n > self.capacity() {
            panic!("read_head: corrupt log header ({} blocks)", n);
        }
        lh.block[..n].to_vec()
    }

    /// Write the given header to disk.
    /// With a non-empty list, this is the true point at which the current transaction commits.
    fn write_head(&self, bcache: &BufCache, blocks: &[u32]) {
        let mut lh = LogHeader {
            n: blocks.len() as u32,
            block: [0; LOGSIZE],
        };
        lh.block[..blocks.len()].copy_from_slice(blocks);

        let mut buf = bcache.read(self.dev, self.start);
        buf.write_obj(0, &lh);
        bcache.write(&mut buf);
        buf.release();
    }

    /// Copy committed blocks from log to their home location.
    fn install_trans(&self, bcache: &BufCache, blocks: &[u32]) {
        for (tail, &home) in blocks.iter().enumerate() {
            let lbuf = bcache.read(self.dev, self.start + tail as u32 + 1);
            let mut dbuf = bcache.read(self.dev, home);
            dbuf.data_mut().copy_from_slice(lbuf.data());
            // writing the home block also unpins it
            bcache.write(&mut dbuf);
            lbuf.release();
            dbuf.release();
        }
    }

    /// Copy modified blocks from cache to log.
    fn write_log(&self, bcache: &BufCache, blocks: &[u32]) {
        for (tail, &home) in blocks.iter().enumerate() {
            let mut to = bcache.read(self.dev, self.start + tail as u32 + 1);
            let from = bcache.read(self.dev, home);
            to.data_mut().copy_from_slice(from.data());
            bcache.write(&mut to);
            from.release();
            to.release();
        }
    }

    /// Replay a committed-but-not-installed transaction, then clear the header.
    /// Running it again finds an empty header and does nothing.
    pub fn recover_from_log(&self, bcache: &BufCache) {
        let blocks = self.read_head(bcache);
        if !blocks.is_empty() {
            info!("log: recovering {} committed blocks", blocks.len());
        }
        self.install_trans(bcache, &blocks);
        self.write_head(bcache, &[]);
    }

    fn commit(&self, bcache: &BufCache, blocks: &[u32]) {
        if blocks.is_empty() {
            return;
        }
        debug!("log: committing {} blocks", blocks.len());
        // Write modified blocks from cache to log.
        self.write_log(bcache, blocks);
        // Write header to disk -- the real commit.
        self.write_head(bcache, blocks);
        // Now install writes to home locations.
        self.install_trans(bcache, blocks);
        // Erase the transaction from the log.
        self.write_head(bcache, &[]);
    }

    /// Called at the start of each FS operation.
    pub fn begin_op<'a>(&'a self, bcache: &'a BufCache) -> Transaction<'a> {
        let mut st = self.state.lock().unwrap();
        // this op might exhaust log space; wait for commit
        while st.committing || st.blocks.len() + (st.outstanding + 1) * MAXOPBLOCKS > self.capacity()
        {
            st = self.cv.wait(st).unwrap();
        }
        st.outstanding += 1;
        Transaction { log: self, bcache }
    }

    /// Called at the end of each FS operation.
    /// Commits if this was the last outstanding operation.
    pub fn end_op(&self, bcache: &BufCache) {
        let mut st = self.state.lock().unwrap();
        if st.committing {
            drop(st);
            panic!("end_op: log is committing");
        }
        st.outstanding -= 1;

        if st.outstanding == 0 {
            // No operation is open and `committing` keeps new ones out even after the
            // lock is released, so the header can be snapshotted and written without it.
            st.committing = true;
            let blocks = st.blocks.clone();
            drop(st);

            self.commit(bcache, &blocks);

            let mut st = self.state.lock().unwrap();
            st.blocks.clear();
            st.committing = false;
        }

        // begin_op() may be waiting for log space, and decrementing outstanding has
        // decreased the amount of reserved space.
        self.cv.notify_all();
    }

    /// Caller has modified `b` and is done with it.
    /// Record the block number and pin it in the cache.
    /// commit()/write_log() will do the disk write.
    pub fn log_write(&self, bcache: &BufCache, b: &Buf<'_>) {
        assert_eq!(b.dev(), self.dev, "log_write: block of another device");
        let blockno = b.blockno();
        let mut st = self.state.lock().unwrap();
        if st.outstanding < 1 {
            drop(st);
            panic!("log_write: outside of trans");
        }
        if st.blocks.contains(&blockno) {
            trace!("log: absorbed block {}", blockno);
        } else {
            if st.blocks.len() >= self.capacity() {
                drop(st);
                panic!("log_write: too big a transaction");
            }
            st.blocks.push(blockno);
            // prevent eviction
            bcache.pin(b);
        }
    }
}

impl<'a> Transaction<'a> {
    /// Log a modified buffer in place of writing it.
    pub fn write(&self, b: &Buf<'_>) {
        self.log.log_write(self.bcache, b);
    }

    pub fn bcache(&self) -> &'a BufCache {
        self.bcache
    }

    /// End the operation; the last one to end commits.
    pub fn end(self) {
        drop(self);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // A panic halts the storage stack; half an operation must never be committed.
        if std::thread::panicking() {
            return;
        }
        self.log.end_op(self.bcache);
    }
}
