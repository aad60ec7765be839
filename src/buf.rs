//! Buffer cache.
//!
//! The buffer cache is a fixed pool of slots holding cached copies of disk block contents.
//! Caching disk blocks in memory reduces the number of disk reads and also provides a
//! synchronization point for disk blocks used by multiple threads.
//!
//! Interface:
//! * To get a buffer for a particular disk block, call `read`.
//! * After changing buffer data, call `write` to write it to disk (or hand it to the log).
//! * When done with the buffer, call `release` (or drop it).
//! * Only one thread at a time can hold a buffer, so do not keep them longer than necessary.

use super::*;
use blk_dev::BlockDevice;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::trace;
use serde::{de::DeserializeOwned, Serialize};

pub type BufData = [u8; BSIZE];

struct BufMeta {
    /// (dev, blockno) this slot currently caches
    key: Option<(u32, u32)>,
    refcnt: u32,
    /// has data been read from disk?
    valid: bool,
    /// modified in memory and logged but not yet installed; must not be recycled
    dirty: bool,
}

struct Lru {
    meta: Vec<BufMeta>,
    /// slot indices, most recently released first
    order: VecDeque<usize>,
}

pub struct BufCache {
    devices: RwLock<HashMap<u32, Arc<dyn BlockDevice>>>,
    /// protects identity, reference counts and flags of every slot
    lru: Mutex<Lru>,
    /// per-slot exclusive lock, held across device I/O
    bufs: Vec<Mutex<Box<BufData>>>,
}

/// A locked buffer. Dropping it releases both the lock and the reference.
pub struct Buf<'a> {
    cache: &'a BufCache,
    idx: usize,
    dev: u32,
    blockno: u32,
    data: Option<MutexGuard<'a, Box<BufData>>>,
}

impl BufCache {
    pub fn new(nbuf: usize) -> Self {
        assert!(nbuf > 0, "binit: empty buffer cache");
        let meta = (0..nbuf)
            .map(|_| BufMeta {
                key: None,
                refcnt: 0,
                valid: false,
                dirty: false,
            })
            .collect();
        Self {
            devices: RwLock::new(HashMap::new()),
            lru: Mutex::new(Lru {
                meta,
                order: (0..nbuf).collect(),
            }),
            bufs: (0..nbuf).map(|_| Mutex::new(Box::new([0; BSIZE]))).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.bufs.len()
    }

    /// Make `disk` reachable as device `dev`.
    pub fn attach(&self, dev: u32, disk: Arc<dyn BlockDevice>) {
        self.devices.write().unwrap().insert(dev, disk);
    }

    fn device(&self, dev: u32) -> Arc<dyn BlockDevice> {
        match self.devices.read().unwrap().get(&dev) {
            Some(disk) => Arc::clone(disk),
            None => panic!("bio: no device {}", dev),
        }
    }

    /// Look through the cache for block `blockno` on device `dev`.
    /// If not found, recycle the least recently used unreferenced clean slot.
    /// In either case, return a locked buffer.
    pub fn get(&self, dev: u32, blockno: u32) -> Buf<'_> {
        let found = {
            let mut lru = self.lru.lock().unwrap();
            if let Some(idx) = lru.meta.iter().position(|m| m.key == Some((dev, blockno))) {
                trace!("bget: hit dev {} block {} in slot {}", dev, blockno, idx);
                lru.meta[idx].refcnt += 1;
                Some(idx)
            } else {
                // Not cached; scan from the stale end.
                let Lru { meta, order } = &mut *lru;
                let victim = order
                    .iter()
                    .rev()
                    .copied()
                    .find(|&i| meta[i].refcnt == 0 && !meta[i].dirty);
                if let Some(idx) = victim {
                    trace!("bget: miss dev {} block {}, recycling slot {}", dev, blockno, idx);
                    let m = &mut meta[idx];
                    m.key = Some((dev, blockno));
                    m.valid = false;
                    m.refcnt = 1;
                }
                victim
            }
        };
        let Some(idx) = found else {
            panic!("bget: no buffers");
        };

        // The slot lock is taken without holding the table lock, so waiting for another
        // holder never blocks the rest of the cache.
        let data = self.bufs[idx].lock().unwrap();
        Buf {
            cache: self,
            idx,
            dev,
            blockno,
            data: Some(data),
        }
    }

    /// Return a locked buf with the contents of the indicated block.
    pub fn read(&self, dev: u32, blockno: u32) -> Buf<'_> {
        let mut b = self.get(dev, blockno);
        if !self.lru.lock().unwrap().meta[b.idx].valid {
            self.device(dev).read_block(blockno as usize, &mut b.data_mut()[..]);
            self.lru.lock().unwrap().meta[b.idx].valid = true;
        }
        b
    }

    /// Write b's contents to disk. The caller holds the buffer, so its lock is held.
    /// Once the device has the contents the slot is clean again.
    pub fn write(&self, b: &mut Buf<'_>) {
        assert!(core::ptr::eq(self, b.cache), "bwrite: foreign buffer");
        self.lru.lock().unwrap().meta[b.idx].dirty = true;
        self.device(b.dev).write_block(b.blockno as usize, &b.data()[..]);
        self.lru.lock().unwrap().meta[b.idx].dirty = false;
    }

    /// Mark the block as modified-but-not-installed so it cannot be recycled before commit.
    pub fn pin(&self, b: &Buf<'_>) {
        self.lru.lock().unwrap().meta[b.idx].dirty = true;
    }

    /// Release a locked buffer. Equivalent to dropping it.
    pub fn release(&self, b: Buf<'_>) {
        drop(b);
    }

    fn release_slot(&self, idx: usize) {
        let mut lru = self.lru.lock().unwrap();
        let m = &mut lru.meta[idx];
        assert!(m.refcnt > 0, "brelse: refcnt underflow");
        m.refcnt -= 1;
        if m.refcnt == 0 {
            // no one is waiting for it; keep it warm
            if let Some(pos) = lru.order.iter().position(|&i| i == idx) {
                lru.order.remove(pos);
            }
            lru.order.push_front(idx);
        }
    }

    /// Number of unreleased holders of a cached block, `None` if it is not cached.
    pub fn holders(&self, dev: u32, blockno: u32) -> Option<u32> {
        let lru = self.lru.lock().unwrap();
        lru.meta
            .iter()
            .find(|m| m.key == Some((dev, blockno)))
            .map(|m| m.refcnt)
    }

    /// Whether the block is pinned by the log.
    pub fn is_pinned(&self, dev: u32, blockno: u32) -> bool {
        let lru = self.lru.lock().unwrap();
        lru.meta
            .iter()
            .any(|m| m.key == Some((dev, blockno)) && m.dirty)
    }
}

impl<'a> Buf<'a> {
    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn blockno(&self) -> u32 {
        self.blockno
    }

    /// Slot the block is cached in; two holders of one block see the same slot.
    pub fn slot(&self) -> usize {
        self.idx
    }

    pub fn data(&self) -> &BufData {
        self.data.as_ref().expect("buf: released")
    }

    pub fn data_mut(&mut self) -> &mut BufData {
        self.data.as_mut().expect("buf: released")
    }

    /// Decode an on-disk record stored at `offset`.
    pub fn read_obj<T: DeserializeOwned>(&self, offset: usize) -> T {
        match bincode::deserialize(&self.data()[offset..]) {
            Ok(obj) => obj,
            Err(e) => panic!("buf: corrupt record in block {}: {}", self.blockno, e),
        }
    }

    /// Encode an on-disk record at `offset`.
    pub fn write_obj<T: Serialize>(&mut self, offset: usize, obj: &T) {
        let blockno = self.blockno;
        if let Err(e) = bincode::serialize_into(&mut self.data_mut()[offset..], obj) {
            panic!("buf: record does not fit in block {}: {}", blockno, e);
        }
    }

    /// Release the lock and the reference.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Buf<'_> {
    fn drop(&mut self) {
        // unlock before giving up the reference
        drop(self.data.take());
        self.cache.release_slot(self.idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blk_dev::RamDisk;

    fn cache(nbuf: usize) -> (BufCache, Arc<RamDisk>) {
        let disk = Arc::new(RamDisk::new(64));
        let bcache = BufCache::new(nbuf);
        bcache.attach(1, disk.clone());
        (bcache, disk)
    }

    #[test]
    fn same_block_same_slot() {
        let (bcache, _) = cache(4);
        let a = bcache.read(1, 7);
        let slot = a.slot();
        assert_eq!(bcache.holders(1, 7), Some(1));
        // a second holder has to wait for the lock, so hand it over via a thread
        std::thread::scope(|s| {
            let h = s.spawn(|| {
                let b = bcache.read(1, 7);
                b.slot()
            });
            while bcache.holders(1, 7) != Some(2) {
                std::thread::yield_now();
            }
            a.release();
            assert_eq!(h.join().unwrap(), slot);
        });
        assert_eq!(bcache.holders(1, 7), Some(0));
    }

    #[test]
    fn write_reaches_device() {
        let (bcache, disk) = cache(2);
        let mut b = bcache.read(1, 3);
        b.data_mut()[0] = 0xab;
        bcache.write(&mut b);
        b.release();
        let mut raw = [0u8; BSIZE];
        disk.read_block(3, &mut raw);
        assert_eq!(raw[0], 0xab);
        assert!(!bcache.is_pinned(1, 3));
    }

    #[test]
    fn recycles_least_recently_released() {
        let (bcache, _) = cache(3);
        for blockno in [10, 11, 12] {
            bcache.read(1, blockno).release();
        }
        // 10 was released longest ago
        bcache.read(1, 13).release();
        assert_eq!(bcache.holders(1, 10), None);
        assert!(bcache.holders(1, 11).is_some());
        assert!(bcache.holders(1, 12).is_some());

        // touching 11 makes 12 the stalest
        bcache.read(1, 11).release();
        bcache.read(1, 14).release();
        assert_eq!(bcache.holders(1, 12), None);
        assert!(bcache.holders(1, 11).is_some());
    }

    #[test]
    fn held_and_pinned_blocks_stay() {
        let (bcache, _) = cache(3);
        let held = bcache.read(1, 1);
        let pinned = bcache.read(1, 2);
        bcache.pin(&pinned);
        pinned.release();
        bcache.read(1, 3).release();
        bcache.read(1, 4).release();
        assert_eq!(bcache.holders(1, 1), Some(1));
        assert_eq!(bcache.holders(1, 2), Some(0));
        assert_eq!(bcache.holders(1, 3), None);
        held.release();
    }

    #[test]
    #[should_panic(expected = "bget: no buffers")]
    fn exhaustion_is_fatal() {
        let (bcache, _) = cache(2);
        let _a = bcache.read(1, 1);
        let _b = bcache.read(1, 2);
        let _c = bcache.read(1, 3);
    }
}
