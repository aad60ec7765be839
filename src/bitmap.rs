//! Free-block bitmap: one bit per disk block, set when the block is in use.

use super::*;
use trans::Transaction;

use log::debug;

impl Xv6Fs {
    /// Zero a block.
    fn bzero(&self, tx: &Transaction<'_>, bno: u32) {
        let mut bp = self.bcache.read(self.dev, bno);
        bp.data_mut().fill(0);
        tx.write(&bp);
        bp.release();
    }

    /// Allocate a zeroed disk block.
    ///
    /// # warning
    /// should be enveloped by begin_op() and end_op()
    pub fn balloc(&self, tx: &Transaction<'_>) -> u32 {
        let size = self.sb.size as usize;
        let first = self.sb.data_start() as usize;
        // bitmap block holding the bit of the first data block
        let mut base = first - first % BPB;
        while base < size {
            let mut bp = self.bcache.read(self.dev, self.sb.bblock(base as u32));
            let lo = first.max(base) - base;
            let hi = BPB.min(size - base);
            for bi in lo..hi {
                let m = 1 << (bi % 8);
                if bp.data()[bi / 8] & m == 0 {
                    // Is block free?
                    bp.data_mut()[bi / 8] |= m; // Mark block in use.
                    tx.write(&bp);
                    bp.release();
                    let bno = (base + bi) as u32;
                    self.bzero(tx, bno);
                    debug!("balloc: block {}", bno);
                    return bno;
                }
            }
            bp.release();
            base += BPB;
        }
        panic!("balloc: out of blocks");
    }

    /// Free a disk block.
    ///
    /// # warning
    /// should be enveloped by begin_op() and end_op()
    pub fn bfree(&self, tx: &Transaction<'_>, bno: u32) {
        let mut bp = self.bcache.read(self.dev, self.sb.bblock(bno));
        let bi = bno as usize % BPB;
        let m = 1 << (bi % 8);
        if bp.data()[bi / 8] & m == 0 {
            bp.release();
            panic!("bfree: freeing free block {}", bno);
        }
        bp.data_mut()[bi / 8] &= !m;
        tx.write(&bp);
        bp.release();
        debug!("bfree: block {}", bno);
    }

    /// Whether the bitmap marks `bno` as in use.
    pub fn block_in_use(&self, bno: u32) -> bool {
        let bp = self.bcache.read(self.dev, self.sb.bblock(bno));
        let bi = bno as usize % BPB;
        let used = bp.data()[bi / 8] & (1 << (bi % 8)) != 0;
        bp.release();
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xv6fs::tests::scratch_fs;

    fn bitmap_image(fs: &Xv6Fs) -> Vec<u8> {
        let bp = fs.bcache.read(fs.dev, fs.sb.bmapstart);
        let image = bp.data().to_vec();
        bp.release();
        image
    }

    #[test]
    fn alloc_then_free_restores_bitmap() {
        let (fs, _) = scratch_fs();
        let before = bitmap_image(&fs);

        let tx = fs.begin_op();
        let bno = fs.balloc(&tx);
        assert!(bno >= fs.sb.data_start());
        assert!(fs.block_in_use(bno));
        fs.bfree(&tx, bno);
        tx.end();

        assert!(!fs.block_in_use(bno));
        assert_eq!(bitmap_image(&fs), before);
    }

    #[test]
    fn allocations_are_distinct_and_zeroed() {
        let (fs, _) = scratch_fs();
        let tx = fs.begin_op();
        let a = fs.balloc(&tx);
        let mut bp = fs.bcache.read(fs.dev, a);
        bp.data_mut().fill(0xee);
        tx.write(&bp);
        bp.release();
        fs.bfree(&tx, a);
        let b = fs.balloc(&tx);
        let c = fs.balloc(&tx);
        assert_eq!(a, b);
        assert_ne!(b, c);
        let bp = fs.bcache.read(fs.dev, b);
        assert!(bp.data().iter().all(|&x| x == 0));
        bp.release();
        tx.end();
    }

    #[test]
    #[should_panic(expected = "balloc: out of blocks")]
    fn full_bitmap_is_fatal() {
        let (fs, _) = scratch_fs();
        // mark every block in use behind the log's back
        let mut bp = fs.bcache.read(fs.dev, fs.sb.bmapstart);
        bp.data_mut().fill(0xff);
        fs.bcache.write(&mut bp);
        bp.release();

        let tx = fs.begin_op();
        fs.balloc(&tx);
    }

    #[test]
    #[should_panic(expected = "bfree: freeing free block")]
    fn double_free_is_fatal() {
        let (fs, _) = scratch_fs();
        let tx = fs.begin_op();
        let bno = fs.balloc(&tx);
        fs.bfree(&tx, bno);
        fs.bfree(&tx, bno);
    }
}
