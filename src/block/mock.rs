//! 测试用内存块设备

use super::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::types::BlockId;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// 内存块设备
///
/// 未写过的块读出来全为 0。记录每个块的物理读次数，
/// 可以注入读错误。
pub(crate) struct MockDevice {
    block_size: usize,
    storage: Mutex<BTreeMap<BlockId, Vec<u8>>>,
    reads_per_block: Mutex<BTreeMap<BlockId, u64>>,
    reads: AtomicU64,
    writes: AtomicU64,
    fail_reads: AtomicBool,
}

impl MockDevice {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            block_size,
            storage: Mutex::new(BTreeMap::new()),
            reads_per_block: Mutex::new(BTreeMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// 直接写入设备内容（不经过缓存）
    pub(crate) fn preload(&self, dev: u32, blockno: u32, fill: u8) {
        let data = alloc::vec![fill; self.block_size];
        self.storage.lock().unwrap().insert(BlockId::new(dev, blockno), data);
    }

    /// 直接读取设备内容（不经过缓存）
    pub(crate) fn contents(&self, dev: u32, blockno: u32) -> Vec<u8> {
        self.storage
            .lock()
            .unwrap()
            .get(&BlockId::new(dev, blockno))
            .cloned()
            .unwrap_or_else(|| alloc::vec![0u8; self.block_size])
    }

    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn reads_of(&self, dev: u32, blockno: u32) -> u64 {
        self.reads_per_block
            .lock()
            .unwrap()
            .get(&BlockId::new(dev, blockno))
            .copied()
            .unwrap_or(0)
    }
}

impl BlockDevice for MockDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }
        let id = BlockId::new(dev, blockno);
        match self.storage.lock().unwrap().get(&id) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        *self.reads_per_block.lock().unwrap().entry(id).or_insert(0) += 1;
        Ok(())
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        self.storage
            .lock()
            .unwrap()
            .insert(BlockId::new(dev, blockno), buf.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
