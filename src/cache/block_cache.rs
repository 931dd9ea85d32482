//! 块缓存实现（分片 + 引用计数 + 分片内释放顺序）
//!
//! # 结构
//!
//! ```text
//! struct BufferCache {
//!     slots:  [Slot; nbuf],            // 数据 + valid + 睡眠锁
//!     shards: [Mutex<Bucket>; nbuckets], // 每个分片一把自旋锁
//!     device: D,
//!     ...
//! }
//! ```
//!
//! 块 `(dev, blockno)` 属于分片 `blockno % nbuckets`。查找只锁目标分片；
//! 未命中时按分片下标升序扫描所有分片寻找空闲槽位，每一步同时锁住
//! 被扫描分片与目标分片（升序加锁，至多两把），在两把锁下完成迁移。
//! 因此"查找-插入"对目标分片是原子的，同一个块不会被分配到两个槽位。
//!
//! 释放顺序只在分片内部维护；跨分片取第一个找到的空闲槽位，没有全局顺序。

use super::buffer::{Buf, Slot};
use super::shard::{Bucket, ShardPair, Tag};
use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::lock::SleepLock;
use crate::types::{BlockId, CacheConfig};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::Mutex;

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 总查找次数（read + get_noread）
    pub lookups: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数（每次未命中都回收了一个空闲槽位）
    pub misses: u64,
    /// 跨分片迁移次数
    pub relocations: u64,
    /// 设备读次数
    pub device_reads: u64,
    /// 设备写次数
    pub device_writes: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Default)]
struct StatCounters {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    relocations: AtomicU64,
    device_reads: AtomicU64,
    device_writes: AtomicU64,
}

impl StatCounters {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            relocations: self.relocations.load(Ordering::Relaxed),
            device_reads: self.device_reads.load(Ordering::Relaxed),
            device_writes: self.device_writes.load(Ordering::Relaxed),
        }
    }
}

/// 分片中一个槽位的快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// 槽位下标
    pub index: usize,
    /// 当前代表的块，`None` 表示从未分配过
    pub id: Option<BlockId>,
    /// 引用计数
    pub refcnt: u32,
}

/// 未命中时跨分片扫描的结果
enum Claim {
    /// 扫描期间其他线程已装入同一个块
    Hit(usize),
    /// 回收了一个空闲槽位
    Evicted { index: usize, from: usize },
}

/// 块缓存
///
/// 固定大小的缓存池，初始化后不再增长。所有方法接收 `&self`，
/// 可以在多个线程间共享（`&'static`、`Arc` 或 [`CacheCell`]）。
///
/// # 示例
///
/// ```rust,ignore
/// let cache = BufferCache::<_, StdSleepLock>::new(CacheConfig::default(), disk)?;
///
/// let mut buf = cache.read(1, 42)?;
/// buf.data_mut()?[0] = 0x42;
/// buf.write()?;
/// buf.release()?;
/// ```
///
/// [`CacheCell`]: crate::global::CacheCell
pub struct BufferCache<D: BlockDevice, L: SleepLock> {
    config: CacheConfig,
    device: D,
    slots: Box<[Slot<L>]>,
    shards: Box<[Mutex<Bucket>]>,
    stats: StatCounters,
    /// 发生致命错误后置位，之后所有操作都返回 `Poisoned`
    poisoned: AtomicBool,
}

impl<D: BlockDevice, L: SleepLock> BufferCache<D, L> {
    /// 创建块缓存
    ///
    /// 对应 xv6 的 `binit`。槽位 `i` 初始放在分片 `i % nbuckets` 的末尾。
    ///
    /// # 参数
    ///
    /// * `config` - 缓存池配置
    /// * `device` - 底层块设备，块大小必须与配置一致
    pub fn new(config: CacheConfig, device: D) -> Result<Self> {
        config.validate()?;
        if device.block_size() != config.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device block size does not match cache block size",
            ));
        }

        let slots: Vec<Slot<L>> = (0..config.nbuf).map(|_| Slot::new(config.block_size)).collect();

        let mut buckets: Vec<Bucket> = (0..config.nbuckets).map(|_| Bucket::new(config.nbuf)).collect();
        for index in 0..config.nbuf {
            buckets[index % config.nbuckets].push_back(index, Tag::unassigned());
        }
        let shards: Vec<Mutex<Bucket>> = buckets.into_iter().map(Mutex::new).collect();

        log::debug!(
            "[BCACHE] init: {} buffers, {} shards, block_size={}",
            config.nbuf,
            config.nbuckets,
            config.block_size
        );

        Ok(Self {
            config,
            device,
            slots: slots.into_boxed_slice(),
            shards: shards.into_boxed_slice(),
            stats: StatCounters::default(),
            poisoned: AtomicBool::new(false),
        })
    }

    // ===== 公共接口 =====

    /// 读取块
    ///
    /// 对应 xv6 的 `bread`。返回持有睡眠锁、数据有效的缓存块。
    /// 数据无效时同步从设备读取；读取失败时缓存块被释放（保持无效），
    /// 设备错误原样返回。
    ///
    /// # 错误
    ///
    /// - `Io`：设备读取失败
    /// - `NoBuffers`：缓存池中没有空闲槽位（致命）
    /// - `Poisoned`：缓存已因致命错误不可用
    pub fn read(&self, dev: u32, blockno: u32) -> Result<Buf<'_, D, L>> {
        let buf = self.get(BlockId::new(dev, blockno))?;
        let slot = self.slot(buf.index());

        // SAFETY: get 返回时当前线程持有睡眠锁
        if !unsafe { slot.is_valid() } {
            let id = buf.block_id();
            log::debug!("[BCACHE] read {} from device into buffer {}", id, buf.index());
            // SAFETY: 同上
            let filled = self.device.read_block(id.dev, id.blockno, unsafe { slot.data_mut() });
            if let Err(err) = filled {
                log::warn!("[BCACHE] device read of {} failed: {}", id, err);
                if let Err(release_err) = buf.release() {
                    log::error!("[BCACHE] release after failed read of {} failed: {}", id, release_err);
                }
                return Err(err);
            }
            StatCounters::bump(&self.stats.device_reads);
            // SAFETY: 同上
            unsafe { slot.set_valid(true) };
        }

        Ok(buf)
    }

    /// 获取块但不从设备读取
    ///
    /// 用于调用者将覆盖整个块的场景。数据无效时清零并标记为有效，
    /// 因此调用者应当在写回前填满整个块。
    pub fn get_noread(&self, dev: u32, blockno: u32) -> Result<Buf<'_, D, L>> {
        let buf = self.get(BlockId::new(dev, blockno))?;
        let slot = self.slot(buf.index());

        // SAFETY: get 返回时当前线程持有睡眠锁
        unsafe {
            if !slot.is_valid() {
                slot.data_mut().fill(0);
                slot.set_valid(true);
            }
        }

        Ok(buf)
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// 缓存池配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 缓存块数量
    pub fn nbuf(&self) -> usize {
        self.config.nbuf
    }

    /// 分片数量
    pub fn nbuckets(&self) -> usize {
        self.config.nbuckets
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// 底层设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 缓存是否已因致命错误不可用
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// 按块标识 pin 一个已缓存的块
    ///
    /// 只需要分片锁，不获取也不要求睡眠锁，可以在其他线程持有
    /// 该块时调用。被 pin 的块在对应的 [`BufferCache::unpin`] 之前不会被回收。
    ///
    /// # 错误
    ///
    /// - `InvalidInput`：块当前不在缓存中（通常先通过 `read` 装入再 pin）
    /// - `Poisoned`：缓存已因致命错误不可用
    pub fn pin(&self, dev: u32, blockno: u32) -> Result<()> {
        self.check()?;
        let id = BlockId::new(dev, blockno);
        let pinned = {
            let mut bucket = self.shards[id.shard(self.nbuckets())].lock();
            bucket.find(id).map(|index| Self::add_pin(&mut bucket, index, id))
        };
        match pinned {
            Some(pinned) => self.pin_result(pinned, id),
            None => Err(Error::new(ErrorKind::InvalidInput, "bpin: block not cached")),
        }
    }

    /// 按块标识撤销一次 pin
    ///
    /// 与 [`BufferCache::pin`] 或 [`Buf::pin`] 配对，只需要分片锁。
    /// 块没有未撤销的 pin 时为致命错误。
    pub fn unpin(&self, dev: u32, blockno: u32) -> Result<()> {
        self.check()?;
        let id = BlockId::new(dev, blockno);
        let unpinned = {
            let mut bucket = self.shards[id.shard(self.nbuckets())].lock();
            match bucket.find(id) {
                Some(index) => Self::drop_pin(&mut bucket, index, id),
                None => false,
            }
        };
        self.unpin_result(unpinned, id)
    }

    /// 块当前的引用计数
    ///
    /// 块不在缓存中时返回 `None`。结果只是某一时刻的快照。
    pub fn ref_count(&self, dev: u32, blockno: u32) -> Option<u32> {
        let id = BlockId::new(dev, blockno);
        let bucket = self.shards[id.shard(self.nbuckets())].lock();
        let index = bucket.find(id)?;
        bucket.tag(index).map(|tag| tag.refcnt)
    }

    /// 分片快照，按最近释放到最久未释放排列
    ///
    /// # 参数
    ///
    /// * `shard` - 分片下标
    pub fn shard_snapshot(&self, shard: usize) -> Result<Vec<SlotInfo>> {
        let shard = self
            .shards
            .get(shard)
            .ok_or(Error::new(ErrorKind::InvalidInput, "shard index out of range"))?;

        let bucket = shard.lock();
        let mut infos = Vec::with_capacity(bucket.len());
        infos.extend(bucket.iter().map(|(index, tag)| SlotInfo {
            index,
            id: tag.id,
            refcnt: tag.refcnt,
        }));
        drop(bucket);

        Ok(infos)
    }

    // ===== 内部实现 =====

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> &Slot<L> {
        &self.slots[index]
    }

    fn check(&self) -> Result<()> {
        if self.is_poisoned() {
            Err(Error::new(
                ErrorKind::Poisoned,
                "buffer cache is unusable after an earlier fatal error",
            ))
        } else {
            Ok(())
        }
    }

    /// 记录致命错误并使缓存不可用
    pub(crate) fn fatal(&self, err: Error) -> Error {
        self.poisoned.store(true, Ordering::Release);
        log::error!("[BCACHE] fatal: {}", err);
        err
    }

    /// 命中时增加引用计数
    fn take_cached(bucket: &mut Bucket, id: BlockId) -> Option<usize> {
        let index = bucket.find(id)?;
        let tag = bucket.tag_mut(index)?;
        tag.refcnt += 1;
        Some(index)
    }

    /// 查找或分配缓存块
    ///
    /// 对应 xv6 的 `bget`。返回时引用计数已加一，且当前线程持有睡眠锁。
    fn get(&self, id: BlockId) -> Result<Buf<'_, D, L>> {
        self.check()?;
        StatCounters::bump(&self.stats.lookups);

        let target = id.shard(self.nbuckets());

        // 只探测目标分片
        let cached = Self::take_cached(&mut self.shards[target].lock(), id);
        if let Some(index) = cached {
            return self.lock_hit(index, id);
        }

        match self.claim(id, target)? {
            Claim::Hit(index) => self.lock_hit(index, id),
            Claim::Evicted { index, from } => {
                StatCounters::bump(&self.stats.misses);
                if from != target {
                    StatCounters::bump(&self.stats.relocations);
                    log::debug!(
                        "[BCACHE] miss {}: buffer {} moved from shard {} to shard {}",
                        id,
                        index,
                        from,
                        target
                    );
                } else {
                    log::debug!("[BCACHE] miss {}: reusing buffer {} in shard {}", id, index, target);
                }

                // 引用计数曾为 0，没有持有者，不会阻塞
                self.lock_slot(index, id)
            }
        }
    }

    fn lock_hit(&self, index: usize, id: BlockId) -> Result<Buf<'_, D, L>> {
        StatCounters::bump(&self.stats.hits);
        log::trace!("[BCACHE] hit {} in buffer {}", id, index);
        self.lock_slot(index, id)
    }

    /// 获取睡眠锁并构造句柄
    ///
    /// 等待期间缓存可能因致命错误不可用；此时放开睡眠锁，
    /// 让排在后面的等待者也能醒来并返回 `Poisoned`。
    fn lock_slot(&self, index: usize, id: BlockId) -> Result<Buf<'_, D, L>> {
        let slot = self.slot(index);
        slot.lock().acquire();
        if let Err(err) = self.check() {
            slot.lock().release();
            return Err(err);
        }
        Ok(Buf::new(self, index, id))
    }

    /// 跨分片寻找空闲槽位
    ///
    /// 按下标升序扫描每个分片 `s`，同时锁住 `s` 与目标分片。
    /// 在锁内先复查目标分片（其他线程可能已装入该块），再从 `s` 的
    /// 最近释放端找第一个空闲槽位并迁移到目标分片。
    fn claim(&self, id: BlockId, target: usize) -> Result<Claim> {
        for source in 0..self.nbuckets() {
            let mut pair = ShardPair::lock(&self.shards, source, target);

            if let Some(index) = Self::take_cached(pair.target(), id) {
                return Ok(Claim::Hit(index));
            }

            if let Some(index) = pair.source().find_idle() {
                // SAFETY: 空闲槽位没有任何持有者，且在分片锁释放前不会被其他线程引用
                unsafe { self.slot(index).set_valid(false) };
                pair.relocate(index, Tag::claimed(id));
                return Ok(Claim::Evicted { index, from: source });
            }
        }

        Err(self.fatal(Error::new(ErrorKind::NoBuffers, "bget: no buffers")))
    }

    /// 写回设备
    pub(crate) fn write_slot(&self, index: usize, id: BlockId) -> Result<()> {
        self.check()?;
        let slot = self.slot(index);
        if !slot.lock().holding() {
            return Err(self.fatal(Error::new(ErrorKind::Misuse, "bwrite: buffer not locked by caller")));
        }

        log::debug!("[BCACHE] write {} from buffer {} to device", id, index);
        // SAFETY: 当前线程持有睡眠锁
        self.device.write_block(id.dev, id.blockno, unsafe { slot.data() })?;
        StatCounters::bump(&self.stats.device_writes);
        Ok(())
    }

    /// 释放睡眠锁并减少引用计数
    ///
    /// 缓存不可用时仍然放开持有的睡眠锁，避免等待者永远阻塞。
    pub(crate) fn release_slot(&self, index: usize, id: BlockId) -> Result<()> {
        let slot = self.slot(index);
        if !slot.lock().holding() {
            self.check()?;
            return Err(self.fatal(Error::new(ErrorKind::Misuse, "brelse: buffer not locked by caller")));
        }
        slot.lock().release();
        self.check()?;

        let remaining = {
            let mut bucket = self.shards[id.shard(self.nbuckets())].lock();
            let remaining = match bucket.tag_mut(index) {
                Some(tag) if tag.id == Some(id) && tag.refcnt > 0 => {
                    tag.refcnt -= 1;
                    Some(tag.refcnt)
                }
                _ => None,
            };
            // 没有其他持有者，移到最近释放端
            if remaining == Some(0) {
                bucket.move_to_front(index);
            }
            remaining
        };

        match remaining {
            Some(refcnt) => {
                log::trace!("[BCACHE] release {} (buffer {}, refcnt={})", id, index, refcnt);
                Ok(())
            }
            None => Err(self.fatal(Error::new(
                ErrorKind::Misuse,
                "brelse: buffer not referenced in its shard",
            ))),
        }
    }

    /// 增加引用计数并记一次 pin
    fn add_pin(bucket: &mut Bucket, index: usize, id: BlockId) -> bool {
        match bucket.tag_mut(index) {
            Some(tag) if tag.id == Some(id) => {
                tag.refcnt += 1;
                tag.pins += 1;
                true
            }
            _ => false,
        }
    }

    /// 撤销一次 pin；引用计数归零时移到最近释放端
    ///
    /// 只能减去由 pin 贡献的计数，句柄自身持有的那一份不受影响。
    fn drop_pin(bucket: &mut Bucket, index: usize, id: BlockId) -> bool {
        let remaining = match bucket.tag_mut(index) {
            Some(tag) if tag.id == Some(id) && tag.pins > 0 => {
                tag.pins -= 1;
                tag.refcnt -= 1;
                Some(tag.refcnt)
            }
            _ => None,
        };
        if remaining == Some(0) {
            bucket.move_to_front(index);
        }
        remaining.is_some()
    }

    pub(crate) fn pin_slot(&self, index: usize, id: BlockId) -> Result<()> {
        self.check()?;
        let pinned = Self::add_pin(&mut self.shards[id.shard(self.nbuckets())].lock(), index, id);
        self.pin_result(pinned, id)
    }

    pub(crate) fn unpin_slot(&self, index: usize, id: BlockId) -> Result<()> {
        self.check()?;
        let unpinned = Self::drop_pin(&mut self.shards[id.shard(self.nbuckets())].lock(), index, id);
        self.unpin_result(unpinned, id)
    }

    fn pin_result(&self, pinned: bool, id: BlockId) -> Result<()> {
        if pinned {
            log::trace!("[BCACHE] pin {}", id);
            Ok(())
        } else {
            Err(self.fatal(Error::new(ErrorKind::Misuse, "bpin: buffer not found in its shard")))
        }
    }

    fn unpin_result(&self, unpinned: bool, id: BlockId) -> Result<()> {
        if unpinned {
            log::trace!("[BCACHE] unpin {}", id);
            Ok(())
        } else {
            Err(self.fatal(Error::new(ErrorKind::Misuse, "bunpin: no matching pin")))
        }
    }
}

impl<D: BlockDevice, L: SleepLock> core::fmt::Debug for BufferCache<D, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferCache")
            .field("nbuf", &self.config.nbuf)
            .field("nbuckets", &self.config.nbuckets)
            .field("block_size", &self.config.block_size)
            .field("poisoned", &self.is_poisoned())
            .field("stats", &self.stats())
            .finish()
    }
}
