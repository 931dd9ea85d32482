//! 缓存块结构
//!
//! - [`Slot`]：缓存池中的一个槽位，保存一个块的数据副本、有效标志和睡眠锁
//! - [`Buf`]：调用者持有的缓存块句柄，由 [`BufferCache::read`] 返回
//!
//! 槽位的身份与引用计数不在这里，它们属于槽位当前所在的分片，见 `shard` 模块。
//!
//! [`BufferCache::read`]: super::BufferCache::read

use super::BufferCache;
use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::lock::SleepLock;
use crate::types::BlockId;
use alloc::boxed::Box;
use core::cell::UnsafeCell;

/// 缓存槽位
///
/// `data` 与 `valid` 只能由持有 `lock` 的线程访问。
pub(crate) struct Slot<L> {
    lock: L,
    valid: UnsafeCell<bool>,
    data: UnsafeCell<Box<[u8]>>,
}

// data/valid 由睡眠锁保护
unsafe impl<L: SleepLock> Sync for Slot<L> {}

impl<L: SleepLock> Slot<L> {
    /// 创建空槽位
    ///
    /// # 参数
    ///
    /// * `block_size` - 块大小（字节）
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            lock: L::new(),
            valid: UnsafeCell::new(false),
            data: UnsafeCell::new(alloc::vec![0u8; block_size].into_boxed_slice()),
        }
    }

    /// 槽位的睡眠锁
    #[inline]
    pub(crate) fn lock(&self) -> &L {
        &self.lock
    }

    /// # Safety
    ///
    /// 调用者必须持有 `self.lock`。
    #[inline]
    pub(crate) unsafe fn is_valid(&self) -> bool {
        unsafe { *self.valid.get() }
    }

    /// # Safety
    ///
    /// 调用者必须持有 `self.lock`。
    #[inline]
    pub(crate) unsafe fn set_valid(&self, valid: bool) {
        unsafe { *self.valid.get() = valid }
    }

    /// # Safety
    ///
    /// 调用者必须持有 `self.lock`，且在返回的引用存活期间不再创建可变引用。
    #[inline]
    pub(crate) unsafe fn data(&self) -> &[u8] {
        unsafe { &*self.data.get() }
    }

    /// # Safety
    ///
    /// 调用者必须持有 `self.lock`，且返回的引用是唯一的访问路径。
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut [u8] {
        unsafe { &mut *self.data.get() }
    }
}

/// 缓存块句柄
///
/// 由 [`BufferCache::read`] 或 [`BufferCache::get_noread`] 返回。持有期间：
/// - 缓存块的引用计数中包含本句柄的一份，不会被回收
/// - 获取句柄的线程持有缓存块的睡眠锁，独占块数据
///
/// 用完后调用 [`Buf::release`]。如果句柄在未释放的情况下被丢弃，
/// `Drop` 会代为释放（错误只记录日志）。
///
/// # 示例
///
/// ```rust,ignore
/// let mut buf = cache.read(1, 42)?;
/// buf.data_mut()?[0] = 0x42;
/// buf.write()?;      // 同步写回设备
/// buf.release()?;    // 之后不能再使用 buf
/// ```
///
/// [`BufferCache::read`]: super::BufferCache::read
/// [`BufferCache::get_noread`]: super::BufferCache::get_noread
pub struct Buf<'a, D: BlockDevice, L: SleepLock> {
    cache: &'a BufferCache<D, L>,
    index: usize,
    id: BlockId,
    released: bool,
}

impl<'a, D: BlockDevice, L: SleepLock> Buf<'a, D, L> {
    pub(crate) fn new(cache: &'a BufferCache<D, L>, index: usize, id: BlockId) -> Self {
        Self {
            cache,
            index,
            id,
            released: false,
        }
    }

    /// 设备号
    pub fn dev(&self) -> u32 {
        self.id.dev
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.id.blockno
    }

    /// 块标识
    pub fn block_id(&self) -> BlockId {
        self.id
    }

    /// 槽位在缓存池中的下标
    pub fn index(&self) -> usize {
        self.index
    }

    fn slot(&self) -> &'a Slot<L> {
        self.cache.slot(self.index)
    }

    /// 确认当前线程持有睡眠锁
    fn check_holding(&self, message: &'static str) -> Result<()> {
        if self.slot().lock().holding() {
            Ok(())
        } else {
            Err(self.cache.fatal(Error::new(ErrorKind::Misuse, message)))
        }
    }

    /// 块数据是否反映设备上的内容
    pub fn is_valid(&self) -> Result<bool> {
        self.check_holding("is_valid: buffer not locked by caller")?;
        // SAFETY: 当前线程持有睡眠锁
        Ok(unsafe { self.slot().is_valid() })
    }

    /// 只读访问块数据
    pub fn data(&self) -> Result<&[u8]> {
        self.check_holding("data: buffer not locked by caller")?;
        // SAFETY: 当前线程持有睡眠锁，可变访问需要 &mut self
        Ok(unsafe { self.slot().data() })
    }

    /// 可写访问块数据
    ///
    /// 修改只存在于缓存中，调用 [`Buf::write`] 才会写回设备。
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        self.check_holding("data_mut: buffer not locked by caller")?;
        // SAFETY: 当前线程持有睡眠锁，且借用了 &mut self
        Ok(unsafe { self.slot().data_mut() })
    }

    /// 把块数据同步写回设备
    ///
    /// 对应 xv6 的 `bwrite`。调用者必须持有睡眠锁，否则为致命错误。
    pub fn write(&mut self) -> Result<()> {
        self.cache.write_slot(self.index, self.id)
    }

    /// 释放缓存块
    ///
    /// 对应 xv6 的 `brelse`。释放睡眠锁并减少引用计数；
    /// 引用计数归零时缓存块移到所在分片的最近释放端。
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.cache.release_slot(self.index, self.id)
    }

    /// 增加引用计数，使缓存块在句柄释放后仍驻留
    ///
    /// 对应 xv6 的 `bpin`。不需要睡眠锁；必须与 [`Buf::unpin`] 或
    /// [`BufferCache::unpin`] 配对，后者在句柄释放之后也可以调用。
    ///
    /// [`BufferCache::unpin`]: super::BufferCache::unpin
    pub fn pin(&self) -> Result<()> {
        self.cache.pin_slot(self.index, self.id)
    }

    /// 减少由 [`Buf::pin`] 增加的引用计数
    ///
    /// 对应 xv6 的 `bunpin`。没有对应的 `pin` 时为致命错误。
    pub fn unpin(&self) -> Result<()> {
        self.cache.unpin_slot(self.index, self.id)
    }
}

impl<'a, D: BlockDevice, L: SleepLock> core::fmt::Debug for Buf<'a, D, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buf")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

impl<'a, D: BlockDevice, L: SleepLock> Drop for Buf<'a, D, L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.cache.release_slot(self.index, self.id) {
            log::error!("[BCACHE] implicit release of {} failed: {}", self.id, err);
        }
    }
}
