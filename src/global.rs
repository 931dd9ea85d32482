//! 全局块缓存
//!
//! 内核通常在启动时创建唯一一个块缓存，之后所有文件系统代码共享它。
//! [`CacheCell`] 可以放进 `static`，第一次 [`CacheCell::init`] 创建缓存，
//! 之后的调用直接返回已有实例。
//!
//! # 示例
//!
//! ```rust,ignore
//! static BCACHE: CacheCell<VirtioDisk, KernelSleepLock> = CacheCell::new();
//!
//! fn kernel_main(disk: VirtioDisk) -> Result<()> {
//!     BCACHE.init(CacheConfig::default(), disk)?;
//!     let buf = BCACHE.get().unwrap().read(ROOTDEV, 1)?;
//!     // ...
//! }
//! ```

use crate::block::BlockDevice;
use crate::cache::BufferCache;
use crate::error::Result;
use crate::lock::SleepLock;
use crate::types::CacheConfig;
use spin::Once;

/// 只初始化一次的块缓存容器
pub struct CacheCell<D: BlockDevice, L: SleepLock> {
    cache: Once<BufferCache<D, L>>,
}

impl<D: BlockDevice, L: SleepLock> CacheCell<D, L> {
    /// 创建未初始化的容器
    pub const fn new() -> Self {
        Self { cache: Once::new() }
    }

    /// 初始化块缓存
    ///
    /// 对应 xv6 的 `binit`。容器已初始化时记录警告，丢弃 `device`
    /// 并返回已有实例；创建失败时容器保持未初始化，可以重试。
    ///
    /// # 参数
    ///
    /// * `config` - 缓存池配置
    /// * `device` - 底层块设备
    pub fn init(&self, config: CacheConfig, device: D) -> Result<&BufferCache<D, L>> {
        let mut created = false;
        let cache = self.cache.try_call_once(|| {
            created = true;
            BufferCache::new(config, device)
        })?;

        if !created {
            log::warn!("[BCACHE] init called on an initialized cache, keeping the existing one");
        }
        Ok(cache)
    }

    /// 获取块缓存，未初始化时返回 `None`
    pub fn get(&self) -> Option<&BufferCache<D, L>> {
        self.cache.get()
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.cache.is_completed()
    }
}

impl<D: BlockDevice, L: SleepLock> Default for CacheCell<D, L> {
    fn default() -> Self {
        Self::new()
    }
}
