//! bcache_core: 分片块缓存
//!
//! 类 Unix 内核文件系统下方的块缓存层（xv6 `bio.c` 的分片版本），提供：
//! - 固定大小的缓存池，每个磁盘块在缓存中至多一份
//! - 按块号哈希分片，每个分片独立加锁，减少锁竞争
//! - 每个缓存块一把睡眠锁，持有者独占块数据
//! - 分片内按释放顺序排列，回收时优先复用刚释放的空闲块
//! - 引用计数与 pin/unpin，保证被使用的块不会被回收
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BlockDevice, BufferCache, CacheConfig, Result, StdSleepLock};
//!
//! struct MyDisk {
//!     // ...
//! }
//!
//! impl BlockDevice for MyDisk {
//!     // 实现必要的方法
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let cache = BufferCache::<_, StdSleepLock>::new(CacheConfig::default(), MyDisk::new())?;
//!
//!     let mut buf = cache.read(1, 42)?;
//!     buf.data_mut()?[0] = 0x42;
//!     buf.write()?;
//!     buf.release()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象
//! - [`consts`] - 常量定义
//! - [`types`] - 数据结构定义
//! - [`lock`] - 睡眠锁抽象
//! - [`cache`] - 块缓存
//! - [`global`] - 全局块缓存

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 数据结构定义
pub mod types;

/// 睡眠锁
pub mod lock;

/// 块缓存
pub mod cache;

/// 全局块缓存
pub mod global;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::BlockDevice;

// 睡眠锁
pub use lock::SleepLock;
#[cfg(any(test, feature = "std"))]
pub use lock::StdSleepLock;

// 数据结构
pub use types::{BlockId, CacheConfig};

// 常量
pub use consts::{BSIZE, NBUCKETS, NBUF};

// Cache
pub use cache::{Buf, BufferCache, CacheStats, SlotInfo};

// 全局实例
pub use global::CacheCell;
