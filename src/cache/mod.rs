//! 块缓存模块
//!
//! 固定数量的缓存块，按 `blockno % nbuckets` 分散到多个分片，每个分片一把锁。
//! 对应 xv6 `bio.c` 的分片版本（lock lab）。
//!
//! # 主要组件
//!
//! - [`BufferCache`] - 块缓存管理器
//! - [`Buf`] - 调用者持有的缓存块句柄
//! - [`CacheStats`] - 缓存统计信息
//! - [`SlotInfo`] - 分片快照中的一项
//!
//! # 与 xv6 的对应关系
//!
//! | xv6                | 本模块                         |
//! |--------------------|--------------------------------|
//! | `binit()`          | [`BufferCache::new()`]         |
//! | `bread()`          | [`BufferCache::read()`]        |
//! | `bget()`           | *(内部，read/get_noread 共用)* |
//! | `bwrite()`         | [`Buf::write()`]               |
//! | `brelse()`         | [`Buf::release()`] / `Drop`    |
//! | `bpin()`           | [`Buf::pin()`]                 |
//! | `bunpin()`         | [`Buf::unpin()`]               |
//! | `bcache.bucket[i]` | `shard::Bucket`                |
//!
//! # 锁
//!
//! - 分片锁（`spin::Mutex`）保护分片成员、块身份、引用计数和释放顺序，
//!   持有时间很短，从不跨越设备 I/O
//! - 每个缓存块的睡眠锁（[`SleepLock`]）保护块数据与有效标志，
//!   持有时间可以跨越设备 I/O
//! - 同时持有两把分片锁时总是按分片下标升序获取
//!
//! [`SleepLock`]: crate::lock::SleepLock

mod block_cache;
mod buffer;
mod shard;

pub use block_cache::{BufferCache, CacheStats, SlotInfo};
pub use buffer::Buf;
