//! 睡眠锁接口
//!
//! 每个缓存块带一把睡眠锁，限制同一时刻只有一个线程访问块数据。
//! 睡眠锁由宿主环境提供（内核的 sleeplock，或宿主进程的线程原语），
//! 缓存只依赖下面的 [`SleepLock`] 接口。
//!
//! 分片锁不走这个接口：分片锁是不会挂起的自旋锁，直接使用 `spin::Mutex`。

/// 睡眠锁 trait
///
/// # 设计说明
///
/// - `acquire` 可以挂起调用线程，直到锁可用
/// - `release` 只能由持有者调用
/// - `holding` 回答"当前线程是否持有此锁"
///
/// # Safety
///
/// 缓存依赖 `holding()` 来决定是否允许访问块数据。实现必须保证：
/// 同一时刻至多一个线程持有锁，且 `holding()` 只对持有者返回 `true`。
///
/// # 示例
///
/// ```rust,ignore
/// struct KernelSleepLock { /* ... */ }
///
/// unsafe impl SleepLock for KernelSleepLock {
///     fn new() -> Self { /* initsleeplock */ }
///     fn acquire(&self) { /* acquiresleep */ }
///     fn release(&self) { /* releasesleep */ }
///     fn holding(&self) -> bool { /* holdingsleep */ }
/// }
/// ```
pub unsafe trait SleepLock: Send + Sync {
    /// 创建一把未被持有的锁
    fn new() -> Self
    where
        Self: Sized;

    /// 获取锁，必要时挂起
    fn acquire(&self);

    /// 释放锁
    fn release(&self);

    /// 当前线程是否持有此锁
    fn holding(&self) -> bool;
}

#[cfg(any(test, feature = "std"))]
mod std_locks {
    use super::SleepLock;
    use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
    use std::thread::{self, ThreadId};

    /// 基于 `std::sync::{Mutex, Condvar}` 的睡眠锁
    ///
    /// 记录持有者的线程 ID，等待者在条件变量上阻塞。
    #[derive(Debug, Default)]
    pub struct StdSleepLock {
        owner: Mutex<Option<ThreadId>>,
        released: Condvar,
    }

    impl StdSleepLock {
        fn owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
            self.owner.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    unsafe impl SleepLock for StdSleepLock {
        fn new() -> Self {
            Self::default()
        }

        fn acquire(&self) {
            let mut owner = self.owner();
            while owner.is_some() {
                owner = self
                    .released
                    .wait(owner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            *owner = Some(thread::current().id());
        }

        fn release(&self) {
            let mut owner = self.owner();
            *owner = None;
            drop(owner);
            self.released.notify_one();
        }

        fn holding(&self) -> bool {
            *self.owner() == Some(thread::current().id())
        }
    }
}

#[cfg(any(test, feature = "std"))]
pub use std_locks::StdSleepLock;
