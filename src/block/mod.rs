//! 块设备抽象
//!
//! 块缓存只通过 [`BlockDevice`] 与底层驱动交互：读满一个块，或把一个块写回。
//! 驱动自身负责 I/O 的串行化，缓存层可以在多个线程上并发调用它。

mod device;

#[cfg(test)]
pub(crate) mod mock;

pub use device::BlockDevice;
