//! 块设备核心类型

use crate::error::Result;

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。所有方法都是同步的：
/// 返回时数据已经读入缓冲区或已经写到设备上。
///
/// 方法接收 `&self`，缓存会在多个线程上同时调用同一个设备，
/// 实现者需要自行保护内部状态（例如驱动自己的请求队列锁）。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, Result};
///
/// struct VirtioDisk {
///     // ...
/// }
///
/// impl BlockDevice for VirtioDisk {
///     fn block_size(&self) -> usize {
///         1024
///     }
///
///     fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
///         // 提交读请求并等待完成
///         Ok(())
///     }
///
///     fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
///         // 提交写请求并等待完成
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 读取一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 目标缓冲区（长度为 block_size）
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()>;

    /// 写入一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 源缓冲区（长度为 block_size）
    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(dev, blockno, buf)
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        (**self).write_block(dev, blockno, buf)
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for alloc::boxed::Box<D> {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(dev, blockno, buf)
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        (**self).write_block(dev, blockno, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::mock::MockDevice;

    #[test]
    fn test_device_through_reference() {
        let device = MockDevice::new(512);
        let by_ref: &MockDevice = &device;

        by_ref.write_block(1, 3, &[0x5A; 512]).unwrap();
        let mut buf = [0u8; 512];
        by_ref.read_block(1, 3, &mut buf).unwrap();

        assert_eq!(by_ref.block_size(), 512);
        assert!(buf.iter().all(|&b| b == 0x5A));
        assert_eq!(device.reads(), 1);
        assert_eq!(device.writes(), 1);
    }

    #[test]
    fn test_boxed_device() {
        let device: alloc::boxed::Box<dyn BlockDevice> = alloc::boxed::Box::new(MockDevice::new(256));
        assert_eq!(device.block_size(), 256);

        let mut buf = [0xFFu8; 256];
        device.read_block(0, 0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }
}
