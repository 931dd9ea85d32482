//! 数据结构定义
//!
//! 块标识与缓存池配置。

use crate::consts::{BSIZE, NBUCKETS, NBUF};
use crate::error::{Error, ErrorKind, Result};
use core::fmt;

/// 块标识：`(设备号, 块号)`
///
/// 对于缓存层而言这是一个不透明的二元组，只用于相等比较和分片选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    /// 设备号
    pub dev: u32,
    /// 设备内块号
    pub blockno: u32,
}

impl BlockId {
    /// 创建块标识
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }

    /// 该块所属的分片下标
    #[inline]
    pub const fn shard(&self, nbuckets: usize) -> usize {
        self.blockno as usize % nbuckets
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// 缓存池配置
///
/// 缓存池大小在初始化后固定，不会动态增长。
///
/// # 示例
///
/// ```rust,ignore
/// let config = CacheConfig::default()
///     .with_nbuf(64)
///     .with_nbuckets(7)
///     .with_block_size(4096);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓存块数量
    pub nbuf: usize,
    /// 分片数量
    pub nbuckets: usize,
    /// 块大小（字节）
    pub block_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbuckets: NBUCKETS,
            block_size: BSIZE,
        }
    }
}

impl CacheConfig {
    /// 使用指定参数创建配置
    pub const fn new(nbuf: usize, nbuckets: usize, block_size: usize) -> Self {
        Self {
            nbuf,
            nbuckets,
            block_size,
        }
    }

    /// 设置缓存块数量
    pub fn with_nbuf(mut self, nbuf: usize) -> Self {
        self.nbuf = nbuf;
        self
    }

    /// 设置分片数量
    pub fn with_nbuckets(mut self, nbuckets: usize) -> Self {
        self.nbuckets = nbuckets;
        self
    }

    /// 设置块大小
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.nbuf == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "nbuf must be non-zero"));
        }
        if self.nbuckets == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "nbuckets must be non-zero"));
        }
        if self.block_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "block_size must be non-zero"));
        }
        Ok(())
    }
}
