//! 块缓存常量定义
//!
//! 这个模块包含缓存池的默认配置：
//! - 缓存块数量
//! - 分片（哈希桶）数量
//! - 块大小

//=============================================================================
// 缓存池
//=============================================================================

/// 默认缓存块数量
pub const NBUF: usize = 30;

/// 默认分片数量
///
/// 取素数，使块号在各分片间分布更均匀
pub const NBUCKETS: usize = 13;

//=============================================================================
// 块
//=============================================================================

/// 默认块大小（1024 字节）
pub const BSIZE: usize = 1024;
