//! 错误类型定义
//!
//! 提供块缓存操作的错误类型。
//!
//! 错误分为两类：
//! - 可恢复错误：`Io`、`InvalidInput`，原样返回给调用者
//! - 致命错误：`NoBuffers`、`Misuse`、`Poisoned`，发生后缓存被标记为不可用

use core::fmt;

/// 块缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 设备 I/O 错误（由块设备驱动返回）
    Io,
    /// 无效参数
    InvalidInput,
    /// 缓存池耗尽：没有任何空闲缓存块可供回收（致命）
    NoBuffers,
    /// 协议违规：未持有缓存块的睡眠锁就执行 write/release 等操作（致命）
    Misuse,
    /// 缓存已因之前的致命错误而不可用（致命）
    Poisoned,
}

impl ErrorKind {
    /// 是否为致命错误
    pub const fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::NoBuffers | ErrorKind::Misuse | ErrorKind::Poisoned)
    }
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 是否为致命错误
    ///
    /// 致命错误之后缓存不能继续使用。
    pub const fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
