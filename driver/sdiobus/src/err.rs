//! 负 errno 约定
//!
//! 低层总线/端口操作统一返回 `Result<_, i32>`，错误值为负 errno，
//! 上层再按需要映射为 `AxError`。

/// I/O 错误（CMD53 失败等）
pub const EIO: i32 = -5;
/// 资源暂不可用（无空闲写端口、缓冲池空）
pub const EAGAIN: i32 = -11;
/// 内存/缓冲不足
pub const ENOMEM: i32 = -12;
/// 设备或管线忙
pub const EBUSY: i32 = -16;
/// 已注册/已存在
pub const EEXIST: i32 = -17;
/// 参数非法
pub const EINVAL: i32 = -22;
/// 等待超时
pub const ETIMEDOUT: i32 = -62;
