//! WLAN 固件传输核心
//!
//! 以 SDIO 多端口 FIFO 为载体的包传输与命令状态机：
//! - [`adapter`]：适配器上下文（位图缓存、端口游标、寄存器快照）
//! - [`ports`]：写端口预约与读端口消费，含游标回绕
//! - [`rx`]：多端口聚合读规划与聚合缓冲拆包
//! - [`tx`]：非聚合单帧发送、聚合暂存/冲刷、带退避的端口重试
//! - [`txpd`]：总线帧头与发送描述符的字节编解码
//! - [`hostcmd`]：固件命令 ID、命令头编解码、典型响应的类型化解析
//! - [`dispatch`]：命令管线（串行化、序号、一次在途、响应路由）
//! - [`vendor`]：固件补丁按需下载（VDLL）窗口
//! - [`init`]：上电命令序列、中断使能、端口复位、关机

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod adapter;
pub mod dispatch;
pub mod hostcmd;
pub mod init;
pub mod ports;
pub mod rx;
pub mod tx;
pub mod txpd;
pub mod vendor;

pub use adapter::Adapter;
pub use dispatch::{BusMessage, CmdPipeline, DataInputFn, EventSinkFn};
pub use init::FwInitCfg;
pub use tx::{RetryPolicy, TxStaging};

/// 聚合读缓冲大小。聚合规划保证总长不超过它。
pub const INBUF_SIZE: usize = 2048;
/// 命令/聚合写缓冲大小。
pub const OUTBUF_SIZE: usize = 2048;
