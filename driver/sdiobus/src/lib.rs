//! SDIO 总线契约 crate
//!
//! WLAN 传输核心与平台之间的全部边界都在这里：
//! - [`caps`]：卡型号能力表（寄存器偏移、端口数、聚合上限），初始化时解析一次，
//!   之后所有分支都走数据而不是条件编译
//! - [`SdioDrv`]：平台 SDIO 主机驱动需要实现的块/字节读写契约
//! - [`OsOps`]：调度器原语契约（命令响应信号量、IO 事件等待、毫秒睡眠）
//! - [`IntBridge`]：中断上下文与处理线程之间的桥，显式装配、一次唤醒

#![cfg_attr(not(test), no_std)]

mod caps;
mod drv;
mod err;
mod irq;
mod os;

pub use caps::{
    CardCaps, CardType, BYTE_MODE_MASK, CMD_PORT_SLCT, DN_LD_CMD_PORT_HOST_INT_STATUS,
    DN_LD_HOST_INT_STATUS, HOST_TERM_CMD53, MAX_MP_REGS_LEN, MPA_ADDR_BASE, REG_PORT,
    UP_LD_CMD_PORT_HOST_INT_STATUS, UP_LD_HOST_INT_STATUS,
};
pub use drv::SdioDrv;
pub use err::{EAGAIN, EBUSY, EEXIST, EINVAL, EIO, ENOMEM, ETIMEDOUT};
pub use irq::IntBridge;
pub use os::OsOps;
