//! 平台 SDIO 主机驱动契约
//!
//! 传输核心只通过本 trait 触碰总线：块模式 CMD53 收发、功能寄存器
//! 单字节读写。地址编码（端口号、聚合基址、字节模式标志）由调用方完成。

use crate::caps::BYTE_MODE_MASK;

/// SDIO 主机驱动。块读写失败返回负 errno（通常 [`EIO`](crate::EIO)）。
pub trait SdioDrv {
    /// CMD53 读：从 addr 读 blk_cnt 个 blk_size 字节块到 buf。
    fn read(&self, addr: u32, blk_cnt: u32, blk_size: u32, buf: &mut [u8]) -> Result<(), i32>;

    /// CMD53 写：把 buf 的前 blk_cnt * blk_size 字节写到 addr。
    fn write(&self, addr: u32, blk_cnt: u32, blk_size: u32, buf: &[u8]) -> Result<(), i32>;

    /// CMD52 读功能寄存器单字节。
    fn creg_read(&self, addr: u32, func: u32) -> Result<u8, i32>;

    /// CMD52 写功能寄存器单字节。
    fn creg_write(&self, addr: u32, func: u32, val: u8) -> Result<(), i32>;

    /// 字节模式整窗读：一次 CMD53 读出 buf.len() 字节的寄存器窗口。
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), i32> {
        let len = buf.len() as u32;
        self.read(addr | BYTE_MODE_MASK, 1, len, buf)
    }
}
