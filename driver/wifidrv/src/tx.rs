//! 发送调度
//!
//! 非聚合路径：预约一个写端口，单帧 CMD53 写出；没有空闲端口时
//! 按重试策略退避，退避后重读寄存器快照刷新写位图。
//! 聚合路径：帧先进暂存缓冲（每帧占一个端口、按块对齐），显式
//! `flush` 一次性写到聚合地址。

use alloc::vec;
use alloc::vec::Vec;

use sdiobus::{OsOps, SdioDrv, EAGAIN, EINVAL, EIO, ENOMEM, MPA_ADDR_BASE};

use crate::adapter::Adapter;
use crate::txpd::stamp_data_pkt;

/// 写端口重试策略。计数归本次调用所有，进入时重置。
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 32,
            backoff_ms: 1,
        }
    }
}

/// 长度按块大小向上取整。
#[inline]
pub(crate) fn padded_len(len: usize, block_size: u32) -> usize {
    let b = block_size as usize;
    len.div_ceil(b) * b
}

/// 帧长折算成 (块数, 块大小)。
#[inline]
pub fn calc_tx_blocks(len: usize, block_size: u32) -> (u32, u32) {
    ((padded_len(len, block_size) / block_size as usize) as u32, block_size)
}

/// 非聚合单帧发送：盖章后写出。`frame` 为完整下行缓冲（总线头 +
/// 描述符 + payload），`txlen` 为帧长，缓冲须容得下按块补齐后的长度。
pub fn xmit_pkt<D: SdioDrv, O: OsOps>(
    drv: &D,
    os: &O,
    adapter: &mut Adapter,
    policy: &RetryPolicy,
    frame: &mut [u8],
    txlen: usize,
    interface: u8,
    tid: u8,
) -> Result<(), i32> {
    if txlen > frame.len() {
        return Err(EINVAL);
    }
    stamp_data_pkt(&mut frame[..txlen], interface, 0, tid, 0)?;
    xmit_bypass_pkt(drv, os, adapter, policy, frame, txlen)
}

/// 免盖章单帧发送，帧里已带好描述符（注入/回放路径）。
pub fn xmit_bypass_pkt<D: SdioDrv, O: OsOps>(
    drv: &D,
    os: &O,
    adapter: &mut Adapter,
    policy: &RetryPolicy,
    buf: &[u8],
    txlen: usize,
) -> Result<(), i32> {
    let (blocks, blksize) = calc_tx_blocks(txlen, adapter.caps.block_size);
    let padded = (blocks * blksize) as usize;
    if buf.len() < padded {
        return Err(EINVAL);
    }

    let mut attempts = policy.max_attempts;
    loop {
        match adapter.get_wr_port_for_data() {
            Ok(port) => {
                let addr = adapter.ioport() + port as u32;
                return drv.write(addr, blocks, blksize, &buf[..padded]).map_err(|e| {
                    log::error!(target: "wlan::tx", "cmd53 write port {port} failed: {e}");
                    adapter.dump_regs();
                    adapter.invoke_recovery();
                    EIO
                });
            }
            Err(e) if e == EAGAIN => {
                if attempts == 0 {
                    log::warn!(target: "wlan::tx",
                        "no wr port after {} attempts, mp_wr_bitmap=0x{:08x}",
                        policy.max_attempts, adapter.wr_bitmap());
                    return Err(EAGAIN);
                }
                attempts -= 1;
                // 让固件有机会回收端口，再重读快照取新位图
                os.sleep_ms(policy.backoff_ms);
                adapter.interrupt(drv)?;
                adapter.refresh_wr_bitmap();
            }
            Err(e) => return Err(e),
        }
    }
}

/// 聚合发送暂存区。
pub struct TxStaging {
    buf: Vec<u8>,
    used: usize,
    start_port: Option<u8>,
    pkt_cnt: u8,
}

impl TxStaging {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            used: 0,
            start_port: None,
            pkt_cnt: 0,
        }
    }

    #[inline]
    pub fn pkt_cnt(&self) -> u8 {
        self.pkt_cnt
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// 暂存一帧：预约一个端口，把帧按块对齐拷进暂存区。
    /// 暂存区满或帧数到聚合上限时返回 [`ENOMEM`]，调用方先 flush。
    pub fn stage_pkt(&mut self, adapter: &mut Adapter, frame: &[u8]) -> Result<(), i32> {
        let padded = padded_len(frame.len(), adapter.caps.block_size);
        if self.pkt_cnt >= adapter.caps.mp_aggr_pkt_limit || self.used + padded > self.buf.len() {
            return Err(ENOMEM);
        }
        let port = adapter.get_wr_port_for_data()?;
        self.start_port.get_or_insert(port);

        self.buf[self.used..self.used + frame.len()].copy_from_slice(frame);
        self.buf[self.used + frame.len()..self.used + padded].fill(0);
        self.used += padded;
        self.pkt_cnt += 1;
        Ok(())
    }

    /// 把暂存的帧一次 CMD53 写出。单帧退化为普通端口写。
    pub fn flush<D: SdioDrv>(&mut self, drv: &D, adapter: &mut Adapter) -> Result<(), i32> {
        if self.pkt_cnt == 0 {
            return Ok(());
        }
        let start_port = self.start_port.take().unwrap_or_default();
        // 聚合地址编码帧数：32 端口卡 (帧数-1)<<8，16 端口卡帧数<<4
        let addr = if self.pkt_cnt == 1 {
            adapter.ioport() + start_port as u32
        } else if adapter.caps.wide_bitmap {
            (adapter.ioport() | MPA_ADDR_BASE | (((self.pkt_cnt as u32) - 1) << 8))
                + start_port as u32
        } else {
            (adapter.ioport() | MPA_ADDR_BASE | ((self.pkt_cnt as u32) << 4)) + start_port as u32
        };
        let (blocks, blksize) = calc_tx_blocks(self.used, adapter.caps.block_size);
        log::trace!(target: "wlan::tx",
            "flush {} pkts, {} bytes, cmd53 addr 0x{addr:x}", self.pkt_cnt, self.used);

        let ret = drv
            .write(addr, blocks, blksize, &self.buf[..self.used])
            .map_err(|e| {
                log::error!(target: "wlan::tx", "aggregated write failed: {e}");
                adapter.dump_regs();
                adapter.invoke_recovery();
                EIO
            });
        self.used = 0;
        self.pkt_cnt = 0;
        ret
    }
}
