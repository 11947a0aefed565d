//! 接收聚合
//!
//! 上行就绪后从快照规划一次 CMD53 读：控制端口单独成段，数据端口
//! 从读游标起连续吸入，直到缓冲上限、帧数上限或地址跨度约束命中。
//! 容量约束在清位之前判，跨度约束在吸入后按新游标判；没吸入的
//! 端口留在位图里等下一轮。

use sdiobus::{SdioDrv, EAGAIN, EINVAL, EIO, HOST_TERM_CMD53, MPA_ADDR_BASE};

use crate::adapter::Adapter;
use crate::tx::padded_len;
use crate::txpd::{intf_header, INTF_HEADER_LEN};
use crate::INBUF_SIZE;

/// 同一段读失败后的重试上限
pub const MAX_READ_IOMEM_RETRY: u32 = 2;

/// 一次 CMD53 读的规划结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdSpan {
    /// CMD53 地址（单端口为 ioport+port，聚合带聚合基址与槽位/帧数段）
    pub addr: u32,
    /// 传输总长（已按块补齐）
    pub len: usize,
    /// 段内帧数
    pub pkt_cnt: u8,
    /// 是否为控制端口段（帧走命令/事件通路）
    pub ctrl: bool,
}

impl Adapter {
    /// 从读位图规划下一段读。没有就绪端口时返回 [`EAGAIN`]。
    pub fn plan_rd(&mut self) -> Result<RdSpan, i32> {
        let ctrl_mask = self.caps.ctrl_port_mask();
        if self.mp_rd_bitmap & ctrl_mask != 0 {
            self.mp_rd_bitmap &= !ctrl_mask;
            let len = padded_len(self.rx_len_for_port(0) as usize, self.caps.block_size);
            if len == 0 {
                return Err(EAGAIN);
            }
            return Ok(RdSpan {
                addr: self.ioport(),
                len,
                pkt_cnt: 1,
                ctrl: true,
            });
        }

        let mut start_port: Option<u8> = None;
        let mut slot_mask: u32 = 0;
        let mut total: usize = 0;
        let mut pkt_cnt: u8 = 0;

        loop {
            let port = self.curr_rd_port;
            if self.mp_rd_bitmap & (1u32 << port) == 0 {
                break;
            }
            let len = padded_len(self.rx_len_for_port(port) as usize, self.caps.block_size);
            if len == 0 {
                // 长度寄存器还没就位，位留着下一轮快照后再读
                break;
            }
            // 容量约束在清位之前判，本段放不下的端口留给下一段
            if total + len > INBUF_SIZE {
                if pkt_cnt == 0 {
                    // 单端口长度就超出接收缓冲：长度寄存器已失步，
                    // 该端口永远读不动，丢弃以免规划卡死
                    log::error!(target: "wlan::rx",
                        "port {port} reports {len} bytes, exceeds inbuf, discarded");
                    self.mp_rd_bitmap &= !(1u32 << port);
                    self.advance_rd_cursor();
                    continue;
                }
                break;
            }
            self.mp_rd_bitmap &= !(1u32 << port);
            let start = *start_port.get_or_insert(port);
            let slot = if start <= port { pkt_cnt } else { pkt_cnt + 1 };
            slot_mask |= 1u32 << slot;
            total += len;
            pkt_cnt += 1;
            self.advance_rd_cursor();
            if pkt_cnt >= self.caps.mp_aggr_pkt_limit {
                break;
            }
            // 地址跨度约束按新游标算：跨回绕点时折算成环上距离
            let cursor = self.curr_rd_port;
            let wrapped = cursor < start;
            let span = if wrapped {
                (self.caps.max_port - start) + cursor
            } else {
                cursor - start
            };
            let over = if self.caps.wide_bitmap {
                span >= self.caps.mp_end_port >> 1
            } else {
                wrapped && span >= self.caps.mp_aggr_pkt_limit
            };
            if over {
                break;
            }
        }

        let Some(start_port) = start_port else {
            return Err(EAGAIN);
        };
        let addr = if pkt_cnt == 1 {
            self.ioport() + start_port as u32
        } else if self.caps.wide_bitmap {
            (self.ioport() | MPA_ADDR_BASE | (((pkt_cnt as u32) - 1) << 8)) + start_port as u32
        } else {
            (self.ioport() | MPA_ADDR_BASE | (slot_mask << 4)) + start_port as u32
        };
        log::trace!(target: "wlan::rx",
            "rd span: {pkt_cnt} pkts, {total} bytes, cmd53 addr 0x{addr:x}");
        Ok(RdSpan {
            addr,
            len: total,
            pkt_cnt,
            ctrl: false,
        })
    }
}

/// 执行规划好的读。失败先向卡发 CMD53 终止事件再重试，
/// 重试耗尽则留寄存器现场并触发恢复。
pub fn read_rd_span<D: SdioDrv>(
    drv: &D,
    adapter: &Adapter,
    span: &RdSpan,
    buf: &mut [u8],
) -> Result<(), i32> {
    if buf.len() < span.len {
        return Err(EINVAL);
    }
    let blksize = adapter.caps.block_size;
    let blocks = (span.len as u32) / blksize;
    let mut tries = 0;
    loop {
        match drv.read(span.addr, blocks, blksize, &mut buf[..span.len]) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tries += 1;
                log::warn!(target: "wlan::rx",
                    "cmd53 read 0x{:x} failed ({e}), try {tries}", span.addr);
                if tries > MAX_READ_IOMEM_RETRY {
                    adapter.dump_regs();
                    adapter.invoke_recovery();
                    return Err(EIO);
                }
                let _ = drv.creg_write(
                    adapter.caps.host_to_card_event_reg as u32,
                    1,
                    HOST_TERM_CMD53,
                );
            }
        }
    }
}

/// 遍历读缓冲里的帧。每帧以总线头起始、按块对齐排布，
/// 头部声称的长度越界视为缓冲损坏。
pub fn for_each_packet<F>(buf: &[u8], block_size: u32, mut f: F) -> Result<(), i32>
where
    F: FnMut(&[u8]) -> Result<(), i32>,
{
    let mut off = 0;
    while off + INTF_HEADER_LEN <= buf.len() {
        let Some((size, _)) = intf_header(&buf[off..]) else {
            break;
        };
        let size = size as usize;
        if size == 0 {
            break;
        }
        if size < INTF_HEADER_LEN || off + size > buf.len() {
            log::error!(target: "wlan::rx",
                "malformed frame header at +{off}: size {size}, buf {}", buf.len());
            return Err(EINVAL);
        }
        f(&buf[off..off + size])?;
        off += padded_len(size, block_size);
    }
    Ok(())
}
