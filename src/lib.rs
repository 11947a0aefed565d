//! SDIO WLAN 传输层
//!
//! 把多端口 SDIO FIFO 上的包收发、命令管线、中断桥装配成一个驱动
//! 句柄 [`WlanDriver`]。平台只需实现两个契约：
//! - [`sdiobus::SdioDrv`]：CMD53 块/字节读写与功能寄存器访问
//! - [`sdiobus::OsOps`]：完成量等待/唤醒与毫秒睡眠
//!
//! 典型装配：平台在卡中断里调 [`WlanDriver::handle_card_interrupt`]，
//! 起一个处理线程循环 `io_event_wait` + [`WlanDriver::process_int_status`]，
//! 然后 [`WlanDriver::init`] 走完固件初始化序列。

#![no_std]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use core::time::Duration;

use axerrno::{AxError, AxResult};
use sdiobus::{
    CardCaps, CardType, IntBridge, OsOps, SdioDrv, DN_LD_CMD_PORT_HOST_INT_STATUS,
    DN_LD_HOST_INT_STATUS, EAGAIN, UP_LD_CMD_PORT_HOST_INT_STATUS, UP_LD_HOST_INT_STATUS,
};
use wifidrv::adapter::RecoveryFn;
use wifidrv::init::{ax_result, fw_init_cfg, post_init, shutdown};
use wifidrv::rx::{for_each_packet, read_rd_span, RdSpan};
use wifidrv::txpd::intf_header;
use wifidrv::vendor::VdllState;
use wifidrv::{Adapter, CmdPipeline, INBUF_SIZE};

pub use pktbuf::PktBuf;
pub use wifidrv::{hostcmd, BusMessage, DataInputFn, EventSinkFn, FwInitCfg, RetryPolicy};

/// WLAN 驱动句柄。
pub struct WlanDriver<D: SdioDrv, O: OsOps> {
    drv: D,
    os: O,
    adapter: spin::Mutex<Adapter>,
    pipeline: CmdPipeline,
    bridge: IntBridge,
    vdll: VdllState,
    /// 聚合读缓冲，处理线程独占
    inbuf: spin::Mutex<Vec<u8>>,
    tx_policy: RetryPolicy,
}

impl<D: SdioDrv, O: OsOps> WlanDriver<D, O> {
    pub fn new(drv: D, os: O, card: CardType) -> Self {
        Self {
            drv,
            os,
            adapter: spin::Mutex::new(Adapter::new(card)),
            pipeline: CmdPipeline::new(),
            bridge: IntBridge::new(),
            vdll: VdllState::new(),
            inbuf: spin::Mutex::new(vec![0u8; INBUF_SIZE]),
            tx_policy: RetryPolicy::default(),
        }
    }

    fn bus_params(&self) -> (CardCaps, u32) {
        let a = self.adapter.lock();
        (a.caps, a.ioport())
    }

    /// 上电初始化：解析 ioport、装配中断、跑完固件初始化命令序列。
    /// 调用前处理线程必须已经在跑，否则命令响应无人取。
    pub fn init(&self, cfg: &FwInitCfg) -> AxResult<()> {
        {
            let mut a = self.adapter.lock();
            ax_result(a.probe_ioport(&self.drv))?;
            ax_result(post_init(&self.drv, &mut a, &self.bridge))?;
        }
        let (caps, ioport) = self.bus_params();
        ax_result(fw_init_cfg(
            &self.drv,
            &self.os,
            &caps,
            ioport,
            &self.pipeline,
            &self.vdll,
            cfg,
        ))
    }

    /// 停机：关机命令、解除装配、端口复位。
    pub fn deinit(&self) -> AxResult<()> {
        let mut a = self.adapter.lock();
        ax_result(shutdown(&self.drv, &mut a, &self.pipeline, &self.bridge))
    }

    /// 卡中断入口（中断上下文安全，只做一次唤醒）。
    #[inline]
    pub fn handle_card_interrupt(&self) {
        self.bridge.handle_card_interrupt(&self.os);
    }

    /// 处理线程主体：重读寄存器快照、按中断位分路处理、重新装配。
    /// 一次调用消化快照里所有就绪端口。
    pub fn process_int_status(&self) -> AxResult<()> {
        let mut a = self.adapter.lock();
        ax_result(a.interrupt(&self.drv))?;
        let ireg = a.take_ireg();

        let drained = self.drain_ireg(&mut a, ireg);
        // 出错也要重新装配，否则中断桥不会再唤醒处理线程
        let armed =
            ax_result(self.bridge.arm(&self.drv, a.caps.host_int_mask_reg, a.caps.him_enable));
        drained.and(armed)
    }

    fn drain_ireg(&self, a: &mut Adapter, ireg: u8) -> AxResult<()> {
        if ireg & DN_LD_HOST_INT_STATUS != 0 {
            a.refresh_wr_bitmap();
        }
        if ireg & DN_LD_CMD_PORT_HOST_INT_STATUS != 0 {
            log::trace!(target: "wlan", "cmd port download done");
        }
        if ireg & UP_LD_CMD_PORT_HOST_INT_STATUS != 0 && a.caps.has_cmd_port {
            self.drain_cmd_port(a)?;
        }
        if ireg & UP_LD_HOST_INT_STATUS != 0 {
            a.refresh_rd_bitmap();
            loop {
                match a.plan_rd() {
                    Ok(span) => self.drain_span(a, &span)?,
                    Err(e) if e == EAGAIN => break,
                    Err(e) => return ax_result(Err(e)),
                }
            }
        }
        Ok(())
    }

    /// 命令端口上行：长度寄存器给出响应长度，单帧读入后走帧路由。
    fn drain_cmd_port(&self, a: &Adapter) -> AxResult<()> {
        let rx_len = a.cmd_rx_len() as usize;
        if rx_len == 0 {
            return Ok(());
        }
        let blksize = a.caps.block_size as usize;
        let span = RdSpan {
            addr: CmdPipeline::cmd_port_addr(&a.caps, a.ioport()),
            len: rx_len.div_ceil(blksize) * blksize,
            pkt_cnt: 1,
            ctrl: true,
        };
        self.drain_span(a, &span)
    }

    fn drain_span(&self, a: &Adapter, span: &RdSpan) -> AxResult<()> {
        let mut inbuf = self.inbuf.lock();
        ax_result(read_rd_span(&self.drv, a, span, &mut inbuf))?;
        let (caps, ioport) = (a.caps, a.ioport());
        ax_result(for_each_packet(&inbuf[..span.len], caps.block_size, |frame| {
            let Some((_, pkttype)) = intf_header(frame) else {
                return Ok(());
            };
            self.pipeline
                .deliver_frame(&self.drv, &self.os, &caps, ioport, &self.vdll, pkttype, frame);
            Ok(())
        }))
    }

    /// 盖章并发送一帧数据。`frame` 为完整下行缓冲（总线头 + 描述符 +
    /// payload），须容得下按块补齐后的长度。
    pub fn xmit(&self, frame: &mut [u8], txlen: usize, interface: u8, tid: u8) -> AxResult<()> {
        let mut a = self.adapter.lock();
        ax_result(wifidrv::tx::xmit_pkt(
            &self.drv,
            &self.os,
            &mut a,
            &self.tx_policy,
            frame,
            txlen,
            interface,
            tid,
        ))
    }

    /// 免盖章发送，帧里已带好描述符。
    pub fn xmit_bypass(&self, buf: &[u8], txlen: usize) -> AxResult<()> {
        let mut a = self.adapter.lock();
        ax_result(wifidrv::tx::xmit_bypass_pkt(
            &self.drv,
            &self.os,
            &mut a,
            &self.tx_policy,
            buf,
            txlen,
        ))
    }

    /// 单发单收的原始帧接收（标定/产测用）：装配中断桥、等卡中断、
    /// 读一帧进 `out`。返回帧长（含总线头）。
    pub fn recv_raw_frame(&self, out: &mut [u8], timeout_ms: u32) -> AxResult<usize> {
        {
            let a = self.adapter.lock();
            ax_result(self.bridge.arm(&self.drv, a.caps.host_int_mask_reg, a.caps.him_enable))?;
        }
        if self.os.io_event_wait(Duration::from_millis(timeout_ms as u64)) {
            return Err(AxError::TimedOut);
        }
        let mut a = self.adapter.lock();
        ax_result(a.interrupt(&self.drv))?;
        let _ = a.take_ireg();

        let span = if a.caps.has_cmd_port {
            let rx_len = a.cmd_rx_len() as usize;
            if rx_len == 0 {
                return Err(AxError::WouldBlock);
            }
            let blksize = a.caps.block_size as usize;
            RdSpan {
                addr: CmdPipeline::cmd_port_addr(&a.caps, a.ioport()),
                len: rx_len.div_ceil(blksize) * blksize,
                pkt_cnt: 1,
                ctrl: true,
            }
        } else {
            a.refresh_rd_bitmap();
            ax_result(a.plan_rd())?
        };

        let mut inbuf = self.inbuf.lock();
        ax_result(read_rd_span(&self.drv, &a, &span, &mut inbuf))?;
        let (size, _) = intf_header(&inbuf).ok_or(AxError::Io)?;
        let size = size as usize;
        if size > span.len || size > out.len() {
            return Err(AxError::NoMemory);
        }
        out[..size].copy_from_slice(&inbuf[..size]);
        Ok(size)
    }

    /// 发一条主机命令并等响应。`build` 从命令头起写入并返回命令长度。
    pub fn send_cmd(
        &self,
        build: impl FnOnce(&mut [u8], u16) -> Result<u16, i32>,
    ) -> AxResult<()> {
        let (caps, ioport) = self.bus_params();
        ax_result(self.pipeline.send_cmd(&self.drv, &self.os, &caps, ioport, &self.vdll, build))
    }

    /// 注入帧直发命令口（标定/产测用）。
    pub fn send_raw_frame(&self, payload: &[u8]) -> AxResult<()> {
        let (caps, ioport) = self.bus_params();
        ax_result(self.pipeline.send_raw_frame(&self.drv, &caps, ioport, payload))
    }

    /// 安装固件镜像供按需补丁下载使用。
    pub fn set_vdll_image(&self, image: Vec<u8>) {
        self.vdll.set_image(image);
    }

    pub fn register_event_sink(&self, sink: EventSinkFn) -> AxResult<()> {
        ax_result(self.pipeline.register_event_sink(sink))
    }

    /// 事件消费完把缓冲还给事件池。
    pub fn release_event_buf(&self, buf: PktBuf) {
        self.pipeline.release_event_buf(buf);
    }

    pub fn register_data_input(&self, cb: DataInputFn) -> AxResult<()> {
        ax_result(self.pipeline.register_data_input(cb))
    }

    pub fn register_recovery_cb(&self, cb: RecoveryFn) -> AxResult<()> {
        ax_result(self.adapter.lock().register_recovery_cb(cb))
    }

    pub fn mac_addr(&self) -> Option<[u8; 6]> {
        self.pipeline.mac_addr_sta()
    }

    pub fn mac_addr_uap(&self) -> Option<[u8; 6]> {
        self.pipeline.mac_addr_uap()
    }

    pub fn fw_ver_ext(&self) -> Option<alloc::string::String> {
        self.pipeline.fw_ver_ext()
    }

    pub fn hw_spec(&self) -> Option<hostcmd::HwSpec> {
        self.pipeline.hw_spec()
    }

    pub fn value1(&self) -> Option<u32> {
        self.pipeline.value1()
    }

    /// 未装配期间被丢弃的卡中断计数（诊断用）。
    pub fn dropped_interrupts(&self) -> u32 {
        self.bridge.dropped()
    }
}
