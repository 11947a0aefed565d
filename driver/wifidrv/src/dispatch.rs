//! 命令/响应管线与上行帧路由
//!
//! 约束：
//! - 共享命令缓冲只有一块，构帧、发送、等响应全程持 `tx` 锁，
//!   固件侧同一时刻最多一条在途命令
//! - 响应等待上限 20 秒；等满仍无响应说明命令管线已死，走致命钩子
//! - 关机命令的响应直接丢弃（发送方不等它）
//! - 初始化完成后事件转投注册的事件接收方；事件缓冲取自有界池，
//!   池空或投递失败记日志丢帧，被拒的缓冲归池

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use core::time::Duration;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;

use pktbuf::{PktBuf, PktPool};
use sdiobus::{CardCaps, OsOps, SdioDrv, CMD_PORT_SLCT, EEXIST, EINVAL, EIO, ETIMEDOUT};

use crate::hostcmd::{
    self, HostCmdHdr, CMD_802_11_MAC_ADDRESS, CMD_FUNC_SHUTDOWN, CMD_GET_HW_SPEC, CMD_ID_MASK,
    CMD_MAC_REG_ACCESS, CMD_VERSION_EXT,
};
use crate::tx::padded_len;
use crate::txpd::{intf_header, put_intf_header, stamp_raw_pkt, INTF_HEADER_LEN, PKT_TYPE_CMD, PKT_TYPE_DATA, PKT_TYPE_EVENT, PKT_TYPE_VDLL};
use crate::vendor::VdllState;
use crate::OUTBUF_SIZE;

/// 命令响应等待上限
pub const CMD_RESP_WAIT: Duration = Duration::from_millis(20_000);

/// 事件缓冲池大小
const EVENT_POOL_BUFS: usize = 8;

/// 事件接收方：队列满/不可投递时把消息退回，缓冲由管线归池。
pub type EventSinkFn = fn(msg: BusMessage) -> Result<(), BusMessage>;
/// 数据帧上送回调：interface 为帧描述符里的 BSS 类型。
pub type DataInputFn = fn(interface: u8, frame: &[u8]) -> Result<(), i32>;

/// 投给事件接收方的总线消息。
pub struct BusMessage {
    /// 总线帧类型（事件/命令响应）
    pub kind: u16,
    /// 去掉总线头后的帧内容
    pub buf: PktBuf,
}

/// 响应里提炼出的设备信息缓存。
#[derive(Default)]
struct DevInfo {
    mac_sta: Option<[u8; 6]>,
    mac_uap: Option<[u8; 6]>,
    fw_ver_ext: Option<String>,
    hw_spec: Option<hostcmd::HwSpec>,
    value1: Option<u32>,
}

struct CmdTx {
    /// 命令共享缓冲，发送期间独占
    outbuf: Box<[u8]>,
    /// 单调递增命令序号（低 8 位进 seq_num）
    seq_num: u16,
}

/// 命令管线。
pub struct CmdPipeline {
    tx: spin::Mutex<CmdTx>,
    last_cmd_sent: AtomicU16,
    in_flight: AtomicBool,
    /// 初始化序列是否已完成；完成前事件本地消化，不投队列
    fw_init_done: AtomicBool,
    info: spin::Mutex<DevInfo>,
    /// 事件缓冲池，池空时事件丢弃
    event_pool: PktPool,
    event_sink: spin::Mutex<Option<EventSinkFn>>,
    data_input: spin::Mutex<Option<DataInputFn>>,
}

impl CmdPipeline {
    pub fn new() -> Self {
        Self {
            tx: spin::Mutex::new(CmdTx {
                outbuf: vec![0u8; OUTBUF_SIZE].into_boxed_slice(),
                seq_num: 0,
            }),
            last_cmd_sent: AtomicU16::new(0),
            in_flight: AtomicBool::new(false),
            fw_init_done: AtomicBool::new(false),
            info: spin::Mutex::new(DevInfo::default()),
            event_pool: PktPool::new(EVENT_POOL_BUFS, crate::INBUF_SIZE, 0),
            event_sink: spin::Mutex::new(None),
            data_input: spin::Mutex::new(None),
        }
    }

    /// 命令走的 CMD53 地址。
    #[inline]
    pub fn cmd_port_addr(caps: &CardCaps, ioport: u32) -> u32 {
        if caps.has_cmd_port {
            ioport | CMD_PORT_SLCT
        } else {
            ioport
        }
    }

    #[inline]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    #[inline]
    pub fn last_cmd_sent(&self) -> u16 {
        self.last_cmd_sent.load(Ordering::Acquire)
    }

    pub fn set_fw_init_done(&self, done: bool) {
        self.fw_init_done.store(done, Ordering::Release);
    }

    /// 构帧 + 发送 + 等响应，全程持共享缓冲锁。
    /// `build` 把命令（命令头起）写进缓冲并返回命令长度；传入的 seq
    /// 已递增，需要特殊 BSS 编码的命令可以无视它自带 seq。
    pub fn send_cmd<D: SdioDrv, O: OsOps>(
        &self,
        drv: &D,
        os: &O,
        caps: &CardCaps,
        ioport: u32,
        vdll: &VdllState,
        build: impl FnOnce(&mut [u8], u16) -> Result<u16, i32>,
    ) -> Result<(), i32> {
        // 固件补丁下载窗口内不发命令
        vdll.wait_idle(os)?;

        let mut tx = self.tx.lock();
        let cmd = self.fill_outbuf(&mut tx, build)?;
        self.last_cmd_sent.store(cmd, Ordering::Release);
        self.in_flight.store(true, Ordering::Release);

        let ret = self.write_outbuf(drv, caps, ioport, &tx);
        if let Err(e) = ret {
            self.in_flight.store(false, Ordering::Release);
            log::error!(target: "wlan::cmd", "cmd 0x{cmd:04x} write failed: {e}");
            return Err(EIO);
        }

        if os.cmdresp_wait(CMD_RESP_WAIT) {
            self.in_flight.store(false, Ordering::Release);
            log::error!(target: "wlan::cmd", "cmd 0x{cmd:04x}: response wait timed out");
            os.on_cmd_timeout(cmd);
            return Err(ETIMEDOUT);
        }
        self.in_flight.store(false, Ordering::Release);
        Ok(())
    }

    /// 只发不等（关机命令用）。
    pub fn send_cmd_no_wait<D: SdioDrv>(
        &self,
        drv: &D,
        caps: &CardCaps,
        ioport: u32,
        build: impl FnOnce(&mut [u8], u16) -> Result<u16, i32>,
    ) -> Result<(), i32> {
        let mut tx = self.tx.lock();
        let cmd = self.fill_outbuf(&mut tx, build)?;
        self.last_cmd_sent.store(cmd, Ordering::Release);
        self.write_outbuf(drv, caps, ioport, &tx)
    }

    /// 注入帧直发命令口（标定/产测镜像用），不盖数据描述符之外的章。
    pub fn send_raw_frame<D: SdioDrv>(
        &self,
        drv: &D,
        caps: &CardCaps,
        ioport: u32,
        payload: &[u8],
    ) -> Result<(), i32> {
        let mut tx = self.tx.lock();
        let span = {
            let outbuf = &mut tx.outbuf;
            outbuf.fill(0);
            let span = stamp_raw_pkt(outbuf, payload.len() as u16, 0)?;
            if span + payload.len() > outbuf.len() {
                return Err(EINVAL);
            }
            outbuf[span..span + payload.len()].copy_from_slice(payload);
            span
        };
        let total = span + payload.len();
        let blocks = padded_len(total, caps.block_size) as u32 / caps.block_size;
        drv.write(
            Self::cmd_port_addr(caps, ioport),
            blocks,
            caps.block_size,
            &tx.outbuf[..(blocks * caps.block_size) as usize],
        )
        .map_err(|e| {
            log::error!(target: "wlan::cmd", "raw frame write failed: {e}");
            EIO
        })
    }

    fn fill_outbuf(
        &self,
        tx: &mut CmdTx,
        build: impl FnOnce(&mut [u8], u16) -> Result<u16, i32>,
    ) -> Result<u16, i32> {
        tx.seq_num = tx.seq_num.wrapping_add(1);
        let seq = tx.seq_num;
        tx.outbuf.fill(0);
        let cmd_size = build(&mut tx.outbuf[INTF_HEADER_LEN..], seq)?;
        let hdr = HostCmdHdr::decode(&tx.outbuf[INTF_HEADER_LEN..]).ok_or(EINVAL)?;
        put_intf_header(
            &mut tx.outbuf,
            cmd_size + INTF_HEADER_LEN as u16,
            PKT_TYPE_CMD,
        )?;
        Ok(hdr.command)
    }

    fn write_outbuf<D: SdioDrv>(
        &self,
        drv: &D,
        caps: &CardCaps,
        ioport: u32,
        tx: &CmdTx,
    ) -> Result<(), i32> {
        let (size, _) = intf_header(&tx.outbuf).ok_or(EINVAL)?;
        let padded = padded_len(size as usize, caps.block_size);
        let blocks = padded as u32 / caps.block_size;
        drv.write(
            Self::cmd_port_addr(caps, ioport),
            blocks,
            caps.block_size,
            &tx.outbuf[..padded],
        )
        .map_err(|_| EIO)
    }

    // ------------------------------------------------------------------
    // 上行路由
    // ------------------------------------------------------------------

    /// 拆包后的单帧入口。`frame` 含总线头。
    pub fn deliver_frame<D: SdioDrv, O: OsOps>(
        &self,
        drv: &D,
        os: &O,
        caps: &CardCaps,
        ioport: u32,
        vdll: &VdllState,
        pkttype: u16,
        frame: &[u8],
    ) {
        match pkttype {
            PKT_TYPE_CMD => self.handle_cmdresp(os, frame),
            PKT_TYPE_EVENT => self.handle_event(drv, caps, ioport, os, vdll, frame),
            PKT_TYPE_DATA => self.handle_data(frame),
            PKT_TYPE_VDLL => vdll.handle_vdll_block(drv, os, caps, ioport, frame),
            other => {
                log::warn!(target: "wlan::rx", "unknown bus frame type 0x{other:04x}, dropped");
            }
        }
    }

    /// 命令响应解码：校验响应位与在途命令号，类型化提炼进缓存，唤醒发送方。
    pub fn handle_cmdresp<O: OsOps>(&self, os: &O, frame: &[u8]) {
        let Some(hdr) = HostCmdHdr::decode(&frame[INTF_HEADER_LEN.min(frame.len())..]) else {
            log::warn!(target: "wlan::cmd", "short cmdresp frame ({} bytes)", frame.len());
            return;
        };
        if !hdr.is_response() {
            log::warn!(target: "wlan::cmd", "cmdresp without response bit: 0x{:04x}", hdr.command);
        }
        let expected = self.last_cmd_sent.load(Ordering::Acquire) & CMD_ID_MASK;
        if hdr.cmd_id() != expected {
            log::warn!(target: "wlan::cmd",
                "cmdresp 0x{:04x} does not match last sent 0x{expected:04x}", hdr.cmd_id());
        }
        if hdr.cmd_id() == CMD_FUNC_SHUTDOWN {
            // 关机响应无人等待
            log::debug!(target: "wlan::cmd", "shutdown response discarded");
            return;
        }
        if hdr.result != 0 {
            log::warn!(target: "wlan::cmd",
                "cmd 0x{:04x} failed in firmware, result={}", hdr.cmd_id(), hdr.result);
        }

        let end = (hdr.size as usize + INTF_HEADER_LEN).min(frame.len());
        let body = &frame[(INTF_HEADER_LEN + hostcmd::CMD_HDR_LEN).min(end)..end];
        self.extract_response(hdr, body);
        os.cmdresp_signal();
    }

    fn extract_response(&self, hdr: HostCmdHdr, body: &[u8]) {
        let mut info = self.info.lock();
        match hdr.cmd_id() {
            CMD_GET_HW_SPEC => {
                info.hw_spec = hostcmd::parse_hw_spec(body);
                if info.hw_spec.is_none() {
                    log::warn!(target: "wlan::cmd", "malformed hw spec response");
                }
            }
            CMD_802_11_MAC_ADDRESS => {
                if let Some(mac) = hostcmd::parse_mac_addr(body) {
                    // 响应按 seq_num 里的 BSS 类型归位
                    if hostcmd::bss_type_from_seq(hdr.seq_num) == hostcmd::BSS_TYPE_UAP {
                        info.mac_uap = Some(mac);
                    } else {
                        info.mac_sta = Some(mac);
                    }
                }
            }
            CMD_VERSION_EXT => {
                if let Some((sel, ver)) = hostcmd::parse_fw_ver_ext(body) {
                    log::info!(target: "wlan::cmd", "fw version (sel {sel}): {ver}");
                    info.fw_ver_ext = Some(ver);
                }
            }
            CMD_MAC_REG_ACCESS => {
                if let Some((_, value)) = hostcmd::parse_mac_reg(body) {
                    info.value1 = Some(value);
                }
            }
            other => {
                log::debug!(target: "wlan::cmd", "cmdresp 0x{other:04x}: no typed extraction");
            }
        }
    }

    fn handle_event<D: SdioDrv, O: OsOps>(
        &self,
        drv: &D,
        caps: &CardCaps,
        ioport: u32,
        os: &O,
        vdll: &VdllState,
        frame: &[u8],
    ) {
        let body = &frame[INTF_HEADER_LEN.min(frame.len())..];
        if body.len() < 2 {
            log::warn!(target: "wlan::rx", "short event frame, dropped");
            return;
        }
        let event = u16::from_le_bytes([body[0], body[1]]);

        // 补丁下载指示在投递前就地处理
        if event == crate::vendor::EVENT_VDLL_IND {
            vdll.handle_vdll_ind(drv, os, caps, ioport, body);
            return;
        }

        if !self.fw_init_done.load(Ordering::Acquire) {
            log::debug!(target: "wlan::rx", "event 0x{event:04x} before init done, handled locally");
            return;
        }
        let Some(sink) = *self.event_sink.lock() else {
            log::debug!(target: "wlan::rx", "event 0x{event:04x}: no sink registered, dropped");
            return;
        };
        let Some(mut ev) = self.event_pool.get() else {
            log::warn!(target: "wlan::rx", "event 0x{event:04x}: event pool exhausted, dropped");
            return;
        };
        let Some(dst) = ev.append(body.len()) else {
            log::warn!(target: "wlan::rx",
                "event 0x{event:04x} too large ({} bytes), dropped", body.len());
            self.event_pool.put(ev);
            return;
        };
        dst.copy_from_slice(body);
        let msg = BusMessage {
            kind: PKT_TYPE_EVENT,
            buf: ev,
        };
        if let Err(msg) = sink(msg) {
            // 队列满：丢帧，缓冲归池
            log::warn!(target: "wlan::rx", "event 0x{event:04x} not queued, dropped");
            self.event_pool.put(msg.buf);
        }
    }

    fn handle_data(&self, frame: &[u8]) {
        if frame.len() <= INTF_HEADER_LEN {
            return;
        }
        let cb = *self.data_input.lock();
        match cb {
            Some(cb) => {
                // 描述符首字节是 BSS 类型
                let interface = frame[INTF_HEADER_LEN];
                if let Err(e) = cb(interface, &frame[INTF_HEADER_LEN..]) {
                    log::warn!(target: "wlan::rx", "data input rejected ({e}), frame dropped");
                }
            }
            None => {
                log::debug!(target: "wlan::rx", "data frame before input callback registered, dropped");
            }
        }
    }

    // ------------------------------------------------------------------
    // 注册与查询
    // ------------------------------------------------------------------

    /// 注册事件接收方。只允许一个注册方。
    pub fn register_event_sink(&self, sink: EventSinkFn) -> Result<(), i32> {
        let mut slot = self.event_sink.lock();
        if slot.is_some() {
            return Err(EEXIST);
        }
        *slot = Some(sink);
        Ok(())
    }

    pub fn unregister_event_sink(&self) {
        *self.event_sink.lock() = None;
    }

    /// 事件消费完把缓冲还给池。不还则池逐渐耗尽、后续事件被丢。
    pub fn release_event_buf(&self, buf: PktBuf) {
        self.event_pool.put(buf);
    }

    pub fn event_bufs_available(&self) -> usize {
        self.event_pool.available()
    }

    /// 注册数据帧上送回调。只允许一个注册方。
    pub fn register_data_input(&self, cb: DataInputFn) -> Result<(), i32> {
        let mut slot = self.data_input.lock();
        if slot.is_some() {
            return Err(EEXIST);
        }
        *slot = Some(cb);
        Ok(())
    }

    pub fn unregister_data_input(&self) {
        *self.data_input.lock() = None;
    }

    pub fn mac_addr_sta(&self) -> Option<[u8; 6]> {
        self.info.lock().mac_sta
    }

    pub fn mac_addr_uap(&self) -> Option<[u8; 6]> {
        self.info.lock().mac_uap
    }

    pub fn fw_ver_ext(&self) -> Option<String> {
        self.info.lock().fw_ver_ext.clone()
    }

    pub fn hw_spec(&self) -> Option<hostcmd::HwSpec> {
        self.info.lock().hw_spec
    }

    pub fn value1(&self) -> Option<u32> {
        self.info.lock().value1
    }
}

impl Default for CmdPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::sync::atomic::AtomicU32;

    struct RecordingDrv {
        writes: RefCell<alloc::vec::Vec<(u32, alloc::vec::Vec<u8>)>>,
    }
    impl RecordingDrv {
        fn new() -> Self {
            Self {
                writes: RefCell::new(alloc::vec::Vec::new()),
            }
        }
    }
    impl SdioDrv for RecordingDrv {
        fn read(&self, _: u32, _: u32, _: u32, buf: &mut [u8]) -> Result<(), i32> {
            buf.fill(0);
            Ok(())
        }
        fn write(&self, addr: u32, _: u32, _: u32, buf: &[u8]) -> Result<(), i32> {
            self.writes.borrow_mut().push((addr, buf.to_vec()));
            Ok(())
        }
        fn creg_read(&self, _: u32, _: u32) -> Result<u8, i32> {
            Ok(0)
        }
        fn creg_write(&self, _: u32, _: u32, _: u8) -> Result<(), i32> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct ProbeOs {
        /// cmdresp_wait 的返回值（true = 超时）
        time_out: bool,
        signals: AtomicU32,
        timeouts: AtomicU32,
    }
    impl OsOps for ProbeOs {
        fn cmdresp_wait(&self, _: Duration) -> bool {
            self.time_out
        }
        fn cmdresp_signal(&self) {
            self.signals.fetch_add(1, Ordering::Relaxed);
        }
        fn io_event_wait(&self, _: Duration) -> bool {
            true
        }
        fn io_event_signal(&self) {}
        fn vdll_wait(&self, _: Duration) -> bool {
            true
        }
        fn vdll_signal(&self) {}
        fn sleep_ms(&self, _: u32) {}
        fn on_cmd_timeout(&self, _cmd: u16) {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn cmdresp_frame(command: u16, seq: u16, body: &[u8]) -> alloc::vec::Vec<u8> {
        let cmd_size = (hostcmd::CMD_HDR_LEN + body.len()) as u16;
        let mut frame = vec![0u8; INTF_HEADER_LEN + cmd_size as usize];
        put_intf_header(&mut frame, cmd_size + INTF_HEADER_LEN as u16, PKT_TYPE_CMD).unwrap();
        HostCmdHdr {
            command,
            size: cmd_size,
            seq_num: seq,
            result: 0,
        }
        .encode(&mut frame[INTF_HEADER_LEN..])
        .unwrap();
        frame[INTF_HEADER_LEN + hostcmd::CMD_HDR_LEN..].copy_from_slice(body);
        frame
    }

    #[test]
    fn cmd_goes_to_cmd_port_addr() {
        let drv = RecordingDrv::new();
        let os = ProbeOs::default();
        let p = CmdPipeline::new();
        let vdll = VdllState::new();

        let caps = CardCaps::sd89xx();
        p.send_cmd(&drv, &os, &caps, 0x10000, &vdll, hostcmd::prepare_func_init)
            .unwrap();
        assert_eq!(drv.writes.borrow()[0].0, 0x10000 | CMD_PORT_SLCT);
        assert_eq!(p.last_cmd_sent(), hostcmd::CMD_FUNC_INIT);
        assert!(!p.is_in_flight());

        // 16 端口卡没有命令端口，命令直接走 ioport（控制端口 0）
        let caps = CardCaps::sd8801();
        p.send_cmd(&drv, &os, &caps, 0x8000, &vdll, hostcmd::prepare_func_init)
            .unwrap();
        assert_eq!(drv.writes.borrow()[1].0, 0x8000);
    }

    #[test]
    fn hw_spec_response_cached_and_waiter_released() {
        let os = ProbeOs::default();
        let p = CmdPipeline::new();
        p.last_cmd_sent.store(CMD_GET_HW_SPEC, Ordering::Release);

        let mut body = [0u8; 22];
        body[8..14].copy_from_slice(&[2, 4, 6, 8, 10, 12]);
        let frame = cmdresp_frame(CMD_GET_HW_SPEC | hostcmd::CMD_RESP_BIT, 1, &body);
        p.handle_cmdresp(&os, &frame);

        assert_eq!(os.signals.load(Ordering::Relaxed), 1);
        assert_eq!(p.hw_spec().unwrap().permanent_addr, [2, 4, 6, 8, 10, 12]);
    }

    #[test]
    fn mac_responses_routed_by_bss_type() {
        let os = ProbeOs::default();
        let p = CmdPipeline::new();

        let mut body = [0u8; 8];
        body[2..8].copy_from_slice(&[1, 1, 1, 1, 1, 1]);
        let frame = cmdresp_frame(CMD_802_11_MAC_ADDRESS | hostcmd::CMD_RESP_BIT, 1, &body);
        p.handle_cmdresp(&os, &frame);

        body[2..8].copy_from_slice(&[2, 2, 2, 2, 2, 2]);
        let seq = hostcmd::seq_with_bss(0, 0, hostcmd::BSS_TYPE_UAP);
        let frame = cmdresp_frame(CMD_802_11_MAC_ADDRESS | hostcmd::CMD_RESP_BIT, seq, &body);
        p.handle_cmdresp(&os, &frame);

        assert_eq!(p.mac_addr_sta(), Some([1; 6]));
        assert_eq!(p.mac_addr_uap(), Some([2; 6]));
    }

    #[test]
    fn shutdown_response_releases_nobody() {
        let os = ProbeOs::default();
        let p = CmdPipeline::new();
        let frame = cmdresp_frame(CMD_FUNC_SHUTDOWN | hostcmd::CMD_RESP_BIT, 1, &[]);
        p.handle_cmdresp(&os, &frame);
        assert_eq!(os.signals.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn timeout_fires_fatal_hook_once() {
        let drv = RecordingDrv::new();
        let os = ProbeOs {
            time_out: true,
            ..ProbeOs::default()
        };
        let p = CmdPipeline::new();
        let vdll = VdllState::new();
        let caps = CardCaps::sd8801();

        let ret = p.send_cmd(&drv, &os, &caps, 0x8000, &vdll, hostcmd::prepare_get_hw_spec);
        assert_eq!(ret, Err(ETIMEDOUT));
        assert_eq!(os.timeouts.load(Ordering::Relaxed), 1);
        assert!(!p.is_in_flight());
    }

    #[test]
    fn single_sink_registration() {
        fn sink(_: BusMessage) -> Result<(), BusMessage> {
            Ok(())
        }
        fn input(_: u8, _: &[u8]) -> Result<(), i32> {
            Ok(())
        }
        let p = CmdPipeline::new();
        assert!(p.register_event_sink(sink).is_ok());
        assert_eq!(p.register_event_sink(sink), Err(EEXIST));
        p.unregister_event_sink();
        assert!(p.register_event_sink(sink).is_ok());

        assert!(p.register_data_input(input).is_ok());
        assert_eq!(p.register_data_input(input), Err(EEXIST));
    }

    fn event_frame(event: u16) -> alloc::vec::Vec<u8> {
        let mut frame = vec![0u8; INTF_HEADER_LEN + 4];
        put_intf_header(
            &mut frame,
            (INTF_HEADER_LEN + 4) as u16,
            PKT_TYPE_EVENT,
        )
        .unwrap();
        frame[INTF_HEADER_LEN..INTF_HEADER_LEN + 2].copy_from_slice(&event.to_le_bytes());
        frame
    }

    #[test]
    fn event_buffers_come_from_bounded_pool() {
        static DELIVERED: AtomicU32 = AtomicU32::new(0);
        fn sink(_: BusMessage) -> Result<(), BusMessage> {
            DELIVERED.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        let drv = RecordingDrv::new();
        let os = ProbeOs::default();
        let caps = CardCaps::sd89xx();
        let vdll = VdllState::new();
        let p = CmdPipeline::new();
        p.set_fw_init_done(true);
        p.register_event_sink(sink).unwrap();

        let frame = event_frame(0x000a);
        let total = p.event_bufs_available();
        for _ in 0..total {
            p.deliver_frame(&drv, &os, &caps, 0x10000, &vdll, PKT_TYPE_EVENT, &frame);
        }
        assert_eq!(DELIVERED.load(Ordering::Relaxed) as usize, total);
        assert_eq!(p.event_bufs_available(), 0);

        // 池空：事件丢弃，接收方不再被调用
        p.deliver_frame(&drv, &os, &caps, 0x10000, &vdll, PKT_TYPE_EVENT, &frame);
        assert_eq!(DELIVERED.load(Ordering::Relaxed) as usize, total);

        // 消费方归还缓冲后恢复投递
        p.release_event_buf(PktBuf::alloc(16));
        p.deliver_frame(&drv, &os, &caps, 0x10000, &vdll, PKT_TYPE_EVENT, &frame);
        assert_eq!(DELIVERED.load(Ordering::Relaxed) as usize, total + 1);
    }

    #[test]
    fn rejected_event_returns_buffer_to_pool() {
        fn rejecting(msg: BusMessage) -> Result<(), BusMessage> {
            Err(msg)
        }
        let drv = RecordingDrv::new();
        let os = ProbeOs::default();
        let caps = CardCaps::sd89xx();
        let vdll = VdllState::new();
        let p = CmdPipeline::new();
        p.set_fw_init_done(true);
        p.register_event_sink(rejecting).unwrap();

        let total = p.event_bufs_available();
        let frame = event_frame(0x000b);
        p.deliver_frame(&drv, &os, &caps, 0x10000, &vdll, PKT_TYPE_EVENT, &frame);
        // 投递被拒的缓冲立即归池
        assert_eq!(p.event_bufs_available(), total);
    }

    #[test]
    fn raw_frame_lands_on_cmd_port() {
        let drv = RecordingDrv::new();
        let p = CmdPipeline::new();
        let caps = CardCaps::sd89xx();
        let payload = [0x77u8; 100];
        p.send_raw_frame(&drv, &caps, 0x10000, &payload).unwrap();

        let writes = drv.writes.borrow();
        assert_eq!(writes[0].0, 0x10000 | CMD_PORT_SLCT);
        // 注入帧头部跨度之后是 payload 本体
        assert_eq!(&writes[0].1[0x18..0x18 + 100], &payload[..]);
    }
}
