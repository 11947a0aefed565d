//! 固件补丁按需下载（VDLL）
//!
//! 固件运行期通过事件按块索要自身镜像的片段，主机从命令口回写。
//! 下载窗口打开期间不能发主机命令；窗口关闭（完成/出错指示）时
//! 通过完成量唤醒等待方，等待方不轮询。

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use alloc::vec;
use alloc::vec::Vec;

use sdiobus::{CardCaps, OsOps, SdioDrv, EIO, ETIMEDOUT};

use crate::tx::padded_len;
use crate::txpd::{put_intf_header, INTF_HEADER_LEN, PKT_TYPE_VDLL};

/// 补丁下载指示事件号
pub const EVENT_VDLL_IND: u16 = 0x0081;

/// 指示类型：请求镜像块
pub const VDLL_IND_TYPE_REQ: u16 = 0;
/// 指示类型：下载完成
pub const VDLL_IND_TYPE_COMPLETE: u16 = 1;
/// 指示类型：固件侧出错，窗口作废
pub const VDLL_IND_TYPE_ERR: u16 = 2;

/// 等窗口关闭的轮数上限（每轮最长 1 秒）
const WAIT_IDLE_ROUNDS: u32 = 20;

/// 补丁请求指示（事件体里事件号之后的部分）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdllInd {
    pub ind_type: u16,
    pub offset: u32,
    pub block_len: u16,
}

impl VdllInd {
    /// 事件体解码（事件号 u16 + 类型 u16 + 偏移 u32 + 块长 u16）。
    pub fn decode(body: &[u8]) -> Option<Self> {
        if body.len() < 10 {
            return None;
        }
        Some(Self {
            ind_type: u16::from_le_bytes([body[2], body[3]]),
            offset: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
            block_len: u16::from_le_bytes([body[8], body[9]]),
        })
    }
}

/// 补丁下载窗口状态。
pub struct VdllState {
    in_progress: AtomicBool,
    /// 固件镜像，供按块回写；未设置时只能拒绝请求
    image: spin::Mutex<Option<Vec<u8>>>,
}

impl VdllState {
    pub fn new() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            image: spin::Mutex::new(None),
        }
    }

    /// 设置固件镜像来源。
    pub fn set_image(&self, image: Vec<u8>) {
        *self.image.lock() = Some(image);
    }

    #[inline]
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// 阻塞到下载窗口关闭。窗口迟迟不关返回 [`ETIMEDOUT`]。
    pub fn wait_idle<O: OsOps>(&self, os: &O) -> Result<(), i32> {
        if !self.in_progress() {
            return Ok(());
        }
        for _ in 0..WAIT_IDLE_ROUNDS {
            if !self.in_progress() {
                return Ok(());
            }
            let _ = os.vdll_wait(Duration::from_millis(1000));
        }
        if self.in_progress() {
            log::error!(target: "wlan::vdll", "download window never closed");
            return Err(ETIMEDOUT);
        }
        Ok(())
    }

    /// 下载指示事件入口（事件体）。
    pub fn handle_vdll_ind<D: SdioDrv, O: OsOps>(
        &self,
        drv: &D,
        os: &O,
        caps: &CardCaps,
        ioport: u32,
        body: &[u8],
    ) {
        let Some(ind) = VdllInd::decode(body) else {
            log::warn!(target: "wlan::vdll", "short vdll indication, ignored");
            return;
        };
        match ind.ind_type {
            VDLL_IND_TYPE_REQ => {
                self.in_progress.store(true, Ordering::Release);
                if let Err(e) = self.send_block(drv, caps, ioport, ind.offset, ind.block_len) {
                    log::error!(target: "wlan::vdll",
                        "block @0x{:x}+{} send failed: {e}", ind.offset, ind.block_len);
                    self.close_window(os);
                }
            }
            VDLL_IND_TYPE_COMPLETE => {
                log::debug!(target: "wlan::vdll", "download complete");
                self.close_window(os);
            }
            VDLL_IND_TYPE_ERR => {
                log::error!(target: "wlan::vdll", "firmware aborted download");
                self.close_window(os);
            }
            other => {
                log::warn!(target: "wlan::vdll", "unknown vdll indication type {other}");
            }
        }
    }

    /// 下行补丁帧（携带指示的另一条路径），与事件同样处理。
    pub fn handle_vdll_block<D: SdioDrv, O: OsOps>(
        &self,
        drv: &D,
        os: &O,
        caps: &CardCaps,
        ioport: u32,
        frame: &[u8],
    ) {
        if frame.len() <= INTF_HEADER_LEN {
            return;
        }
        self.handle_vdll_ind(drv, os, caps, ioport, &frame[INTF_HEADER_LEN..]);
    }

    fn close_window<O: OsOps>(&self, os: &O) {
        self.in_progress.store(false, Ordering::Release);
        os.vdll_signal();
    }

    fn send_block<D: SdioDrv>(
        &self,
        drv: &D,
        caps: &CardCaps,
        ioport: u32,
        offset: u32,
        block_len: u16,
    ) -> Result<(), i32> {
        let image = self.image.lock();
        let Some(image) = image.as_ref() else {
            log::error!(target: "wlan::vdll", "block requested but no image installed");
            return Err(EIO);
        };
        let start = offset as usize;
        let end = start.saturating_add(block_len as usize).min(image.len());
        if start >= image.len() {
            return Err(EIO);
        }
        let chunk = &image[start..end];

        let total = INTF_HEADER_LEN + chunk.len();
        let padded = padded_len(total, caps.block_size);
        let mut frame = vec![0u8; padded];
        put_intf_header(&mut frame, total as u16, PKT_TYPE_VDLL)?;
        frame[INTF_HEADER_LEN..total].copy_from_slice(chunk);

        let addr = crate::dispatch::CmdPipeline::cmd_port_addr(caps, ioport);
        drv.write(addr, padded as u32 / caps.block_size, caps.block_size, &frame)
            .map_err(|e| {
                log::error!(target: "wlan::vdll", "cmd53 write failed: {e}");
                EIO
            })
    }
}

impl Default for VdllState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;

    struct NullDrv;
    impl SdioDrv for NullDrv {
        fn read(&self, _: u32, _: u32, _: u32, _: &mut [u8]) -> Result<(), i32> {
            Ok(())
        }
        fn write(&self, _: u32, _: u32, _: u32, _: &[u8]) -> Result<(), i32> {
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
    struct CountingOs {
        vdll_signals: AtomicU32,
    }
    impl OsOps for CountingOs {
        fn cmdresp_wait(&self, _: Duration) -> bool {
            true
        }
        fn cmdresp_signal(&self) {}
        fn io_event_wait(&self, _: Duration) -> bool {
            true
        }
        fn io_event_signal(&self) {}
        fn vdll_wait(&self, _: Duration) -> bool {
            true
        }
        fn vdll_signal(&self) {
            self.vdll_signals.fetch_add(1, Ordering::Relaxed);
        }
        fn sleep_ms(&self, _: u32) {}
    }

    fn ind_body(ind_type: u16, offset: u32, len: u16) -> [u8; 10] {
        let mut b = [0u8; 10];
        b[0..2].copy_from_slice(&EVENT_VDLL_IND.to_le_bytes());
        b[2..4].copy_from_slice(&ind_type.to_le_bytes());
        b[4..8].copy_from_slice(&offset.to_le_bytes());
        b[8..10].copy_from_slice(&len.to_le_bytes());
        b
    }

    #[test]
    fn window_opens_on_req_closes_on_complete() {
        let vdll = VdllState::new();
        let os = CountingOs::default();
        let caps = sdiobus::CardCaps::sd8801();
        vdll.set_image(alloc::vec![0u8; 1024]);

        vdll.handle_vdll_ind(&NullDrv, &os, &caps, 0x10000, &ind_body(VDLL_IND_TYPE_REQ, 0, 256));
        assert!(vdll.in_progress());

        vdll.handle_vdll_ind(&NullDrv, &os, &caps, 0x10000, &ind_body(VDLL_IND_TYPE_COMPLETE, 0, 0));
        assert!(!vdll.in_progress());
        assert_eq!(os.vdll_signals.load(Ordering::Relaxed), 1);
        assert!(vdll.wait_idle(&os).is_ok());
    }

    #[test]
    fn req_without_image_aborts_window() {
        let vdll = VdllState::new();
        let os = CountingOs::default();
        let caps = sdiobus::CardCaps::sd8801();
        vdll.handle_vdll_ind(&NullDrv, &os, &caps, 0x10000, &ind_body(VDLL_IND_TYPE_REQ, 0, 256));
        // 无镜像：窗口立刻关闭并唤醒等待方
        assert!(!vdll.in_progress());
        assert_eq!(os.vdll_signals.load(Ordering::Relaxed), 1);
    }
}
