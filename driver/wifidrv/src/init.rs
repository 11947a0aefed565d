//! 固件初始化序列与停机
//!
//! 上电后按固定顺序把固件拉到可收发状态：功能初始化、可选的低功耗
//! 与标定数据、发送缓冲重配、设备信息查询、MAC 控制使能。序列里任何
//! 一条命令失败即整体失败，不做部分初始化。

use alloc::vec::Vec;

use axerrno::{AxError, AxResult};
use sdiobus::{IntBridge, OsOps, SdioDrv, EAGAIN, EBUSY, EEXIST, EINVAL, ENOMEM, ETIMEDOUT};

use crate::adapter::Adapter;
use crate::dispatch::CmdPipeline;
use crate::hostcmd::{self, BSS_TYPE_UAP};
use crate::vendor::VdllState;

/// MAC 控制字：收发使能
const MAC_CTRL_RX_TX_ON: u32 = 0x0003;

/// 初始化序列的可调项。
pub struct FwInitCfg {
    /// 先于其他配置下发低功耗模式
    pub low_power: bool,
    /// 射频标定数据，产线固件需要
    pub cal_data: Option<Vec<u8>>,
    /// 覆盖固件内置 MAC 地址
    pub mac_addr: Option<[u8; 6]>,
    /// 查询信道区域配置
    pub chan_region_cfg: bool,
    pub ht_tx_cap: u16,
    pub ht_tx_info: u16,
    pub amsdu_aggr: bool,
}

impl Default for FwInitCfg {
    fn default() -> Self {
        Self {
            low_power: false,
            cal_data: None,
            mac_addr: None,
            chan_region_cfg: true,
            ht_tx_cap: 0x002c,
            ht_tx_info: 0x0003,
            amsdu_aggr: true,
        }
    }
}

/// 负 errno 映射到平台错误码。
pub fn ax_result<T>(ret: Result<T, i32>) -> AxResult<T> {
    ret.map_err(|e| match e {
        e if e == EAGAIN => AxError::WouldBlock,
        e if e == ENOMEM => AxError::NoMemory,
        e if e == EBUSY => AxError::ResourceBusy,
        e if e == EEXIST => AxError::AlreadyExists,
        e if e == EINVAL => AxError::InvalidInput,
        e if e == ETIMEDOUT => AxError::TimedOut,
        _ => AxError::Io,
    })
}

/// 固件初始化序列。完成后命令/数据/事件三条通路都可用。
/// 调用方不得持有适配器锁：序列里的每条命令都要等响应，
/// 响应得由接收线程拿着适配器锁去取。
pub fn fw_init_cfg<D: SdioDrv, O: OsOps>(
    drv: &D,
    os: &O,
    caps: &sdiobus::CardCaps,
    ioport: u32,
    pipeline: &CmdPipeline,
    vdll: &VdllState,
    cfg: &FwInitCfg,
) -> Result<(), i32> {
    macro_rules! cmd {
        ($build:expr) => {
            pipeline.send_cmd(drv, os, caps, ioport, vdll, $build)?
        };
    }

    cmd!(hostcmd::prepare_func_init);

    if cfg.low_power {
        cmd!(|buf: &mut [u8], seq| hostcmd::prepare_low_power_mode(buf, seq, true));
    }
    if let Some(cal) = cfg.cal_data.as_deref() {
        cmd!(|buf: &mut [u8], seq| hostcmd::prepare_set_cal_data(buf, seq, cal));
    }

    cmd!(|buf: &mut [u8], seq| hostcmd::prepare_reconfigure_tx_buf(buf, seq, caps.mp_end_port));

    if let Some(mac) = cfg.mac_addr.as_ref() {
        cmd!(|buf: &mut [u8], seq| hostcmd::prepare_set_mac_addr(buf, seq, mac));
    }
    if cfg.chan_region_cfg {
        cmd!(hostcmd::prepare_chan_region_cfg);
    }

    cmd!(hostcmd::prepare_get_hw_spec);
    cmd!(hostcmd::prepare_get_value1);
    cmd!(|buf: &mut [u8], seq| hostcmd::prepare_get_fw_ver_ext(buf, seq, 0));
    cmd!(hostcmd::prepare_get_mac_addr);
    // uAP 的 MAC 查询固定用 BSS 类型编码的 seq，响应靠它归位
    cmd!(|buf: &mut [u8], _seq| {
        hostcmd::prepare_get_mac_addr(buf, hostcmd::seq_with_bss(0, 0, BSS_TYPE_UAP))
    });
    cmd!(|buf: &mut [u8], seq| hostcmd::prepare_get_fw_ver_ext(buf, seq, 3));

    cmd!(|buf: &mut [u8], seq| hostcmd::prepare_mac_control(buf, seq, MAC_CTRL_RX_TX_ON));

    cmd!(|buf: &mut [u8], seq| hostcmd::prepare_get_fw_ver_ext(buf, seq, 4));
    cmd!(|buf: &mut [u8], seq| {
        hostcmd::prepare_11n_cfg(buf, seq, cfg.ht_tx_cap, cfg.ht_tx_info)
    });
    cmd!(|buf: &mut [u8], seq| hostcmd::prepare_amsdu_aggr_ctrl(buf, seq, cfg.amsdu_aggr));

    pipeline.set_fw_init_done(true);
    log::info!(target: "wlan::init", "firmware init sequence complete");
    Ok(())
}

/// 初始化后的中断装配：处理线程上线并使能卡中断。
pub fn post_init<D: SdioDrv>(
    drv: &D,
    adapter: &mut Adapter,
    bridge: &IntBridge,
) -> Result<(), i32> {
    adapter.reset_ports();
    bridge.set_ready(true);
    bridge.arm(drv, adapter.caps.host_int_mask_reg, adapter.caps.him_enable)
}

/// 停机：发关机命令（不等响应）、解除中断装配、端口状态复位。
pub fn shutdown<D: SdioDrv>(
    drv: &D,
    adapter: &mut Adapter,
    pipeline: &CmdPipeline,
    bridge: &IntBridge,
) -> Result<(), i32> {
    pipeline.set_fw_init_done(false);
    bridge.disarm();
    bridge.set_ready(false);
    let ret = pipeline.send_cmd_no_wait(
        drv,
        &adapter.caps,
        adapter.ioport(),
        hostcmd::prepare_func_shutdown,
    );
    adapter.reset_ports();
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::time::Duration;
    use sdiobus::{CardType, EIO};

    /// 每次命令口写都把命令号记下来
    struct SeqDrv {
        cmds: RefCell<Vec<u16>>,
    }
    impl SdioDrv for SeqDrv {
        fn read(&self, _: u32, _: u32, _: u32, buf: &mut [u8]) -> Result<(), i32> {
            buf.fill(0);
            Ok(())
        }
        fn write(&self, _: u32, _: u32, _: u32, buf: &[u8]) -> Result<(), i32> {
            // 总线头 4 字节之后是命令头
            let cmd = u16::from_le_bytes([buf[4], buf[5]]);
            self.cmds.borrow_mut().push(cmd);
            Ok(())
        }
        fn creg_read(&self, _: u32, _: u32) -> Result<u8, i32> {
            Ok(0)
        }
        fn creg_write(&self, _: u32, _: u32, _: u8) -> Result<(), i32> {
            Ok(())
        }
    }

    /// 响应立刻就位的调度器桩
    struct InstantOs;
    impl OsOps for InstantOs {
        fn cmdresp_wait(&self, _: Duration) -> bool {
            false
        }
        fn cmdresp_signal(&self) {}
        fn io_event_wait(&self, _: Duration) -> bool {
            true
        }
        fn io_event_signal(&self) {}
        fn vdll_wait(&self, _: Duration) -> bool {
            true
        }
        fn vdll_signal(&self) {}
        fn sleep_ms(&self, _: u32) {}
    }

    #[test]
    fn init_sequence_order() {
        let drv = SeqDrv {
            cmds: RefCell::new(Vec::new()),
        };
        let caps = sdiobus::CardCaps::for_card(CardType::Sd8801);
        let pipeline = CmdPipeline::new();
        let vdll = VdllState::new();

        fw_init_cfg(&drv, &InstantOs, &caps, 0x10000, &pipeline, &vdll, &FwInitCfg::default())
            .unwrap();

        let cmds = drv.cmds.borrow();
        assert_eq!(
            *cmds,
            alloc::vec![
                hostcmd::CMD_FUNC_INIT,
                hostcmd::CMD_RECONFIGURE_TX_BUFF,
                hostcmd::CMD_CHAN_REGION_CFG,
                hostcmd::CMD_GET_HW_SPEC,
                hostcmd::CMD_MAC_REG_ACCESS,
                hostcmd::CMD_VERSION_EXT,
                hostcmd::CMD_802_11_MAC_ADDRESS,
                hostcmd::CMD_802_11_MAC_ADDRESS,
                hostcmd::CMD_VERSION_EXT,
                hostcmd::CMD_MAC_CONTROL,
                hostcmd::CMD_VERSION_EXT,
                hostcmd::CMD_11N_CFG,
                hostcmd::CMD_AMSDU_AGGR_CTRL,
            ]
        );
    }

    #[test]
    fn optional_steps_follow_cfg() {
        let drv = SeqDrv {
            cmds: RefCell::new(Vec::new()),
        };
        let caps = sdiobus::CardCaps::for_card(CardType::Sd8997);
        let pipeline = CmdPipeline::new();
        let vdll = VdllState::new();

        let cfg = FwInitCfg {
            low_power: true,
            cal_data: Some(alloc::vec![0xAA; 16]),
            mac_addr: Some([2, 0, 0, 0, 0, 1]),
            chan_region_cfg: false,
            ..FwInitCfg::default()
        };
        fw_init_cfg(&drv, &InstantOs, &caps, 0x10000, &pipeline, &vdll, &cfg).unwrap();

        let cmds = drv.cmds.borrow();
        assert_eq!(cmds[1], hostcmd::CMD_LOW_POWER_MODE);
        assert_eq!(cmds[2], hostcmd::CMD_CFG_DATA);
        assert_eq!(cmds[4], hostcmd::CMD_802_11_MAC_ADDRESS);
        assert!(!cmds.contains(&hostcmd::CMD_CHAN_REGION_CFG));
    }

    #[test]
    fn errno_maps_to_platform_codes() {
        assert_eq!(ax_result::<()>(Err(ETIMEDOUT)), Err(AxError::TimedOut));
        assert_eq!(ax_result::<()>(Err(EAGAIN)), Err(AxError::WouldBlock));
        assert_eq!(ax_result::<()>(Err(EIO)), Err(AxError::Io));
        assert_eq!(ax_result(Ok(7)), Ok(7));
    }
}
