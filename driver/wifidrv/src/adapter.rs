//! 适配器上下文
//!
//! 所有总线侧可变状态集中在 [`Adapter`]：位图缓存、端口游标、
//! 中断状态累积、整窗寄存器快照。中断状态与位图只从快照解码，
//! 不信任中断上下文里读到的任何东西。

use sdiobus::{CardCaps, CardType, SdioDrv, EEXIST, EIO, MAX_MP_REGS_LEN, REG_PORT};

/// 16 端口卡的 ioport 寄存器（24 位小端，3 个功能寄存器拼出）
const IO_PORT_0_REG: u32 = 0x78;
const IO_PORT_1_REG: u32 = 0x79;
const IO_PORT_2_REG: u32 = 0x7A;

/// 32 端口卡 ioport 固定值
const MEM_PORT: u32 = 0x10000;

/// 总线故障后的恢复回调（复位卡、重载固件等），返回负 errno 表示恢复失败。
pub type RecoveryFn = fn() -> i32;

/// 适配器上下文。单处理线程持有可变引用，跨线程共享由持有者加锁。
pub struct Adapter {
    pub caps: CardCaps,
    ioport: u32,
    /// 整窗寄存器快照，[`Adapter::interrupt`] 每次覆盖
    mp_regs: [u8; MAX_MP_REGS_LEN],
    /// 自上次快照以来累积的中断状态位
    sdio_ireg: u8,
    pub(crate) mp_rd_bitmap: u32,
    pub(crate) mp_wr_bitmap: u32,
    pub(crate) curr_rd_port: u8,
    pub(crate) curr_wr_port: u8,
    recovery_cb: Option<RecoveryFn>,
}

impl Adapter {
    pub fn new(card: CardType) -> Self {
        let caps = CardCaps::for_card(card);
        Self {
            caps,
            ioport: 0,
            mp_regs: [0; MAX_MP_REGS_LEN],
            sdio_ireg: 0,
            mp_rd_bitmap: 0,
            mp_wr_bitmap: 0,
            curr_rd_port: caps.first_wr_port(),
            curr_wr_port: caps.first_wr_port(),
            recovery_cb: None,
        }
    }

    /// 解析 ioport：16 端口卡从功能寄存器读 24 位，32 端口卡为固定内存端口。
    pub fn probe_ioport<D: SdioDrv>(&mut self, drv: &D) -> Result<u32, i32> {
        let ioport = if self.caps.has_ctrl_port {
            let b0 = drv.creg_read(IO_PORT_0_REG, 1)? as u32;
            let b1 = drv.creg_read(IO_PORT_1_REG, 1)? as u32;
            let b2 = drv.creg_read(IO_PORT_2_REG, 1)? as u32;
            b0 | (b1 << 8) | (b2 << 16)
        } else {
            MEM_PORT
        };
        self.ioport = ioport;
        log::info!(target: "wlan::sdio", "ioport = 0x{ioport:x}");
        Ok(ioport)
    }

    #[inline]
    pub fn ioport(&self) -> u32 {
        self.ioport
    }

    /// 测试/平台注入用：直接设定 ioport。
    pub fn set_ioport(&mut self, ioport: u32) {
        self.ioport = ioport;
    }

    /// 卡中断后的快照重读：一次字节模式 CMD53 读出整个寄存器窗口，
    /// 累积中断状态位。返回本次快照里的状态字节。
    pub fn interrupt<D: SdioDrv>(&mut self, drv: &D) -> Result<u8, i32> {
        let n = self.caps.max_mp_regs;
        drv.read_bytes(REG_PORT, &mut self.mp_regs[..n]).map_err(|e| {
            log::error!(target: "wlan::sdio", "read mp_regs window failed: {e}");
            EIO
        })?;
        let ireg = self.mp_regs[self.caps.host_int_status_reg as usize];
        if ireg != 0 {
            self.sdio_ireg |= ireg;
        }
        log::trace!(target: "wlan::sdio", "INT: sdio_ireg = 0x{:02x}", ireg);
        Ok(ireg)
    }

    /// 取走并清空累积的中断状态位。
    #[inline]
    pub fn take_ireg(&mut self) -> u8 {
        core::mem::replace(&mut self.sdio_ireg, 0)
    }

    /// 快照中端口 p 的待读长度（16 位小端寄存器对）。
    pub fn rx_len_for_port(&self, port: u8) -> u16 {
        let (l, u) = self.caps.rd_len_regs(port);
        (self.mp_regs[l] as u16) | ((self.mp_regs[u] as u16) << 8)
    }

    /// 快照中命令端口的待读长度（仅 32 端口卡有意义）。
    pub fn cmd_rx_len(&self) -> u16 {
        (self.mp_regs[self.caps.cmd_rd_len_0 as usize] as u16)
            | ((self.mp_regs[self.caps.cmd_rd_len_1 as usize] as u16) << 8)
    }

    /// 测试注入快照内容。
    #[cfg(test)]
    pub(crate) fn mp_regs_mut(&mut self) -> &mut [u8] {
        &mut self.mp_regs
    }

    pub(crate) fn mp_regs(&self) -> &[u8] {
        &self.mp_regs[..self.caps.max_mp_regs]
    }

    /// 总线故障诊断：把寄存器快照整窗打到错误日志。
    pub fn dump_regs(&self) {
        let n = self.caps.max_mp_regs;
        log::error!(target: "wlan::sdio", "register window dump ({n} bytes):");
        for (i, chunk) in self.mp_regs[..n].chunks(16).enumerate() {
            let mut line = alloc::string::String::new();
            for b in chunk {
                use core::fmt::Write;
                let _ = write!(line, "{b:02x} ");
            }
            log::error!(target: "wlan::sdio", "  {:03x}: {}", i * 16, line);
        }
    }

    /// 注册恢复回调。只允许一个注册方。
    pub fn register_recovery_cb(&mut self, cb: RecoveryFn) -> Result<(), i32> {
        if self.recovery_cb.is_some() {
            return Err(EEXIST);
        }
        self.recovery_cb = Some(cb);
        Ok(())
    }

    /// 触发恢复回调；未注册时只留日志。
    pub fn invoke_recovery(&self) {
        match self.recovery_cb {
            Some(cb) => {
                let ret = cb();
                if ret != 0 {
                    log::error!(target: "wlan::sdio", "recovery callback failed: {ret}");
                }
            }
            None => log::error!(target: "wlan::sdio", "bus fault, no recovery callback registered"),
        }
    }
}
