//! 端口位图的预约与消费
//!
//! 写路径：固件在每个下行完成中断后更新写位图，主机按写游标依次
//! 预约端口，预约即把位清零，位图在下一次快照刷新前不会复活。
//! 读路径：就绪端口按读游标消费，有控制端口的卡优先处理控制端口。

use sdiobus::{EAGAIN, EIO};

use crate::adapter::Adapter;

impl Adapter {
    /// 从快照解码写位图。16 位布局两个寄存器，32 位布局四个。
    pub fn refresh_wr_bitmap(&mut self) {
        let regs = self.mp_regs();
        let c = &self.caps;
        let mut bm = (regs[c.wr_bitmap_l as usize] as u32)
            | ((regs[c.wr_bitmap_u as usize] as u32) << 8);
        if c.wide_bitmap {
            bm |= ((regs[c.wr_bitmap_1l as usize] as u32) << 16)
                | ((regs[c.wr_bitmap_1u as usize] as u32) << 24);
        }
        self.mp_wr_bitmap = bm;
        log::trace!(target: "wlan::ports", "mp_wr_bitmap = 0x{bm:08x}");
    }

    /// 从快照解码读位图。
    pub fn refresh_rd_bitmap(&mut self) {
        let regs = self.mp_regs();
        let c = &self.caps;
        let mut bm = (regs[c.rd_bitmap_l as usize] as u32)
            | ((regs[c.rd_bitmap_u as usize] as u32) << 8);
        if c.wide_bitmap {
            bm |= ((regs[c.rd_bitmap_1l as usize] as u32) << 16)
                | ((regs[c.rd_bitmap_1u as usize] as u32) << 24);
        }
        self.mp_rd_bitmap = bm;
        log::trace!(target: "wlan::ports", "mp_rd_bitmap = 0x{bm:08x}");
    }

    /// 读位图上是否还有就绪端口（含控制端口）。
    #[inline]
    pub fn has_rd_ready(&self) -> bool {
        self.mp_rd_bitmap & (self.caps.ctrl_port_mask() | self.caps.data_port_mask()) != 0
    }

    #[inline]
    pub fn wr_bitmap(&self) -> u32 {
        self.mp_wr_bitmap
    }

    #[inline]
    pub fn rd_bitmap(&self) -> u32 {
        self.mp_rd_bitmap
    }

    /// 预约一个数据写端口：写游标处位清零并前移，回绕点为 mp_end_port。
    /// 位不在则 [`EAGAIN`]，等固件的下行完成中断刷新位图后再试。
    pub fn get_wr_port_for_data(&mut self) -> Result<u8, i32> {
        let cursor = self.curr_wr_port;
        if self.mp_wr_bitmap & (1u32 << cursor) == 0 {
            return Err(EAGAIN);
        }
        self.mp_wr_bitmap &= !(1u32 << cursor);
        self.curr_wr_port = cursor + 1;
        if self.curr_wr_port == self.caps.mp_end_port {
            self.curr_wr_port = self.caps.first_wr_port();
        }
        if self.caps.has_ctrl_port && cursor == 0 {
            log::warn!(target: "wlan::ports",
                "data port cursor landed on ctrl port, mp_wr_bitmap=0x{:08x}", self.mp_wr_bitmap);
            return Err(EIO);
        }
        log::trace!(target: "wlan::ports",
            "wr port {cursor}, mp_wr_bitmap -> 0x{:08x}", self.mp_wr_bitmap);
        Ok(cursor)
    }

    /// 非聚合读端口消费：控制端口优先，其后是读游标处的数据端口。
    /// 游标在 max_port 处回绕（有控制端口的卡绕回 1）。
    pub fn reserve_rd_port(&mut self) -> Result<u8, i32> {
        if !self.has_rd_ready() {
            return Err(EAGAIN);
        }
        let ctrl_mask = self.caps.ctrl_port_mask();
        if self.mp_rd_bitmap & ctrl_mask != 0 {
            self.mp_rd_bitmap &= !ctrl_mask;
            return Ok(0);
        }
        let cursor = self.curr_rd_port;
        if self.mp_rd_bitmap & (1u32 << cursor) == 0 {
            return Err(EAGAIN);
        }
        self.mp_rd_bitmap &= !(1u32 << cursor);
        self.advance_rd_cursor();
        Ok(cursor)
    }

    /// 读游标前移一格，带回绕。
    pub(crate) fn advance_rd_cursor(&mut self) {
        self.curr_rd_port += 1;
        if self.curr_rd_port == self.caps.max_port {
            self.curr_rd_port = self.caps.first_wr_port();
        }
    }

    /// 端口状态复位：游标回初始值、位图清零。停机或恢复后调用。
    pub fn reset_ports(&mut self) {
        self.curr_rd_port = self.caps.first_wr_port();
        self.curr_wr_port = self.caps.first_wr_port();
        self.mp_rd_bitmap = 0;
        self.mp_wr_bitmap = 0;
        log::debug!(target: "wlan::ports", "ports reset, cursors back to {}", self.curr_wr_port);
    }

    #[cfg(test)]
    pub(crate) fn set_wr_bitmap(&mut self, bm: u32) {
        self.mp_wr_bitmap = bm;
    }

    #[cfg(test)]
    pub(crate) fn set_rd_bitmap(&mut self, bm: u32) {
        self.mp_rd_bitmap = bm;
    }
}
