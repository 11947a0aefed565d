//! 卡型号能力表与功能寄存器映射
//!
//! 两类卡共用一套数据收发状态机，差异全部收敛在 [`CardCaps`]：
//! - 16 端口卡（SD8801）：位图 16 位，端口 0 为控制端口，命令走控制端口
//! - 32 端口卡（SD8978/8987/8997/9098/9177）：位图 32 位，无控制端口，
//!   命令走独立命令端口（CMD53 地址带 [`CMD_PORT_SLCT`] 标志）
//!
//! 初始化时由 [`CardCaps::for_card`] 解析一次，之后不再有型号分支。

/// 支持的卡型号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    Sd8801,
    Sd8978,
    Sd8987,
    Sd8997,
    Sd9098,
    Sd9177,
}

/// 上行就绪中断位（卡有数据待主机读）
pub const UP_LD_HOST_INT_STATUS: u8 = 0x01;
/// 下行完成中断位（卡已收走主机写入，写位图更新）
pub const DN_LD_HOST_INT_STATUS: u8 = 0x02;
/// 命令端口上行就绪（仅 32 端口卡）
pub const UP_LD_CMD_PORT_HOST_INT_STATUS: u8 = 0x40;
/// 命令端口下行完成（仅 32 端口卡）
pub const DN_LD_CMD_PORT_HOST_INT_STATUS: u8 = 0x80;

/// CMD53 地址中的命令端口选择位（仅 32 端口卡）
pub const CMD_PORT_SLCT: u32 = 0x8000;
/// 聚合 CMD53 地址基址位
pub const MPA_ADDR_BASE: u32 = 0x1000;
/// CMD53 字节模式地址标志
pub const BYTE_MODE_MASK: u32 = 0x8000_0000;
/// 功能寄存器窗口起始（寄存器快照从此地址按字节模式整窗读出）
pub const REG_PORT: u32 = 0;
/// 主机向卡发事件：终止当前 CMD53
pub const HOST_TERM_CMD53: u8 = 0x04;

/// 寄存器快照缓冲的上限（取两类卡 max_mp_regs 的较大者）
pub const MAX_MP_REGS_LEN: usize = 196;

/// 卡能力表。字段全部在 `for_card` 时定值。
#[derive(Debug, Clone, Copy)]
pub struct CardCaps {
    /// 主机中断屏蔽寄存器
    pub host_int_mask_reg: u8,
    /// 主机中断状态寄存器（快照内偏移即寄存器地址）
    pub host_int_status_reg: u8,
    /// 读位图低/高字节寄存器
    pub rd_bitmap_l: u8,
    pub rd_bitmap_u: u8,
    /// 读位图高 16 位（仅 32 端口卡有效）
    pub rd_bitmap_1l: u8,
    pub rd_bitmap_1u: u8,
    /// 写位图寄存器，布局同读位图
    pub wr_bitmap_l: u8,
    pub wr_bitmap_u: u8,
    pub wr_bitmap_1l: u8,
    pub wr_bitmap_1u: u8,
    /// 端口 0 长度寄存器对；端口 p 的长度在 `rd_len_p0_l + (p << 1)`
    pub rd_len_p0_l: u8,
    pub rd_len_p0_u: u8,
    /// 命令端口待读长度寄存器对（仅 32 端口卡）
    pub cmd_rd_len_0: u8,
    pub cmd_rd_len_1: u8,
    /// 主机向卡发事件寄存器（HOST_TERM_CMD53 写这里）
    pub host_to_card_event_reg: u8,
    /// 寄存器快照窗口长度
    pub max_mp_regs: usize,
    /// 端口环大小（读游标回绕点）
    pub max_port: u8,
    /// 写游标回绕点
    pub mp_end_port: u8,
    /// 位图是否 32 位布局
    pub wide_bitmap: bool,
    /// 端口 0 是否为控制端口（命令/命令响应走端口 0）
    pub has_ctrl_port: bool,
    /// 是否有独立命令端口（CMD53 地址带 CMD_PORT_SLCT）
    pub has_cmd_port: bool,
    /// 聚合一次最多打包的帧数
    pub mp_aggr_pkt_limit: u8,
    /// 传输块大小
    pub block_size: u32,
    /// 中断使能写入值（数据位 + 型号相应的命令端口位）
    pub him_enable: u8,
}

impl CardCaps {
    /// 16 端口卡能力表。
    pub fn sd8801() -> Self {
        Self {
            host_int_mask_reg: 0x02,
            host_int_status_reg: 0x03,
            rd_bitmap_l: 0x04,
            rd_bitmap_u: 0x05,
            rd_bitmap_1l: 0,
            rd_bitmap_1u: 0,
            wr_bitmap_l: 0x06,
            wr_bitmap_u: 0x07,
            wr_bitmap_1l: 0,
            wr_bitmap_1u: 0,
            rd_len_p0_l: 0x08,
            rd_len_p0_u: 0x09,
            cmd_rd_len_0: 0,
            cmd_rd_len_1: 0,
            host_to_card_event_reg: 0x00,
            max_mp_regs: 64,
            max_port: 16,
            mp_end_port: 16,
            wide_bitmap: false,
            has_ctrl_port: true,
            has_cmd_port: false,
            mp_aggr_pkt_limit: 8,
            block_size: 256,
            him_enable: UP_LD_HOST_INT_STATUS | DN_LD_HOST_INT_STATUS,
        }
    }

    /// 32 端口卡能力表。
    pub fn sd89xx() -> Self {
        Self {
            host_int_mask_reg: 0x08,
            host_int_status_reg: 0x0C,
            rd_bitmap_l: 0x10,
            rd_bitmap_u: 0x11,
            rd_bitmap_1l: 0x12,
            rd_bitmap_1u: 0x13,
            wr_bitmap_l: 0x14,
            wr_bitmap_u: 0x15,
            wr_bitmap_1l: 0x16,
            wr_bitmap_1u: 0x17,
            rd_len_p0_l: 0x18,
            rd_len_p0_u: 0x19,
            cmd_rd_len_0: 0xC0,
            cmd_rd_len_1: 0xC1,
            host_to_card_event_reg: 0x00,
            max_mp_regs: 196,
            max_port: 32,
            mp_end_port: 32,
            wide_bitmap: true,
            has_ctrl_port: false,
            has_cmd_port: true,
            mp_aggr_pkt_limit: 8,
            block_size: 256,
            him_enable: UP_LD_HOST_INT_STATUS
                | DN_LD_HOST_INT_STATUS
                | UP_LD_CMD_PORT_HOST_INT_STATUS
                | DN_LD_CMD_PORT_HOST_INT_STATUS,
        }
    }

    /// 按型号取能力表。
    pub fn for_card(card: CardType) -> Self {
        match card {
            CardType::Sd8801 => Self::sd8801(),
            _ => Self::sd89xx(),
        }
    }

    /// 控制端口在读位图中的掩码。
    #[inline]
    pub fn ctrl_port_mask(&self) -> u32 {
        if self.has_ctrl_port {
            0x0001
        } else {
            0
        }
    }

    /// 数据端口掩码。
    #[inline]
    pub fn data_port_mask(&self) -> u32 {
        if self.has_ctrl_port {
            0xfffe
        } else {
            0xffff_ffff
        }
    }

    /// 写游标回绕后的起始端口（有控制端口的卡跳过端口 0）。
    #[inline]
    pub fn first_wr_port(&self) -> u8 {
        if self.has_ctrl_port {
            1
        } else {
            0
        }
    }

    /// 端口 p 的长度寄存器对（低、高字节）在快照中的偏移。
    #[inline]
    pub fn rd_len_regs(&self, port: u8) -> (usize, usize) {
        (
            self.rd_len_p0_l as usize + ((port as usize) << 1),
            self.rd_len_p0_u as usize + ((port as usize) << 1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_variant_split() {
        let a = CardCaps::for_card(CardType::Sd8801);
        assert!(a.has_ctrl_port && !a.has_cmd_port && !a.wide_bitmap);
        assert_eq!(a.first_wr_port(), 1);
        assert_eq!(a.data_port_mask(), 0xfffe);
        assert_eq!(a.him_enable, 0x03);

        let b = CardCaps::for_card(CardType::Sd8997);
        assert!(!b.has_ctrl_port && b.has_cmd_port && b.wide_bitmap);
        assert_eq!(b.first_wr_port(), 0);
        assert_eq!(b.him_enable, 0xC3);
        assert_eq!(b.rd_len_regs(3), (0x18 + 6, 0x19 + 6));
    }
}
