//! 总线帧头与发送描述符
//!
//! 下行帧布局：`| 总线头 4 | 发送描述符 (tx_pkt_offset) | payload |`。
//! 所有字段小端，编解码只在字节切片上做，不做指针重解释。

use sdiobus::EINVAL;

/// 总线头长度：u16 总长 + u16 帧类型
pub const INTF_HEADER_LEN: usize = 4;

/// 帧类型：数据
pub const PKT_TYPE_DATA: u16 = 0;
/// 帧类型：命令 / 命令响应
pub const PKT_TYPE_CMD: u16 = 1;
/// 帧类型：固件事件
pub const PKT_TYPE_EVENT: u16 = 3;
/// 帧类型：固件补丁块（VDLL）
pub const PKT_TYPE_VDLL: u16 = 4;

/// 描述符内特殊帧类型（注入帧）
pub const TX_PKT_TYPE_RAW: u16 = 0x00E5;
/// 普通数据帧的 payload 偏移（描述符区长度，含对齐填充）
pub const DATA_PKT_OFFSET: u16 = 0x16;
/// 特殊帧的 payload 偏移
pub const RAW_PKT_OFFSET: u16 = 0x14;

/// 描述符编码长度
pub const TXPD_LEN: usize = 20;

/// 写总线头。
pub fn put_intf_header(buf: &mut [u8], size: u16, pkttype: u16) -> Result<(), i32> {
    if buf.len() < INTF_HEADER_LEN {
        return Err(EINVAL);
    }
    buf[0..2].copy_from_slice(&size.to_le_bytes());
    buf[2..4].copy_from_slice(&pkttype.to_le_bytes());
    Ok(())
}

/// 读总线头，返回 (总长, 帧类型)。
pub fn intf_header(buf: &[u8]) -> Option<(u16, u16)> {
    if buf.len() < INTF_HEADER_LEN {
        return None;
    }
    let size = u16::from_le_bytes([buf[0], buf[1]]);
    let pkttype = u16::from_le_bytes([buf[2], buf[3]]);
    Some((size, pkttype))
}

/// 发送描述符。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxPd {
    pub bss_type: u8,
    pub bss_num: u8,
    pub tx_pkt_length: u16,
    pub tx_pkt_offset: u16,
    pub tx_pkt_type: u16,
    pub tx_control: u32,
    pub priority: u8,
    pub flags: u8,
    pub pkt_delay_2ms: u8,
}

impl TxPd {
    /// 编码到 buf 前 [`TXPD_LEN`] 字节。
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), i32> {
        if buf.len() < TXPD_LEN {
            return Err(EINVAL);
        }
        buf[0] = self.bss_type;
        buf[1] = self.bss_num;
        buf[2..4].copy_from_slice(&self.tx_pkt_length.to_le_bytes());
        buf[4..6].copy_from_slice(&self.tx_pkt_offset.to_le_bytes());
        buf[6..8].copy_from_slice(&self.tx_pkt_type.to_le_bytes());
        buf[8..12].copy_from_slice(&self.tx_control.to_le_bytes());
        buf[12] = self.priority;
        buf[13] = self.flags;
        buf[14] = self.pkt_delay_2ms;
        buf[15..TXPD_LEN].fill(0);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < TXPD_LEN {
            return None;
        }
        Some(Self {
            bss_type: buf[0],
            bss_num: buf[1],
            tx_pkt_length: u16::from_le_bytes([buf[2], buf[3]]),
            tx_pkt_offset: u16::from_le_bytes([buf[4], buf[5]]),
            tx_pkt_type: u16::from_le_bytes([buf[6], buf[7]]),
            tx_control: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            priority: buf[12],
            flags: buf[13],
            pkt_delay_2ms: buf[14],
        })
    }
}

/// 给数据帧盖章。`frame` 是完整下行缓冲（总线头 + 描述符 + payload），
/// 描述符里已有的 tx_pkt_type 保留；若是特殊帧类型则 payload 偏移改用
/// [`RAW_PKT_OFFSET`]。总线头 size 写整帧长度。
pub fn stamp_data_pkt(
    frame: &mut [u8],
    interface: u8,
    bss_num: u8,
    tid: u8,
    tx_control: u32,
) -> Result<(), i32> {
    let total = frame.len();
    if total < INTF_HEADER_LEN + TXPD_LEN {
        return Err(EINVAL);
    }
    let prev = TxPd::decode(&frame[INTF_HEADER_LEN..]).ok_or(EINVAL)?;
    let mut pd = TxPd {
        bss_type: interface,
        bss_num,
        tx_pkt_offset: DATA_PKT_OFFSET,
        tx_pkt_type: prev.tx_pkt_type,
        tx_control,
        priority: tid,
        flags: 0,
        pkt_delay_2ms: 0,
        ..TxPd::default()
    };
    if pd.tx_pkt_type == TX_PKT_TYPE_RAW {
        pd.tx_pkt_offset = RAW_PKT_OFFSET;
    }
    pd.tx_pkt_length = (total as u16)
        .wrapping_sub(pd.tx_pkt_offset)
        .wrapping_sub(INTF_HEADER_LEN as u16);
    pd.encode(&mut frame[INTF_HEADER_LEN..])?;
    put_intf_header(frame, total as u16, PKT_TYPE_DATA)
}

/// 给注入帧盖章：固定特殊帧类型与偏移，总线头 size 为
/// `payloadlen + 偏移 + 总线头`。返回头部总跨度（payload 应拷到这之后）。
pub fn stamp_raw_pkt(frame: &mut [u8], payloadlen: u16, interface: u8) -> Result<usize, i32> {
    if frame.len() < INTF_HEADER_LEN + TXPD_LEN {
        return Err(EINVAL);
    }
    let pd = TxPd {
        bss_type: interface,
        bss_num: 0,
        tx_pkt_length: payloadlen
            .wrapping_sub(RAW_PKT_OFFSET)
            .wrapping_sub(INTF_HEADER_LEN as u16),
        tx_pkt_offset: RAW_PKT_OFFSET,
        tx_pkt_type: TX_PKT_TYPE_RAW,
        tx_control: 0,
        priority: 0,
        flags: 0,
        pkt_delay_2ms: 0,
    };
    pd.encode(&mut frame[INTF_HEADER_LEN..])?;
    let size = payloadlen
        .wrapping_add(RAW_PKT_OFFSET)
        .wrapping_add(INTF_HEADER_LEN as u16);
    put_intf_header(frame, size, PKT_TYPE_DATA)?;
    Ok(RAW_PKT_OFFSET as usize + INTF_HEADER_LEN)
}

/// 事后改写描述符 flags 字段（重传标记等）。
pub fn set_txpd_flags(frame: &mut [u8], flags: u8) -> Result<(), i32> {
    if frame.len() < INTF_HEADER_LEN + TXPD_LEN {
        return Err(EINVAL);
    }
    frame[INTF_HEADER_LEN + 13] = flags;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_stamp_round_trip() {
        let payload = [0x5au8; 100];
        let total = INTF_HEADER_LEN + DATA_PKT_OFFSET as usize + payload.len();
        let mut frame = alloc::vec![0u8; total];
        frame[INTF_HEADER_LEN + DATA_PKT_OFFSET as usize..].copy_from_slice(&payload);

        stamp_data_pkt(&mut frame, 0, 0, 5, 0).unwrap();

        let (size, pkttype) = intf_header(&frame).unwrap();
        assert_eq!(size as usize, total);
        assert_eq!(pkttype, PKT_TYPE_DATA);
        let pd = TxPd::decode(&frame[INTF_HEADER_LEN..]).unwrap();
        assert_eq!(pd.tx_pkt_offset, DATA_PKT_OFFSET);
        assert_eq!(pd.tx_pkt_length as usize, payload.len());
        assert_eq!(pd.priority, 5);
        // 偏移 + 长度恰好回到帧尾
        assert_eq!(
            INTF_HEADER_LEN + pd.tx_pkt_offset as usize + pd.tx_pkt_length as usize,
            total
        );
    }

    #[test]
    fn raw_type_keeps_special_offset() {
        let total = INTF_HEADER_LEN + TXPD_LEN + 64;
        let mut frame = alloc::vec![0u8; total];
        TxPd {
            tx_pkt_type: TX_PKT_TYPE_RAW,
            ..TxPd::default()
        }
        .encode(&mut frame[INTF_HEADER_LEN..])
        .unwrap();
        stamp_data_pkt(&mut frame, 1, 0, 0, 0).unwrap();
        let pd = TxPd::decode(&frame[INTF_HEADER_LEN..]).unwrap();
        assert_eq!(pd.tx_pkt_offset, RAW_PKT_OFFSET);
        assert_eq!(pd.tx_pkt_type, TX_PKT_TYPE_RAW);
    }

    #[test]
    fn raw_stamp_sizes() {
        let mut frame = alloc::vec![0u8; 256];
        let span = stamp_raw_pkt(&mut frame, 128, 0).unwrap();
        assert_eq!(span, 0x14 + 4);
        let (size, _) = intf_header(&frame).unwrap();
        assert_eq!(size, 128 + 0x14 + 4);
        let pd = TxPd::decode(&frame[INTF_HEADER_LEN..]).unwrap();
        assert_eq!(pd.tx_pkt_length, 128 - 0x14 - 4);
        assert_eq!(pd.tx_pkt_type, TX_PKT_TYPE_RAW);
    }
}
