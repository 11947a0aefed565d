//! 固件主机命令
//!
//! 命令帧 = 总线头(4) + 命令头(8) + 命令体。命令头：command、size
//! （含命令头）、seq_num、result，全小端。seq_num 高字节编码 BSS
//! 编号与类型，响应按它路由回对应接口。

use alloc::string::String;

use sdiobus::EINVAL;

/// 命令头长度
pub const CMD_HDR_LEN: usize = 8;

/// 响应标志位：响应的 command 字段为请求 command | 0x8000
pub const CMD_RESP_BIT: u16 = 0x8000;
/// command 字段的命令号掩码
pub const CMD_ID_MASK: u16 = 0x0fff;

// 命令号
pub const CMD_GET_HW_SPEC: u16 = 0x0003;
pub const CMD_MAC_REG_ACCESS: u16 = 0x0019;
pub const CMD_MAC_CONTROL: u16 = 0x0028;
pub const CMD_802_11_MAC_ADDRESS: u16 = 0x004d;
pub const CMD_CFG_DATA: u16 = 0x008f;
pub const CMD_VERSION_EXT: u16 = 0x0097;
pub const CMD_FUNC_INIT: u16 = 0x00a9;
pub const CMD_FUNC_SHUTDOWN: u16 = 0x00aa;
pub const CMD_11N_CFG: u16 = 0x00cd;
pub const CMD_RECONFIGURE_TX_BUFF: u16 = 0x00d9;
pub const CMD_AMSDU_AGGR_CTRL: u16 = 0x00df;
pub const CMD_LOW_POWER_MODE: u16 = 0x0128;
pub const CMD_CHAN_REGION_CFG: u16 = 0x0242;

/// 命令体里的读写动作
pub const ACT_GET: u16 = 0;
pub const ACT_SET: u16 = 1;

/// BSS 类型
pub const BSS_TYPE_STA: u8 = 0;
pub const BSS_TYPE_UAP: u8 = 1;

/// 固件侧 MAC 用户数据寄存器偏移（value1 查询用）
pub const MAC_REG_USER_DATA_OFFSET: u16 = 0x40;
/// 重配发送缓冲的目标大小
pub const TX_DATA_BUF_SIZE_2K: u16 = 2048;

/// seq_num 字段编码：低 8 位序号，8..12 位 BSS 编号，12..16 位 BSS 类型。
#[inline]
pub fn seq_with_bss(seq: u16, bss_num: u8, bss_type: u8) -> u16 {
    (seq & 0x00ff) | (((bss_num as u16) & 0x000f) << 8) | (((bss_type as u16) & 0x000f) << 12)
}

/// 从 seq_num 取 BSS 类型。
#[inline]
pub fn bss_type_from_seq(seq: u16) -> u8 {
    ((seq & 0xf000) >> 12) as u8
}

/// 从 seq_num 取 BSS 编号。
#[inline]
pub fn bss_num_from_seq(seq: u16) -> u8 {
    ((seq & 0x0f00) >> 8) as u8
}

/// 命令头。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCmdHdr {
    pub command: u16,
    pub size: u16,
    pub seq_num: u16,
    pub result: u16,
}

impl HostCmdHdr {
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), i32> {
        if buf.len() < CMD_HDR_LEN {
            return Err(EINVAL);
        }
        buf[0..2].copy_from_slice(&self.command.to_le_bytes());
        buf[2..4].copy_from_slice(&self.size.to_le_bytes());
        buf[4..6].copy_from_slice(&self.seq_num.to_le_bytes());
        buf[6..8].copy_from_slice(&self.result.to_le_bytes());
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < CMD_HDR_LEN {
            return None;
        }
        Some(Self {
            command: u16::from_le_bytes([buf[0], buf[1]]),
            size: u16::from_le_bytes([buf[2], buf[3]]),
            seq_num: u16::from_le_bytes([buf[4], buf[5]]),
            result: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }

    /// 命令号（响应剥掉响应位）。
    #[inline]
    pub fn cmd_id(&self) -> u16 {
        self.command & CMD_ID_MASK
    }

    /// command 字段是否带响应标志。
    #[inline]
    pub fn is_response(&self) -> bool {
        self.command & 0xf000 == CMD_RESP_BIT
    }
}

fn put_cmd(buf: &mut [u8], cmd: u16, seq: u16, body: &[u8]) -> Result<u16, i32> {
    let size = (CMD_HDR_LEN + body.len()) as u16;
    if buf.len() < size as usize {
        return Err(EINVAL);
    }
    HostCmdHdr {
        command: cmd,
        size,
        seq_num: seq,
        result: 0,
    }
    .encode(buf)?;
    buf[CMD_HDR_LEN..size as usize].copy_from_slice(body);
    Ok(size)
}

// ============================================================================
// 请求构造：写入 buf（命令头起始处），返回命令总长（含命令头）
// ============================================================================

pub fn prepare_func_init(buf: &mut [u8], seq: u16) -> Result<u16, i32> {
    put_cmd(buf, CMD_FUNC_INIT, seq, &[])
}

pub fn prepare_func_shutdown(buf: &mut [u8], seq: u16) -> Result<u16, i32> {
    put_cmd(buf, CMD_FUNC_SHUTDOWN, seq, &[])
}

pub fn prepare_get_hw_spec(buf: &mut [u8], seq: u16) -> Result<u16, i32> {
    // 体由固件回填，请求侧置零
    put_cmd(buf, CMD_GET_HW_SPEC, seq, &[0u8; 22])
}

/// MAC 地址查询；uAP 的查询通过 seq 的 BSS 类型区分。
pub fn prepare_get_mac_addr(buf: &mut [u8], seq: u16) -> Result<u16, i32> {
    let mut body = [0u8; 8];
    body[0..2].copy_from_slice(&ACT_GET.to_le_bytes());
    put_cmd(buf, CMD_802_11_MAC_ADDRESS, seq, &body)
}

pub fn prepare_set_mac_addr(buf: &mut [u8], seq: u16, mac: &[u8; 6]) -> Result<u16, i32> {
    let mut body = [0u8; 8];
    body[0..2].copy_from_slice(&ACT_SET.to_le_bytes());
    body[2..8].copy_from_slice(mac);
    put_cmd(buf, CMD_802_11_MAC_ADDRESS, seq, &body)
}

pub fn prepare_get_fw_ver_ext(buf: &mut [u8], seq: u16, version_str_sel: u8) -> Result<u16, i32> {
    let mut body = [0u8; 129];
    body[0] = version_str_sel;
    put_cmd(buf, CMD_VERSION_EXT, seq, &body)
}

/// value1 查询：读固件用户数据寄存器。
pub fn prepare_get_value1(buf: &mut [u8], seq: u16) -> Result<u16, i32> {
    let mut body = [0u8; 8];
    body[0..2].copy_from_slice(&ACT_GET.to_le_bytes());
    body[2..4].copy_from_slice(&MAC_REG_USER_DATA_OFFSET.to_le_bytes());
    put_cmd(buf, CMD_MAC_REG_ACCESS, seq, &body)
}

pub fn prepare_reconfigure_tx_buf(buf: &mut [u8], seq: u16, mp_end_port: u8) -> Result<u16, i32> {
    let mut body = [0u8; 8];
    body[0..2].copy_from_slice(&ACT_SET.to_le_bytes());
    body[2..4].copy_from_slice(&TX_DATA_BUF_SIZE_2K.to_le_bytes());
    body[4..6].copy_from_slice(&(mp_end_port as u16).to_le_bytes());
    put_cmd(buf, CMD_RECONFIGURE_TX_BUFF, seq, &body)
}

pub fn prepare_mac_control(buf: &mut [u8], seq: u16, action: u32) -> Result<u16, i32> {
    put_cmd(buf, CMD_MAC_CONTROL, seq, &action.to_le_bytes())
}

pub fn prepare_11n_cfg(buf: &mut [u8], seq: u16, ht_tx_cap: u16, ht_tx_info: u16) -> Result<u16, i32> {
    let mut body = [0u8; 8];
    body[0..2].copy_from_slice(&ACT_SET.to_le_bytes());
    body[2..4].copy_from_slice(&ht_tx_cap.to_le_bytes());
    body[4..6].copy_from_slice(&ht_tx_info.to_le_bytes());
    put_cmd(buf, CMD_11N_CFG, seq, &body)
}

pub fn prepare_amsdu_aggr_ctrl(buf: &mut [u8], seq: u16, enable: bool) -> Result<u16, i32> {
    let mut body = [0u8; 6];
    body[0..2].copy_from_slice(&ACT_SET.to_le_bytes());
    body[2..4].copy_from_slice(&(enable as u16).to_le_bytes());
    put_cmd(buf, CMD_AMSDU_AGGR_CTRL, seq, &body)
}

/// 标定数据下发（体 = action + type + data_len + data）。
pub fn prepare_set_cal_data(buf: &mut [u8], seq: u16, cal: &[u8]) -> Result<u16, i32> {
    let size = (CMD_HDR_LEN + 6 + cal.len()) as u16;
    if buf.len() < size as usize {
        return Err(EINVAL);
    }
    HostCmdHdr {
        command: CMD_CFG_DATA,
        size,
        seq_num: seq,
        result: 0,
    }
    .encode(buf)?;
    buf[CMD_HDR_LEN..CMD_HDR_LEN + 2].copy_from_slice(&ACT_SET.to_le_bytes());
    buf[CMD_HDR_LEN + 2..CMD_HDR_LEN + 4].copy_from_slice(&2u16.to_le_bytes());
    buf[CMD_HDR_LEN + 4..CMD_HDR_LEN + 6].copy_from_slice(&(cal.len() as u16).to_le_bytes());
    buf[CMD_HDR_LEN + 6..size as usize].copy_from_slice(cal);
    Ok(size)
}

pub fn prepare_low_power_mode(buf: &mut [u8], seq: u16, enable: bool) -> Result<u16, i32> {
    put_cmd(buf, CMD_LOW_POWER_MODE, seq, &(enable as u16).to_le_bytes())
}

pub fn prepare_chan_region_cfg(buf: &mut [u8], seq: u16) -> Result<u16, i32> {
    put_cmd(buf, CMD_CHAN_REGION_CFG, seq, &ACT_GET.to_le_bytes())
}

// ============================================================================
// 响应解析：入参是命令头之后的命令体
// ============================================================================

/// 硬件规格响应（类型化字段子集）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwSpec {
    pub hw_if_version: u16,
    pub version: u16,
    pub permanent_addr: [u8; 6],
    pub region_code: u16,
    pub number_of_antenna: u16,
    pub fw_release_number: u32,
}

pub fn parse_hw_spec(body: &[u8]) -> Option<HwSpec> {
    if body.len() < 22 {
        return None;
    }
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&body[8..14]);
    Some(HwSpec {
        hw_if_version: u16::from_le_bytes([body[0], body[1]]),
        version: u16::from_le_bytes([body[2], body[3]]),
        permanent_addr: mac,
        region_code: u16::from_le_bytes([body[14], body[15]]),
        number_of_antenna: u16::from_le_bytes([body[16], body[17]]),
        fw_release_number: u32::from_le_bytes([body[18], body[19], body[20], body[21]]),
    })
}

/// MAC 地址响应：action + 6 字节地址。
pub fn parse_mac_addr(body: &[u8]) -> Option<[u8; 6]> {
    if body.len() < 8 {
        return None;
    }
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&body[2..8]);
    Some(mac)
}

/// 版本串响应：selector + NUL 结尾字符串。
pub fn parse_fw_ver_ext(body: &[u8]) -> Option<(u8, String)> {
    if body.is_empty() {
        return None;
    }
    let sel = body[0];
    let raw = &body[1..];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let s = core::str::from_utf8(&raw[..end]).ok()?;
    Some((sel, String::from(s)))
}

/// 寄存器访问响应：action + offset + value。
pub fn parse_mac_reg(body: &[u8]) -> Option<(u16, u32)> {
    if body.len() < 8 {
        return None;
    }
    let offset = u16::from_le_bytes([body[2], body[3]]);
    let value = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    Some((offset, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_bss_round_trip() {
        let seq = seq_with_bss(0x42, 2, BSS_TYPE_UAP);
        assert_eq!(seq & 0x00ff, 0x42);
        assert_eq!(bss_num_from_seq(seq), 2);
        assert_eq!(bss_type_from_seq(seq), BSS_TYPE_UAP);
    }

    #[test]
    fn small_buf_rejected() {
        // buf 不够大时报错而不是截断
        let mut buf = [0u8; 16];
        assert!(prepare_get_hw_spec(&mut buf, 7).is_err());
    }

    #[test]
    fn hw_spec_request_and_response() {
        let mut buf = [0u8; 64];
        let size = prepare_get_hw_spec(&mut buf, 3).unwrap();
        let hdr = HostCmdHdr::decode(&buf).unwrap();
        assert_eq!(hdr.command, CMD_GET_HW_SPEC);
        assert_eq!(hdr.size, size);
        assert!(!hdr.is_response());

        let mut body = [0u8; 22];
        body[8..14].copy_from_slice(&[2, 4, 6, 8, 10, 12]);
        body[18..22].copy_from_slice(&0x0102_0304u32.to_le_bytes());
        let spec = parse_hw_spec(&body).unwrap();
        assert_eq!(spec.permanent_addr, [2, 4, 6, 8, 10, 12]);
        assert_eq!(spec.fw_release_number, 0x0102_0304);
    }

    #[test]
    fn ver_ext_parses_cstr() {
        let mut body = [0u8; 40];
        body[0] = 3;
        body[1..9].copy_from_slice(b"w8801-fw");
        let (sel, ver) = parse_fw_ver_ext(&body).unwrap();
        assert_eq!(sel, 3);
        assert_eq!(ver, "w8801-fw");
    }

    #[test]
    fn response_flag() {
        let hdr = HostCmdHdr {
            command: CMD_GET_HW_SPEC | CMD_RESP_BIT,
            ..Default::default()
        };
        assert!(hdr.is_response());
        assert_eq!(hdr.cmd_id(), CMD_GET_HW_SPEC);
    }
}
