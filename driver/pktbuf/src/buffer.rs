//! 单包缓冲
//!
//! 布局：`[0..off]` 为 headroom，`[off..off+len]` 为 payload，其余为 tailroom。
//! 收包路径先 `append` 写入原始帧，再 `consume` 剥掉总线头；
//! 发包路径用 `prepend` 在 payload 前回填描述符。

use alloc::vec::Vec;

/// 单包缓冲。payload 视图随 `consume`/`prepend` 移动，底层存储不搬移。
#[derive(Clone)]
pub struct PktBuf {
    /// 整块存储，容量在分配时固定
    storage: Vec<u8>,
    /// payload 起始下标
    off: usize,
    /// payload 长度
    len: usize,
}

impl PktBuf {
    /// 分配 capacity 字节、payload 长度为 0 的缓冲。
    pub fn alloc(capacity: usize) -> Self {
        Self::alloc_with_headroom(capacity, 0)
    }

    /// 分配并在前端预留 headroom 字节。
    pub fn alloc_with_headroom(capacity: usize, headroom: usize) -> Self {
        let off = headroom.min(capacity);
        let mut storage = Vec::with_capacity(capacity);
        storage.resize(capacity, 0);
        PktBuf { storage, off, len: 0 }
    }

    /// 从已有字节构造，前端预留 headroom。
    pub fn from_payload(payload: &[u8], headroom: usize) -> Self {
        let mut buf = Self::alloc_with_headroom(headroom + payload.len(), headroom);
        if let Some(dst) = buf.append(payload.len()) {
            dst.copy_from_slice(payload);
        }
        buf
    }

    /// 当前 payload 只读视图。
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.storage[self.off..self.off + self.len]
    }

    /// payload 起始到存储末尾的可写视图，收包写入后配合 [`set_payload_len`](Self::set_payload_len)。
    #[inline]
    pub fn writable(&mut self) -> &mut [u8] {
        let end = self.storage.len();
        &mut self.storage[self.off..end]
    }

    /// 设置 payload 长度，收包完成后调用；超出存储时截断到可用上限。
    #[inline]
    pub fn set_payload_len(&mut self, len: usize) {
        let max = self.storage.len().saturating_sub(self.off);
        self.len = len.min(max);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// payload 前的空间。
    #[inline]
    pub fn headroom(&self) -> usize {
        self.off
    }

    /// payload 后的空间。
    #[inline]
    pub fn tailroom(&self) -> usize {
        self.storage.len().saturating_sub(self.off + self.len)
    }

    /// 尾部追加 n 字节并返回可写切片；tailroom 不足返回 None。
    #[inline]
    pub fn append(&mut self, n: usize) -> Option<&mut [u8]> {
        if self.tailroom() < n {
            return None;
        }
        let start = self.off + self.len;
        self.len += n;
        Some(&mut self.storage[start..start + n])
    }

    /// 头部消费 n 字节，payload 前移。超出部分按 len 截断。
    #[inline]
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.off += n;
        self.len -= n;
    }

    /// 在 payload 前回填 n 字节，返回可写切片；headroom 不足返回 None。
    #[inline]
    pub fn prepend(&mut self, n: usize) -> Option<&mut [u8]> {
        if self.off < n {
            return None;
        }
        self.off -= n;
        self.len += n;
        Some(&mut self.storage[self.off..self.off + n])
    }

    /// 复位为空 payload、headroom 归位，供缓冲池回收复用。
    #[inline]
    pub fn recycle(&mut self, headroom: usize) {
        self.off = headroom.min(self.storage.len());
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_consume() {
        let mut buf = PktBuf::alloc_with_headroom(64, 4);
        assert_eq!(buf.headroom(), 4);
        assert_eq!(buf.len(), 0);
        let p = buf.append(8).unwrap();
        p.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buf.len(), 8);
        buf.consume(4);
        assert_eq!(buf.payload(), &[5, 6, 7, 8]);
        assert_eq!(buf.headroom(), 8);
    }

    #[test]
    fn prepend_uses_headroom() {
        let mut buf = PktBuf::from_payload(&[0xaa; 16], 8);
        let hdr = buf.prepend(4).unwrap();
        hdr.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf.payload()[..4], &[1, 2, 3, 4]);
        assert!(buf.prepend(8).is_none());
    }

    #[test]
    fn append_bounded_by_tailroom() {
        let mut buf = PktBuf::alloc(8);
        assert!(buf.append(8).is_some());
        assert!(buf.append(1).is_none());
    }
}
