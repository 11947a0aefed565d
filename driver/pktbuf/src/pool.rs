//! 有界缓冲池
//!
//! 事件与命令上送路径的缓冲来源：池在创建时一次性分配固定数量的
//! [`PktBuf`]，取空后 `get` 失败，由调用方丢帧，避免中断风暴下无界分配。

use alloc::vec::Vec;

use crate::PktBuf;

/// 固定容量缓冲池。`get`/`put` 内部用自旋锁保护空闲表。
pub struct PktPool {
    free: spin::Mutex<Vec<PktBuf>>,
    buf_capacity: usize,
    headroom: usize,
    total: usize,
}

impl PktPool {
    /// 预分配 count 个缓冲，每个 capacity 字节、前端预留 headroom。
    pub fn new(count: usize, capacity: usize, headroom: usize) -> Self {
        let mut free = Vec::with_capacity(count);
        for _ in 0..count {
            free.push(PktBuf::alloc_with_headroom(capacity, headroom));
        }
        PktPool {
            free: spin::Mutex::new(free),
            buf_capacity: capacity,
            headroom,
            total: count,
        }
    }

    /// 取一个空闲缓冲；池空返回 None。
    pub fn get(&self) -> Option<PktBuf> {
        let buf = self.free.lock().pop();
        if buf.is_none() {
            log::warn!(target: "pktbuf", "pool exhausted ({} bufs in flight)", self.total);
        }
        buf
    }

    /// 归还缓冲。复位 payload 后入空闲表；超量归还的外来缓冲丢弃。
    pub fn put(&self, mut buf: PktBuf) {
        let mut free = self.free.lock();
        if free.len() >= self.total {
            return;
        }
        buf.recycle(self.headroom);
        free.push(buf);
    }

    /// 当前空闲数。
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// 每个缓冲的容量。
    pub fn buf_capacity(&self) -> usize {
        self.buf_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_bounded() {
        let pool = PktPool::new(2, 128, 4);
        let a = pool.get().unwrap();
        let _b = pool.get().unwrap();
        assert!(pool.get().is_none());
        pool.put(a);
        assert_eq!(pool.available(), 1);
        let a2 = pool.get().unwrap();
        assert_eq!(a2.len(), 0);
        assert_eq!(a2.headroom(), 4);
    }
}
