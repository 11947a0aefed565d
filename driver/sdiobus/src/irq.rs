//! 中断桥：中断上下文与处理线程之间的单次唤醒
//!
//! 装配（arm）= 置就绪标志 + 使能卡中断，两步在同一把锁内完成，
//! 防止"刚使能就来中断但标志未置"的窗口。中断侧只做一件事：
//! 若已注册消费者且处于装配态则消费标志并唤醒一次，否则计数丢弃。

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::{OsOps, SdioDrv};

/// 中断桥。每次装配最多产生一次唤醒。
pub struct IntBridge {
    /// 消费者（处理线程）已注册
    ready: AtomicBool,
    /// 装配标志：true 表示下一次卡中断应当唤醒
    armed: AtomicBool,
    /// 未装配期间到达而被丢弃的中断数
    dropped: AtomicU32,
    /// arm 的两步操作串行化
    arm_lock: spin::Mutex<()>,
}

impl IntBridge {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            dropped: AtomicU32::new(0),
            arm_lock: spin::Mutex::new(()),
        }
    }

    /// 处理线程上线/下线。未注册时中断只计数不唤醒。
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// 装配：置标志并写中断屏蔽寄存器使能卡中断。
    pub fn arm<D: SdioDrv>(&self, drv: &D, int_mask_reg: u8, mask: u8) -> Result<(), i32> {
        let _g = self.arm_lock.lock();
        self.armed.store(true, Ordering::Release);
        drv.creg_write(int_mask_reg as u32, 1, mask).map_err(|e| {
            self.armed.store(false, Ordering::Release);
            log::error!(target: "wlan::irq", "enable card interrupt failed: {e}");
            e
        })
    }

    /// 解除装配（停机路径）。
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    /// 中断上下文入口。装配态则消费标志并唤醒处理线程，否则丢弃计数。
    pub fn handle_card_interrupt<O: OsOps>(&self, os: &O) {
        if self.ready.load(Ordering::Acquire)
            && self
                .armed
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            os.io_event_signal();
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 累计丢弃的中断数。
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for IntBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;
    use core::time::Duration;

    struct MockDrv;
    impl SdioDrv for MockDrv {
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
    struct MockOs {
        io_signals: AtomicU32,
    }
    impl OsOps for MockOs {
        fn cmdresp_wait(&self, _: Duration) -> bool {
            true
        }
        fn cmdresp_signal(&self) {}
        fn io_event_wait(&self, _: Duration) -> bool {
            true
        }
        fn io_event_signal(&self) {
            self.io_signals.fetch_add(1, Ordering::Relaxed);
        }
        fn vdll_wait(&self, _: Duration) -> bool {
            true
        }
        fn vdll_signal(&self) {}
        fn sleep_ms(&self, _: u32) {}
    }

    #[test]
    fn one_wake_per_arm() {
        let bridge = IntBridge::new();
        let os = MockOs::default();
        bridge.set_ready(true);
        bridge.arm(&MockDrv, 0x02, 0x03).unwrap();
        bridge.handle_card_interrupt(&os);
        bridge.handle_card_interrupt(&os);
        assert_eq!(os.io_signals.load(Ordering::Relaxed), 1);
        assert_eq!(bridge.dropped(), 1);
    }

    #[test]
    fn not_ready_drops() {
        let bridge = IntBridge::new();
        let os = MockOs::default();
        bridge.arm(&MockDrv, 0x02, 0x03).unwrap();
        bridge.handle_card_interrupt(&os);
        assert_eq!(os.io_signals.load(Ordering::Relaxed), 0);
        assert_eq!(bridge.dropped(), 1);
    }
}
