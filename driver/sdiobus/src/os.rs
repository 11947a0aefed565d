//! 调度器原语契约
//!
//! 传输核心不直接依赖某个内核：命令响应信号量、IO 事件等待、
//! 固件下载完成三对 wait/notify 和毫秒睡眠由平台实现。等待返回值
//! 约定与等待队列一致：`true` 表示超时，`false` 表示被唤醒。

use core::time::Duration;

/// 平台阻塞原语。所有等待均带超时，不提供无限等待。
pub trait OsOps {
    /// 阻塞等待命令响应，最多 `dur`；超时返回 true。
    fn cmdresp_wait(&self, dur: Duration) -> bool;

    /// 响应解码完成后唤醒正在 `cmdresp_wait` 的发送方。
    fn cmdresp_signal(&self);

    /// 处理线程阻塞等待卡中断事件；超时返回 true。
    fn io_event_wait(&self, dur: Duration) -> bool;

    /// 中断桥唤醒处理线程。
    fn io_event_signal(&self);

    /// 等待固件补丁下载窗口关闭；超时返回 true。
    fn vdll_wait(&self, dur: Duration) -> bool;

    /// 补丁下载结束事件到达时唤醒等待方。
    fn vdll_signal(&self);

    /// 让出 CPU 约 ms 毫秒。
    fn sleep_ms(&self, ms: u32);

    /// 命令响应等满 20 秒仍未到：固件命令管线已不可恢复。
    /// 默认实现直接 panic；需要自定义善后（复位、落盘）的平台可覆盖。
    fn on_cmd_timeout(&self, cmd: u16) {
        panic!("wlan cmd 0x{cmd:04x}: no response from firmware, pipeline dead");
    }
}
