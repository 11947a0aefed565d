//! 包缓冲 crate
//!
//! - [`PktBuf`]：`[ headroom | payload | tailroom ]` 布局的单包缓冲，
//!   支持尾部追加、头部消费、头部预留三种指针操作
//! - [`PktPool`]：有界缓冲池，事件/命令上送路径从池中取缓冲，
//!   池空时分配失败而不是无限增长

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod buffer;
mod pool;

pub use buffer::PktBuf;
pub use pool::PktPool;
