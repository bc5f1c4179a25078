//! 进程间通信：管道由 [`crate::fs::file::pipe`] 提供，
//! 本模块负责命名共享内存环形缓冲区的注册、绑定与生命周期管理。

pub mod ringbuf;

pub use ringbuf::{ring_on_exit, ring_op, RingHandle, RingOp};
