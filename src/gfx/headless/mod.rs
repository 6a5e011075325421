//! Headless 图形后端
//!
//! 不依赖任何图形 API 的软件实现。命令不会真正执行，但队列语义是完整的：
//! 每个帧槽位的录制上下文只能在其上一次提交完成后重置，fence 值单调递增，
//! 等待是真正的阻塞等待。
//!
//! 两种 GPU 完成模式（见 [`GpuLatency`](crate::core::GpuLatency)）：
//! - `Immediate`：signal 的同时完成，适合演示程序
//! - `Manual`：由调用方通过 [`HeadlessDevice::complete_up_to`] 推进，适合测试帧节奏

mod device;
mod queue;

pub use device::HeadlessDevice;
pub use queue::HeadlessQueue;
