//! 图形后端模块
//!
//! 本模块封装了渲染核心依赖的设备接口和具体实现：
//! - `backend`：`GpuDevice` / `CommandQueue` trait
//! - `headless`：不依赖真实 GPU 的软件后端，GPU 完成进度可以手动控制
//!
//! 渲染核心只面向 trait 编程，可以在不同实现之间切换而无需修改上层逻辑。

pub mod backend;
pub mod headless;

pub use backend::{CommandQueue, GpuDevice, NativeDescriptorHeap, NativeObject};
pub use headless::HeadlessDevice;
