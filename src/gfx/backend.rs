//! 图形后端的统一抽象接口
//!
//! 本模块定义了渲染核心对底层图形 API 的全部需求。渲染核心只通过这些 trait
//! 与设备交互，具体实现可以是 D3D12、Vulkan，也可以是用于测试的 headless 后端。
//!
//! 所有原生对象都以 [`NativeObject`] 的形式交给渲染核心持有，
//! 丢弃该值即销毁对应的 GPU 对象。

use std::any::Any;
use std::sync::Arc;

use crate::core::error::Result;
use crate::renderer::descriptor::DescriptorType;
use crate::renderer::sync::FenceValue;

/// 类型擦除的原生 GPU 对象
///
/// 渲染核心不关心其具体类型，只负责决定何时丢弃它。
pub type NativeObject = Box<dyn Any + Send>;

/// 后端创建的原生描述符堆
pub struct NativeDescriptorHeap {
    /// 第一个槽位的 CPU 地址
    pub cpu_start: usize,
    /// 第一个槽位的 GPU 地址（仅着色器可见的堆）
    pub gpu_start: Option<u64>,
    /// 相邻槽位之间的字节间隔
    pub descriptor_size: u32,
    /// 堆对象本身
    pub object: NativeObject,
}

/// 直接命令队列
///
/// 每个帧槽位拥有一套独立的命令录制上下文（allocator + list），
/// 所有帧共享同一个 fence。
pub trait CommandQueue: Send + Sync {
    /// 重置帧槽位的录制上下文并开始录制
    ///
    /// 调用方保证该槽位上一次提交的 GPU 工作已经完成。
    fn reset_recording(&self, frame_index: usize) -> Result<()>;

    /// 结束录制并提交该槽位的命令
    fn submit(&self, frame_index: usize) -> Result<()>;

    /// 在队列上 signal 共享 fence
    fn signal(&self, value: FenceValue) -> Result<()>;

    /// 共享 fence 的已完成值
    fn completed_value(&self) -> FenceValue;

    /// 阻塞等待共享 fence 达到 `value`，没有超时
    fn wait_for_value(&self, value: FenceValue) -> Result<()>;
}

/// 图形设备
pub trait GpuDevice: Send + Sync {
    /// 后端名称，用于日志输出
    fn backend_name(&self) -> &str;

    /// 创建直接命令队列，为 `frame_count` 个帧槽位各准备一套录制上下文
    fn create_command_queue(&self, frame_count: usize) -> Result<Arc<dyn CommandQueue>>;

    /// 创建固定容量的描述符堆
    fn create_descriptor_heap(
        &self,
        descriptor_type: DescriptorType,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<NativeDescriptorHeap>;

    /// 创建并填充一个 GPU 缓冲区
    fn create_buffer(&self, name: &str, data: &[u8]) -> Result<NativeObject>;
}
