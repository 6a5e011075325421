//! 渲染器模块
//!
//! 本模块提供渲染核心的资源生命周期和帧同步服务。
//! 上层通过 [`RenderCore`] 访问描述符堆、帧节奏控制器和延迟释放队列，
//! 而不需要关心底层使用的是哪个图形后端。
//!
//! # 架构设计
//!
//! - `RenderCore`：统一的服务对象，显式初始化和关闭
//! - `descriptor`：固定容量、按帧延迟回收的描述符堆
//! - `command`：帧节奏控制器（命令录制槽位 + fence）
//! - `deferred`：按帧槽位分组的延迟释放队列
//! - `submesh`：几何体注册表背后的子网格表

use std::sync::Arc;
use tracing::{info, warn};

use crate::content::geometry::SubmeshChunk;
use crate::content::GeometryBackend;
use crate::core::error::Result;
use crate::core::{Id, RenderConfig};
use crate::gfx::backend::{GpuDevice, NativeObject};

pub mod command;
pub mod deferred;
pub mod descriptor;
pub mod frame;
pub mod submesh;
pub mod sync;

pub use command::FramePacer;
pub use deferred::DeferredReleaseQueue;
pub use descriptor::{DescriptorHandle, DescriptorHeap, DescriptorHeaps, DescriptorType};
pub use frame::{FrameCursor, FRAME_BUFFER_COUNT};
pub use submesh::{SubmeshTable, SubmeshView};
pub use sync::FenceValue;

/// 渲染核心
///
/// 持有图形设备、四个标准描述符堆、帧节奏控制器和子网格表。
/// 描述符堆先于帧节奏控制器初始化。
pub struct RenderCore {
    device: Arc<dyn GpuDevice>,
    heaps: DescriptorHeaps,
    pacer: FramePacer,
    submeshes: SubmeshTable,
}

impl RenderCore {
    pub fn initialize(device: Arc<dyn GpuDevice>, config: &RenderConfig) -> Result<Self> {
        info!(backend = device.backend_name(), "Initializing render core");

        let cursor = FrameCursor::new();
        let heaps = DescriptorHeaps::new(&cursor);
        heaps.initialize(device.as_ref(), config)?;
        let pacer = FramePacer::new(device.as_ref(), cursor)?;

        Ok(Self {
            device,
            heaps,
            pacer,
            submeshes: SubmeshTable::new(),
        })
    }

    /// 开始录制当前帧槽位，可能阻塞等待 GPU
    pub fn begin_frame(&self) -> Result<usize> {
        self.pacer.begin_frame(&self.heaps)
    }

    pub fn end_frame(&self) -> Result<()> {
        self.pacer.end_frame()
    }

    pub fn flush(&self) -> Result<()> {
        self.pacer.flush()
    }

    pub fn current_frame_index(&self) -> usize {
        self.pacer.current_frame_index()
    }

    /// 延迟销毁原生对象，可以从任意线程调用
    pub fn deferred_release(&self, resource: NativeObject) {
        self.pacer.deferred_release(resource);
    }

    pub fn heaps(&self) -> &DescriptorHeaps {
        &self.heaps
    }

    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn submeshes(&self) -> &SubmeshTable {
        &self.submeshes
    }

    /// 获取子网格视图，用于组装渲染项
    pub fn get_views(&self, ids: &[Id]) -> Vec<SubmeshView> {
        self.submeshes.get_views(ids)
    }

    /// 关闭渲染核心
    ///
    /// 等待所有在途帧，释放描述符堆，然后处理每个帧槽位的延迟释放，
    /// 保证没有任何原生对象比设备活得更久。
    /// 设备已经失效时仍然执行释放，并返回原始错误。
    pub fn shutdown(&self) -> Result<()> {
        let flushed = self.pacer.flush();
        if let Err(err) = &flushed {
            if !err.is_fatal() {
                return flushed;
            }
            warn!(error = %err, "Releasing resources after device failure");
        }

        if !self.submeshes.is_empty() {
            warn!(count = self.submeshes.len(), "Submeshes still registered at shutdown");
        }

        self.heaps.release(self.pacer.release_queue());
        self.pacer.drain(&self.heaps);
        info!("Render core shut down");
        flushed
    }
}

impl GeometryBackend for RenderCore {
    fn add_submesh(&self, chunk: &SubmeshChunk<'_>) -> Result<Id> {
        self.submeshes.add(self.device.as_ref(), &self.heaps.srv, chunk)
    }

    fn remove_submesh(&self, id: Id) {
        self.submeshes.remove(id, &self.heaps.srv, &self.pacer);
    }
}
