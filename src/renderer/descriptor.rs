//! 描述符管理模块
//!
//! 固定容量的描述符堆，按帧延迟回收槽位。
//!
//! # 设计原则
//!
//! - **固定容量**：堆在初始化时确定大小，运行时不增长，分配失败返回 `DescriptorHeapFull`
//! - **延迟回收**：`free` 只把索引记在当前帧槽位的列表里，该帧槽位再次开始时
//!   才由 `process_deferred_free` 放回空闲列表，在途的命令列表不会读到被重新分配的描述符
//! - **所有权检查**：每个槽位记录发放它的堆，重复释放和跨堆释放直接断言失败
//!
//! # 描述符类型
//!
//! - **RTV** (Render Target View)：渲染目标视图，用于渲染输出
//! - **DSV** (Depth Stencil View)：深度模板视图，用于深度测试
//! - **SRV** (Shader Resource View)：着色资源视图，着色器可见
//! - **UAV** (Unordered Access View)：无序访问视图

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, trace, warn};

use super::deferred::DeferredReleaseQueue;
use super::frame::{FrameCursor, FRAME_BUFFER_COUNT};
use crate::core::config::RenderConfig;
use crate::core::error::{GraphicsError, RenderCoreError, Result};
use crate::gfx::backend::{GpuDevice, NativeObject};

/// 每个堆的唯一编号，用于检查槽位归属
static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// 描述符类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// 渲染目标视图 (RTV)
    RenderTargetView,
    /// 深度模板视图 (DSV)
    DepthStencilView,
    /// 着色资源视图 (SRV)
    ShaderResourceView,
    /// 无序访问视图 (UAV)
    UnorderedAccessView,
}

impl DescriptorType {
    /// 获取描述符类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorType::RenderTargetView => "RTV",
            DescriptorType::DepthStencilView => "DSV",
            DescriptorType::ShaderResourceView => "SRV",
            DescriptorType::UnorderedAccessView => "UAV",
        }
    }
}

/// 描述符句柄（CPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: usize,
}

impl CpuDescriptorHandle {
    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + count as usize * increment_size as usize,
        }
    }
}

/// 描述符句柄（GPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: u64,
}

impl GpuDescriptorHandle {
    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + count as u64 * increment_size as u64,
        }
    }
}

/// 描述符槽位
///
/// CPU 句柄、着色器可见堆的 GPU 句柄，以及槽位在堆中的索引。
/// 地址在槽位被释放之前保持稳定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    /// CPU 可见句柄
    pub cpu: CpuDescriptorHandle,
    /// GPU 可见句柄（仅对着色器可见的堆有效）
    pub gpu: Option<GpuDescriptorHandle>,
    /// 槽位索引
    pub index: u32,
    heap_id: u32,
}

impl DescriptorHandle {
    /// 无效句柄
    pub const fn invalid() -> Self {
        Self {
            cpu: CpuDescriptorHandle { ptr: 0 },
            gpu: None,
            index: u32::MAX,
            heap_id: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.heap_id != 0
    }

    pub fn is_shader_visible(&self) -> bool {
        self.gpu.is_some()
    }
}

impl Default for DescriptorHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

/// 描述符堆统计信息
#[derive(Debug, Clone)]
pub struct DescriptorHeapStats {
    /// 描述符类型
    pub descriptor_type: DescriptorType,
    /// 总容量
    pub capacity: u32,
    /// 已使用数量（包括等待延迟回收的槽位）
    pub used: u32,
    /// 等待延迟回收的数量
    pub pending_free: u32,
    /// 可用数量
    pub available: u32,
    /// 使用率 (0.0 - 1.0)
    pub usage_ratio: f32,
}

impl DescriptorHeapStats {
    /// 创建新的统计信息
    pub fn new(descriptor_type: DescriptorType, capacity: u32, used: u32, pending_free: u32) -> Self {
        let available = capacity.saturating_sub(used);
        let usage_ratio = if capacity > 0 {
            used as f32 / capacity as f32
        } else {
            0.0
        };

        Self {
            descriptor_type,
            capacity,
            used,
            pending_free,
            available,
            usage_ratio,
        }
    }
}

/// 堆内部状态，整体由一把锁保护
struct HeapState {
    native: Option<NativeObject>,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
    descriptor_size: u32,
    capacity: u32,
    /// 空闲索引栈，栈顶先被分配
    free_indices: Vec<u32>,
    /// 每个帧槽位期间释放的索引
    deferred_free: [Vec<u32>; FRAME_BUFFER_COUNT],
    /// 槽位是否处于已分配状态
    live: Vec<bool>,
}

impl HeapState {
    fn empty() -> Self {
        Self {
            native: None,
            cpu_start: CpuDescriptorHandle { ptr: 0 },
            gpu_start: None,
            descriptor_size: 0,
            capacity: 0,
            free_indices: Vec::new(),
            deferred_free: Default::default(),
            live: Vec::new(),
        }
    }

    fn pending_free(&self) -> u32 {
        self.deferred_free.iter().map(|list| list.len() as u32).sum()
    }
}

/// 固定容量的描述符堆
///
/// 所有方法都只需要 `&self`，内部状态由互斥锁保护，可以从多个线程同时分配和释放。
pub struct DescriptorHeap {
    descriptor_type: DescriptorType,
    heap_id: u32,
    cursor: FrameCursor,
    state: Mutex<HeapState>,
}

impl DescriptorHeap {
    /// 创建未初始化的堆
    ///
    /// `cursor` 提供释放时的当前帧槽位。
    pub fn new(descriptor_type: DescriptorType, cursor: FrameCursor) -> Self {
        Self {
            descriptor_type,
            heap_id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            cursor,
            state: Mutex::new(HeapState::empty()),
        }
    }

    /// 创建原生堆并准备 `capacity` 个空闲槽位
    pub fn initialize(
        &self,
        device: &dyn GpuDevice,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.native.is_some() {
            return Err(RenderCoreError::Initialization(format!(
                "{} heap is already initialized",
                self.descriptor_type.name()
            )));
        }

        let native = device.create_descriptor_heap(self.descriptor_type, capacity, shader_visible)?;

        state.cpu_start = CpuDescriptorHandle { ptr: native.cpu_start };
        state.gpu_start = native.gpu_start.map(|ptr| GpuDescriptorHandle { ptr });
        state.descriptor_size = native.descriptor_size;
        state.capacity = capacity;
        state.free_indices = (0..capacity).rev().collect();
        state.deferred_free = Default::default();
        state.live = vec![false; capacity as usize];
        state.native = Some(native.object);

        info!(
            heap = self.descriptor_type.name(),
            capacity,
            shader_visible,
            "Descriptor heap initialized"
        );
        Ok(())
    }

    /// 分配一个槽位
    ///
    /// 容量耗尽时返回 `DescriptorHeapFull`，堆不会增长。
    pub fn allocate(&self) -> Result<DescriptorHandle> {
        let mut state = self.state.lock();
        assert!(
            state.native.is_some(),
            "{} heap used before initialization",
            self.descriptor_type.name()
        );

        let Some(index) = state.free_indices.pop() else {
            warn!(
                heap = self.descriptor_type.name(),
                capacity = state.capacity,
                pending_free = state.pending_free(),
                "Descriptor heap exhausted"
            );
            return Err(GraphicsError::DescriptorHeapFull {
                heap: self.descriptor_type.name(),
                capacity: state.capacity,
            }
            .into());
        };

        debug_assert!(!state.live[index as usize]);
        state.live[index as usize] = true;

        let handle = DescriptorHandle {
            cpu: state.cpu_start.offset(index, state.descriptor_size),
            gpu: state
                .gpu_start
                .map(|start| start.offset(index, state.descriptor_size)),
            index,
            heap_id: self.heap_id,
        };
        trace!(heap = self.descriptor_type.name(), index, "Descriptor allocated");
        Ok(handle)
    }

    /// 释放槽位
    ///
    /// 索引被记入当前帧槽位的延迟列表，句柄本身立即被置为无效。
    /// 传入无效句柄时什么也不做。
    ///
    /// # Panics
    ///
    /// 槽位不属于这个堆，或者已经被释放过。
    pub fn free(&self, handle: &mut DescriptorHandle) {
        if !handle.is_valid() {
            return;
        }

        let mut state = self.state.lock();
        assert_eq!(
            handle.heap_id,
            self.heap_id,
            "descriptor freed into a heap that did not issue it ({})",
            self.descriptor_type.name()
        );
        assert!(handle.index < state.capacity, "descriptor index out of range");
        debug_assert_eq!(
            handle.cpu,
            state.cpu_start.offset(handle.index, state.descriptor_size)
        );
        assert!(
            state.live[handle.index as usize],
            "descriptor {} freed twice ({})",
            handle.index,
            self.descriptor_type.name()
        );

        state.live[handle.index as usize] = false;
        let frame_index = self.cursor.current();
        state.deferred_free[frame_index].push(handle.index);
        trace!(
            heap = self.descriptor_type.name(),
            index = handle.index,
            frame_index,
            "Descriptor free deferred"
        );

        *handle = DescriptorHandle::invalid();
    }

    /// 回收指定帧槽位期间释放的索引
    pub fn process_deferred_free(&self, frame_index: usize) {
        assert!(
            frame_index < FRAME_BUFFER_COUNT,
            "frame index {} out of range for {} heap",
            frame_index,
            self.descriptor_type.name()
        );
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.deferred_free[frame_index]);
        if pending.is_empty() {
            return;
        }

        debug!(
            heap = self.descriptor_type.name(),
            frame_index,
            count = pending.len(),
            "Reclaiming deferred descriptors"
        );
        state.free_indices.extend(pending);
    }

    /// 释放原生堆
    ///
    /// 原生对象交给延迟释放队列，等当前帧槽位再次开始时才真正销毁。
    pub fn release(&self, release_queue: &DeferredReleaseQueue) {
        let mut state = self.state.lock();
        let Some(native) = state.native.take() else {
            return;
        };

        let live = state.live.iter().filter(|&&live| live).count();
        if live > 0 {
            warn!(
                heap = self.descriptor_type.name(),
                live,
                "Descriptor heap released with live descriptors"
            );
        }

        *state = HeapState::empty();
        drop(state);

        release_queue.deferred_release(native);
        info!(heap = self.descriptor_type.name(), "Descriptor heap released");
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    pub fn capacity(&self) -> u32 {
        self.state.lock().capacity
    }

    pub fn descriptor_size(&self) -> u32 {
        self.state.lock().descriptor_size
    }

    pub fn is_shader_visible(&self) -> bool {
        self.state.lock().gpu_start.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().native.is_some()
    }

    /// 获取统计信息
    pub fn stats(&self) -> DescriptorHeapStats {
        let state = self.state.lock();
        let used = state.capacity - state.free_indices.len() as u32;
        DescriptorHeapStats::new(self.descriptor_type, state.capacity, used, state.pending_free())
    }
}

/// 渲染器使用的四个标准描述符堆
pub struct DescriptorHeaps {
    pub rtv: DescriptorHeap,
    pub dsv: DescriptorHeap,
    pub srv: DescriptorHeap,
    pub uav: DescriptorHeap,
}

impl DescriptorHeaps {
    pub fn new(cursor: &FrameCursor) -> Self {
        Self {
            rtv: DescriptorHeap::new(DescriptorType::RenderTargetView, cursor.clone()),
            dsv: DescriptorHeap::new(DescriptorType::DepthStencilView, cursor.clone()),
            srv: DescriptorHeap::new(DescriptorType::ShaderResourceView, cursor.clone()),
            uav: DescriptorHeap::new(DescriptorType::UnorderedAccessView, cursor.clone()),
        }
    }

    /// 按配置的容量初始化全部堆，只有 SRV 堆着色器可见
    pub fn initialize(&self, device: &dyn GpuDevice, config: &RenderConfig) -> Result<()> {
        self.rtv.initialize(device, config.rtv_capacity, false)?;
        self.dsv.initialize(device, config.dsv_capacity, false)?;
        self.srv.initialize(device, config.srv_capacity, true)?;
        self.uav.initialize(device, config.uav_capacity, false)?;
        Ok(())
    }

    /// 回收所有堆在指定帧槽位期间释放的索引
    pub fn process_deferred_free(&self, frame_index: usize) {
        for heap in self.iter() {
            heap.process_deferred_free(frame_index);
        }
    }

    pub fn release(&self, release_queue: &DeferredReleaseQueue) {
        for heap in self.iter() {
            heap.release(release_queue);
        }
    }

    /// 获取所有统计信息
    pub fn all_stats(&self) -> Vec<DescriptorHeapStats> {
        self.iter().map(DescriptorHeap::stats).collect()
    }

    fn iter(&self) -> impl Iterator<Item = &DescriptorHeap> {
        [&self.rtv, &self.dsv, &self.srv, &self.uav].into_iter()
    }
}
