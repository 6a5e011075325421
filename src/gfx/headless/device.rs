//! Headless 图形设备

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::queue::HeadlessQueue;
use crate::core::config::GpuLatency;
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{CommandQueue, GpuDevice, NativeDescriptorHeap, NativeObject};
use crate::renderer::descriptor::DescriptorType;
use crate::renderer::sync::FenceValue;

/// 模拟的描述符堆地址空间起点
const HEAP_ADDRESS_BASE: usize = 0x1000_0000;
/// GPU 可见地址相对于 CPU 地址的偏移
const GPU_ADDRESS_OFFSET: u64 = 0x1_0000_0000;

/// 存活的原生对象计数
#[derive(Debug, Default)]
struct LiveObjects {
    buffers: AtomicUsize,
    heaps: AtomicUsize,
}

/// Headless 缓冲区，丢弃时从存活计数中移除
struct HeadlessBuffer {
    name: String,
    _data: Box<[u8]>,
    live: Arc<LiveObjects>,
}

impl Drop for HeadlessBuffer {
    fn drop(&mut self) {
        self.live.buffers.fetch_sub(1, Ordering::AcqRel);
        debug!(buffer = %self.name, "Headless buffer destroyed");
    }
}

struct HeadlessHeap {
    descriptor_type: DescriptorType,
    live: Arc<LiveObjects>,
}

impl Drop for HeadlessHeap {
    fn drop(&mut self) {
        self.live.heaps.fetch_sub(1, Ordering::AcqRel);
        debug!(heap = self.descriptor_type.name(), "Headless descriptor heap destroyed");
    }
}

/// Headless 图形设备
///
/// 记录存活的缓冲区和描述符堆数量，测试可以据此检查资源何时被真正销毁。
pub struct HeadlessDevice {
    latency: GpuLatency,
    lost: Arc<AtomicBool>,
    live: Arc<LiveObjects>,
    next_heap_address: AtomicUsize,
    queues: Mutex<Vec<Arc<HeadlessQueue>>>,
}

impl HeadlessDevice {
    pub fn new(latency: GpuLatency) -> Self {
        Self {
            latency,
            lost: Arc::new(AtomicBool::new(false)),
            live: Arc::new(LiveObjects::default()),
            next_heap_address: AtomicUsize::new(HEAP_ADDRESS_BASE),
            queues: Mutex::new(Vec::new()),
        }
    }

    pub fn latency(&self) -> GpuLatency {
        self.latency
    }

    /// 推进所有队列的完成值
    pub fn complete_up_to(&self, value: FenceValue) {
        for queue in self.queues.lock().iter() {
            queue.complete_up_to(value);
        }
    }

    /// 完成所有队列上已提交的工作
    pub fn complete_all(&self) {
        for queue in self.queues.lock().iter() {
            queue.complete_all();
        }
    }

    /// 最近创建的命令队列
    pub fn queue(&self) -> Option<Arc<HeadlessQueue>> {
        self.queues.lock().last().cloned()
    }

    /// 模拟设备丢失：之后的所有操作返回 `DeviceLost`，阻塞中的等待被唤醒
    pub fn lose_device(&self) {
        warn!("Headless device lost");
        self.lost.store(true, Ordering::Release);
        for queue in self.queues.lock().iter() {
            queue.abort();
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// 存活的缓冲区数量
    pub fn live_buffers(&self) -> usize {
        self.live.buffers.load(Ordering::Acquire)
    }

    /// 存活的描述符堆数量
    pub fn live_heaps(&self) -> usize {
        self.live.heaps.load(Ordering::Acquire)
    }

    fn check_device(&self) -> Result<()> {
        if self.is_lost() {
            return Err(GraphicsError::DeviceLost.into());
        }
        Ok(())
    }
}

fn descriptor_size(descriptor_type: DescriptorType) -> u32 {
    match descriptor_type {
        DescriptorType::RenderTargetView | DescriptorType::DepthStencilView => 32,
        _ => 64,
    }
}

impl GpuDevice for HeadlessDevice {
    fn backend_name(&self) -> &str {
        "Headless"
    }

    fn create_command_queue(&self, frame_count: usize) -> Result<Arc<dyn CommandQueue>> {
        self.check_device()?;
        let queue = Arc::new(HeadlessQueue::new(
            frame_count,
            self.latency,
            Arc::clone(&self.lost),
        ));
        self.queues.lock().push(Arc::clone(&queue));
        Ok(queue as Arc<dyn CommandQueue>)
    }

    fn create_descriptor_heap(
        &self,
        descriptor_type: DescriptorType,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<NativeDescriptorHeap> {
        self.check_device()?;
        if capacity == 0 {
            return Err(GraphicsError::ResourceCreation(format!(
                "{} heap capacity must be non-zero",
                descriptor_type.name()
            ))
            .into());
        }

        let size = descriptor_size(descriptor_type);
        let span = capacity as usize * size as usize;
        let cpu_start = self.next_heap_address.fetch_add(span, Ordering::AcqRel);
        let gpu_start = shader_visible.then(|| cpu_start as u64 + GPU_ADDRESS_OFFSET);

        self.live.heaps.fetch_add(1, Ordering::AcqRel);
        let object: NativeObject = Box::new(HeadlessHeap {
            descriptor_type,
            live: Arc::clone(&self.live),
        });

        Ok(NativeDescriptorHeap {
            cpu_start,
            gpu_start,
            descriptor_size: size,
            object,
        })
    }

    fn create_buffer(&self, name: &str, data: &[u8]) -> Result<NativeObject> {
        self.check_device()?;
        self.live.buffers.fetch_add(1, Ordering::AcqRel);
        debug!(buffer = name, size = data.len(), "Headless buffer created");

        Ok(Box::new(HeadlessBuffer {
            name: name.to_string(),
            _data: data.into(),
            live: Arc::clone(&self.live),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RenderCoreError;

    #[test]
    fn test_live_object_counting() {
        let device = HeadlessDevice::new(GpuLatency::Immediate);
        let buffer = device.create_buffer("vb", &[0u8; 16]).unwrap();
        let heap = device
            .create_descriptor_heap(DescriptorType::ShaderResourceView, 8, true)
            .unwrap();
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(device.live_heaps(), 1);

        drop(buffer);
        drop(heap);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_heaps(), 0);
    }

    #[test]
    fn test_heaps_do_not_overlap() {
        let device = HeadlessDevice::new(GpuLatency::Immediate);
        let a = device
            .create_descriptor_heap(DescriptorType::RenderTargetView, 4, false)
            .unwrap();
        let b = device
            .create_descriptor_heap(DescriptorType::ShaderResourceView, 4, true)
            .unwrap();

        assert!(a.gpu_start.is_none());
        assert!(b.gpu_start.is_some());
        assert!(b.cpu_start >= a.cpu_start + 4 * a.descriptor_size as usize);
    }

    #[test]
    fn test_zero_capacity_heap_rejected() {
        let device = HeadlessDevice::new(GpuLatency::Immediate);
        assert!(device
            .create_descriptor_heap(DescriptorType::DepthStencilView, 0, false)
            .is_err());
    }

    #[test]
    fn test_lost_device() {
        let device = HeadlessDevice::new(GpuLatency::Manual);
        let queue = device.create_command_queue(3).unwrap();
        device.lose_device();

        let err = device.create_buffer("vb", &[]).unwrap_err();
        assert!(matches!(err, RenderCoreError::Graphics(GraphicsError::DeviceLost)));
        assert!(queue.reset_recording(0).is_err());
    }
}
