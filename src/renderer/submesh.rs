//! 子网格表
//!
//! 渲染器侧的子网格记录：每个子网格一个 GPU 缓冲区（位置、顶点属性、索引依次排列）
//! 和一个 SRV 槽位。几何体注册表通过返回的 `Id` 引用它们。

use parking_lot::Mutex;
use tracing::trace;

use super::command::FramePacer;
use super::descriptor::{DescriptorHandle, DescriptorHeap};
use crate::content::geometry::SubmeshChunk;
use crate::core::error::Result;
use crate::core::{FreeList, Id};
use crate::gfx::backend::{GpuDevice, NativeObject};

/// 子网格的渲染视图
#[derive(Debug, Clone, Copy)]
pub struct SubmeshView {
    /// 缓冲区总大小（字节）
    pub buffer_size: u64,
    /// 顶点属性数据在缓冲区中的偏移
    pub element_offset: u64,
    /// 索引数据在缓冲区中的偏移
    pub index_offset: u64,
    pub element_size: u32,
    pub vertex_count: u32,
    pub index_count: u32,
    /// 索引宽度（2 或 4 字节）
    pub index_size: u32,
    pub elements_type: u32,
    pub primitive_topology: u32,
    /// 缓冲区的 SRV 槽位
    pub srv: DescriptorHandle,
}

struct SubmeshRecord {
    view: SubmeshView,
    buffer: NativeObject,
}

/// 子网格注册表
#[derive(Default)]
pub struct SubmeshTable {
    records: Mutex<FreeList<SubmeshRecord>>,
}

impl SubmeshTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建子网格的 GPU 缓冲区并分配 SRV 槽位
    pub fn add(
        &self,
        device: &dyn GpuDevice,
        srv_heap: &DescriptorHeap,
        chunk: &SubmeshChunk<'_>,
    ) -> Result<Id> {
        let element_offset = chunk.positions.len();
        let index_offset = element_offset + chunk.elements.len();

        let mut data = Vec::with_capacity(index_offset + chunk.indices.len());
        data.extend_from_slice(chunk.positions);
        data.extend_from_slice(chunk.elements);
        data.extend_from_slice(chunk.indices);

        let buffer = device.create_buffer("submesh", &data)?;
        let srv = srv_heap.allocate()?;

        let view = SubmeshView {
            buffer_size: data.len() as u64,
            element_offset: element_offset as u64,
            index_offset: index_offset as u64,
            element_size: chunk.element_size,
            vertex_count: chunk.vertex_count,
            index_count: chunk.index_count,
            index_size: chunk.index_size(),
            elements_type: chunk.elements_type,
            primitive_topology: chunk.primitive_topology,
            srv,
        };

        let id = self.records.lock().add(SubmeshRecord { view, buffer });
        trace!(%id, size = view.buffer_size, srv = srv.index, "Submesh added");
        Ok(id)
    }

    /// 移除子网格
    ///
    /// SRV 槽位和缓冲区都按当前帧槽位延迟回收。
    pub fn remove(&self, id: Id, srv_heap: &DescriptorHeap, pacer: &FramePacer) {
        let mut record = self.records.lock().take(id);
        srv_heap.free(&mut record.view.srv);
        pacer.deferred_release(record.buffer);
        trace!(%id, "Submesh removed");
    }

    /// 按顺序获取子网格视图
    pub fn get_views(&self, ids: &[Id]) -> Vec<SubmeshView> {
        let records = self.records.lock();
        ids.iter().map(|&id| records[id].view).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GpuLatency;
    use crate::gfx::HeadlessDevice;
    use crate::renderer::descriptor::{DescriptorHeaps, DescriptorType};
    use crate::renderer::frame::FrameCursor;

    fn triangle() -> SubmeshChunk<'static> {
        static POSITIONS: [u8; 36] = [0; 36];
        static ELEMENTS: [u8; 24] = [1; 24];
        static INDICES: [u8; 6] = [0, 0, 1, 0, 2, 0];
        SubmeshChunk {
            element_size: 8,
            vertex_count: 3,
            index_count: 3,
            elements_type: 1,
            primitive_topology: 4,
            positions: &POSITIONS,
            elements: &ELEMENTS,
            indices: &INDICES,
        }
    }

    #[test]
    fn test_add_and_remove_submesh() {
        let device = HeadlessDevice::new(GpuLatency::Immediate);
        let cursor = FrameCursor::new();
        let heaps = DescriptorHeaps::new(&cursor);
        heaps.srv.initialize(&device, 4, true).unwrap();
        let pacer = FramePacer::new(&device, cursor).unwrap();
        let table = SubmeshTable::new();

        let id = table.add(&device, &heaps.srv, &triangle()).unwrap();
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(heaps.srv.stats().used, 1);

        let view = table.get_views(&[id])[0];
        assert_eq!(view.buffer_size, 66);
        assert_eq!(view.element_offset, 36);
        assert_eq!(view.index_offset, 60);
        assert_eq!(view.index_size, 2);
        assert!(view.srv.is_shader_visible());

        table.remove(id, &heaps.srv, &pacer);
        assert!(table.is_empty());
        // 缓冲区在帧槽位 0 再次开始时才销毁
        assert_eq!(device.live_buffers(), 1);
        pacer.begin_frame(&heaps).unwrap();
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(heaps.srv.stats().used, 0);
    }

    #[test]
    fn test_full_srv_heap_drops_buffer() {
        let device = HeadlessDevice::new(GpuLatency::Immediate);
        let heap = DescriptorHeap::new(DescriptorType::ShaderResourceView, FrameCursor::new());
        heap.initialize(&device, 1, true).unwrap();
        let table = SubmeshTable::new();

        table.add(&device, &heap, &triangle()).unwrap();
        assert!(table.add(&device, &heap, &triangle()).is_err());
        assert_eq!(table.len(), 1);
        assert_eq!(device.live_buffers(), 1);
    }
}
