//! 几何体注册表
//!
//! 导入的几何体 blob 格式：
//!
//! ```text
//! u32 lod_count
//! lods[lod_count] {
//!     f32 threshold
//!     u32 submesh_count
//!     u32 size_of_submeshes
//!     submesh chunks[submesh_count]
//! }
//! ```
//!
//! 每个子网格数据块：
//!
//! ```text
//! u32 element_size; u32 vertex_count; u32 index_count; u32 elements_type; u32 primitive_topology
//! u8 positions[12 * vertex_count]
//! u8 elements[element_size * vertex_count]
//! u8 indices[index_size * index_count]   // vertex_count < 65536 时 index_size = 2，否则 4
//! ```
//!
//! 整个 blob 在向后端注册任何子网格之前完成校验。
//! 只有一个 LOD 且只有一个子网格的几何体直接保存子网格 id，不分配层级缓冲区。

use parking_lot::Mutex;
use tracing::debug;

use super::hierarchy::{validate_layout, GeometryHierarchy, LodOffset};
use super::GeometryBackend;
use crate::core::blob::{BlobReader, BlobWriter};
use crate::core::error::{ContentError, Result};
use crate::core::{FreeList, Id};

/// 每个顶点位置的字节数（3 个 f32）
const POSITION_SIZE: u32 = 12;

/// 从几何体 blob 中解析出的一个子网格数据块
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmeshChunk<'a> {
    pub element_size: u32,
    pub vertex_count: u32,
    pub index_count: u32,
    pub elements_type: u32,
    pub primitive_topology: u32,
    pub positions: &'a [u8],
    pub elements: &'a [u8],
    pub indices: &'a [u8],
}

fn array_len(stride: u32, count: u32) -> usize {
    usize::try_from(stride as u64 * count as u64).unwrap_or(usize::MAX)
}

impl<'a> SubmeshChunk<'a> {
    const HEADER_SIZE: usize = 5 * std::mem::size_of::<u32>();

    /// 读取一个子网格数据块
    pub fn parse(reader: &mut BlobReader<'a>) -> std::result::Result<Self, ContentError> {
        let element_size = reader.read::<u32>()?;
        let vertex_count = reader.read::<u32>()?;
        let index_count = reader.read::<u32>()?;
        let elements_type = reader.read::<u32>()?;
        let primitive_topology = reader.read::<u32>()?;

        let index_size = index_size_for(vertex_count);
        let positions = reader.read_bytes(array_len(POSITION_SIZE, vertex_count))?;
        let elements = reader.read_bytes(array_len(element_size, vertex_count))?;
        let indices = reader.read_bytes(array_len(index_size, index_count))?;

        Ok(Self {
            element_size,
            vertex_count,
            index_count,
            elements_type,
            primitive_topology,
            positions,
            elements,
            indices,
        })
    }

    /// 索引宽度（字节）
    pub fn index_size(&self) -> u32 {
        index_size_for(self.vertex_count)
    }

    /// 编码后的字节数
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.positions.len() + self.elements.len() + self.indices.len()
    }

    pub fn write(&self, writer: &mut BlobWriter) {
        debug_assert_eq!(self.positions.len(), array_len(POSITION_SIZE, self.vertex_count));
        debug_assert_eq!(self.elements.len(), array_len(self.element_size, self.vertex_count));
        debug_assert_eq!(self.indices.len(), array_len(self.index_size(), self.index_count));

        writer.write(self.element_size);
        writer.write(self.vertex_count);
        writer.write(self.index_count);
        writer.write(self.elements_type);
        writer.write(self.primitive_topology);
        writer.write_bytes(self.positions);
        writer.write_bytes(self.elements);
        writer.write_bytes(self.indices);
    }
}

fn index_size_for(vertex_count: u32) -> u32 {
    if vertex_count < (1 << 16) {
        2
    } else {
        4
    }
}

/// 导入数据中的一个 LOD
#[derive(Debug, Clone, PartialEq)]
pub struct ImportLod<'a> {
    pub threshold: f32,
    pub submeshes: Vec<SubmeshChunk<'a>>,
}

/// 编码几何体导入 blob
pub fn encode_geometry_blob(lods: &[ImportLod<'_>]) -> Box<[u8]> {
    let lod_header = std::mem::size_of::<f32>() + 2 * std::mem::size_of::<u32>();
    let size = std::mem::size_of::<u32>()
        + lods
            .iter()
            .map(|lod| lod_header + lod.submeshes.iter().map(SubmeshChunk::encoded_size).sum::<usize>())
            .sum::<usize>();

    let mut writer = BlobWriter::with_capacity(size);
    writer.write(lods.len() as u32);
    for lod in lods {
        let submesh_bytes: usize = lod.submeshes.iter().map(SubmeshChunk::encoded_size).sum();
        writer.write(lod.threshold);
        writer.write(lod.submeshes.len() as u32);
        writer.write(submesh_bytes as u32);
        for submesh in &lod.submeshes {
            submesh.write(&mut writer);
        }
    }
    writer.finish()
}

/// 解析并校验几何体导入 blob
pub fn parse_geometry_blob(blob: &[u8]) -> std::result::Result<Vec<ImportLod<'_>>, ContentError> {
    let mut reader = BlobReader::new(blob);
    let lod_count = reader.read::<u32>()?;
    if lod_count == 0 {
        return Err(ContentError::EmptyGeometry);
    }

    let mut lods = Vec::new();
    for lod in 0..lod_count {
        let threshold = reader.read::<f32>()?;
        let submesh_count = reader.read::<u32>()?;
        let declared = reader.read::<u32>()?;
        if submesh_count == 0 {
            return Err(ContentError::EmptyLod { lod });
        }

        let start = reader.position();
        let submeshes = (0..submesh_count)
            .map(|_| SubmeshChunk::parse(&mut reader))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let actual = (reader.position() - start) as u32;
        if actual != declared {
            return Err(ContentError::SubmeshSizeMismatch {
                lod,
                declared,
                actual,
            });
        }
        lods.push(ImportLod {
            threshold,
            submeshes,
        });
    }

    let thresholds: Vec<f32> = lods.iter().map(|lod| lod.threshold).collect();
    let counts: Vec<u32> = lods.iter().map(|lod| lod.submeshes.len() as u32).collect();
    validate_layout(&thresholds, &counts)?;

    Ok(lods)
}

/// 几何体记录
///
/// 单 LOD 单子网格的几何体直接保存子网格 id，其余保存层级缓冲区。
#[derive(Debug)]
enum GeometryRecord {
    Single(Id),
    Hierarchy(GeometryHierarchy),
}

/// 几何体注册表
#[derive(Default)]
pub struct GeometryRegistry {
    records: Mutex<FreeList<GeometryRecord>>,
}

impl GeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从导入 blob 创建几何体
    ///
    /// 数据错误在注册任何子网格之前返回；后端注册中途失败时，已注册的子网格会被移除。
    pub fn create(&self, backend: &dyn GeometryBackend, blob: &[u8]) -> Result<Id> {
        let lods = parse_geometry_blob(blob)?;

        let record = if let [ImportLod { submeshes, .. }] = lods.as_slice() {
            if let [chunk] = submeshes.as_slice() {
                Some(GeometryRecord::Single(backend.add_submesh(chunk)?))
            } else {
                None
            }
        } else {
            None
        };

        let record = match record {
            Some(record) => record,
            None => GeometryRecord::Hierarchy(Self::register_hierarchy(backend, &lods)?),
        };

        let id = self.records.lock().add(record);
        debug!(%id, lods = lods.len(), "Geometry created");
        Ok(id)
    }

    fn register_hierarchy(
        backend: &dyn GeometryBackend,
        lods: &[ImportLod<'_>],
    ) -> Result<GeometryHierarchy> {
        let thresholds: Vec<f32> = lods.iter().map(|lod| lod.threshold).collect();
        let counts: Vec<u32> = lods.iter().map(|lod| lod.submeshes.len() as u32).collect();
        let total = counts.iter().sum::<u32>() as usize;

        let mut gpu_ids = Vec::with_capacity(total);
        for chunk in lods.iter().flat_map(|lod| lod.submeshes.iter()) {
            match backend.add_submesh(chunk) {
                Ok(id) => gpu_ids.push(id),
                Err(err) => {
                    for &id in &gpu_ids {
                        backend.remove_submesh(id);
                    }
                    return Err(err);
                }
            }
        }

        match GeometryHierarchy::encode(&thresholds, &counts, &gpu_ids) {
            Ok(hierarchy) => Ok(hierarchy),
            Err(err) => {
                for &id in &gpu_ids {
                    backend.remove_submesh(id);
                }
                Err(err.into())
            }
        }
    }

    /// 销毁几何体并移除它的全部子网格
    pub fn destroy(&self, backend: &dyn GeometryBackend, id: Id) {
        let record = self.records.lock().take(id);
        unregister(backend, record);
        debug!(%id, "Geometry destroyed");
    }

    /// 复制几何体的全部子网格 id
    ///
    /// # Panics
    ///
    /// `out` 的长度与子网格数量不一致。
    pub fn get_submesh_gpu_ids(&self, id: Id, out: &mut [Id]) {
        let records = self.records.lock();
        match &records[id] {
            GeometryRecord::Single(gpu_id) => {
                assert_eq!(out.len(), 1, "single-mesh geometry has exactly one submesh");
                out[0] = *gpu_id;
            }
            GeometryRecord::Hierarchy(hierarchy) => {
                assert_eq!(
                    out.len(),
                    hierarchy.submesh_count() as usize,
                    "submesh id buffer length mismatch"
                );
                for (slot, gpu_id) in out.iter_mut().zip(hierarchy.gpu_ids()) {
                    *slot = gpu_id;
                }
            }
        }
    }

    /// 几何体的子网格总数
    pub fn submesh_count(&self, id: Id) -> u32 {
        match &self.records.lock()[id] {
            GeometryRecord::Single(_) => 1,
            GeometryRecord::Hierarchy(hierarchy) => hierarchy.submesh_count(),
        }
    }

    /// 选择给定距离下的 LOD
    pub fn lod_from_threshold(&self, id: Id, distance: f32) -> u32 {
        match &self.records.lock()[id] {
            GeometryRecord::Single(_) => 0,
            GeometryRecord::Hierarchy(hierarchy) => hierarchy.lod_from_threshold(distance),
        }
    }

    /// 批量查询：每个几何体在对应距离下应绘制的子网格范围
    pub fn get_lod_offset(&self, ids: &[Id], distances: &[f32]) -> Vec<LodOffset> {
        assert_eq!(ids.len(), distances.len());
        let records = self.records.lock();
        ids.iter()
            .zip(distances)
            .map(|(&id, &distance)| match &records[id] {
                GeometryRecord::Single(_) => LodOffset::new(0, 1),
                GeometryRecord::Hierarchy(hierarchy) => {
                    hierarchy.lod_offset(hierarchy.lod_from_threshold(distance))
                }
            })
            .collect()
    }

    /// 层级缓冲区的原始字节，单子网格几何体返回 `None`
    pub fn hierarchy_bytes(&self, id: Id) -> Option<Box<[u8]>> {
        match &self.records.lock()[id] {
            GeometryRecord::Single(_) => None,
            GeometryRecord::Hierarchy(hierarchy) => Some(hierarchy.as_bytes().into()),
        }
    }

    pub fn contains(&self, id: Id) -> bool {
        self.records.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// 销毁全部几何体，返回销毁的数量
    pub fn destroy_all(&self, backend: &dyn GeometryBackend) -> usize {
        let records = self.records.lock().drain();
        let count = records.len();
        for (_, record) in records {
            unregister(backend, record);
        }
        count
    }
}

fn unregister(backend: &dyn GeometryBackend, record: GeometryRecord) {
    match record {
        GeometryRecord::Single(gpu_id) => backend.remove_submesh(gpu_id),
        GeometryRecord::Hierarchy(hierarchy) => {
            for gpu_id in hierarchy.gpu_ids() {
                backend.remove_submesh(gpu_id);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::error::{GraphicsError, RenderCoreError};
    use std::collections::HashSet;

    /// 记录注册调用的后端
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        state: Mutex<RecordingState>,
    }

    #[derive(Default)]
    struct RecordingState {
        next: u32,
        live: HashSet<Id>,
        added: Vec<Id>,
        removed: Vec<Id>,
        fail_after: Option<usize>,
    }

    impl RecordingBackend {
        pub(crate) fn failing_after(count: usize) -> Self {
            let backend = Self::default();
            backend.state.lock().fail_after = Some(count);
            backend
        }

        pub(crate) fn added(&self) -> Vec<Id> {
            self.state.lock().added.clone()
        }

        pub(crate) fn removed(&self) -> Vec<Id> {
            self.state.lock().removed.clone()
        }

        pub(crate) fn live(&self) -> usize {
            self.state.lock().live.len()
        }
    }

    impl GeometryBackend for RecordingBackend {
        fn add_submesh(&self, _chunk: &SubmeshChunk<'_>) -> Result<Id> {
            let mut state = self.state.lock();
            if state.fail_after == Some(state.added.len()) {
                return Err(GraphicsError::DeviceLost.into());
            }
            let id = Id::new(100 + state.next);
            state.next += 1;
            state.live.insert(id);
            state.added.push(id);
            Ok(id)
        }

        fn remove_submesh(&self, id: Id) {
            let mut state = self.state.lock();
            assert!(state.live.remove(&id), "{:?} removed twice", id);
            state.removed.push(id);
        }
    }

    static POSITIONS: [u8; 36] = [0; 36];
    static INDICES: [u8; 6] = [0, 0, 1, 0, 2, 0];

    pub(crate) fn triangle() -> SubmeshChunk<'static> {
        SubmeshChunk {
            element_size: 0,
            vertex_count: 3,
            index_count: 3,
            elements_type: 0,
            primitive_topology: 4,
            positions: &POSITIONS,
            elements: &[],
            indices: &INDICES,
        }
    }

    pub(crate) fn blob(lods: &[(f32, usize)]) -> Box<[u8]> {
        let lods: Vec<ImportLod<'static>> = lods
            .iter()
            .map(|&(threshold, count)| ImportLod {
                threshold,
                submeshes: vec![triangle(); count],
            })
            .collect();
        encode_geometry_blob(&lods)
    }

    #[test]
    fn test_import_blob_round_trip() {
        let data = blob(&[(0.0, 2), (12.5, 3)]);
        let lods = parse_geometry_blob(&data).unwrap();
        assert_eq!(lods.len(), 2);
        assert_eq!(lods[1].threshold, 12.5);
        assert_eq!(lods[1].submeshes.len(), 3);
        assert_eq!(lods[0].submeshes[0], triangle());
    }

    #[test]
    fn test_two_lod_geometry() {
        let backend = RecordingBackend::default();
        let registry = GeometryRegistry::new();
        let id = registry.create(&backend, &blob(&[(0.0, 2), (12.5, 3)])).unwrap();

        let mut gpu_ids = [Id::INVALID; 5];
        registry.get_submesh_gpu_ids(id, &mut gpu_ids);
        assert_eq!(gpu_ids.to_vec(), backend.added());

        let hierarchy = GeometryHierarchy::decode(registry.hierarchy_bytes(id).unwrap()).unwrap();
        assert_eq!(hierarchy.lod_count(), 2);
        assert_eq!(
            hierarchy.lod_offsets(),
            vec![LodOffset::new(0, 2), LodOffset::new(2, 3)]
        );

        assert_eq!(registry.lod_from_threshold(id, 10.0), 0);
        assert_eq!(registry.lod_from_threshold(id, 20.0), 1);
        assert_eq!(
            registry.get_lod_offset(&[id, id], &[10.0, 20.0]),
            vec![LodOffset::new(0, 2), LodOffset::new(2, 3)]
        );

        registry.destroy(&backend, id);
        assert_eq!(backend.removed(), backend.added());
        assert_eq!(backend.live(), 0);
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_single_mesh_geometry() {
        let backend = RecordingBackend::default();
        let registry = GeometryRegistry::new();
        let id = registry.create(&backend, &blob(&[(0.0, 1)])).unwrap();

        assert!(registry.hierarchy_bytes(id).is_none());
        let mut gpu_ids = [Id::INVALID; 1];
        registry.get_submesh_gpu_ids(id, &mut gpu_ids);
        assert_eq!(gpu_ids[0], backend.added()[0]);
        assert_eq!(registry.get_lod_offset(&[id], &[1000.0]), vec![LodOffset::new(0, 1)]);

        registry.destroy(&backend, id);
        assert_eq!(backend.removed().len(), 1);
    }

    #[test]
    fn test_single_lod_many_submeshes_uses_hierarchy() {
        let backend = RecordingBackend::default();
        let registry = GeometryRegistry::new();
        let id = registry.create(&backend, &blob(&[(0.0, 3)])).unwrap();

        assert!(registry.hierarchy_bytes(id).is_some());
        assert_eq!(registry.submesh_count(id), 3);
        assert_eq!(registry.get_lod_offset(&[id], &[50.0]), vec![LodOffset::new(0, 3)]);
    }

    #[test]
    fn test_invalid_blob_registers_nothing() {
        let backend = RecordingBackend::default();
        let registry = GeometryRegistry::new();

        let err = registry
            .create(&backend, &blob(&[(0.0, 1), (10.0, 1), (5.0, 1)]))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderCoreError::Content(ContentError::NonIncreasingThreshold { lod: 2, .. })
        ));

        let data = blob(&[(0.0, 2)]);
        assert!(registry.create(&backend, &data[..data.len() - 1]).is_err());

        assert!(backend.added().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_declared_size_mismatch() {
        let mut data = blob(&[(0.0, 1)]).into_vec();
        // size_of_submeshes 位于 lod_count、threshold、submesh_count 之后
        data[12..16].copy_from_slice(&1u32.to_ne_bytes());
        assert!(matches!(
            parse_geometry_blob(&data),
            Err(ContentError::SubmeshSizeMismatch { lod: 0, declared: 1, .. })
        ));
    }

    #[test]
    fn test_backend_failure_rolls_back() {
        let backend = RecordingBackend::failing_after(3);
        let registry = GeometryRegistry::new();

        assert!(registry.create(&backend, &blob(&[(0.0, 2), (8.0, 2)])).is_err());
        assert_eq!(backend.added().len(), 3);
        assert_eq!(backend.live(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_destroy_all() {
        let backend = RecordingBackend::default();
        let registry = GeometryRegistry::new();
        registry.create(&backend, &blob(&[(0.0, 1)])).unwrap();
        registry.create(&backend, &blob(&[(0.0, 1), (3.0, 2)])).unwrap();

        assert_eq!(registry.destroy_all(&backend), 2);
        assert_eq!(backend.live(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn test_wrong_output_length_panics() {
        let backend = RecordingBackend::default();
        let registry = GeometryRegistry::new();
        let id = registry.create(&backend, &blob(&[(0.0, 2)])).unwrap();
        let mut gpu_ids = [Id::INVALID; 3];
        registry.get_submesh_gpu_ids(id, &mut gpu_ids);
    }
}
