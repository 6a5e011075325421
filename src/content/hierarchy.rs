//! 几何体 LOD 层级缓冲区
//!
//! 多 LOD 或多子网格的几何体在注册表中保存为一个紧密排列的缓冲区：
//!
//! ```text
//! u32 lod_count
//! f32 thresholds[lod_count]
//! { u16 offset; u16 count; } lod_offsets[lod_count]
//! u32 gpu_ids[sum(count)]
//! ```
//!
//! 子网格 id 先按 LOD、再按 LOD 内的子网格顺序排列。
//! LOD 0 的阈值是占位值，不参与比较；其余阈值严格递增。

use bytemuck::{Pod, Zeroable};

use crate::core::blob::{BlobReader, BlobWriter};
use crate::core::error::ContentError;
use crate::core::Id;

/// 单个 LOD 在 id 数组中的范围
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LodOffset {
    pub offset: u16,
    pub count: u16,
}

impl LodOffset {
    pub const fn new(offset: u16, count: u16) -> Self {
        Self { offset, count }
    }
}

/// 检查 LOD 布局：至少一个 LOD、每个 LOD 至少一个子网格、
/// 子网格总数能用 u16 寻址、阈值（跳过 LOD 0）严格递增
pub fn validate_layout(thresholds: &[f32], submesh_counts: &[u32]) -> Result<u32, ContentError> {
    debug_assert_eq!(thresholds.len(), submesh_counts.len());
    if submesh_counts.is_empty() {
        return Err(ContentError::EmptyGeometry);
    }

    let mut total = 0u32;
    for (lod, &count) in submesh_counts.iter().enumerate() {
        if count == 0 {
            return Err(ContentError::EmptyLod { lod: lod as u32 });
        }
        total = total.saturating_add(count);
    }
    if total > u16::MAX as u32 {
        return Err(ContentError::TooManySubmeshes {
            count: total,
            max: u16::MAX as u32,
        });
    }

    for lod in 2..thresholds.len() {
        let (previous, threshold) = (thresholds[lod - 1], thresholds[lod]);
        // NaN 也会被拒绝
        if !(threshold > previous) {
            return Err(ContentError::NonIncreasingThreshold {
                lod: lod as u32,
                threshold,
                previous,
            });
        }
    }

    Ok(total)
}

/// 编码后的 LOD 层级
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryHierarchy {
    buffer: Box<[u8]>,
}

impl GeometryHierarchy {
    const HEADER_SIZE: usize = std::mem::size_of::<u32>();

    /// 层级缓冲区的字节大小
    pub const fn buffer_size(lod_count: usize, submesh_count: usize) -> usize {
        Self::HEADER_SIZE
            + lod_count * (std::mem::size_of::<f32>() + std::mem::size_of::<LodOffset>())
            + submesh_count * std::mem::size_of::<u32>()
    }

    /// 编码层级
    ///
    /// `gpu_ids` 的长度必须等于 `submesh_counts` 之和。
    pub fn encode(
        thresholds: &[f32],
        submesh_counts: &[u32],
        gpu_ids: &[Id],
    ) -> Result<Self, ContentError> {
        assert_eq!(thresholds.len(), submesh_counts.len());
        let total = validate_layout(thresholds, submesh_counts)?;
        assert_eq!(gpu_ids.len(), total as usize, "submesh id count mismatch");

        let lod_count = thresholds.len();
        let mut writer = BlobWriter::with_capacity(Self::buffer_size(lod_count, gpu_ids.len()));
        writer.write(lod_count as u32);
        for &threshold in thresholds {
            writer.write(threshold);
        }

        let mut offset = 0u16;
        for &count in submesh_counts {
            // validate_layout 已保证不会溢出
            let count = count as u16;
            writer.write(LodOffset::new(offset, count));
            offset += count;
        }

        for id in gpu_ids {
            writer.write(id.raw());
        }

        Ok(Self {
            buffer: writer.finish(),
        })
    }

    /// 解码并校验一个层级缓冲区
    pub fn decode(buffer: Box<[u8]>) -> Result<Self, ContentError> {
        let mut reader = BlobReader::new(&buffer);
        let lod_count = reader.read::<u32>()? as usize;

        let thresholds: Vec<f32> = (0..lod_count)
            .map(|_| reader.read::<f32>())
            .collect::<Result<_, _>>()?;
        let offsets: Vec<LodOffset> = (0..lod_count)
            .map(|_| reader.read::<LodOffset>())
            .collect::<Result<_, _>>()?;

        let counts: Vec<u32> = offsets.iter().map(|o| o.count as u32).collect();
        let total = validate_layout(&thresholds, &counts)?;

        let mut expected = 0u16;
        for (lod, offset) in offsets.iter().enumerate() {
            if offset.offset != expected {
                return Err(ContentError::SubmeshSizeMismatch {
                    lod: lod as u32,
                    declared: offset.offset as u32,
                    actual: expected as u32,
                });
            }
            expected += offset.count;
        }

        let needed = total as usize * std::mem::size_of::<u32>();
        if reader.remaining() != needed {
            return Err(ContentError::Truncated {
                offset: reader.position(),
                needed,
                available: reader.remaining(),
            });
        }

        Ok(Self { buffer })
    }

    /// 原始字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn lod_count(&self) -> u32 {
        self.read(0)
    }

    /// 第 `lod` 个 LOD 的距离阈值
    pub fn threshold(&self, lod: u32) -> f32 {
        assert!(lod < self.lod_count());
        self.read(Self::HEADER_SIZE + lod as usize * std::mem::size_of::<f32>())
    }

    pub fn thresholds(&self) -> Vec<f32> {
        (0..self.lod_count()).map(|lod| self.threshold(lod)).collect()
    }

    pub fn lod_offset(&self, lod: u32) -> LodOffset {
        assert!(lod < self.lod_count());
        self.read(self.offsets_start() + lod as usize * std::mem::size_of::<LodOffset>())
    }

    pub fn lod_offsets(&self) -> Vec<LodOffset> {
        (0..self.lod_count()).map(|lod| self.lod_offset(lod)).collect()
    }

    /// 所有 LOD 的子网格总数
    pub fn submesh_count(&self) -> u32 {
        let last = self.lod_offset(self.lod_count() - 1);
        last.offset as u32 + last.count as u32
    }

    /// 全部子网格 id，按 LOD 顺序
    pub fn gpu_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.buffer[self.ids_start()..]
            .chunks_exact(std::mem::size_of::<u32>())
            .map(|bytes| Id::from_raw(bytemuck::pod_read_unaligned(bytes)))
    }

    /// 选择在给定距离下仍然有效的最粗糙 LOD
    ///
    /// 从最高的 LOD 向下查找第一个阈值不大于 `distance` 的 LOD，找不到时返回 0。
    pub fn lod_from_threshold(&self, distance: f32) -> u32 {
        let lod_count = self.lod_count();
        if lod_count == 1 {
            return 0;
        }

        (1..lod_count)
            .rev()
            .find(|&lod| self.threshold(lod) <= distance)
            .unwrap_or(0)
    }

    fn offsets_start(&self) -> usize {
        Self::HEADER_SIZE + self.lod_count() as usize * std::mem::size_of::<f32>()
    }

    fn ids_start(&self) -> usize {
        self.offsets_start() + self.lod_count() as usize * std::mem::size_of::<LodOffset>()
    }

    fn read<T: Pod>(&self, offset: usize) -> T {
        bytemuck::pod_read_unaligned(&self.buffer[offset..offset + std::mem::size_of::<T>()])
    }
}
