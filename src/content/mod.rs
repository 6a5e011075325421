//! 资源内容模块
//!
//! 按资源类型划分的注册表，每个注册表各自加锁，
//! 不同类型的资源可以在不同线程上同时创建（例如一个线程导入几何体，另一个线程注册着色器）。
//!
//! # 模块组织
//!
//! - `geometry`：几何体注册表和导入 blob 解析
//! - `hierarchy`：LOD 层级缓冲区的编解码
//! - `shader`：编译后的着色器 blob
//! - `material`：材质

use tracing::info;

use crate::core::error::{ContentError, Result};
use crate::core::Id;

pub mod geometry;
pub mod hierarchy;
pub mod material;
pub mod shader;

pub use geometry::{GeometryRegistry, SubmeshChunk};
pub use hierarchy::{GeometryHierarchy, LodOffset};
pub use material::{Material, MaterialInitInfo, MaterialRegistry, MaterialType, ShaderType};
pub use shader::{CompiledShader, ShaderRegistry};

/// 几何体注册表依赖的渲染器接口
///
/// 每个子网格注册后得到一个 id，注册表在销毁几何体时逐个移除。
pub trait GeometryBackend {
    fn add_submesh(&self, chunk: &SubmeshChunk<'_>) -> Result<Id>;
    fn remove_submesh(&self, id: Id);
}

/// 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Animation,
    Audio,
    Material,
    Mesh,
    Skeleton,
    Texture,
}

impl AssetType {
    pub fn name(&self) -> &'static str {
        match self {
            AssetType::Animation => "animation",
            AssetType::Audio => "audio",
            AssetType::Material => "material",
            AssetType::Mesh => "mesh",
            AssetType::Skeleton => "skeleton",
            AssetType::Texture => "texture",
        }
    }
}

/// 创建资源所需的数据
#[derive(Debug, Clone, Copy)]
pub enum AssetData<'a> {
    /// 几何体导入 blob
    Mesh(&'a [u8]),
    Material(&'a MaterialInitInfo),
    /// 其他类型的原始数据
    Raw(AssetType, &'a [u8]),
}

impl AssetData<'_> {
    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetData::Mesh(_) => AssetType::Mesh,
            AssetData::Material(_) => AssetType::Material,
            AssetData::Raw(asset_type, _) => *asset_type,
        }
    }
}

/// 所有资源注册表
#[derive(Default)]
pub struct ContentRegistry {
    geometries: GeometryRegistry,
    shaders: ShaderRegistry,
    materials: MaterialRegistry,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按资源类型创建资源
    pub fn create_resource(&self, backend: &dyn GeometryBackend, data: AssetData<'_>) -> Result<Id> {
        match data {
            AssetData::Mesh(blob) => self.geometries.create(backend, blob),
            AssetData::Material(info) => self.materials.create(info, &self.shaders),
            AssetData::Raw(AssetType::Mesh, blob) => self.geometries.create(backend, blob),
            AssetData::Raw(asset_type, _) => Err(unsupported(asset_type)),
        }
    }

    /// 按资源类型销毁资源
    pub fn destroy_resource(
        &self,
        backend: &dyn GeometryBackend,
        id: Id,
        asset_type: AssetType,
    ) -> Result<()> {
        match asset_type {
            AssetType::Mesh => self.geometries.destroy(backend, id),
            AssetType::Material => self.materials.remove(id),
            other => return Err(unsupported(other)),
        }
        Ok(())
    }

    /// 注册着色器 blob
    pub fn add_shader(&self, blob: &[u8]) -> Result<Id> {
        self.shaders.add_shader(blob)
    }

    pub fn remove_shader(&self, id: Id) {
        self.shaders.remove_shader(id);
    }

    pub fn get_shader(&self, id: Id) -> CompiledShader {
        self.shaders.get_shader(id)
    }

    pub fn geometries(&self) -> &GeometryRegistry {
        &self.geometries
    }

    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// 销毁全部资源，几何体的子网格从后端移除
    pub fn destroy_all(&self, backend: &dyn GeometryBackend) {
        let geometries = self.geometries.destroy_all(backend);
        let materials = self.materials.clear();
        let shaders = self.shaders.clear();
        if geometries + materials + shaders > 0 {
            info!(geometries, materials, shaders, "Destroyed remaining content");
        }
    }
}

fn unsupported(asset_type: AssetType) -> crate::core::RenderCoreError {
    ContentError::UnsupportedAssetType(asset_type.name()).into()
}
