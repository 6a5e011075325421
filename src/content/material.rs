//! 材质注册表

use parking_lot::Mutex;
use tracing::debug;

use super::shader::ShaderRegistry;
use crate::core::error::{ContentError, Result};
use crate::core::{FreeList, Id};

/// 材质类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaterialType {
    #[default]
    Opaque,
}

/// 着色器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderType {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
    Amplification,
    Mesh,
}

impl ShaderType {
    /// 着色器阶段数量
    pub const COUNT: usize = 8;

    pub const ALL: [ShaderType; Self::COUNT] = [
        ShaderType::Vertex,
        ShaderType::Hull,
        ShaderType::Domain,
        ShaderType::Geometry,
        ShaderType::Pixel,
        ShaderType::Compute,
        ShaderType::Amplification,
        ShaderType::Mesh,
    ];

    /// 在 `shader_ids` 数组和阶段位掩码中的位置
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn flag(self) -> u32 {
        1 << self as u32
    }
}

/// 材质创建参数
#[derive(Debug, Clone)]
pub struct MaterialInitInfo {
    pub material_type: MaterialType,
    /// 按 [`ShaderType::index`] 排列，未使用的阶段为 `Id::INVALID`
    pub shader_ids: [Id; ShaderType::COUNT],
    pub texture_ids: Vec<Id>,
}

impl Default for MaterialInitInfo {
    fn default() -> Self {
        Self {
            material_type: MaterialType::Opaque,
            shader_ids: [Id::INVALID; ShaderType::COUNT],
            texture_ids: Vec::new(),
        }
    }
}

impl MaterialInitInfo {
    pub fn with_shader(mut self, shader_type: ShaderType, id: Id) -> Self {
        self.shader_ids[shader_type.index()] = id;
        self
    }
}

/// 注册后的材质
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub material_type: MaterialType,
    /// 使用到的着色器阶段位掩码
    pub shader_flags: u32,
    /// 使用到的着色器，按阶段顺序
    pub shader_ids: Box<[Id]>,
    pub texture_ids: Box<[Id]>,
}

impl Material {
    pub fn uses(&self, shader_type: ShaderType) -> bool {
        self.shader_flags & shader_type.flag() != 0
    }
}

/// 材质注册表
#[derive(Default)]
pub struct MaterialRegistry {
    materials: Mutex<FreeList<Material>>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建材质
    ///
    /// 顶点着色器必须设置，所有设置了的着色器必须已注册。
    pub fn create(&self, info: &MaterialInitInfo, shaders: &ShaderRegistry) -> Result<Id> {
        if !info.shader_ids[ShaderType::Vertex.index()].is_valid() {
            return Err(ContentError::InvalidMaterial("vertex shader is required".to_string()).into());
        }

        let mut shader_flags = 0;
        let mut shader_ids = Vec::new();
        for shader_type in ShaderType::ALL {
            let id = info.shader_ids[shader_type.index()];
            if !id.is_valid() {
                continue;
            }
            if !shaders.contains(id) {
                return Err(ContentError::InvalidMaterial(format!(
                    "{:?} shader {} is not registered",
                    shader_type, id
                ))
                .into());
            }
            shader_flags |= shader_type.flag();
            shader_ids.push(id);
        }

        let material = Material {
            material_type: info.material_type,
            shader_flags,
            shader_ids: shader_ids.into_boxed_slice(),
            texture_ids: info.texture_ids.clone().into_boxed_slice(),
        };

        let id = self.materials.lock().add(material);
        debug!(%id, shader_flags, "Material created");
        Ok(id)
    }

    pub fn remove(&self, id: Id) {
        self.materials.lock().remove(id);
        debug!(%id, "Material removed");
    }

    pub fn get(&self, id: Id) -> Material {
        self.materials.lock()[id].clone()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.materials.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.materials.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.lock().is_empty()
    }

    /// 移除全部材质，返回移除的数量
    pub fn clear(&self) -> usize {
        self.materials.lock().drain().len()
    }
}
