//! 着色器 blob 注册表
//!
//! 编译后的着色器以如下格式提交：
//!
//! ```text
//! u64 byte_code_size
//! u8  hash[16]
//! u8  byte_code[byte_code_size]
//! ```
//!
//! 注册表保存一份副本，`get_shader` 返回共享的只读句柄。

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::core::blob::{BlobReader, BlobWriter};
use crate::core::error::{ContentError, Result};
use crate::core::{FreeList, Id};

/// 着色器哈希长度
pub const SHADER_HASH_LENGTH: usize = 16;

const HEADER_SIZE: usize = std::mem::size_of::<u64>() + SHADER_HASH_LENGTH;

/// 编译后的着色器
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledShader {
    blob: Arc<[u8]>,
}

impl CompiledShader {
    /// 从 blob 复制一个着色器，多余的尾部字节被忽略
    pub fn from_blob(blob: &[u8]) -> std::result::Result<Self, ContentError> {
        let mut reader = BlobReader::new(blob);
        let byte_code_size = reader.read::<u64>()?;
        if byte_code_size == 0 {
            return Err(ContentError::InvalidShader("empty byte code".to_string()));
        }

        let byte_code_size = usize::try_from(byte_code_size).map_err(|_| {
            ContentError::InvalidShader(format!("byte code size {} too large", byte_code_size))
        })?;
        reader.skip(SHADER_HASH_LENGTH)?;
        reader.skip(byte_code_size)?;

        Ok(Self {
            blob: Arc::from(&blob[..reader.position()]),
        })
    }

    /// 编码一个着色器 blob
    pub fn encode(byte_code: &[u8], hash: &[u8; SHADER_HASH_LENGTH]) -> Box<[u8]> {
        let mut writer = BlobWriter::with_capacity(HEADER_SIZE + byte_code.len());
        writer.write(byte_code.len() as u64);
        writer.write_bytes(hash);
        writer.write_bytes(byte_code);
        writer.finish()
    }

    pub fn byte_code_size(&self) -> usize {
        self.blob.len() - HEADER_SIZE
    }

    pub fn byte_code(&self) -> &[u8] {
        &self.blob[HEADER_SIZE..]
    }

    pub fn hash(&self) -> &[u8; SHADER_HASH_LENGTH] {
        self.blob[std::mem::size_of::<u64>()..HEADER_SIZE]
            .try_into()
            .unwrap_or_else(|_| unreachable!())
    }

    /// 完整的 blob，包含头部
    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }
}

impl std::fmt::Debug for CompiledShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledShader")
            .field("byte_code_size", &self.byte_code_size())
            .field("hash", &self.hash())
            .finish()
    }
}

/// 着色器注册表
#[derive(Default)]
pub struct ShaderRegistry {
    shaders: Mutex<FreeList<CompiledShader>>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 复制并注册一个着色器 blob
    pub fn add_shader(&self, blob: &[u8]) -> Result<Id> {
        let shader = CompiledShader::from_blob(blob)?;
        let size = shader.byte_code_size();
        let id = self.shaders.lock().add(shader);
        debug!(%id, size, "Shader added");
        Ok(id)
    }

    pub fn remove_shader(&self, id: Id) {
        self.shaders.lock().remove(id);
        debug!(%id, "Shader removed");
    }

    /// 获取着色器
    ///
    /// # Panics
    ///
    /// `id` 无效或已被移除。
    pub fn get_shader(&self, id: Id) -> CompiledShader {
        self.shaders.lock()[id].clone()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.shaders.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.shaders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.lock().is_empty()
    }

    /// 移除全部着色器，返回移除的数量
    pub fn clear(&self) -> usize {
        self.shaders.lock().drain().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: [u8; SHADER_HASH_LENGTH] = [7; SHADER_HASH_LENGTH];

    #[test]
    fn test_add_and_get_shader() {
        let registry = ShaderRegistry::new();
        let blob = CompiledShader::encode(&[0xDE, 0xAD, 0xBE, 0xEF], &HASH);
        let id = registry.add_shader(&blob).unwrap();

        let shader = registry.get_shader(id);
        assert_eq!(shader.byte_code(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(shader.hash(), &HASH);
        assert_eq!(shader.byte_code_size(), 4);
        assert_eq!(shader.as_bytes(), &*blob);

        // 注册表保存的是副本
        drop(blob);
        assert_eq!(registry.get_shader(id).byte_code().len(), 4);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut blob = CompiledShader::encode(&[1, 2, 3], &HASH).into_vec();
        blob.extend_from_slice(&[9, 9]);
        let shader = CompiledShader::from_blob(&blob).unwrap();
        assert_eq!(shader.byte_code(), &[1, 2, 3]);
    }

    #[test]
    fn test_invalid_shader_blobs() {
        let blob = CompiledShader::encode(&[1, 2, 3], &HASH);
        assert!(matches!(
            CompiledShader::from_blob(&blob[..blob.len() - 1]),
            Err(ContentError::Truncated { .. })
        ));
        assert!(matches!(
            CompiledShader::from_blob(&CompiledShader::encode(&[], &HASH)),
            Err(ContentError::InvalidShader(_))
        ));
    }

    #[test]
    fn test_remove_shader() {
        let registry = ShaderRegistry::new();
        let id = registry.add_shader(&CompiledShader::encode(&[1], &HASH)).unwrap();
        let shader = registry.get_shader(id);

        registry.remove_shader(id);
        assert!(!registry.contains(id));
        // 已取出的句柄仍然可用
        assert_eq!(shader.byte_code(), &[1]);
    }
}
