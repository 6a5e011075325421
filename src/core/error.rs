//! 错误处理模块
//!
//! 定义了渲染核心中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - **容量耗尽**（描述符堆已满）：可恢复，调用方应在初始化时预留足够容量
//! - **数据错误**（几何体 blob 截断、LOD 阈值非递增等）：当前操作失败，不留下任何部分状态
//! - **设备/后端错误**（提交或同步失败）：致命错误，调用方必须关闭后端
//! - **帧状态错误**（录制中 flush、重复 begin_frame 等）：调用被拒绝，状态保持不变
//!
//! 编程错误（无效句柄、重复释放等）不属于这里，它们通过断言直接终止。

use std::path::PathBuf;
use thiserror::Error;

/// 渲染核心统一的 Result 类型
pub type Result<T> = std::result::Result<T, RenderCoreError>;

/// 渲染核心的错误类型
#[derive(Debug, Error)]
pub enum RenderCoreError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形设备/后端错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// 资源内容错误
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 初始化错误
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl RenderCoreError {
    /// 是否为设备级致命错误
    ///
    /// 设备状态在此类错误之后不可信，调用方应立即关闭后端。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderCoreError::Graphics(
                GraphicsError::DeviceLost
                    | GraphicsError::CommandExecution(_)
                    | GraphicsError::Synchronization(_)
            )
        )
    }
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 设备丢失
    #[error("Device lost")]
    DeviceLost,

    /// 资源创建失败
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// 命令录制或提交失败
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// Fence 等待或 signal 失败
    #[error("Synchronization failed: {0}")]
    Synchronization(String),

    /// 帧状态机调用顺序错误，设备状态不受影响
    #[error("Invalid frame state: {0}")]
    InvalidFrameState(String),

    /// 描述符堆容量耗尽
    #[error("Descriptor heap {heap} is full (capacity {capacity})")]
    DescriptorHeapFull { heap: &'static str, capacity: u32 },
}

/// 资源内容相关的错误
///
/// 这些错误都在向后端注册任何对象之前检测出来。
#[derive(Debug, Error)]
pub enum ContentError {
    /// 数据提前结束
    #[error("Blob truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// LOD 数量为 0
    #[error("Geometry has no levels of detail")]
    EmptyGeometry,

    /// 某个 LOD 没有子网格
    #[error("LOD {lod} has no submeshes")]
    EmptyLod { lod: u32 },

    /// 子网格总数超出 u16 可寻址范围
    #[error("Geometry has {count} submeshes, at most {max} are supported")]
    TooManySubmeshes { count: u32, max: u32 },

    /// LOD 阈值非严格递增
    #[error("LOD {lod} threshold {threshold} is not greater than the previous threshold {previous}")]
    NonIncreasingThreshold {
        lod: u32,
        threshold: f32,
        previous: f32,
    },

    /// 子网格数据块大小与声明不符
    #[error("LOD {lod} declares {declared} bytes of submeshes but contains {actual}")]
    SubmeshSizeMismatch { lod: u32, declared: u32, actual: u32 },

    /// 着色器 blob 无效
    #[error("Invalid shader blob: {0}")]
    InvalidShader(String),

    /// 材质描述无效
    #[error("Invalid material: {0}")]
    InvalidMaterial(String),

    /// 不支持的资源类型
    #[error("Unsupported asset type: {0}")]
    UnsupportedAssetType(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err: RenderCoreError = GraphicsError::DescriptorHeapFull {
            heap: "RTV",
            capacity: 512,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Graphics error: Descriptor heap RTV is full (capacity 512)"
        );

        let err: RenderCoreError = ContentError::EmptyLod { lod: 2 }.into();
        assert_eq!(err.to_string(), "Content error: LOD 2 has no submeshes");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RenderCoreError::from(GraphicsError::DeviceLost).is_fatal());
        assert!(!RenderCoreError::from(GraphicsError::DescriptorHeapFull {
            heap: "SRV",
            capacity: 1,
        })
        .is_fatal());
        assert!(!RenderCoreError::from(ContentError::EmptyGeometry).is_fatal());
        assert!(!RenderCoreError::from(GraphicsError::InvalidFrameState(
            "flush called while frame 0 is recording".to_string()
        ))
        .is_fatal());
        assert!(RenderCoreError::from(GraphicsError::Synchronization("fence".to_string())).is_fatal());
    }
}
