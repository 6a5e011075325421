//! 核心功能模块
//!
//! 渲染核心的基础设施，独立于具体的图形 API。
//!
//! # 模块组织
//!
//! - `log`：日志系统
//! - `config`：配置管理
//! - `error`：错误处理
//! - `id`：32 位资源句柄
//! - `free_list`：回收槽位的句柄注册表
//! - `blob`：二进制 blob 读写

pub mod blob;
pub mod config;
pub mod error;
pub mod free_list;
pub mod id;
pub mod log;

pub use blob::{BlobReader, BlobWriter};
pub use config::{Config, GpuLatency, RenderConfig};
pub use error::{ContentError, GraphicsError, RenderCoreError, Result};
pub use free_list::FreeList;
pub use id::Id;
