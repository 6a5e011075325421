//! frame_core - 渲染器资源生命周期与帧同步核心
//!
//! 本库提供 GPU 渲染器中和具体图形 API 无关的那一层：
//! 描述符槽位分配、帧节奏控制、按帧延迟释放，以及几何体/着色器/材质注册表。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（id、空闲列表、blob 读写、日志、配置、错误处理）
//! - `gfx`: 图形后端抽象层，以及用于测试和演示的 headless 后端
//! - `renderer`: 描述符堆、帧节奏控制器、延迟释放队列、子网格表
//! - `content`: 资源注册表和几何体 LOD 层级编码
//! - `engine`: 按固定顺序初始化和关闭以上服务
//!
//! # 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use frame_core::core::Config;
//! use frame_core::core::config::GpuLatency;
//! use frame_core::engine::Engine;
//! use frame_core::gfx::HeadlessDevice;
//!
//! let device = Arc::new(HeadlessDevice::new(GpuLatency::Immediate));
//! let engine = Engine::initialize(device, &Config::default())?;
//!
//! engine.core().begin_frame()?;
//! // 录制命令、创建或销毁资源
//! engine.core().end_frame()?;
//!
//! engine.shutdown()?;
//! # Ok::<(), frame_core::core::RenderCoreError>(())
//! ```

pub mod content;
pub mod core;
pub mod engine;
pub mod gfx;
pub mod renderer;
