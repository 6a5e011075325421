//! frame_core 演示程序
//!
//! 在 headless 后端上运行若干帧：每帧导入一个带两级 LOD 的几何体，
//! 查询它的 LOD 偏移，然后销毁，资源经过延迟释放队列回收。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 渲染 20 帧，GPU 完成值由演示循环手动推进
//! cargo run -- --frames 20 --manual-gpu
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use frame_core::content::geometry::{encode_geometry_blob, ImportLod, SubmeshChunk};
use frame_core::content::{AssetData, AssetType};
use frame_core::core::config::GpuLatency;
use frame_core::core::{log, Config, Id};
use frame_core::engine::Engine;
use frame_core::gfx::HeadlessDevice;

/// 一个四边形：4 个顶点位置，6 个 u16 索引
fn quad_positions() -> Vec<u8> {
    let positions: [[f32; 3]; 4] = [
        [-1.0, -1.0, 0.0],
        [1.0, -1.0, 0.0],
        [1.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0],
    ];
    bytemuck::cast_slice(&positions).to_vec()
}

fn quad_indices() -> Vec<u8> {
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
    bytemuck::cast_slice(&indices).to_vec()
}

fn quad<'a>(positions: &'a [u8], indices: &'a [u8]) -> SubmeshChunk<'a> {
    SubmeshChunk {
        element_size: 0,
        vertex_count: 4,
        index_count: 6,
        elements_type: 0,
        // 三角形列表
        primitive_topology: 4,
        positions,
        elements: &[],
        indices,
    }
}

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）并应用命令行参数
/// 2. 初始化日志系统
/// 3. 创建 headless 设备和引擎
/// 4. 运行演示帧循环
/// 5. 关闭引擎
fn main() -> Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("Invalid configuration")?;

    // 2. 初始化日志系统
    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "frame_core starting...");

    // 3. 创建设备和引擎
    let latency = config.render.gpu_latency;
    let device = Arc::new(HeadlessDevice::new(latency));
    let engine = Engine::initialize(device.clone(), &config).context("Failed to initialize engine")?;

    // 4. 演示帧循环
    let positions = quad_positions();
    let indices = quad_indices();
    let blob = encode_geometry_blob(&[
        ImportLod {
            threshold: 0.0,
            submeshes: vec![quad(&positions, &indices); 2],
        },
        ImportLod {
            threshold: 25.0,
            submeshes: vec![quad(&positions, &indices)],
        },
    ]);

    let mut previous: Option<Id> = None;
    for frame in 0..config.render.frames {
        if latency == GpuLatency::Manual {
            device.complete_all();
        }

        let frame_index = engine.core().begin_frame()?;

        let geometry = engine.create_resource(AssetData::Mesh(&blob))?;
        let distance = frame as f32 * 10.0;
        let offsets = engine
            .content()
            .geometries()
            .get_lod_offset(&[geometry], &[distance]);
        debug!(frame, frame_index, distance, lod = ?offsets[0], "Geometry imported");

        // 上一帧的几何体在本帧销毁，资源在该槽位下一次开始时回收
        if let Some(id) = previous.replace(geometry) {
            engine.destroy_resource(id, AssetType::Mesh)?;
        }

        engine.core().end_frame()?;
    }

    for stats in engine.core().heaps().all_stats() {
        info!(
            heap = stats.descriptor_type.name(),
            capacity = stats.capacity,
            used = stats.used,
            pending_free = stats.pending_free,
            "Descriptor heap usage"
        );
    }

    // 5. 关闭
    if latency == GpuLatency::Manual {
        device.complete_all();
    }
    engine.shutdown().context("Engine shutdown failed")?;

    if device.live_buffers() > 0 {
        warn!(count = device.live_buffers(), "Buffers outlived the engine");
    }
    info!(frames = config.render.frames, "frame_core finished");
    Ok(())
}
