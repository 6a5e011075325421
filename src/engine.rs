//! 引擎服务
//!
//! 按固定顺序组装资源注册表和渲染核心：
//! 初始化时先注册表、再描述符堆、最后帧节奏控制器；关闭时顺序相反，
//! 并在关闭前完整 flush，保证没有遗留的延迟工作。

use std::sync::Arc;

use crate::content::{AssetData, AssetType, ContentRegistry};
use crate::core::error::Result;
use crate::core::{Config, Id};
use crate::gfx::backend::GpuDevice;
use crate::renderer::RenderCore;
use crate::{engine_error, engine_info, engine_warn};

/// 引擎
pub struct Engine {
    content: ContentRegistry,
    core: RenderCore,
}

impl Engine {
    pub fn initialize(device: Arc<dyn GpuDevice>, config: &Config) -> Result<Self> {
        config.validate()?;

        let content = ContentRegistry::new();
        let core = RenderCore::initialize(device, &config.render)?;
        engine_info!(
            rtv = config.render.rtv_capacity,
            dsv = config.render.dsv_capacity,
            srv = config.render.srv_capacity,
            uav = config.render.uav_capacity,
            "Engine initialized"
        );

        Ok(Self { content, core })
    }

    pub fn content(&self) -> &ContentRegistry {
        &self.content
    }

    pub fn core(&self) -> &RenderCore {
        &self.core
    }

    /// 创建资源，几何体的子网格注册到渲染核心
    pub fn create_resource(&self, data: AssetData<'_>) -> Result<Id> {
        self.content.create_resource(&self.core, data)
    }

    pub fn destroy_resource(&self, id: Id, asset_type: AssetType) -> Result<()> {
        self.content.destroy_resource(&self.core, id, asset_type)
    }

    /// 关闭引擎
    ///
    /// flush 之后销毁剩余资源，再关闭渲染核心。设备失效时仍然完成释放并返回原始错误。
    /// 帧还在录制时调用会被拒绝，引擎保持可用。
    pub fn shutdown(&self) -> Result<()> {
        if let Err(err) = self.core.flush() {
            if !err.is_fatal() {
                return Err(err);
            }
            engine_error!(error = %err, "Flush failed during shutdown");
            engine_warn!(
                geometries = self.content.geometries().len(),
                "Releasing content after device failure"
            );
        }

        self.content.destroy_all(&self.core);
        let result = self.core.shutdown();
        engine_info!("Engine shut down");
        result
    }
}
