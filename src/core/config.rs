//! 配置管理模块
//!
//! 提供渲染核心配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [render]
//! rtv_capacity = 512
//! dsv_capacity = 512
//! srv_capacity = 4096   # 着色器可见
//! uav_capacity = 512
//! frames = 8            # 演示程序渲染的帧数
//! gpu_latency = "immediate"  # 或 "manual"（仅 headless 后端）
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};

/// 单个描述符堆允许的最大容量（D3D12 Tier 1 上限）
pub const MAX_DESCRIPTOR_CAPACITY: u32 = 1_000_000;

/// 渲染核心配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 渲染配置
    #[serde(default)]
    pub render: RenderConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 渲染配置
///
/// 描述符堆容量在初始化时固定，运行时不会增长。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// RTV 堆容量
    #[serde(default = "default_rtv_capacity")]
    pub rtv_capacity: u32,

    /// DSV 堆容量
    #[serde(default = "default_dsv_capacity")]
    pub dsv_capacity: u32,

    /// SRV 堆容量（着色器可见）
    #[serde(default = "default_srv_capacity")]
    pub srv_capacity: u32,

    /// UAV 堆容量
    #[serde(default = "default_uav_capacity")]
    pub uav_capacity: u32,

    /// 演示循环渲染的帧数
    #[serde(default = "default_frames")]
    pub frames: u32,

    /// headless 后端的 GPU 完成模式
    #[serde(default = "default_gpu_latency")]
    pub gpu_latency: GpuLatency,
}

/// headless 后端的 fence 完成方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuLatency {
    /// signal 时立即完成
    Immediate,
    /// 由调用方手动推进完成值
    Manual,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_rtv_capacity() -> u32 { 512 }
fn default_dsv_capacity() -> u32 { 512 }
fn default_srv_capacity() -> u32 { 4096 }
fn default_uav_capacity() -> u32 { 512 }
fn default_frames() -> u32 { 8 }
fn default_gpu_latency() -> GpuLatency { GpuLatency::Immediate }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "frame_core.log".to_string() }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            rtv_capacity: default_rtv_capacity(),
            dsv_capacity: default_dsv_capacity(),
            srv_capacity: default_srv_capacity(),
            uav_capacity: default_uav_capacity(),
            frames: default_frames(),
            gpu_latency: default_gpu_latency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use frame_core::core::Config;
    ///
    /// let config = Config::from_file("config.toml")?;
    /// # Ok::<(), frame_core::core::RenderCoreError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.to_path_buf()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--frames <value>`: 演示循环帧数
    /// - `--srv-capacity <value>`: SRV 堆容量
    /// - `--manual-gpu`: headless 后端改为手动完成模式
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--manual-gpu") {
            self.render.gpu_latency = GpuLatency::Manual;
        }

        if let Some(frames) = arg_value(&args, "--frames") {
            self.render.frames = frames;
        }

        if let Some(capacity) = arg_value(&args, "--srv-capacity") {
            self.render.srv_capacity = capacity;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("render.rtv_capacity", self.render.rtv_capacity),
            ("render.dsv_capacity", self.render.dsv_capacity),
            ("render.srv_capacity", self.render.srv_capacity),
            ("render.uav_capacity", self.render.uav_capacity),
        ];

        for (field, capacity) in capacities {
            if capacity == 0 || capacity > MAX_DESCRIPTOR_CAPACITY {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!(
                        "Descriptor heap capacity must be in 1..={}",
                        MAX_DESCRIPTOR_CAPACITY
                    ),
                }
                .into());
            }
        }

        Ok(())
    }
}

fn arg_value(args: &[String], name: &str) -> Option<u32> {
    let idx = args.iter().position(|a| a == name)?;
    args.get(idx + 1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.render.rtv_capacity, 512);
        assert_eq!(config.render.srv_capacity, 4096);
        assert_eq!(config.render.gpu_latency, GpuLatency::Immediate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [render]
            srv_capacity = 64
            gpu_latency = "manual"
            "#,
        )
        .unwrap();

        assert_eq!(config.render.srv_capacity, 64);
        assert_eq!(config.render.dsv_capacity, 512);
        assert_eq!(config.render.gpu_latency, GpuLatency::Manual);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.render.uav_capacity = 0;
        assert!(config.validate().is_err());

        config.render.uav_capacity = MAX_DESCRIPTOR_CAPACITY + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["frame_core", "--frames", "20", "--manual-gpu", "--srv-capacity", "x"]);

        assert_eq!(config.render.frames, 20);
        assert_eq!(config.render.gpu_latency, GpuLatency::Manual);
        assert_eq!(config.render.srv_capacity, 4096);
    }
}
