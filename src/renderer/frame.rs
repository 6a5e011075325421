//! 帧资源管理模块
//!
//! 管理同时在途的多帧资源。每个帧槽位记录其命令录制状态和
//! 复用前必须到达的 fence 值。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::sync::FenceValue;

/// 同时在途的帧数量（三缓冲）
pub const FRAME_BUFFER_COUNT: usize = 3;

/// 当前帧槽位索引
///
/// 由帧节奏控制器写入，描述符堆和延迟释放队列读取它来标记延迟条目所属的帧。
/// 其他线程只需要原子地读到一个索引值，不需要更强的同步。
#[derive(Debug, Clone, Default)]
pub struct FrameCursor(Arc<AtomicUsize>);

impl FrameCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前帧槽位索引
    #[inline]
    pub fn current(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, frame_index: usize) {
        debug_assert!(frame_index < FRAME_BUFFER_COUNT);
        self.0.store(frame_index, Ordering::Release);
    }
}

/// 帧槽位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// 空闲，可以开始录制
    Idle,
    /// 正在录制命令
    Recording,
    /// 已提交，等待 GPU 完成
    Submitted,
}

/// 单个帧槽位
#[derive(Debug, Clone)]
pub struct CommandFrame {
    /// 帧索引
    pub frame_index: usize,
    /// 复用前必须到达的 fence 值
    pub fence_value: FenceValue,
    /// 当前状态
    pub state: FrameState,
}

impl CommandFrame {
    /// 创建新的帧槽位
    pub fn new(frame_index: usize) -> Self {
        Self {
            frame_index,
            fence_value: FenceValue::ZERO,
            state: FrameState::Idle,
        }
    }

    /// 标记为正在录制
    pub fn mark_recording(&mut self) {
        self.state = FrameState::Recording;
    }

    /// 标记为已提交
    pub fn mark_submitted(&mut self, fence_value: FenceValue) {
        self.fence_value = fence_value;
        self.state = FrameState::Submitted;
    }

    /// 检查在给定的已完成值下，该槽位是否可以复用
    pub fn is_available(&self, completed: FenceValue) -> bool {
        self.state != FrameState::Recording && completed >= self.fence_value
    }
}

/// 帧槽位池
///
/// 固定 [`FRAME_BUFFER_COUNT`] 个槽位，轮转使用。
#[derive(Debug)]
pub struct CommandFramePool {
    frames: [CommandFrame; FRAME_BUFFER_COUNT],
    cursor: FrameCursor,
}

impl CommandFramePool {
    pub fn new(cursor: FrameCursor) -> Self {
        cursor.set(0);
        Self {
            frames: std::array::from_fn(CommandFrame::new),
            cursor,
        }
    }

    /// 获取当前帧
    pub fn current(&self) -> &CommandFrame {
        &self.frames[self.cursor.current()]
    }

    /// 获取当前帧（可变）
    pub fn current_mut(&mut self) -> &mut CommandFrame {
        let index = self.cursor.current();
        &mut self.frames[index]
    }

    /// 获取指定索引的帧
    pub fn get(&self, index: usize) -> Option<&CommandFrame> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandFrame> {
        self.frames.iter()
    }

    /// 获取当前帧索引
    pub fn current_index(&self) -> usize {
        self.cursor.current()
    }

    /// 前进到下一帧
    pub fn advance(&mut self) -> usize {
        let next = (self.cursor.current() + 1) % FRAME_BUFFER_COUNT;
        self.cursor.set(next);
        next
    }

    /// 所有槽位回到空闲状态，轮转从 0 重新开始
    ///
    /// 调用方保证所有槽位的 fence 值都已到达。
    pub fn reset(&mut self) {
        for frame in &mut self.frames {
            frame.state = FrameState::Idle;
        }
        self.cursor.set(0);
    }

    /// 所有槽位中最大的 fence 值
    pub fn last_fence_value(&self) -> FenceValue {
        self.frames
            .iter()
            .map(|frame| frame.fence_value)
            .max()
            .unwrap_or(FenceValue::ZERO)
    }
}
