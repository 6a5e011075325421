//! Headless 命令队列

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::core::config::GpuLatency;
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::CommandQueue;
use crate::renderer::sync::{FenceTimeline, FenceValue};

/// 单个帧槽位的录制上下文
#[derive(Debug, Clone, Copy, Default)]
struct RecordingContext {
    recording: bool,
    /// 上一次提交对应的 fence 值
    pending: FenceValue,
    resets: u64,
}

struct QueueState {
    contexts: Vec<RecordingContext>,
    /// 已提交但尚未 signal 的槽位
    unsignaled: Option<usize>,
}

/// Headless 直接命令队列
pub struct HeadlessQueue {
    latency: GpuLatency,
    timeline: FenceTimeline,
    lost: Arc<AtomicBool>,
    state: Mutex<QueueState>,
}

impl HeadlessQueue {
    pub(super) fn new(frame_count: usize, latency: GpuLatency, lost: Arc<AtomicBool>) -> Self {
        Self {
            latency,
            timeline: FenceTimeline::new(),
            lost,
            state: Mutex::new(QueueState {
                contexts: vec![RecordingContext::default(); frame_count],
                unsignaled: None,
            }),
        }
    }

    /// 模拟 GPU 完成到 `value` 为止的工作
    pub fn complete_up_to(&self, value: FenceValue) {
        self.timeline.complete_up_to(value);
    }

    /// 模拟 GPU 完成所有已提交的工作
    pub fn complete_all(&self) {
        self.timeline.complete_all();
    }

    /// 最后一次 signal 的 fence 值
    pub fn signaled_value(&self) -> FenceValue {
        self.timeline.signaled_value()
    }

    /// 帧槽位的录制上下文被重置的次数
    pub fn reset_count(&self, frame_index: usize) -> u64 {
        self.state
            .lock()
            .contexts
            .get(frame_index)
            .map_or(0, |context| context.resets)
    }

    pub(super) fn abort(&self) {
        self.timeline.abort();
    }

    fn check_device(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            return Err(GraphicsError::DeviceLost.into());
        }
        Ok(())
    }
}

fn context_mut(state: &mut QueueState, frame_index: usize) -> Result<&mut RecordingContext> {
    let count = state.contexts.len();
    state.contexts.get_mut(frame_index).ok_or_else(|| {
        GraphicsError::CommandExecution(format!(
            "Frame index {} out of range ({} recording contexts)",
            frame_index, count
        ))
        .into()
    })
}

impl CommandQueue for HeadlessQueue {
    fn reset_recording(&self, frame_index: usize) -> Result<()> {
        self.check_device()?;
        let mut state = self.state.lock();
        let context = context_mut(&mut state, frame_index)?;

        if !self.timeline.is_completed(context.pending) {
            return Err(GraphicsError::CommandExecution(format!(
                "Frame {} recording context reset while fence {} is still pending",
                frame_index,
                context.pending.value()
            ))
            .into());
        }

        context.recording = true;
        context.resets += 1;
        Ok(())
    }

    fn submit(&self, frame_index: usize) -> Result<()> {
        self.check_device()?;
        let mut state = self.state.lock();
        let context = context_mut(&mut state, frame_index)?;

        if !context.recording {
            return Err(GraphicsError::CommandExecution(format!(
                "Frame {} submitted without recording",
                frame_index
            ))
            .into());
        }

        context.recording = false;
        state.unsignaled = Some(frame_index);
        Ok(())
    }

    fn signal(&self, value: FenceValue) -> Result<()> {
        self.check_device()?;
        let signaled = self.timeline.signaled_value();
        if value <= signaled {
            return Err(GraphicsError::Synchronization(format!(
                "fence value {} does not advance past {}",
                value.value(),
                signaled.value()
            ))
            .into());
        }
        {
            let mut state = self.state.lock();
            if let Some(frame_index) = state.unsignaled.take() {
                state.contexts[frame_index].pending = value;
            }
        }

        self.timeline.signal(value);
        trace!(fence = value.value(), "Headless queue signaled");

        if self.latency == GpuLatency::Immediate {
            self.timeline.complete_up_to(value);
        }
        Ok(())
    }

    fn completed_value(&self) -> FenceValue {
        self.timeline.completed_value()
    }

    fn wait_for_value(&self, value: FenceValue) -> Result<()> {
        self.check_device()?;
        if !self.timeline.wait_for_value(value) {
            return Err(GraphicsError::DeviceLost.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RenderCoreError;

    fn manual_queue(frames: usize) -> HeadlessQueue {
        HeadlessQueue::new(frames, GpuLatency::Manual, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_reset_requires_previous_work_complete() {
        let queue = manual_queue(2);

        queue.reset_recording(0).unwrap();
        queue.submit(0).unwrap();
        queue.signal(FenceValue::new(1)).unwrap();

        // 槽位 0 的工作尚未完成，不能重置
        assert!(queue.reset_recording(0).is_err());
        // 槽位 1 没有在途工作
        queue.reset_recording(1).unwrap();

        queue.complete_up_to(FenceValue::new(1));
        queue.reset_recording(0).unwrap();
        assert_eq!(queue.reset_count(0), 2);
    }

    #[test]
    fn test_submit_without_recording_fails() {
        let queue = manual_queue(1);
        assert!(queue.submit(0).is_err());
        assert!(queue.reset_recording(3).is_err());
    }

    #[test]
    fn test_immediate_latency_completes_on_signal() {
        let queue = HeadlessQueue::new(1, GpuLatency::Immediate, Arc::new(AtomicBool::new(false)));
        queue.reset_recording(0).unwrap();
        queue.submit(0).unwrap();
        queue.signal(FenceValue::new(1)).unwrap();

        assert_eq!(queue.completed_value(), FenceValue::new(1));
        queue.wait_for_value(FenceValue::new(1)).unwrap();
    }

    #[test]
    fn test_signal_must_advance() {
        let queue = manual_queue(1);
        queue.reset_recording(0).unwrap();
        queue.submit(0).unwrap();
        queue.signal(FenceValue::new(2)).unwrap();

        let err = queue.signal(FenceValue::new(2)).unwrap_err();
        assert!(matches!(err, RenderCoreError::Graphics(GraphicsError::Synchronization(_))));
        assert!(err.is_fatal());
        assert!(queue.signal(FenceValue::new(1)).is_err());
        assert_eq!(queue.signaled_value(), FenceValue::new(2));
        queue.signal(FenceValue::new(3)).unwrap();
    }

    #[test]
    fn test_lost_device_fails_operations() {
        let lost = Arc::new(AtomicBool::new(false));
        let queue = HeadlessQueue::new(1, GpuLatency::Manual, Arc::clone(&lost));
        lost.store(true, Ordering::Release);

        let err = queue.reset_recording(0).unwrap_err();
        assert!(matches!(err, RenderCoreError::Graphics(GraphicsError::DeviceLost)));
        assert!(queue.signal(FenceValue::new(1)).is_err());
        assert!(queue.wait_for_value(FenceValue::ZERO).is_err());
    }
}
