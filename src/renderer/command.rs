//! 帧节奏控制模块
//!
//! 管理 [`FRAME_BUFFER_COUNT`] 个轮转的命令录制槽位和一个单调递增的 fence，
//! 让 CPU 的提交节奏不超过 GPU 的消费速度。
//!
//! # 帧槽位状态机
//!
//! ```text
//! Idle --begin_frame--> Recording --end_frame--> Submitted --begin_frame--> Recording ...
//! ```
//!
//! `begin_frame` 是唯一可能阻塞的操作：槽位上一次提交的 fence 值还没到达时，
//! 调用线程一直等待，没有超时。等待结束后才重置该槽位的录制上下文，
//! 并处理该槽位积累的延迟释放。
//!
//! 提交和同步失败会以 `Err` 返回，调用方必须视为致命错误并关闭后端。
//! 调用顺序错误返回 `InvalidFrameState`，不改变任何帧槽位的状态。

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

use super::deferred::DeferredReleaseQueue;
use super::descriptor::DescriptorHeaps;
use super::frame::{CommandFramePool, FrameCursor, FrameState, FRAME_BUFFER_COUNT};
use super::sync::FenceValue;
use crate::core::error::{GraphicsError, RenderCoreError, Result};
use crate::gfx::backend::{CommandQueue, GpuDevice, NativeObject};

struct PacerState {
    frames: CommandFramePool,
    /// 最后分配出去的 fence 值
    fence_value: FenceValue,
}

/// 帧节奏控制器
///
/// 帧状态只应由渲染线程推进；`deferred_release` 和 `current_frame_index`
/// 可以从任意线程调用。
pub struct FramePacer {
    queue: Arc<dyn CommandQueue>,
    cursor: FrameCursor,
    state: Mutex<PacerState>,
    releases: DeferredReleaseQueue,
}

/// 记录致命的设备错误
fn device_failure(operation: &'static str) -> impl Fn(RenderCoreError) -> RenderCoreError {
    move |err| {
        error!(operation, error = %err, "GPU command failure");
        err
    }
}

impl FramePacer {
    /// 创建命令队列和全部帧槽位，轮转从槽位 0 开始
    pub fn new(device: &dyn GpuDevice, cursor: FrameCursor) -> Result<Self> {
        let queue = device.create_command_queue(FRAME_BUFFER_COUNT)?;
        info!(
            backend = device.backend_name(),
            frames = FRAME_BUFFER_COUNT,
            "Frame pacer initialized"
        );

        Ok(Self {
            queue,
            state: Mutex::new(PacerState {
                frames: CommandFramePool::new(cursor.clone()),
                fence_value: FenceValue::ZERO,
            }),
            releases: DeferredReleaseQueue::new(cursor.clone()),
            cursor,
        })
    }

    /// 开始录制当前帧槽位
    ///
    /// 等待该槽位上一次提交完成，重置录制上下文，
    /// 然后回收该槽位期间延迟释放的描述符和原生对象。
    pub fn begin_frame(&self, heaps: &DescriptorHeaps) -> Result<usize> {
        let (frame_index, target) = {
            let state = self.state.lock();
            let frame = state.frames.current();
            Self::check_not_recording(frame.frame_index, frame.state)?;
            (frame.frame_index, frame.fence_value)
        };

        // 等待期间不持有状态锁，其他线程仍可查询 fence 值
        if self.queue.completed_value() < target {
            debug!(frame_index, fence = target.value(), "Waiting for GPU to release frame");
            self.queue
                .wait_for_value(target)
                .map_err(device_failure("wait_for_value"))?;
        }

        let mut state = self.state.lock();
        let frame = state.frames.current();
        if frame.frame_index != frame_index || frame.fence_value != target {
            return Err(GraphicsError::InvalidFrameState(format!(
                "frame {} advanced by another thread during begin_frame",
                frame_index
            ))
            .into());
        }
        Self::check_not_recording(frame_index, frame.state)?;

        self.queue
            .reset_recording(frame_index)
            .map_err(device_failure("reset_recording"))?;
        state.frames.current_mut().mark_recording();
        drop(state);

        self.releases.process(frame_index, heaps);
        trace!(frame_index, "Frame recording started");
        Ok(frame_index)
    }

    fn check_not_recording(frame_index: usize, state: FrameState) -> Result<()> {
        if state == FrameState::Recording {
            return Err(GraphicsError::InvalidFrameState(format!(
                "begin_frame called twice for frame {}",
                frame_index
            ))
            .into());
        }
        Ok(())
    }

    /// 提交当前帧槽位并前进到下一个槽位
    pub fn end_frame(&self) -> Result<()> {
        let mut state = self.state.lock();
        let frame_index = state.frames.current_index();

        if state.frames.current().state != FrameState::Recording {
            return Err(GraphicsError::InvalidFrameState(format!(
                "end_frame called for frame {} without begin_frame",
                frame_index
            ))
            .into());
        }

        self.queue
            .submit(frame_index)
            .map_err(device_failure("submit"))?;

        let fence_value = state.fence_value.next();
        self.queue
            .signal(fence_value)
            .map_err(device_failure("signal"))?;
        state.fence_value = fence_value;

        state.frames.current_mut().mark_submitted(fence_value);
        let next = state.frames.advance();
        trace!(frame_index, fence = fence_value.value(), next, "Frame submitted");
        Ok(())
    }

    /// 等待所有帧槽位的 fence，轮转回到槽位 0
    ///
    /// 不能在录制过程中调用。
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(frame) = state
            .frames
            .iter()
            .find(|frame| frame.state == FrameState::Recording)
        {
            return Err(GraphicsError::InvalidFrameState(format!(
                "flush called while frame {} is recording",
                frame.frame_index
            ))
            .into());
        }

        for frame in state.frames.iter() {
            self.queue
                .wait_for_value(frame.fence_value)
                .map_err(device_failure("flush"))?;
        }

        state.frames.reset();
        debug!(fence = state.fence_value.value(), "Frame pacer flushed");
        Ok(())
    }

    /// 当前帧槽位索引
    pub fn current_frame_index(&self) -> usize {
        self.cursor.current()
    }

    /// 最后分配出去的 fence 值
    pub fn fence_value(&self) -> FenceValue {
        self.state.lock().fence_value
    }

    /// GPU 已完成的 fence 值
    pub fn completed_value(&self) -> FenceValue {
        self.queue.completed_value()
    }

    /// 把原生对象挂到当前帧槽位，等该槽位下一次开始时销毁
    pub fn deferred_release(&self, resource: NativeObject) {
        self.releases.deferred_release(resource);
    }

    pub fn release_queue(&self) -> &DeferredReleaseQueue {
        &self.releases
    }

    /// 处理所有帧槽位的延迟工作
    ///
    /// 只能在 `flush` 之后调用，此时没有任何在途的 GPU 工作。
    pub fn drain(&self, heaps: &DescriptorHeaps) {
        for frame_index in 0..FRAME_BUFFER_COUNT {
            self.releases.process(frame_index, heaps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GpuLatency;
    use crate::gfx::HeadlessDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manual_pacer() -> (Arc<HeadlessDevice>, Arc<DescriptorHeaps>, Arc<FramePacer>) {
        let device = Arc::new(HeadlessDevice::new(GpuLatency::Manual));
        let cursor = FrameCursor::new();
        let heaps = Arc::new(DescriptorHeaps::new(&cursor));
        let pacer = Arc::new(FramePacer::new(device.as_ref(), cursor).unwrap());
        (device, heaps, pacer)
    }

    #[test]
    fn test_fourth_frame_waits_for_first_fence() {
        let (device, heaps, pacer) = manual_pacer();

        for expected in 0..FRAME_BUFFER_COUNT {
            assert_eq!(pacer.begin_frame(&heaps).unwrap(), expected);
            pacer.end_frame().unwrap();
        }
        assert_eq!(pacer.fence_value(), FenceValue::new(3));
        assert_eq!(pacer.current_frame_index(), 0);

        let (tx, rx) = mpsc::channel();
        let worker = {
            let pacer = Arc::clone(&pacer);
            let heaps = Arc::clone(&heaps);
            thread::spawn(move || {
                let result = pacer.begin_frame(&heaps).map_err(|e| e.to_string());
                tx.send(result).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        // 等待 GPU 期间其他线程仍可查询
        assert_eq!(pacer.fence_value(), FenceValue::new(3));
        assert_eq!(pacer.completed_value(), FenceValue::ZERO);

        device.complete_up_to(FenceValue::new(1));
        let frame_index = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(frame_index, 0);
        worker.join().unwrap();
    }

    #[test]
    fn test_fence_values_increase() {
        let (device, heaps, pacer) = manual_pacer();
        let queue = device.queue().unwrap();

        for round in 1..=7u64 {
            pacer.begin_frame(&heaps).unwrap();
            pacer.end_frame().unwrap();
            assert_eq!(queue.signaled_value(), FenceValue::new(round));
            device.complete_all();
        }
        // 7 帧之后槽位 0 被重置了 3 次
        assert_eq!(queue.reset_count(0), 3);
        assert_eq!(pacer.current_frame_index(), 1);
    }

    #[test]
    fn test_state_machine_misuse() {
        let (device, heaps, pacer) = manual_pacer();
        let queue = device.queue().unwrap();
        let err = pacer.end_frame().unwrap_err();
        assert!(matches!(
            err,
            RenderCoreError::Graphics(GraphicsError::InvalidFrameState(_))
        ));
        assert!(!err.is_fatal());

        pacer.begin_frame(&heaps).unwrap();
        assert!(!pacer.begin_frame(&heaps).unwrap_err().is_fatal());
        assert!(!pacer.flush().unwrap_err().is_fatal());
        // 被拒绝的调用不改变轮转
        assert_eq!(pacer.current_frame_index(), 0);
        assert_eq!(queue.reset_count(0), 1);
        pacer.end_frame().unwrap();
        assert_eq!(pacer.current_frame_index(), 1);
    }

    #[test]
    fn test_flush_resets_rotation() {
        let (device, heaps, pacer) = manual_pacer();
        pacer.begin_frame(&heaps).unwrap();
        pacer.end_frame().unwrap();
        pacer.begin_frame(&heaps).unwrap();
        pacer.end_frame().unwrap();
        assert_eq!(pacer.current_frame_index(), 2);

        device.complete_all();
        pacer.flush().unwrap();
        assert_eq!(pacer.current_frame_index(), 0);
        assert_eq!(pacer.completed_value(), FenceValue::new(2));
    }

    #[test]
    fn test_deferred_release_runs_on_same_slot() {
        let (device, heaps, pacer) = manual_pacer();
        let dropped = Arc::new(AtomicUsize::new(0));

        pacer.begin_frame(&heaps).unwrap();
        pacer.deferred_release(Box::new(DropCounter(Arc::clone(&dropped))));
        pacer.end_frame().unwrap();

        // 槽位 1 和 2 的开始不会触发释放
        for _ in 0..2 {
            pacer.begin_frame(&heaps).unwrap();
            pacer.end_frame().unwrap();
            assert_eq!(dropped.load(Ordering::SeqCst), 0);
        }

        device.complete_all();
        assert_eq!(pacer.begin_frame(&heaps).unwrap(), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_device_lost_is_reported() {
        let (device, heaps, pacer) = manual_pacer();
        for _ in 0..FRAME_BUFFER_COUNT {
            pacer.begin_frame(&heaps).unwrap();
            pacer.end_frame().unwrap();
        }

        let worker = {
            let pacer = Arc::clone(&pacer);
            let heaps = Arc::clone(&heaps);
            thread::spawn(move || pacer.begin_frame(&heaps))
        };
        thread::sleep(Duration::from_millis(20));
        device.lose_device();

        let err = worker.join().unwrap().unwrap_err();
        assert!(err.is_fatal());
    }
}
