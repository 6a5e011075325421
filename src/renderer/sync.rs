//! GPU 同步机制模块
//!
//! 提供 CPU-GPU 同步所需的 fence 抽象。
//!
//! # 设计原则
//!
//! - **单调递增**：每次提交分配一个新的 fence 值，GPU 完成后上报已完成值
//! - **无超时**：等待是无条件阻塞的，GPU 工作一旦提交就没有安全的降级路径
//!
//! `FenceTimeline` 是软件实现的完成计数器，由 headless 后端用来模拟异步执行的 GPU。

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Fence 值
///
/// 用于 CPU-GPU 同步的单调递增值。
/// CPU 可以等待 GPU 完成特定 Fence 值对应的工作。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 初始值，视为已经完成
    pub const ZERO: FenceValue = FenceValue(0);

    /// 创建新的Fence值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// 软件 fence 时间线
///
/// CPU 侧记录最后一次 signal 的值，GPU 侧（模拟）推进已完成值。
/// `wait_for_value` 阻塞直到已完成值追上目标，或时间线被中止。
pub struct FenceTimeline {
    /// 已 signal 的最大值（CPU 侧）
    signaled: AtomicU64,
    /// 已完成的值（GPU 侧）
    completed: Mutex<u64>,
    completed_changed: Condvar,
    aborted: AtomicBool,
}

impl FenceTimeline {
    pub fn new() -> Self {
        Self {
            signaled: AtomicU64::new(0),
            completed: Mutex::new(0),
            completed_changed: Condvar::new(),
            aborted: AtomicBool::new(false),
        }
    }

    /// 记录一次 signal
    pub fn signal(&self, value: FenceValue) {
        let previous = self.signaled.fetch_max(value.value(), Ordering::AcqRel);
        debug_assert!(previous < value.value(), "fence values must increase");
    }

    /// 获取最后一次 signal 的值
    pub fn signaled_value(&self) -> FenceValue {
        FenceValue::new(self.signaled.load(Ordering::Acquire))
    }

    /// 获取已完成的值
    pub fn completed_value(&self) -> FenceValue {
        FenceValue::new(*self.completed.lock())
    }

    /// 检查特定 Fence 值是否已完成
    pub fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }

    /// 推进已完成值（模拟 GPU 完成工作）
    ///
    /// 完成值不会超过已 signal 的值，也不会倒退。
    pub fn complete_up_to(&self, value: FenceValue) {
        let target = value.value().min(self.signaled.load(Ordering::Acquire));
        let mut completed = self.completed.lock();
        if target > *completed {
            *completed = target;
            self.completed_changed.notify_all();
        }
    }

    /// 完成所有已 signal 的工作
    pub fn complete_all(&self) {
        self.complete_up_to(self.signaled_value());
    }

    /// 阻塞等待特定 Fence 值完成
    ///
    /// 返回 `false` 表示等待因时间线中止而提前结束。
    pub fn wait_for_value(&self, value: FenceValue) -> bool {
        let mut completed = self.completed.lock();
        while *completed < value.value() {
            if self.aborted.load(Ordering::Acquire) {
                return false;
            }
            self.completed_changed.wait(&mut completed);
        }
        true
    }

    /// 中止时间线，唤醒所有等待者
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        let _completed = self.completed.lock();
        self.completed_changed.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

impl Default for FenceTimeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fence_value() {
        let fence = FenceValue::new(1);
        assert_eq!(fence.next().value(), 2);
        assert!(FenceValue::ZERO < fence);
    }

    #[test]
    fn test_completion_never_passes_signaled() {
        let timeline = FenceTimeline::new();
        timeline.signal(FenceValue::new(1));
        timeline.signal(FenceValue::new(2));

        timeline.complete_up_to(FenceValue::new(10));
        assert_eq!(timeline.completed_value().value(), 2);

        // 不会倒退
        timeline.complete_up_to(FenceValue::new(1));
        assert_eq!(timeline.completed_value().value(), 2);
        assert!(timeline.is_completed(FenceValue::new(2)));
        assert!(!timeline.is_completed(FenceValue::new(3)));
    }

    #[test]
    fn test_wait_blocks_until_completed() {
        let timeline = Arc::new(FenceTimeline::new());
        timeline.signal(FenceValue::new(1));

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || {
                let finished = timeline.wait_for_value(FenceValue::new(1));
                tx.send(finished).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        timeline.complete_all();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        waiter.join().unwrap();
    }

    #[test]
    fn test_abort_wakes_waiters() {
        let timeline = Arc::new(FenceTimeline::new());
        timeline.signal(FenceValue::new(1));

        let waiter = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || timeline.wait_for_value(FenceValue::new(1)))
        };

        thread::sleep(Duration::from_millis(20));
        timeline.abort();
        assert!(!waiter.join().unwrap());
        assert!(timeline.is_aborted());
    }

    #[test]
    fn test_zero_is_always_complete() {
        let timeline = FenceTimeline::new();
        assert!(timeline.wait_for_value(FenceValue::ZERO));
    }
}
