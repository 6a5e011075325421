//! 延迟释放队列
//!
//! GPU 可能仍在读取的原生对象不能立即销毁。`deferred_release` 把对象挂到当前帧槽位的列表上，
//! 等该帧槽位下一次开始（此时它上一次提交的 GPU 工作已经完成）时再统一丢弃。

use parking_lot::Mutex;
use tracing::debug;

use super::descriptor::DescriptorHeaps;
use super::frame::{FrameCursor, FRAME_BUFFER_COUNT};
use crate::gfx::backend::NativeObject;

/// 按帧槽位分组的延迟释放队列
///
/// `deferred_release` 可以从任意线程调用。
pub struct DeferredReleaseQueue {
    cursor: FrameCursor,
    pending: Mutex<[Vec<NativeObject>; FRAME_BUFFER_COUNT]>,
}

impl DeferredReleaseQueue {
    pub fn new(cursor: FrameCursor) -> Self {
        Self {
            cursor,
            pending: Mutex::new(Default::default()),
        }
    }

    /// 把对象挂到当前帧槽位，调用方之后不得再通过任何句柄使用它
    pub fn deferred_release(&self, resource: NativeObject) {
        let frame_index = self.cursor.current();
        self.pending.lock()[frame_index].push(resource);
    }

    /// 处理指定帧槽位的延迟工作
    ///
    /// 先回收描述符堆在该帧期间释放的索引，再销毁挂在该帧上的所有对象。
    /// 调用方保证该帧槽位上一次提交的 GPU 工作已经完成。
    pub fn process(&self, frame_index: usize, heaps: &DescriptorHeaps) {
        check_frame_index(frame_index);
        heaps.process_deferred_free(frame_index);
        let released = std::mem::take(&mut self.pending.lock()[frame_index]);

        if !released.is_empty() {
            debug!(frame_index, count = released.len(), "Releasing deferred resources");
        }
        drop(released);
    }

    /// 指定帧槽位上等待释放的对象数量
    pub fn pending_count(&self, frame_index: usize) -> usize {
        check_frame_index(frame_index);
        self.pending.lock()[frame_index].len()
    }

    /// 所有帧槽位上等待释放的对象数量
    pub fn total_pending(&self) -> usize {
        self.pending.lock().iter().map(Vec::len).sum()
    }
}

fn check_frame_index(frame_index: usize) {
    assert!(
        frame_index < FRAME_BUFFER_COUNT,
        "frame index {} out of range ({} frame slots)",
        frame_index,
        FRAME_BUFFER_COUNT
    );
}
