//! 轨迹录制
//!
//! 录制期间，每次成功的点动之后由调度器调用 [`Recorder::record_if_active`]，
//! 把当前 [`ArmState`] 的快照追加到轨迹中。这是写入轨迹的唯一路径。

use crate::error::Rejection;
use crate::state::{ArmState, Snapshot};
use std::sync::Arc;

/// 轨迹：按时间顺序排列的快照
///
/// 交给回放线程时是共享的不可变切片，录制器和回放永远不会修改同一个实例。
pub type Trajectory = Arc<[Snapshot]>;

/// 录制会话
#[derive(Debug, Default)]
pub struct Recorder {
    active: bool,
    buffer: Vec<Snapshot>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始录制
    ///
    /// 清空上一次的轨迹。已在录制时拒绝，且不影响正在录制的轨迹。
    pub fn start(&mut self) -> Result<(), Rejection> {
        if self.active {
            return Err(Rejection::AlreadyRecording);
        }
        self.active = true;
        self.buffer.clear();
        tracing::info!("Recording started");
        Ok(())
    }

    /// 停止录制，返回录制的点数
    pub fn stop(&mut self) -> Result<usize, Rejection> {
        if !self.active {
            return Err(Rejection::NotRecording);
        }
        self.active = false;
        tracing::info!("Recording stopped ({} points)", self.buffer.len());
        Ok(self.buffer.len())
    }

    /// 录制中则追加当前快照，返回是否追加
    pub fn record_if_active(&mut self, arm: &ArmState) -> bool {
        if !self.active {
            return false;
        }
        self.buffer.push(arm.snapshot());
        tracing::trace!("Recorded point {}", self.buffer.len());
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn point_count(&self) -> usize {
        self.buffer.len()
    }

    /// 最近一次录制的轨迹拷贝（用于回放）
    pub fn trajectory(&self) -> Trajectory {
        Arc::from(self.buffer.as_slice())
    }
}
