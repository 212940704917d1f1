//! 回放引擎
//!
//! 按录制顺序把每个快照绝对写入 [`ArmState`]，相邻快照之间等待固定间隔。
//! 每一步之前检查 [`CancelToken`]；观察到停止信号后立即返回，不再写硬件，
//! 状态停留在最后一个完整应用的快照。

use crate::recorder::Trajectory;
use crate::run::{CancelToken, RunKind, RunReport};
use crate::state::ArmState;
use std::sync::Arc;
use std::time::Duration;

/// 回放引擎
#[derive(Debug, Clone)]
pub struct PlaybackEngine {
    arm: Arc<ArmState>,
    cancel: CancelToken,
    interval: Duration,
}

impl PlaybackEngine {
    pub fn new(arm: Arc<ArmState>, cancel: CancelToken, interval: Duration) -> Self {
        Self {
            arm,
            cancel,
            interval,
        }
    }

    /// 同步回放（在调用线程中执行）
    pub fn run(&self, trajectory: &Trajectory) -> RunReport {
        let total = trajectory.len();
        tracing::info!("Starting playback of {} points", total);

        for (index, snapshot) in trajectory.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return RunReport::PlaybackInterrupted {
                    applied: index,
                    total,
                };
            }

            if let Err(e) = self.arm.apply_snapshot(snapshot) {
                return RunReport::Failed {
                    kind: RunKind::Playback,
                    reason: e.to_string(),
                };
            }
            tracing::debug!("Playback step {}/{}: {:?}", index + 1, total, snapshot.angles());

            if !self.interval.is_zero() {
                spin_sleep::sleep(self.interval);
            }
        }

        RunReport::PlaybackFinished { points: total }
    }
}
