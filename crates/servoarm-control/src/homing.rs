//! 回零引擎
//!
//! 所有关节同步朝中位角移动，每拍每个未到位的关节移动 1 度
//! （与点动步长无关，回零动作比手动点动更平滑）。
//!
//! 第 N 拍完整应用后才开始第 N+1 拍。被停止信号打断时保留已完成的进度，不回滚。

use crate::run::{CancelToken, RunReport};
use crate::state::ArmState;
use std::sync::Arc;
use std::time::Duration;

/// 回零引擎
#[derive(Debug, Clone)]
pub struct HomingEngine {
    arm: Arc<ArmState>,
    cancel: CancelToken,
    interval: Duration,
}

impl HomingEngine {
    pub fn new(arm: Arc<ArmState>, cancel: CancelToken, interval: Duration) -> Self {
        Self {
            arm,
            cancel,
            interval,
        }
    }

    /// 同步回零（在调用线程中执行）
    pub fn run(&self) -> RunReport {
        tracing::info!(
            "Returning to neutral ({} degrees away)",
            self.arm.distance_from_neutral()
        );

        let mut ticks = 0;
        loop {
            if self.arm.at_neutral() {
                return RunReport::HomingFinished { ticks };
            }
            if self.cancel.is_cancelled() {
                return RunReport::HomingInterrupted { ticks };
            }

            self.arm.homing_tick();
            ticks += 1;
            tracing::trace!("Homing tick {}", ticks);

            if !self.interval.is_zero() {
                spin_sleep::sleep(self.interval);
            }
        }
    }
}
