//! 长时间运行的操作（回放 / 回零）的公共设施
//!
//! - [`CancelToken`]：进程级停止信号，启动时创建、退出时设置一次、永不复位
//! - [`RunSlot`] / [`RunGuard`]：单飞（single-flight）保护，同一时刻最多一个运行
//! - [`RunReport`]：运行结束时通过 channel 上报的结果
//! - [`RunHandle`]：后台线程句柄，退出时用于等待线程结束

use crate::error::Rejection;
use crossbeam_channel::{Sender, TrySendError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

/// 协作式停止信号
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置停止信号，第一次设置时返回 `true`
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 长时间运行的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    Playback,
    Homing,
}

impl RunKind {
    fn to_raw(self) -> u8 {
        match self {
            RunKind::Playback => 1,
            RunKind::Homing => 2,
        }
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(RunKind::Playback),
            2 => Some(RunKind::Homing),
            _ => None,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Playback => f.write_str("playback"),
            RunKind::Homing => f.write_str("homing"),
        }
    }
}

const IDLE: u8 = 0;

/// 单飞槽位
#[derive(Debug, Clone, Default)]
pub struct RunSlot {
    state: Arc<AtomicU8>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 占用槽位；已被占用时返回 [`Rejection::RunInProgress`]
    pub fn try_acquire(&self, kind: RunKind) -> Result<RunGuard, Rejection> {
        match self
            .state
            .compare_exchange(IDLE, kind.to_raw(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(RunGuard {
                slot: self.clone(),
                kind,
            }),
            Err(current) => Err(Rejection::RunInProgress(
                RunKind::from_raw(current).unwrap_or(kind),
            )),
        }
    }

    /// 当前占用槽位的运行
    pub fn active(&self) -> Option<RunKind> {
        RunKind::from_raw(self.state.load(Ordering::Acquire))
    }
}

/// 槽位占用凭证，Drop 时释放
#[derive(Debug)]
pub struct RunGuard {
    slot: RunSlot,
    kind: RunKind,
}

impl RunGuard {
    pub fn kind(&self) -> RunKind {
        self.kind
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.slot.state.store(IDLE, Ordering::Release);
        tracing::trace!("{} slot released", self.kind);
    }
}

/// 运行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    PlaybackFinished { points: usize },
    /// `applied` 个快照已完整应用
    PlaybackInterrupted { applied: usize, total: usize },
    HomingFinished { ticks: usize },
    HomingInterrupted { ticks: usize },
    Failed { kind: RunKind, reason: String },
}

impl RunReport {
    pub fn kind(&self) -> RunKind {
        match self {
            RunReport::PlaybackFinished { .. } | RunReport::PlaybackInterrupted { .. } => {
                RunKind::Playback
            },
            RunReport::HomingFinished { .. } | RunReport::HomingInterrupted { .. } => {
                RunKind::Homing
            },
            RunReport::Failed { kind, .. } => *kind,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            RunReport::PlaybackInterrupted { .. } | RunReport::HomingInterrupted { .. }
        )
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunReport::PlaybackFinished { points } => {
                write!(f, "playback finished ({points} points)")
            },
            RunReport::PlaybackInterrupted { applied, total } => {
                write!(f, "playback interrupted after {applied}/{total} points")
            },
            RunReport::HomingFinished { .. } => f.write_str("arm has returned to neutral position"),
            RunReport::HomingInterrupted { .. } => f.write_str("return to neutral interrupted"),
            RunReport::Failed { kind, reason } => write!(f, "{kind} failed: {reason}"),
        }
    }
}

/// 后台运行线程句柄
#[derive(Debug)]
pub struct RunHandle {
    kind: RunKind,
    thread: JoinHandle<()>,
}

impl RunHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// 等待线程退出
    pub fn join(self) {
        if self.thread.join().is_err() {
            tracing::error!("{} worker panicked", self.kind);
        }
    }
}

/// 在专用线程中执行一次运行
///
/// 线程持有 `guard` 直到 `body` 返回；槽位先释放、再发送结果，
/// 因此收到 [`RunReport`] 时可以立即开始下一次运行。
///
/// `reports` 是有界队列：没有人取走结果时丢弃新结果，不会阻塞运行线程。
pub(crate) fn spawn_run<F>(
    guard: RunGuard,
    reports: Sender<RunReport>,
    body: F,
) -> std::io::Result<RunHandle>
where
    F: FnOnce() -> RunReport + Send + 'static,
{
    let kind = guard.kind();
    let thread = thread::Builder::new()
        .name(format!("servoarm-{kind}"))
        .spawn(move || {
            let report = body();
            drop(guard);
            tracing::info!("{}", report);
            match reports.try_send(report) {
                Ok(()) => {},
                Err(TrySendError::Full(report)) => {
                    tracing::warn!("Report queue full, dropping: {}", report);
                },
                // 接收端已关闭说明控制器已退出
                Err(TrySendError::Disconnected(_)) => {},
            }
        })?;

    Ok(RunHandle { kind, thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};
    use std::time::Duration;

    #[test]
    fn test_cancel_token_set_once() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        assert!(token.cancel());
        assert!(clone.is_cancelled());
        // 第二次设置不再是"第一次"
        assert!(!clone.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_run_slot_single_flight() {
        let slot = RunSlot::new();
        assert_eq!(slot.active(), None);

        let guard = slot.try_acquire(RunKind::Homing).unwrap();
        assert_eq!(slot.active(), Some(RunKind::Homing));

        let err = slot.try_acquire(RunKind::Playback).unwrap_err();
        assert_eq!(err, Rejection::RunInProgress(RunKind::Homing));

        drop(guard);
        assert_eq!(slot.active(), None);
        let guard = slot.try_acquire(RunKind::Playback).unwrap();
        assert_eq!(guard.kind(), RunKind::Playback);
    }

    #[test]
    fn test_spawn_run_releases_slot_before_report() {
        let slot = RunSlot::new();
        let (tx, rx) = unbounded();
        let guard = slot.try_acquire(RunKind::Playback).unwrap();

        let handle = spawn_run(guard, tx, || RunReport::PlaybackFinished { points: 3 }).unwrap();

        let report = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report, RunReport::PlaybackFinished { points: 3 });
        assert_eq!(slot.active(), None);
        handle.join();
    }

    #[test]
    fn test_full_report_queue_drops_instead_of_blocking() {
        let slot = RunSlot::new();
        let (tx, rx) = bounded(1);

        for ticks in 0..3 {
            let guard = slot.try_acquire(RunKind::Homing).unwrap();
            let handle = spawn_run(guard, tx.clone(), move || RunReport::HomingFinished { ticks })
                .unwrap();
            // 队列满时线程照常退出
            handle.join();
        }

        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().unwrap(), RunReport::HomingFinished { ticks: 0 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_report_display() {
        assert_eq!(
            RunReport::PlaybackFinished { points: 2 }.to_string(),
            "playback finished (2 points)"
        );
        assert_eq!(
            RunReport::PlaybackInterrupted { applied: 1, total: 4 }.to_string(),
            "playback interrupted after 1/4 points"
        );
        assert!(RunReport::HomingInterrupted { ticks: 3 }.is_interrupted());
        assert!(!RunReport::HomingFinished { ticks: 3 }.is_interrupted());
        assert_eq!(RunReport::HomingFinished { ticks: 0 }.kind(), RunKind::Homing);
    }
}
