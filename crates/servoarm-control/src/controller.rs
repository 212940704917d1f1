//! 命令调度器
//!
//! [`ArmController`] 持有全部运行期状态（关节状态、录制会话、单飞槽位、停止信号），
//! 把每条命令映射为一次状态修改或一个控制动作：
//!
//! - 点动：同步修改 [`ArmState`]，成功后恰好触发一次 `record_if_active`
//! - 录制 / 回放 / 回零：控制动作，从不触发录制
//! - 未知令牌：空操作，不报错
//!
//! 回放和回零在后台线程中运行，结束时通过 channel 上报 [`RunReport`]。

use crate::command::{Command, JogKey};
use crate::config::{ArmConfig, JointId};
use crate::error::{ConfigError, ControlError, Rejection};
use crate::homing::HomingEngine;
use crate::playback::PlaybackEngine;
use crate::recorder::Recorder;
use crate::run::{CancelToken, RunHandle, RunKind, RunReport, RunSlot, spawn_run};
use crate::state::ArmState;
use crossbeam_channel::{Receiver, Sender, bounded};
use servoarm_bus::{BusError, ServoBus};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 未取走的运行结果最多保留的条数
pub(crate) const REPORT_CAPACITY: usize = 4;

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 点动已应用；`angles` 与按键绑定的关节一一对应
    Moved {
        key: JogKey,
        angles: Vec<(JointId, u8)>,
        recorded: bool,
    },
    /// 未知令牌或未绑定的按键
    Ignored,
    RecordingStarted,
    RecordingStopped { points: usize },
    PlaybackStarted { points: usize },
    NothingToPlay,
    HomingStarted,
    Help,
    ShutdownRequested,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Moved { key, .. } => write!(f, "moved ({key})"),
            Outcome::Ignored => f.write_str("ignored"),
            Outcome::RecordingStarted => f.write_str("recording started"),
            Outcome::RecordingStopped { points } => {
                write!(f, "recording stopped, {points} points saved")
            },
            Outcome::PlaybackStarted { points } => write!(f, "playback started ({points} points)"),
            Outcome::NothingToPlay => f.write_str("nothing recorded to play back"),
            Outcome::HomingStarted => f.write_str("returning to neutral position"),
            Outcome::Help => f.write_str("help"),
            Outcome::ShutdownRequested => f.write_str("shutting down"),
        }
    }
}

/// 单个关节的展示信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointStatus {
    pub name: String,
    pub angle: u8,
}

/// 供展示层渲染的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub joints: Vec<JointStatus>,
    pub recording: bool,
    pub points: usize,
    pub active_run: Option<RunKind>,
    /// 最近一次控制动作的结果描述
    pub last_action: Option<String>,
}

/// 机械臂控制器（命令调度器）
pub struct ArmController {
    config: ArmConfig,
    arm: Arc<ArmState>,
    jogs: HashMap<JogKey, Vec<(JointId, i32)>>,
    recorder: Recorder,
    slot: RunSlot,
    cancel: CancelToken,
    reports_tx: Sender<RunReport>,
    reports_rx: Receiver<RunReport>,
    active: Option<RunHandle>,
    last_action: Option<String>,
    closed: bool,
}

impl ArmController {
    /// 创建控制器
    ///
    /// 校验配置、配置所有硬件通道，并把按键绑定解析为关节增量。
    pub fn new(config: ArmConfig, bus: Box<dyn ServoBus>) -> Result<Self, ConfigError> {
        let arm = Arc::new(ArmState::new(&config, bus)?);

        let step = config.step as i32;
        let mut jogs: HashMap<JogKey, Vec<(JointId, i32)>> = HashMap::new();
        for binding in &config.bindings {
            let joint = config
                .joint_id(&binding.joint)
                .ok_or_else(|| ConfigError::UnknownBindingJoint {
                    key: binding.key.to_string(),
                    joint: binding.joint.clone(),
                })?;
            jogs.entry(binding.key)
                .or_default()
                .push((joint, binding.direction.sign() * step));
        }

        let (reports_tx, reports_rx) = bounded(REPORT_CAPACITY);

        Ok(Self {
            config,
            arm,
            jogs,
            recorder: Recorder::new(),
            slot: RunSlot::new(),
            cancel: CancelToken::new(),
            reports_tx,
            reports_rx,
            active: None,
            last_action: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    pub fn arm(&self) -> &Arc<ArmState> {
        &self.arm
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// 进程级停止信号（例如交给 Ctrl-C 处理器）
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 运行结果接收端
    ///
    /// 接收端是共享队列的克隆；自行接收的结果请交给 [`ArmController::note_report`]。
    pub fn reports(&self) -> Receiver<RunReport> {
        self.reports_rx.clone()
    }

    /// 启动归位：逐个关节写入中位角
    pub fn park(&self) {
        self.arm.park(self.config.startup_settle());
    }

    /// 解析并执行一个命令令牌；未知令牌为空操作
    pub fn dispatch_token(&mut self, token: &str) -> Result<Outcome, ControlError> {
        match Command::parse(token) {
            Some(command) => self.dispatch(command),
            None => {
                tracing::trace!("Ignoring unknown token {:?}", token);
                Ok(Outcome::Ignored)
            },
        }
    }

    /// 执行命令
    pub fn dispatch(&mut self, command: Command) -> Result<Outcome, ControlError> {
        self.reap_finished();

        let result = match command {
            Command::Jog(key) => return self.jog(key),
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
            Command::Playback => self.start_playback(),
            Command::Home => self.start_homing(),
            Command::Help => return Ok(Outcome::Help),
            Command::Quit => {
                self.request_stop();
                Ok(Outcome::ShutdownRequested)
            },
        };

        match &result {
            Ok(outcome) => self.last_action = Some(outcome.to_string()),
            Err(e) => {
                tracing::warn!("{}", e);
                self.last_action = Some(e.to_string());
            },
        }
        result
    }

    fn jog(&mut self, key: JogKey) -> Result<Outcome, ControlError> {
        let Some(deltas) = self.jogs.get(&key) else {
            return Ok(Outcome::Ignored);
        };

        let applied = self.arm.apply_deltas(deltas)?;
        let angles = deltas
            .iter()
            .map(|(joint, _)| *joint)
            .zip(applied)
            .collect();
        let recorded = self.recorder.record_if_active(&self.arm);

        Ok(Outcome::Moved {
            key,
            angles,
            recorded,
        })
    }

    fn start_recording(&mut self) -> Result<Outcome, ControlError> {
        if let Some(kind) = self.slot.active() {
            return Err(Rejection::RecordWhileRunning(kind).into());
        }
        self.recorder.start()?;
        Ok(Outcome::RecordingStarted)
    }

    fn stop_recording(&mut self) -> Result<Outcome, ControlError> {
        let points = self.recorder.stop()?;
        Ok(Outcome::RecordingStopped { points })
    }

    fn start_playback(&mut self) -> Result<Outcome, ControlError> {
        if self.recorder.is_active() {
            return Err(Rejection::PlaybackWhileRecording.into());
        }

        let trajectory = self.recorder.trajectory();
        if trajectory.is_empty() {
            return Ok(Outcome::NothingToPlay);
        }

        let guard = self.slot.try_acquire(RunKind::Playback)?;
        let points = trajectory.len();
        let engine = PlaybackEngine::new(
            self.arm.clone(),
            self.cancel.clone(),
            self.config.playback_interval(),
        );
        let handle = spawn_run(guard, self.reports_tx.clone(), move || {
            engine.run(&trajectory)
        })
        .map_err(|source| ControlError::Spawn {
            kind: RunKind::Playback,
            source,
        })?;

        self.track(handle);
        Ok(Outcome::PlaybackStarted { points })
    }

    fn start_homing(&mut self) -> Result<Outcome, ControlError> {
        if self.recorder.is_active() {
            return Err(Rejection::HomingWhileRecording.into());
        }

        let guard = self.slot.try_acquire(RunKind::Homing)?;
        let engine = HomingEngine::new(
            self.arm.clone(),
            self.cancel.clone(),
            self.config.homing_interval(),
        );
        let handle = spawn_run(guard, self.reports_tx.clone(), move || engine.run()).map_err(
            |source| ControlError::Spawn {
                kind: RunKind::Homing,
                source,
            },
        )?;

        self.track(handle);
        Ok(Outcome::HomingStarted)
    }

    /// 保存新的运行句柄；上一个运行已释放槽位，只需等它的线程退出
    fn track(&mut self, handle: RunHandle) {
        if let Some(previous) = self.active.replace(handle) {
            previous.join();
        }
    }

    /// 回收已结束的后台线程
    fn reap_finished(&mut self) {
        if self.active.as_ref().is_some_and(RunHandle::is_finished) {
            if let Some(handle) = self.active.take() {
                handle.join();
            }
        }
    }

    /// 设置停止信号：后台运行在下一个检查点退出，之后不再写入舵机
    fn request_stop(&self) {
        if self.cancel.cancel() {
            tracing::info!("Shutdown requested");
        }
    }

    /// 记录一条运行结果（更新"最近一次控制动作"）
    pub fn note_report(&mut self, report: &RunReport) {
        tracing::debug!("{} report: {}", report.kind(), report);
        self.last_action = Some(report.to_string());
        self.reap_finished();
    }

    /// 非阻塞地取出所有已上报的运行结果
    pub fn poll_reports(&mut self) -> Vec<RunReport> {
        let reports: Vec<RunReport> = self.reports_rx.try_iter().collect();
        for report in &reports {
            self.note_report(report);
        }
        reports
    }

    /// 等待下一条运行结果
    pub fn wait_report(&mut self, timeout: Duration) -> Option<RunReport> {
        let report = self.reports_rx.recv_timeout(timeout).ok()?;
        self.note_report(&report);
        Some(report)
    }

    /// 当前展示状态
    pub fn status(&self) -> StatusReport {
        let snapshot = self.arm.snapshot();
        let joints = self
            .arm
            .joints()
            .iter()
            .zip(snapshot.angles())
            .map(|(spec, &angle)| JointStatus {
                name: spec.name.clone(),
                angle,
            })
            .collect();

        StatusReport {
            joints,
            recording: self.recorder.is_active(),
            points: self.recorder.point_count(),
            active_run: self.slot.active(),
            last_action: self.last_action.clone(),
        }
    }

    /// 退出：设置停止信号、等待后台线程、关闭硬件连接
    ///
    /// 停止信号只会被设置一次，重复调用是安全的。
    pub fn shutdown(&mut self) -> Result<(), BusError> {
        self.request_stop();
        if let Some(handle) = self.active.take() {
            handle.join();
        }
        self.poll_reports();
        self.close_bus()
    }

    fn close_bus(&mut self) -> Result<(), BusError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.arm.close()
    }
}

impl Drop for ArmController {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.active.take() {
            handle.join();
        }
        if let Err(e) = self.close_bus() {
            tracing::warn!("Failed to close servo bus: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoarm_bus::MockBus;

    fn controller() -> ArmController {
        let mut config = ArmConfig::reference();
        config.playback_interval_ms = 0;
        config.homing_interval_ms = 0;
        config.startup_settle_ms = 0;
        ArmController::new(config, Box::new(MockBus::new())).unwrap()
    }

    #[test]
    fn test_unknown_token_is_noop() {
        let mut ctl = controller();
        let before = ctl.status();
        assert_eq!(ctl.dispatch_token("x").unwrap(), Outcome::Ignored);
        assert_eq!(ctl.status(), before);
    }

    #[test]
    fn test_help_has_no_side_effect() {
        let mut ctl = controller();
        ctl.dispatch(Command::StartRecording).unwrap();
        assert_eq!(ctl.dispatch_token("help").unwrap(), Outcome::Help);
        assert_eq!(ctl.recorder().point_count(), 0);
    }

    #[test]
    fn test_control_actions_are_not_recorded() {
        let mut ctl = controller();
        ctl.dispatch_token("r").unwrap();
        ctl.dispatch_token("up").unwrap();
        assert!(ctl.dispatch_token("r").is_err());
        assert!(ctl.dispatch_token("p").is_err());
        assert!(ctl.dispatch_token("h").is_err());
        assert_eq!(ctl.recorder().point_count(), 1);
    }

    #[test]
    fn test_last_action_tracks_control_actions() {
        let mut ctl = controller();
        assert_eq!(ctl.status().last_action, None);

        ctl.dispatch_token("r").unwrap();
        assert_eq!(
            ctl.status().last_action.as_deref(),
            Some("recording started")
        );

        ctl.dispatch_token("r").unwrap_err();
        assert_eq!(
            ctl.status().last_action.as_deref(),
            Some("Rejected: already recording")
        );

        // 点动不覆盖控制动作的结果
        ctl.dispatch_token("w").unwrap();
        assert_eq!(
            ctl.status().last_action.as_deref(),
            Some("Rejected: already recording")
        );
    }

    #[test]
    fn test_status_lists_every_joint() {
        let ctl = controller();
        let status = ctl.status();
        assert_eq!(status.joints.len(), 7);
        assert_eq!(status.joints[0].name, "base_1");
        assert_eq!(status.joints[0].angle, 180);
        assert_eq!(status.joints[6].name, "gripper_grasp");
        assert_eq!(status.joints[6].angle, 80);
        assert!(!status.recording);
        assert_eq!(status.active_run, None);
    }

    #[test]
    fn test_unread_reports_stay_bounded() {
        let mut ctl = controller();
        for _ in 0..REPORT_CAPACITY + 3 {
            assert_eq!(ctl.dispatch_token("h").unwrap(), Outcome::HomingStarted);
            while ctl.status().active_run.is_some() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        if let Some(handle) = ctl.active.take() {
            handle.join();
        }

        assert_eq!(ctl.reports_rx.len(), REPORT_CAPACITY);
        assert_eq!(ctl.poll_reports().len(), REPORT_CAPACITY);
        assert!(ctl.reports_rx.is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut ctl = controller();
        ctl.shutdown().unwrap();
        ctl.shutdown().unwrap();
        assert!(ctl.cancel_token().is_cancelled());
    }
}
