//! 错误类型定义
//!
//! - [`ConfigError`]：启动期致命错误（配置非法、传输不可达）
//! - [`ControlError`]：运行期可恢复错误（未知关节、被拒绝的操作）
//!
//! "被中断"不是错误，而是 [`RunReport`](crate::RunReport) 的一种结果。

use crate::run::RunKind;
use servoarm_bus::BusError;
use std::path::PathBuf;
use thiserror::Error;

/// 配置错误（启动期致命）
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 没有配置任何关节
    #[error("No joints configured")]
    NoJoints,

    #[error("Duplicate joint name: {0}")]
    DuplicateJoint(String),

    #[error("Joints '{first}' and '{second}' share channel {channel}")]
    DuplicateChannel {
        channel: u8,
        first: String,
        second: String,
    },

    /// `min_angle > max_angle`
    #[error("Joint '{joint}' has invalid range [{min}, {max}]")]
    InvalidRange { joint: String, min: u8, max: u8 },

    /// 角度超出传输边界（0..=180）
    #[error("Joint '{joint}' limit {angle} exceeds 180 degrees")]
    AngleAboveLimit { joint: String, angle: u8 },

    /// 中位角不在 `[min, max]` 内
    #[error("Joint '{joint}' neutral angle {neutral} outside [{min}, {max}]")]
    NeutralOutOfRange {
        joint: String,
        neutral: u8,
        min: u8,
        max: u8,
    },

    /// 步长为 0
    #[error("Jog step must be at least 1 degree")]
    InvalidStep,

    /// 按键绑定引用了不存在的关节
    #[error("Binding for key '{key}' references unknown joint '{joint}'")]
    UnknownBindingJoint { key: String, joint: String },

    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// 硬件传输不可达（连接或配置通道失败）
    #[error("Transport error: {0}")]
    Transport(#[from] BusError),
}

/// 被拒绝的操作（非致命，不改变任何状态）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,

    #[error("stop recording before playing back")]
    PlaybackWhileRecording,

    #[error("cannot return to home while recording")]
    HomingWhileRecording,

    #[error("cannot start recording while {0} is running")]
    RecordWhileRunning(RunKind),

    #[error("{0} already in progress")]
    RunInProgress(RunKind),
}

/// 运行期错误（非致命）
#[derive(Error, Debug)]
pub enum ControlError {
    /// 关节标识不在配置中
    #[error("Unknown joint: {0}")]
    UnknownJoint(String),

    /// 快照的关节数量与当前配置不一致
    #[error("Snapshot has {actual} angles, arm has {expected} joints")]
    SnapshotMismatch { expected: usize, actual: usize },

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    /// 无法创建后台线程
    #[error("Failed to spawn {kind} worker: {source}")]
    Spawn {
        kind: RunKind,
        #[source]
        source: std::io::Error,
    },
}

impl ControlError {
    /// 如果是被拒绝的操作，返回拒绝原因
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            ControlError::Rejected(r) => Some(*r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display() {
        assert_eq!(Rejection::AlreadyRecording.to_string(), "already recording");
        assert_eq!(
            Rejection::RunInProgress(RunKind::Homing).to_string(),
            "homing already in progress"
        );
        assert_eq!(
            Rejection::RecordWhileRunning(RunKind::Playback).to_string(),
            "cannot start recording while playback is running"
        );
    }

    #[test]
    fn test_control_error_from_rejection() {
        let err: ControlError = Rejection::PlaybackWhileRecording.into();
        assert_eq!(err.rejection(), Some(Rejection::PlaybackWhileRecording));
        assert_eq!(err.to_string(), "Rejected: stop recording before playing back");

        let err = ControlError::UnknownJoint("wrist".to_string());
        assert_eq!(err.rejection(), None);
        assert_eq!(err.to_string(), "Unknown joint: wrist");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NeutralOutOfRange {
            joint: "elbow".to_string(),
            neutral: 10,
            min: 20,
            max: 160,
        };
        assert_eq!(
            err.to_string(),
            "Joint 'elbow' neutral angle 10 outside [20, 160]"
        );

        let err: ConfigError = BusError::Closed.into();
        assert!(matches!(err, ConfigError::Transport(BusError::Closed)));
    }
}
