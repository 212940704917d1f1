//! # Servoarm Control
//!
//! 舵机机械臂的运动状态引擎：
//!
//! - [`ArmState`]：关节角度的唯一数据源，所有修改都经过钳位
//! - [`Recorder`]：录制期间在每次点动后保存快照
//! - [`PlaybackEngine`]：按固定节拍回放轨迹，可取消
//! - [`HomingEngine`]：每拍 1 度同步回到中位，可取消
//! - [`ArmController`]：命令调度器，把命令令牌映射为状态修改或控制动作
//!
//! # 使用示例
//!
//! ```rust
//! use servoarm_bus::MockBus;
//! use servoarm_control::{ArmConfig, ArmController, Outcome};
//!
//! let mut config = ArmConfig::reference();
//! config.startup_settle_ms = 0;
//!
//! let mut controller = ArmController::new(config, Box::new(MockBus::new()))?;
//! controller.park();
//!
//! controller.dispatch_token("r")?;
//! controller.dispatch_token("up")?;
//! match controller.dispatch_token("o")? {
//!     Outcome::RecordingStopped { points } => assert_eq!(points, 1),
//!     other => panic!("unexpected outcome: {other}"),
//! }
//! controller.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod homing;
pub mod playback;
pub mod recorder;
pub mod run;
pub mod state;

// 重新导出常用类型
pub use command::{Command, JogKey};
pub use config::{ArmConfig, Binding, Direction, JointId, JointSpec};
pub use controller::{ArmController, JointStatus, Outcome, StatusReport};
pub use error::{ConfigError, ControlError, Rejection};
pub use homing::HomingEngine;
pub use playback::PlaybackEngine;
pub use recorder::{Recorder, Trajectory};
pub use run::{CancelToken, RunGuard, RunHandle, RunKind, RunReport, RunSlot};
pub use state::{ArmState, Snapshot, step_toward};
