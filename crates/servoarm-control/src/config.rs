//! # 机械臂配置
//!
//! 关节限位（JointLimits）、点动步长、回放/回零节拍以及按键绑定。
//! 配置在启动时加载并校验，之后不可变。
//!
//! ## TOML 示例
//!
//! ```toml
//! step = 5
//! playback_interval_ms = 20
//! homing_interval_ms = 20
//! startup_settle_ms = 150
//!
//! [[joints]]
//! name = "shoulder"
//! channel = 11
//! min_angle = 0
//! max_angle = 180
//! neutral_angle = 180
//!
//! [[bindings]]
//! key = "up"
//! joint = "shoulder"
//! direction = "decrease"
//! ```

use crate::command::JogKey;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use servoarm_bus::SERVO_MAX_ANGLE;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 关节标识（配置中的下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointId(usize);

impl JointId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 单个关节的静态配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JointSpec {
    /// 稳定的符号标识
    pub name: String,
    /// 硬件通道（Firmata 数字引脚）
    pub channel: u8,
    pub min_angle: u8,
    pub max_angle: u8,
    pub neutral_angle: u8,
}

impl JointSpec {
    pub fn new(name: impl Into<String>, channel: u8, neutral_angle: u8) -> Self {
        Self {
            name: name.into(),
            channel,
            min_angle: 0,
            max_angle: SERVO_MAX_ANGLE,
            neutral_angle,
        }
    }

    /// 设置限位
    pub fn with_range(mut self, min_angle: u8, max_angle: u8) -> Self {
        self.min_angle = min_angle;
        self.max_angle = max_angle;
        self
    }

    /// 把请求角度钳位到 `[min_angle, max_angle]`
    pub fn clamp(&self, requested: i32) -> u8 {
        requested.clamp(self.min_angle as i32, self.max_angle as i32) as u8
    }

    pub fn contains(&self, angle: u8) -> bool {
        (self.min_angle..=self.max_angle).contains(&angle)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_angle > self.max_angle {
            return Err(ConfigError::InvalidRange {
                joint: self.name.clone(),
                min: self.min_angle,
                max: self.max_angle,
            });
        }
        if self.max_angle > SERVO_MAX_ANGLE {
            return Err(ConfigError::AngleAboveLimit {
                joint: self.name.clone(),
                angle: self.max_angle,
            });
        }
        if !self.contains(self.neutral_angle) {
            return Err(ConfigError::NeutralOutOfRange {
                joint: self.name.clone(),
                neutral: self.neutral_angle,
                min: self.min_angle,
                max: self.max_angle,
            });
        }
        Ok(())
    }
}

/// 运动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Increase => 1,
            Direction::Decrease => -1,
        }
    }
}

/// 按键绑定
///
/// 同一个按键可以有多条绑定，它们构成一次耦合运动（例如底座差动）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Binding {
    pub key: JogKey,
    pub joint: String,
    pub direction: Direction,
}

impl Binding {
    pub fn new(key: JogKey, joint: impl Into<String>, direction: Direction) -> Self {
        Self {
            key,
            joint: joint.into(),
            direction,
        }
    }
}

fn default_step() -> u8 {
    5
}

fn default_interval_ms() -> u64 {
    20
}

fn default_settle_ms() -> u64 {
    150
}

/// 机械臂配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArmConfig {
    /// 每次点动的角度（度）
    #[serde(default = "default_step")]
    pub step: u8,

    /// 回放相邻快照之间的间隔（ms）
    #[serde(default = "default_interval_ms")]
    pub playback_interval_ms: u64,

    /// 回零相邻节拍之间的间隔（ms）
    #[serde(default = "default_interval_ms")]
    pub homing_interval_ms: u64,

    /// 启动时逐个写入中位角的间隔（ms）
    #[serde(default = "default_settle_ms")]
    pub startup_settle_ms: u64,

    pub joints: Vec<JointSpec>,

    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl ArmConfig {
    /// 参考配置：7 舵机桌面机械臂（StandardFirmataPlus + Arduino Uno）
    ///
    /// 底座由 `base_1` / `base_2` 两个舵机差动驱动。
    pub fn reference() -> Self {
        use Direction::{Decrease, Increase};

        let joints = vec![
            JointSpec::new("base_1", 10, 180),
            JointSpec::new("base_2", 9, 0),
            JointSpec::new("shoulder", 11, 180),
            JointSpec::new("elbow", 6, 100),
            JointSpec::new("arm_bend", 5, 75),
            JointSpec::new("gripper_rotate", 3, 90),
            // 引脚 4 在 Uno 上不是 PWM，动作可能不平滑
            JointSpec::new("gripper_grasp", 4, 80),
        ];

        let bindings = vec![
            Binding::new(JogKey::Left, "base_1", Increase),
            Binding::new(JogKey::Left, "base_2", Decrease),
            Binding::new(JogKey::Right, "base_1", Decrease),
            Binding::new(JogKey::Right, "base_2", Increase),
            Binding::new(JogKey::Down, "shoulder", Increase),
            Binding::new(JogKey::Up, "shoulder", Decrease),
            Binding::new(JogKey::W, "elbow", Increase),
            Binding::new(JogKey::S, "elbow", Decrease),
            Binding::new(JogKey::T, "arm_bend", Increase),
            Binding::new(JogKey::Y, "arm_bend", Decrease),
            Binding::new(JogKey::A, "gripper_rotate", Increase),
            Binding::new(JogKey::D, "gripper_rotate", Decrease),
            // 1 = 夹紧, 2 = 张开
            Binding::new(JogKey::One, "gripper_grasp", Increase),
            Binding::new(JogKey::Two, "gripper_grasp", Decrease),
        ];

        Self {
            step: default_step(),
            playback_interval_ms: default_interval_ms(),
            homing_interval_ms: default_interval_ms(),
            startup_settle_ms: default_settle_ms(),
            joints,
            bindings,
        }
    }

    /// 只有关节、没有绑定的配置（节拍为 0，便于测试）
    pub fn with_joints(joints: Vec<JointSpec>) -> Self {
        Self {
            step: default_step(),
            playback_interval_ms: 0,
            homing_interval_ms: 0,
            startup_settle_ms: 0,
            joints,
            bindings: Vec::new(),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.joints.is_empty() {
            return Err(ConfigError::NoJoints);
        }
        if self.step == 0 {
            return Err(ConfigError::InvalidStep);
        }

        let mut names = HashSet::new();
        for (i, joint) in self.joints.iter().enumerate() {
            joint.validate()?;

            if !names.insert(joint.name.as_str()) {
                return Err(ConfigError::DuplicateJoint(joint.name.clone()));
            }
            if let Some(other) = self.joints[..i].iter().find(|j| j.channel == joint.channel) {
                return Err(ConfigError::DuplicateChannel {
                    channel: joint.channel,
                    first: other.name.clone(),
                    second: joint.name.clone(),
                });
            }
        }

        for binding in &self.bindings {
            if !names.contains(binding.joint.as_str()) {
                return Err(ConfigError::UnknownBindingJoint {
                    key: binding.key.to_string(),
                    joint: binding.joint.clone(),
                });
            }
        }

        Ok(())
    }

    /// 按名称查找关节
    pub fn joint_id(&self, name: &str) -> Option<JointId> {
        self.joints
            .iter()
            .position(|j| j.name == name)
            .map(JointId::new)
    }

    pub fn joint(&self, id: JointId) -> Option<&JointSpec> {
        self.joints.get(id.index())
    }

    pub fn playback_interval(&self) -> Duration {
        Duration::from_millis(self.playback_interval_ms)
    }

    pub fn homing_interval(&self) -> Duration {
        Duration::from_millis(self.homing_interval_ms)
    }

    pub fn startup_settle(&self) -> Duration {
        Duration::from_millis(self.startup_settle_ms)
    }

    /// 解析并校验 TOML
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ArmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(
            "Loaded arm config from {} ({} joints)",
            path.display(),
            config.joints.len()
        );
        Ok(config)
    }

    /// 保存到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_config_is_valid() {
        let config = ArmConfig::reference();
        config.validate().unwrap();
        assert_eq!(config.joints.len(), 7);
        assert_eq!(config.step, 5);
        assert_eq!(config.playback_interval(), Duration::from_millis(20));
        assert_eq!(config.homing_interval(), Duration::from_millis(20));
        assert_eq!(config.startup_settle(), Duration::from_millis(150));
    }

    #[test]
    fn test_joint_lookup() {
        let config = ArmConfig::reference();
        let shoulder = config.joint_id("shoulder").unwrap();
        assert_eq!(shoulder.index(), 2);
        assert_eq!(config.joint(shoulder).unwrap().neutral_angle, 180);
        assert!(config.joint_id("wrist").is_none());
        assert!(config.joint(JointId::new(99)).is_none());
    }

    #[test]
    fn test_clamp() {
        let joint = JointSpec::new("elbow", 6, 100).with_range(20, 160);
        assert_eq!(joint.clamp(-5), 20);
        assert_eq!(joint.clamp(100), 100);
        assert_eq!(joint.clamp(500), 160);
        assert_eq!(joint.clamp(20), 20);
        assert_eq!(joint.clamp(160), 160);
    }

    #[test]
    fn test_reject_empty_joints() {
        let config = ArmConfig::with_joints(Vec::new());
        assert!(matches!(config.validate(), Err(ConfigError::NoJoints)));
    }

    #[test]
    fn test_reject_inverted_range() {
        let config =
            ArmConfig::with_joints(vec![JointSpec::new("elbow", 6, 100).with_range(150, 30)]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRange { min: 150, max: 30, .. })
        ));
    }

    #[test]
    fn test_reject_neutral_outside_range() {
        let config =
            ArmConfig::with_joints(vec![JointSpec::new("elbow", 6, 10).with_range(20, 160)]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NeutralOutOfRange { neutral: 10, .. })
        ));
    }

    #[test]
    fn test_reject_angle_above_servo_limit() {
        let config =
            ArmConfig::with_joints(vec![JointSpec::new("elbow", 6, 100).with_range(0, 200)]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AngleAboveLimit { angle: 200, .. })
        ));
    }

    #[test]
    fn test_reject_duplicates() {
        let config = ArmConfig::with_joints(vec![
            JointSpec::new("elbow", 6, 100),
            JointSpec::new("elbow", 7, 100),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateJoint(name)) if name == "elbow"
        ));

        let config = ArmConfig::with_joints(vec![
            JointSpec::new("elbow", 6, 100),
            JointSpec::new("wrist", 6, 100),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateChannel { channel: 6, .. })
        ));
    }

    #[test]
    fn test_reject_zero_step() {
        let mut config = ArmConfig::reference();
        config.step = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidStep)));
    }

    #[test]
    fn test_reject_binding_to_unknown_joint() {
        let mut config = ArmConfig::reference();
        config
            .bindings
            .push(Binding::new(JogKey::W, "wrist", Direction::Increase));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownBindingJoint { ref joint, .. }) if joint == "wrist"
        ));
    }

    #[test]
    fn test_toml_roundtrip_of_reference() {
        let config = ArmConfig::reference();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("gripper_grasp"));
        let parsed = ArmConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_parse_minimal_toml_uses_defaults() {
        let text = r#"
            [[joints]]
            name = "shoulder"
            channel = 11
            min_angle = 0
            max_angle = 180
            neutral_angle = 180

            [[bindings]]
            key = "up"
            joint = "shoulder"
            direction = "decrease"
        "#;

        let config = ArmConfig::from_toml_str(text).unwrap();
        assert_eq!(config.step, 5);
        assert_eq!(config.playback_interval_ms, 20);
        assert_eq!(config.bindings[0].key, JogKey::Up);
        assert_eq!(config.bindings[0].direction.sign(), -1);
    }

    #[test]
    fn test_parse_rejects_invalid_content() {
        let text = r#"
            [[joints]]
            name = "shoulder"
            channel = 11
            min_angle = 90
            max_angle = 10
            neutral_angle = 50
        "#;
        assert!(matches!(
            ArmConfig::from_toml_str(text),
            Err(ConfigError::InvalidRange { .. })
        ));

        assert!(matches!(
            ArmConfig::from_toml_str("joints = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arm.toml");

        let config = ArmConfig::reference();
        config.save(&path).unwrap();
        let loaded = ArmConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ArmConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
