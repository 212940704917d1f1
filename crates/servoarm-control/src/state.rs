//! ArmState：关节角度的唯一数据源
//!
//! # 不变量
//!
//! 每个已存储的角度都在该关节的 `[min_angle, max_angle]` 内。
//! 钳位只发生在 `ArmInner::store_clamped()` 一处，所有修改路径都经过它。
//!
//! # 并发
//!
//! 角度表和传输一起放在同一把锁里：一次修改（钳位 + 存储 + 硬件写入）
//! 是一个完整的临界区，其他线程不会观察到中间状态。
//! 手动点动、回放和回零都通过这里修改状态。

use crate::config::{ArmConfig, JointId, JointSpec};
use crate::error::{ConfigError, ControlError};
use parking_lot::Mutex;
use servoarm_bus::{BusError, ServoBus, ServoChannel};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// 某一时刻所有关节角度的不可变拷贝（按 [`JointId`] 排序）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snapshot {
    angles: Box<[u8]>,
}

impl Snapshot {
    pub fn from_angles(angles: impl Into<Box<[u8]>>) -> Self {
        Self {
            angles: angles.into(),
        }
    }

    pub fn angles(&self) -> &[u8] {
        &self.angles
    }

    pub fn get(&self, joint: JointId) -> Option<u8> {
        self.angles.get(joint.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }
}

/// 单步朝目标角度移动 1 度
pub fn step_toward(current: u8, target: u8) -> u8 {
    match current.cmp(&target) {
        Ordering::Less => current + 1,
        Ordering::Greater => current - 1,
        Ordering::Equal => current,
    }
}

struct ArmInner {
    angles: Vec<u8>,
    servos: Vec<ServoChannel>,
    bus: Box<dyn ServoBus>,
}

impl ArmInner {
    /// 唯一的钳位入口：钳位、存储、写硬件，返回实际角度
    ///
    /// 硬件写入失败只记录日志（fire-and-forget），状态仍然更新。
    fn store_clamped(&mut self, spec: &JointSpec, index: usize, requested: i32) -> u8 {
        let applied = spec.clamp(requested);
        if applied as i32 != requested {
            tracing::debug!(
                "Clamped {} from {} to {} (range [{}, {}])",
                spec.name,
                requested,
                applied,
                spec.min_angle,
                spec.max_angle
            );
        }

        self.angles[index] = applied;
        if let Err(e) = self.bus.write_angle(self.servos[index], applied) {
            tracing::warn!("Failed to write {} = {}: {}", spec.name, applied, e);
        }
        applied
    }
}

/// 机械臂关节状态
pub struct ArmState {
    joints: Arc<[JointSpec]>,
    inner: Mutex<ArmInner>,
}

impl ArmState {
    /// 创建状态并配置所有硬件通道
    ///
    /// 角度初始化为各关节的中位角，但不写硬件（见 [`ArmState::park`]）。
    /// 配置非法或通道配置失败都是致命错误。
    pub fn new(config: &ArmConfig, mut bus: Box<dyn ServoBus>) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut servos = Vec::with_capacity(config.joints.len());
        for joint in &config.joints {
            let servo = bus.attach(joint.channel)?;
            tracing::info!("Configured servo '{}' on channel {}", joint.name, joint.channel);
            servos.push(servo);
        }

        let angles = config.joints.iter().map(|j| j.neutral_angle).collect();

        Ok(Self {
            joints: config.joints.clone().into(),
            inner: Mutex::new(ArmInner {
                angles,
                servos,
                bus,
            }),
        })
    }

    /// 启动归位：逐个关节写入中位角，每个关节之间等待 `settle`
    ///
    /// 不持锁等待。
    pub fn park(&self, settle: Duration) {
        for (index, spec) in self.joints.iter().enumerate() {
            {
                let mut inner = self.inner.lock();
                inner.store_clamped(spec, index, spec.neutral_angle as i32);
            }
            if !settle.is_zero() {
                std::thread::sleep(settle);
            }
        }
        tracing::info!("Arm parked at neutral position");
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[JointSpec] {
        &self.joints
    }

    /// 按名称解析关节
    pub fn joint(&self, name: &str) -> Result<JointId, ControlError> {
        self.joints
            .iter()
            .position(|j| j.name == name)
            .map(JointId::new)
            .ok_or_else(|| ControlError::UnknownJoint(name.to_string()))
    }

    fn spec(&self, joint: JointId) -> Result<&JointSpec, ControlError> {
        self.joints
            .get(joint.index())
            .ok_or_else(|| ControlError::UnknownJoint(joint.to_string()))
    }

    /// 设置关节角度（钳位），返回实际角度
    pub fn set_angle(&self, joint: JointId, requested: i32) -> Result<u8, ControlError> {
        let spec = self.spec(joint)?;
        let mut inner = self.inner.lock();
        Ok(inner.store_clamped(spec, joint.index(), requested))
    }

    pub fn get_angle(&self, joint: JointId) -> Result<u8, ControlError> {
        self.spec(joint)?;
        Ok(self.inner.lock().angles[joint.index()])
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_angles(self.inner.lock().angles.clone())
    }

    /// 在同一个临界区内应用多个相对运动
    ///
    /// 先校验全部关节，任何一个未知则不做任何修改。
    pub fn apply_deltas(&self, deltas: &[(JointId, i32)]) -> Result<Vec<u8>, ControlError> {
        let specs = deltas
            .iter()
            .map(|(joint, _)| self.spec(*joint))
            .collect::<Result<Vec<_>, _>>()?;

        let mut inner = self.inner.lock();
        let applied = deltas
            .iter()
            .zip(specs)
            .map(|((joint, delta), spec)| {
                let index = joint.index();
                let requested = inner.angles[index] as i32 + delta;
                inner.store_clamped(spec, index, requested)
            })
            .collect();
        Ok(applied)
    }

    /// 绝对写入一个快照的所有关节（回放单步）
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<(), ControlError> {
        if snapshot.len() != self.joints.len() {
            return Err(ControlError::SnapshotMismatch {
                expected: self.joints.len(),
                actual: snapshot.len(),
            });
        }

        let mut inner = self.inner.lock();
        for (index, (spec, &angle)) in self.joints.iter().zip(snapshot.angles()).enumerate() {
            inner.store_clamped(spec, index, angle as i32);
        }
        Ok(())
    }

    /// 回零单拍：每个未到中位的关节朝中位移动 1 度
    ///
    /// 整拍在同一个临界区内完成。返回是否有关节移动。
    pub fn homing_tick(&self) -> bool {
        let mut inner = self.inner.lock();
        let mut moved = false;
        for (index, spec) in self.joints.iter().enumerate() {
            let current = inner.angles[index];
            if current != spec.neutral_angle {
                let next = step_toward(current, spec.neutral_angle);
                inner.store_clamped(spec, index, next as i32);
                moved = true;
            }
        }
        moved
    }

    /// 所有关节是否都在中位
    pub fn at_neutral(&self) -> bool {
        let inner = self.inner.lock();
        self.joints
            .iter()
            .zip(&inner.angles)
            .all(|(spec, &angle)| angle == spec.neutral_angle)
    }

    /// 各关节到中位的距离之和（度）
    pub fn distance_from_neutral(&self) -> u32 {
        let inner = self.inner.lock();
        self.joints
            .iter()
            .zip(&inner.angles)
            .map(|(spec, &angle)| angle.abs_diff(spec.neutral_angle) as u32)
            .sum()
    }

    /// 关闭硬件连接
    pub fn close(&self) -> Result<(), BusError> {
        self.inner.lock().bus.close()
    }
}

impl std::fmt::Debug for ArmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmState")
            .field("joints", &self.joints.len())
            .field("angles", &self.inner.lock().angles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoarm_bus::{BusLog, MockBus};

    fn arm_with(joints: Vec<JointSpec>) -> (ArmState, BusLog) {
        let bus = MockBus::new();
        let log = bus.log();
        let arm = ArmState::new(&ArmConfig::with_joints(joints), Box::new(bus)).unwrap();
        (arm, log)
    }

    #[test]
    fn test_seeded_to_neutral_without_writes() {
        let (arm, log) = arm_with(vec![
            JointSpec::new("shoulder", 11, 180),
            JointSpec::new("elbow", 6, 100),
        ]);
        assert_eq!(arm.snapshot().angles(), &[180, 100]);
        assert!(arm.at_neutral());
        assert!(log.is_empty());
        assert_eq!(log.attached(), vec![11, 6]);
    }

    #[test]
    fn test_park_writes_every_neutral() {
        let (arm, log) = arm_with(vec![
            JointSpec::new("shoulder", 11, 180),
            JointSpec::new("elbow", 6, 100),
        ]);
        arm.park(Duration::ZERO);
        assert_eq!(log.last_angle(11), Some(180));
        assert_eq!(log.last_angle(6), Some(100));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_set_angle_clamps_and_writes() {
        let (arm, log) = arm_with(vec![JointSpec::new("elbow", 6, 100).with_range(20, 160)]);
        let elbow = arm.joint("elbow").unwrap();

        assert_eq!(arm.set_angle(elbow, 200).unwrap(), 160);
        assert_eq!(log.last_angle(6), Some(160));
        assert_eq!(arm.set_angle(elbow, -40).unwrap(), 20);
        assert_eq!(arm.get_angle(elbow).unwrap(), 20);
        assert_eq!(arm.set_angle(elbow, 90).unwrap(), 90);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_unknown_joint_is_reported() {
        let (arm, log) = arm_with(vec![JointSpec::new("elbow", 6, 100)]);
        assert!(matches!(
            arm.joint("wrist"),
            Err(ControlError::UnknownJoint(name)) if name == "wrist"
        ));
        assert!(matches!(
            arm.set_angle(JointId::new(3), 90),
            Err(ControlError::UnknownJoint(_))
        ));
        assert!(arm.get_angle(JointId::new(3)).is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn test_apply_deltas_is_all_or_nothing() {
        let (arm, log) = arm_with(vec![
            JointSpec::new("base_1", 10, 90),
            JointSpec::new("base_2", 9, 90),
        ]);
        let b1 = JointId::new(0);
        let b2 = JointId::new(1);

        let applied = arm.apply_deltas(&[(b1, 5), (b2, -5)]).unwrap();
        assert_eq!(applied, vec![95, 85]);

        let result = arm.apply_deltas(&[(b1, 5), (JointId::new(7), -5)]);
        assert!(result.is_err());
        assert_eq!(arm.snapshot().angles(), &[95, 85]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_apply_snapshot() {
        let (arm, log) = arm_with(vec![
            JointSpec::new("shoulder", 11, 180),
            JointSpec::new("elbow", 6, 100),
        ]);
        arm.apply_snapshot(&Snapshot::from_angles(vec![170, 60]))
            .unwrap();
        assert_eq!(arm.snapshot().angles(), &[170, 60]);
        assert_eq!(log.len(), 2);

        let result = arm.apply_snapshot(&Snapshot::from_angles(vec![1, 2, 3]));
        assert!(matches!(
            result,
            Err(ControlError::SnapshotMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_homing_tick_moves_one_degree() {
        let (arm, _log) = arm_with(vec![
            JointSpec::new("shoulder", 11, 180),
            JointSpec::new("elbow", 6, 100),
            JointSpec::new("grasp", 4, 80),
        ]);
        arm.set_angle(JointId::new(0), 177).unwrap();
        arm.set_angle(JointId::new(1), 102).unwrap();
        assert_eq!(arm.distance_from_neutral(), 5);

        assert!(arm.homing_tick());
        assert_eq!(arm.snapshot().angles(), &[178, 101, 80]);
        assert!(arm.homing_tick());
        assert_eq!(arm.snapshot().angles(), &[179, 100, 80]);
        assert!(arm.homing_tick());
        assert_eq!(arm.snapshot().angles(), &[180, 100, 80]);
        assert!(arm.at_neutral());
        assert!(!arm.homing_tick());
    }

    #[test]
    fn test_bus_failure_does_not_fail_mutation() {
        let (arm, log) = arm_with(vec![JointSpec::new("elbow", 6, 100)]);
        log.set_failing(true);
        assert_eq!(arm.set_angle(JointId::new(0), 120).unwrap(), 120);
        assert_eq!(arm.get_angle(JointId::new(0)).unwrap(), 120);
        assert!(log.is_empty());
    }

    #[test]
    fn test_step_toward() {
        assert_eq!(step_toward(10, 20), 11);
        assert_eq!(step_toward(20, 10), 19);
        assert_eq!(step_toward(15, 15), 15);
        assert_eq!(step_toward(0, 180), 1);
        assert_eq!(step_toward(180, 0), 179);
    }

    #[test]
    fn test_new_propagates_config_errors() {
        let bus = MockBus::new();
        let result = ArmState::new(&ArmConfig::with_joints(Vec::new()), Box::new(bus));
        assert!(matches!(result, Err(ConfigError::NoJoints)));
    }
}
