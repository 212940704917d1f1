//! # Servoarm Bus
//!
//! 舵机传输抽象层，向上层提供统一的"按通道写角度"接口。
//!
//! ## 后端
//!
//! - [`firmata::FirmataBus`]：通过串口与运行 StandardFirmata 的控制板通信（feature `firmata`）
//! - [`mock::MockBus`]：内存后端，记录所有写入（feature `mock`）
//!
//! 上层（`servoarm-control`）只依赖 [`ServoBus`] trait，从不直接接触线协议。

use thiserror::Error;

#[cfg(feature = "firmata")]
pub mod firmata;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "firmata")]
pub use firmata::{FirmataBus, FirmataConfig};

#[cfg(feature = "mock")]
pub use mock::{BusLog, BusWrite, MockBus};

/// 传输边界上允许的最大角度（度）
pub const SERVO_MAX_ANGLE: u8 = 180;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    /// 打开设备失败（串口不存在、权限不足等）
    #[error("Failed to open '{path}': {message}")]
    Open { path: String, message: String },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 角度超出 0..=180
    #[error("Angle {angle} out of range (0..=180)")]
    AngleOutOfRange { angle: u8 },

    /// 通道号无法被后端寻址
    #[error("Channel {channel} is not addressable")]
    UnknownChannel { channel: u8 },

    /// 通道未通过 `attach()` 配置
    #[error("Channel {channel} is not attached")]
    NotAttached { channel: u8 },

    /// 连接已关闭
    #[error("Bus closed")]
    Closed,
}

/// 已配置的舵机通道引用
///
/// 只能通过 [`ServoBus::attach`] 获得（或由后端实现者构造）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServoChannel(u8);

impl ServoChannel {
    /// 构造通道引用（供 [`ServoBus`] 实现使用）
    pub const fn new(channel: u8) -> Self {
        Self(channel)
    }

    /// 通道号（Firmata 中即数字引脚号）
    pub const fn id(self) -> u8 {
        self.0
    }
}

/// 舵机传输接口
///
/// 所有方法都应该很快返回；调用方（ArmState）在持锁状态下调用 `write_angle`。
pub trait ServoBus: Send {
    /// 将通道配置为舵机输出
    fn attach(&mut self, channel: u8) -> Result<ServoChannel, BusError>;

    /// 写入角度（0..=180 度）
    fn write_angle(&mut self, servo: ServoChannel, angle: u8) -> Result<(), BusError>;

    /// 关闭连接
    ///
    /// 默认为空操作。关闭后的写入应返回 [`BusError::Closed`]。
    fn close(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

impl<B: ServoBus + ?Sized> ServoBus for Box<B> {
    fn attach(&mut self, channel: u8) -> Result<ServoChannel, BusError> {
        (**self).attach(channel)
    }

    fn write_angle(&mut self, servo: ServoChannel, angle: u8) -> Result<(), BusError> {
        (**self).write_angle(servo, angle)
    }

    fn close(&mut self) -> Result<(), BusError> {
        (**self).close()
    }
}

/// 校验传输边界上的角度
pub fn check_angle(angle: u8) -> Result<u8, BusError> {
    if angle > SERVO_MAX_ANGLE {
        return Err(BusError::AngleOutOfRange { angle });
    }
    Ok(angle)
}
