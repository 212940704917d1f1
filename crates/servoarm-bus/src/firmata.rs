//! Firmata 串口后端
//!
//! 与运行 StandardFirmata / StandardFirmataPlus 的 Arduino 通信。
//! 只实现舵机控制需要的三条消息：
//!
//! | 消息              | 字节                                        | 用途              |
//! |-------------------|---------------------------------------------|-------------------|
//! | `SERVO_CONFIG`    | `F0 70 pin minL minH maxL maxH F7`          | 将引脚配置为舵机  |
//! | `ANALOG_MESSAGE`  | `E0|pin lsb msb`                            | 写角度（pin < 16）|
//! | `EXTENDED_ANALOG` | `F0 6F pin lsb msb F7`                      | 写角度（pin ≥ 16）|
//!
//! 所有数据字节都是 7 位的（Firmata 约定）。

use crate::{BusError, ServoBus, ServoChannel, check_angle};
use std::io::Write;
use std::time::Duration;

const START_SYSEX: u8 = 0xF0;
const END_SYSEX: u8 = 0xF7;
const ANALOG_MESSAGE: u8 = 0xE0;
const SERVO_CONFIG: u8 = 0x70;
const EXTENDED_ANALOG: u8 = 0x6F;

/// Firmata 引脚号上限（7 位数据字节）
const MAX_PIN: u8 = 0x7F;

/// StandardFirmata 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Firmata 后端配置
#[derive(Debug, Clone)]
pub struct FirmataConfig {
    /// 舵机最小脉宽（µs）
    pub min_pulse_us: u16,
    /// 舵机最大脉宽（µs）
    pub max_pulse_us: u16,
    /// 打开串口后等待控制板复位的时间
    ///
    /// 打开串口会触发 Arduino 自动复位，在此期间发送的字节会丢失。
    pub reset_delay: Duration,
    /// 串口写超时
    pub write_timeout: Duration,
}

impl Default for FirmataConfig {
    fn default() -> Self {
        Self {
            min_pulse_us: 544,
            max_pulse_us: 2400,
            reset_delay: Duration::from_secs(2),
            write_timeout: Duration::from_millis(100),
        }
    }
}

/// Firmata 舵机总线
///
/// 泛型参数 `W` 是底层字节流；真实硬件上是 `serialport` 打开的串口，
/// 测试中可以是 `Vec<u8>`。
pub struct FirmataBus<W: Write + Send = Box<dyn serialport::SerialPort>> {
    writer: Option<W>,
    config: FirmataConfig,
    attached: [bool; MAX_PIN as usize + 1],
}

impl FirmataBus {
    /// 打开串口并等待控制板复位
    pub fn connect(path: &str, baud_rate: u32) -> Result<Self, BusError> {
        Self::connect_with(path, baud_rate, FirmataConfig::default())
    }

    /// 使用自定义配置打开串口
    pub fn connect_with(
        path: &str,
        baud_rate: u32,
        config: FirmataConfig,
    ) -> Result<Self, BusError> {
        tracing::info!("Opening Firmata link on {} @ {} baud", path, baud_rate);

        let port = serialport::new(path, baud_rate)
            .timeout(config.write_timeout)
            .open()
            .map_err(|e| BusError::Open {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        if !config.reset_delay.is_zero() {
            tracing::debug!("Waiting {:?} for board reset", config.reset_delay);
            std::thread::sleep(config.reset_delay);
        }

        tracing::info!("Firmata link on {} established", path);
        Ok(Self::from_writer(port, config))
    }
}

impl<W: Write + Send> FirmataBus<W> {
    /// 基于任意字节流构造（不做复位等待）
    pub fn from_writer(writer: W, config: FirmataConfig) -> Self {
        Self {
            writer: Some(writer),
            config,
            attached: [false; MAX_PIN as usize + 1],
        }
    }

    /// 取回底层字节流（已关闭时返回 `None`）
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        let writer = self.writer.as_mut().ok_or(BusError::Closed)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> ServoBus for FirmataBus<W> {
    fn attach(&mut self, channel: u8) -> Result<ServoChannel, BusError> {
        if channel > MAX_PIN {
            return Err(BusError::UnknownChannel { channel });
        }

        let frame = encode_servo_config(channel, self.config.min_pulse_us, self.config.max_pulse_us);
        self.send(&frame)?;
        self.attached[channel as usize] = true;

        tracing::debug!("Configured pin {} as servo", channel);
        Ok(ServoChannel::new(channel))
    }

    fn write_angle(&mut self, servo: ServoChannel, angle: u8) -> Result<(), BusError> {
        let angle = check_angle(angle)?;
        let pin = servo.id();
        if pin > MAX_PIN || !self.attached[pin as usize] {
            return Err(BusError::NotAttached { channel: pin });
        }

        if pin < 16 {
            self.send(&encode_analog(pin, angle))
        } else {
            self.send(&encode_extended_analog(pin, angle))
        }
    }

    fn close(&mut self) -> Result<(), BusError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            tracing::info!("Firmata link closed");
        }
        Ok(())
    }
}

/// 拆分为两个 7 位字节（LSB 在前）
fn two_bytes(value: u16) -> [u8; 2] {
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

fn encode_servo_config(pin: u8, min_pulse: u16, max_pulse: u16) -> [u8; 8] {
    let [min_lsb, min_msb] = two_bytes(min_pulse);
    let [max_lsb, max_msb] = two_bytes(max_pulse);
    [
        START_SYSEX,
        SERVO_CONFIG,
        pin,
        min_lsb,
        min_msb,
        max_lsb,
        max_msb,
        END_SYSEX,
    ]
}

fn encode_analog(pin: u8, value: u8) -> [u8; 3] {
    let [lsb, msb] = two_bytes(value as u16);
    [ANALOG_MESSAGE | (pin & 0x0F), lsb, msb]
}

fn encode_extended_analog(pin: u8, value: u8) -> [u8; 6] {
    let [lsb, msb] = two_bytes(value as u16);
    [START_SYSEX, EXTENDED_ANALOG, pin, lsb, msb, END_SYSEX]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bus() -> FirmataBus<Vec<u8>> {
        FirmataBus::from_writer(Vec::new(), FirmataConfig::default())
    }

    #[test]
    fn test_servo_config_frame() {
        // 544 = 0b100_0100000 -> [0x20, 0x04]; 2400 -> [0x60, 0x12]
        let frame = encode_servo_config(9, 544, 2400);
        assert_eq!(frame, [0xF0, 0x70, 9, 0x20, 0x04, 0x60, 0x12, 0xF7]);
    }

    #[test]
    fn test_analog_frame() {
        assert_eq!(encode_analog(11, 90), [0xEB, 90, 0]);
        // 180 超过 7 位
        assert_eq!(encode_analog(3, 180), [0xE3, 0x34, 0x01]);
    }

    #[test]
    fn test_attach_then_write() {
        let mut bus = test_bus();
        let servo = bus.attach(10).unwrap();
        bus.write_angle(servo, 180).unwrap();

        let bytes = bus.into_inner().unwrap();
        assert_eq!(
            bytes,
            vec![0xF0, 0x70, 10, 0x20, 0x04, 0x60, 0x12, 0xF7, 0xEA, 0x34, 0x01]
        );
    }

    #[test]
    fn test_high_pin_uses_extended_analog() {
        let mut bus = test_bus();
        let servo = bus.attach(20).unwrap();
        bus.write_angle(servo, 45).unwrap();

        let bytes = bus.into_inner().unwrap();
        assert_eq!(&bytes[8..], &[0xF0, 0x6F, 20, 45, 0, 0xF7]);
    }

    #[test]
    fn test_write_requires_attach() {
        let mut bus = test_bus();
        let result = bus.write_angle(ServoChannel::new(5), 90);
        assert!(matches!(result, Err(BusError::NotAttached { channel: 5 })));
    }

    #[test]
    fn test_write_rejects_out_of_range_angle() {
        let mut bus = test_bus();
        let servo = bus.attach(6).unwrap();
        assert!(matches!(
            bus.write_angle(servo, 181),
            Err(BusError::AngleOutOfRange { angle: 181 })
        ));
    }

    #[test]
    fn test_attach_rejects_unaddressable_pin() {
        let mut bus = test_bus();
        assert!(matches!(
            bus.attach(200),
            Err(BusError::UnknownChannel { channel: 200 })
        ));
    }

    #[test]
    fn test_write_after_close() {
        let mut bus = test_bus();
        let servo = bus.attach(4).unwrap();
        bus.close().unwrap();
        assert!(matches!(bus.write_angle(servo, 80), Err(BusError::Closed)));
        // 重复关闭是空操作
        bus.close().unwrap();
    }
}
