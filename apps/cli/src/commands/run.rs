//! 遥操作命令
//!
//! 连接控制板（或 mock 总线）、归位到中位，然后进入键盘遥操作循环。

use crate::modes::teleop::{InputMode, run_teleop};
use crate::profile::Profile;
use anyhow::{Context, Result};
use clap::Args;
use servoarm_bus::firmata::DEFAULT_BAUD_RATE;
use servoarm_bus::{FirmataBus, FirmataConfig, MockBus, ServoBus};
use servoarm_control::ArmController;
use std::io::{self, IsTerminal};
use std::time::Duration;

/// 默认串口设备（Arduino Uno 在 Linux 上的常见名称）
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// 遥操作参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 串口设备
    #[arg(short, long, default_value = DEFAULT_PORT)]
    pub port: String,

    /// 波特率（StandardFirmata 默认 57600）
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// 打开串口后等待控制板复位的时间（ms）
    #[arg(long, default_value_t = 2000)]
    pub reset_ms: u64,

    /// 不连接硬件，所有写入进入 mock 总线
    #[arg(long)]
    pub dry_run: bool,

    /// 按行读取输入（回车提交），而不是直接读取按键
    #[arg(long)]
    pub line_input: bool,
}

impl RunCommand {
    pub fn execute(self, profile: Profile) -> Result<()> {
        println!("📄 配置: {}", profile.source);

        let bus = self.open_bus()?;
        let controller = ArmController::new(profile.config, bus).context("初始化机械臂失败")?;

        run_teleop(controller, self.input_mode())
    }

    /// 标准输入不是终端时（管道、脚本）只能按行读取
    fn input_mode(&self) -> InputMode {
        if self.line_input || !io::stdin().is_terminal() {
            InputMode::Lines
        } else {
            InputMode::Keys
        }
    }

    fn open_bus(&self) -> Result<Box<dyn ServoBus>> {
        if self.dry_run {
            println!("🧪 Dry-run 模式：不连接硬件");
            return Ok(Box::new(MockBus::new()));
        }

        println!(
            "⏳ 连接控制板 {} @ {} baud（等待复位）...",
            self.port, self.baud
        );
        let config = FirmataConfig {
            reset_delay: Duration::from_millis(self.reset_ms),
            ..FirmataConfig::default()
        };
        let bus = FirmataBus::connect_with(&self.port, self.baud, config)
            .with_context(|| format!("无法连接控制板 {}", self.port))?;
        println!("✅ 已连接");

        Ok(Box::new(bus))
    }
}
