//! # Servoarm CLI
//!
//! 舵机机械臂的键盘遥操作与轨迹回放工具。
//!
//! ## 遥操作
//!
//! ```bash
//! # 连接 Arduino（StandardFirmataPlus），归位后进入遥操作
//! servoarm-cli run --port /dev/ttyACM0
//!
//! # 不连接硬件
//! servoarm-cli run --dry-run
//! ```
//!
//! 默认直接读取按键（方向键、字母键立即生效，Esc 退出）。
//! `--line-input` 改为按行输入：
//!
//! ```text
//! servoarm> r          开始录制
//! servoarm> up up w    点动（每个按键记录一个快照）
//! servoarm> o          停止录制
//! servoarm> h          回到中位
//! servoarm> p          回放
//! servoarm> esc        退出
//! ```
//!
//! ## 配置
//!
//! ```bash
//! servoarm-cli config init     # 写出参考配置到 ~/.config/servoarm/arm.toml
//! servoarm-cli config check
//! servoarm-cli --config my-arm.toml run
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod keymap;
mod modes;
mod profile;
mod render;

use commands::{ConfigCommand, RunCommand};
use profile::Profile;

/// Servoarm CLI - 舵机机械臂遥操作工具
#[derive(Parser, Debug)]
#[command(name = "servoarm-cli")]
#[command(about = "Keyboard teleoperation and trajectory replay for hobby servo arms", long_about = None)]
#[command(version)]
struct Cli {
    /// 机械臂配置文件（默认 $XDG_CONFIG_HOME/servoarm/arm.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动键盘遥操作
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("servoarm_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => {
            let profile = Profile::resolve(cli.config.as_deref())?;
            args.execute(profile)
        },

        Commands::Config(cmd) => cmd.execute(cli.config.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["servoarm-cli", "config", "show", "--config", "arm.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("arm.toml")));
        assert!(matches!(cli.command, Commands::Config(ConfigCommand::Show)));
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["servoarm-cli", "run", "--dry-run", "-b", "115200"]);
        match cli.command {
            Commands::Run { args } => {
                assert!(args.dry_run);
                assert_eq!(args.baud, 115_200);
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
