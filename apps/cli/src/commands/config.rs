//! 配置管理命令
//!
//! 查看、初始化和校验机械臂配置文件（关节、量程、中位、按键绑定、节拍）。

use crate::profile::{Profile, ProfileSource, default_config_path};
use anyhow::{Context, Result};
use clap::Subcommand;
use servoarm_control::ArmConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 打印配置文件路径
    Path,

    /// 写入参考配置（7 舵机桌面机械臂）
    Init {
        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },

    /// 校验配置
    Check,
}

impl ConfigCommand {
    /// `explicit` 是全局 `--config` 参数
    pub fn execute(self, explicit: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => Self::show_(explicit),
            ConfigCommand::Path => Self::path_(explicit),
            ConfigCommand::Init { force } => Self::init_(&target_path(explicit)?, force),
            ConfigCommand::Check => Self::check_(explicit),
        }
    }

    fn show_(explicit: Option<&Path>) -> Result<()> {
        let profile = Profile::resolve(explicit)?;
        println!("# {}", profile.source);
        print!("{}", profile.config.to_toml_string()?);
        Ok(())
    }

    fn path_(explicit: Option<&Path>) -> Result<()> {
        let path = target_path(explicit)?;
        let state = if path.exists() { "" } else { " (未创建)" };
        println!("{}{}", path.display(), state);
        Ok(())
    }

    fn init_(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        ArmConfig::reference()
            .save(path)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;

        println!("✅ 已写入参考配置: {}", path.display());
        Ok(())
    }

    fn check_(explicit: Option<&Path>) -> Result<()> {
        let profile = Profile::resolve(explicit)?;
        let config = &profile.config;

        println!("配置: {}", profile.source);
        println!("  步长: {}°", config.step);
        println!("  回放间隔: {} ms", config.playback_interval_ms);
        println!("  回零间隔: {} ms", config.homing_interval_ms);
        println!("  关节:");
        for joint in &config.joints {
            println!(
                "    {:<16} 通道 {:>3}  范围 [{:>3}, {:>3}]  中位 {:>3}",
                joint.name, joint.channel, joint.min_angle, joint.max_angle, joint.neutral_angle
            );
        }
        println!("  按键绑定: {}", config.bindings.len());

        if profile.source == ProfileSource::Reference {
            println!("💡 未找到配置文件，使用内置参考配置（'config init' 可写出一份）");
        }
        println!("✅ 配置有效");
        Ok(())
    }
}

fn target_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_path(),
    }
}
