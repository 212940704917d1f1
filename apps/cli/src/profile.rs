//! 机械臂配置文件解析
//!
//! 查找顺序：`--config <path>` → `$XDG_CONFIG_HOME/servoarm/arm.toml` → 内置参考配置。

use anyhow::{Context, Result};
use servoarm_control::ArmConfig;
use std::fmt;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "servoarm";
const CONFIG_FILE: &str = "arm.toml";

/// 默认配置文件路径
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}

/// 配置来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    /// 从文件加载
    File(PathBuf),
    /// 内置参考配置（7 舵机桌面机械臂）
    Reference,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileSource::File(path) => write!(f, "{}", path.display()),
            ProfileSource::Reference => write!(f, "built-in reference profile"),
        }
    }
}

/// 已解析的配置
#[derive(Debug, Clone)]
pub struct Profile {
    pub config: ArmConfig,
    pub source: ProfileSource,
}

impl Profile {
    /// 按查找顺序加载配置
    ///
    /// 显式指定的文件必须存在；默认路径不存在时回退到参考配置。
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = default_config_path()?;
                Self::resolve_from(&path)
            },
        }
    }

    /// 文件存在则加载，否则使用参考配置
    pub fn resolve_from(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No profile at {}, using reference profile", path.display());
            Ok(Self {
                config: ArmConfig::reference(),
                source: ProfileSource::Reference,
            })
        }
    }

    /// 加载并校验配置文件
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = ArmConfig::load(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display()))?;

        tracing::info!("Loaded arm profile from {}", path.display());
        Ok(Self {
            config,
            source: ProfileSource::File(path.to_path_buf()),
        })
    }
}
