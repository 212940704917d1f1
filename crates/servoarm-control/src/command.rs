//! 逻辑命令
//!
//! 输入源已经把原始按键解码成命令令牌（`"up"`、`"1"`、`"r"` ...），
//! 本模块只负责把令牌映射为 [`Command`]。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 点动按键（相对运动）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JogKey {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "down")]
    Down,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "w")]
    W,
    #[serde(rename = "s")]
    S,
    #[serde(rename = "t")]
    T,
    #[serde(rename = "y")]
    Y,
    #[serde(rename = "a")]
    A,
    #[serde(rename = "d")]
    D,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
}

impl JogKey {
    pub const ALL: [JogKey; 12] = [
        JogKey::Up,
        JogKey::Down,
        JogKey::Left,
        JogKey::Right,
        JogKey::W,
        JogKey::S,
        JogKey::T,
        JogKey::Y,
        JogKey::A,
        JogKey::D,
        JogKey::One,
        JogKey::Two,
    ];

    /// 对应的命令令牌
    pub fn token(self) -> &'static str {
        match self {
            JogKey::Up => "up",
            JogKey::Down => "down",
            JogKey::Left => "left",
            JogKey::Right => "right",
            JogKey::W => "w",
            JogKey::S => "s",
            JogKey::T => "t",
            JogKey::Y => "y",
            JogKey::A => "a",
            JogKey::D => "d",
            JogKey::One => "1",
            JogKey::Two => "2",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.token() == token)
    }
}

impl fmt::Display for JogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// 调度器可执行的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 相对运动（步长由配置决定）
    Jog(JogKey),
    /// `r`
    StartRecording,
    /// `o`
    StopRecording,
    /// `p`
    Playback,
    /// `h`
    Home,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

impl Command {
    /// 解析命令令牌
    ///
    /// 未知令牌返回 `None`（调度器将其视为空操作）。
    pub fn parse(token: &str) -> Option<Self> {
        if let Some(key) = JogKey::from_token(token) {
            return Some(Command::Jog(key));
        }

        match token {
            "r" => Some(Command::StartRecording),
            "o" => Some(Command::StopRecording),
            "p" => Some(Command::Playback),
            "h" => Some(Command::Home),
            "help" => Some(Command::Help),
            "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}
