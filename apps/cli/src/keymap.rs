//! 按键到命令令牌的映射
//!
//! - 原始按键模式：每个按键事件映射为一个令牌（[`map_key_event`]）
//! - 行输入模式：每个以空白分隔的单词是一个按键，`up up w` 等价于连续按三次键
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

pub const QUIT: &str = "quit";

/// 把一个终端按键事件映射为命令令牌
///
/// 方向键映射为 `up` / `down` / `left` / `right`，Esc、Ctrl+C、Ctrl+D 映射为 `quit`，
/// 字符键按 [`map_key`] 处理。松开事件和其它功能键返回 `None`。
pub fn map_key_event(event: &KeyEvent) -> Option<String> {
    if event.kind == KeyEventKind::Release {
        return None;
    }

    // 原始模式下 Ctrl+C 不会产生 SIGINT
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        return match event.code {
            KeyCode::Char('c' | 'd') => Some(QUIT.to_string()),
            _ => None,
        };
    }

    match event.code {
        KeyCode::Up => Some("up".to_string()),
        KeyCode::Down => Some("down".to_string()),
        KeyCode::Left => Some("left".to_string()),
        KeyCode::Right => Some("right".to_string()),
        KeyCode::Esc => Some(QUIT.to_string()),
        KeyCode::Char(c) => Some(map_key(c.encode_utf8(&mut [0; 4]))),
        _ => None,
    }
}

/// 把一个按键单词映射为命令令牌
///
/// `?` → `help`，`esc` / `exit` / `quit` → `quit`，其它原样透传
/// （未知令牌由调度器忽略）。
pub fn map_key(word: &str) -> String {
    match word {
        "?" => "help".to_string(),
        "esc" | "exit" | "quit" => QUIT.to_string(),
        "ESC" | "EXIT" | "QUIT" => QUIT.to_string(),
        // 方向键名称不区分大小写
        other if is_arrow(other) => other.to_ascii_lowercase(),
        other => other.to_string(),
    }
}

fn is_arrow(word: &str) -> bool {
    ["up", "down", "left", "right"]
        .iter()
        .any(|arrow| word.eq_ignore_ascii_case(arrow))
}

/// 把一行输入拆分为命令令牌
pub fn map_line(line: &str) -> Vec<String> {
    line.split_whitespace().map(map_key).collect()
}
