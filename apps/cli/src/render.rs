//! 终端输出：状态行、帮助文本、运行结果

use servoarm_control::{ArmConfig, Direction, JogKey, RunReport, StatusReport};
use std::fmt::Write;

/// 关节显示名：去掉 `_N` 编号后缀，首字母大写，下划线换成空格
///
/// `base_1` → `Base`，`gripper_rotate` → `Gripper rotate`
fn joint_label(name: &str) -> String {
    let stem = match name.rsplit_once('_') {
        Some((stem, suffix)) if !stem.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => {
            stem
        },
        _ => name,
    };

    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>().replace('_', " "),
        None => String::new(),
    }
}

/// 状态行，例如 `Base: 180/0 | Shoulder: 175 | ... | REC: ON | Points: 3`
///
/// 相邻且显示名相同的关节（差动底座）合并为 `a/b`。
pub fn status_line(status: &StatusReport) -> String {
    let mut groups: Vec<(String, Vec<u8>)> = Vec::new();
    for joint in &status.joints {
        let label = joint_label(&joint.name);
        match groups.last_mut() {
            Some((last, angles)) if *last == label => angles.push(joint.angle),
            _ => groups.push((label, vec![joint.angle])),
        }
    }

    let mut line = String::new();
    for (label, angles) in &groups {
        let angles: Vec<String> = angles.iter().map(u8::to_string).collect();
        let _ = write!(line, "{}: {} | ", label, angles.join("/"));
    }
    let _ = write!(
        line,
        "REC: {} | Points: {}",
        if status.recording { "ON" } else { "OFF" },
        status.points
    );
    if let Some(kind) = status.active_run {
        let _ = write!(line, " | ▶ {}", kind);
    }
    line
}

/// 运行结果（带状态图标）
pub fn report_line(report: &RunReport) -> String {
    let icon = match report {
        RunReport::PlaybackFinished { .. } | RunReport::HomingFinished { .. } => "✅",
        RunReport::PlaybackInterrupted { .. } | RunReport::HomingInterrupted { .. } => "⚠️ ",
        RunReport::Failed { .. } => "❌",
    };
    format!("{} {}", icon, report)
}

/// 帮助文本：列出所有按键绑定和控制键
pub fn help_text(config: &ArmConfig) -> String {
    let mut text = String::from("按键:\n");

    for key in JogKey::ALL {
        let moves: Vec<String> = config
            .bindings
            .iter()
            .filter(|b| b.key == key)
            .map(|b| {
                let sign = match b.direction {
                    Direction::Increase => '+',
                    Direction::Decrease => '-',
                };
                format!("{} {}{}", b.joint, sign, config.step)
            })
            .collect();
        if !moves.is_empty() {
            let _ = writeln!(text, "  {:<8} {}", key.token(), moves.join(", "));
        }
    }

    text.push('\n');
    text.push_str("控制:\n");
    text.push_str("  r        开始录制\n");
    text.push_str("  o        停止录制\n");
    text.push_str("  p        回放录制的轨迹\n");
    text.push_str("  h        回到中位\n");
    text.push_str("  ?        显示帮助\n");
    text.push_str("  esc      退出（也可以用 Ctrl+C / Ctrl+D）\n");
    text.push('\n');
    text.push_str("💡 按键立即生效；--line-input 模式下一行可以输入多个按键，例如 'up up w'\n");
    text
}
