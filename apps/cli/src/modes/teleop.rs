//! 键盘遥操作模式
//!
//! 专用输入线程把按键令牌送入 crossbeam 通道；
//! 主线程用 `select!` 同时等待用户输入、后台运行结果和 Ctrl+C。
//! 回放 / 回零在控制器的后台线程中执行，运行期间输入照常处理。
//!
//! 输入有两种方式：
//! - [`InputMode::Keys`]：终端原始模式（crossterm），每次按键立即生效
//! - [`InputMode::Lines`]：rustyline 行编辑，回车提交，一行可以包含多个按键

use crate::keymap::{self, QUIT};
use crate::render;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use crossterm::event::{self, Event};
use crossterm::terminal;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use servoarm_control::{ArmController, Outcome};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// 原始模式下检查退出标志的间隔
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 输入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// 直接读取按键（需要终端）
    Keys,
    /// 按行读取
    Lines,
}

/// 遥操作输入（专用输入线程）
pub struct TeleopInput {
    token_rx: Receiver<String>,
    stop: Arc<AtomicBool>,
    /// 只有原始按键线程会在退出时被等待；行编辑线程阻塞在 readline 上
    key_thread: Option<thread::JoinHandle<Result<()>>>,
}

impl TeleopInput {
    /// 启动输入线程
    ///
    /// Esc、Ctrl+C、Ctrl+D（EOF）都转换为 `quit` 令牌。
    pub fn spawn(mode: InputMode) -> Result<Self> {
        let (token_tx, token_rx) = bounded::<String>(32);
        let stop = Arc::new(AtomicBool::new(false));
        let builder = thread::Builder::new().name("servoarm-input".into());

        let key_thread = match mode {
            InputMode::Keys => {
                let stop = stop.clone();
                let handle = builder
                    .spawn(move || read_keys(&token_tx, &stop))
                    .context("启动输入线程失败")?;
                Some(handle)
            },
            InputMode::Lines => {
                let _detached = builder
                    .spawn(move || read_lines(&token_tx))
                    .context("启动输入线程失败")?;
                None
            },
        };

        Ok(Self {
            token_rx,
            stop,
            key_thread,
        })
    }

    pub fn tokens(&self) -> &Receiver<String> {
        &self.token_rx
    }
}

impl Drop for TeleopInput {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // 等待按键线程恢复终端模式
        if let Some(handle) = self.key_thread.take() {
            match handle.join() {
                Ok(Ok(())) => {},
                Ok(Err(e)) => tracing::warn!("Input thread failed: {:#}", e),
                Err(_) => tracing::error!("Input thread panicked"),
            }
        }
    }
}

/// 终端原始模式，Drop 时恢复
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

fn read_keys(token_tx: &Sender<String>, stop: &AtomicBool) -> Result<()> {
    let _raw = RawMode::enable().context("无法进入终端原始模式（可使用 --line-input）")?;

    while !stop.load(Ordering::SeqCst) {
        if !event::poll(KEY_POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let Some(token) = keymap::map_key_event(&key) else {
            continue;
        };

        let quit = token == QUIT;
        // 不阻塞：退出时 Drop 需要等待本线程
        match token_tx.try_send(token) {
            Ok(()) => {},
            Err(TrySendError::Full(token)) => {
                tracing::debug!("Input queue full, dropping {:?}", token);
            },
            Err(TrySendError::Disconnected(_)) => break,
        }
        if quit {
            break;
        }
    }

    Ok(())
}

fn read_lines(token_tx: &Sender<String>) -> Result<()> {
    let mut rl =
        DefaultEditor::new().map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;

    loop {
        match rl.readline("servoarm> ") {
            Ok(line) => {
                let tokens = keymap::map_line(&line);
                if tokens.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.trim());

                let quit = tokens.iter().any(|t| t == QUIT);
                for token in tokens {
                    if token_tx.send(token).is_err() {
                        return Ok(()); // 主线程已退出
                    }
                }
                if quit {
                    break;
                }
            },

            Err(ReadlineError::Interrupted) => {
                println!("^C");
                let _ = token_tx.send(QUIT.to_string());
                break;
            },

            Err(ReadlineError::Eof) => {
                let _ = token_tx.send(QUIT.to_string());
                break;
            },

            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            },
        }
    }

    Ok(())
}

/// 统一使用 `\r\n` 换行：原始模式下 `\n` 不会回到行首
fn crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// 输出一段文本并换行（原始模式和普通模式下都能正确显示）
fn say(text: impl AsRef<str>) {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{}\r\n", crlf(text.as_ref()));
    let _ = out.flush();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// 运行遥操作循环，直到 `quit` / EOF / Ctrl+C
pub fn run_teleop(mut controller: ArmController, mode: InputMode) -> Result<()> {
    let (signal_tx, signal_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })
    .context("设置 Ctrl+C 处理器失败")?;

    println!("Servoarm CLI v{} - 键盘遥操作", env!("CARGO_PKG_VERSION"));
    println!("⏳ 归位到中位...");
    controller.park();
    println!();
    print!("{}", render::help_text(controller.config()));
    println!();
    if mode == InputMode::Keys {
        println!("⌨️  直接按键操作（? 帮助，Esc 退出）");
    }
    print_status(&controller);

    let input = TeleopInput::spawn(mode)?;
    let reports = controller.reports();

    loop {
        select! {
            recv(input.tokens()) -> msg => {
                // 输入线程异常退出时通道关闭
                let Ok(token) = msg else { break };
                if handle_token(&mut controller, &token) == Flow::Quit {
                    break;
                }
            },

            recv(reports) -> msg => {
                if let Ok(report) = msg {
                    controller.note_report(&report);
                    say(render::report_line(&report));
                    print_status(&controller);
                }
            },

            recv(signal_rx) -> _ => {
                say("🛑 收到 Ctrl+C，停止所有动作...");
                break;
            },
        }
    }

    // 先恢复终端模式再输出退出信息
    drop(input);
    controller.shutdown().context("关闭舵机连接失败")?;
    if let Some(action) = controller.status().last_action {
        tracing::info!("Last action: {}", action);
    }
    println!("👋 再见！");
    Ok(())
}

/// 执行一个令牌并打印结果
fn handle_token(controller: &mut ArmController, token: &str) -> Flow {
    match controller.dispatch_token(token) {
        Ok(Outcome::ShutdownRequested) => return Flow::Quit,
        Ok(Outcome::Help) => {
            say(render::help_text(controller.config()).trim_end());
            return Flow::Continue;
        },
        Ok(Outcome::Ignored) => {
            say(format!("💡 未知按键 '{}'，输入 '?' 查看帮助", token));
            return Flow::Continue;
        },
        Ok(Outcome::Moved { .. }) => {},
        Ok(outcome) => say(format!("✅ {}", outcome)),
        Err(e) => match e.rejection() {
            Some(rejection) => say(format!("⚠️  {}", rejection)),
            None => say(format!("❌ Error: {}", e)),
        },
    }

    print_status(controller);
    Flow::Continue
}

fn print_status(controller: &ArmController) {
    say(format!("📊 {}", render::status_line(&controller.status())));
}
