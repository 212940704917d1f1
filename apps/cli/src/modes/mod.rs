//! 运行模式
//!
//! 目前只有键盘遥操作模式

pub mod teleop;
