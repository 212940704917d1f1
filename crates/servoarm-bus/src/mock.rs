//! Mock 后端
//!
//! 不访问任何硬件，把每次写入记录到共享日志中。
//! 日志句柄 [`BusLog`] 可以在总线被移入 `ArmState` 之后继续读取。

use crate::{BusError, ServoBus, ServoChannel, check_angle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 一次角度写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWrite {
    pub channel: u8,
    pub angle: u8,
}

#[derive(Debug, Default)]
struct Shared {
    writes: Mutex<Vec<BusWrite>>,
    attached: Mutex<Vec<u8>>,
    failing: AtomicBool,
    closed: AtomicBool,
}

/// 共享写入日志
#[derive(Debug, Clone, Default)]
pub struct BusLog {
    shared: Arc<Shared>,
}

impl BusLog {
    /// 所有写入（按时间顺序）
    pub fn writes(&self) -> Vec<BusWrite> {
        self.shared.writes.lock().clone()
    }

    /// 写入次数
    pub fn len(&self) -> usize {
        self.shared.writes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 某个通道最后一次写入的角度
    pub fn last_angle(&self, channel: u8) -> Option<u8> {
        self.shared
            .writes
            .lock()
            .iter()
            .rev()
            .find(|w| w.channel == channel)
            .map(|w| w.angle)
    }

    /// 已配置的通道（按 attach 顺序）
    pub fn attached(&self) -> Vec<u8> {
        self.shared.attached.lock().clone()
    }

    /// 清空写入日志
    pub fn clear(&self) {
        self.shared.writes.lock().clear();
    }

    /// 模拟写入失败（例如串口被拔出）
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Relaxed)
    }
}

/// 内存舵机总线
#[derive(Debug, Default)]
pub struct MockBus {
    log: BusLog,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取日志句柄
    pub fn log(&self) -> BusLog {
        self.log.clone()
    }
}

impl ServoBus for MockBus {
    fn attach(&mut self, channel: u8) -> Result<ServoChannel, BusError> {
        let mut attached = self.log.shared.attached.lock();
        if !attached.contains(&channel) {
            attached.push(channel);
        }
        Ok(ServoChannel::new(channel))
    }

    fn write_angle(&mut self, servo: ServoChannel, angle: u8) -> Result<(), BusError> {
        let shared = &self.log.shared;
        if shared.closed.load(Ordering::Relaxed) {
            return Err(BusError::Closed);
        }
        let angle = check_angle(angle)?;
        if !shared.attached.lock().contains(&servo.id()) {
            return Err(BusError::NotAttached { channel: servo.id() });
        }
        if shared.failing.load(Ordering::Relaxed) {
            return Err(BusError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock bus write failure",
            )));
        }

        shared.writes.lock().push(BusWrite {
            channel: servo.id(),
            angle,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), BusError> {
        self.log.shared.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}
