//! 日志器实现

use crate::record::{Level, Record};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// 日志输出目标 trait
pub trait LogSink: Send + Sync {
    /// 写入日志记录
    fn write(&self, record: &Record);
}

/// 日志器：全局级别 + 按目标前缀覆盖 + 多个 sink
pub struct Logger {
    /// 当前全局级别（原子存储）
    level: AtomicU8,
    /// 目标前缀 → 级别，最长前缀优先
    overrides: RwLock<Vec<(&'static str, Level)>>,
    /// 输出目标列表
    sinks: Mutex<Vec<Box<dyn LogSink>>>,
}

impl Logger {
    /// 创建新的日志器
    pub fn new(level: Level) -> Arc<Self> {
        Arc::new(Logger {
            level: AtomicU8::new(level as u8),
            overrides: RwLock::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        })
    }

    /// 创建禁用日志的 no-op 日志器（Error 级别且没有任何 sink）
    pub fn noop() -> Arc<Self> {
        Self::new(Level::Error)
    }

    /// 添加输出目标（构建时链式调用）
    pub fn with_sink<S: LogSink + 'static>(self: Arc<Self>, sink: S) -> Arc<Self> {
        self.add_sink(sink);
        self
    }

    /// 为某个目标前缀设置单独级别
    pub fn with_target_level(self: Arc<Self>, target: &'static str, level: Level) -> Arc<Self> {
        self.set_target_level(target, level);
        self
    }

    /// 添加 sink
    pub fn add_sink<S: LogSink + 'static>(&self, sink: S) {
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        sinks.push(Box::new(sink));
    }

    /// 设置（或替换）目标前缀的级别
    pub fn set_target_level(&self, target: &'static str, level: Level) {
        let mut overrides = self.overrides.write().unwrap_or_else(|e| e.into_inner());
        overrides.retain(|(t, _)| *t != target);
        overrides.push((target, level));
        overrides.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// 动态设置全局级别
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// 获取当前全局级别
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed)).unwrap_or(Level::Info)
    }

    /// 某个目标实际生效的级别
    pub fn level_for(&self, target: &str) -> Level {
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        overrides
            .iter()
            .find(|(prefix, _)| target.starts_with(prefix))
            .map(|(_, level)| *level)
            .unwrap_or_else(|| self.level())
    }

    /// 检查全局级别是否启用
    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.level()
    }

    /// 检查某个目标的级别是否启用
    pub fn is_enabled_for(&self, target: &str, level: Level) -> bool {
        level >= self.level_for(target)
    }

    /// 记录日志
    #[inline(never)]
    pub fn log(&self, level: Level, target: &'static str, message: impl Into<String>) {
        if !self.is_enabled_for(target, level) {
            return;
        }
        self.emit(&Record::new(level, target, message));
    }

    /// 记录带引擎线程 ID 的日志
    pub fn log_thread(
        &self,
        level: Level,
        target: &'static str,
        thread: u64,
        message: impl Into<String>,
    ) {
        if !self.is_enabled_for(target, level) {
            return;
        }
        self.emit(&Record::new(level, target, message).with_thread(thread));
    }

    fn emit(&self, record: &Record) {
        let sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        for sink in sinks.iter() {
            sink.write(record);
        }
    }
}

// 为 Arc<Logger> 实现 LogSink，支持链式日志器
impl LogSink for Arc<Logger> {
    fn write(&self, record: &Record) {
        if self.is_enabled_for(record.target, record.level) {
            self.emit(record);
        }
    }
}

/// 标准输出 sink
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, record: &Record) {
        println!("{}", record.format());
    }
}

/// 标准错误 sink
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, record: &Record) {
        eprintln!("{}", record.format());
    }
}

/// 文件 sink（追加模式）
pub struct FileSink {
    file: Mutex<std::fs::File>,
}

impl FileSink {
    pub fn new(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(FileSink {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn write(&self, record: &Record) {
        use std::io::Write;
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", record.format());
        }
    }
}
