//! tarn-log - 结构化日志系统
//!
//! 为 Tarn 编译器与运行时设计的日志系统，特点：
//! - **显式传递**：无全局 logger，组件通过 `Arc<Logger>` 接收
//! - **按阶段过滤**：`tarn::lexer` / `tarn::compiler` / `tarn::vm` / `tarn::thread` 可单独调级
//! - **惰性格式化**：级别未启用时不格式化消息
//! - **崩溃转储**：环形缓冲区保留最后 N 条记录
//!
//! # 快速开始
//!
//! ```ignore
//! use tarn_log::{LogConfig, debug};
//!
//! let (logger, ring) = LogConfig::dev().init();
//! debug!(logger, "engine ready");
//! debug!(target: "tarn::vm", logger, "pc={}", 3);
//! ```

mod config;
mod logger;
mod macros;
mod record;
mod ring_buffer;

pub use config::{LogConfig, OutputConfig};
pub use logger::{FileSink, LogSink, Logger, StderrSink, StdoutSink};
pub use record::{Level, Record};
pub use ring_buffer::{LogRingBuffer, RingBufferStats};

/// 日志结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// 日志系统错误类型
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 无法识别的级别名
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),
    /// IO 错误（文件 sink）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
