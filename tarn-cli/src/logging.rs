//! CLI 日志系统初始化
//!
//! 引擎通过 tarn-log 记录；这里的 [`TracingSink`] 把每条记录转成 `tracing` 事件，
//! 再由 `tracing-subscriber` 分阶段过滤并格式化输出。

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::ValueEnum;
use tarn_config::Phase;
use tarn_log::{Level, LogSink, Logger, Record};
use tracing_subscriber::{
    filter::Targets, fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
    Registry,
};

use crate::config::{tracing_level, LogConfig};
use crate::CliError;

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

/// 把 tarn-log 记录转发为 tracing 事件
///
/// tracing 的 target 和级别必须是编译期常量，所以按已知阶段展开。
pub struct TracingSink;

macro_rules! forward {
    ($target:literal, $record:expr) => {{
        let r = $record;
        match r.level {
            Level::Trace => tracing::trace!(target: $target, thread = ?r.thread, origin = r.target, "{}", r.message),
            Level::Debug => tracing::debug!(target: $target, thread = ?r.thread, origin = r.target, "{}", r.message),
            Level::Info => tracing::info!(target: $target, thread = ?r.thread, origin = r.target, "{}", r.message),
            Level::Warn => tracing::warn!(target: $target, thread = ?r.thread, origin = r.target, "{}", r.message),
            Level::Error => tracing::error!(target: $target, thread = ?r.thread, origin = r.target, "{}", r.message),
        }
    }};
}

impl LogSink for TracingSink {
    fn write(&self, record: &Record) {
        match record.target {
            "tarn::lexer" => forward!("tarn::lexer", record),
            "tarn::compiler" => forward!("tarn::compiler", record),
            "tarn::vm" => forward!("tarn::vm", record),
            "tarn::thread" => forward!("tarn::thread", record),
            "tarn::api" => forward!("tarn::api", record),
            _ => forward!("tarn", record),
        }
    }
}

/// 构建交给引擎的 logger：放行到最详细的阶段级别，按阶段覆盖
pub fn engine_logger(log_config: &LogConfig) -> Arc<Logger> {
    let mut logger = Logger::new(log_config.global).with_sink(TracingSink);
    for phase in Phase::all() {
        let level = log_config.level_for(phase.target());
        if level != log_config.global {
            logger = logger.with_target_level(phase.target(), level);
        }
    }
    logger
}

/// 使用指定格式和日志配置初始化日志系统
///
/// 指定文件时同时输出到 stderr 和文件。
pub fn init_with_file(
    log_config: &LogConfig,
    format: LogFormat,
    file: Option<&Path>,
) -> Result<(), CliError> {
    let global = tracing_level(log_config.global);
    let mut targets = Targets::new()
        .with_default(global)
        .with_target("tarn::api", global)
        .with_target("tarn::cli", global);
    for phase in Phase::all() {
        targets = targets.with_target(
            phase.target(),
            tracing_level(log_config.level_for(phase.target())),
        );
    }

    let mut layers = vec![create_format_layer(format, io::stderr, true)
        .with_filter(targets.clone())
        .boxed()];

    if let Some(path) = file {
        let file_handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| CliError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        layers.push(
            create_format_layer(format, Mutex::new(file_handle), false)
                .with_filter(targets)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}

/// Create formatter layer based on format
fn create_format_layer<W>(
    format: LogFormat,
    make_writer: W,
    ansi: bool,
) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_logger_levels() {
        let mut cfg = LogConfig::default();
        cfg.vm = Some(Level::Trace);
        let logger = engine_logger(&cfg);
        assert!(logger.is_enabled_for("tarn::vm", Level::Trace));
        assert!(!logger.is_enabled_for("tarn::compiler", Level::Debug));
        assert!(logger.is_enabled_for("tarn::compiler", Level::Warn));
    }

    #[test]
    fn test_sink_accepts_every_target() {
        // 没有安装 subscriber 时事件被丢弃，这里只确认所有分支都能走通
        let sink = TracingSink;
        for target in ["tarn::lexer", "tarn::vm", "tarn::api", "other"] {
            sink.write(&Record::new(Level::Info, target, "hello"));
        }
    }
}
