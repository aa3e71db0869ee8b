//! 日志配置
//!
//! 一键构建 logger：全局级别、按阶段覆盖、输出目标。

use crate::logger::{FileSink, StderrSink, StdoutSink};
use crate::{Level, LogRingBuffer, Logger};
use std::sync::Arc;

/// 日志输出目标配置
#[derive(Clone, Debug, PartialEq)]
pub enum OutputConfig {
    /// 输出到标准输出
    Stdout,
    /// 输出到标准错误
    Stderr,
    /// 输出到文件（路径）
    File(String),
    /// 输出到环形缓冲区（容量）
    RingBuffer(usize),
}

/// 日志配置
///
/// ```
/// use tarn_log::{LogConfig, Level};
///
/// let (logger, ring) = LogConfig::new(Level::Warn)
///     .with_phase_level("tarn::vm", Level::Trace)
///     .with_ring_buffer(1000)
///     .init();
/// assert!(ring.is_some());
/// assert!(logger.is_enabled_for("tarn::vm", Level::Trace));
/// ```
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// 全局级别
    pub level: Level,
    /// 阶段目标 → 级别
    pub phases: Vec<(&'static str, Level)>,
    /// 输出目标列表
    pub outputs: Vec<OutputConfig>,
}

impl LogConfig {
    /// 创建空配置（无输出）
    pub fn new(level: Level) -> Self {
        LogConfig {
            level,
            phases: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// 开发环境：Debug 级别，stdout + 10000 条环形缓冲
    pub fn dev() -> Self {
        LogConfig {
            level: Level::Debug,
            phases: Vec::new(),
            outputs: vec![OutputConfig::Stdout, OutputConfig::RingBuffer(10000)],
        }
    }

    /// 生产环境：Warn 级别，stderr + 1000 条环形缓冲
    pub fn production() -> Self {
        LogConfig {
            level: Level::Warn,
            phases: Vec::new(),
            outputs: vec![OutputConfig::Stderr, OutputConfig::RingBuffer(1000)],
        }
    }

    /// 测试环境（静默）
    pub fn test() -> Self {
        LogConfig::new(Level::Error)
    }

    pub fn with_stdout(mut self) -> Self {
        if !self.outputs.contains(&OutputConfig::Stdout) {
            self.outputs.push(OutputConfig::Stdout);
        }
        self
    }

    pub fn with_stderr(mut self) -> Self {
        if !self.outputs.contains(&OutputConfig::Stderr) {
            self.outputs.push(OutputConfig::Stderr);
        }
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.outputs.push(OutputConfig::File(path.into()));
        self
    }

    pub fn with_ring_buffer(mut self, capacity: usize) -> Self {
        self.outputs.push(OutputConfig::RingBuffer(capacity));
        self
    }

    /// 为某个阶段目标单独设置级别
    pub fn with_phase_level(mut self, target: &'static str, level: Level) -> Self {
        self.phases.retain(|(t, _)| *t != target);
        self.phases.push((target, level));
        self
    }

    /// 初始化日志系统
    ///
    /// 返回 (logger, Option<ring_buffer>)；配置了多个环形缓冲区时返回最后一个。
    /// 无法打开的日志文件会被跳过。
    pub fn init(self) -> (Arc<Logger>, Option<Arc<LogRingBuffer>>) {
        let logger = Logger::new(self.level);
        for (target, level) in self.phases {
            logger.set_target_level(target, level);
        }

        let mut ring_buffer = None;
        for output in self.outputs {
            match output {
                OutputConfig::Stdout => logger.add_sink(StdoutSink),
                OutputConfig::Stderr => logger.add_sink(StderrSink),
                OutputConfig::File(path) => {
                    if let Ok(sink) = FileSink::new(&path) {
                        logger.add_sink(sink);
                    }
                }
                OutputConfig::RingBuffer(capacity) => {
                    let ring = LogRingBuffer::new(capacity);
                    ring_buffer = Some(Arc::clone(&ring));
                    logger.add_sink(ring);
                }
            }
        }

        (logger, ring_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dev() {
        let config = LogConfig::dev();
        assert_eq!(config.level, Level::Debug);
        assert!(config.outputs.contains(&OutputConfig::Stdout));
        assert!(config
            .outputs
            .iter()
            .any(|o| matches!(o, OutputConfig::RingBuffer(10000))));
    }

    #[test]
    fn test_config_production() {
        let config = LogConfig::production();
        assert_eq!(config.level, Level::Warn);
        assert!(config.outputs.contains(&OutputConfig::Stderr));
    }

    #[test]
    fn test_with_stdout_dedup() {
        let config = LogConfig::new(Level::Info).with_stdout().with_stdout();
        let count = config
            .outputs
            .iter()
            .filter(|o| matches!(o, OutputConfig::Stdout))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_phase_level_applied() {
        let (logger, ring) = LogConfig::new(Level::Error)
            .with_phase_level("tarn::compiler", Level::Debug)
            .with_ring_buffer(10)
            .init();

        crate::debug!(target: "tarn::compiler", logger, "pass 1");
        crate::debug!(target: "tarn::vm", logger, "filtered");

        let records = ring.unwrap().dump_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, "tarn::compiler");
    }

    #[test]
    fn test_phase_level_replaced() {
        let config = LogConfig::test()
            .with_phase_level("tarn::vm", Level::Debug)
            .with_phase_level("tarn::vm", Level::Trace);
        assert_eq!(config.phases, vec![("tarn::vm", Level::Trace)]);
    }

    #[test]
    fn test_config_init_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init.log");
        let (logger, ring) = LogConfig::new(Level::Info)
            .with_file(path.to_string_lossy().to_string())
            .init();
        assert!(ring.is_none());
        crate::info!(logger, "to file");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("to file"));
    }

    #[test]
    fn test_config_init_no_ring() {
        let (logger, ring) = LogConfig::test().init();
        assert!(ring.is_none());
        crate::debug!(logger, "no sink");
    }
}
