//! 日志宏
//!
//! 两种形式：`debug!(logger, "...")` 使用模块路径作为目标；
//! `debug!(target: "tarn::vm", logger, "...")` 使用显式目标（阶段名）。

/// 记录 Trace 级别日志
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $logger:expr, $($arg:tt)*) => {
        $crate::log!(target: $target, $logger, $crate::Level::Trace, $($arg)*)
    };
    ($logger:expr, $($arg:tt)*) => {
        $crate::log!($logger, $crate::Level::Trace, $($arg)*)
    };
}

/// 记录 Debug 级别日志
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $logger:expr, $($arg:tt)*) => {
        $crate::log!(target: $target, $logger, $crate::Level::Debug, $($arg)*)
    };
    ($logger:expr, $($arg:tt)*) => {
        $crate::log!($logger, $crate::Level::Debug, $($arg)*)
    };
}

/// 记录 Info 级别日志
#[macro_export]
macro_rules! info {
    (target: $target:expr, $logger:expr, $($arg:tt)*) => {
        $crate::log!(target: $target, $logger, $crate::Level::Info, $($arg)*)
    };
    ($logger:expr, $($arg:tt)*) => {
        $crate::log!($logger, $crate::Level::Info, $($arg)*)
    };
}

/// 记录 Warn 级别日志
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $logger:expr, $($arg:tt)*) => {
        $crate::log!(target: $target, $logger, $crate::Level::Warn, $($arg)*)
    };
    ($logger:expr, $($arg:tt)*) => {
        $crate::log!($logger, $crate::Level::Warn, $($arg)*)
    };
}

/// 记录 Error 级别日志
#[macro_export]
macro_rules! error {
    (target: $target:expr, $logger:expr, $($arg:tt)*) => {
        $crate::log!(target: $target, $logger, $crate::Level::Error, $($arg)*)
    };
    ($logger:expr, $($arg:tt)*) => {
        $crate::log!($logger, $crate::Level::Error, $($arg)*)
    };
}

/// 通用日志宏：先检查级别，只有启用时才格式化消息
#[macro_export]
macro_rules! log {
    (target: $target:expr, $logger:expr, $level:expr, $($arg:tt)*) => {{
        if $logger.is_enabled_for($target, $level) {
            let message = ::std::format!($($arg)*);
            $logger.log($level, $target, message);
        }
    }};
    ($logger:expr, $level:expr, $($arg:tt)*) => {
        $crate::log!(target: module_path!(), $logger, $level, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use crate::{Level, LogRingBuffer, Logger};

    #[test]
    fn test_trace_macro() {
        let ring = LogRingBuffer::new(100);
        let logger = Logger::new(Level::Trace).with_sink(ring.clone());

        trace!(logger, "test trace");
        trace!(logger, "formatted {}", "value");

        let records = ring.dump_records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.level == Level::Trace));
        assert_eq!(records[0].target, module_path!());
    }

    #[test]
    fn test_explicit_target() {
        let ring = LogRingBuffer::new(100);
        let logger = Logger::new(Level::Debug).with_sink(ring.clone());

        debug!(target: "tarn::vm", logger, "pc={}", 42);

        let records = ring.dump_records();
        assert_eq!(records[0].target, "tarn::vm");
        assert_eq!(records[0].message, "pc=42");
    }

    #[test]
    fn test_level_filtering_in_macros() {
        let ring = LogRingBuffer::new(100);
        let logger = Logger::new(Level::Warn).with_sink(ring.clone());

        trace!(logger, "trace msg");
        debug!(logger, "debug msg");
        info!(logger, "info msg");
        warn!(logger, "warn msg");
        error!(logger, "error msg");

        let records = ring.dump_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::Warn);
        assert_eq!(records[1].level, Level::Error);
    }
}
