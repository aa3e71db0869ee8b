//! Tarn API - Execution orchestration layer
//!
//! Provides unified execution interface, including:
//! - Execution flow orchestration
//! - Configuration abstraction (RunConfig)
//! - Unified error handling (ApiError)
//!
//! For CLI convenience, this crate provides a global singleton API.
//! For library use, prefer the explicit `run(source, &config)` API.

use tarn_core::core::op::Op;
use tarn_core::Engine;
use tarn_log::{debug, info};

pub mod config;
pub use config::{
    config as get_config, config_or_default, init as init_config, is_initialized, RunConfig,
};

// Re-export config types from tarn_config
pub use tarn_config::{CompilerConfig, LimitConfig, LogLevel, Phase, ProjectConfig};

pub mod error;
pub mod types;
pub use error::{ApiError, ErrorReport, SourceError};
pub use types::{CompileOutput, ExecuteOutput};

// Re-export core types
pub use tarn_config;
pub use tarn_core::{ErrorKind, TarnError, Value};

const TARGET: &str = "tarn::api";

fn render_ops(ops: &[Op]) -> Vec<String> {
    ops.iter().map(|op| op.to_string()).collect()
}

fn engine_for(config: &RunConfig) -> Engine {
    Engine::with_config(config.engine_config(), config.logger.clone())
}

/// Execute with explicit configuration
///
/// This is the recommended API for library users.
pub fn run(source: &str, config: &RunConfig) -> Result<ExecuteOutput, ApiError> {
    info!(target: TARGET, config.logger, "Starting execution");

    let mut engine = engine_for(config);
    let start = engine
        .compile(source)
        .map_err(|e| ApiError::from_compile(e, source))?;
    let ops = config.dump_ops.then(|| render_ops(&engine.ops()[start..]));

    engine.thread_mut().pc = start;
    engine
        .run()
        .map_err(|e| ApiError::from_runtime(e, source))?;

    info!(target: TARGET, config.logger, "Execution completed");
    Ok(ExecuteOutput {
        stack: engine.stack().to_vec(),
        ops,
    })
}

/// Compile with explicit configuration
///
/// 只编译不执行；成功时返回渲染后的操作序列。
pub fn compile_with_config(source: &str, config: &RunConfig) -> Result<CompileOutput, ApiError> {
    info!(target: TARGET, config.logger, "Starting compiler");
    let mut engine = engine_for(config);
    let start = engine
        .compile(source)
        .map_err(|e| ApiError::from_compile(e, source))?;
    let ops = render_ops(&engine.ops()[start..]);
    debug!(target: TARGET, config.logger, "compilation completed: ops={}", ops.len());
    Ok(CompileOutput { ops })
}

// ==================== Legacy API (using global config) ====================

/// Compile source code (uses global config, installing the default if needed)
pub fn compile(source: &str) -> Result<CompileOutput, ApiError> {
    compile_with_config(source, config_or_default())
}

/// Compile and run (uses global config, installing the default if needed)
pub fn compile_and_run(source: &str) -> Result<ExecuteOutput, ApiError> {
    run(source, config_or_default())
}

/// Quick run with default config (auto-initializes if needed)
pub fn quick_run(source: &str) -> Result<ExecuteOutput, ApiError> {
    if !is_initialized() {
        init_config(RunConfig::default());
    }
    compile_and_run(source)
}

// ==================== Session ====================

/// 交互式会话
///
/// 每次 `eval` 在同一个引擎上追加代码；函数、类型、全局绑定和值栈都跨调用保留。
pub struct Session {
    engine: Engine,
    dump_ops: bool,
}

impl Session {
    pub fn new(config: &RunConfig) -> Self {
        Session {
            engine: engine_for(config),
            dump_ops: config.dump_ops,
        }
    }

    /// 编译并执行一段代码，返回执行后的值栈
    ///
    /// 编译失败时不会追加任何操作；执行失败时值栈保留出错前的状态。
    pub fn eval(&mut self, source: &str) -> Result<&[Value], ApiError> {
        let start = self
            .engine
            .compile(source)
            .map_err(|e| ApiError::from_compile(e, source))?;
        if self.dump_ops {
            for line in render_ops(&self.engine.ops()[start..]) {
                eprintln!("{line}");
            }
        }
        self.engine.thread_mut().pc = start;
        self.engine
            .run()
            .map_err(|e| ApiError::from_runtime(e, source))?;
        Ok(self.engine.stack())
    }

    pub fn stack(&self) -> &[Value] {
        self.engine.stack()
    }

    /// 清空值栈
    pub fn clear(&mut self) {
        while self.engine.pop().is_ok() {}
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(&RunConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tarn_log::{Level, LogRingBuffer, Logger};

    #[test]
    fn test_run_with_explicit_config() {
        let config = RunConfig::default();
        let out = run("1 2 +", &config).unwrap();
        assert_eq!(out.value().and_then(|v| v.as_i64()), Some(3));
        assert!(out.ops.is_none());
    }

    #[test]
    fn test_run_dumps_ops() {
        let config = RunConfig {
            dump_ops: true,
            ..RunConfig::default()
        };
        let out = run("1 2 +", &config).unwrap();
        let ops = out.ops.unwrap();
        assert!(!ops.is_empty());
    }

    #[test]
    fn test_compile_only() {
        let out = compile_with_config("func: sq (I64) dup *; 3 sq", &RunConfig::default()).unwrap();
        assert!(!out.ops.is_empty());
    }

    #[test]
    fn test_lexer_error_is_located() {
        let err = run("1 2\n{ 3", &RunConfig::default()).unwrap_err();
        assert!(matches!(err, ApiError::Lexer(_)));
        assert_eq!(err.phase(), Phase::Lexer);
        assert_eq!(err.kind(), ErrorKind::UnbalancedBraces);
        assert!(err.line().is_some());
    }

    #[test]
    fn test_runtime_error() {
        let err = run("1 0 /", &RunConfig::default()).unwrap_err();
        assert!(matches!(err, ApiError::Runtime(_)));
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
        assert_eq!(err.to_report().phase, "vm");
    }

    #[test]
    fn test_quick_run() {
        let out = quick_run("1 2 3").unwrap();
        assert_eq!(out.stack.len(), 3);
    }

    #[test]
    fn test_session_keeps_state() {
        let mut session = Session::default();
        session.eval("func: sq (I64) dup *; let: x 7;").unwrap();
        let stack = session.eval("$x sq").unwrap();
        assert_eq!(stack.last().and_then(|v| v.as_i64()), Some(49));
        session.clear();
        assert!(session.stack().is_empty());
    }

    #[test]
    fn test_session_survives_errors() {
        let mut session = Session::default();
        assert!(session.eval("{ 1").is_err());
        assert!(session.eval("nope").is_err());
        let stack = session.eval("5").unwrap();
        assert_eq!(stack.last().and_then(|v| v.as_i64()), Some(5));
    }

    #[test]
    fn test_logs_reach_sink() {
        let ring = LogRingBuffer::new(256);
        let logger = Logger::new(Level::Trace).with_sink(ring.clone());
        let config = RunConfig {
            logger: Arc::clone(&logger),
            ..RunConfig::default()
        };
        run("1", &config).unwrap();
        let records = ring.dump_records();
        assert!(records.iter().any(|r| r.target == "tarn::api"));
    }
}
