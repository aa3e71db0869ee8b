//! API 错误类型
//!
//! 提供统一的错误类型和结构化错误报告。

use serde::Serialize;
use tarn_config::Phase;
use tarn_core::core::line_col;
use tarn_core::{ErrorKind, TarnError};
use thiserror::Error;

/// 带源码坐标的引擎错误
#[derive(Debug, Clone, PartialEq)]
pub struct SourceError {
    pub error: TarnError,
    /// 1-based
    pub line: Option<usize>,
    /// 1-based
    pub column: Option<usize>,
}

impl SourceError {
    /// 用错误里的字节偏移在 `src` 中定位
    pub fn locate(error: TarnError, src: &str) -> Self {
        let (line, column) = match error.pos {
            Some(pos) => {
                let (l, c) = line_col(src, pos);
                (Some(l), Some(c))
            }
            None => (None, None),
        };
        SourceError { error, line, column }
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{line}:{col}: {}", self.error),
            _ => write!(f, "{}", self.error),
        }
    }
}

/// Tarn 错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 词法错误：括号不平衡、字符串未闭合
    #[error("Lexer error: {0}")]
    Lexer(SourceError),

    /// 编译错误
    #[error("Compile error: {0}")]
    Compile(SourceError),

    /// 运行时错误
    #[error("Runtime error: {0}")]
    Runtime(SourceError),
}

impl ApiError {
    /// 编译阶段（含词法）的错误
    pub fn from_compile(error: TarnError, src: &str) -> Self {
        let located = SourceError::locate(error, src);
        match located.error.kind {
            ErrorKind::UnbalancedBraces | ErrorKind::UnterminatedString => ApiError::Lexer(located),
            _ => ApiError::Compile(located),
        }
    }

    pub fn from_runtime(error: TarnError, src: &str) -> Self {
        ApiError::Runtime(SourceError::locate(error, src))
    }

    fn source_error(&self) -> &SourceError {
        match self {
            ApiError::Lexer(e) | ApiError::Compile(e) | ApiError::Runtime(e) => e,
        }
    }

    /// 底层引擎错误
    pub fn error(&self) -> &TarnError {
        &self.source_error().error
    }

    pub fn kind(&self) -> ErrorKind {
        self.error().kind
    }

    /// 获取错误行号（如果有）
    pub fn line(&self) -> Option<usize> {
        self.source_error().line
    }

    /// 获取错误列号（如果有）
    pub fn column(&self) -> Option<usize> {
        self.source_error().column
    }

    /// 获取错误阶段
    pub fn phase(&self) -> Phase {
        match self {
            ApiError::Lexer(_) => Phase::Lexer,
            ApiError::Compile(_) => Phase::Compiler,
            ApiError::Runtime(_) => Phase::Vm,
        }
    }

    /// 转换为结构化错误报告
    ///
    /// 适用于 Web API、LSP 等需要结构化数据的场景。
    /// CLI 可以直接打印，上层应用可以序列化为 JSON。
    pub fn to_report(&self) -> ErrorReport {
        let e = self.source_error();
        ErrorReport {
            phase: self.phase().as_str(),
            line: e.line,
            column: e.column,
            error_kind: e.error.kind.as_str().to_string(),
            message: e.error.message.clone(),
        }
    }
}

/// 结构化错误报告
///
/// 上层应用（CLI、Web、LSP）可以根据自己的需求格式化。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    /// 错误阶段: lexer, compiler, vm
    pub phase: &'static str,
    /// 错误行号（1-based，如果有）
    pub line: Option<usize>,
    /// 错误列号（1-based，如果有）
    pub column: Option<usize>,
    /// 错误种类（语言内的符号名，例如 `unknown-id`）
    pub error_kind: String,
    /// 人类可读的错误消息
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    /// 默认的 CLI 友好格式
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(
                f,
                "[{}:{}] {} error ({}): {}",
                line, col, self.phase, self.error_kind, self.message
            ),
            _ => write!(
                f,
                "[{}] {} error ({}): {}",
                self.phase, self.phase, self.error_kind, self.message
            ),
        }
    }
}

impl ErrorReport {
    /// 转换为 JSON 格式（Web API 使用）
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"phase":"{}","message":"unserializable report: {}"}}"#, self.phase, e)
        })
    }

    /// 简洁格式（适合终端）
    pub fn to_short(&self) -> String {
        format!("{}: {}", self.phase, self.message)
    }
}
