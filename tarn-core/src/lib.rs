//! Tarn Core - 栈式连接语言引擎
//!
//! 包含词法分析、操作编译器、类型图、重载分派、栈式解释器、
//! 迭代器、协程 / fiber 与 OS 线程。
//!
//! 配置通过 [`EngineConfig`] 显式传入，日志通过 `Arc<Logger>` 显式传入，不使用全局状态。

pub mod compiler;
pub mod core;
pub mod kit;
pub mod runtime;

// Re-export common types
pub use crate::core::{ErrorKind, Result, Safety, TarnError, TypeRef, Val, Value};
pub use compiler::{Compiler, Macro};
pub use runtime::{Control, Engine, EngineConfig, Runtime, Thread};

// Re-export config types from tarn-config
pub use tarn_config::{CompilerConfig, LimitConfig, Phase};
