//! Tarn 运行时 (Runtime 层)
//!
//! 栈式解释器实现：
//! - 注册表（类型、函数、宏、标签、转换、线程）
//! - 线程执行循环、作用域与值栈
//! - 重载分派、协程 / fiber / OS 线程
//! - 迭代器协议与标准库

// ==================== 控制转移 ====================

/// 调用完成后停止嵌套执行循环的哨兵 pc
pub const EXIT_PC: usize = usize::MAX;

/// 每个操作返回的控制转移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// pc + 1
    Next,
    Jump(usize),
    /// 弹出作用域直到剩余 `depth` 个，再跳到 `pc`
    Unwind { depth: usize, pc: usize },
}

// ==================== Runtime 实现模块 ====================

/// 具体类型的行为表
pub mod behavior;

/// 协程与 fiber
pub mod coro;

/// 重载分派与隐式转换
pub mod dispatch;

/// 嵌入 API
pub mod engine;

/// 单个操作的执行
pub mod exec;

/// 迭代器协议
pub mod iter;

/// 非阻塞轮询与退避
pub mod poll;

/// 注册表与内置类型
pub mod registry;

/// 作用域
pub mod scope;

/// OS 线程
pub mod spawn;

/// 标准库
pub mod stdlib;

/// 执行线程
pub mod thread;

pub use engine::Engine;
pub use registry::{Builtins, EngineConfig, Registry, Runtime};
pub use scope::Scope;
pub use thread::Thread;
