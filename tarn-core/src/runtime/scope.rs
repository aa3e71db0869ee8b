//! 作用域
//!
//! 一个作用域 = 一层词法嵌套：安全级别、值栈下标、引入的环境键、
//! 循环状态、延迟执行的 thunk。lambda 作用域额外保存调用者的环境。

use std::collections::HashMap;
use std::sync::Arc;

use super::coro::Fiber;
use super::iter::IterRef;
use super::poll::Backoff;
use crate::core::error::TarnError;
use crate::core::func::Safety;
use crate::core::label::Lambda;
use crate::core::value::{Env, Sym, Value};

/// 循环种类
pub(crate) enum LoopKind {
    For { iter: IterRef, body: Value },
    While { body: Value },
}

/// `for` / `while` 的运行期状态，按循环操作的 pc 存放在作用域中
pub(crate) struct LoopState {
    pub kind: LoopKind,
    pub end_pc: usize,
    pub backoff: Backoff,
}

pub struct Scope {
    pub safety: Safety,
    /// lambda 作用域的被调用者
    pub callee: Option<Arc<Lambda>>,
    pub ret_pc: usize,
    /// 当前值栈在 `Thread::stacks` 中的下标
    pub stack: usize,
    pub owns_stack: bool,
    /// 本作用域引入的绑定及其覆盖的旧值，退出时逆序恢复
    pub(crate) keys: Vec<(Sym, Option<Value>)>,
    /// lambda 作用域：调用者的环境
    pub(crate) env_backup: Option<Env>,
    pub(crate) loops: HashMap<usize, LoopState>,
    pub(crate) loop_order: Vec<usize>,
    pub(crate) defers: Vec<Value>,
    /// 由 fiber 驱动的 lambda 作用域
    pub(crate) fiber: Option<Arc<Fiber>>,
}

impl Scope {
    fn new(safety: Safety, stack: usize, owns_stack: bool) -> Self {
        Scope {
            safety,
            callee: None,
            ret_pc: 0,
            stack,
            owns_stack,
            keys: Vec::new(),
            env_backup: None,
            loops: HashMap::new(),
            loop_order: Vec::new(),
            defers: Vec::new(),
            fiber: None,
        }
    }

    /// 线程的根作用域
    pub fn root(safety: Safety) -> Self {
        Scope::new(safety, 0, true)
    }

    /// `( ... )`、`let:` 等块作用域
    pub fn block(safety: Safety, stack: usize, owns_stack: bool) -> Self {
        Scope::new(safety, stack, owns_stack)
    }

    /// lambda 调用：与调用者共享值栈
    pub fn lambda(callee: Arc<Lambda>, safety: Safety, stack: usize, ret_pc: usize) -> Self {
        let mut scope = Scope::new(safety, stack, false);
        scope.callee = Some(callee);
        scope.ret_pc = ret_pc;
        scope
    }

    pub fn is_lambda(&self) -> bool {
        self.callee.is_some()
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.keys.iter().any(|(k, _)| &**k == name)
    }

    pub(crate) fn add_loop(&mut self, pc: usize, state: LoopState) {
        self.loops.insert(pc, state);
        self.loop_order.push(pc);
    }

    pub(crate) fn remove_loop(&mut self, pc: usize) -> Option<LoopState> {
        self.loop_order.retain(|p| *p != pc);
        self.loops.remove(&pc)
    }

    /// 清除 pc 落在 (start, end) 之间的循环
    pub(crate) fn clear_loops_in(&mut self, start: usize, end: usize) {
        let stale: Vec<usize> = self
            .loops
            .keys()
            .copied()
            .filter(|pc| *pc > start && *pc < end)
            .collect();
        for pc in stale {
            self.remove_loop(pc);
        }
    }

    pub(crate) fn clear_loops(&mut self) {
        self.loops.clear();
        self.loop_order.clear();
    }
}

/// try 帧：进入 `try:` 时记录的恢复点
pub(crate) struct TryFrame {
    /// try 作用域的下标
    pub scopes_len: usize,
    /// try 作用域值栈的恢复深度
    pub depth: usize,
    pub start_pc: usize,
    pub end_pc: usize,
    pub errors: Vec<TarnError>,
}

/// 泛型参数括号的运行期标记
pub(crate) struct ParamMark {
    pub id: usize,
    pub scopes_len: usize,
    pub depth: usize,
}
