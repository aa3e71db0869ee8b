//! 执行线程
//!
//! 一个 `Thread` 拥有一段操作序列、一个 pc、一个环境，以及两组同步增长的历史：
//! 作用域栈和值栈栈。执行循环逐个执行操作，由返回的 [`Control`] 决定下一个 pc。
//!
//! 出错时，从循环入口深度以上打开的作用域全部被展开（不保留结果值），
//! 除非最近的 try 帧位于本循环之内，此时恢复到 try 帧并继续。

use std::collections::HashMap;
use std::sync::Arc;

use tarn_log::{debug, trace, warn, Logger};

use super::coro::Coroutine;
use super::registry::{Builtins, Runtime};
use super::scope::{ParamMark, Scope, TryFrame};
use super::{Control, EXIT_PC};
use crate::compiler::Compiler;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{FuncImp, Safety};
use crate::core::op::Op;
use crate::core::value::{Env, Sym, Value};

const TARGET: &str = "tarn::vm";

pub struct Thread {
    pub id: u64,
    pub rt: Arc<Runtime>,
    pub types: Arc<Builtins>,
    pub(crate) ops: Arc<Vec<Op>>,
    pub pc: usize,
    pub(crate) env: Env,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) stacks: Vec<Vec<Value>>,
    pub(crate) tries: Vec<TryFrame>,
    pub(crate) params: Vec<ParamMark>,
    /// 非 fiber 的挂起协程，按 lambda ID
    pub(crate) coros: HashMap<usize, Coroutine>,
    /// 调用点 pc → 上次命中的实现
    pub(crate) call_cache: HashMap<usize, Arc<FuncImp>>,
    ret_pc: usize,
    loop_base: usize,
    pub(crate) logger: Arc<Logger>,
}

impl Thread {
    pub fn new(rt: Arc<Runtime>) -> Thread {
        let logger = rt.logger.clone();
        let id = rt.next_id() as u64;
        trace!(target: TARGET, logger, "creating thread {}", id);
        Thread {
            id,
            types: rt.types.clone(),
            rt,
            ops: Arc::new(Vec::new()),
            pc: 0,
            env: Env::new(),
            scopes: vec![Scope::root(Safety::Safe)],
            stacks: vec![Vec::new()],
            tries: Vec::new(),
            params: Vec::new(),
            coros: HashMap::new(),
            call_cache: HashMap::new(),
            ret_pc: 0,
            loop_base: 1,
            logger,
        }
    }

    /// 新线程：复制当前值栈、环境与操作序列
    pub(crate) fn fork(&self) -> Thread {
        let mut child = Thread::new(self.rt.clone());
        child.ops = self.ops.clone();
        child.env = self.env.clone();
        child.stacks[0] = self.stack().to_vec();
        child.scopes[0].safety = self.safety();
        child
    }

    pub fn ops(&self) -> &Arc<Vec<Op>> {
        &self.ops
    }

    /// 当前原生调用完成后继续执行的 pc
    pub fn ret_pc(&self) -> usize {
        self.ret_pc
    }

    pub(crate) fn set_ret_pc(&mut self, pc: usize) -> usize {
        std::mem::replace(&mut self.ret_pc, pc)
    }

    pub(crate) fn loop_base(&self) -> usize {
        self.loop_base
    }

    // ==================== 值栈 ====================

    pub fn stack(&self) -> &[Value] {
        self.stacks.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stack_mut(&mut self) -> &mut Vec<Value> {
        if self.stacks.is_empty() {
            self.stacks.push(Vec::new());
        }
        let last = self.stacks.len() - 1;
        &mut self.stacks[last]
    }

    pub fn push(&mut self, v: Value) {
        self.stack_mut().push(v);
    }

    pub fn peek(&self) -> Option<&Value> {
        self.stack().last()
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.stack_mut()
            .pop()
            .ok_or_else(|| TarnError::underflow("pop"))
    }

    /// 弹出 n 个值，按入栈顺序返回
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        let stack = self.stack_mut();
        if stack.len() < n {
            return Err(TarnError::underflow(&format!("pop of {n} values")));
        }
        let at = stack.len() - n;
        Ok(stack.split_off(at))
    }

    /// 弹出并按载荷取值，取不到时报类型不匹配
    pub fn pop_as<T>(&mut self, expected: &str, f: impl FnOnce(&Value) -> Option<T>) -> Result<T> {
        let v = self.pop()?;
        f(&v).ok_or_else(|| TarnError::mismatch(expected, v.type_name()))
    }

    pub fn pop_int(&mut self) -> Result<i64> {
        self.pop_as("I64", Value::as_i64)
    }

    pub fn pop_str(&mut self) -> Result<String> {
        self.pop_as("Str", |v| v.as_str().map(str::to_string))
    }

    pub fn pop_sym(&mut self) -> Result<Sym> {
        self.pop_as("Sym", |v| v.as_sym().cloned())
    }

    /// 调试用：当前值栈的详细形式
    pub fn dump_stack(&self) -> String {
        let items: Vec<String> = self.stack().iter().map(|v| format!("{v:?}")).collect();
        format!("[{}]", items.join(" "))
    }

    // ==================== 环境 ====================

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }

    /// 在当前作用域绑定；同一作用域重复绑定是错误
    pub fn bind(&mut self, name: Sym, v: Value) -> Result<()> {
        if self.scope().has_key(&name) {
            return Err(TarnError::new(
                ErrorKind::DuplicateRegistration,
                format!("'{name}' is already bound in this scope"),
            ));
        }
        let prev = self.env.insert(name.clone(), v);
        self.scope_mut().keys.push((name, prev));
        Ok(())
    }

    // ==================== 作用域 ====================

    pub fn scope(&self) -> &Scope {
        let last = self.scopes.len().saturating_sub(1);
        &self.scopes[last]
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len().saturating_sub(1);
        &mut self.scopes[last]
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn safety(&self) -> Safety {
        self.scope().safety
    }

    /// 根作用域的安全级别（宿主决定顶层代码能调用什么）
    pub fn set_root_safety(&mut self, safety: Safety) {
        self.scopes[0].safety = safety;
    }

    pub(crate) fn push_scope(&mut self, scope: Scope) -> Result<()> {
        let max = self.rt.config.limits.max_scope_depth;
        if self.scopes.len() >= max {
            return Err(TarnError::new(
                ErrorKind::StackOverflow,
                format!("scope depth exceeds {max}"),
            ));
        }
        self.scopes.push(scope);
        Ok(())
    }

    /// 打开块作用域；`own_stack` 时从空值栈开始
    pub(crate) fn begin_block(&mut self, own_stack: bool, safety: Safety) -> Result<()> {
        if own_stack {
            self.stacks.push(Vec::new());
        }
        let stack = self.stacks.len() - 1;
        if let Err(e) = self.push_scope(Scope::block(safety, stack, own_stack)) {
            if own_stack {
                self.stacks.pop();
            }
            return Err(e);
        }
        Ok(())
    }

    /// 关闭当前作用域：执行 defer，恢复值栈深度（可保留栈顶），解除绑定
    pub(crate) fn pop_scope(&mut self, keep_top: bool) -> Result<()> {
        if self.scopes.len() <= 1 {
            return Err(TarnError::new(ErrorKind::StackUnderflow, "cannot close the root scope"));
        }
        let defers = std::mem::take(&mut self.scope_mut().defers);
        let mut first_err = None;
        for thunk in defers.into_iter().rev() {
            if let Err(e) = self.call_sync(&thunk, Vec::new()) {
                warn!(target: TARGET, self.logger, "deferred call failed: {}", e);
                first_err.get_or_insert(e);
            }
        }

        let Some(scope) = self.scopes.pop() else {
            return Err(TarnError::new(ErrorKind::StackUnderflow, "no scope to close"));
        };
        if scope.owns_stack {
            let stack = self.stacks.pop().unwrap_or_default();
            if keep_top {
                if let Some(top) = stack.last() {
                    self.stack_mut().push(top.clone());
                }
            }
        }
        match scope.env_backup {
            Some(env) => self.env = env,
            None => {
                for (key, prev) in scope.keys.into_iter().rev() {
                    match prev {
                        Some(v) => {
                            self.env.insert(key, v);
                        }
                        None => {
                            self.env.remove(&key);
                        }
                    }
                }
            }
        }
        if let Some(fiber) = scope.fiber {
            fiber.finish();
        }

        let depth = self.scopes.len();
        self.tries.retain(|t| t.scopes_len < depth);
        self.params.retain(|p| p.scopes_len <= depth);
        first_err.map_or(Ok(()), Err)
    }

    /// 弹出作用域直到剩余 `depth` 个（根作用域始终保留）
    pub(crate) fn unwind_to(&mut self, depth: usize, keep_top: bool) -> Result<()> {
        let mut first_err = None;
        while self.scopes.len() > depth.max(1) {
            if let Err(e) = self.pop_scope(keep_top) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ==================== 执行循环 ====================

    /// 从当前 pc 运行到序列末尾
    pub fn run(&mut self) -> Result<()> {
        let end = self.ops.len();
        self.run_until(end)
    }

    /// 运行到 `stop`（断点 pc）或序列末尾
    pub fn run_until(&mut self, stop: usize) -> Result<()> {
        let base = self.scopes.len();
        debug!(target: TARGET, self.logger, "thread {} running from pc {} (stop {})", self.id, self.pc, stop);
        let result = self.run_loop(base, stop);
        if self.pc > self.ops.len() {
            self.pc = self.ops.len();
        }
        result
    }

    pub(crate) fn run_loop(&mut self, base: usize, stop: usize) -> Result<()> {
        let saved = std::mem::replace(&mut self.loop_base, base);
        let result = self.run_ops(base, stop);
        self.loop_base = saved;
        result
    }

    fn run_ops(&mut self, base: usize, stop: usize) -> Result<()> {
        let ops = Arc::clone(&self.ops);
        let max_stack = self.rt.config.limits.max_stack_size;
        while self.pc != stop && self.pc < ops.len() {
            let op = &ops[self.pc];
            #[cfg(feature = "trace_execution")]
            trace!(
                target: TARGET,
                self.logger,
                "[{}] {:04} {:<24} {}",
                self.id,
                self.pc,
                op.to_string(),
                self.dump_stack()
            );
            let step = self
                .exec(op)
                .and_then(|ctl| self.apply(ctl, base))
                .and_then(|()| {
                    if self.stack().len() > max_stack {
                        Err(TarnError::new(
                            ErrorKind::StackOverflow,
                            format!("value stack exceeds {max_stack}"),
                        ))
                    } else {
                        Ok(())
                    }
                });
            if let Err(e) = step {
                self.catch(e, base)?;
            }
        }
        Ok(())
    }

    pub(crate) fn apply(&mut self, ctl: Control, base: usize) -> Result<()> {
        match ctl {
            Control::Next => self.pc += 1,
            Control::Jump(pc) => self.pc = pc,
            Control::Unwind { depth, pc } => {
                if depth < base {
                    return Err(TarnError::new(
                        ErrorKind::Thread,
                        "non-local exit crosses a native call boundary",
                    ));
                }
                self.unwind_to(depth, true)?;
                self.pc = pc;
            }
        }
        Ok(())
    }

    /// 错误恢复：交给本循环内最近的 try 帧，否则展开到循环入口并上抛
    fn catch(&mut self, err: TarnError, base: usize) -> Result<()> {
        let frame = self.tries.last().map(|t| t.scopes_len);
        let Some(at) = frame.filter(|at| *at >= base && *at < self.scopes.len()) else {
            debug!(target: TARGET, self.logger, "thread {} failed at pc {}: {}", self.id, self.pc, err);
            if let Err(e) = self.unwind_to(base, false) {
                warn!(target: TARGET, self.logger, "error while unwinding: {}", e);
            }
            return Err(err);
        };

        debug!(target: TARGET, self.logger, "caught at pc {}: {}", self.pc, err);
        if let Err(e) = self.unwind_to(at + 1, false) {
            warn!(target: TARGET, self.logger, "error while unwinding: {}", e);
        }
        let Some(frame) = self.tries.last_mut() else {
            return Err(err);
        };
        let (depth, start, end) = (frame.depth, frame.start_pc, frame.end_pc);
        frame.errors.push(err);

        let stack = self.scopes[at].stack;
        if let Some(values) = self.stacks.get_mut(stack) {
            values.truncate(depth);
        }
        self.scopes[at].clear_loops_in(start, end);
        self.params.retain(|p| p.scopes_len <= at);
        self.pc = end;
        Ok(())
    }

    /// 记录到最近的 try 帧；没有 try 帧时返回错误
    pub(crate) fn report(&mut self, err: TarnError) -> Result<()> {
        match self.tries.last_mut() {
            Some(frame) => {
                debug!(target: TARGET, self.logger, "recorded: {}", err);
                frame.errors.push(err);
                Ok(())
            }
            None => Err(err),
        }
    }

    // ==================== 调用 ====================

    /// 通过类型的可调用角色调用
    pub fn call_value(&mut self, target: &Value, ret_pc: usize) -> Result<Control> {
        match target.ty.behavior.callable() {
            Some(callable) => callable.call(target, self, ret_pc),
            None => Err(TarnError::new(
                ErrorKind::NotCallable,
                format!("{} is not callable", target.dump()),
            )),
        }
    }

    /// 同步调用：在独立值栈上压入参数、运行嵌套循环直到调用返回，取回栈顶
    pub fn call_sync(&mut self, target: &Value, args: Vec<Value>) -> Result<Option<Value>> {
        let saved_pc = self.pc;
        let saved_ret = self.ret_pc;
        let base = self.scopes.len();
        let safety = self.safety();
        self.begin_block(true, safety)?;
        self.stack_mut().extend(args);

        let result = self.run_call(target, base + 1);
        let top = match &result {
            Ok(()) => self
                .scopes
                .get(base)
                .and_then(|s| self.stacks.get(s.stack))
                .and_then(|s| s.last().cloned()),
            Err(_) => None,
        };
        let unwound = self.unwind_to(base, false);
        self.pc = saved_pc;
        self.ret_pc = saved_ret;
        result?;
        unwound?;
        Ok(top)
    }

    fn run_call(&mut self, target: &Value, base: usize) -> Result<()> {
        let ctl = self.call_value(target, EXIT_PC)?;
        self.apply(ctl, base)?;
        self.run_loop(base, EXIT_PC)
    }

    /// 在新的执行入口运行可调用值（线程入口使用）
    pub(crate) fn run_callable(&mut self, target: &Value) -> Result<()> {
        let base = self.scopes.len();
        self.run_call(target, base)
    }

    // ==================== 编译 ====================

    /// 编译并追加到本线程的操作序列，返回新代码的起始 pc
    pub fn compile(&mut self, src: &str) -> Result<usize> {
        let base = self.ops.len();
        let unit = Compiler::new(&self.rt).compile(src, base)?;
        Arc::make_mut(&mut self.ops).extend(unit.ops);
        for (name, imp) in unit.funcs {
            self.rt.add_imp(&name, imp.args, imp.safety, imp.body);
        }
        for (from, to, target) in unit.convs {
            self.rt.add_conv(&from, &to, target);
        }
        debug!(target: TARGET, self.logger, "thread {} now has {} ops", self.id, self.ops.len());
        Ok(base)
    }
}
