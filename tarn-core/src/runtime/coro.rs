//! 协程与 fiber
//!
//! `yield` 把从目标 lambda 作用域开始的整段执行状态（作用域、自有值栈、
//! try 帧、环境、续行 pc）切下来保存成 [`Coroutine`]，跳回调用者。
//! 再次调用同一个 lambda（或同一个 fiber）时把这段状态接回当前线程继续执行。
//!
//! 普通 lambda 的挂起协程按 lambda ID 存在线程里；fiber 自己持有协程。
//! 协程只记录所属 fiber 的 ID，不持有 fiber 的强引用。

use std::sync::{Arc, Mutex};

use tarn_log::debug;

use super::scope::{Scope, TryFrame};
use super::thread::Thread;
use super::Control;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::Safety;
use crate::core::label::Lambda;
use crate::core::sync;
use crate::core::value::{Env, Value};

const TARGET: &str = "tarn::vm";

/// 挂起的执行片段
pub struct Coroutine {
    lambda: Arc<Lambda>,
    /// 恢复后继续执行的 pc
    pc: usize,
    /// 首个是 lambda 作用域；值栈下标相对于调用者的值栈
    scopes: Vec<Scope>,
    stacks: Vec<Vec<Value>>,
    /// `scopes_len` 相对于 lambda 作用域
    tries: Vec<TryFrame>,
    env: Env,
    owner: Option<usize>,
}

impl Coroutine {
    pub fn lambda(&self) -> &Arc<Lambda> {
        &self.lambda
    }

    /// 所属 fiber 的 ID
    pub fn owner(&self) -> Option<usize> {
        self.owner
    }
}

enum FiberState {
    Fresh,
    Running,
    Suspended(Box<Coroutine>),
    Done,
}

/// 可反复调用的协程句柄：同一时刻最多一个活着的协程
pub struct Fiber {
    pub id: usize,
    pub target: Value,
    state: Mutex<FiberState>,
}

impl Fiber {
    pub fn new(id: usize, target: Value) -> Arc<Fiber> {
        Arc::new(Fiber {
            id,
            target,
            state: Mutex::new(FiberState::Fresh),
        })
    }

    /// 最近一次运行已经结束（而非挂起）
    pub fn is_done(&self) -> bool {
        matches!(*sync::lock(&self.state), FiberState::Done)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(*sync::lock(&self.state), FiberState::Suspended(_))
    }

    pub(crate) fn finish(&self) {
        *sync::lock(&self.state) = FiberState::Done;
    }

    fn suspend(&self, coro: Coroutine) {
        *sync::lock(&self.state) = FiberState::Suspended(Box::new(coro));
    }

    /// 取出状态并标记为运行中
    fn start(&self) -> FiberState {
        std::mem::replace(&mut *sync::lock(&self.state), FiberState::Running)
    }

    fn restore(&self, state: FiberState) {
        *sync::lock(&self.state) = state;
    }
}

impl Thread {
    /// 调用 lambda：有挂起的协程时恢复，否则新开 lambda 作用域
    pub(crate) fn enter_lambda(
        &mut self,
        lambda: &Arc<Lambda>,
        safety: Safety,
        ret_pc: usize,
    ) -> Result<Control> {
        if let Some(coro) = self.coros.remove(&lambda.def.id) {
            debug!(target: TARGET, self.logger, "resuming lambda#{}", lambda.def.id);
            return self.resume(coro, ret_pc, None);
        }
        self.start_lambda(lambda, safety, ret_pc)
    }

    fn start_lambda(&mut self, lambda: &Arc<Lambda>, safety: Safety, ret_pc: usize) -> Result<Control> {
        let entry = lambda.def.entry().ok_or_else(|| {
            TarnError::new(
                ErrorKind::UnknownLabel,
                format!("lambda#{} has no resolved entry", lambda.def.id),
            )
        })?;
        let stack = self.stacks.len().saturating_sub(1);
        self.push_scope(Scope::lambda(lambda.clone(), safety, stack, ret_pc))?;
        let caller_env = std::mem::replace(&mut self.env, lambda.env.clone());
        self.scope_mut().env_backup = Some(caller_env);
        Ok(Control::Jump(entry))
    }

    /// 调用 fiber：挂起则恢复，未开始或已结束则重新开始
    pub(crate) fn enter_fiber(&mut self, fiber: &Arc<Fiber>, ret_pc: usize) -> Result<Control> {
        match fiber.start() {
            FiberState::Running => Err(TarnError::new(
                ErrorKind::Thread,
                format!("fiber#{} is already running", fiber.id),
            )),
            FiberState::Suspended(coro) => {
                debug!(target: TARGET, self.logger, "resuming fiber#{}", fiber.id);
                self.resume(*coro, ret_pc, Some(fiber.clone()))
                    .inspect_err(|_| fiber.finish())
            }
            prev @ (FiberState::Fresh | FiberState::Done) => match &fiber.target.val {
                crate::core::value::Val::Lambda(lambda) => {
                    debug!(target: TARGET, self.logger, "starting fiber#{}", fiber.id);
                    let safety = self.safety();
                    match self.start_lambda(lambda, safety, ret_pc) {
                        Ok(ctl) => {
                            self.scope_mut().fiber = Some(fiber.clone());
                            Ok(ctl)
                        }
                        Err(e) => {
                            fiber.restore(prev);
                            Err(e)
                        }
                    }
                }
                // 非 lambda 目标无法挂起，直接调用
                _ => {
                    fiber.finish();
                    let target = fiber.target.clone();
                    self.call_value(&target, ret_pc)
                }
            },
        }
    }

    /// 由内向外第 `depth` 个 lambda 作用域的下标
    pub(crate) fn lambda_scope(&self, depth: usize) -> Result<usize> {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, s)| s.is_lambda())
            .nth(depth)
            .map(|(i, _)| i)
            .ok_or_else(|| {
                TarnError::new(
                    ErrorKind::UnknownLabel,
                    format!("no enclosing lambda at depth {depth}"),
                )
            })
    }

    /// 挂起第 `depth` 个 lambda：切下执行状态，跳回它的调用者
    pub(crate) fn suspend(&mut self, depth: usize) -> Result<Control> {
        let i = self.lambda_scope(depth)?;
        if i < self.loop_base() {
            return Err(TarnError::new(
                ErrorKind::Thread,
                "yield crosses a native call boundary",
            ));
        }
        let base_stack = self.scopes[i].stack;
        let mut scopes = self.scopes.split_off(i);
        let stacks = self.stacks.split_off(base_stack + 1);
        for scope in &mut scopes {
            scope.stack -= base_stack;
        }
        let at = self
            .tries
            .iter()
            .position(|t| t.scopes_len >= i)
            .unwrap_or(self.tries.len());
        let mut tries = self.tries.split_off(at);
        for t in &mut tries {
            t.scopes_len -= i;
        }
        self.params.retain(|p| p.scopes_len <= i);

        let head = &mut scopes[0];
        let caller_env = head.env_backup.take().unwrap_or_default();
        let fiber = head.fiber.take();
        let ret_pc = head.ret_pc;
        let Some(lambda) = head.callee.clone() else {
            return Err(TarnError::new(ErrorKind::Thread, "yield outside of a lambda"));
        };
        let env = std::mem::replace(&mut self.env, caller_env);
        let env = snapshot_env(env, &scopes);

        let coro = Coroutine {
            lambda,
            pc: self.pc + 1,
            scopes,
            stacks,
            tries,
            env,
            owner: fiber.as_ref().map(|f| f.id),
        };
        match fiber {
            Some(f) => {
                debug!(target: TARGET, self.logger, "fiber#{} suspended at pc {}", f.id, coro.pc);
                f.suspend(coro);
            }
            None => {
                debug!(target: TARGET, self.logger, "lambda#{} suspended at pc {}", coro.lambda.def.id, coro.pc);
                self.coros.insert(coro.lambda.def.id, coro);
            }
        }
        Ok(Control::Jump(ret_pc))
    }

    /// 把挂起的片段接回当前线程
    fn resume(&mut self, coro: Coroutine, ret_pc: usize, fiber: Option<Arc<Fiber>>) -> Result<Control> {
        let depth = self.scopes.len();
        let max = self.rt.config.limits.max_scope_depth;
        if depth + coro.scopes.len() > max {
            return Err(TarnError::new(
                ErrorKind::StackOverflow,
                format!("scope depth exceeds {max}"),
            ));
        }
        let Coroutine {
            pc,
            mut scopes,
            stacks,
            mut tries,
            env,
            ..
        } = coro;

        let base_stack = self.stacks.len().saturating_sub(1);
        for scope in &mut scopes {
            scope.stack += base_stack;
        }
        for t in &mut tries {
            t.scopes_len += depth;
        }
        let caller_env = std::mem::replace(&mut self.env, env);
        if let Some(head) = scopes.first_mut() {
            head.env_backup = Some(caller_env);
            head.ret_pc = ret_pc;
            head.fiber = fiber;
        }
        self.stacks.extend(stacks);
        self.tries.extend(tries);
        self.scopes.extend(scopes);
        Ok(Control::Jump(pc))
    }

    /// 同 lambda 尾调用：弹出内层作用域，重新安装捕获环境并跳回入口
    pub(crate) fn recall(&mut self, depth: usize) -> Result<Control> {
        let i = self.lambda_scope(depth)?;
        if i < self.loop_base() {
            return Err(TarnError::new(
                ErrorKind::Thread,
                "recall crosses a native call boundary",
            ));
        }
        self.unwind_to(i + 1, false)?;
        let scope = &mut self.scopes[i];
        let Some(callee) = scope.callee.clone() else {
            return Err(TarnError::new(ErrorKind::Thread, "recall outside of a lambda"));
        };
        let entry = callee.def.entry().ok_or_else(|| {
            TarnError::new(ErrorKind::UnknownLabel, "recalled lambda has no resolved entry")
        })?;
        scope.keys.clear();
        scope.clear_loops();
        self.env = callee.env.clone();
        Ok(Control::Jump(entry))
    }
}

/// 只保留与被挂起 lambda 作用域安全级别一致的绑定
///
/// 其他级别的作用域引入的绑定按退出作用域的方式撤销，被遮蔽的旧值重新可见。
fn snapshot_env(mut env: Env, scopes: &[Scope]) -> Env {
    let Some(safety) = scopes.first().map(|s| s.safety) else {
        return env;
    };
    for scope in scopes.iter().rev().filter(|s| s.safety != safety) {
        for (key, prev) in scope.keys.iter().rev() {
            match prev {
                Some(v) => {
                    env.insert(key.clone(), v.clone());
                }
                None => {
                    env.remove(key);
                }
            }
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::registry::{EngineConfig, Runtime};
    use tarn_log::Logger;

    #[test]
    fn test_fiber_states() {
        let rt = Runtime::new(EngineConfig::default(), Logger::noop());
        let f = Fiber::new(1, rt.types.int(0));
        assert!(!f.is_done());
        assert!(matches!(f.start(), FiberState::Fresh));
        f.finish();
        assert!(f.is_done());
        assert!(!f.is_suspended());
    }

    #[test]
    fn test_lambda_scope_lookup() {
        let rt = Runtime::new(EngineConfig::default(), Logger::noop());
        let mut th = Thread::new(rt);
        assert_eq!(th.lambda_scope(0).unwrap_err().kind, ErrorKind::UnknownLabel);
        let def = crate::core::label::LambdaDef::new(1, None);
        def.resolve(0);
        let lambda = Lambda::new(def, Env::new());
        th.enter_lambda(&lambda, Safety::Safe, 0).unwrap();
        th.begin_block(false, Safety::Safe).unwrap();
        assert_eq!(th.lambda_scope(0).unwrap(), 1);
        assert!(th.lambda_scope(1).is_err());
    }

    #[test]
    fn test_snapshot_drops_other_safety_levels() {
        let rt = Runtime::new(EngineConfig::default(), Logger::noop());
        let mut th = Thread::new(rt.clone());
        let def = crate::core::label::LambdaDef::new(1, None);
        def.resolve(0);
        let lambda = Lambda::new(def, Env::new());
        th.enter_lambda(&lambda, Safety::Safe, 0).unwrap();
        th.bind("x".into(), rt.types.int(1)).unwrap();
        th.begin_block(false, Safety::Unsafe).unwrap();
        th.bind("x".into(), rt.types.int(2)).unwrap();
        th.bind("k".into(), rt.types.int(3)).unwrap();

        let at = th.lambda_scope(0).unwrap();
        let env = snapshot_env(th.env.clone(), &th.scopes[at..]);
        assert_eq!(env.get("x").and_then(Value::as_i64), Some(1));
        assert!(env.get("k").is_none());
    }
}
