//! 嵌入 API
//!
//! `Engine` 持有共享的 [`Runtime`] 和一个主线程。创建时注册标准库与内置宏；
//! 宿主可以继续注册类型、原生函数与宏，再编译运行源码。

use std::sync::Arc;

use tarn_log::{debug, Logger};

use crate::compiler;
use crate::core::error::Result;
use crate::core::func::{Arg, FuncImp, Safety};
use crate::core::op::Op;
use crate::core::types::{Behavior, TypeRef};
use crate::core::value::Value;
use crate::runtime::registry::{Builtins, EngineConfig, Runtime};
use crate::runtime::{stdlib, Control, Thread};

const TARGET: &str = "tarn::vm";

/// 引擎实例
pub struct Engine {
    rt: Arc<Runtime>,
    main: Thread,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), Logger::noop())
    }

    pub fn with_logger(logger: Arc<Logger>) -> Self {
        Self::with_config(EngineConfig::default(), logger)
    }

    pub fn with_config(config: EngineConfig, logger: Arc<Logger>) -> Self {
        let rt = Runtime::new(config, logger);
        stdlib::register(&rt);
        compiler::macros::register(&rt);
        debug!(target: TARGET, rt.logger, "engine ready");
        let main = Thread::new(rt.clone());
        Engine { rt, main }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.rt
    }

    pub fn types(&self) -> &Builtins {
        &self.rt.types
    }

    /// 主线程
    pub fn thread(&self) -> &Thread {
        &self.main
    }

    pub fn thread_mut(&mut self) -> &mut Thread {
        &mut self.main
    }

    /// 主线程目前的完整操作序列
    pub fn ops(&self) -> &[Op] {
        self.main.ops()
    }

    // ==================== 注册 ====================

    pub fn register_native<F>(&self, name: &str, args: Vec<Arg>, safety: Safety, f: F) -> Arc<FuncImp>
    where
        F: Fn(&mut Thread) -> Result<Control> + Send + Sync + 'static,
    {
        self.rt.native(name, args, safety, f)
    }

    pub fn register_type(
        &self,
        name: &str,
        supers: Vec<TypeRef>,
        behavior: Arc<dyn Behavior>,
    ) -> Result<TypeRef> {
        self.rt.register_type(name, supers, behavior)
    }

    pub fn register_macro(&self, name: &str, m: Arc<dyn compiler::Macro>) {
        self.rt.register_macro(name, m)
    }

    // ==================== 编译与执行 ====================

    /// 编译并追加到主线程，返回新代码的起始 pc
    pub fn compile(&mut self, src: &str) -> Result<usize> {
        self.main.compile(src)
    }

    pub fn run(&mut self) -> Result<()> {
        self.main.run()
    }

    pub fn run_until(&mut self, stop: usize) -> Result<()> {
        self.main.run_until(stop)
    }

    /// 编译并从新代码的起点运行；值栈跨调用保留
    pub fn eval(&mut self, src: &str) -> Result<()> {
        let start = self.main.compile(src)?;
        self.main.pc = start;
        self.main.run()
    }

    // ==================== 值栈 ====================

    pub fn push(&mut self, v: Value) {
        self.main.push(v)
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.main.pop()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.main.peek()
    }

    pub fn stack(&self) -> &[Value] {
        self.main.stack()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use tarn_log::{Level, LogRingBuffer};

    #[test]
    fn test_eval_keeps_stack() {
        let mut engine = Engine::new();
        engine.eval("1 2").unwrap();
        engine.eval("+").unwrap();
        assert_eq!(engine.stack().len(), 1);
        assert_eq!(engine.pop().unwrap().as_i64(), Some(3));
    }

    #[test]
    fn test_failed_compile_appends_nothing() {
        let mut engine = Engine::new();
        engine.eval("1").unwrap();
        let before = engine.ops().len();
        let err = engine.eval("func: f (I64) 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedMacro);
        assert_eq!(engine.ops().len(), before);
        assert!(engine.runtime().find_func("f").is_none());
    }

    #[test]
    fn test_host_native() {
        let mut engine = Engine::new();
        let int = engine.types().int.clone();
        engine.register_native("answer", vec![], Safety::Pure, move |th: &mut Thread| {
            th.push(Value::new(int.clone(), crate::core::value::Val::I64(42)));
            Ok(Control::Next)
        });
        engine.eval("answer 1 +").unwrap();
        assert_eq!(engine.peek().and_then(Value::as_i64), Some(43));
    }

    #[test]
    fn test_logs_to_ring() {
        let ring = LogRingBuffer::new(64);
        let logger = Logger::new(Level::Debug).with_sink(ring.clone());
        let mut engine = Engine::with_logger(logger);
        engine.eval("1 2 +").unwrap();
        assert!(ring
            .dump_records()
            .iter()
            .any(|r| r.target == "tarn::compiler"));
    }
}
