//! 重载分派
//!
//! 两轮匹配，最新注册的实现优先：
//! 1. 精确匹配：参数谓词从右到左对栈顶窗口逐个检查（不弹出）
//! 2. 转换匹配：类型不符的参数各尝试一次精确 from → to 的隐式转换
//!
//! 调用点（pc）记住上次命中的实现，但每次仍重新校验。

use std::sync::Arc;

use tarn_log::{debug, trace};

use super::thread::Thread;
use super::Control;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{ArgMatch, FuncBody, FuncImp};
use crate::core::label::Lambda;
use crate::core::types::TypeRef;
use crate::core::value::{Env, Value};

const TARGET: &str = "tarn::vm";

/// 报错时最多展示的栈顶值个数
const SHOWN_VALUES: usize = 4;

enum Fit {
    Exact,
    /// (窗口下标, 目标类型)
    Convert(Vec<(usize, TypeRef)>),
}

impl Thread {
    /// 按名字分派并调用
    pub fn dispatch(&mut self, name: &str, ret_pc: usize) -> Result<Control> {
        let func = self
            .rt
            .find_func(name)
            .ok_or_else(|| TarnError::unknown_id(name))?;
        let safety = self.safety();

        if let Some(imp) = self.call_cache.get(&self.pc).cloned() {
            if func.contains(imp.id)
                && imp.safety <= safety
                && matches!(self.fit(&imp), Some(Fit::Exact))
            {
                return self.invoke(&imp, ret_pc);
            }
            self.call_cache.remove(&self.pc);
        }

        let mut blocked = false;
        let mut convertible = Vec::new();
        for imp in func.candidates() {
            match self.fit(imp) {
                Some(Fit::Exact) if imp.safety <= safety => {
                    self.call_cache.insert(self.pc, imp.clone());
                    return self.invoke(imp, ret_pc);
                }
                Some(Fit::Exact) => blocked = true,
                Some(Fit::Convert(convs)) if imp.safety <= safety => {
                    convertible.push((imp.clone(), convs))
                }
                _ => {}
            }
        }

        for (imp, convs) in convertible {
            if let Some(plan) = self.conversion_plan(imp.args.len(), &convs) {
                debug!(target: TARGET, self.logger, "{} applies after {} conversion(s)", name, plan.len());
                self.convert(imp.args.len(), plan)?;
                return self.invoke(&imp, ret_pc);
            }
        }

        if blocked {
            return Err(TarnError::new(
                ErrorKind::UnsafeCall,
                format!("'{name}' is not allowed at safety level {safety}"),
            ));
        }
        Err(TarnError::new(
            ErrorKind::NotApplicable,
            format!("'{}' is not applicable to {}", name, self.describe_top()),
        ))
    }

    fn fit(&self, imp: &FuncImp) -> Option<Fit> {
        let stack = self.stack();
        let n = imp.args.len();
        if stack.len() < n {
            return None;
        }
        let window = &stack[stack.len() - n..];
        let mut convs = Vec::new();
        for i in (0..n).rev() {
            match imp.args[i].check(window, i) {
                ArgMatch::Yes => {}
                ArgMatch::No => return None,
                ArgMatch::Convert(t) => convs.push((i, t)),
            }
        }
        if convs.is_empty() {
            Some(Fit::Exact)
        } else {
            Some(Fit::Convert(convs))
        }
    }

    /// 每个不符的参数都必须有注册的转换
    fn conversion_plan(&self, n: usize, convs: &[(usize, TypeRef)]) -> Option<Vec<(usize, Value)>> {
        let stack = self.stack();
        let window = &stack[stack.len() - n..];
        convs
            .iter()
            .map(|(i, to)| self.rt.find_conv(&window[*i].ty, to).map(|c| (*i, c)))
            .collect()
    }

    /// 就地替换窗口中的操作数
    fn convert(&mut self, n: usize, plan: Vec<(usize, Value)>) -> Result<()> {
        for (i, conv) in plan {
            let at = self.stack().len() - n + i;
            let operand = self.stack()[at].clone();
            let converted = self
                .call_sync(&conv, vec![operand])?
                .ok_or_else(|| TarnError::underflow("conversion"))?;
            self.stack_mut()[at] = converted;
        }
        Ok(())
    }

    fn describe_top(&self) -> String {
        let stack = self.stack();
        let shown = &stack[stack.len().saturating_sub(SHOWN_VALUES)..];
        let items: Vec<String> = shown.iter().map(|v| format!("{v:?}")).collect();
        format!("[{}]", items.join(" "))
    }

    fn invoke(&mut self, imp: &Arc<FuncImp>, ret_pc: usize) -> Result<Control> {
        trace!(target: TARGET, self.logger, "invoke {:?}", imp);
        match &imp.body {
            FuncBody::Native(f) => {
                let saved = self.set_ret_pc(ret_pc);
                let result = f(self);
                self.set_ret_pc(saved);
                match result? {
                    Control::Next => Ok(Control::Jump(ret_pc)),
                    other => Ok(other),
                }
            }
            FuncBody::Lambda(def) => {
                let lambda = Lambda::new(def.clone(), Env::new());
                self.enter_lambda(&lambda, imp.safety, ret_pc)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::func::{Arg, Safety};
    use crate::runtime::registry::{EngineConfig, Runtime};
    use tarn_log::Logger;

    fn thread() -> Thread {
        Thread::new(Runtime::new(EngineConfig::default(), Logger::noop()))
    }

    #[test]
    fn test_latest_overload_wins() {
        let mut th = thread();
        let int = th.types.int.clone();
        th.rt.native("pick", vec![Arg::ty(&int)], Safety::Pure, |th| {
            th.pop()?;
            th.push(th.types.int(1));
            Ok(Control::Next)
        });
        th.rt.native("pick", vec![Arg::ty(&int)], Safety::Pure, |th| {
            th.pop()?;
            th.push(th.types.int(2));
            Ok(Control::Next)
        });
        th.push(th.types.int(0));
        assert_eq!(th.dispatch("pick", 5).unwrap(), Control::Jump(5));
        assert_eq!(th.pop().unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_not_applicable_and_unknown() {
        let mut th = thread();
        let int = th.types.int.clone();
        th.rt.native("inc", vec![Arg::ty(&int)], Safety::Pure, |_| Ok(Control::Next));
        th.push(th.types.string("x"));
        assert_eq!(th.dispatch("inc", 1).unwrap_err().kind, ErrorKind::NotApplicable);
        assert_eq!(th.dispatch("nope", 1).unwrap_err().kind, ErrorKind::UnknownId);
    }

    #[test]
    fn test_unsafe_call_rejected() {
        let mut th = thread();
        th.rt.native("boom", vec![], Safety::Unsafe, |_| Ok(Control::Next));
        assert_eq!(th.dispatch("boom", 1).unwrap_err().kind, ErrorKind::UnsafeCall);
        th.set_root_safety(Safety::Unsafe);
        assert!(th.dispatch("boom", 1).is_ok());
    }

    #[test]
    fn test_same_type_predicate() {
        let mut th = thread();
        let any = th.types.any.clone();
        th.rt.native("eq?", vec![Arg::ty(&any), Arg::Same(0)], Safety::Pure, |_| {
            Ok(Control::Next)
        });
        th.push(th.types.int(1));
        th.push(th.types.string("a"));
        assert_eq!(th.dispatch("eq?", 1).unwrap_err().kind, ErrorKind::NotApplicable);
        th.push(th.types.string("b"));
        assert!(th.dispatch("eq?", 1).is_ok());
    }
}
