//! 控制：call if defer-call

use crate::core::error::Result;
use crate::core::func::{Arg, Safety};
use crate::core::value::Value;
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let any = rt.types.any.clone();
    rt.native("call", vec![Arg::ty(&any)], Safety::Pure, call_fn);
    rt.native(
        "if",
        vec![Arg::ty(&any), Arg::ty(&any), Arg::ty(&any)],
        Safety::Pure,
        if_fn,
    );
    rt.native("defer-call", vec![Arg::ty(&any)], Safety::Pure, defer_fn);
}

fn callable(v: &Value) -> bool {
    v.ty.behavior.callable().is_some()
}

fn call_fn(th: &mut Thread) -> Result<Control> {
    let target = th.pop()?;
    let ret_pc = th.ret_pc();
    th.call_value(&target, ret_pc)
}

/// cond then else if：可调用的分支被调用，其他分支值直接压入
fn if_fn(th: &mut Thread) -> Result<Control> {
    let otherwise = th.pop()?;
    let then = th.pop()?;
    let cond = th.pop()?;
    let branch = if cond.truthy() { then } else { otherwise };
    if callable(&branch) {
        let ret_pc = th.ret_pc();
        th.call_value(&branch, ret_pc)
    } else {
        th.push(branch);
        Ok(Control::Next)
    }
}

/// 在当前作用域退出时调用
fn defer_fn(th: &mut Thread) -> Result<Control> {
    let thunk = th.pop()?;
    th.scope_mut().defers.push(thunk);
    Ok(Control::Next)
}
