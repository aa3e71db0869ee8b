//! 错误：raise errors error-kind error-message clear-errors

use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{Arg, Safety};
use crate::core::value::Val;
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let t = &rt.types;
    rt.native("raise", vec![Arg::ty(&t.string)], Safety::Pure, raise_fn);
    rt.native("raise", vec![Arg::ty(&t.error)], Safety::Pure, reraise_fn);
    rt.native("errors", vec![], Safety::Pure, errors_fn);
    rt.native("error-kind", vec![Arg::ty(&t.error)], Safety::Pure, kind_fn);
    rt.native("error-message", vec![Arg::ty(&t.error)], Safety::Pure, message_fn);
    rt.native("clear-errors", vec![Arg::ty(&t.symbol)], Safety::Const, clear_fn);
}

fn pop_error(th: &mut Thread) -> Result<TarnError> {
    th.pop_as("Error", |v| match &v.val {
        Val::Error(e) => Some((**e).clone()),
        _ => None,
    })
}

fn raise_fn(th: &mut Thread) -> Result<Control> {
    let message = th.pop_str()?;
    Err(TarnError::new(ErrorKind::User, message))
}

fn reraise_fn(th: &mut Thread) -> Result<Control> {
    Err(pop_error(th)?)
}

/// 最近 try 帧目前收集到的错误
fn errors_fn(th: &mut Thread) -> Result<Control> {
    let errors = match th.tries.last() {
        Some(frame) => frame.errors.clone(),
        None => Vec::new(),
    };
    let values = errors
        .into_iter()
        .map(|e| th.types.error_value(e))
        .collect();
    let list = th.rt.list_value(values, th.types.error.clone())?;
    th.push(list);
    Ok(Control::Next)
}

fn kind_fn(th: &mut Thread) -> Result<Control> {
    let e = pop_error(th)?;
    th.push(th.types.symbol(e.kind.as_str()));
    Ok(Control::Next)
}

fn message_fn(th: &mut Thread) -> Result<Control> {
    let e = pop_error(th)?;
    th.push(th.types.string(e.message));
    Ok(Control::Next)
}

/// #kind clear-errors：从最近的 try 帧删除该种类的错误，压入删除个数
fn clear_fn(th: &mut Thread) -> Result<Control> {
    let name = th.pop_sym()?;
    let kind = ErrorKind::from_name(&name).ok_or_else(|| {
        TarnError::new(ErrorKind::UnknownId, format!("unknown error kind '{name}'"))
    })?;
    let removed = match th.tries.last_mut() {
        Some(frame) => {
            let before = frame.errors.len();
            frame.errors.retain(|e| e.kind != kind);
            before - frame.errors.len()
        }
        None => 0,
    };
    th.push(th.types.int(removed as i64));
    Ok(Control::Next)
}
