//! 类型查询：type isa is

use crate::core::error::{Result, TarnError};
use crate::core::func::{Arg, Safety};
use crate::core::types::TypeRef;
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let t = &rt.types;
    rt.native("type", vec![Arg::ty(&t.any)], Safety::Pure, type_fn);
    rt.native("isa", vec![Arg::ty(&t.meta), Arg::ty(&t.meta)], Safety::Pure, isa_fn);
    rt.native("is", vec![Arg::ty(&t.any), Arg::ty(&t.meta)], Safety::Pure, is_fn);
}

fn pop_type(th: &mut Thread) -> Result<TypeRef> {
    let v = th.pop()?;
    v.as_type()
        .cloned()
        .ok_or_else(|| TarnError::mismatch("Type", v.type_name()))
}

fn type_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    th.push(th.types.type_value(&v.ty));
    Ok(Control::Next)
}

/// 子类型 父类型 isa
fn isa_fn(th: &mut Thread) -> Result<Control> {
    let parent = pop_type(th)?;
    let child = pop_type(th)?;
    th.push(th.types.boolean(child.isa(&parent)));
    Ok(Control::Next)
}

/// 值 类型 is
fn is_fn(th: &mut Thread) -> Result<Control> {
    let ty = pop_type(th)?;
    let v = th.pop()?;
    th.push(th.types.boolean(v.isa(&ty)));
    Ok(Control::Next)
}
