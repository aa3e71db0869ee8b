//! 算术与比较
//!
//! 整数运算全部检查溢出；`/` 对 I64 是整数除法。
//! I64 与 Rat 之间没有内置的混合重载，需要时由 `conv:` 注册隐式转换。

use std::cmp::Ordering;

use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{Arg, Safety};
use crate::core::value::{Rat, Val, Value};
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let t = &rt.types;
    let ints = || vec![Arg::ty(&t.int), Arg::ty(&t.int)];
    let rats = || vec![Arg::ty(&t.rat), Arg::ty(&t.rat)];

    rt.native("+", ints(), Safety::Pure, |th| int_op(th, "+", i64::checked_add));
    rt.native("-", ints(), Safety::Pure, |th| int_op(th, "-", i64::checked_sub));
    rt.native("*", ints(), Safety::Pure, |th| int_op(th, "*", i64::checked_mul));
    rt.native("/", ints(), Safety::Pure, |th| int_op(th, "/", i64::checked_div));
    rt.native("mod", ints(), Safety::Pure, |th| {
        int_op(th, "mod", i64::checked_rem_euclid)
    });

    rt.native("+", rats(), Safety::Pure, |th| rat_op(th, "+", Rat::checked_add));
    rt.native("-", rats(), Safety::Pure, |th| rat_op(th, "-", Rat::checked_sub));
    rt.native("*", rats(), Safety::Pure, |th| rat_op(th, "*", Rat::checked_mul));
    rt.native("/", rats(), Safety::Pure, |th| rat_op(th, "/", Rat::checked_div));

    rt.native("rat", ints(), Safety::Pure, rat_fn);

    let any2 = || vec![Arg::ty(&t.any), Arg::ty(&t.any)];
    let cmp2 = || vec![Arg::ty(&t.cmp), Arg::ty(&t.cmp)];
    rt.native("=", any2(), Safety::Pure, |th| {
        compare_with(th, |a, b| Ok(a.equals(b)))
    });
    rt.native("==", any2(), Safety::Pure, |th| {
        compare_with(th, |a, b| Ok(a.same(b)))
    });
    rt.native("<", cmp2(), Safety::Pure, |th| order(th, |o| o == Ordering::Less));
    rt.native(">", cmp2(), Safety::Pure, |th| order(th, |o| o == Ordering::Greater));
    rt.native("<=", cmp2(), Safety::Pure, |th| order(th, |o| o != Ordering::Greater));
    rt.native(">=", cmp2(), Safety::Pure, |th| order(th, |o| o != Ordering::Less));
    rt.native("not", vec![Arg::ty(&t.any)], Safety::Pure, not_fn);
}

fn overflow(op: &str) -> TarnError {
    TarnError::new(ErrorKind::Arithmetic, format!("'{op}' overflows or divides by zero"))
}

fn int_op(th: &mut Thread, op: &str, f: fn(i64, i64) -> Option<i64>) -> Result<Control> {
    let b = th.pop_int()?;
    let a = th.pop_int()?;
    let r = f(a, b).ok_or_else(|| overflow(op))?;
    th.push(th.types.int(r));
    Ok(Control::Next)
}

fn pop_rat(th: &mut Thread) -> Result<Rat> {
    th.pop_as("Rat", |v| match v.val {
        Val::Rat(r) => Some(r),
        _ => None,
    })
}

fn rat_op(th: &mut Thread, op: &str, f: fn(Rat, Rat) -> Option<Rat>) -> Result<Control> {
    let b = pop_rat(th)?;
    let a = pop_rat(th)?;
    let r = f(a, b).ok_or_else(|| overflow(op))?;
    th.push(th.types.rational(r));
    Ok(Control::Next)
}

/// n d rat -> n/d
fn rat_fn(th: &mut Thread) -> Result<Control> {
    let den = th.pop_int()?;
    let num = th.pop_int()?;
    let r = Rat::new(num, den).ok_or_else(|| overflow("rat"))?;
    th.push(th.types.rational(r));
    Ok(Control::Next)
}

fn compare_with(
    th: &mut Thread,
    f: impl FnOnce(&Value, &Value) -> Result<bool>,
) -> Result<Control> {
    let b = th.pop()?;
    let a = th.pop()?;
    let r = f(&a, &b)?;
    th.push(th.types.boolean(r));
    Ok(Control::Next)
}

fn order(th: &mut Thread, f: fn(Ordering) -> bool) -> Result<Control> {
    compare_with(th, |a, b| {
        a.compare(b).map(f).ok_or_else(|| {
            TarnError::new(
                ErrorKind::TypeMismatch,
                format!("cannot order {} and {}", a.type_name(), b.type_name()),
            )
        })
    })
}

fn not_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    th.push(th.types.boolean(!v.truthy()));
    Ok(Control::Next)
}
