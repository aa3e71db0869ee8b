//! 集合：len push pop get put pair left right list table bin str
//!
//! `push` / `pop` / `put` 把容器留在栈上，便于连续操作。

use std::sync::Arc;

use super::{int_of, list_of, table_of};
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{Arg, Safety};
use crate::core::sync;
use crate::core::value::{Table, Val, Value};
use crate::runtime::iter::{elem_type, Next};
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let t = &rt.types;
    rt.native("len", vec![Arg::ty(&t.seq)], Safety::Pure, len_fn);
    rt.native(
        "push",
        vec![Arg::ty(&t.list), Arg::TypeArg(0, 0)],
        Safety::Const,
        push_fn,
    );
    rt.native("pop", vec![Arg::ty(&t.list)], Safety::Const, pop_fn);
    rt.native("get", vec![Arg::ty(&t.list), Arg::ty(&t.int)], Safety::Pure, list_get_fn);
    rt.native("get", vec![Arg::ty(&t.table), Arg::TypeArg(0, 0)], Safety::Pure, table_get_fn);
    rt.native(
        "put",
        vec![Arg::ty(&t.list), Arg::ty(&t.int), Arg::TypeArg(0, 0)],
        Safety::Const,
        list_put_fn,
    );
    rt.native(
        "put",
        vec![Arg::ty(&t.table), Arg::TypeArg(0, 0), Arg::TypeArg(0, 1)],
        Safety::Const,
        table_put_fn,
    );
    rt.native("pair", vec![Arg::ty(&t.any), Arg::ty(&t.any)], Safety::Pure, pair_fn);
    rt.native("left", vec![Arg::ty(&t.pair)], Safety::Pure, |th| side(th, true));
    rt.native("right", vec![Arg::ty(&t.pair)], Safety::Pure, |th| side(th, false));
    rt.native("list", vec![Arg::ty(&t.any)], Safety::Safe, list_fn);
    rt.native("table", vec![Arg::ty(&t.any)], Safety::Safe, table_fn);
    rt.native("bin", vec![Arg::ty(&t.any)], Safety::Safe, bin_fn);
    rt.native("bin", vec![Arg::ty(&t.string)], Safety::Pure, str_bin_fn);
    rt.native("str", vec![Arg::ty(&t.any)], Safety::Pure, str_fn);
    rt.native("str", vec![Arg::ty(&t.bin)], Safety::Pure, bin_str_fn);
}

fn len_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    let n = match &v.val {
        Val::List(items) => sync::read(items).len(),
        Val::Table(t) => sync::read(t).len(),
        Val::Str(s) => s.chars().count(),
        Val::WStr(w) => w.len(),
        Val::Bin(b) => sync::read(b).len(),
        _ => {
            return Err(TarnError::new(
                ErrorKind::TypeMismatch,
                format!("{} has no length", v.type_name()),
            ))
        }
    };
    th.push(th.types.int(n as i64));
    Ok(Control::Next)
}

fn push_fn(th: &mut Thread) -> Result<Control> {
    let item = th.pop()?;
    let list = th.peek().ok_or_else(|| TarnError::underflow("push"))?;
    let items = list_of(list)?;
    sync::write(&items).push(item);
    Ok(Control::Next)
}

fn pop_fn(th: &mut Thread) -> Result<Control> {
    let list = th.peek().ok_or_else(|| TarnError::underflow("pop"))?;
    let items = list_of(list)?;
    let item = sync::write(&items).pop();
    let item = item.unwrap_or_else(|| th.types.nil());
    th.push(item);
    Ok(Control::Next)
}

fn index(i: i64, len: usize) -> Result<usize> {
    usize::try_from(i)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| {
            TarnError::new(
                ErrorKind::IndexOutOfBounds,
                format!("index {i} out of bounds for length {len}"),
            )
        })
}

fn list_get_fn(th: &mut Thread) -> Result<Control> {
    let i = th.pop_int()?;
    let items = list_of(&th.pop()?)?;
    let item = {
        let items = sync::read(&items);
        items[index(i, items.len())?].clone()
    };
    th.push(item);
    Ok(Control::Next)
}

fn table_get_fn(th: &mut Thread) -> Result<Control> {
    let key = th.pop()?;
    let table = table_of(&th.pop()?)?;
    let v = sync::read(&table).get(&key).cloned();
    let v = v.unwrap_or_else(|| th.types.nil());
    th.push(v);
    Ok(Control::Next)
}

fn list_put_fn(th: &mut Thread) -> Result<Control> {
    let item = th.pop()?;
    let i = th.pop_int()?;
    let list = th.peek().ok_or_else(|| TarnError::underflow("put"))?;
    let items = list_of(list)?;
    let mut items = sync::write(&items);
    let at = index(i, items.len())?;
    items[at] = item;
    Ok(Control::Next)
}

fn table_put_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    let k = th.pop()?;
    let table = th.peek().ok_or_else(|| TarnError::underflow("put"))?;
    let table = table_of(table)?;
    sync::write(&table).insert(k, v);
    Ok(Control::Next)
}

fn pair_fn(th: &mut Thread) -> Result<Control> {
    let right = th.pop()?;
    let left = th.pop()?;
    let pair = th.rt.pair_value(left, right)?;
    th.push(pair);
    Ok(Control::Next)
}

fn side(th: &mut Thread, left: bool) -> Result<Control> {
    let v = th.pop()?;
    let pair = match &v.val {
        Val::Pair(p) => Arc::clone(p),
        _ => return Err(TarnError::mismatch("Pair", v.type_name())),
    };
    th.push(if left { pair.0.clone() } else { pair.1.clone() });
    Ok(Control::Next)
}

/// 把序列拉取到底；暂无元素时退避等待
pub(crate) fn drain(th: &mut Thread, seq: &Value) -> Result<Vec<Value>> {
    let iter = th.iterate(seq)?;
    let mut backoff = crate::runtime::poll::Backoff::from_limits(&th.rt.config.limits);
    let mut out = Vec::new();
    loop {
        match iter.next(th)? {
            Next::Item(v) => {
                out.push(v);
                backoff.reset();
            }
            Next::Pending => backoff.wait(),
            Next::Done => return Ok(out),
        }
    }
}

/// 任意序列收集为列表，元素类型取序列的元素类型
fn list_fn(th: &mut Thread) -> Result<Control> {
    let seq = th.pop()?;
    let elem = elem_type(&th.types, &seq.ty);
    let items = drain(th, &seq)?;
    let list = th.rt.list_value(items, elem)?;
    th.push(list);
    Ok(Control::Next)
}

/// 由 `Pair<K,V>` 序列建表
fn table_fn(th: &mut Thread) -> Result<Control> {
    let seq = th.pop()?;
    let elem = elem_type(&th.types, &seq.ty);
    let (key, value) = match (&elem.raw, elem.args.as_slice()) {
        (Some(raw), [k, v]) if raw.id == th.types.pair.id => (k.clone(), v.clone()),
        _ => (th.types.any.clone(), th.types.any.clone()),
    };
    let mut table = Table::new();
    for item in drain(th, &seq)? {
        match &item.val {
            Val::Pair(p) => {
                table.insert(p.0.clone(), p.1.clone());
            }
            _ => return Err(TarnError::mismatch("Pair", item.type_name())),
        }
    }
    let table = th.rt.table_value(table, key, value)?;
    th.push(table);
    Ok(Control::Next)
}

/// I64 序列 -> 字节缓冲区
fn bin_fn(th: &mut Thread) -> Result<Control> {
    let seq = th.pop()?;
    let bytes = drain(th, &seq)?
        .iter()
        .map(|v| {
            let n = int_of(v)?;
            u8::try_from(n).map_err(|_| {
                TarnError::new(ErrorKind::Arithmetic, format!("{n} is not a byte"))
            })
        })
        .collect::<Result<Vec<u8>>>()?;
    th.push(th.types.bin_value(bytes));
    Ok(Control::Next)
}

fn str_bin_fn(th: &mut Thread) -> Result<Control> {
    let s = th.pop_str()?;
    th.push(th.types.bin_value(s.into_bytes()));
    Ok(Control::Next)
}

fn str_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    th.push(th.types.string(v.to_string()));
    Ok(Control::Next)
}

fn bin_str_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    let text = match &v.val {
        Val::Bin(b) => String::from_utf8_lossy(&sync::read(b)).into_owned(),
        _ => return Err(TarnError::mismatch("Bin", v.type_name())),
    };
    th.push(th.types.string(text));
    Ok(Control::Next)
}
