//! 标准库实现
//!
//! 原生函数直接操作线程的值栈：按声明的参数谓词分派后，自行弹出参数、压入结果。
//! 设计原则：
//! - 参数检查交给分派（谓词 + 隐式转换），函数体只取载荷
//! - 扁平化：所有函数注册在同一个命名空间
//! - 引擎创建时自动注册

use crate::core::error::{Result, TarnError};
use crate::core::value::{Shared, Table, Val, Value};
use crate::runtime::registry::Runtime;

pub mod collections;
pub mod concurrency;
pub mod control;
pub mod errors;
pub mod io;
pub mod iters;
pub mod math;
pub mod stack;
pub mod types;

/// 注册全部标准原生函数
pub fn register(rt: &Runtime) {
    stack::register(rt);
    math::register(rt);
    types::register(rt);
    control::register(rt);
    collections::register(rt);
    iters::register(rt);
    io::register(rt);
    concurrency::register(rt);
    errors::register(rt);
}

// ==================== 载荷提取 ====================

fn list_of(v: &Value) -> Result<Shared<Vec<Value>>> {
    match &v.val {
        Val::List(items) => Ok(items.clone()),
        _ => Err(TarnError::mismatch("List", v.type_name())),
    }
}

fn table_of(v: &Value) -> Result<Shared<Table>> {
    match &v.val {
        Val::Table(t) => Ok(t.clone()),
        _ => Err(TarnError::mismatch("Table", v.type_name())),
    }
}

fn int_of(v: &Value) -> Result<i64> {
    v.as_i64()
        .ok_or_else(|| TarnError::mismatch("I64", v.type_name()))
}
