//! 迭代器协议
//!
//! 统一的拉取接口：`next` 返回元素、"暂无元素"（非阻塞源会阻塞时）或"已耗尽"。
//! 耗尽是终态：`IterCell` 记住它，之后的调用不再触达底层迭代器。

use std::sync::{Arc, Mutex};

use super::Thread;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::sync;
use crate::core::types::TypeRef;
use crate::core::value::Value;
use crate::runtime::registry::Builtins;

pub mod io;
pub mod seq;

/// 一次拉取的结果
#[derive(Debug, Clone)]
pub enum Next {
    Item(Value),
    /// 底层描述符会阻塞，稍后重试
    Pending,
    Done,
}

pub trait Iter: Send {
    fn next(&mut self, th: &mut Thread) -> Result<Next>;
}

enum Slot {
    Ready(Box<dyn Iter>),
    /// 正在 `next` 中（过滤 / 映射回调可能重入）
    Busy,
    Done,
}

/// 共享的迭代器句柄
pub struct IterCell {
    slot: Mutex<Slot>,
}

pub type IterRef = Arc<IterCell>;

impl IterCell {
    pub fn new(iter: impl Iter + 'static) -> IterRef {
        Arc::new(IterCell {
            slot: Mutex::new(Slot::Ready(Box::new(iter))),
        })
    }

    /// 已耗尽的迭代器
    pub fn done() -> IterRef {
        Arc::new(IterCell {
            slot: Mutex::new(Slot::Done),
        })
    }

    pub fn is_done(&self) -> bool {
        matches!(*sync::lock(&self.slot), Slot::Done)
    }

    /// 拉取下一个元素；不在持锁期间执行迭代器（迭代器可能回调用户代码）
    pub fn next(&self, th: &mut Thread) -> Result<Next> {
        let mut iter = {
            let mut slot = sync::lock(&self.slot);
            match std::mem::replace(&mut *slot, Slot::Busy) {
                Slot::Ready(iter) => iter,
                Slot::Busy => {
                    return Err(TarnError::new(
                        ErrorKind::Thread,
                        "iterator is already being advanced",
                    ))
                }
                Slot::Done => {
                    *slot = Slot::Done;
                    return Ok(Next::Done);
                }
            }
        };
        let result = iter.next(th);
        *sync::lock(&self.slot) = match &result {
            Ok(Next::Item(_)) | Ok(Next::Pending) => Slot::Ready(iter),
            Ok(Next::Done) | Err(_) => Slot::Done,
        };
        result
    }
}

/// 序列的元素类型：I64 N 迭代 0..N，其他按 `Seq<T>` 祖先取 T
pub fn elem_type(types: &Builtins, ty: &TypeRef) -> TypeRef {
    if ty.isa(&types.int) {
        return types.int.clone();
    }
    ty.ancestors()
        .into_iter()
        .find(|a| a.raw.as_ref().is_some_and(|r| r.id == types.seq.id))
        .and_then(|a| a.args.first().cloned())
        .unwrap_or_else(|| types.any.clone())
}

impl Thread {
    /// 通过类型的可迭代角色取得迭代器
    pub fn iterate(&mut self, v: &Value) -> Result<IterRef> {
        let behavior = v.ty.behavior.clone();
        match behavior.iterable() {
            Some(it) => it.iter(v, self),
            None => Err(TarnError::new(
                ErrorKind::TypeMismatch,
                format!("{} is not iterable", v.type_name()),
            )),
        }
    }

    /// 包装成带元素类型的 `Iter<T>` 值
    pub fn iter_of(&mut self, v: &Value) -> Result<Value> {
        if v.isa(&self.types.iter) {
            return Ok(v.clone());
        }
        let iter = self.iterate(v)?;
        let elem = elem_type(&self.types, &v.ty);
        self.rt.iter_value(iter, elem)
    }
}
