//! 具体类型的行为表
//!
//! 每个内置类型一个零大小（或只带元数据）的结构体，按需实现
//! [`Callable`] / [`Iterable`] / [`Stream`] 角色。

use std::sync::Arc;

use super::iter::io::ReadIter;
use super::iter::seq::{BinIter, CharIter, ListIter, Range, TableIter, WCharIter};
use super::iter::{IterCell, IterRef};
use super::{Control, Thread};
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::sync;
use crate::core::types::{Behavior, Callable, Iterable, Stream};
use crate::core::value::{Sym, Val, Value};

fn wrong_payload(role: &str, v: &Value) -> TarnError {
    TarnError::mismatch(role, v.type_name())
}

// ==================== 可迭代 ====================

pub struct IntBehavior;

impl Behavior for IntBehavior {
    fn iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Iterable for IntBehavior {
    fn iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match v.val {
            Val::I64(n) => Ok(IterCell::new(Range::new(0, n))),
            _ => Err(wrong_payload("I64", v)),
        }
    }
}

pub struct StrBehavior;

impl Behavior for StrBehavior {
    fn iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Iterable for StrBehavior {
    fn iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::Str(s) => Ok(IterCell::new(CharIter::new(s.clone()))),
            _ => Err(wrong_payload("Str", v)),
        }
    }
}

pub struct WStrBehavior;

impl Behavior for WStrBehavior {
    fn iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Iterable for WStrBehavior {
    fn iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::WStr(w) => Ok(IterCell::new(WCharIter::new(w.clone()))),
            _ => Err(wrong_payload("WStr", v)),
        }
    }
}

pub struct BinBehavior;

impl Behavior for BinBehavior {
    fn iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Iterable for BinBehavior {
    fn iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::Bin(b) => Ok(IterCell::new(BinIter::new(b.clone()))),
            _ => Err(wrong_payload("Bin", v)),
        }
    }
}

pub struct ListBehavior;

impl Behavior for ListBehavior {
    fn iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Iterable for ListBehavior {
    fn iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::List(items) => Ok(IterCell::new(ListIter::new(items.clone()))),
            _ => Err(wrong_payload("List", v)),
        }
    }
}

pub struct TableBehavior;

impl Behavior for TableBehavior {
    fn iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Iterable for TableBehavior {
    fn iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::Table(t) => Ok(IterCell::new(TableIter::new(t.clone()))),
            _ => Err(wrong_payload("Table", v)),
        }
    }
}

/// 迭代器本身：迭代返回同一个句柄
pub struct IterBehavior;

impl Behavior for IterBehavior {
    fn iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Iterable for IterBehavior {
    fn iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::Iter(it) => Ok(Arc::clone(it)),
            _ => Err(wrong_payload("Iter", v)),
        }
    }
}

// ==================== 可调用 ====================

pub struct FuncBehavior;

impl Behavior for FuncBehavior {
    fn callable(&self) -> Option<&dyn Callable> {
        Some(self)
    }
}

impl Callable for FuncBehavior {
    fn call(&self, target: &Value, th: &mut Thread, ret_pc: usize) -> Result<Control> {
        match &target.val {
            Val::Func(name) => th.dispatch(name, ret_pc),
            _ => Err(wrong_payload("Func", target)),
        }
    }
}

pub struct LambdaBehavior;

impl Behavior for LambdaBehavior {
    fn callable(&self) -> Option<&dyn Callable> {
        Some(self)
    }
}

impl Callable for LambdaBehavior {
    fn call(&self, target: &Value, th: &mut Thread, ret_pc: usize) -> Result<Control> {
        match &target.val {
            Val::Lambda(l) => {
                let safety = th.safety();
                th.enter_lambda(l, safety, ret_pc)
            }
            _ => Err(wrong_payload("Lambda", target)),
        }
    }
}

/// 调用标签 = 跳转
pub struct LabelBehavior;

impl Behavior for LabelBehavior {
    fn callable(&self) -> Option<&dyn Callable> {
        Some(self)
    }
}

impl Callable for LabelBehavior {
    fn call(&self, target: &Value, _th: &mut Thread, _ret_pc: usize) -> Result<Control> {
        match &target.val {
            Val::Label(l) => l.pc().map(Control::Jump).ok_or_else(|| {
                TarnError::new(ErrorKind::UnknownLabel, format!("label '{}' is unresolved", l.name))
            }),
            _ => Err(wrong_payload("Label", target)),
        }
    }
}

pub struct FiberBehavior;

impl Behavior for FiberBehavior {
    fn callable(&self) -> Option<&dyn Callable> {
        Some(self)
    }
}

impl Callable for FiberBehavior {
    fn call(&self, target: &Value, th: &mut Thread, ret_pc: usize) -> Result<Control> {
        match &target.val {
            Val::Fiber(f) => th.enter_fiber(f, ret_pc),
            _ => Err(wrong_payload("Fiber", target)),
        }
    }
}

// ==================== 流 ====================

pub struct FileBehavior;

impl Behavior for FileBehavior {
    fn stream(&self) -> Option<&dyn Stream> {
        Some(self)
    }
}

impl Stream for FileBehavior {
    fn read_iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::File(f) => Ok(IterCell::new(ReadIter::file(f.clone()))),
            _ => Err(wrong_payload("File", v)),
        }
    }

    fn write(&self, v: &Value, data: &[u8]) -> Result<()> {
        match &v.val {
            Val::File(f) => f.write(data),
            _ => Err(wrong_payload("File", v)),
        }
    }
}

pub struct SocketBehavior;

impl Behavior for SocketBehavior {
    fn stream(&self) -> Option<&dyn Stream> {
        Some(self)
    }
}

impl Stream for SocketBehavior {
    fn read_iter(&self, v: &Value, _th: &mut Thread) -> Result<IterRef> {
        match &v.val {
            Val::Socket(s) => Ok(IterCell::new(ReadIter::socket(s.clone()))),
            _ => Err(wrong_payload("Socket", v)),
        }
    }

    fn write(&self, v: &Value, data: &[u8]) -> Result<()> {
        match &v.val {
            Val::Socket(s) => s.write(data),
            _ => Err(wrong_payload("Socket", v)),
        }
    }
}

// ==================== 结构体 ====================

/// `struct:` 声明的类型：渲染时带上类型名和字段名
pub struct StructBehavior {
    pub name: Sym,
    pub fields: Vec<Sym>,
}

impl StructBehavior {
    fn render(&self, v: &Value, out: &mut String, verbose: bool) {
        let Val::Struct(values) = &v.val else {
            v.val.render(out, verbose);
            return;
        };
        out.push_str(&self.name);
        out.push('(');
        for (i, (field, value)) in self.fields.iter().zip(sync::read(values).iter()).enumerate() {
            if i > 0 {
                out.push(' ');
            }
            if verbose {
                out.push_str(field);
                out.push_str(": ");
            }
            value.dump_into(out);
        }
        out.push(')');
    }
}

impl Behavior for StructBehavior {
    fn print(&self, v: &Value, out: &mut String) {
        self.render(v, out, false)
    }

    fn dump(&self, v: &Value, out: &mut String) {
        self.render(v, out, true)
    }
}
