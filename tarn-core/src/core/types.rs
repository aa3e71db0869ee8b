//! 类型图
//!
//! 类型由名字、可选的泛型模板 (`raw`)、声明的父类型、类型参数和行为表组成。
//! 子类型关系是父类型边的自反传递闭包，外加两条规则：
//! 同一模板的实例按参数协变；`Nil` 以及 `T` 都是 `Opt<T>` 的子类型。

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::error::Result;
use super::value::Value;
use crate::runtime::iter::IterRef;
use crate::runtime::{Control, Thread};

pub type TypeRef = Arc<Type>;

pub struct Type {
    pub id: usize,
    /// 渲染名，例如 `List<I64>`
    pub name: String,
    /// 泛型实例的模板
    pub raw: Option<TypeRef>,
    pub supers: Vec<TypeRef>,
    pub args: Vec<TypeRef>,
    /// 模板声明的类型参数个数；非模板为 0
    pub params: usize,
    pub behavior: Arc<dyn Behavior>,
}

impl Type {
    /// 未实例化的泛型模板
    pub fn is_template(&self) -> bool {
        self.params > 0 && self.raw.is_none()
    }

    /// 子类型判定
    pub fn isa(self: &Arc<Self>, other: &TypeRef) -> bool {
        if self.id == other.id || other.name == "Any" {
            return true;
        }
        if let Some(raw) = &other.raw {
            // Nil isa Opt<T>，T isa Opt<T>
            if raw.name == "Opt" {
                if self.name == "Nil" {
                    return true;
                }
                if let Some(inner) = other.args.first() {
                    if self.isa(inner) {
                        return true;
                    }
                }
            }
            // 同模板协变
            if let Some(own_raw) = &self.raw {
                if own_raw.id == raw.id
                    && self.args.len() == other.args.len()
                    && self.args.iter().zip(&other.args).all(|(a, b)| a.isa(b))
                {
                    return true;
                }
            }
        }
        self.supers.iter().any(|s| s.isa(other))
    }

    /// 广度优先遍历自身及祖先
    pub fn ancestors(self: &Arc<Self>) -> Vec<TypeRef> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([Arc::clone(self)]);
        let mut out = Vec::new();
        while let Some(t) = queue.pop_front() {
            if !seen.insert(t.id) {
                continue;
            }
            queue.extend(t.supers.iter().cloned());
            out.push(t);
        }
        out
    }
}

/// 最小公共父类型；找不到时退化为 `any`
pub fn get_super(a: &TypeRef, b: &TypeRef, any: &TypeRef) -> TypeRef {
    if b.isa(a) {
        return Arc::clone(a);
    }
    if a.isa(b) {
        return Arc::clone(b);
    }
    a.ancestors()
        .into_iter()
        .find(|s| b.isa(s))
        .unwrap_or_else(|| Arc::clone(any))
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Type {}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({}#{})", self.name, self.id)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ==================== 行为表 ====================

/// 类型行为：相等、排序、渲染为必备角色，调用 / 迭代 / 流为可选角色
pub trait Behavior: Send + Sync {
    fn eq(&self, a: &Value, b: &Value) -> bool {
        a.val.identical(&b.val)
    }

    fn eqval(&self, a: &Value, b: &Value) -> bool {
        a.val.equals(&b.val)
    }

    fn cmp(&self, a: &Value, b: &Value) -> Option<Ordering> {
        a.val.compare(&b.val)
    }

    fn print(&self, v: &Value, out: &mut String) {
        v.val.render(out, false)
    }

    fn dump(&self, v: &Value, out: &mut String) {
        v.val.render(out, true)
    }

    fn callable(&self) -> Option<&dyn Callable> {
        None
    }

    fn iterable(&self) -> Option<&dyn Iterable> {
        None
    }

    fn stream(&self) -> Option<&dyn Stream> {
        None
    }
}

/// 可调用角色
pub trait Callable: Send + Sync {
    /// 调用 `target`，返回控制转移；`ret_pc` 是调用完成后继续执行的位置
    fn call(&self, target: &Value, th: &mut Thread, ret_pc: usize) -> Result<Control>;
}

/// 可迭代角色
pub trait Iterable: Send + Sync {
    fn iter(&self, v: &Value, th: &mut Thread) -> Result<IterRef>;
}

/// 流角色（文件、套接字）
pub trait Stream: Send + Sync {
    /// 非阻塞分块读取迭代器
    fn read_iter(&self, v: &Value, th: &mut Thread) -> Result<IterRef>;
    fn write(&self, v: &Value, data: &[u8]) -> Result<()>;
}

/// 只有默认角色的行为
pub struct Plain;

impl Behavior for Plain {}
