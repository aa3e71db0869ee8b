//! 函数重载集
//!
//! 一个函数名对应一组实现；每个实现声明安全级别和参数谓词列表。
//! 参数按从左到右编号，栈顶是最后一个参数。

use std::fmt;
use std::sync::Arc;

use super::error::Result;
use super::label::LambdaDef;
use super::types::TypeRef;
use super::value::{Sym, Value};
use crate::runtime::{Control, Thread};

/// 安全级别：Pure < Const < Safe < Unsafe
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Safety {
    Pure,
    Const,
    Safe,
    Unsafe,
}

impl fmt::Display for Safety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Safety::Pure => "pure",
            Safety::Const => "const",
            Safety::Safe => "safe",
            Safety::Unsafe => "unsafe",
        })
    }
}

/// 任意谓词：候选值 + 整个参数窗口
pub type Predicate = Arc<dyn Fn(&Value, &[Value]) -> bool + Send + Sync>;

/// 参数谓词
#[derive(Clone)]
pub enum Arg {
    /// 固定类型（子类型亦可）
    Type(TypeRef),
    /// 与第 N 个参数类型相同
    Same(usize),
    /// 第 N 个参数类型的第 K 个类型参数
    TypeArg(usize, usize),
    Pred(Predicate),
}

/// 单个参数的匹配结果
#[derive(Debug)]
pub enum ArgMatch {
    Yes,
    No,
    /// 类型不符，但可以尝试隐式转换到该类型
    Convert(TypeRef),
}

impl Arg {
    pub fn ty(t: &TypeRef) -> Arg {
        Arg::Type(Arc::clone(t))
    }

    pub fn pred(f: impl Fn(&Value, &[Value]) -> bool + Send + Sync + 'static) -> Arg {
        Arg::Pred(Arc::new(f))
    }

    /// 检查窗口中第 `i` 个参数
    pub fn check(&self, window: &[Value], i: usize) -> ArgMatch {
        let v = &window[i];
        match self {
            Arg::Type(t) => {
                if v.isa(t) {
                    ArgMatch::Yes
                } else {
                    ArgMatch::Convert(Arc::clone(t))
                }
            }
            Arg::Same(n) => match window.get(*n) {
                Some(other) if other.ty.id == v.ty.id => ArgMatch::Yes,
                _ => ArgMatch::No,
            },
            Arg::TypeArg(n, k) => match window.get(*n).and_then(|o| o.ty.args.get(*k)) {
                Some(t) if v.isa(t) => ArgMatch::Yes,
                Some(t) => ArgMatch::Convert(Arc::clone(t)),
                None => ArgMatch::No,
            },
            Arg::Pred(f) => {
                if f(v, window) {
                    ArgMatch::Yes
                } else {
                    ArgMatch::No
                }
            }
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Type(t) => write!(f, "{}", t.name),
            Arg::Same(n) => write!(f, "%{n}"),
            Arg::TypeArg(n, k) => write!(f, "%{n}.{k}"),
            Arg::Pred(_) => f.write_str("<pred>"),
        }
    }
}

/// 原生实现：自行弹出参数、压入结果
pub type NativeFn = Arc<dyn Fn(&mut Thread) -> Result<Control> + Send + Sync>;

#[derive(Clone)]
pub enum FuncBody {
    Native(NativeFn),
    /// `func:` 定义的用户实现
    Lambda(Arc<LambdaDef>),
}

pub struct FuncImp {
    pub id: usize,
    pub name: Sym,
    pub args: Vec<Arg>,
    pub safety: Safety,
    pub body: FuncBody,
}

impl fmt::Debug for FuncImp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}:{}", self.name, self.args, self.safety)
    }
}

/// 重载集；注册时整体替换（写时复制），读者拿到的快照不受影响
#[derive(Clone)]
pub struct Func {
    pub name: Sym,
    pub imps: Vec<Arc<FuncImp>>,
}

impl Func {
    pub fn new(name: Sym) -> Self {
        Func {
            name,
            imps: Vec::new(),
        }
    }

    pub fn with_imp(&self, imp: Arc<FuncImp>) -> Func {
        let mut next = self.clone();
        next.imps.push(imp);
        next
    }

    /// 按注册时间倒序（最新优先）
    pub fn candidates(&self) -> impl Iterator<Item = &Arc<FuncImp>> {
        self.imps.iter().rev()
    }

    pub fn contains(&self, imp_id: usize) -> bool {
        self.imps.iter().any(|imp| imp.id == imp_id)
    }
}
