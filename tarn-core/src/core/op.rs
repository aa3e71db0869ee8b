//! 操作序列
//!
//! 编译器把 token 翻译成 `Op`，多轮 pass 改写后由 finalize 分配 pc。
//! 线程按 pc 执行 `Vec<Op>`；同一个序列可以被多个线程共享（`Arc`）。

use std::fmt;
use std::sync::Arc;

use super::func::Safety;
use super::label::{Label, LambdaDef};
use super::types::TypeRef;
use super::value::{Sym, Value};

/// lambda 的两种用途
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LambdaKind {
    /// `{...}`：执行到这里时压入闭包，然后跳过函数体
    Closure,
    /// `func:` / `conv:` 的函数体：只跳过，不压值
    Body,
}

/// 结构化非局部退出
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    Return,
    Recall,
    Yield,
    Break,
}

impl ExitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitKind::Return => "return",
            ExitKind::Recall => "recall",
            ExitKind::Yield => "yield",
            ExitKind::Break => "break",
        }
    }
}

/// 字符串插值片段
#[derive(Clone, Debug, PartialEq)]
pub enum FmtPart {
    Lit(String),
    /// 变量名 + 是否使用详细形式（`@name`）
    Var(Sym, bool),
}

#[derive(Clone)]
pub enum Op {
    Push(Value),
    PushMany(Vec<Value>),
    Drop(usize),
    /// 检查栈顶类型；None 时类型值在栈顶之上
    Check(Option<TypeRef>),
    /// 未解析的标识符，运行时按 函数 → 类型 查找
    Deref(Sym),
    Call(Sym),
    /// `&name`，refresh 解析为 Push
    Ref(Sym),
    /// `$name`
    Get(Sym),
    /// 弹出栈顶并绑定到当前作用域
    Bind(Sym),
    Fmt(Vec<FmtPart>),
    Target(Arc<Label>),
    Jump {
        name: Sym,
        label: Option<Arc<Label>>,
    },
    Lambda {
        def: Arc<LambdaDef>,
        kind: LambdaKind,
        skip: Option<Arc<Label>>,
    },
    Unlambda(usize),
    Exit {
        /// 带退出方式与深度的匿名标签
        label: Arc<Label>,
        /// 词法上最内层的 lambda，refresh 填写
        lambda: Option<usize>,
    },
    Begin {
        own_stack: bool,
        safety: Option<Safety>,
    },
    End,
    EndList,
    Try {
        end: Arc<Label>,
    },
    EndTry,
    EndTest(String),
    For {
        end: Option<Arc<Label>>,
    },
    While {
        end: Option<Arc<Label>>,
    },
    /// 泛型参数括号
    Param(usize),
    Unparam {
        id: usize,
        template: Sym,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Push(_) => "push",
            Op::PushMany(_) => "push-many",
            Op::Drop(_) => "drop",
            Op::Check(_) => "check",
            Op::Deref(_) => "deref",
            Op::Call(_) => "call",
            Op::Ref(_) => "ref",
            Op::Get(_) => "get",
            Op::Bind(_) => "bind",
            Op::Fmt(_) => "fmt",
            Op::Target(_) => "target",
            Op::Jump { .. } => "jump",
            Op::Lambda { .. } => "lambda",
            Op::Unlambda(_) => "unlambda",
            Op::Exit { .. } => "exit",
            Op::Begin { .. } => "begin",
            Op::End => "end",
            Op::EndList => "end-list",
            Op::Try { .. } => "try",
            Op::EndTry => "end-try",
            Op::EndTest(_) => "end-test",
            Op::For { .. } => "for",
            Op::While { .. } => "while",
            Op::Param(_) => "param",
            Op::Unparam { .. } => "unparam",
        }
    }

    /// 压入类型常量时返回该类型
    pub fn pushed_type(&self) -> Option<&TypeRef> {
        match self {
            Op::Push(v) => v.as_type(),
            _ => None,
        }
    }
}

fn label_pc(label: &Label) -> String {
    match label.pc() {
        Some(pc) => pc.to_string(),
        None => "?".to_string(),
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Push(v) => write!(f, "push {}", v.dump()),
            Op::PushMany(vs) => {
                f.write_str("push")?;
                for v in vs {
                    write!(f, " {}", v.dump())?;
                }
                Ok(())
            }
            Op::Drop(n) => write!(f, "drop {n}"),
            Op::Check(Some(t)) => write!(f, "check {}", t.name),
            Op::Check(None) => f.write_str("check"),
            Op::Deref(name) => write!(f, "deref {name}"),
            Op::Call(name) => write!(f, "call {name}"),
            Op::Ref(name) => write!(f, "ref {name}"),
            Op::Get(name) => write!(f, "get ${name}"),
            Op::Bind(name) => write!(f, "bind {name}"),
            Op::Fmt(parts) => write!(f, "fmt ({} parts)", parts.len()),
            Op::Target(l) => write!(f, "@{} ({})", l.name, label_pc(l)),
            Op::Jump { name, label } => match label {
                Some(l) => write!(f, "jump {name} -> {}", label_pc(l)),
                None => write!(f, "jump {name} -> ?"),
            },
            Op::Lambda { def, kind, skip } => {
                let skip = skip.as_ref().map(|l| label_pc(l)).unwrap_or_else(|| "?".into());
                write!(f, "lambda#{} {:?} skip {}", def.id, kind, skip)
            }
            Op::Unlambda(id) => write!(f, "unlambda#{id}"),
            Op::Exit { label, .. } => match label.role {
                Some((kind, depth)) => write!(f, "{} {}", kind.as_str(), depth),
                None => write!(f, "exit {}", label.name),
            },
            Op::Begin { own_stack, safety } => {
                write!(f, "begin")?;
                if *own_stack {
                    write!(f, " own-stack")?;
                }
                if let Some(s) = safety {
                    write!(f, " {s}")?;
                }
                Ok(())
            }
            Op::End => f.write_str("end"),
            Op::EndList => f.write_str("end-list"),
            Op::Try { end } => write!(f, "try -> {}", label_pc(end)),
            Op::EndTry => f.write_str("end-try"),
            Op::EndTest(msg) => write!(f, "end-test '{msg}'"),
            Op::For { end } | Op::While { end } => match end {
                Some(l) => write!(f, "{} -> {}", self.name(), label_pc(l)),
                None => f.write_str(self.name()),
            },
            Op::Param(id) => write!(f, "param#{id}"),
            Op::Unparam { id, template } => write!(f, "unparam#{id} {template}"),
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
