//! 标签与 lambda
//!
//! 标签的 pc 在 finalize 阶段才写入，之前为 [`UNRESOLVED`]。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::op::ExitKind;
use super::value::{Env, Sym};

pub const UNRESOLVED: usize = usize::MAX;

/// 具名（或匿名）跳转目标
#[derive(Debug)]
pub struct Label {
    pub name: Sym,
    /// 编译器内部生成的标签不进入注册表
    pub anon: bool,
    /// 结构化退出点：退出方式与深度
    pub role: Option<(ExitKind, usize)>,
    pc: AtomicUsize,
}

impl Label {
    pub fn named(name: Sym) -> Arc<Label> {
        Arc::new(Label {
            name,
            anon: false,
            role: None,
            pc: AtomicUsize::new(UNRESOLVED),
        })
    }

    pub fn anon(hint: &str, id: usize) -> Arc<Label> {
        Arc::new(Label {
            name: format!("{hint}#{id}").into(),
            anon: true,
            role: None,
            pc: AtomicUsize::new(UNRESOLVED),
        })
    }

    /// `return` / `recall` / `yield` / `break` 的退出点
    pub fn exit(kind: ExitKind, depth: usize, id: usize) -> Arc<Label> {
        Arc::new(Label {
            name: format!("{}{depth}#{id}", kind.as_str()).into(),
            anon: true,
            role: Some((kind, depth)),
            pc: AtomicUsize::new(UNRESOLVED),
        })
    }

    pub fn pc(&self) -> Option<usize> {
        match self.pc.load(Ordering::Acquire) {
            UNRESOLVED => None,
            pc => Some(pc),
        }
    }

    pub(crate) fn resolve(&self, pc: usize) {
        self.pc.store(pc, Ordering::Release);
    }
}

/// lambda 体的编译期描述：入口 pc 由 finalize 写入
#[derive(Debug)]
pub struct LambdaDef {
    pub id: usize,
    /// `func:` / `conv:` 的名字，匿名 lambda 为 None
    pub name: Option<Sym>,
    entry: AtomicUsize,
}

impl LambdaDef {
    pub fn new(id: usize, name: Option<Sym>) -> Arc<LambdaDef> {
        Arc::new(LambdaDef {
            id,
            name,
            entry: AtomicUsize::new(UNRESOLVED),
        })
    }

    pub fn entry(&self) -> Option<usize> {
        match self.entry.load(Ordering::Acquire) {
            UNRESOLVED => None,
            pc => Some(pc),
        }
    }

    pub(crate) fn resolve(&self, pc: usize) {
        self.entry.store(pc, Ordering::Release);
    }
}

/// 闭包：创建时环境的快照 + 入口
pub struct Lambda {
    pub def: Arc<LambdaDef>,
    pub env: Env,
}

impl Lambda {
    pub fn new(def: Arc<LambdaDef>, env: Env) -> Arc<Lambda> {
        Arc::new(Lambda { def, env })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_resolution() {
        let label = Label::named("exit".into());
        assert_eq!(label.pc(), None);
        label.resolve(7);
        assert_eq!(label.pc(), Some(7));
        assert!(!label.anon);
    }

    #[test]
    fn test_anon_label_name() {
        let label = Label::anon("loop", 3);
        assert!(label.anon);
        assert_eq!(&*label.name, "loop#3");
        assert_eq!(label.role, None);
    }

    #[test]
    fn test_exit_label_role() {
        let label = Label::exit(ExitKind::Yield, 2, 9);
        assert!(label.anon);
        assert_eq!(label.role, Some((ExitKind::Yield, 2)));
        assert_eq!(&*label.name, "yield2#9");
        assert_eq!(Label::named("x".into()).role, None);
    }
}
