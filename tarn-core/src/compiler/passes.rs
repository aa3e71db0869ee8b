//! 编译 pass
//!
//! 每个 pass 是从一个操作序列到下一个序列的变换，并报告是否有改动：
//! - prepare：只跑一次，分配 lambda 的跳过标签，检查单元内标签重名
//! - refresh：解析前向引用（跳转标签、标识符、引用、退出所在的 lambda）
//! - rewrite：窥孔改写（合并 push、drop / check 吸收、循环包装、泛型括号折叠）
//! - finalize：分配 pc，之后 pc 才可信
//!
//! refresh + rewrite 反复执行直到都不再报告改动，最多 `max_passes` 轮。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tarn_log::{debug, trace};

use super::Compiler;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::label::Label;
use crate::core::op::{ExitKind, Op};
use crate::core::types::TypeRef;
use crate::core::value::Sym;

const TARGET: &str = "tarn::compiler";

/// 跑完整条 pass 流水线
pub(crate) fn run(c: &Compiler<'_>, ops: Vec<Op>, base: usize) -> Result<Vec<Op>> {
    let mut ops = prepare(ops)?;
    let limit = c.rt.config.compiler.max_passes;
    let mut settled = false;
    for pass in 0..limit {
        let (next, refreshed) = refresh(c, ops);
        let (next, rewritten) = rewrite(c, next)?;
        ops = next;
        trace!(target: TARGET, c.logger, "pass {}: {} ops (refresh {}, rewrite {})", pass, ops.len(), refreshed, rewritten);
        if !refreshed && !rewritten {
            settled = true;
            break;
        }
    }
    if !settled {
        return Err(TarnError::new(
            ErrorKind::PassLimit,
            format!("compilation did not settle within {limit} passes"),
        ));
    }
    finalize(c, &ops, base)?;
    Ok(ops)
}

// ==================== prepare ====================

pub(crate) fn prepare(ops: Vec<Op>) -> Result<Vec<Op>> {
    let mut skips: HashMap<usize, Arc<Label>> = HashMap::new();
    let mut named = HashSet::new();
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            Op::Lambda {
                def,
                kind,
                skip: None,
            } => {
                let skip = Label::anon("skip", def.id);
                skips.insert(def.id, skip.clone());
                out.push(Op::Lambda {
                    def,
                    kind,
                    skip: Some(skip),
                });
            }
            Op::Unlambda(id) => {
                let skip = skips
                    .remove(&id)
                    .ok_or_else(|| TarnError::malformed(format!("lambda#{id} closed twice")))?;
                out.push(Op::Unlambda(id));
                out.push(Op::Target(skip));
            }
            Op::Target(label) if !label.anon => {
                if !named.insert(label.name.clone()) {
                    return Err(TarnError::new(
                        ErrorKind::DuplicateRegistration,
                        format!("label '{}' defined twice", label.name),
                    ));
                }
                out.push(Op::Target(label));
            }
            other => out.push(other),
        }
    }
    if let Some(id) = skips.keys().next() {
        return Err(TarnError::malformed(format!("lambda#{id} is never closed")));
    }
    Ok(out)
}

// ==================== refresh ====================

fn unit_labels(ops: &[Op]) -> HashMap<Sym, Arc<Label>> {
    ops.iter()
        .filter_map(|op| match op {
            Op::Target(l) if !l.anon => Some((l.name.clone(), l.clone())),
            _ => None,
        })
        .collect()
}

pub(crate) fn refresh(c: &Compiler<'_>, ops: Vec<Op>) -> (Vec<Op>, bool) {
    let labels = unit_labels(&ops);
    let find_label = |name: &str| labels.get(name).cloned().or_else(|| c.rt.find_label(name));
    let types = &c.rt.types;
    let mut lambdas: Vec<usize> = Vec::new();
    let mut changed = false;
    let mut out = Vec::with_capacity(ops.len());

    for op in ops {
        let next = match op {
            Op::Lambda { ref def, .. } => {
                lambdas.push(def.id);
                op
            }
            Op::Unlambda(_) => {
                lambdas.pop();
                op
            }
            Op::Jump { name, label: None } => match find_label(&name) {
                Some(l) => {
                    changed = true;
                    Op::Jump {
                        name,
                        label: Some(l),
                    }
                }
                None => Op::Jump { name, label: None },
            },
            Op::Deref(name) => {
                if c.is_func(&name) {
                    changed = true;
                    Op::Call(name)
                } else if let Some(t) = c.rt.find_type(&name) {
                    changed = true;
                    Op::Push(types.type_value(&t))
                } else {
                    Op::Deref(name)
                }
            }
            Op::Ref(name) => {
                if c.is_func(&name) {
                    changed = true;
                    Op::Push(types.func_value(name))
                } else if let Some(l) = find_label(&name) {
                    changed = true;
                    Op::Push(types.label_value(&l))
                } else {
                    Op::Ref(name)
                }
            }
            Op::Exit {
                label,
                lambda: None,
            } if label.role.is_some_and(|(kind, _)| kind != ExitKind::Break) => {
                let depth = label.role.map_or(0, |(_, depth)| depth);
                let lambda = lambdas.iter().rev().nth(depth).copied();
                changed |= lambda.is_some();
                Op::Exit { label, lambda }
            }
            other => other,
        };
        out.push(next);
    }
    (out, changed)
}

// ==================== rewrite ====================

/// 最后一个操作压入的值若是类型则取出
fn take_pushed_type(out: &mut Vec<Op>) -> Option<TypeRef> {
    match out.last_mut() {
        Some(Op::Push(v)) => {
            let t = v.as_type().cloned()?;
            out.pop();
            Some(t)
        }
        Some(Op::PushMany(vs)) => {
            let t = vs.last()?.as_type().cloned()?;
            vs.pop();
            if vs.is_empty() {
                out.pop();
            }
            Some(t)
        }
        _ => None,
    }
}

/// `drop n` 吸收紧挨着的 push 与 drop；返回剩余未吸收的个数
fn absorb_drop(out: &mut Vec<Op>, mut n: usize) -> usize {
    while n > 0 {
        match out.last_mut() {
            Some(Op::Push(_)) => {
                out.pop();
                n -= 1;
            }
            Some(Op::PushMany(vs)) => {
                let k = n.min(vs.len());
                vs.truncate(vs.len() - k);
                n -= k;
                if vs.is_empty() {
                    out.pop();
                }
            }
            Some(Op::Drop(m)) => {
                *m += n;
                return 0;
            }
            _ => break,
        }
    }
    n
}

/// 泛型括号内全是类型常量时折叠成一个类型常量
fn fold_unparam(c: &Compiler<'_>, out: &mut Vec<Op>, id: usize, template: &str) -> Result<bool> {
    let Some(at) = out
        .iter()
        .rposition(|op| matches!(op, Op::Param(p) if *p == id))
    else {
        return Ok(false);
    };
    let mut args = Vec::new();
    for op in &out[at + 1..] {
        let values = match op {
            Op::Push(v) => std::slice::from_ref(v),
            Op::PushMany(vs) => vs.as_slice(),
            _ => return Ok(false),
        };
        for v in values {
            match v.as_type() {
                Some(t) => args.push(t.clone()),
                None => return Ok(false),
            }
        }
    }
    let ty = c.rt.instantiate_named(template, args)?;
    out.truncate(at);
    out.push(Op::Push(c.rt.types.type_value(&ty)));
    Ok(true)
}

/// `Target(start) For Jump(start) Target(end)`
fn wrap_loop(c: &Compiler<'_>, out: &mut Vec<Op>, make: impl FnOnce(Arc<Label>) -> Op) {
    let id = c.next_id();
    let start = Label::anon("loop", id);
    let end = Label::anon("done", id);
    out.push(Op::Target(start.clone()));
    out.push(make(end.clone()));
    out.push(Op::Jump {
        name: start.name.clone(),
        label: Some(start),
    });
    out.push(Op::Target(end));
}

pub(crate) fn rewrite(c: &Compiler<'_>, ops: Vec<Op>) -> Result<(Vec<Op>, bool)> {
    let fold = c.rt.config.compiler.fold_constants;
    let mut changed = false;
    let mut out: Vec<Op> = Vec::with_capacity(ops.len());

    for op in ops {
        match op {
            Op::For { end: None } => {
                wrap_loop(c, &mut out, |end| Op::For { end: Some(end) });
                changed = true;
            }
            Op::While { end: None } => {
                wrap_loop(c, &mut out, |end| Op::While { end: Some(end) });
                changed = true;
            }
            Op::Push(v) if fold => match out.last_mut() {
                Some(Op::Push(prev)) => {
                    let prev = prev.clone();
                    out.pop();
                    out.push(Op::PushMany(vec![prev, v]));
                    changed = true;
                }
                Some(Op::PushMany(vs)) => {
                    vs.push(v);
                    changed = true;
                }
                _ => out.push(Op::Push(v)),
            },
            Op::PushMany(vs) if fold => match out.last_mut() {
                Some(Op::Push(prev)) => {
                    let mut merged = vec![prev.clone()];
                    merged.extend(vs);
                    out.pop();
                    out.push(Op::PushMany(merged));
                    changed = true;
                }
                Some(Op::PushMany(prev)) => {
                    prev.extend(vs);
                    changed = true;
                }
                _ => out.push(Op::PushMany(vs)),
            },
            Op::Drop(n) if fold => {
                let before = out.len();
                let rest = absorb_drop(&mut out, n);
                if rest > 0 {
                    out.push(Op::Drop(rest));
                }
                changed |= rest != n || out.len() != before + 1;
            }
            Op::Check(None) if fold => match take_pushed_type(&mut out) {
                Some(t) => {
                    out.push(Op::Check(Some(t)));
                    changed = true;
                }
                None => out.push(Op::Check(None)),
            },
            Op::Unparam { id, template } if fold => {
                if fold_unparam(c, &mut out, id, &template)? {
                    changed = true;
                } else {
                    out.push(Op::Unparam { id, template });
                }
            }
            other => out.push(other),
        }
    }
    Ok((out, changed))
}

// ==================== finalize ====================

pub(crate) fn finalize(c: &Compiler<'_>, ops: &[Op], base: usize) -> Result<()> {
    for op in ops {
        let missing = match op {
            Op::Lambda { skip: None, .. } => Some("lambda skip label"),
            Op::For { end: None } | Op::While { end: None } => Some("loop end label"),
            _ => None,
        };
        if let Some(what) = missing {
            return Err(TarnError::malformed(format!("unresolved {what} in '{op}'")));
        }
    }

    let named: Vec<Arc<Label>> = ops
        .iter()
        .filter_map(|op| match op {
            Op::Target(l) if !l.anon => Some(l.clone()),
            _ => None,
        })
        .collect();
    c.rt.check_labels(&named)?;

    for (i, op) in ops.iter().enumerate() {
        let pc = base + i;
        match op {
            Op::Target(l) => l.resolve(pc),
            Op::Lambda { def, .. } => def.resolve(pc + 1),
            _ => {}
        }
    }
    debug!(target: TARGET, c.logger, "finalized {} ops at base {}, {} named label(s)", ops.len(), base, named.len());
    c.rt.register_labels(named);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::macros;
    use crate::core::value::Value;
    use crate::runtime::registry::{EngineConfig, Runtime};
    use tarn_config::CompilerConfig;
    use tarn_log::Logger;

    fn runtime_with(compiler: CompilerConfig) -> Arc<Runtime> {
        let config = EngineConfig {
            compiler,
            ..EngineConfig::default()
        };
        let rt = Runtime::new(config, Logger::noop());
        crate::runtime::stdlib::register(&rt);
        macros::register(&rt);
        rt
    }

    fn runtime() -> Arc<Runtime> {
        runtime_with(CompilerConfig::default())
    }

    fn int(rt: &Runtime, n: i64) -> Value {
        rt.types.int(n)
    }

    #[test]
    fn test_drop_absorbs_pushes() {
        let rt = runtime();
        let c = Compiler::new(&rt);
        let ops = vec![
            Op::Push(int(&rt, 1)),
            Op::Push(int(&rt, 2)),
            Op::Push(int(&rt, 3)),
            Op::Drop(2),
        ];
        let (ops, changed) = rewrite(&c, ops).unwrap();
        assert!(changed);
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Op::PushMany(vs) if vs.len() == 1));
    }

    #[test]
    fn test_drop_without_pushes_is_kept() {
        let rt = runtime();
        let c = Compiler::new(&rt);
        let (ops, changed) = rewrite(&c, vec![Op::Call("dup".into()), Op::Drop(1)]).unwrap();
        assert!(!changed);
        assert!(matches!(ops[1], Op::Drop(1)));
        let (ops, _) = rewrite(&c, vec![Op::Call("dup".into()), Op::Drop(1), Op::Drop(2)]).unwrap();
        assert!(matches!(ops[1], Op::Drop(3)));
    }

    #[test]
    fn test_check_absorbs_type_push() {
        let rt = runtime();
        let c = Compiler::new(&rt);
        let ops = vec![
            Op::Push(int(&rt, 1)),
            Op::Push(rt.types.type_value(&rt.types.int)),
            Op::Check(None),
        ];
        let (ops, _) = rewrite(&c, ops).unwrap();
        assert!(matches!(&ops[1], Op::Check(Some(t)) if t.name == "I64"));
    }

    #[test]
    fn test_loop_wrapping() {
        let rt = runtime();
        let c = Compiler::new(&rt);
        let (ops, changed) = rewrite(&c, vec![Op::For { end: None }]).unwrap();
        assert!(changed);
        assert_eq!(ops.len(), 4);
        assert!(matches!(ops[0], Op::Target(_)));
        assert!(matches!(ops[1], Op::For { end: Some(_) }));
        assert!(matches!(ops[2], Op::Jump { label: Some(_), .. }));
        assert!(matches!(ops[3], Op::Target(_)));
        let (_, changed) = rewrite(&c, ops).unwrap();
        assert!(!changed);
    }

    #[test]
    fn test_unparam_fallback_without_folding() {
        let rt = runtime_with(CompilerConfig {
            fold_constants: false,
            ..CompilerConfig::default()
        });
        let ops = Compiler::new(&rt).compile("List<I64>", 0).unwrap().ops;
        assert!(matches!(ops[0], Op::Param(_)));
        assert!(matches!(ops.last(), Some(Op::Unparam { .. })));
    }

    #[test]
    fn test_duplicate_labels() {
        let rt = runtime();
        let err = Compiler::new(&rt).compile("@a @a", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::DuplicateRegistration);
        Compiler::new(&rt).compile("@b", 0).unwrap();
        let err = Compiler::new(&rt).compile("@b", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::DuplicateRegistration);
    }

    #[test]
    fn test_finalize_assigns_pcs() {
        let rt = runtime();
        let ops = Compiler::new(&rt).compile("{1} @here", 10).unwrap().ops;
        match &ops[0] {
            Op::Lambda { def, skip, .. } => {
                assert_eq!(def.entry(), Some(11));
                assert_eq!(skip.as_ref().and_then(|l| l.pc()), Some(13));
            }
            other => panic!("expected lambda, got {other}"),
        }
        assert_eq!(rt.find_label("here").and_then(|l| l.pc()), Some(14));
    }

    #[test]
    fn test_pass_limit() {
        let rt = runtime_with(CompilerConfig {
            max_passes: 0,
            ..CompilerConfig::default()
        });
        let err = Compiler::new(&rt).compile("1", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::PassLimit);
    }

    #[test]
    fn test_exit_records_enclosing_lambda() {
        let rt = runtime();
        let ops = Compiler::new(&rt).compile("{ { return1 } }", 0).unwrap().ops;
        let outer = match &ops[0] {
            Op::Lambda { def, .. } => def.id,
            other => panic!("expected lambda, got {other}"),
        };
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Exit { label, lambda: Some(id) }
                if *id == outer && label.role == Some((ExitKind::Return, 1)))));
    }
}
