//! 单个操作的执行

use tarn_log::trace;

use super::iter::Next;
use super::poll::Backoff;
use super::scope::{LoopKind, LoopState, ParamMark, TryFrame};
use super::thread::Thread;
use super::Control;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::label::{Label, Lambda};
use crate::core::op::{ExitKind, FmtPart, LambdaKind, Op};
use crate::core::value::Val;

const TARGET: &str = "tarn::vm";

fn label_pc(label: &Label) -> Result<usize> {
    label.pc().ok_or_else(|| {
        TarnError::new(
            ErrorKind::UnknownLabel,
            format!("label '{}' is unresolved", label.name),
        )
    })
}

fn end_pc(end: &Option<std::sync::Arc<Label>>, what: &str) -> Result<usize> {
    match end {
        Some(l) => label_pc(l),
        None => Err(TarnError::new(
            ErrorKind::UnknownLabel,
            format!("{what} has no end label"),
        )),
    }
}

impl Thread {
    pub(crate) fn exec(&mut self, op: &Op) -> Result<Control> {
        match op {
            Op::Push(v) => {
                self.push(v.clone());
                Ok(Control::Next)
            }
            Op::PushMany(vs) => {
                self.stack_mut().extend(vs.iter().cloned());
                Ok(Control::Next)
            }
            Op::Drop(n) => {
                self.pop_n(*n)?;
                Ok(Control::Next)
            }
            Op::Check(ty) => {
                let ty = match ty {
                    Some(t) => t.clone(),
                    None => self.pop_as("Type", |v| v.as_type().cloned())?,
                };
                let top = self.peek().ok_or_else(|| TarnError::underflow("check"))?;
                if !top.isa(&ty) {
                    return Err(TarnError::mismatch(&ty.name, top.type_name()));
                }
                Ok(Control::Next)
            }
            Op::Deref(name) => {
                if self.rt.find_func(name).is_some() {
                    return self.dispatch(name, self.pc + 1);
                }
                if let Some(t) = self.rt.find_type(name) {
                    self.push(self.types.type_value(&t));
                    return Ok(Control::Next);
                }
                Err(TarnError::unknown_id(name))
            }
            Op::Call(name) => self.dispatch(name, self.pc + 1),
            Op::Ref(name) => {
                let v = if self.rt.find_func(name).is_some() {
                    self.types.func_value(name.clone())
                } else if let Some(l) = self.rt.find_label(name) {
                    self.types.label_value(&l)
                } else {
                    return Err(TarnError::unknown_id(name));
                };
                self.push(v);
                Ok(Control::Next)
            }
            Op::Get(name) => {
                let v = self
                    .env
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TarnError::unknown_id(&format!("${name}")))?;
                self.push(v);
                Ok(Control::Next)
            }
            Op::Bind(name) => {
                let v = self.pop()?;
                self.bind(name.clone(), v)?;
                Ok(Control::Next)
            }
            Op::Fmt(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FmtPart::Lit(s) => out.push_str(s),
                        FmtPart::Var(name, verbose) => {
                            let v = self
                                .env
                                .get(name)
                                .ok_or_else(|| TarnError::unknown_id(&format!("${name}")))?;
                            if *verbose {
                                v.dump_into(&mut out);
                            } else {
                                v.print_into(&mut out);
                            }
                        }
                    }
                }
                self.push(self.types.string(out));
                Ok(Control::Next)
            }
            Op::Target(_) => Ok(Control::Next),
            Op::Jump { name, label } => {
                let pc = match label {
                    Some(l) => label_pc(l)?,
                    None => match self.rt.find_label(name) {
                        Some(l) => label_pc(&l)?,
                        None => {
                            return Err(TarnError::new(
                                ErrorKind::UnknownLabel,
                                format!("unknown label '{name}'"),
                            ))
                        }
                    },
                };
                Ok(Control::Jump(pc))
            }
            Op::Lambda { def, kind, skip } => {
                let skip = end_pc(skip, "lambda")?;
                if *kind == LambdaKind::Closure {
                    let lambda = Lambda::new(def.clone(), self.env.clone());
                    self.push(self.types.lambda_value(lambda));
                }
                Ok(Control::Jump(skip))
            }
            Op::Unlambda(_) => self.exit_return(0),
            Op::Exit { label, .. } => match label.role {
                Some((ExitKind::Return, depth)) => self.exit_return(depth),
                Some((ExitKind::Recall, depth)) => self.recall(depth),
                Some((ExitKind::Yield, depth)) => self.suspend(depth),
                Some((ExitKind::Break, depth)) => self.exit_loop(depth),
                None => Err(TarnError::new(
                    ErrorKind::UnknownLabel,
                    format!("'{}' is not an exit label", label.name),
                )),
            },
            Op::Begin { own_stack, safety } => {
                let safety = safety.unwrap_or_else(|| self.safety());
                self.begin_block(*own_stack, safety)?;
                Ok(Control::Next)
            }
            Op::End => {
                self.pop_scope(true)?;
                Ok(Control::Next)
            }
            Op::EndList => {
                let items = std::mem::take(self.stack_mut());
                self.pop_scope(false)?;
                let list = self.rt.list_of(items)?;
                self.push(list);
                Ok(Control::Next)
            }
            Op::Try { end } => {
                let end_pc = label_pc(end)?;
                let safety = self.safety();
                self.begin_block(true, safety)?;
                self.tries.push(TryFrame {
                    scopes_len: self.scopes.len() - 1,
                    depth: 0,
                    start_pc: self.pc,
                    end_pc,
                    errors: Vec::new(),
                });
                Ok(Control::Next)
            }
            Op::EndTry => {
                let frame = self
                    .tries
                    .pop()
                    .ok_or_else(|| TarnError::new(ErrorKind::Thread, "end of try without a frame"))?;
                self.pop_scope(true)?;
                let result = if frame.errors.is_empty() {
                    self.types.nil()
                } else {
                    let errors = frame
                        .errors
                        .into_iter()
                        .map(|e| self.types.error_value(e))
                        .collect();
                    self.rt.list_value(errors, self.types.error.clone())?
                };
                self.push(result);
                Ok(Control::Next)
            }
            Op::EndTest(message) => {
                let v = self.pop()?;
                if !matches!(v.val, Val::Bool(true)) {
                    self.report(TarnError::new(
                        ErrorKind::TestFailed,
                        format!("{message} (got {})", v.dump()),
                    ))?;
                }
                Ok(Control::Next)
            }
            Op::For { end } => {
                let end = end_pc(end, "for")?;
                let result = self.step_for(end);
                if result.is_err() {
                    let pc = self.pc;
                    self.scope_mut().remove_loop(pc);
                }
                result
            }
            Op::While { end } => {
                let end = end_pc(end, "while")?;
                let result = self.step_while(end);
                if result.is_err() {
                    let pc = self.pc;
                    self.scope_mut().remove_loop(pc);
                }
                result
            }
            Op::Param(id) => {
                self.params.push(ParamMark {
                    id: *id,
                    scopes_len: self.scopes.len(),
                    depth: self.stack().len(),
                });
                Ok(Control::Next)
            }
            Op::Unparam { id, template } => {
                let at = self
                    .params
                    .iter()
                    .rposition(|p| p.id == *id)
                    .ok_or_else(|| TarnError::malformed(format!("unmatched generic bracket for {template}")))?;
                let mark = self.params.remove(at);
                let depth = mark.depth.min(self.stack().len());
                let values = self.stack_mut().split_off(depth);
                let args = values
                    .iter()
                    .map(|v| {
                        v.as_type()
                            .cloned()
                            .ok_or_else(|| TarnError::mismatch("Type", v.type_name()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let ty = self.rt.instantiate_named(template, args)?;
                self.push(self.types.type_value(&ty));
                Ok(Control::Next)
            }
        }
    }

    /// 从第 `depth` 个 lambda 返回
    fn exit_return(&mut self, depth: usize) -> Result<Control> {
        let i = self.lambda_scope(depth)?;
        Ok(Control::Unwind {
            depth: i,
            pc: self.scopes[i].ret_pc,
        })
    }

    /// 跳出由内向外第 `depth` 个循环
    fn exit_loop(&mut self, depth: usize) -> Result<Control> {
        let mut skip = depth;
        for i in (0..self.scopes.len()).rev() {
            let order = self.scopes[i].loop_order.clone();
            for pc in order.into_iter().rev() {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                let state = self.scopes[i].remove_loop(pc);
                let end_pc = state.map(|s| s.end_pc).unwrap_or(pc + 1);
                trace!(target: TARGET, self.logger, "break out of loop at pc {}", pc);
                return Ok(Control::Unwind {
                    depth: i + 1,
                    pc: end_pc,
                });
            }
        }
        Err(TarnError::new(
            ErrorKind::UnknownLabel,
            format!("no enclosing loop at depth {depth}"),
        ))
    }

    fn step_for(&mut self, end: usize) -> Result<Control> {
        let pc = self.pc;
        if !self.scope().loops.contains_key(&pc) {
            let body = self.pop()?;
            let seq = self.pop()?;
            let iter = self.iterate(&seq)?;
            let backoff = Backoff::from_limits(&self.rt.config.limits);
            self.scope_mut().add_loop(
                pc,
                LoopState {
                    kind: LoopKind::For { iter, body },
                    end_pc: end,
                    backoff,
                },
            );
        }
        let (iter, body) = match self.scope().loops.get(&pc).map(|s| &s.kind) {
            Some(LoopKind::For { iter, body }) => (iter.clone(), body.clone()),
            _ => return Err(TarnError::new(ErrorKind::Thread, "corrupt loop state")),
        };
        match iter.next(self)? {
            Next::Item(v) => {
                if let Some(state) = self.scope_mut().loops.get_mut(&pc) {
                    state.backoff.reset();
                }
                self.push(v);
                self.call_value(&body, pc + 1)
            }
            Next::Pending => {
                if let Some(state) = self.scope_mut().loops.get_mut(&pc) {
                    state.backoff.wait();
                }
                Ok(Control::Jump(pc))
            }
            Next::Done => {
                self.scope_mut().remove_loop(pc);
                Ok(Control::Jump(end))
            }
        }
    }

    fn step_while(&mut self, end: usize) -> Result<Control> {
        let pc = self.pc;
        if !self.scope().loops.contains_key(&pc) {
            let body = self.pop()?;
            let backoff = Backoff::from_limits(&self.rt.config.limits);
            self.scope_mut().add_loop(
                pc,
                LoopState {
                    kind: LoopKind::While { body: body.clone() },
                    end_pc: end,
                    backoff,
                },
            );
            return self.call_value(&body, pc + 1);
        }
        let body = match self.scope().loops.get(&pc).map(|s| &s.kind) {
            Some(LoopKind::While { body }) => body.clone(),
            _ => return Err(TarnError::new(ErrorKind::Thread, "corrupt loop state")),
        };
        if self.pop()?.truthy() {
            self.call_value(&body, pc + 1)
        } else {
            self.scope_mut().remove_loop(pc);
            Ok(Control::Jump(end))
        }
    }
}
