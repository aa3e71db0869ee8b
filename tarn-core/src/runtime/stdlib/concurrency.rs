//! 并发：fiber fiber-done thread join

use crate::core::error::{Result, TarnError};
use crate::core::func::{Arg, Safety};
use crate::core::value::Val;
use crate::runtime::coro::Fiber;
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let t = &rt.types;
    rt.native("fiber", vec![Arg::ty(&t.any)], Safety::Safe, fiber_fn);
    rt.native("fiber-done", vec![Arg::ty(&t.fiber)], Safety::Pure, fiber_done_fn);
    rt.native("thread", vec![Arg::ty(&t.any)], Safety::Safe, thread_fn);
    rt.native("join", vec![Arg::ty(&t.thread)], Safety::Safe, join_fn);
}

fn fiber_fn(th: &mut Thread) -> Result<Control> {
    let target = th.pop()?;
    let fiber = Fiber::new(th.rt.next_id(), target);
    th.push(th.types.fiber_value(fiber));
    Ok(Control::Next)
}

fn fiber_done_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    let done = match &v.val {
        Val::Fiber(f) => f.is_done(),
        _ => return Err(TarnError::mismatch("Fiber", v.type_name())),
    };
    th.push(th.types.boolean(done));
    Ok(Control::Next)
}

/// callable thread -> Thread
fn thread_fn(th: &mut Thread) -> Result<Control> {
    let target = th.pop()?;
    let handle = th.spawn(target)?;
    th.push(th.types.thread_value(handle));
    Ok(Control::Next)
}

fn join_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    let handle = match &v.val {
        Val::Thread(h) => h.clone(),
        _ => return Err(TarnError::mismatch("Thread", v.type_name())),
    };
    th.join(&handle)?;
    Ok(Control::Next)
}
