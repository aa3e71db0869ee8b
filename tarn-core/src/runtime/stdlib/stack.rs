//! 栈操作：dup swap rot reset stash depth

use crate::core::error::Result;
use crate::core::func::{Arg, Safety};
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let any = rt.types.any.clone();
    rt.native("dup", vec![Arg::ty(&any)], Safety::Pure, dup_fn);
    rt.native("swap", vec![Arg::ty(&any), Arg::ty(&any)], Safety::Pure, swap_fn);
    rt.native(
        "rot",
        vec![Arg::ty(&any), Arg::ty(&any), Arg::ty(&any)],
        Safety::Pure,
        rot_fn,
    );
    rt.native("reset", vec![], Safety::Pure, reset_fn);
    rt.native("stash", vec![], Safety::Pure, stash_fn);
    rt.native("depth", vec![], Safety::Pure, depth_fn);
}

fn dup_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    th.push(v.clone());
    th.push(v);
    Ok(Control::Next)
}

fn swap_fn(th: &mut Thread) -> Result<Control> {
    let mut items = th.pop_n(2)?;
    items.swap(0, 1);
    for v in items {
        th.push(v);
    }
    Ok(Control::Next)
}

/// a b c -> b c a
fn rot_fn(th: &mut Thread) -> Result<Control> {
    let mut items = th.pop_n(3)?;
    items.rotate_left(1);
    for v in items {
        th.push(v);
    }
    Ok(Control::Next)
}

fn reset_fn(th: &mut Thread) -> Result<Control> {
    th.stack_mut().clear();
    Ok(Control::Next)
}

/// 把当前值栈整体收进一个列表
fn stash_fn(th: &mut Thread) -> Result<Control> {
    let items = std::mem::take(th.stack_mut());
    let list = th.rt.list_of(items)?;
    th.push(list);
    Ok(Control::Next)
}

fn depth_fn(th: &mut Thread) -> Result<Control> {
    let n = th.stack().len() as i64;
    th.push(th.types.int(n));
    Ok(Control::Next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::runtime::registry::EngineConfig;
    use tarn_log::Logger;

    fn thread() -> Thread {
        Thread::new(Runtime::new(EngineConfig::default(), Logger::noop()))
    }

    fn ints(th: &Thread) -> Vec<i64> {
        th.stack().iter().filter_map(|v| v.as_i64()).collect()
    }

    #[test]
    fn test_swap_and_rot() {
        let mut th = thread();
        for n in 1..=3 {
            th.push(th.types.int(n));
        }
        swap_fn(&mut th).unwrap();
        assert_eq!(ints(&th), vec![1, 3, 2]);
        rot_fn(&mut th).unwrap();
        assert_eq!(ints(&th), vec![3, 2, 1]);
    }

    #[test]
    fn test_short_stack_underflows() {
        let mut th = thread();
        th.push(th.types.int(1));
        assert_eq!(swap_fn(&mut th).unwrap_err().kind, ErrorKind::StackUnderflow);
        assert_eq!(ints(&th), vec![1]);

        let mut th = thread();
        th.push(th.types.int(1));
        th.push(th.types.int(2));
        assert_eq!(rot_fn(&mut th).unwrap_err().kind, ErrorKind::StackUnderflow);
        assert_eq!(ints(&th), vec![1, 2]);
    }
}
