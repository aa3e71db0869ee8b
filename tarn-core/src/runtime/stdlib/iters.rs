//! 迭代器：iter next range filter map zip rand

use crate::core::error::Result;
use crate::core::func::{Arg, Safety};
use crate::runtime::iter::seq::{Filter, Map, Rand, Range, Zip};
use crate::runtime::iter::{elem_type, IterCell, Next};
use crate::runtime::poll::Backoff;
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let t = &rt.types;
    let any = || Arg::ty(&t.any);
    rt.native("iter", vec![any()], Safety::Pure, iter_fn);
    rt.native("next", vec![Arg::ty(&t.iter)], Safety::Const, next_fn);
    rt.native("range", vec![Arg::ty(&t.int), Arg::ty(&t.int)], Safety::Pure, range_fn);
    rt.native("filter", vec![any(), any()], Safety::Safe, filter_fn);
    rt.native("map", vec![any(), any()], Safety::Safe, map_fn);
    rt.native("zip", vec![any(), any()], Safety::Pure, zip_fn);
    rt.native("rand", vec![Arg::ty(&t.int)], Safety::Safe, rand_fn);
}

fn iter_fn(th: &mut Thread) -> Result<Control> {
    let seq = th.pop()?;
    let it = th.iter_of(&seq)?;
    th.push(it);
    Ok(Control::Next)
}

/// 迭代器留在栈上，压入下一个元素（耗尽时为 nil）
fn next_fn(th: &mut Thread) -> Result<Control> {
    let it = th.pop()?;
    let iter = th.iterate(&it)?;
    let mut backoff = Backoff::from_limits(&th.rt.config.limits);
    let item = loop {
        match iter.next(th)? {
            Next::Item(v) => break v,
            Next::Pending => backoff.wait(),
            Next::Done => break th.types.nil(),
        }
    };
    th.push(it);
    th.push(item);
    Ok(Control::Next)
}

/// start end range -> [start, end)
fn range_fn(th: &mut Thread) -> Result<Control> {
    let end = th.pop_int()?;
    let start = th.pop_int()?;
    let it = th
        .rt
        .iter_value(IterCell::new(Range::new(start, end)), th.types.int.clone())?;
    th.push(it);
    Ok(Control::Next)
}

/// seq pred filter
fn filter_fn(th: &mut Thread) -> Result<Control> {
    let pred = th.pop()?;
    let seq = th.pop()?;
    let elem = elem_type(&th.types, &seq.ty);
    let source = th.iterate(&seq)?;
    let it = th.rt.iter_value(IterCell::new(Filter::new(source, pred)), elem)?;
    th.push(it);
    Ok(Control::Next)
}

/// seq f map
fn map_fn(th: &mut Thread) -> Result<Control> {
    let f = th.pop()?;
    let seq = th.pop()?;
    let source = th.iterate(&seq)?;
    let it = th
        .rt
        .iter_value(IterCell::new(Map::new(source, f)), th.types.any.clone())?;
    th.push(it);
    Ok(Control::Next)
}

/// left right zip -> Iter<Pair<L,R>>
fn zip_fn(th: &mut Thread) -> Result<Control> {
    let right = th.pop()?;
    let left = th.pop()?;
    let l_elem = elem_type(&th.types, &left.ty);
    let r_elem = elem_type(&th.types, &right.ty);
    let elem = th.rt.instantiate(&th.types.pair, vec![l_elem, r_elem])?;
    let l = th.iterate(&left)?;
    let r = th.iterate(&right)?;
    let it = th.rt.iter_value(IterCell::new(Zip::new(l, r)), elem)?;
    th.push(it);
    Ok(Control::Next)
}

/// max rand -> [0, max) 的无穷随机流
fn rand_fn(th: &mut Thread) -> Result<Control> {
    let max = th.pop_int()?;
    let it = th
        .rt
        .iter_value(IterCell::new(Rand::new(max)?), th.types.int.clone())?;
    th.push(it);
    Ok(Control::Next)
}
