//! I/O：open read-iter write say dir rdir listen accept-iter connect-iter poll
//!
//! 打开文件、写入、列目录、监听与连接都要求 Unsafe 作用域。

use std::sync::Arc;

use super::list_of;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{Arg, Safety};
use crate::core::sync;
use crate::core::value::{Val, Value};
use crate::runtime::iter::io::{AcceptIter, ConnectIter, DirIter, FileHandle, SocketHandle};
use crate::runtime::iter::IterCell;
use crate::runtime::poll::{PollIter, PollSet};
use crate::runtime::registry::Runtime;
use crate::runtime::{Control, Thread};

pub fn register(rt: &Runtime) {
    let t = &rt.types;
    let stream = || Arg::pred(|v: &Value, _: &[Value]| v.ty.behavior.stream().is_some());
    rt.native("open", vec![Arg::ty(&t.string), Arg::ty(&t.string)], Safety::Unsafe, open_fn);
    rt.native("read-iter", vec![stream()], Safety::Safe, read_iter_fn);
    rt.native("write", vec![stream(), Arg::ty(&t.any)], Safety::Unsafe, write_fn);
    rt.native("say", vec![Arg::ty(&t.any)], Safety::Safe, say_fn);
    rt.native("dir", vec![Arg::ty(&t.string)], Safety::Unsafe, |th| dir(th, false));
    rt.native("rdir", vec![Arg::ty(&t.string)], Safety::Unsafe, |th| dir(th, true));
    rt.native("listen", vec![Arg::ty(&t.string)], Safety::Unsafe, listen_fn);
    rt.native("accept-iter", vec![Arg::ty(&t.socket)], Safety::Safe, accept_iter_fn);
    rt.native("connect-iter", vec![Arg::ty(&t.string)], Safety::Unsafe, connect_iter_fn);
    rt.native("poll", vec![Arg::ty(&t.list)], Safety::Safe, poll_fn);
}

/// path mode open
fn open_fn(th: &mut Thread) -> Result<Control> {
    let mode = th.pop_str()?;
    let path = th.pop_str()?;
    let file = FileHandle::open(&path, &mode)?;
    th.push(th.types.file_value(Arc::new(file)));
    Ok(Control::Next)
}

fn read_iter_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    let behavior = v.ty.behavior.clone();
    let stream = behavior
        .stream()
        .ok_or_else(|| TarnError::mismatch("stream", v.type_name()))?;
    let iter = stream.read_iter(&v, th)?;
    let it = th.rt.iter_value(iter, th.types.bin.clone())?;
    th.push(it);
    Ok(Control::Next)
}

/// stream data write：Bin 原样写入，其他值写入其字符串形式；流留在栈上
fn write_fn(th: &mut Thread) -> Result<Control> {
    let data = th.pop()?;
    let target = th.peek().ok_or_else(|| TarnError::underflow("write"))?;
    let bytes = match &data.val {
        Val::Bin(b) => sync::read(b).clone(),
        _ => data.to_string().into_bytes(),
    };
    let stream = target
        .ty
        .behavior
        .stream()
        .ok_or_else(|| TarnError::mismatch("stream", target.type_name()))?;
    stream.write(target, &bytes)?;
    Ok(Control::Next)
}

fn say_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    println!("{v}");
    Ok(Control::Next)
}

fn dir(th: &mut Thread, recursive: bool) -> Result<Control> {
    let path = th.pop_str()?;
    if !std::path::Path::new(&path).is_dir() {
        return Err(TarnError::new(ErrorKind::Io, format!("{path}: not a directory")));
    }
    let it = th.rt.iter_value(
        IterCell::new(DirIter::new(path, recursive)),
        th.types.string.clone(),
    )?;
    th.push(it);
    Ok(Control::Next)
}

fn listen_fn(th: &mut Thread) -> Result<Control> {
    let addr = th.pop_str()?;
    let socket = SocketHandle::listen(&addr)?;
    th.push(th.types.socket_value(Arc::new(socket)));
    Ok(Control::Next)
}

fn accept_iter_fn(th: &mut Thread) -> Result<Control> {
    let v = th.pop()?;
    let listener = match &v.val {
        Val::Socket(s) if s.is_listener() => s.clone(),
        _ => return Err(TarnError::mismatch("listening Socket", v.type_name())),
    };
    let it = th.rt.iter_value(
        IterCell::new(AcceptIter::new(listener)),
        th.types.socket.clone(),
    )?;
    th.push(it);
    Ok(Control::Next)
}

fn connect_iter_fn(th: &mut Thread) -> Result<Control> {
    let addr = th.pop_str()?;
    let it = th.rt.iter_value(
        IterCell::new(ConnectIter::new(&addr)?),
        th.types.socket.clone(),
    )?;
    th.push(it);
    Ok(Control::Next)
}

/// 可迭代值的列表 -> 按轮转顺序产出就绪元素的迭代器
fn poll_fn(th: &mut Thread) -> Result<Control> {
    let sources = list_of(&th.pop()?)?;
    let sources = sync::read(&sources).clone();
    let mut set = PollSet::new(&th.rt.config.limits);
    for source in &sources {
        let iter = th.iterate(source)?;
        set.add(iter)?;
    }
    let it = th
        .rt
        .iter_value(IterCell::new(PollIter::new(set)), th.types.any.clone())?;
    th.push(it);
    Ok(Control::Next)
}
