//! I/O 迭代器
//!
//! 套接字一律设为非阻塞：会阻塞时返回 [`Next::Pending`]，
//! 只有致命错误才作为错误抛出（accept / connect 则视为耗尽）。

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use walkdir::WalkDir;

use super::{Iter, Next};
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::sync;
use crate::runtime::poll::Backoff;
use crate::runtime::Thread;

/// 每次读取的块大小
pub const CHUNK_SIZE: usize = 4096;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(10);

fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

// ==================== 句柄 ====================

#[derive(Debug)]
pub struct FileHandle {
    path: String,
    file: Mutex<File>,
}

impl FileHandle {
    /// mode: `r` 读、`w` 截断写、`a` 追加、`rw` 读写
    pub fn open(path: &str, mode: &str) -> Result<FileHandle> {
        let mut opts = std::fs::OpenOptions::new();
        match mode {
            "r" => opts.read(true),
            "w" => opts.write(true).create(true).truncate(true),
            "a" => opts.append(true).create(true),
            "rw" => opts.read(true).write(true).create(true),
            other => {
                return Err(TarnError::new(
                    ErrorKind::BadLiteral,
                    format!("unknown file mode '{other}'"),
                ))
            }
        };
        let file = opts
            .open(path)
            .map_err(|e| TarnError::new(ErrorKind::Io, format!("{path}: {e}")))?;
        Ok(FileHandle {
            path: path.to_string(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut file = sync::lock(&self.file);
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

enum SocketKind {
    Listener(TcpListener),
    Stream(TcpStream),
}

pub struct SocketHandle {
    kind: Mutex<SocketKind>,
    addr: String,
}

impl SocketHandle {
    pub fn listen(addr: &str) -> Result<SocketHandle> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?.to_string();
        Ok(SocketHandle {
            kind: Mutex::new(SocketKind::Listener(listener)),
            addr,
        })
    }

    fn stream(stream: TcpStream) -> Result<SocketHandle> {
        stream.set_nonblocking(true)?;
        let addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into());
        Ok(SocketHandle {
            kind: Mutex::new(SocketKind::Stream(stream)),
            addr,
        })
    }

    /// 监听套接字为本地地址，连接为对端地址
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_listener(&self) -> bool {
        matches!(*sync::lock(&self.kind), SocketKind::Listener(_))
    }

    /// 写完全部数据；会阻塞时退避重试
    pub fn write(&self, mut data: &[u8]) -> Result<()> {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(50));
        while !data.is_empty() {
            let res = match &mut *sync::lock(&self.kind) {
                SocketKind::Stream(s) => s.write(data),
                SocketKind::Listener(_) => {
                    return Err(TarnError::new(ErrorKind::Io, "cannot write to a listening socket"))
                }
            };
            match res {
                Ok(0) => return Err(TarnError::new(ErrorKind::Io, "connection closed")),
                Ok(n) => {
                    data = &data[n..];
                    backoff.reset();
                }
                Err(e) if would_block(&e) => backoff.wait(),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// ==================== 读取 ====================

enum Source {
    File(Arc<FileHandle>),
    Socket(Arc<SocketHandle>),
}

/// 分块读取，每块一个 `Bin`
pub struct ReadIter {
    source: Source,
}

impl ReadIter {
    pub fn file(f: Arc<FileHandle>) -> Self {
        ReadIter {
            source: Source::File(f),
        }
    }

    pub fn socket(s: Arc<SocketHandle>) -> Self {
        ReadIter {
            source: Source::Socket(s),
        }
    }
}

impl Iter for ReadIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let res = match &self.source {
            Source::File(f) => sync::lock(&f.file).read(&mut buf),
            Source::Socket(s) => match &mut *sync::lock(&s.kind) {
                SocketKind::Stream(stream) => stream.read(&mut buf),
                SocketKind::Listener(_) => {
                    return Err(TarnError::new(ErrorKind::Io, "cannot read from a listening socket"))
                }
            },
        };
        match res {
            Ok(0) => Ok(Next::Done),
            Ok(n) => {
                buf.truncate(n);
                Ok(Next::Item(th.types.bin_value(buf)))
            }
            Err(e) if would_block(&e) => Ok(Next::Pending),
            Err(e) => Err(e.into()),
        }
    }
}

// ==================== 目录 ====================

/// 目录列表，按文件名排序；`recursive` 时包含所有子目录
pub struct DirIter {
    walk: walkdir::IntoIter,
}

impl DirIter {
    pub fn new(path: impl AsRef<Path>, recursive: bool) -> Self {
        let walk = WalkDir::new(path).min_depth(1).sort_by_file_name();
        let walk = if recursive { walk } else { walk.max_depth(1) };
        DirIter {
            walk: walk.into_iter(),
        }
    }
}

impl Iter for DirIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        match self.walk.next() {
            Some(Ok(entry)) => Ok(Next::Item(
                th.types.string(entry.path().to_string_lossy().as_ref()),
            )),
            Some(Err(e)) => Err(TarnError::new(ErrorKind::Io, e.to_string())),
            None => Ok(Next::Done),
        }
    }
}

// ==================== 套接字 ====================

/// 接受连接
pub struct AcceptIter {
    listener: Arc<SocketHandle>,
}

impl AcceptIter {
    pub fn new(listener: Arc<SocketHandle>) -> Self {
        AcceptIter { listener }
    }
}

impl Iter for AcceptIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        let res = match &*sync::lock(&self.listener.kind) {
            SocketKind::Listener(l) => l.accept(),
            SocketKind::Stream(_) => return Ok(Next::Done),
        };
        match res {
            Ok((stream, _)) => {
                let handle = SocketHandle::stream(stream)?;
                Ok(Next::Item(th.types.socket_value(Arc::new(handle))))
            }
            Err(e) if would_block(&e) => Ok(Next::Pending),
            Err(_) => Ok(Next::Done),
        }
    }
}

/// 发起一次连接：成功产出一个套接字后耗尽
pub struct ConnectIter {
    addr: Option<SocketAddr>,
}

impl ConnectIter {
    pub fn new(addr: &str) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TarnError::new(ErrorKind::Io, format!("cannot resolve '{addr}'")))?;
        Ok(ConnectIter { addr: Some(addr) })
    }
}

impl Iter for ConnectIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        let Some(addr) = self.addr else {
            return Ok(Next::Done);
        };
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                self.addr = None;
                let handle = SocketHandle::stream(stream)?;
                Ok(Next::Item(th.types.socket_value(Arc::new(handle))))
            }
            Err(e) if would_block(&e) => Ok(Next::Pending),
            Err(_) => {
                self.addr = None;
                Ok(Next::Done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Val;
    use crate::runtime::iter::IterCell;
    use crate::runtime::registry::{EngineConfig, Runtime};
    use tarn_log::Logger;

    fn thread() -> Thread {
        Thread::new(Runtime::new(EngineConfig::default(), Logger::noop()))
    }

    #[test]
    fn test_file_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let path = path.to_str().unwrap();
        FileHandle::open(path, "w").unwrap().write(b"hello").unwrap();

        let mut th = thread();
        let it = IterCell::new(ReadIter::file(Arc::new(FileHandle::open(path, "r").unwrap())));
        match it.next(&mut th).unwrap() {
            Next::Item(v) => match &v.val {
                Val::Bin(b) => assert_eq!(&*sync::read(b), b"hello"),
                _ => panic!("expected Bin"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(it.next(&mut th).unwrap(), Next::Done));
    }

    #[test]
    fn test_bad_mode() {
        let err = FileHandle::open("x", "z").unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadLiteral);
    }

    #[test]
    fn test_dir_listing_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.txt"), "").unwrap();

        let mut th = thread();
        let names = |recursive: bool, th: &mut Thread| {
            let it = IterCell::new(DirIter::new(dir.path(), recursive));
            let mut out = Vec::new();
            while let Next::Item(v) = it.next(th).unwrap() {
                let p = v.to_string();
                out.push(Path::new(&p).file_name().unwrap().to_string_lossy().to_string());
            }
            out
        };
        assert_eq!(names(false, &mut th), vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(names(true, &mut th), vec!["a.txt", "b.txt", "sub", "c.txt"]);
    }

    #[test]
    fn test_accept_pending_without_clients() {
        let mut th = thread();
        let listener = Arc::new(SocketHandle::listen("127.0.0.1:0").unwrap());
        assert!(listener.is_listener());
        let it = IterCell::new(AcceptIter::new(listener));
        assert!(matches!(it.next(&mut th).unwrap(), Next::Pending));
    }
}
