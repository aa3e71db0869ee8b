//! OS 线程
//!
//! 新线程复制当前值栈、环境与操作序列，在自己的 `Thread` 上运行可调用值；
//! 共享引擎的注册表。`join` 把结束线程的剩余值栈接回调用者。

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tarn_log::Level;

use super::thread::Thread;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::sync;
use crate::core::value::Value;

const TARGET: &str = "tarn::thread";

pub struct ThreadHandle {
    pub id: usize,
    join: Mutex<Option<JoinHandle<Result<Vec<Value>>>>>,
}

impl ThreadHandle {
    pub fn is_finished(&self) -> bool {
        sync::lock(&self.join)
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }
}

impl Thread {
    /// 在新的 OS 线程上调用 `target`
    pub fn spawn(&mut self, target: Value) -> Result<Arc<ThreadHandle>> {
        let mut child = self.fork();
        let id = child.id as usize;
        let logger = self.logger.clone();
        logger.log_thread(Level::Debug, TARGET, self.id, format!("spawning thread {id}"));

        let join = std::thread::Builder::new()
            .name(format!("tarn-{id}"))
            .spawn(move || {
                let result = child.run_callable(&target);
                let level = if result.is_ok() { Level::Debug } else { Level::Warn };
                child.logger.log_thread(
                    level,
                    TARGET,
                    child.id,
                    match &result {
                        Ok(()) => "finished".to_string(),
                        Err(e) => format!("failed: {e}"),
                    },
                );
                result.map(|()| std::mem::take(child.stack_mut()))
            })
            .map_err(|e| TarnError::new(ErrorKind::Thread, format!("cannot spawn thread: {e}")))?;

        let handle = Arc::new(ThreadHandle {
            id,
            join: Mutex::new(Some(join)),
        });
        self.rt.add_thread(handle.clone());
        Ok(handle)
    }

    /// 等待线程结束并压入它剩下的值
    pub fn join(&mut self, handle: &ThreadHandle) -> Result<()> {
        self.rt.take_thread(handle.id);
        let join = sync::lock(&handle.join).take().ok_or_else(|| {
            TarnError::new(
                ErrorKind::Thread,
                format!("thread {} was already joined", handle.id),
            )
        })?;
        let values = join.join().map_err(|_| {
            TarnError::new(ErrorKind::Thread, format!("thread {} panicked", handle.id))
        })??;
        self.logger.log_thread(
            Level::Debug,
            TARGET,
            self.id,
            format!("joined thread {} ({} values)", handle.id, values.len()),
        );
        self.stack_mut().extend(values);
        Ok(())
    }
}
