//! 非阻塞轮询
//!
//! [`Backoff`]：空轮询之间的指数退避（min → max 翻倍）。
//! [`PollSet`]：有界的轮询集合，按轮转顺序拉取第一个就绪元素。

use std::collections::VecDeque;
use std::time::Duration;

use tarn_config::LimitConfig;

use super::iter::{Iter, IterRef, Next};
use super::Thread;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::value::Value;

#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Backoff {
            min,
            max,
            current: min,
        }
    }

    pub fn from_limits(limits: &LimitConfig) -> Self {
        Backoff::new(
            Duration::from_millis(limits.backoff_min_ms),
            Duration::from_millis(limits.backoff_max_ms),
        )
    }

    /// 下一次等待时长
    pub fn current(&self) -> Duration {
        self.current
    }

    /// 睡眠当前时长，然后翻倍（不超过上限）
    pub fn wait(&mut self) {
        std::thread::sleep(self.current);
        self.current = (self.current * 2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// 轮转轮询集合
pub struct PollSet {
    items: VecDeque<IterRef>,
    capacity: usize,
    backoff: Backoff,
}

impl PollSet {
    pub fn new(limits: &LimitConfig) -> Self {
        PollSet {
            items: VecDeque::new(),
            capacity: limits.poll_set_size,
            backoff: Backoff::from_limits(limits),
        }
    }

    pub fn add(&mut self, iter: IterRef) -> Result<()> {
        if self.items.len() >= self.capacity {
            return Err(TarnError::new(
                ErrorKind::IndexOutOfBounds,
                format!("poll set is full ({} entries)", self.capacity),
            ));
        }
        self.items.push_back(iter);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 返回第一个就绪元素；全部耗尽时返回 None。
    /// 一整轮都没有就绪元素时退避后再来一轮。
    pub fn poll(&mut self, th: &mut Thread) -> Result<Option<Value>> {
        loop {
            let mut remaining = self.items.len();
            if remaining == 0 {
                return Ok(None);
            }
            while remaining > 0 {
                remaining -= 1;
                let Some(iter) = self.items.pop_front() else {
                    return Ok(None);
                };
                match iter.next(th)? {
                    Next::Item(v) => {
                        // 就绪的放到队尾，下次先轮到别人
                        self.items.push_back(iter);
                        self.backoff.reset();
                        return Ok(Some(v));
                    }
                    Next::Pending => self.items.push_back(iter),
                    Next::Done => {}
                }
            }
            if !self.items.is_empty() {
                self.backoff.wait();
            }
        }
    }
}

/// 把轮询集合包装成迭代器：每次产出下一个就绪元素，全部耗尽后结束
pub struct PollIter {
    set: PollSet,
}

impl PollIter {
    pub fn new(set: PollSet) -> Self {
        PollIter { set }
    }
}

impl Iter for PollIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        Ok(self.set.poll(th)?.map_or(Next::Done, Next::Item))
    }
}
