//! 内存序列与组合迭代器

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Iter, IterRef, Next};
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::sync;
use crate::core::value::{Shared, Table, Value};
use crate::runtime::Thread;

/// 整数区间 [start, end)
pub struct Range {
    next: i64,
    end: i64,
}

impl Range {
    pub fn new(start: i64, end: i64) -> Self {
        Range { next: start, end }
    }
}

impl Iter for Range {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        if self.next >= self.end {
            return Ok(Next::Done);
        }
        let n = self.next;
        self.next += 1;
        Ok(Next::Item(th.types.int(n)))
    }
}

/// 列表遍历；每步读取当前内容，迭代期间追加的元素也会被看到
pub struct ListIter {
    items: Shared<Vec<Value>>,
    index: usize,
}

impl ListIter {
    pub fn new(items: Shared<Vec<Value>>) -> Self {
        ListIter { items, index: 0 }
    }
}

impl Iter for ListIter {
    fn next(&mut self, _th: &mut Thread) -> Result<Next> {
        let item = sync::read(&self.items).get(self.index).cloned();
        self.index += 1;
        Ok(item.map_or(Next::Done, Next::Item))
    }
}

/// 表遍历，元素为 `Pair<K,V>`
pub struct TableIter {
    table: Shared<Table>,
    index: usize,
}

impl TableIter {
    pub fn new(table: Shared<Table>) -> Self {
        TableIter { table, index: 0 }
    }
}

impl Iter for TableIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        let entry = sync::read(&self.table).entries().get(self.index).cloned();
        self.index += 1;
        match entry {
            Some((k, v)) => Ok(Next::Item(th.rt.pair_value(k, v)?)),
            None => Ok(Next::Done),
        }
    }
}

/// 二进制缓冲区逐字节
pub struct BinIter {
    bytes: Shared<Vec<u8>>,
    index: usize,
}

impl BinIter {
    pub fn new(bytes: Shared<Vec<u8>>) -> Self {
        BinIter { bytes, index: 0 }
    }
}

impl Iter for BinIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        let byte = sync::read(&self.bytes).get(self.index).copied();
        self.index += 1;
        Ok(byte.map_or(Next::Done, |b| Next::Item(th.types.int(b as i64))))
    }
}

/// 字符串逐字符
pub struct CharIter {
    text: Arc<str>,
    offset: usize,
}

impl CharIter {
    pub fn new(text: Arc<str>) -> Self {
        CharIter { text, offset: 0 }
    }
}

impl Iter for CharIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        match self.text[self.offset..].chars().next() {
            Some(c) => {
                self.offset += c.len_utf8();
                Ok(Next::Item(th.types.character(c)))
            }
            None => Ok(Next::Done),
        }
    }
}

/// UTF-16 字符串逐码元
pub struct WCharIter {
    units: Arc<[u16]>,
    index: usize,
}

impl WCharIter {
    pub fn new(units: Arc<[u16]>) -> Self {
        WCharIter { units, index: 0 }
    }
}

impl Iter for WCharIter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        let unit = self.units.get(self.index).copied();
        self.index += 1;
        Ok(unit.map_or(Next::Done, |u| Next::Item(th.types.wchar(u))))
    }
}

/// 每个元素调用一次谓词，跳过不满足的
pub struct Filter {
    source: IterRef,
    pred: Value,
}

impl Filter {
    pub fn new(source: IterRef, pred: Value) -> Self {
        Filter { source, pred }
    }
}

impl Iter for Filter {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        loop {
            match self.source.next(th)? {
                Next::Item(v) => {
                    let keep = th.call_sync(&self.pred, vec![v.clone()])?;
                    if keep.is_some_and(|k| k.truthy()) {
                        return Ok(Next::Item(v));
                    }
                }
                other => return Ok(other),
            }
        }
    }
}

/// 每个元素调用一次变换
pub struct Map {
    source: IterRef,
    func: Value,
}

impl Map {
    pub fn new(source: IterRef, func: Value) -> Self {
        Map { source, func }
    }
}

impl Iter for Map {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        match self.source.next(th)? {
            Next::Item(v) => {
                let mapped = th
                    .call_sync(&self.func, vec![v])?
                    .ok_or_else(|| TarnError::underflow("map"))?;
                Ok(Next::Item(mapped))
            }
            other => Ok(other),
        }
    }
}

/// 配对两个迭代器，较短者耗尽时停止
pub struct Zip {
    left: IterRef,
    right: IterRef,
    /// 右侧暂无元素时保留左侧已取出的元素
    held: Option<Value>,
}

impl Zip {
    pub fn new(left: IterRef, right: IterRef) -> Self {
        Zip {
            left,
            right,
            held: None,
        }
    }
}

impl Iter for Zip {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        let left = match self.held.take() {
            Some(v) => v,
            None => match self.left.next(th)? {
                Next::Item(v) => v,
                other => return Ok(other),
            },
        };
        match self.right.next(th)? {
            Next::Item(right) => Ok(Next::Item(th.rt.pair_value(left, right)?)),
            Next::Pending => {
                self.held = Some(left);
                Ok(Next::Pending)
            }
            Next::Done => Ok(Next::Done),
        }
    }
}

/// [0, max) 的无穷随机数流
pub struct Rand {
    rng: StdRng,
    max: i64,
}

impl Rand {
    pub fn new(max: i64) -> Result<Self> {
        if max <= 0 {
            return Err(TarnError::new(
                ErrorKind::Arithmetic,
                format!("rand needs a positive bound, got {max}"),
            ));
        }
        Ok(Rand {
            rng: StdRng::from_entropy(),
            max,
        })
    }

    pub fn seeded(max: i64, seed: u64) -> Result<Self> {
        let mut r = Rand::new(max)?;
        r.rng = StdRng::seed_from_u64(seed);
        Ok(r)
    }
}

impl Iter for Rand {
    fn next(&mut self, th: &mut Thread) -> Result<Next> {
        Ok(Next::Item(th.types.int(self.rng.gen_range(0..self.max))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::shared;
    use crate::runtime::iter::IterCell;
    use crate::runtime::registry::{EngineConfig, Runtime};
    use tarn_log::Logger;

    fn thread() -> Thread {
        Thread::new(Runtime::new(EngineConfig::default(), Logger::noop()))
    }

    fn drain(it: &IterRef, th: &mut Thread) -> Vec<Value> {
        let mut out = Vec::new();
        while let Next::Item(v) = it.next(th).unwrap() {
            out.push(v);
        }
        out
    }

    #[test]
    fn test_range() {
        let mut th = thread();
        let it = IterCell::new(Range::new(2, 5));
        let items: Vec<i64> = drain(&it, &mut th).iter().filter_map(|v| v.as_i64()).collect();
        assert_eq!(items, vec![2, 3, 4]);
    }

    #[test]
    fn test_chars() {
        let mut th = thread();
        let it = IterCell::new(CharIter::new("hé!".into()));
        let items: Vec<String> = drain(&it, &mut th).iter().map(|v| v.to_string()).collect();
        assert_eq!(items, vec!["h", "é", "!"]);
    }

    #[test]
    fn test_table_yields_pairs() {
        let mut th = thread();
        let mut table = Table::new();
        table.insert(th.types.symbol("a"), th.types.int(1));
        let it = IterCell::new(TableIter::new(shared(table)));
        let items = drain(&it, &mut th);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].type_name(), "Pair<Sym,I64>");
    }

    #[test]
    fn test_zip_stops_at_shorter() {
        let mut th = thread();
        let it = IterCell::new(Zip::new(
            IterCell::new(Range::new(0, 3)),
            IterCell::new(BinIter::new(shared(vec![7, 8]))),
        ));
        assert_eq!(drain(&it, &mut th).len(), 2);
    }

    #[test]
    fn test_rand_in_bounds() {
        let mut th = thread();
        let it = IterCell::new(Rand::seeded(10, 42).unwrap());
        for _ in 0..50 {
            match it.next(&mut th).unwrap() {
                Next::Item(v) => assert!((0..10).contains(&v.as_i64().unwrap())),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(Rand::new(0).is_err());
    }
}
