//! 运行时值
//!
//! `Value` = 类型引用 + 带标签的载荷。标量直接持有数据，
//! 堆类型（列表、表、结构体、二进制缓冲区）通过 `Arc<RwLock<_>>` 共享，
//! 身份相等比较句柄，值相等由类型行为决定。

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::error::TarnError;
use super::label::{Label, Lambda};
use super::sync;
use super::types::TypeRef;
use crate::runtime::coro::Fiber;
use crate::runtime::iter::io::{FileHandle, SocketHandle};
use crate::runtime::iter::IterRef;
use crate::runtime::spawn::ThreadHandle;

/// 符号（标识符、变量名、函数名）
pub type Sym = Arc<str>;

/// 变量环境
pub type Env = HashMap<Sym, Value>;

/// 可变共享的堆数据
pub type Shared<T> = Arc<RwLock<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

// ==================== Rat ====================

/// 有理数，分母恒为正且已约分
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rat {
    num: i64,
    den: i64,
}

/// 在 i128 上计算，`i64::MIN` 和 `-1` 的组合不会溢出
fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    i128::try_from(a).unwrap_or(i128::MAX)
}

impl Rat {
    /// 分母为零或约分后超出 i64 时返回 None
    pub fn new(num: i64, den: i64) -> Option<Rat> {
        Rat::from_wide(i128::from(num), i128::from(den))
    }

    pub fn from_int(n: i64) -> Rat {
        Rat { num: n, den: 1 }
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }

    fn from_wide(num: i128, den: i128) -> Option<Rat> {
        if den == 0 {
            return None;
        }
        let g = gcd(num, den).max(1);
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = num.checked_neg()?;
            den = den.checked_neg()?;
        }
        Some(Rat {
            num: i64::try_from(num).ok()?,
            den: i64::try_from(den).ok()?,
        })
    }

    pub fn checked_add(self, rhs: Rat) -> Option<Rat> {
        let num = (self.num as i128 * rhs.den as i128)
            .checked_add(rhs.num as i128 * self.den as i128)?;
        Rat::from_wide(num, self.den as i128 * rhs.den as i128)
    }

    pub fn checked_sub(self, rhs: Rat) -> Option<Rat> {
        let num = (self.num as i128 * rhs.den as i128)
            .checked_sub(rhs.num as i128 * self.den as i128)?;
        Rat::from_wide(num, self.den as i128 * rhs.den as i128)
    }

    pub fn checked_mul(self, rhs: Rat) -> Option<Rat> {
        Rat::from_wide(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }

    pub fn checked_div(self, rhs: Rat) -> Option<Rat> {
        if rhs.num == 0 {
            return None;
        }
        Rat::from_wide(
            self.num as i128 * rhs.den as i128,
            self.den as i128 * rhs.num as i128,
        )
    }
}

impl Ord for Rat {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
}

impl PartialOrd for Rat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

// ==================== Table ====================

/// 按插入顺序保存的键值表，键按值相等比较
#[derive(Clone, Default)]
pub struct Table {
    entries: Vec<(Value, Value)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.equals(key))
            .map(|(_, v)| v)
    }

    /// 插入或覆盖，返回旧值
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.entries.iter_mut().find(|(k, _)| k.equals(&key)) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k.equals(key))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }
}

// ==================== Val ====================

/// 值载荷
#[derive(Clone)]
pub enum Val {
    Nil,
    Bool(bool),
    I64(i64),
    Rat(Rat),
    Char(char),
    WChar(u16),
    Str(Arc<str>),
    WStr(Arc<[u16]>),
    Sym(Sym),
    /// 按名字引用的重载集，调用时取注册表里的最新版本
    Func(Sym),
    Type(TypeRef),
    Lambda(Arc<Lambda>),
    Label(Arc<Label>),
    Bin(Shared<Vec<u8>>),
    List(Shared<Vec<Value>>),
    Table(Shared<Table>),
    Pair(Arc<(Value, Value)>),
    Struct(Shared<Vec<Value>>),
    Iter(IterRef),
    File(Arc<FileHandle>),
    Socket(Arc<SocketHandle>),
    Fiber(Arc<Fiber>),
    Thread(Arc<ThreadHandle>),
    Error(Arc<TarnError>),
}

impl Val {
    /// 身份相等：标量比较内容，堆对象比较句柄
    pub fn identical(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::I64(a), Val::I64(b)) => a == b,
            (Val::Rat(a), Val::Rat(b)) => a == b,
            (Val::Char(a), Val::Char(b)) => a == b,
            (Val::WChar(a), Val::WChar(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::WStr(a), Val::WStr(b)) => a == b,
            (Val::Sym(a), Val::Sym(b)) => a == b,
            (Val::Func(a), Val::Func(b)) => a == b,
            (Val::Type(a), Val::Type(b)) => a.id == b.id,
            (Val::Lambda(a), Val::Lambda(b)) => Arc::ptr_eq(a, b),
            (Val::Label(a), Val::Label(b)) => Arc::ptr_eq(a, b),
            (Val::Bin(a), Val::Bin(b)) => Arc::ptr_eq(a, b),
            (Val::List(a), Val::List(b)) => Arc::ptr_eq(a, b),
            (Val::Table(a), Val::Table(b)) => Arc::ptr_eq(a, b),
            (Val::Pair(a), Val::Pair(b)) => Arc::ptr_eq(a, b),
            (Val::Struct(a), Val::Struct(b)) => Arc::ptr_eq(a, b),
            (Val::Iter(a), Val::Iter(b)) => Arc::ptr_eq(a, b),
            (Val::File(a), Val::File(b)) => Arc::ptr_eq(a, b),
            (Val::Socket(a), Val::Socket(b)) => Arc::ptr_eq(a, b),
            (Val::Fiber(a), Val::Fiber(b)) => Arc::ptr_eq(a, b),
            (Val::Thread(a), Val::Thread(b)) => Arc::ptr_eq(a, b),
            (Val::Error(a), Val::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// 结构相等
    pub fn equals(&self, other: &Val) -> bool {
        if self.identical(other) {
            return true;
        }
        match (self, other) {
            (Val::I64(a), Val::Rat(b)) | (Val::Rat(b), Val::I64(a)) => Rat::from_int(*a) == *b,
            (Val::Bin(a), Val::Bin(b)) => *sync::read(a) == *sync::read(b),
            (Val::List(a), Val::List(b)) | (Val::Struct(a), Val::Struct(b)) => {
                let (a, b) = (sync::read(a), sync::read(b));
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Val::Table(a), Val::Table(b)) => {
                let (a, b) = (sync::read(a), sync::read(b));
                a.len() == b.len()
                    && a
                        .entries()
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.equals(w)))
            }
            (Val::Pair(a), Val::Pair(b)) => a.0.equals(&b.0) && a.1.equals(&b.1),
            (Val::Error(a), Val::Error(b)) => a.kind == b.kind && a.message == b.message,
            _ => false,
        }
    }

    pub fn compare(&self, other: &Val) -> Option<Ordering> {
        match (self, other) {
            (Val::I64(a), Val::I64(b)) => Some(a.cmp(b)),
            (Val::Rat(a), Val::Rat(b)) => Some(a.cmp(b)),
            (Val::I64(a), Val::Rat(b)) => Some(Rat::from_int(*a).cmp(b)),
            (Val::Rat(a), Val::I64(b)) => Some(a.cmp(&Rat::from_int(*b))),
            (Val::Bool(a), Val::Bool(b)) => Some(a.cmp(b)),
            (Val::Char(a), Val::Char(b)) => Some(a.cmp(b)),
            (Val::WChar(a), Val::WChar(b)) => Some(a.cmp(b)),
            (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
            (Val::WStr(a), Val::WStr(b)) => Some(a.cmp(b)),
            (Val::Sym(a), Val::Sym(b)) => Some(a.cmp(b)),
            (Val::Pair(a), Val::Pair(b)) => match a.0.compare(&b.0)? {
                Ordering::Equal => a.1.compare(&b.1),
                ord => Some(ord),
            },
            (Val::List(a), Val::List(b)) => {
                let (a, b) = (sync::read(a).clone(), sync::read(b).clone());
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// 渲染；verbose 为 true 时输出可回读的字面量形式
    pub fn render(&self, out: &mut String, verbose: bool) {
        use std::fmt::Write;
        match self {
            Val::Nil => out.push_str("nil"),
            Val::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Val::I64(n) => {
                let _ = write!(out, "{n}");
            }
            Val::Rat(r) => {
                let _ = write!(out, "{r}");
            }
            Val::Char(c) => {
                if verbose {
                    out.push('\\');
                }
                out.push(*c);
            }
            Val::WChar(c) => {
                if verbose {
                    out.push_str("\\\\");
                }
                out.push_str(&String::from_utf16_lossy(&[*c]));
            }
            Val::Str(s) => {
                if verbose {
                    out.push('\'');
                    escape_into(s, '\'', out);
                    out.push('\'');
                } else {
                    out.push_str(s);
                }
            }
            Val::WStr(w) => {
                let s = String::from_utf16_lossy(w);
                if verbose {
                    out.push('"');
                    escape_into(&s, '"', out);
                    out.push('"');
                } else {
                    out.push_str(&s);
                }
            }
            Val::Sym(s) => {
                if verbose {
                    out.push('#');
                }
                out.push_str(s);
            }
            Val::Func(name) => {
                if verbose {
                    out.push('&');
                }
                out.push_str(name);
            }
            Val::Type(t) => out.push_str(&t.name),
            Val::Lambda(l) => {
                let _ = write!(out, "{{lambda#{}}}", l.def.id);
            }
            Val::Label(l) => {
                let _ = write!(out, "@{}", l.name);
            }
            Val::Bin(b) => {
                out.push_str("bin[");
                for (i, byte) in sync::read(b).iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    let _ = write!(out, "{byte}");
                }
                out.push(']');
            }
            Val::List(items) => {
                out.push('[');
                for (i, item) in sync::read(items).iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.dump_into(out);
                }
                out.push(']');
            }
            Val::Table(t) => {
                out.push('{');
                for (i, (k, v)) in sync::read(t).entries().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.dump_into(out);
                    out.push_str(": ");
                    v.dump_into(out);
                }
                out.push('}');
            }
            Val::Pair(p) => {
                out.push_str("pair(");
                p.0.dump_into(out);
                out.push(' ');
                p.1.dump_into(out);
                out.push(')');
            }
            Val::Struct(fields) => {
                out.push_str("struct(");
                for (i, f) in sync::read(fields).iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    f.dump_into(out);
                }
                out.push(')');
            }
            Val::Iter(_) => out.push_str("<iter>"),
            Val::File(f) => {
                let _ = write!(out, "<file {}>", f.path());
            }
            Val::Socket(s) => {
                let _ = write!(out, "<socket {}>", s.addr());
            }
            Val::Fiber(f) => {
                let _ = write!(out, "<fiber#{}>", f.id);
            }
            Val::Thread(t) => {
                let _ = write!(out, "<thread#{}>", t.id);
            }
            Val::Error(e) => {
                let _ = write!(out, "error({e})");
            }
        }
    }
}

fn escape_into(s: &str, quote: char, out: &mut String) {
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

// ==================== Value ====================

/// 运行时值：类型 + 载荷
#[derive(Clone)]
pub struct Value {
    pub ty: TypeRef,
    pub val: Val,
}

impl Value {
    pub fn new(ty: TypeRef, val: Val) -> Self {
        Value { ty, val }
    }

    pub fn type_name(&self) -> &str {
        &self.ty.name
    }

    pub fn isa(&self, ty: &TypeRef) -> bool {
        self.ty.isa(ty)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.val, Val::Nil)
    }

    /// nil 和 false 为假，其余为真
    pub fn truthy(&self) -> bool {
        !matches!(self.val, Val::Nil | Val::Bool(false))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.val {
            Val::I64(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.val {
            Val::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.val {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sym(&self) -> Option<&Sym> {
        match &self.val {
            Val::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeRef> {
        match &self.val {
            Val::Type(t) => Some(t),
            _ => None,
        }
    }

    /// 列表元素快照
    pub fn as_list(&self) -> Option<Vec<Value>> {
        match &self.val {
            Val::List(items) => Some(sync::read(items).clone()),
            _ => None,
        }
    }

    /// 身份相等（类型行为）
    pub fn same(&self, other: &Value) -> bool {
        self.ty.behavior.eq(self, other)
    }

    /// 值相等（类型行为）
    pub fn equals(&self, other: &Value) -> bool {
        self.ty.behavior.eqval(self, other)
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        self.ty.behavior.cmp(self, other)
    }

    pub fn print_into(&self, out: &mut String) {
        self.ty.behavior.print(self, out);
    }

    pub fn dump_into(&self, out: &mut String) {
        self.ty.behavior.dump(self, out);
    }

    /// 详细形式
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out);
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.print_into(&mut out);
        f.write_str(&out)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.dump(), self.ty.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rat_normalizes() {
        let r = Rat::new(2, -4).unwrap();
        assert_eq!((r.num(), r.den()), (-1, 2));
        assert!(Rat::new(1, 0).is_none());
    }

    #[test]
    fn test_rat_extremes() {
        assert!(Rat::new(i64::MIN, -1).is_none());
        assert!(Rat::new(0, i64::MIN).is_some());
        let r = Rat::new(i64::MIN, i64::MIN).unwrap();
        assert_eq!((r.num(), r.den()), (1, 1));
        let r = Rat::new(i64::MIN, 2).unwrap();
        assert_eq!((r.num(), r.den()), (i64::MIN / 2, 1));
        let min = Rat::from_int(i64::MIN);
        assert!(min.checked_add(min).is_none());
        assert!(min.checked_mul(min).is_none());
        assert!(min.checked_div(Rat::from_int(-1)).is_none());
    }

    #[test]
    fn test_rat_arithmetic() {
        let third = Rat::new(1, 3).unwrap();
        let half = Rat::new(1, 2).unwrap();
        assert_eq!(third.checked_add(half), Rat::new(5, 6));
        assert_eq!(half.checked_sub(third), Rat::new(1, 6));
        assert_eq!(half.checked_mul(third), Rat::new(1, 6));
        assert_eq!(third.checked_div(half), Rat::new(2, 3));
        assert!(half.checked_div(Rat::from_int(0)).is_none());
        assert!(third < half);
    }

    #[test]
    fn test_val_identity_and_equality() {
        let a = Val::List(shared(Vec::new()));
        let b = Val::List(shared(Vec::new()));
        assert!(a.identical(&a));
        assert!(!a.identical(&b));
        assert!(a.equals(&b));
        assert!(Val::I64(2).equals(&Val::Rat(Rat::from_int(2))));
        assert!(Val::Str("x".into()).identical(&Val::Str("x".into())));
    }

    #[test]
    fn test_val_compare() {
        assert_eq!(Val::I64(1).compare(&Val::I64(2)), Some(Ordering::Less));
        assert_eq!(
            Val::Rat(Rat::new(1, 2).unwrap()).compare(&Val::I64(0)),
            Some(Ordering::Greater)
        );
        assert_eq!(Val::Nil.compare(&Val::I64(0)), None);
    }

    #[test]
    fn test_render_scalars() {
        let mut out = String::new();
        Val::Str("a'b".into()).render(&mut out, true);
        assert_eq!(out, "'a\\'b'");
        out.clear();
        Val::Sym("k".into()).render(&mut out, true);
        assert_eq!(out, "#k");
        out.clear();
        Val::Char('x').render(&mut out, false);
        assert_eq!(out, "x");
    }
}
