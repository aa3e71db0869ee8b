//! 类型表达式
//!
//! 支持：
//! - 命名类型：`I64`、`Str`、用户 `struct:` 类型
//! - 泛型实例：`List<I64>`、`Table<Str,List<I64>>`
//! - 签名中的参数引用：`%0`（与第 0 个参数同类型）、`%0.1`（第 0 个参数类型的第 1 个类型参数）

use std::fmt;

use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::Arg;
use crate::core::types::TypeRef;
use crate::runtime::registry::Runtime;

/// 类型表达式
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Named(String),
    Generic(String, Vec<TypeExpr>),
    /// `%N`
    Same(usize),
    /// `%N.K`
    ArgOf(usize, usize),
}

impl TypeExpr {
    /// 形如 `Name<...>` 的单个 token
    pub fn looks_generic(text: &str) -> bool {
        text.chars().next().is_some_and(char::is_alphabetic)
            && text.contains('<')
            && text.ends_with('>')
    }

    pub fn parse(text: &str) -> Result<TypeExpr> {
        let mut parser = Parser { text, pos: 0 };
        let expr = parser.expr()?;
        if parser.pos != text.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(expr)
    }

    /// 解析为具体类型（编译期）；泛型按需实例化
    pub fn resolve(&self, rt: &Runtime) -> Result<TypeRef> {
        match self {
            TypeExpr::Named(name) => rt
                .find_type(name)
                .ok_or_else(|| TarnError::new(ErrorKind::UnknownId, format!("unknown type '{name}'"))),
            TypeExpr::Generic(name, args) => {
                let args = args
                    .iter()
                    .map(|a| a.resolve(rt))
                    .collect::<Result<Vec<_>>>()?;
                rt.instantiate_named(name, args)
            }
            TypeExpr::Same(_) | TypeExpr::ArgOf(..) => Err(TarnError::malformed(format!(
                "'{self}' is only valid in a function signature"
            ))),
        }
    }

    /// 函数签名中的参数谓词
    pub fn to_arg(&self, rt: &Runtime) -> Result<Arg> {
        match self {
            TypeExpr::Same(n) => Ok(Arg::Same(*n)),
            TypeExpr::ArgOf(n, k) => Ok(Arg::TypeArg(*n, *k)),
            _ => Ok(Arg::Type(self.resolve(rt)?)),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::Generic(name, args) => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}<{}>", name, args.join(","))
            }
            TypeExpr::Same(n) => write!(f, "%{n}"),
            TypeExpr::ArgOf(n, k) => write!(f, "%{n}.{k}"),
        }
    }
}

// ==================== 解析 ====================

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, what: &str) -> TarnError {
        TarnError::new(
            ErrorKind::BadLiteral,
            format!("bad type expression '{}': {what} at {}", self.text, self.pos),
        )
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Result<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| self.error("expected an argument index"))
    }

    fn expr(&mut self) -> Result<TypeExpr> {
        if self.eat('%') {
            let n = self.number()?;
            if self.eat('.') {
                let k = self.number()?;
                return Ok(TypeExpr::ArgOf(n, k));
            }
            return Ok(TypeExpr::Same(n));
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !matches!(c, '<' | '>' | ','))
        {
            self.pos += self.peek().map_or(1, char::len_utf8);
        }
        if start == self.pos {
            return Err(self.error("expected a type name"));
        }
        let name = self.text[start..self.pos].to_string();
        if !self.eat('<') {
            return Ok(TypeExpr::Named(name));
        }

        let mut args = vec![self.expr()?];
        while self.eat(',') {
            args.push(self.expr()?);
        }
        if !self.eat('>') {
            return Err(self.error("expected '>'"));
        }
        Ok(TypeExpr::Generic(name, args))
    }
}
