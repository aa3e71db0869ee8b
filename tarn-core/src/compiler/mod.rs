//! Token → Op 编译器
//!
//! 编译分两步：
//! 1. 按优先级把 token 翻译成操作（宏可以继续消费后面的 token）
//! 2. 多轮 pass：prepare 一次，refresh + rewrite 迭代到不动点，最后 finalize 分配 pc
//!
//! `func:` / `conv:` 的注册推迟到编译成功之后（见 [`CompileUnit`]）；
//! `struct:` 声明的类型在编译期立即注册，后面的类型表达式才能引用它。

pub mod macros;
pub mod passes;
pub mod type_expr;

use std::collections::HashSet;
use std::sync::Arc;

use tarn_log::{debug, trace, Logger};

use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{Arg, FuncBody, Safety};
use crate::core::label::{Label, LambdaDef};
use crate::core::op::{FmtPart, LambdaKind, Op};
use crate::core::types::TypeRef;
use crate::core::value::{Rat, Sym, Value};
use crate::kit::lexer::{Lexer, Token};
use crate::runtime::registry::Runtime;

pub use type_expr::TypeExpr;

const TARGET: &str = "tarn::compiler";

// ==================== 宏 ====================

/// 编译期宏：拿到触发它的 token 和剩余 token 流，向编译器发射操作
pub trait Macro: Send + Sync {
    fn expand(&self, c: &mut Compiler<'_>, tok: &Token, rest: &mut TokenStream) -> Result<()>;

    /// 是否接受数字后缀（`return1`、`break2`）
    fn accepts_depth(&self) -> bool {
        false
    }
}

impl<F> Macro for F
where
    F: Fn(&mut Compiler<'_>, &Token, &mut TokenStream) -> Result<()> + Send + Sync,
{
    fn expand(&self, c: &mut Compiler<'_>, tok: &Token, rest: &mut TokenStream) -> Result<()> {
        self(c, tok, rest)
    }
}

/// 可回看的 token 流
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        TokenStream { tokens, pos: 0 }
    }

    pub fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// 取下一个 token；流结束时报 `MalformedMacro`
    pub fn expect(&mut self, what: &str, after: &Token) -> Result<Token> {
        self.next().ok_or_else(|| {
            TarnError::malformed(format!("'{}' expects {what}", after.text)).at(after.pos)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

// ==================== 编译单元 ====================

/// 延迟注册的用户函数实现
pub struct PendingFunc {
    pub args: Vec<Arg>,
    pub safety: Safety,
    pub body: FuncBody,
}

/// 一次编译的产物：已分配 pc 的操作 + 等待注册的函数与转换
pub struct CompileUnit {
    pub ops: Vec<Op>,
    pub funcs: Vec<(Sym, PendingFunc)>,
    pub convs: Vec<(TypeRef, TypeRef, Value)>,
}

// ==================== 编译器 ====================

pub struct Compiler<'a> {
    rt: &'a Arc<Runtime>,
    lexer: Lexer,
    pub(crate) logger: Arc<Logger>,
    ops: Vec<Op>,
    funcs: Vec<(Sym, PendingFunc)>,
    convs: Vec<(TypeRef, TypeRef, Value)>,
    /// 本单元内定义、尚未注册的函数名
    pending: HashSet<Sym>,
}

impl<'a> Compiler<'a> {
    pub fn new(rt: &'a Arc<Runtime>) -> Self {
        let logger = rt.logger.clone();
        Compiler {
            rt,
            lexer: Lexer::with_logger(logger.clone()),
            logger,
            ops: Vec::new(),
            funcs: Vec::new(),
            convs: Vec::new(),
            pending: HashSet::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        self.rt
    }

    /// 编译 `src`，生成的操作从 `base` 开始编号
    pub fn compile(mut self, src: &str, base: usize) -> Result<CompileUnit> {
        let tokens = self.lexer.tokenize(src)?;
        debug!(target: TARGET, self.logger, "compiling {} tokens at base {}", tokens.len(), base);
        let mut stream = TokenStream::new(tokens);
        self.compile_until(&mut stream, None)?;

        let ops = std::mem::take(&mut self.ops);
        let ops = passes::run(&self, ops, base)?;
        debug!(target: TARGET, self.logger, "compiled {} ops", ops.len());
        Ok(CompileUnit {
            ops,
            funcs: self.funcs,
            convs: self.convs,
        })
    }

    // ---------- 宏可用的发射接口 ----------

    pub fn emit(&mut self, op: Op) {
        trace!(target: TARGET, self.logger, "emit {}", op);
        self.ops.push(op);
    }

    pub fn next_id(&self) -> usize {
        self.rt.next_id()
    }

    /// 本单元或注册表中已知的函数
    pub fn is_func(&self, name: &str) -> bool {
        self.pending.contains(name) || self.rt.find_func(name).is_some()
    }

    pub fn define_func(&mut self, name: Sym, func: PendingFunc) {
        self.pending.insert(name.clone());
        self.funcs.push((name, func));
    }

    pub fn define_conv(&mut self, from: TypeRef, to: TypeRef, target: Value) {
        self.convs.push((from, to, target));
    }

    /// 编译 token 直到 `end`；`end` 为 None 时编译到流结束
    pub fn compile_until(&mut self, ts: &mut TokenStream, end: Option<&str>) -> Result<()> {
        loop {
            let Some(tok) = ts.next() else {
                return match end {
                    None => Ok(()),
                    Some(";") => Err(TarnError::malformed("missing terminating ';'")),
                    Some(e) => Err(TarnError::new(
                        ErrorKind::UnbalancedBraces,
                        format!("missing closing '{e}'"),
                    )),
                };
            };
            if end == Some(tok.text.as_str()) {
                return Ok(());
            }
            self.compile_tok(&tok, ts).map_err(|e| e.at(tok.pos))?;
        }
    }

    /// 编译一段 lambda 体：`Lambda … Unlambda`，跳过标签由 prepare 分配
    pub fn compile_lambda(
        &mut self,
        name: Option<Sym>,
        kind: LambdaKind,
        ts: &mut TokenStream,
        end: Option<&str>,
    ) -> Result<Arc<LambdaDef>> {
        let def = LambdaDef::new(self.next_id(), name);
        self.emit(Op::Lambda {
            def: def.clone(),
            kind,
            skip: None,
        });
        self.compile_until(ts, end)?;
        self.emit(Op::Unlambda(def.id));
        Ok(def)
    }

    /// 花括号块：去掉定界符后重新切分，偏移保持为原始源码中的位置
    fn compile_brace(&mut self, tok: &Token) -> Result<()> {
        let inner = &tok.text[1..tok.text.len() - 1];
        let tokens = self.lexer.tokenize_at(inner, tok.pos + 1)?;
        let mut ts = TokenStream::new(tokens);
        self.compile_lambda(None, LambdaKind::Closure, &mut ts, None)?;
        Ok(())
    }

    fn compile_tok(&mut self, tok: &Token, ts: &mut TokenStream) -> Result<()> {
        let text = tok.text.as_str();
        let types = self.rt.types.clone();

        if tok.is_brace() {
            return self.compile_brace(tok);
        }
        match text {
            "(" => {
                self.emit(Op::Begin {
                    own_stack: true,
                    safety: None,
                });
                self.compile_until(ts, Some(")"))?;
                self.emit(Op::End);
                return Ok(());
            }
            "[" => {
                self.emit(Op::Begin {
                    own_stack: true,
                    safety: None,
                });
                self.compile_until(ts, Some("]"))?;
                self.emit(Op::EndList);
                return Ok(());
            }
            ")" | "]" => {
                return Err(TarnError::new(
                    ErrorKind::UnbalancedBraces,
                    format!("unmatched '{text}'"),
                ))
            }
            ";" => return Err(TarnError::malformed("unexpected ';'")),
            _ => {}
        }

        if let Some(name) = text.strip_prefix('@').filter(|n| !n.is_empty()) {
            self.emit(Op::Target(Label::named(name.into())));
            return Ok(());
        }
        if let Some(name) = text.strip_suffix('!').filter(|n| !n.is_empty()) {
            self.emit(Op::Jump {
                name: name.into(),
                label: None,
            });
            return Ok(());
        }
        if let Some(name) = text.strip_prefix('&').filter(|n| !n.is_empty()) {
            self.emit(Op::Ref(name.into()));
            return Ok(());
        }
        if tok.is_quoted() {
            let op = literal_string(text, &types)?;
            self.emit(op);
            return Ok(());
        }
        if let Some(rest) = text.strip_prefix('\\') {
            let v = literal_char(rest, &types)?;
            self.emit(Op::Push(v));
            return Ok(());
        }
        if let Some(name) = text.strip_prefix('#').filter(|n| !n.is_empty()) {
            self.emit(Op::Push(types.symbol(name)));
            return Ok(());
        }
        if starts_number(text) {
            let v = literal_number(text, &types)?;
            self.emit(Op::Push(v));
            return Ok(());
        }
        if let Some(name) = text.strip_prefix('$').filter(|n| !n.is_empty()) {
            self.emit(Op::Get(name.into()));
            return Ok(());
        }
        if TypeExpr::looks_generic(text) {
            let expr = TypeExpr::parse(text)?;
            self.emit_type(&expr)?;
            return Ok(());
        }
        if let Some(m) = self.find_macro(text) {
            return m.expand(self, tok, ts);
        }
        self.emit(Op::Deref(text.into()));
        Ok(())
    }

    /// 精确名字优先；带数字后缀的名字回退到接受深度的宏
    fn find_macro(&self, name: &str) -> Option<Arc<dyn Macro>> {
        if let Some(m) = self.rt.find_macro(name) {
            return Some(m);
        }
        let (base, _) = split_depth(name)?;
        self.rt.find_macro(base).filter(|m| m.accepts_depth())
    }

    /// 类型表达式：泛型用 `Param … Unparam` 括起来，由 rewrite 折叠成常量
    pub fn emit_type(&mut self, expr: &TypeExpr) -> Result<()> {
        match expr {
            TypeExpr::Named(name) => {
                self.emit(Op::Deref(name.as_str().into()));
                Ok(())
            }
            TypeExpr::Generic(name, args) => {
                let id = self.next_id();
                self.emit(Op::Param(id));
                for arg in args {
                    self.emit_type(arg)?;
                }
                self.emit(Op::Unparam {
                    id,
                    template: name.as_str().into(),
                });
                Ok(())
            }
            TypeExpr::Same(_) | TypeExpr::ArgOf(..) => Err(TarnError::malformed(format!(
                "'{expr}' is only valid in a function signature"
            ))),
        }
    }
}

// ==================== 字面量 ====================

/// 名字末尾的十进制深度后缀：`return2` → (`return`, 2)
pub fn split_depth(name: &str) -> Option<(&str, usize)> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 || digits == name.len() {
        return None;
    }
    let (base, suffix) = name.split_at(name.len() - digits);
    suffix.parse().ok().map(|d| (base, d))
}

fn starts_number(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// 整数或 `n/d` 有理数
fn literal_number(text: &str, types: &crate::runtime::Builtins) -> Result<Value> {
    let bad = || TarnError::new(ErrorKind::BadLiteral, format!("bad number literal '{text}'"));
    if let Some((num, den)) = text.split_once('/') {
        let num: i64 = num.parse().map_err(|_| bad())?;
        let den: i64 = den.parse().map_err(|_| bad())?;
        let r = Rat::new(num, den).ok_or_else(|| {
            TarnError::new(ErrorKind::Arithmetic, format!("zero denominator or overflow in '{text}'"))
        })?;
        return Ok(types.rational(r));
    }
    text.parse::<i64>().map(|n| types.int(n)).map_err(|_| bad())
}

fn char_name(name: &str) -> Option<char> {
    match name {
        "space" => Some(' '),
        "tab" => Some('\t'),
        "newline" => Some('\n'),
        _ => {
            let mut chars = name.chars();
            let c = chars.next()?;
            chars.next().is_none().then_some(c)
        }
    }
}

/// `\c` 字符，`\\c` 宽字符
fn literal_char(rest: &str, types: &crate::runtime::Builtins) -> Result<Value> {
    let bad = || TarnError::new(ErrorKind::BadLiteral, format!("bad character literal '\\{rest}'"));
    if let Some(wide) = rest.strip_prefix('\\').filter(|w| !w.is_empty()) {
        let c = char_name(wide).ok_or_else(bad)?;
        let mut units = [0u16; 2];
        let encoded = c.encode_utf16(&mut units);
        if encoded.len() != 1 {
            return Err(bad());
        }
        return Ok(types.wchar(encoded[0]));
    }
    char_name(rest).map(|c| types.character(c)).ok_or_else(bad)
}

fn is_var_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// 引号字面量：`'...'` 字符串（支持 `$name` / `@name` 插值），`"..."` UTF-16 字符串
fn literal_string(text: &str, types: &crate::runtime::Builtins) -> Result<Op> {
    let wide = text.starts_with('"');
    let body = text.get(1..text.len().saturating_sub(1)).unwrap_or("");

    let mut parts = Vec::new();
    let mut lit = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(|| {
                    TarnError::new(ErrorKind::BadLiteral, "dangling escape in string")
                })?;
                lit.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            '$' | '@' if !wide && chars.peek().is_some_and(|n| is_var_char(*n)) => {
                let mut name = String::new();
                while let Some(n) = chars.peek().copied().filter(|n| is_var_char(*n)) {
                    name.push(n);
                    chars.next();
                }
                if !lit.is_empty() {
                    parts.push(FmtPart::Lit(std::mem::take(&mut lit)));
                }
                parts.push(FmtPart::Var(name.into(), c == '@'));
            }
            other => lit.push(other),
        }
    }

    if wide {
        let units: Vec<u16> = lit.encode_utf16().collect();
        return Ok(Op::Push(types.wstring(units)));
    }
    if parts.is_empty() {
        return Ok(Op::Push(types.string(lit)));
    }
    if !lit.is_empty() {
        parts.push(FmtPart::Lit(lit));
    }
    Ok(Op::Fmt(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Val;
    use crate::runtime::registry::EngineConfig;

    fn runtime() -> Arc<Runtime> {
        let rt = Runtime::new(EngineConfig::default(), Logger::noop());
        crate::runtime::stdlib::register(&rt);
        macros::register(&rt);
        rt
    }

    fn ops(src: &str) -> Vec<Op> {
        let rt = runtime();
        Compiler::new(&rt).compile(src, 0).unwrap().ops
    }

    #[test]
    fn test_split_depth() {
        assert_eq!(split_depth("return2"), Some(("return", 2)));
        assert_eq!(split_depth("return"), None);
        assert_eq!(split_depth("42"), None);
    }

    #[test]
    fn test_number_literals() {
        let rt = runtime();
        let t = &rt.types;
        assert_eq!(literal_number("-12", t).unwrap().as_i64(), Some(-12));
        let r = literal_number("2/4", t).unwrap();
        assert_eq!(r.to_string(), "1/2");
        assert_eq!(literal_number("1x", t).unwrap_err().kind, ErrorKind::BadLiteral);
        assert_eq!(literal_number("1/0", t).unwrap_err().kind, ErrorKind::Arithmetic);
    }

    #[test]
    fn test_char_literals() {
        let rt = runtime();
        let t = &rt.types;
        assert!(matches!(literal_char("a", t).unwrap().val, Val::Char('a')));
        assert!(matches!(literal_char("space", t).unwrap().val, Val::Char(' ')));
        assert!(matches!(literal_char("\\b", t).unwrap().val, Val::WChar(98)));
        assert_eq!(literal_char("ab", t).unwrap_err().kind, ErrorKind::BadLiteral);
    }

    #[test]
    fn test_string_interpolation() {
        let rt = runtime();
        match literal_string("'hi $name, @x!'", &rt.types).unwrap() {
            Op::Fmt(parts) => assert_eq!(
                parts,
                vec![
                    FmtPart::Lit("hi ".into()),
                    FmtPart::Var("name".into(), false),
                    FmtPart::Lit(", ".into()),
                    FmtPart::Var("x".into(), true),
                    FmtPart::Lit("!".into()),
                ]
            ),
            other => panic!("expected fmt, got {other}"),
        }
        match literal_string(r"'a\tb \$x'", &rt.types).unwrap() {
            Op::Push(v) => assert_eq!(v.as_str(), Some("a\tb $x")),
            other => panic!("expected push, got {other}"),
        }
    }

    #[test]
    fn test_pushes_merge() {
        let out = ops("1 2 3");
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Op::PushMany(vs) if vs.len() == 3));
    }

    #[test]
    fn test_known_function_becomes_call() {
        let out = ops("1 2 +");
        assert!(matches!(out.last(), Some(Op::Call(name)) if &**name == "+"));
    }

    #[test]
    fn test_unknown_name_stays_deref() {
        let out = ops("frobnicate");
        assert!(matches!(&out[0], Op::Deref(name) if &**name == "frobnicate"));
    }

    #[test]
    fn test_generic_folds_to_constant() {
        let rt = runtime();
        let out = Compiler::new(&rt).compile("List<I64>", 0).unwrap().ops;
        assert_eq!(out.len(), 1);
        let ty = out[0].pushed_type().unwrap();
        assert_eq!(ty.name, "List<I64>");
    }

    #[test]
    fn test_stray_closers() {
        let rt = runtime();
        let err = Compiler::new(&rt).compile("1 )", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::UnbalancedBraces);
        assert_eq!(err.pos, Some(2));
        let err = Compiler::new(&rt).compile("( 1", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::UnbalancedBraces);
        let err = Compiler::new(&rt).compile("1 ;", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::MalformedMacro);
    }
}
