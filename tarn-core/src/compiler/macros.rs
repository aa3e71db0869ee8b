//! 内置宏
//!
//! 带冒号的宏消费 token 直到结束的 `;`：
//! `func:` `let:` `struct:` `conv:` `test:` `try:` `unsafe:` `defer:`。
//! 其余是不消费 token 的关键字：`true` `false` `nil` `drop` `check` `for` `while`，
//! 以及可带深度后缀的 `return` `recall` `yield` `break`。

use std::collections::HashSet;
use std::sync::Arc;

use super::{split_depth, Compiler, Macro, PendingFunc, TokenStream, TypeExpr};
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{Arg, FuncBody, Safety};
use crate::core::label::{Label, Lambda};
use crate::core::op::{ExitKind, LambdaKind, Op};
use crate::core::sync;
use crate::core::types::TypeRef;
use crate::core::value::{shared, Env, Sym, Val, Value};
use crate::kit::lexer::Token;
use crate::runtime::behavior::StructBehavior;
use crate::runtime::registry::{Builtins, Runtime};
use crate::runtime::{Control, Thread};

/// 注册全部内置宏
pub fn register(rt: &Runtime) {
    rt.register_macro("func:", Arc::new(func_macro));
    rt.register_macro("let:", Arc::new(let_macro));
    rt.register_macro("struct:", Arc::new(struct_macro));
    rt.register_macro("conv:", Arc::new(conv_macro));
    rt.register_macro("test:", Arc::new(test_macro));
    rt.register_macro("try:", Arc::new(try_macro));
    rt.register_macro("unsafe:", Arc::new(unsafe_macro));
    rt.register_macro("defer:", Arc::new(defer_macro));

    rt.register_macro("true", Arc::new(Simple(|t| Op::Push(t.boolean(true)))));
    rt.register_macro("false", Arc::new(Simple(|t| Op::Push(t.boolean(false)))));
    rt.register_macro("nil", Arc::new(Simple(|t| Op::Push(t.nil()))));
    rt.register_macro("drop", Arc::new(Simple(|_| Op::Drop(1))));
    rt.register_macro("check", Arc::new(Simple(|_| Op::Check(None))));
    rt.register_macro("for", Arc::new(Simple(|_| Op::For { end: None })));
    rt.register_macro("while", Arc::new(Simple(|_| Op::While { end: None })));

    for kind in [ExitKind::Return, ExitKind::Recall, ExitKind::Yield, ExitKind::Break] {
        rt.register_macro(kind.as_str(), Arc::new(ExitMacro(kind)));
    }
}

/// 不消费 token、只发射一个操作的关键字
struct Simple(fn(&Builtins) -> Op);

impl Macro for Simple {
    fn expand(&self, c: &mut Compiler<'_>, _tok: &Token, _rest: &mut TokenStream) -> Result<()> {
        let op = (self.0)(&c.runtime().types);
        c.emit(op);
        Ok(())
    }
}

/// `return` / `recall` / `yield` / `break`，可带深度后缀
struct ExitMacro(ExitKind);

impl Macro for ExitMacro {
    fn expand(&self, c: &mut Compiler<'_>, tok: &Token, _rest: &mut TokenStream) -> Result<()> {
        let depth = match split_depth(&tok.text) {
            Some((base, depth)) if base == self.0.as_str() => depth,
            _ => 0,
        };
        let label = Label::exit(self.0, depth, c.next_id());
        c.emit(Op::Exit {
            label,
            lambda: None,
        });
        Ok(())
    }

    fn accepts_depth(&self) -> bool {
        true
    }
}

// ==================== 工具 ====================

fn parse_type(c: &Compiler<'_>, t: &Token) -> Result<TypeRef> {
    TypeExpr::parse(&t.text)
        .and_then(|expr| expr.resolve(c.runtime()))
        .map_err(|e| e.at(t.pos))
}

fn parse_safety(text: &str) -> Option<Safety> {
    match text {
        "pure" => Some(Safety::Pure),
        "const" => Some(Safety::Const),
        "safe" => Some(Safety::Safe),
        "unsafe" => Some(Safety::Unsafe),
        _ => None,
    }
}

/// 去掉引号，不做插值
fn unquote(t: &Token) -> Option<String> {
    t.is_quoted()
        .then(|| t.text.get(1..t.text.len().saturating_sub(1)).unwrap_or("").to_string())
}

/// 自有值栈上的块：`Begin … End`，保留栈顶
fn own_block(c: &mut Compiler<'_>, ts: &mut TokenStream) -> Result<()> {
    c.emit(Op::Begin {
        own_stack: true,
        safety: None,
    });
    c.compile_until(ts, Some(";"))?;
    c.emit(Op::End);
    Ok(())
}

// ==================== 定义 ====================

/// `func: name (Arg ...) [safety] body ;`
fn func_macro(c: &mut Compiler<'_>, tok: &Token, ts: &mut TokenStream) -> Result<()> {
    let name = ts.expect("a function name", tok)?;
    let open = ts.expect("an argument list", tok)?;
    if !open.is("(") {
        return Err(TarnError::malformed(format!(
            "'func: {}' expects '(' before its arguments",
            name.text
        ))
        .at(open.pos));
    }

    let mut exprs = Vec::new();
    loop {
        let t = ts.expect("')'", tok)?;
        if t.is(")") {
            break;
        }
        exprs.push((TypeExpr::parse(&t.text).map_err(|e| e.at(t.pos))?, t.pos));
    }
    let mut args = Vec::with_capacity(exprs.len());
    for (expr, pos) in &exprs {
        if let TypeExpr::Same(n) | TypeExpr::ArgOf(n, _) = expr {
            if *n >= exprs.len() {
                return Err(TarnError::malformed(format!(
                    "'{expr}' refers past the {} declared argument(s)",
                    exprs.len()
                ))
                .at(*pos));
            }
        }
        args.push(expr.to_arg(c.runtime()).map_err(|e| e.at(*pos))?);
    }

    let safety = match ts.peek().and_then(|t| parse_safety(&t.text)) {
        Some(s) => {
            ts.next();
            s
        }
        None => Safety::Safe,
    };

    let name: Sym = name.text.as_str().into();
    let def = c.compile_lambda(Some(name.clone()), LambdaKind::Body, ts, Some(";"))?;
    c.define_func(
        name,
        PendingFunc {
            args,
            safety,
            body: FuncBody::Lambda(def),
        },
    );
    Ok(())
}

/// `let: name body ;`
fn let_macro(c: &mut Compiler<'_>, tok: &Token, ts: &mut TokenStream) -> Result<()> {
    let name = ts.expect("a name", tok)?;
    if name.is(";") || name.is_quoted() || name.is_brace() {
        return Err(TarnError::malformed(format!("'{}' is not a valid binding name", name.text)).at(name.pos));
    }
    own_block(c, ts)?;
    c.emit(Op::Bind(name.text.as_str().into()));
    Ok(())
}

fn struct_payload(v: &Value) -> Result<crate::core::value::Shared<Vec<Value>>> {
    match &v.val {
        Val::Struct(fields) => Ok(fields.clone()),
        _ => Err(TarnError::mismatch("struct", v.type_name())),
    }
}

/// `struct: Name field field:Type ... ;`
///
/// 注册类型（isa `Struct`）、构造函数 `new`（字段值依次入栈，最后是类型）、
/// 读字段 `.field` 与写字段 `.field=`（结构体留在栈上）。
fn struct_macro(c: &mut Compiler<'_>, tok: &Token, ts: &mut TokenStream) -> Result<()> {
    let name_tok = ts.expect("a type name", tok)?;
    let rt = c.runtime().clone();

    let mut fields: Vec<(Sym, TypeRef)> = Vec::new();
    let mut seen = HashSet::new();
    loop {
        let t = ts.expect("';'", tok)?;
        if t.is(";") {
            break;
        }
        let (field, ty) = match t.text.split_once(':') {
            Some((field, ty)) => {
                let ty = parse_type(c, &Token::new(ty, t.pos + field.len() + 1))?;
                (field, ty)
            }
            None => (t.text.as_str(), rt.types.any.clone()),
        };
        if field.is_empty() || !seen.insert(field.to_string()) {
            return Err(TarnError::malformed(format!("bad or duplicate field '{}'", t.text)).at(t.pos));
        }
        fields.push((field.into(), ty));
    }

    let name: Sym = name_tok.text.as_str().into();
    let behavior = StructBehavior {
        name: name.clone(),
        fields: fields.iter().map(|(f, _)| f.clone()).collect(),
    };
    let ty = rt
        .register_type(&name, vec![rt.types.structure.clone()], Arc::new(behavior))
        .map_err(|e| e.at(name_tok.pos))?;

    let n = fields.len();
    let mut ctor_args: Vec<Arg> = fields.iter().map(|(_, t)| Arg::ty(t)).collect();
    let id = ty.id;
    ctor_args.push(Arg::pred(move |v, _| v.as_type().is_some_and(|t| t.id == id)));
    let ctor_ty = ty.clone();
    rt.native("new", ctor_args, Safety::Pure, move |th: &mut Thread| {
        th.pop()?;
        let values = th.pop_n(n)?;
        th.push(Value::new(ctor_ty.clone(), Val::Struct(shared(values))));
        Ok(Control::Next)
    });

    for (i, (field, field_ty)) in fields.iter().enumerate() {
        rt.native(&format!(".{field}"), vec![Arg::ty(&ty)], Safety::Pure, move |th: &mut Thread| {
            let v = th.pop()?;
            let payload = struct_payload(&v)?;
            let item = sync::read(&payload)[i].clone();
            th.push(item);
            Ok(Control::Next)
        });
        rt.native(
            &format!(".{field}="),
            vec![Arg::ty(&ty), Arg::ty(field_ty)],
            Safety::Const,
            move |th: &mut Thread| {
                let item = th.pop()?;
                let target = th.peek().ok_or_else(|| TarnError::underflow("field update"))?;
                let payload = struct_payload(target)?;
                sync::write(&payload)[i] = item;
                Ok(Control::Next)
            },
        );
    }
    Ok(())
}

/// `conv: From To body ;`：body 拿到待转换的值，留下转换结果
fn conv_macro(c: &mut Compiler<'_>, tok: &Token, ts: &mut TokenStream) -> Result<()> {
    let from_tok = ts.expect("a source type", tok)?;
    let to_tok = ts.expect("a target type", tok)?;
    let from = parse_type(c, &from_tok)?;
    let to = parse_type(c, &to_tok)?;
    let name: Sym = format!("{}->{}", from.name, to.name).into();
    let def = c.compile_lambda(Some(name), LambdaKind::Body, ts, Some(";"))?;
    let target = c.runtime().types.lambda_value(Lambda::new(def, Env::new()));
    c.define_conv(from, to, target);
    Ok(())
}

// ==================== 块 ====================

/// `test: 'message' body ;`：body 必须留下 true
fn test_macro(c: &mut Compiler<'_>, tok: &Token, ts: &mut TokenStream) -> Result<()> {
    let msg = ts.expect("a quoted message", tok)?;
    let message = unquote(&msg).ok_or_else(|| {
        TarnError::new(ErrorKind::MalformedMacro, "'test:' expects a quoted message").at(msg.pos)
    })?;
    own_block(c, ts)?;
    c.emit(Op::EndTest(message));
    Ok(())
}

/// `try: body ;`：压入 nil 或收集到的 `List<Error>`
fn try_macro(c: &mut Compiler<'_>, _tok: &Token, ts: &mut TokenStream) -> Result<()> {
    let end = Label::anon("try", c.next_id());
    c.emit(Op::Try { end: end.clone() });
    c.compile_until(ts, Some(";"))?;
    c.emit(Op::Target(end));
    c.emit(Op::EndTry);
    Ok(())
}

/// `unsafe: body ;`：共享值栈、安全级别为 Unsafe 的作用域
fn unsafe_macro(c: &mut Compiler<'_>, _tok: &Token, ts: &mut TokenStream) -> Result<()> {
    c.emit(Op::Begin {
        own_stack: false,
        safety: Some(Safety::Unsafe),
    });
    c.compile_until(ts, Some(";"))?;
    c.emit(Op::End);
    Ok(())
}

/// `defer: body ;`：当前作用域退出时执行
fn defer_macro(c: &mut Compiler<'_>, _tok: &Token, ts: &mut TokenStream) -> Result<()> {
    c.compile_lambda(None, LambdaKind::Closure, ts, Some(";"))?;
    c.emit(Op::Call("defer-call".into()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::registry::EngineConfig;
    use tarn_log::Logger;

    fn runtime() -> Arc<Runtime> {
        let rt = Runtime::new(EngineConfig::default(), Logger::noop());
        crate::runtime::stdlib::register(&rt);
        register(&rt);
        rt
    }

    #[test]
    fn test_func_defers_registration() {
        let rt = runtime();
        let unit = Compiler::new(&rt).compile("func: twice (I64) dup +;", 0).unwrap();
        assert!(rt.find_func("twice").is_none());
        assert_eq!(unit.funcs.len(), 1);
        let (name, imp) = &unit.funcs[0];
        assert_eq!(&**name, "twice");
        assert_eq!(imp.args.len(), 1);
        assert_eq!(imp.safety, Safety::Safe);
    }

    #[test]
    fn test_func_safety_and_arg_refs() {
        let rt = runtime();
        let unit = Compiler::new(&rt)
            .compile("func: same (Any %0) pure drop drop true;", 0)
            .unwrap();
        let (_, imp) = &unit.funcs[0];
        assert_eq!(imp.safety, Safety::Pure);
        assert!(matches!(imp.args[1], Arg::Same(0)));

        let err = Compiler::new(&rt).compile("func: bad (%3) 1;", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::MalformedMacro);
        let err = Compiler::new(&rt).compile("func: bad I64 1;", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::MalformedMacro);
        let err = Compiler::new(&rt).compile("func: bad (Nope) 1;", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::UnknownId);
    }

    #[test]
    fn test_missing_terminator() {
        let rt = runtime();
        let err = Compiler::new(&rt).compile("let: x 1 2", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::MalformedMacro);
        assert_eq!(err.pos, Some(0));
    }

    #[test]
    fn test_struct_registers_type_and_accessors() {
        let rt = runtime();
        Compiler::new(&rt).compile("struct: Point x:I64 y;", 0).unwrap();
        let ty = rt.find_type("Point").unwrap();
        assert!(ty.isa(&rt.types.structure));
        assert!(rt.find_func("new").is_some());
        assert!(rt.find_func(".x").is_some());
        assert!(rt.find_func(".y=").is_some());
        let err = Compiler::new(&rt).compile("struct: Point a;", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::DuplicateRegistration);
        let err = Compiler::new(&rt).compile("struct: Q a a;", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::MalformedMacro);
    }

    #[test]
    fn test_conv_is_pending() {
        let rt = runtime();
        let unit = Compiler::new(&rt).compile("conv: I64 Str str;", 0).unwrap();
        assert_eq!(unit.convs.len(), 1);
        assert!(rt.find_conv(&rt.types.int, &rt.types.string).is_none());
    }

    #[test]
    fn test_exit_depth_suffix() {
        let rt = runtime();
        let ops = Compiler::new(&rt).compile("{ break2 }", 0).unwrap().ops;
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Exit { label, .. } if label.role == Some((ExitKind::Break, 2)))));
    }

    #[test]
    fn test_test_requires_quoted_message() {
        let rt = runtime();
        let err = Compiler::new(&rt).compile("test: nope true;", 0).err().unwrap();
        assert_eq!(err.kind, ErrorKind::MalformedMacro);
    }
}
