//! 错误类型 (Core 层)
//!
//! 编译期与运行期共用一个错误结构：种类 + 消息 + 可选源码偏移。
//! 错误本身也是语言里的值（`Error` 类型），try 帧可以按种类检查和清除。

use std::fmt;

/// 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 未知标识符
    UnknownId,
    /// 未知标签
    UnknownLabel,
    /// 调用超出当前作用域的安全级别
    UnsafeCall,
    /// 栈下溢
    StackUnderflow,
    /// 栈或作用域嵌套超出限制
    StackOverflow,
    /// 没有可用的重载
    NotApplicable,
    /// 值不可调用
    NotCallable,
    /// 类型不匹配
    TypeMismatch,
    /// 宏输入格式错误
    MalformedMacro,
    /// 非法字面量
    BadLiteral,
    /// 花括号不平衡
    UnbalancedBraces,
    /// 字符串未闭合
    UnterminatedString,
    /// 泛型参数过多
    GenericArity,
    /// 未注册的泛型模板
    UnknownTemplate,
    /// 除零、溢出
    Arithmetic,
    /// 索引越界
    IndexOutOfBounds,
    /// IO 错误
    Io,
    /// 重复注册
    DuplicateRegistration,
    /// test: 断言失败
    TestFailed,
    /// 用户 raise
    User,
    /// 线程 / fiber 错误
    Thread,
    /// 编译 pass 未收敛
    PassLimit,
}

impl ErrorKind {
    /// 语言内的符号名（`error-kind` 返回、`clear-errors` 接收）
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownId => "unknown-id",
            ErrorKind::UnknownLabel => "unknown-label",
            ErrorKind::UnsafeCall => "unsafe-call",
            ErrorKind::StackUnderflow => "stack-underflow",
            ErrorKind::StackOverflow => "stack-overflow",
            ErrorKind::NotApplicable => "not-applicable",
            ErrorKind::NotCallable => "not-callable",
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::MalformedMacro => "malformed-macro",
            ErrorKind::BadLiteral => "bad-literal",
            ErrorKind::UnbalancedBraces => "unbalanced-braces",
            ErrorKind::UnterminatedString => "unterminated-string",
            ErrorKind::GenericArity => "generic-arity",
            ErrorKind::UnknownTemplate => "unknown-template",
            ErrorKind::Arithmetic => "arithmetic",
            ErrorKind::IndexOutOfBounds => "index-out-of-bounds",
            ErrorKind::Io => "io",
            ErrorKind::DuplicateRegistration => "duplicate-registration",
            ErrorKind::TestFailed => "test-failed",
            ErrorKind::User => "user",
            ErrorKind::Thread => "thread",
            ErrorKind::PassLimit => "pass-limit",
        }
    }

    pub fn all() -> &'static [ErrorKind] {
        &[
            ErrorKind::UnknownId,
            ErrorKind::UnknownLabel,
            ErrorKind::UnsafeCall,
            ErrorKind::StackUnderflow,
            ErrorKind::StackOverflow,
            ErrorKind::NotApplicable,
            ErrorKind::NotCallable,
            ErrorKind::TypeMismatch,
            ErrorKind::MalformedMacro,
            ErrorKind::BadLiteral,
            ErrorKind::UnbalancedBraces,
            ErrorKind::UnterminatedString,
            ErrorKind::GenericArity,
            ErrorKind::UnknownTemplate,
            ErrorKind::Arithmetic,
            ErrorKind::IndexOutOfBounds,
            ErrorKind::Io,
            ErrorKind::DuplicateRegistration,
            ErrorKind::TestFailed,
            ErrorKind::User,
            ErrorKind::Thread,
            ErrorKind::PassLimit,
        ]
    }

    /// 由符号名反查
    pub fn from_name(name: &str) -> Option<ErrorKind> {
        Self::all().iter().copied().find(|k| k.as_str() == name)
    }

    /// 词法 / 编译阶段产生的错误
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnbalancedBraces
                | ErrorKind::UnterminatedString
                | ErrorKind::MalformedMacro
                | ErrorKind::BadLiteral
                | ErrorKind::PassLimit
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 统一错误类型
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TarnError {
    pub kind: ErrorKind,
    pub message: String,
    /// 源码字节偏移（词法 / 编译错误）
    pub pos: Option<usize>,
}

impl TarnError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        TarnError {
            kind,
            message: message.into(),
            pos: None,
        }
    }

    /// 附加源码偏移（已有偏移时保留内层的）
    pub fn at(mut self, pos: usize) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }

    pub fn unknown_id(name: &str) -> Self {
        Self::new(ErrorKind::UnknownId, format!("unknown identifier '{name}'"))
    }

    pub fn underflow(what: &str) -> Self {
        Self::new(ErrorKind::StackUnderflow, format!("stack underflow in {what}"))
    }

    pub fn mismatch(expected: &str, found: &str) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("expected {expected}, found {found}"),
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedMacro, message)
    }

    pub fn io(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<std::io::Error> for TarnError {
    fn from(err: std::io::Error) -> Self {
        TarnError::io(err)
    }
}

pub type Result<T> = std::result::Result<T, TarnError>;

/// 由字节偏移计算 1 起始的行列号
pub fn line_col(src: &str, pos: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in src.char_indices() {
        if i >= pos {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TarnError::unknown_id("foo");
        assert_eq!(err.to_string(), "unknown-id: unknown identifier 'foo'");
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ErrorKind::all() {
            assert_eq!(ErrorKind::from_name(kind.as_str()), Some(*kind));
        }
        assert_eq!(ErrorKind::from_name("nope"), None);
    }

    #[test]
    fn test_at_keeps_inner_position() {
        let err = TarnError::malformed("x").at(3).at(10);
        assert_eq!(err.pos, Some(3));
    }

    #[test]
    fn test_line_col() {
        let src = "ab\ncd\nef";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 4), (2, 2));
        assert_eq!(line_col(src, 6), (3, 1));
    }
}
