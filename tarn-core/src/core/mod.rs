//! 核心数据模型：值、类型、函数、标签、操作、错误

pub mod error;
pub mod func;
pub mod label;
pub mod op;
pub mod sync;
pub mod types;
pub mod value;

pub use error::{line_col, ErrorKind, Result, TarnError};
pub use func::{Arg, ArgMatch, Func, FuncBody, FuncImp, NativeFn, Predicate, Safety};
pub use label::{Label, Lambda, LambdaDef};
pub use op::{ExitKind, FmtPart, LambdaKind, Op};
pub use types::{get_super, Behavior, Callable, Iterable, Plain, Stream, Type, TypeRef};
pub use value::{shared, Env, Rat, Shared, Sym, Table, Val, Value};
