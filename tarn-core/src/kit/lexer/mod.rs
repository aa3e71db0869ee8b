//! Tarn 词法分析
//!
//! 把源码切成带字节偏移的 token：
//! - `( ) ; [ ]` 总是单字符 token
//! - 引号字面量、`{...}` 花括号块整体作为一个 token，保留定界符
//! - 注释 (`//`, `/* */`) 和空白被丢弃

pub mod lexer;
pub mod token;

pub use lexer::{split_lines, Lexer};
pub use token::Token;
