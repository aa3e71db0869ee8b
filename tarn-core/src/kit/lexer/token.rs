//! Token 定义

use std::fmt;

use crate::core::error::line_col;

/// 带位置的 token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// 源码字节偏移
    pub pos: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, pos: usize) -> Self {
        Token {
            text: text.into(),
            pos,
        }
    }

    /// 按需计算 1 起始的行列号
    pub fn line_col(&self, src: &str) -> (usize, usize) {
        line_col(src, self.pos)
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    /// 引号字面量
    pub fn is_quoted(&self) -> bool {
        self.text.starts_with('\'') || self.text.starts_with('"')
    }

    /// `{...}` 花括号块
    pub fn is_brace(&self) -> bool {
        self.text.starts_with('{')
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
