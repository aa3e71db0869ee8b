//! Lexer 主入口
//!
//! # 示例
//!
//! ```rust,ignore
//! use tarn_log::LogConfig;
//! use tarn_core::kit::lexer::Lexer;
//!
//! let (logger, _) = LogConfig::dev().init();
//! let tokens = Lexer::with_logger(logger).tokenize("1 2 +")?;
//! ```

use std::sync::Arc;

use tarn_log::{debug, trace, Logger};

use super::token::Token;
use crate::core::error::{ErrorKind, Result, TarnError};

const TARGET: &str = "tarn::lexer";

/// 单字符 token
fn is_single(c: char) -> bool {
    matches!(c, '(' | ')' | ';' | '[' | ']')
}

/// 结束普通单词的字符
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || is_single(c) || c == '{' || c == '}'
}

pub struct Lexer {
    logger: Arc<Logger>,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    /// 使用 noop logger
    pub fn new() -> Self {
        Self::with_logger(Logger::noop())
    }

    pub fn with_logger(logger: Arc<Logger>) -> Self {
        Lexer { logger }
    }

    pub fn tokenize(&self, src: &str) -> Result<Vec<Token>> {
        self.tokenize_at(src, 0)
    }

    /// `offset` 是 `src` 在原始源码中的起始字节偏移（花括号块递归编译时使用）
    pub fn tokenize_at(&self, src: &str, offset: usize) -> Result<Vec<Token>> {
        trace!(target: TARGET, self.logger, "tokenizing {} bytes at offset {}", src.len(), offset);
        let chars: Vec<(usize, char)> = src.char_indices().collect();
        let end_of = |i: usize| chars.get(i).map(|(b, _)| *b).unwrap_or(src.len());
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let (start, c) = chars[i];
            let next = chars.get(i + 1).map(|(_, c)| *c);

            if c.is_whitespace() {
                i += 1;
                continue;
            }

            // 行注释
            if c == '/' && next == Some('/') {
                while i < chars.len() && chars[i].1 != '\n' {
                    i += 1;
                }
                continue;
            }

            // 块注释；未闭合时吞掉剩余输入
            if c == '/' && next == Some('*') {
                i += 2;
                while i < chars.len() && !(chars[i].1 == '*' && chars.get(i + 1).map(|p| p.1) == Some('/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                continue;
            }

            if is_single(c) {
                tokens.push(Token::new(c.to_string(), offset + start));
                i += 1;
                continue;
            }

            if c == '\'' || c == '"' {
                let close = skip_string(&chars, i).ok_or_else(|| {
                    TarnError::new(ErrorKind::UnterminatedString, "unterminated string literal")
                        .at(offset + start)
                })?;
                tokens.push(Token::new(&src[start..end_of(close + 1)], offset + start));
                i = close + 1;
                continue;
            }

            if c == '{' {
                let close = skip_braces(&chars, i).ok_or_else(|| {
                    TarnError::new(ErrorKind::UnbalancedBraces, "unclosed '{'").at(offset + start)
                })?;
                tokens.push(Token::new(&src[start..end_of(close + 1)], offset + start));
                i = close + 1;
                continue;
            }

            if c == '}' {
                return Err(
                    TarnError::new(ErrorKind::UnbalancedBraces, "unmatched '}'").at(offset + start)
                );
            }

            // 普通单词；反斜杠连同下一个字符一起收入
            let mut j = i;
            while j < chars.len() {
                let ch = chars[j].1;
                if ch == '\\' {
                    j += 2;
                    continue;
                }
                if is_delimiter(ch) {
                    break;
                }
                j += 1;
            }
            let j = j.min(chars.len());
            tokens.push(Token::new(&src[start..end_of(j)], offset + start));
            i = j;
        }

        debug!(target: TARGET, self.logger, "produced {} tokens", tokens.len());
        Ok(tokens)
    }
}

/// 返回闭合引号的下标
fn skip_string(chars: &[(usize, char)], open: usize) -> Option<usize> {
    let quote = chars[open].1;
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i].1 {
            '\\' => i += 2,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// 返回配对 `}` 的下标，跳过内部的字符串字面量
fn skip_braces(chars: &[(usize, char)], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i].1 {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            '\\' => i += 1,
            '\'' | '"' if starts_token(chars, i) => i = skip_string(chars, i)?,
            _ => {}
        }
        i += 1;
    }
    None
}

/// 引号只在 token 开头才开启字符串（`it's` 这样的单词不算）
fn starts_token(chars: &[(usize, char)], i: usize) -> bool {
    i == 0 || {
        let prev = chars[i - 1].1;
        prev.is_whitespace() || is_single(prev) || prev == '{' || prev == '}'
    }
}

/// 按空行把输入分组（REPL 增量输入）
pub fn split_lines(input: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    for line in input.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        Lexer::new()
            .tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(texts("1 2 +"), vec!["1", "2", "+"]);
        assert_eq!(texts("(1 2);[3]"), vec!["(", "1", "2", ")", ";", "[", "3", "]"]);
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(texts("1 // two\n3 /* four */ 5"), vec!["1", "3", "5"]);
    }

    #[test]
    fn test_strings_keep_quotes() {
        assert_eq!(texts("'a b' \"c\""), vec!["'a b'", "\"c\""]);
        assert_eq!(texts(r"'it\'s'"), vec![r"'it\'s'"]);
    }

    #[test]
    fn test_brace_span_is_one_token() {
        assert_eq!(texts("{1 {2} '}'} call"), vec!["{1 {2} '}'}", "call"]);
    }

    #[test]
    fn test_positions() {
        let toks = Lexer::new().tokenize("ab\n  cd").unwrap();
        assert_eq!(toks[1].pos, 5);
        assert_eq!(toks[1].line_col("ab\n  cd"), (2, 3));
        let inner = Lexer::new().tokenize_at("x", 10).unwrap();
        assert_eq!(inner[0].pos, 10);
    }

    #[test]
    fn test_char_literals() {
        assert_eq!(texts(r"\( \; x"), vec![r"\(", r"\;", "x"]);
    }

    #[test]
    fn test_unbalanced_braces() {
        let err = Lexer::new().tokenize("{1 2").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnbalancedBraces);
        assert_eq!(err.pos, Some(0));
        let err = Lexer::new().tokenize("1 }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnbalancedBraces);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new().tokenize("1 'abc").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedString);
        assert_eq!(err.pos, Some(2));
    }

    #[test]
    fn test_split_lines() {
        let groups = split_lines("1 2\n+\n\n  \n3\n");
        assert_eq!(groups, vec!["1 2\n+".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_lexer_logs() {
        use tarn_log::{Level, LogRingBuffer};

        let ring = LogRingBuffer::new(16);
        let logger = Logger::new(Level::Debug).with_sink(ring.clone());
        Lexer::with_logger(logger).tokenize("1 2").unwrap();
        assert!(ring
            .dump_records()
            .iter()
            .any(|r| r.target == "tarn::lexer" && r.message.contains("2 tokens")));
    }
}
