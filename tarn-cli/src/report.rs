//! CLI 格式化输出
//!
//! 提供命令行友好的错误显示和源码上下文打印。

use std::fmt::Write;

use tarn_api::ApiError;

/// 错误行前后显示的上下文行数
const CONTEXT_LINES: usize = 5;

/// 打印错误并显示源代码上下文
pub fn print_error_with_source(e: &ApiError, source: &str) {
    eprintln!("error: {}", e.to_report());
    if let (Some(line), Some(col)) = (e.line(), e.column()) {
        eprint!("{}", source_context(source, line, col));
    }
}

/// 渲染源代码上下文（错误行前后几行，错误列下加 `^`）
pub fn source_context(source: &str, error_line: usize, error_col: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let total_lines = lines.len();
    let mut out = String::new();

    if error_line == 0 || error_line > total_lines {
        return out;
    }

    let start_line = error_line.saturating_sub(CONTEXT_LINES).max(1);
    let end_line = (error_line + CONTEXT_LINES).min(total_lines);
    // 行号宽度，用于对齐
    let width = end_line.to_string().len();
    let separator = "-".repeat(width + 1);

    let _ = writeln!(out, "{separator}|--");
    for line_idx in start_line..=end_line {
        let _ = writeln!(out, "{:>width$} | {}", line_idx, lines[line_idx - 1]);
        if line_idx == error_line {
            let marker = " ".repeat(error_col.saturating_sub(1));
            let _ = writeln!(out, "{:width$} | {marker}^", "");
        }
    }
    let _ = writeln!(out, "{separator}|--");
    out
}

/// 带行号回显源码
pub fn numbered_source(source: &str) -> String {
    let mut out = String::new();
    for (i, line) in source.lines().enumerate() {
        let _ = writeln!(out, "{:3} | {}", i + 1, line);
    }
    out
}
