//! 测试辅助工具
//!
//! 提供端到端测试的辅助函数

#![allow(dead_code)]

use tarn_core::{Engine, TarnError, Value};

/// 在新引擎上执行代码，返回剩余的值栈
///
/// # Example
/// ```ignore
/// let stack = run_code("1 2 +").unwrap();
/// assert_eq!(top_int(&stack), Some(3));
/// ```
pub fn run_code(code: &str) -> Result<Vec<Value>, TarnError> {
    let mut engine = Engine::new();
    engine.eval(code)?;
    Ok(engine.stack().to_vec())
}

/// 栈顶整数
pub fn top_int(stack: &[Value]) -> Option<i64> {
    stack.last().and_then(Value::as_i64)
}

/// 栈顶字符串
pub fn top_str(stack: &[Value]) -> Option<String> {
    stack.last().and_then(|v| v.as_str().map(str::to_string))
}

pub fn top_bool(stack: &[Value]) -> Option<bool> {
    stack.last().and_then(Value::as_bool)
}

/// 整个值栈都是整数时取出
pub fn ints(stack: &[Value]) -> Vec<i64> {
    stack.iter().filter_map(Value::as_i64).collect()
}

/// 源码中的单引号字符串字面量（路径等）
pub fn quoted(s: &str) -> String {
    format!("'{s}'")
}
