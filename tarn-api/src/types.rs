//! API 类型定义
//!
//! 编译和执行的输出类型。

use tarn_core::Value;

/// 编译输出
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// 新编译出的操作序列，每条一行
    pub ops: Vec<String>,
}

/// 执行输出
#[derive(Debug, Clone)]
pub struct ExecuteOutput {
    /// 执行结束时的值栈（栈底在前）
    pub stack: Vec<Value>,
    /// `dump_ops` 打开时的操作序列
    pub ops: Option<Vec<String>>,
}

impl ExecuteOutput {
    /// 栈顶的值
    pub fn value(&self) -> Option<&Value> {
        self.stack.last()
    }
}
