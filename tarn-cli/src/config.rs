//! CLI 配置
//!
//! 包含 CLI 特有的配置：项目文件 (`tarn.json`) 读取、日志级别的组合

use std::path::{Path, PathBuf};

use tarn_config::{LogLevel, Phase, ProjectConfig};
use tarn_log::Level;

use crate::CliError;

/// 默认项目文件名
pub const PROJECT_FILE: &str = "tarn.json";

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    pub lexer: Option<Level>,
    pub compiler: Option<Level>,
    pub vm: Option<Level>,
    pub thread: Option<Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::Warn,
            lexer: None,
            compiler: None,
            vm: None,
            thread: None,
        }
    }
}

impl LogConfig {
    /// Get log level for a specific target
    pub fn level_for(&self, target: &str) -> Level {
        let phase = Phase::all().into_iter().find(|p| p.target() == target);
        match phase {
            Some(Phase::Lexer) => self.lexer.unwrap_or(self.global),
            Some(Phase::Compiler) => self.compiler.unwrap_or(self.global),
            Some(Phase::Vm) => self.vm.unwrap_or(self.global),
            Some(Phase::Thread) => self.thread.unwrap_or(self.global),
            None => self.global,
        }
    }

    /// 应用 `phase=level` 形式的覆盖，例如 `vm=trace`
    pub fn apply_override(&mut self, directive: &str) -> Result<(), CliError> {
        let (phase, level) = directive
            .split_once('=')
            .ok_or_else(|| CliError::Config(format!("expected PHASE=LEVEL, got '{directive}'")))?;
        let level: Level = level
            .parse()
            .map_err(|e: tarn_log::Error| CliError::Config(e.to_string()))?;
        let slot = match phase {
            "lexer" => &mut self.lexer,
            "compiler" => &mut self.compiler,
            "vm" => &mut self.vm,
            "thread" => &mut self.thread,
            other => return Err(CliError::Config(format!("unknown phase '{other}'"))),
        };
        *slot = Some(level);
        Ok(())
    }
}

/// 项目配置里的级别词汇 → 日志级别
pub fn log_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::Trace,
        LogLevel::Debug => Level::Debug,
        LogLevel::Info => Level::Info,
        LogLevel::Warn => Level::Warn,
        LogLevel::Error => Level::Error,
    }
}

/// tarn-log 级别 → tracing 级别
pub fn tracing_level(level: Level) -> tracing::Level {
    match level {
        Level::Trace => tracing::Level::TRACE,
        Level::Debug => tracing::Level::DEBUG,
        Level::Info => tracing::Level::INFO,
        Level::Warn => tracing::Level::WARN,
        Level::Error => tracing::Level::ERROR,
    }
}

/// Read and parse the project file
pub fn read_project(path: &Path) -> Result<ProjectConfig, CliError> {
    if !path.exists() {
        return Err(CliError::Config(format!(
            "未找到 '{}'\n\n当前目录不是一个 Tarn 项目。\n提示: 创建 '{}' 文件并指定 'entry' 字段",
            path.display(),
            PROJECT_FILE
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let project = ProjectConfig::from_json(&content)
        .map_err(|e| CliError::Config(format!("解析 '{}' 失败: {}", path.display(), e)))?;

    if project.entry.is_empty() {
        return Err(CliError::Config(format!(
            "'{}' 中的 'entry' 字段不能为空",
            path.display()
        )));
    }

    Ok(project)
}

/// Resolve entry file path relative to the project file directory
pub fn resolve_entry(project_path: &Path, entry: &str) -> PathBuf {
    let base_dir = project_path.parent().unwrap_or(Path::new("."));
    base_dir.join(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_falls_back_to_global() {
        let mut cfg = LogConfig::default();
        cfg.vm = Some(Level::Trace);
        assert_eq!(cfg.level_for("tarn::vm"), Level::Trace);
        assert_eq!(cfg.level_for("tarn::compiler"), Level::Warn);
        assert_eq!(cfg.level_for("tarn::api"), Level::Warn);
    }

    #[test]
    fn test_apply_override() {
        let mut cfg = LogConfig::default();
        cfg.apply_override("compiler=debug").unwrap();
        assert_eq!(cfg.compiler, Some(Level::Debug));
        assert!(matches!(cfg.apply_override("vm"), Err(CliError::Config(_))));
        assert!(matches!(cfg.apply_override("parser=info"), Err(CliError::Config(_))));
        assert!(matches!(cfg.apply_override("vm=loud"), Err(CliError::Config(_))));
    }

    #[test]
    fn test_read_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_FILE);
        std::fs::write(&path, r#"{"entry": "main.tarn", "log_level": "debug", "dump_ops": true}"#)
            .unwrap();
        let project = read_project(&path).unwrap();
        assert_eq!(project.entry, "main.tarn");
        assert_eq!(project.log_level.map(log_level), Some(Level::Debug));
        assert!(project.dump_ops);
        assert_eq!(resolve_entry(&path, &project.entry), dir.path().join("main.tarn"));
    }

    #[test]
    fn test_read_project_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(PROJECT_FILE);
        assert!(matches!(read_project(&missing), Err(CliError::Config(_))));

        std::fs::write(&missing, r#"{"entry": ""}"#).unwrap();
        assert!(matches!(read_project(&missing), Err(CliError::Config(_))));

        std::fs::write(&missing, "not json").unwrap();
        assert!(matches!(read_project(&missing), Err(CliError::Config(_))));
    }
}
