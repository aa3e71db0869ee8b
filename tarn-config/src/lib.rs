//! Tarn Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Tarn crates.

use serde::Deserialize;

/// Configuration for compiler behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Upper bound for refresh/rewrite rounds before the pipeline gives up
    pub max_passes: usize,
    /// Whether peephole folding (push merge, drop absorption, check absorption) runs
    pub fold_constants: bool,
}

/// Configuration for execution limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum values on a single value stack
    pub max_stack_size: usize,
    /// Maximum nested scopes per thread
    pub max_scope_depth: usize,
    /// Maximum descriptors in one round-robin poll set
    pub poll_set_size: usize,
    /// First sleep of the empty-poll backoff
    pub backoff_min_ms: u64,
    /// Sleep ceiling of the empty-poll backoff
    pub backoff_max_ms: u64,
}

/// Log level vocabulary shared by the CLI and project files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Project file (`tarn.json`)
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Entry source file, relative to the project file
    pub entry: String,
    /// Global log level
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    /// Compile without running
    #[serde(default)]
    pub compile_only: bool,
    /// Echo the source before running
    #[serde(default)]
    pub show_source: bool,
    /// Print the compiled operation sequence
    #[serde(default)]
    pub dump_ops: bool,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub limits: LimitConfig,
}

impl ProjectConfig {
    /// Parse a project file from JSON text
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Execution phase enum for phase-specific configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Compiler,
    Vm,
    Thread,
}

impl Phase {
    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lexer => "lexer",
            Phase::Compiler => "compiler",
            Phase::Vm => "vm",
            Phase::Thread => "thread",
        }
    }

    /// Get the log target name for this phase
    pub fn target(&self) -> &'static str {
        match self {
            Phase::Lexer => "tarn::lexer",
            Phase::Compiler => "tarn::compiler",
            Phase::Vm => "tarn::vm",
            Phase::Thread => "tarn::thread",
        }
    }

    /// All phases, in pipeline order
    pub fn all() -> [Phase; 4] {
        [Phase::Lexer, Phase::Compiler, Phase::Vm, Phase::Thread]
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_passes: 64,
            fold_constants: true,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 1 << 16,
            max_scope_depth: 1024,
            poll_set_size: 64,
            backoff_min_ms: 1,
            backoff_max_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_compiler_config() {
        let cfg = CompilerConfig::default();
        assert_eq!(cfg.max_passes, 64);
        assert!(cfg.fold_constants);
    }

    #[test]
    fn test_default_limit_config() {
        let cfg = LimitConfig::default();
        assert_eq!(cfg.max_scope_depth, 1024);
        assert!(cfg.backoff_min_ms <= cfg.backoff_max_ms);
    }

    #[test]
    fn test_phase_target() {
        assert_eq!(Phase::Lexer.as_str(), "lexer");
        assert_eq!(Phase::Vm.target(), "tarn::vm");
        assert_eq!(Phase::all().len(), 4);
    }

    #[test]
    fn test_project_config_from_json() {
        let cfg = ProjectConfig::from_json(
            r#"{ "entry": "main.tarn", "log_level": "debug", "limits": { "max_scope_depth": 8 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.entry, "main.tarn");
        assert_eq!(cfg.log_level, Some(LogLevel::Debug));
        assert_eq!(cfg.limits.max_scope_depth, 8);
        assert_eq!(cfg.limits.poll_set_size, 64);
        assert!(!cfg.compile_only);
    }

    #[test]
    fn test_project_config_requires_entry() {
        assert!(ProjectConfig::from_json("{}").is_err());
    }
}
