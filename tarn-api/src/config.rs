//! API 层配置
//!
//! 包含执行配置 RunConfig 和全局单例（供 CLI 使用）

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tarn_config::{CompilerConfig, LimitConfig};
use tarn_core::EngineConfig;
use tarn_log::Logger;

/// Execution configuration
#[derive(Clone)]
pub struct RunConfig {
    /// Whether to render the compiled operation sequence
    pub dump_ops: bool,
    /// Compiler configuration
    pub compiler: CompilerConfig,
    /// Execution limits
    pub limits: LimitConfig,
    /// Logger
    pub logger: Arc<Logger>,
}

impl RunConfig {
    /// 引擎需要的那部分配置
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            compiler: self.compiler.clone(),
            limits: self.limits.clone(),
        }
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("dump_ops", &self.dump_ops)
            .field("compiler", &self.compiler)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dump_ops: false,
            compiler: CompilerConfig::default(),
            limits: LimitConfig::default(),
            logger: Logger::noop(),
        }
    }
}

// Global config singleton for CLI convenience
static GLOBAL_CONFIG: OnceCell<RunConfig> = OnceCell::new();

/// Initialize global configuration
///
/// Returns `false` when a configuration was already installed; the first one stays.
pub fn init(config: RunConfig) -> bool {
    GLOBAL_CONFIG.set(config).is_ok()
}

/// Get global config reference, if initialized
pub fn config() -> Option<&'static RunConfig> {
    GLOBAL_CONFIG.get()
}

/// Global config, installing the default on first use
pub fn config_or_default() -> &'static RunConfig {
    GLOBAL_CONFIG.get_or_init(RunConfig::default)
}

/// Check if config is initialized
pub fn is_initialized() -> bool {
    GLOBAL_CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_run_config() {
        let cfg = RunConfig::default();
        assert!(!cfg.dump_ops);
        assert!(cfg.compiler.fold_constants);
        assert_eq!(cfg.limits.max_stack_size, 1 << 16);
        assert_eq!(cfg.limits.max_scope_depth, 1024);
    }

    #[test]
    fn test_engine_config_copies_sections() {
        let mut cfg = RunConfig::default();
        cfg.compiler.max_passes = 3;
        cfg.limits.poll_set_size = 8;
        let engine = cfg.engine_config();
        assert_eq!(engine.compiler.max_passes, 3);
        assert_eq!(engine.limits.poll_set_size, 8);
    }

    #[test]
    fn test_run_config_debug() {
        let debug_str = format!("{:?}", RunConfig::default());
        assert!(debug_str.contains("dump_ops"));
        assert!(debug_str.contains("compiler"));
        assert!(debug_str.contains("limits"));
    }

    #[test]
    fn test_global_config_is_set_once() {
        let first = config_or_default().dump_ops;
        assert!(is_initialized());
        let replaced = init(RunConfig {
            dump_ops: !first,
            ..RunConfig::default()
        });
        assert!(!replaced);
        assert_eq!(config().map(|c| c.dump_ops), Some(first));
    }
}
