//! Engine Configuration
//!
//! Settings are installed per thread. `EngineConfig::install` pushes a
//! configuration and returns a guard that restores the previous one when
//! dropped, so tests and embedders can scope settings to a block:
//!
//! ```rust
//! use ripple_core::EngineConfig;
//!
//! let _guard = EngineConfig::new().with_validation(true).install();
//! assert!(EngineConfig::current().validate_consistency);
//! ```

use std::cell::RefCell;

/// Default bound on nested dispatches within one propagation pass.
pub const DEFAULT_MAX_PROPAGATION_DEPTH: usize = 1024;

thread_local! {
    static CONFIG_STACK: RefCell<Vec<EngineConfig>> = const { RefCell::new(Vec::new()) };
}

/// Runtime settings for the engine on the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// After every incremental update, compare the maintained value with a
    /// from-scratch evaluation and fail with a consistency violation if they
    /// differ. Expensive; on by default only with the `validation` feature.
    pub validate_consistency: bool,

    /// Maximum nesting of dispatches before propagation is aborted.
    pub max_propagation_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_consistency: cfg!(feature = "validation"),
            max_propagation_depth: DEFAULT_MAX_PROPAGATION_DEPTH,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_consistency = enabled;
        self
    }

    pub fn with_max_propagation_depth(mut self, depth: usize) -> Self {
        self.max_propagation_depth = depth.max(1);
        self
    }

    /// The configuration in effect on this thread.
    pub fn current() -> Self {
        CONFIG_STACK.with(|stack| stack.borrow().last().copied().unwrap_or_default())
    }

    /// Make this configuration current until the guard is dropped.
    #[must_use = "the configuration is uninstalled when the guard is dropped"]
    pub fn install(self) -> ConfigGuard {
        CONFIG_STACK.with(|stack| stack.borrow_mut().push(self));
        ConfigGuard { config: self }
    }
}

/// Guard that uninstalls a configuration when dropped.
pub struct ConfigGuard {
    config: EngineConfig,
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        CONFIG_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.config),
                "EngineConfig guards dropped out of order"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_applies_without_install() {
        let config = EngineConfig::current();
        assert_eq!(config.max_propagation_depth, DEFAULT_MAX_PROPAGATION_DEPTH);
    }

    #[test]
    fn nested_installs_restore_previous() {
        {
            let _outer = EngineConfig::new().with_max_propagation_depth(8).install();
            assert_eq!(EngineConfig::current().max_propagation_depth, 8);

            {
                let _inner = EngineConfig::new()
                    .with_max_propagation_depth(2)
                    .with_validation(true)
                    .install();
                assert_eq!(EngineConfig::current().max_propagation_depth, 2);
                assert!(EngineConfig::current().validate_consistency);
            }

            assert_eq!(EngineConfig::current().max_propagation_depth, 8);
        }
        assert_eq!(
            EngineConfig::current().max_propagation_depth,
            DEFAULT_MAX_PROPAGATION_DEPTH
        );
    }

    #[test]
    fn depth_is_at_least_one() {
        let config = EngineConfig::new().with_max_propagation_depth(0);
        assert_eq!(config.max_propagation_depth, 1);
    }
}
