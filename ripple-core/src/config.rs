//! Runtime configuration.

/// Default number of times a single effect may run during one flush.
pub const DEFAULT_RERUN_LIMIT: usize = 100;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// The thread-local default runtime is built from `RuntimeConfig::default()`.
/// Use [`Runtime::with_config`](crate::reactive::Runtime::with_config) for
/// anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum runs of one effect inside a single flush.
    ///
    /// Effects that write signals read by other effects can form a loop that
    /// never settles. When any effect exceeds this count the flush is aborted
    /// and the remaining queue is dropped.
    pub rerun_limit: usize,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rerun_limit(mut self, limit: usize) -> Self {
        self.rerun_limit = limit;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rerun_limit: DEFAULT_RERUN_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_rerun_limit_constant() {
        assert_eq!(RuntimeConfig::default().rerun_limit, DEFAULT_RERUN_LIMIT);
    }

    #[test]
    fn builder_overrides_limit() {
        let config = RuntimeConfig::new().with_rerun_limit(5);
        assert_eq!(config.rerun_limit, 5);
    }
}
