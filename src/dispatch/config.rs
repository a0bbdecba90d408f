/// How the actions of one dispatch call are scheduled relative to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Synchronous actions commit inline in list order; each deferred action
    /// resolves on its own task, in no particular order.
    #[default]
    Concurrent,
    /// Every action, deferred or not, commits before the next one starts.
    Sequential,
}

/// Configuration carried by a container and every dispatch handle it hands out.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Scheduling policy for multi-action dispatch calls.
    pub mode: DispatchMode,
}

impl DispatchConfig {
    /// Configuration with sequential scheduling.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            mode: DispatchMode::Sequential,
        }
    }

    /// Set the scheduling policy.
    #[must_use]
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }
}
