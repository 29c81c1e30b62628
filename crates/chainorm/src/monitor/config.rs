use std::time::Duration;

/// Settings for an [`InstrumentedConnection`](super::InstrumentedConnection).
///
/// Monitors only hear about statements once [`MonitorConfig::enable_monitoring`] is set.
/// Hooks and the timeout apply regardless.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Fail a statement with [`OrmError::Timeout`](crate::OrmError::Timeout) after this long.
    pub timeout: Option<Duration>,
    /// Report statements slower than this through `on_slow_query`.
    pub slow_after: Option<Duration>,
    pub enabled: bool,
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    pub fn with_slow_query_threshold(self, threshold: Duration) -> Self {
        Self {
            slow_after: Some(threshold),
            ..self
        }
    }

    pub fn enable_monitoring(self) -> Self {
        Self {
            enabled: true,
            ..self
        }
    }

    pub fn disable_monitoring(self) -> Self {
        Self {
            enabled: false,
            ..self
        }
    }

    pub(crate) fn is_slow(&self, duration: Duration) -> bool {
        self.slow_after.is_some_and(|threshold| duration > threshold)
    }
}
