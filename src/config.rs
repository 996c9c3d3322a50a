use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource bounds for one search.
///
/// Limits are checked every `check_interval` nodes, so a search may slightly
/// overrun its time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Wall-clock limit in milliseconds (`None` = unlimited).
    pub time_limit_ms: Option<u64>,
    /// Maximum number of search nodes (`None` = unlimited).
    pub node_limit: Option<u64>,
    pub check_interval: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: None,
            node_limit: None,
            check_interval: 1024,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_ms = Some(limit.as_millis() as u64);
        self
    }

    pub fn with_node_limit(mut self, nodes: u64) -> Self {
        self.node_limit = Some(nodes);
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    /// Interval used by the search loop; never zero.
    pub fn effective_check_interval(&self) -> u64 {
        self.check_interval.max(1)
    }
}
