//! Scheduler configuration.

use serde::Deserialize;

/// Task given to a convergence node that defines no instruction of its own.
pub const DEFAULT_SYNTHESIS_INSTRUCTION: &str = "Synthesize the results";

fn default_synthesis_instruction() -> String {
    DEFAULT_SYNTHESIS_INSTRUCTION.to_owned()
}

/// Tuning knobs for the scheduler.
///
/// Deserializable so a surrounding service can embed it in its own config
/// file; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Task text for convergence nodes without a fixed `task`.
    #[serde(default = "default_synthesis_instruction")]
    pub synthesis_instruction: String,
    /// Cap on simultaneous agent calls within one run. `None` is unbounded.
    #[serde(default)]
    pub max_concurrent_nodes: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            synthesis_instruction: default_synthesis_instruction(),
            max_concurrent_nodes: None,
        }
    }
}
