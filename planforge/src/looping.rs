//! Multi-step helper for `planforge run`.

use anyhow::Result;
use tracing::info;

use crate::engine::{Advance, Engine};
use crate::io::generator::Generator;

/// Summary of an [`execute_all`] invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps attempted, including a final failed one.
    pub steps_executed: u32,
    /// The advance that ended the run.
    pub stop: Advance,
}

/// Advance `name` until the plan completes or an advance does not succeed.
///
/// `on_advance` observes every outcome, including the one that stops the run.
pub fn execute_all<G: Generator, F: FnMut(&Advance)>(
    engine: &Engine<'_, G>,
    name: &str,
    mut on_advance: F,
) -> Result<RunSummary> {
    let mut steps_executed = 0u32;
    loop {
        let advance = engine.advance(name)?;
        on_advance(&advance);
        if let Advance::Step(_) = advance {
            steps_executed += 1;
        }
        if !matches!(&advance, Advance::Step(report) if report.success) {
            let complete = matches!(advance, Advance::Completed { .. });
            info!(steps_executed, complete, "run stopped");
            return Ok(RunSummary {
                steps_executed,
                stop: advance,
            });
        }
    }
}
