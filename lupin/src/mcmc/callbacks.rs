use crate::error::LupinError;
use crate::mcmc::InferenceTarget;
use log::info;
use mcmc_util::{McmcCallback, McmcCounters};

/// Verify every derived state against the graph every `every` sweeps.
#[derive(Debug, Clone)]
pub struct ConsistencyCheck {
    every: usize,
}

impl ConsistencyCheck {
    /// Check every `every` sweeps; `0` is read as `1`.
    pub fn new(every: usize) -> Self {
        ConsistencyCheck {
            every: every.max(1),
        }
    }
}

impl<T: InferenceTarget> McmcCallback<T> for ConsistencyCheck {
    fn on_begin(&mut self, _counters: &McmcCounters, target: &T) -> Result<(), LupinError> {
        target.check_safety()?;
        target.check_self_consistency()
    }

    fn on_sweep_end(&mut self, counters: &McmcCounters, target: &T) -> Result<(), LupinError> {
        if (counters.num_sweeps + 1) % self.every == 0 {
            target.check_self_consistency()?;
        }
        Ok(())
    }
}

/// Log counters and the log-joint every `every` sweeps.
#[derive(Debug, Clone)]
pub struct SweepLogger {
    every: usize,
    last_accepted: usize,
}

impl SweepLogger {
    /// Log every `every` sweeps; `0` is read as `1`.
    pub fn new(every: usize) -> Self {
        SweepLogger {
            every: every.max(1),
            last_accepted: 0,
        }
    }
}

impl<T: InferenceTarget> McmcCallback<T> for SweepLogger {
    fn on_sweep_end(&mut self, counters: &McmcCounters, target: &T) -> Result<(), LupinError> {
        let sweep = counters.num_sweeps + 1;
        if sweep % self.every == 0 {
            info!(
                "sweep {}: log-joint {:.4}, {} accepted since last report, acceptance rate {:.3}, {} blocks",
                sweep,
                target.log_joint(),
                counters.num_accepted - self.last_accepted,
                counters.acceptance_rate(),
                target.labels().iter().max().map(|&b| b + 1).unwrap_or(0)
            );
            self.last_accepted = counters.num_accepted;
        }
        Ok(())
    }

    fn on_end(&mut self, counters: &McmcCounters, target: &T) -> Result<(), LupinError> {
        info!(
            "finished {} sweeps ({} steps): log-joint {:.4}, acceptance rate {:.3}",
            counters.num_sweeps,
            counters.num_steps,
            target.log_joint(),
            counters.acceptance_rate()
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.last_accepted = 0;
    }
}
