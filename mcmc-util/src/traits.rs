use crate::metropolis::McmcCounters;
use rand::RngCore;

/// A state space explored by Metropolis-Hastings.
///
/// The driver only ever talks to the target through these four calls:
/// propose a move, ask for the two log-ratios, and apply the move on
/// acceptance. Rejected moves are dropped without touching the target.
pub trait MetropolisHastingsTarget {
    /// Move type proposed and applied by the target
    type Move;
    /// Error type raised by the target
    type Error;

    /// Draw a candidate move from the current state.
    fn propose_move(&mut self, rng: &mut dyn RngCore) -> Result<Self::Move, Self::Error>;

    /// `log π(new) - log π(old)` for the candidate, without mutating anything.
    fn log_joint_ratio(&self, mv: &Self::Move) -> Result<f64, Self::Error>;

    /// Hastings term `log q(old|new) - log q(new|old)`.
    fn log_proposal_prob_ratio(&self, mv: &Self::Move) -> f64;

    /// Commit an accepted move to the target and its proposers.
    fn apply_move(&mut self, mv: &Self::Move) -> Result<(), Self::Error>;
}

/// Extension points invoked by the driver.
///
/// Callbacks may read counters and the target but never take part in the
/// accept/reject decision.
pub trait McmcCallback<T: MetropolisHastingsTarget> {
    /// Before the first sweep.
    fn on_begin(&mut self, _counters: &McmcCounters, _target: &T) -> Result<(), T::Error> {
        Ok(())
    }

    /// After the last sweep.
    fn on_end(&mut self, _counters: &McmcCounters, _target: &T) -> Result<(), T::Error> {
        Ok(())
    }

    /// Before each step.
    fn on_step_begin(&mut self, _counters: &McmcCounters, _target: &T) -> Result<(), T::Error> {
        Ok(())
    }

    /// After each step.
    fn on_step_end(&mut self, _counters: &McmcCounters, _target: &T) -> Result<(), T::Error> {
        Ok(())
    }

    /// Before each sweep.
    fn on_sweep_begin(&mut self, _counters: &McmcCounters, _target: &T) -> Result<(), T::Error> {
        Ok(())
    }

    /// After each sweep.
    fn on_sweep_end(&mut self, _counters: &McmcCounters, _target: &T) -> Result<(), T::Error> {
        Ok(())
    }

    /// Drop whatever the callback accumulated so far.
    fn clear(&mut self) {}
}
