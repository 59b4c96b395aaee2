use crate::traits::{McmcCallback, MetropolisHastingsTarget};
use log::debug;
use rand::{Rng, RngCore};

/// Counters exposed to callbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McmcCounters {
    /// Number of completed steps (over all sweeps)
    pub num_steps: usize,
    /// Number of completed sweeps
    pub num_sweeps: usize,
    /// Number of accepted moves
    pub num_accepted: usize,
    /// Log acceptance `Δ` of the most recent trial
    pub last_log_acceptance: f64,
    /// Whether the most recent trial was accepted
    pub last_accepted: bool,
}

impl McmcCounters {
    /// Fraction of accepted trials so far.
    pub fn acceptance_rate(&self) -> f64 {
        if self.num_steps == 0 {
            0.0
        } else {
            self.num_accepted as f64 / self.num_steps as f64
        }
    }
}

/// Generic Metropolis-Hastings driver.
///
/// One logical chain; `step` runs a single trial and `sweep` a fixed-size
/// batch of trials. The sweep counter only moves once every step of the
/// sweep has completed.
pub struct MetropolisHastings<T: MetropolisHastingsTarget> {
    target: T,
    callbacks: Vec<Box<dyn McmcCallback<T>>>,
    counters: McmcCounters,
}

impl<T: MetropolisHastingsTarget> MetropolisHastings<T> {
    /// Driver with zeroed counters and no callbacks.
    pub fn new(target: T) -> Self {
        MetropolisHastings {
            target,
            callbacks: Vec::new(),
            counters: McmcCounters::default(),
        }
    }

    /// Register a callback; callbacks run in insertion order.
    pub fn insert_callback(&mut self, callback: Box<dyn McmcCallback<T>>) {
        self.callbacks.push(callback);
    }

    /// The sampled target.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the target.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Give back the target.
    pub fn into_target(self) -> T {
        self.target
    }

    /// Step and acceptance counters.
    pub fn counters(&self) -> &McmcCounters {
        &self.counters
    }

    /// Reset counters and every callback.
    pub fn clear(&mut self) {
        self.counters = McmcCounters::default();
        for cb in self.callbacks.iter_mut() {
            cb.clear();
        }
    }

    /// Run a single Metropolis-Hastings trial without invoking callbacks.
    ///
    /// Always consumes exactly one uniform draw for the acceptance test.
    /// Returns whether the move was accepted.
    pub fn metropolis_hastings_trial(&mut self, rng: &mut dyn RngCore) -> Result<bool, T::Error> {
        let mv = self.target.propose_move(rng)?;
        let log_joint_ratio = self.target.log_joint_ratio(&mv)?;
        let log_proposal_ratio = self.target.log_proposal_prob_ratio(&mv);
        let delta = log_joint_ratio + log_proposal_ratio;

        let u: f64 = rng.random();
        // NaN compares false and is rejected
        let accepted = u < delta.exp();

        if accepted {
            self.target.apply_move(&mv)?;
            self.counters.num_accepted += 1;
        }

        self.counters.last_log_acceptance = delta;
        self.counters.last_accepted = accepted;
        Ok(accepted)
    }

    /// `on_step_begin`, one trial, `on_step_end`, then the step counter.
    pub fn step(&mut self, rng: &mut dyn RngCore) -> Result<bool, T::Error> {
        for cb in self.callbacks.iter_mut() {
            cb.on_step_begin(&self.counters, &self.target)?;
        }

        let accepted = self.metropolis_hastings_trial(rng)?;

        for cb in self.callbacks.iter_mut() {
            cb.on_step_end(&self.counters, &self.target)?;
        }
        self.counters.num_steps += 1;
        Ok(accepted)
    }

    /// Run `burn` steps as one sweep. Returns the number of accepted moves.
    pub fn sweep(&mut self, burn: usize, rng: &mut dyn RngCore) -> Result<usize, T::Error> {
        for cb in self.callbacks.iter_mut() {
            cb.on_sweep_begin(&self.counters, &self.target)?;
        }

        let mut num_accepted = 0;
        for _ in 0..burn {
            if self.step(rng)? {
                num_accepted += 1;
            }
        }

        for cb in self.callbacks.iter_mut() {
            cb.on_sweep_end(&self.counters, &self.target)?;
        }
        self.counters.num_sweeps += 1;

        debug!(
            "sweep {}: accepted {}/{}",
            self.counters.num_sweeps, num_accepted, burn
        );
        Ok(num_accepted)
    }

    /// `on_begin`, `num_sweeps` sweeps of `burn` steps each, `on_end`.
    pub fn run(
        &mut self,
        num_sweeps: usize,
        burn: usize,
        rng: &mut dyn RngCore,
    ) -> Result<usize, T::Error> {
        for cb in self.callbacks.iter_mut() {
            cb.on_begin(&self.counters, &self.target)?;
        }

        let mut num_accepted = 0;
        for _ in 0..num_sweeps {
            num_accepted += self.sweep(burn, rng)?;
        }

        for cb in self.callbacks.iter_mut() {
            cb.on_end(&self.counters, &self.target)?;
        }
        Ok(num_accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, thiserror::Error)]
    #[error("toy error")]
    struct ToyError;

    /// Random walk on `0..n` with a fixed target distribution `weights`.
    struct RingWalk {
        weights: Vec<f64>,
        position: usize,
    }

    impl MetropolisHastingsTarget for RingWalk {
        type Move = usize;
        type Error = ToyError;

        fn propose_move(&mut self, rng: &mut dyn RngCore) -> Result<usize, ToyError> {
            let n = self.weights.len();
            if rng.random::<bool>() {
                Ok((self.position + 1) % n)
            } else {
                Ok((self.position + n - 1) % n)
            }
        }

        fn log_joint_ratio(&self, mv: &usize) -> Result<f64, ToyError> {
            Ok(self.weights[*mv].ln() - self.weights[self.position].ln())
        }

        fn log_proposal_prob_ratio(&self, _mv: &usize) -> f64 {
            0.0
        }

        fn apply_move(&mut self, mv: &usize) -> Result<(), ToyError> {
            self.position = *mv;
            Ok(())
        }
    }

    struct VisitCounter {
        visits: Rc<RefCell<Vec<usize>>>,
    }

    impl McmcCallback<RingWalk> for VisitCounter {
        fn on_step_end(&mut self, _c: &McmcCounters, target: &RingWalk) -> Result<(), ToyError> {
            self.visits.borrow_mut()[target.position] += 1;
            Ok(())
        }
    }

    struct SweepOrder {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl McmcCallback<RingWalk> for SweepOrder {
        fn on_begin(&mut self, _c: &McmcCounters, _t: &RingWalk) -> Result<(), ToyError> {
            self.log.borrow_mut().push("begin");
            Ok(())
        }
        fn on_sweep_begin(&mut self, _c: &McmcCounters, _t: &RingWalk) -> Result<(), ToyError> {
            self.log.borrow_mut().push("sweep_begin");
            Ok(())
        }
        fn on_sweep_end(&mut self, _c: &McmcCounters, _t: &RingWalk) -> Result<(), ToyError> {
            self.log.borrow_mut().push("sweep_end");
            Ok(())
        }
        fn on_end(&mut self, _c: &McmcCounters, _t: &RingWalk) -> Result<(), ToyError> {
            self.log.borrow_mut().push("end");
            Ok(())
        }
    }

    #[test]
    fn test_stationary_distribution() {
        let weights = vec![1.0, 2.0, 3.0, 4.0];
        let total: f64 = weights.iter().sum();
        let walk = RingWalk {
            weights: weights.clone(),
            position: 0,
        };
        let visits = Rc::new(RefCell::new(vec![0usize; 4]));
        let mut mh = MetropolisHastings::new(walk);
        mh.insert_callback(Box::new(VisitCounter {
            visits: visits.clone(),
        }));

        let mut rng = SmallRng::seed_from_u64(7);
        mh.run(2_000, 100, &mut rng).unwrap();

        let visits = visits.borrow();
        let n: usize = visits.iter().sum();
        assert_eq!(n, 200_000);
        for (i, &w) in weights.iter().enumerate() {
            let freq = visits[i] as f64 / n as f64;
            assert_abs_diff_eq!(freq, w / total, epsilon = 0.01);
        }
        assert!(mh.target().position < 4);
    }

    #[test]
    fn test_counters_and_callback_order() {
        let walk = RingWalk {
            weights: vec![1.0; 3],
            position: 0,
        };
        let log = Rc::new(RefCell::new(vec![]));
        let mut mh = MetropolisHastings::new(walk);
        mh.insert_callback(Box::new(SweepOrder { log: log.clone() }));

        let mut rng = SmallRng::seed_from_u64(1);
        let accepted = mh.run(2, 5, &mut rng).unwrap();

        // uniform target: every move is accepted
        assert_eq!(accepted, 10);
        assert_eq!(mh.counters().num_steps, 10);
        assert_eq!(mh.counters().num_sweeps, 2);
        assert_abs_diff_eq!(mh.counters().acceptance_rate(), 1.0);
        assert_eq!(
            *log.borrow(),
            vec![
                "begin",
                "sweep_begin",
                "sweep_end",
                "sweep_begin",
                "sweep_end",
                "end"
            ]
        );

        mh.clear();
        assert_eq!(mh.counters(), &McmcCounters::default());
    }
}
