use crate::metropolis::McmcCounters;
use crate::traits::{McmcCallback, MetropolisHastingsTarget};
use std::cell::RefCell;
use std::rc::Rc;

/// Samples collected once per sweep, with the log-joint at that sweep.
#[derive(Debug, Clone)]
pub struct McmcChain<P> {
    /// Collected samples
    pub samples: Vec<P>,
    /// Log-joint at each sample
    pub log_joints: Vec<f64>,
    /// Acceptance rate of the sweep that produced each sample
    pub acceptance_rates: Vec<f64>,
}

impl<P> Default for McmcChain<P> {
    fn default() -> Self {
        McmcChain {
            samples: vec![],
            log_joints: vec![],
            acceptance_rates: vec![],
        }
    }
}

impl<P> McmcChain<P> {
    /// Number of collected samples.
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Append one sample with its statistics.
    pub fn push(&mut self, sample: P, log_joint: f64, acceptance_rate: f64) {
        self.samples.push(sample);
        self.log_joints.push(log_joint);
        self.acceptance_rates.push(acceptance_rate);
    }

    /// Average log-joint, skipping the first `skip` samples.
    pub fn mean_log_joint(&self, skip: usize) -> Option<f64> {
        let tail = self.log_joints.get(skip..)?;
        if tail.is_empty() {
            return None;
        }
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }

    /// Index of the sample with the highest log-joint.
    pub fn argmax_log_joint(&self) -> Option<usize> {
        self.log_joints
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// Forget every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.log_joints.clear();
        self.acceptance_rates.clear();
    }
}

/// Record `sample_fn(target)` and `log_joint_fn(target)` every `every` sweeps.
///
/// The chain is shared so the caller can keep a handle after handing the
/// collector to the driver.
pub struct ChainCollector<T, P, S, L>
where
    S: Fn(&T) -> P,
    L: Fn(&T) -> f64,
{
    chain: Rc<RefCell<McmcChain<P>>>,
    sample_fn: S,
    log_joint_fn: L,
    every: usize,
    _target: std::marker::PhantomData<fn(&T)>,
}

impl<T, P, S, L> ChainCollector<T, P, S, L>
where
    S: Fn(&T) -> P,
    L: Fn(&T) -> f64,
{
    /// Collect `sample_fn` and `log_joint_fn` every `every` sweeps.
    pub fn new(sample_fn: S, log_joint_fn: L, every: usize) -> Self {
        ChainCollector {
            chain: Rc::new(RefCell::new(McmcChain::default())),
            sample_fn,
            log_joint_fn,
            every: every.max(1),
            _target: std::marker::PhantomData,
        }
    }

    /// Shared handle to the collected chain.
    pub fn chain(&self) -> Rc<RefCell<McmcChain<P>>> {
        self.chain.clone()
    }
}

impl<T, P, S, L> McmcCallback<T> for ChainCollector<T, P, S, L>
where
    T: MetropolisHastingsTarget,
    S: Fn(&T) -> P,
    L: Fn(&T) -> f64,
{
    fn on_sweep_end(&mut self, counters: &McmcCounters, target: &T) -> Result<(), T::Error> {
        // the driver bumps the sweep counter after this hook
        if (counters.num_sweeps + 1) % self.every == 0 {
            self.chain.borrow_mut().push(
                (self.sample_fn)(target),
                (self.log_joint_fn)(target),
                counters.acceptance_rate(),
            );
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.chain.borrow_mut().clear();
    }
}
