//! Binary-state dynamics observed on a graph.
//!
//! A [`Dynamics`] gives the probability that a vertex moves from one state
//! to another, given how many of its neighbors sit in each state. A
//! [`DynamicsLikelihood`] holds an observed trajectory and scores it
//! against a graph, updating only the affected vertices when the graph
//! changes.

/// Glauber (Ising) dynamics
pub mod glauber;
/// Susceptible-infected-susceptible dynamics
pub mod sis;

pub use glauber::GlauberDynamics;
pub use sis::SisDynamics;

use crate::error::{LupinError, Result};
use crate::graph::MultiGraph;
use crate::moves::{GraphMove, ParamMove};
use fnv::FnvHashMap;
use log::debug;
use rand::{Rng, RngCore};
use std::fmt::Debug;

/// Transition model of a binary-state process on a graph.
pub trait Dynamics: Clone + Debug {
    /// Number of vertex states.
    fn num_states(&self) -> usize {
        2
    }

    /// `P(next | prev, neighbor_counts)`, where `neighbor_counts[s]` is the
    /// number of neighbors in state `s` (counting multiplicity).
    fn transition_prob(&self, prev: usize, next: usize, neighbor_counts: &[usize]) -> f64;

    /// Names of the parameters, in vector order.
    fn parameter_names(&self) -> &'static [&'static str];

    /// Current parameter vector.
    fn parameters(&self) -> Vec<f64>;

    /// Whether `value` is admissible for parameter `index`.
    fn in_support(&self, index: usize, value: f64) -> bool;

    /// Overwrite one parameter; fails without mutating outside the support.
    fn set_parameter(&mut self, index: usize, value: f64) -> Result<()>;

    /// Length of the parameter vector.
    fn num_parameters(&self) -> usize {
        self.parameter_names().len()
    }

    /// Fail if a parameter left its domain.
    fn check_safety(&self) -> Result<()> {
        for (i, v) in self.parameters().into_iter().enumerate() {
            if !self.in_support(i, v) {
                return Err(LupinError::safety(
                    "Dynamics",
                    format!("parameter {} = {} is outside its support", self.parameter_names()[i], v),
                ));
            }
        }
        Ok(())
    }
}

/// Fails with `InvalidParameter` unless `value` is admissible.
pub(crate) fn check_parameter<D: Dynamics>(dynamics: &D, index: usize, value: f64) -> Result<()> {
    if index >= dynamics.num_parameters() {
        return Err(LupinError::InvalidParameter(format!(
            "parameter index {} out of range",
            index
        )));
    }
    if !dynamics.in_support(index, value) {
        return Err(LupinError::InvalidParameter(format!(
            "{} = {} is outside its support",
            dynamics.parameter_names()[index],
            value
        )));
    }
    Ok(())
}

/// Per-vertex state counts of the neighbors of every vertex.
fn neighbor_counts(graph: &MultiGraph, states: &[usize], num_states: usize) -> Vec<Vec<usize>> {
    (0..graph.size())
        .map(|v| {
            let mut counts = vec![0; num_states];
            for (u, m) in graph.neighbors(v) {
                counts[states[u]] += m;
            }
            counts
        })
        .collect()
}

/// Observed trajectory `x(0), ..., x(T)` scored against a graph.
#[derive(Debug, Clone)]
pub struct DynamicsLikelihood<D: Dynamics> {
    dynamics: D,
    states: Vec<Vec<usize>>,
    counts: Vec<Vec<Vec<usize>>>,
}

impl<D: Dynamics> DynamicsLikelihood<D> {
    /// `states[t][v]` for `t` in `0..=T`; every row covers the graph's vertices.
    pub fn new(dynamics: D, states: Vec<Vec<usize>>, graph: &MultiGraph) -> Result<Self> {
        dynamics.check_safety()?;
        let q = dynamics.num_states();
        for (t, row) in states.iter().enumerate() {
            if row.len() != graph.size() {
                return Err(LupinError::InvalidParameter(format!(
                    "time step {} has {} states for {} vertices",
                    t,
                    row.len(),
                    graph.size()
                )));
            }
            if let Some(&bad) = row.iter().find(|&&x| x >= q) {
                return Err(LupinError::InvalidParameter(format!(
                    "state {} at time step {} is not below {}",
                    bad, t, q
                )));
            }
        }
        let mut out = DynamicsLikelihood {
            dynamics,
            states,
            counts: vec![],
        };
        out.set_graph(graph);
        Ok(out)
    }

    /// Run the dynamics on `graph` for `num_steps` transitions.
    ///
    /// Without `initial` states, every vertex starts in a uniformly random state.
    pub fn simulate(
        dynamics: D,
        graph: &MultiGraph,
        initial: Option<Vec<usize>>,
        num_steps: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let q = dynamics.num_states();
        let n = graph.size();
        let first = initial.unwrap_or_else(|| (0..n).map(|_| rng.random_range(0..q)).collect());
        if first.len() != n {
            return Err(LupinError::InvalidParameter(format!(
                "{} initial states for {} vertices",
                first.len(),
                n
            )));
        }

        let mut states = Vec::with_capacity(num_steps + 1);
        states.push(first);
        for _ in 0..num_steps {
            let Some(prev) = states.last() else {
                break;
            };
            let counts = neighbor_counts(graph, prev, q);
            let mut next = Vec::with_capacity(n);
            for v in 0..n {
                let u: f64 = rng.random();
                let mut cum = 0.0;
                let mut chosen = q - 1;
                for s in 0..q {
                    cum += dynamics.transition_prob(prev[v], s, &counts[v]);
                    if u < cum {
                        chosen = s;
                        break;
                    }
                }
                next.push(chosen);
            }
            states.push(next);
        }
        debug!("simulated {} steps on {} vertices", num_steps, n);
        DynamicsLikelihood::new(dynamics, states, graph)
    }

    /// The transition model.
    pub fn dynamics(&self) -> &D {
        &self.dynamics
    }

    /// Observed states, one vector per time step.
    pub fn states(&self) -> &[Vec<usize>] {
        &self.states
    }

    /// Number of observed transitions `T`.
    pub fn num_steps(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    /// Neighbor state counts of `v` at time step `t`.
    pub fn neighbor_counts(&self, t: usize, v: usize) -> &[usize] {
        &self.counts[t][v]
    }

    /// Recompute every neighbor count from `graph`.
    pub fn set_graph(&mut self, graph: &MultiGraph) {
        let q = self.dynamics.num_states();
        let steps = self.num_steps();
        self.counts = self.states[..steps]
            .iter()
            .map(|row| neighbor_counts(graph, row, q))
            .collect();
    }

    /// Overwrite one parameter of the transition model.
    pub fn set_parameter(&mut self, index: usize, value: f64) -> Result<()> {
        self.dynamics.set_parameter(index, value)
    }

    fn log_likelihood_of(&self, dynamics: &D) -> f64 {
        let mut total = 0.0;
        for t in 0..self.num_steps() {
            for (v, counts) in self.counts[t].iter().enumerate() {
                let p = dynamics.transition_prob(self.states[t][v], self.states[t + 1][v], counts);
                total += p.ln();
            }
        }
        total
    }

    /// Log-probability of the trajectory given the graph.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood_of(&self.dynamics)
    }

    /// Neighbor changes `(other endpoint, multiplicity delta)` per vertex.
    fn neighbor_changes(mv: &GraphMove) -> FnvHashMap<usize, Vec<(usize, isize)>> {
        let mut changes: FnvHashMap<usize, Vec<(usize, isize)>> = FnvHashMap::default();
        for (&(u, v), &d) in mv.edge_diff().iter() {
            changes.entry(u).or_default().push((v, d));
            if u != v {
                changes.entry(v).or_default().push((u, d));
            }
        }
        changes
    }

    fn counts_after(&self, t: usize, v: usize, changes: &[(usize, isize)]) -> Result<Vec<usize>> {
        let mut counts: Vec<isize> = self.counts[t][v].iter().map(|&c| c as isize).collect();
        for &(u, d) in changes {
            counts[self.states[t][u]] += d;
        }
        counts
            .into_iter()
            .map(|c| {
                usize::try_from(c).map_err(|_| {
                    LupinError::consistency(
                        "DynamicsLikelihood",
                        format!("neighbor count of vertex {} would become {}", v, c),
                    )
                })
            })
            .collect()
    }

    /// Change of the log-likelihood when `mv` is applied to the graph.
    /// Only the endpoints of changed edges are rescored.
    pub fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        let changes = Self::neighbor_changes(mv);
        let mut ratio = 0.0;
        for (&v, change) in changes.iter() {
            for t in 0..self.num_steps() {
                let (prev, next) = (self.states[t][v], self.states[t + 1][v]);
                let after = self.counts_after(t, v, change)?;
                ratio += self.dynamics.transition_prob(prev, next, &after).ln()
                    - self.dynamics.transition_prob(prev, next, &self.counts[t][v]).ln();
            }
        }
        Ok(ratio)
    }

    /// `-∞` when the new value falls outside the parameter's support.
    pub fn log_likelihood_ratio_from_param_move(&self, mv: &ParamMove) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        if mv.index >= self.dynamics.num_parameters()
            || !self.dynamics.in_support(mv.index, mv.next_value)
        {
            return f64::NEG_INFINITY;
        }
        let mut proposed = self.dynamics.clone();
        if proposed.set_parameter(mv.index, mv.next_value).is_err() {
            return f64::NEG_INFINITY;
        }
        self.log_likelihood_of(&proposed) - self.log_likelihood()
    }

    /// Follow an accepted graph move, rescoring the touched vertices only.
    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        let changes = Self::neighbor_changes(mv);
        let mut updates = Vec::with_capacity(changes.len() * self.num_steps());
        for (&v, change) in changes.iter() {
            for t in 0..self.num_steps() {
                updates.push((t, v, self.counts_after(t, v, change)?));
            }
        }
        for (t, v, counts) in updates {
            self.counts[t][v] = counts;
        }
        Ok(())
    }

    /// Follow an accepted parameter move.
    pub fn apply_param_move(&mut self, mv: &ParamMove) -> Result<()> {
        self.dynamics.set_parameter(mv.index, mv.next_value)
    }

    /// Neighbor counts agree with `graph`.
    pub fn check_consistency(&self, graph: &MultiGraph) -> Result<()> {
        let q = self.dynamics.num_states();
        for t in 0..self.num_steps() {
            let expected = neighbor_counts(graph, &self.states[t], q);
            if let Some(v) = (0..graph.size()).find(|&v| expected[v] != self.counts[t][v]) {
                return Err(LupinError::consistency(
                    "DynamicsLikelihood",
                    format!(
                        "neighbor counts of vertex {} at time {} are {:?}, expected {:?}",
                        v, t, self.counts[t][v], expected[v]
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Every transition probability used by the trajectory lies in `[0, 1]`.
    pub fn check_safety(&self) -> Result<()> {
        self.dynamics.check_safety()?;
        let q = self.dynamics.num_states();
        for t in 0..self.num_steps() {
            for (v, counts) in self.counts[t].iter().enumerate() {
                for s in 0..q {
                    let p = self.dynamics.transition_prob(self.states[t][v], s, counts);
                    if !(0.0..=1.0).contains(&p) {
                        return Err(LupinError::safety(
                            "DynamicsLikelihood",
                            format!(
                                "transition probability {} for vertex {} at time {} is not in [0, 1]",
                                p, v, t
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn ring(n: usize) -> MultiGraph {
        let edges: Vec<_> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        MultiGraph::from_edges(n, &edges).unwrap()
    }

    #[test]
    fn test_graph_move_ratio_matches_recomputation() {
        let mut rng = SmallRng::seed_from_u64(21);
        let mut graph = ring(8);
        let dynamics = SisDynamics::new(0.3, 0.2, 0.05).unwrap();
        let mut likelihood =
            DynamicsLikelihood::simulate(dynamics, &graph, None, 20, &mut rng).unwrap();

        let moves = [
            GraphMove::new(vec![(0, 1)], vec![(0, 4)]),
            GraphMove::new(vec![], vec![(2, 2), (3, 6)]),
            GraphMove::new(vec![(2, 2), (4, 5)], vec![(5, 7)]),
        ];
        for mv in moves.iter() {
            let before = likelihood.log_likelihood();
            let ratio = likelihood.log_likelihood_ratio_from_graph_move(mv).unwrap();
            graph.apply_graph_move(mv).unwrap();
            likelihood.apply_graph_move(mv).unwrap();
            likelihood.check_consistency(&graph).unwrap();
            assert_abs_diff_eq!(likelihood.log_likelihood() - before, ratio, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_param_move_ratio_and_support() {
        let mut rng = SmallRng::seed_from_u64(3);
        let graph = ring(6);
        let dynamics = GlauberDynamics::new(0.5).unwrap();
        let likelihood = DynamicsLikelihood::simulate(dynamics, &graph, None, 10, &mut rng).unwrap();

        let mv = ParamMove {
            index: 0,
            prev_value: 0.5,
            next_value: 0.8,
        };
        let ratio = likelihood.log_likelihood_ratio_from_param_move(&mv);
        let mut moved = likelihood.clone();
        moved.apply_param_move(&mv).unwrap();
        assert_abs_diff_eq!(
            moved.log_likelihood() - likelihood.log_likelihood(),
            ratio,
            epsilon = 1e-9
        );

        let sis = SisDynamics::new(0.1, 0.1, 0.0).unwrap();
        let sis_likelihood = DynamicsLikelihood::simulate(sis, &graph, None, 5, &mut rng).unwrap();
        let outside = ParamMove {
            index: 1,
            prev_value: 0.1,
            next_value: 1.5,
        };
        assert_eq!(
            sis_likelihood.log_likelihood_ratio_from_param_move(&outside),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_invalid_trajectories_are_rejected() {
        let graph = ring(3);
        let sis = SisDynamics::new(0.1, 0.1, 0.0).unwrap();
        assert!(DynamicsLikelihood::new(sis.clone(), vec![vec![0, 1]], &graph).is_err());
        assert!(DynamicsLikelihood::new(sis.clone(), vec![vec![0, 1, 2]], &graph).is_err());
        let ok = DynamicsLikelihood::new(sis, vec![vec![0, 1, 0], vec![1, 1, 0]], &graph).unwrap();
        assert_eq!(ok.num_steps(), 1);
        ok.check_safety().unwrap();
    }

    #[test]
    fn test_removing_missing_edge_is_inconsistent() {
        let graph = MultiGraph::new(3);
        let sis = SisDynamics::new(0.1, 0.1, 0.0).unwrap();
        let likelihood =
            DynamicsLikelihood::new(sis, vec![vec![1, 1, 0], vec![1, 1, 1]], &graph).unwrap();
        let mv = GraphMove::new(vec![(0, 2)], vec![]);
        assert!(likelihood.log_likelihood_ratio_from_graph_move(&mv).is_err());
    }
}
