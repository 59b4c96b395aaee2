//! End-to-end tests across priors, models, proposers and drivers.

use crate::graph::MultiGraph;
use crate::mcmc::{build_graph_proposer, GraphMcmc, GraphMcmcOptions, GraphProposerKind};
use crate::moves::{GraphMove, LabelMove};
use crate::prior::{DeltaCount, PoissonCount, UniformCount, ZeroTruncatedPoissonCount};
use crate::proposer::{GraphMoveProposer, LabelMoveProposer, UniformLabelProposer};
use crate::random_graph::{DegreeCorrectedSbm, RandomGraph, SbmOptions, StochasticBlockModel};
use crate::util::log_poisson_pmf;
use approx::assert_abs_diff_eq;
use fnv::FnvHashMap;
use mcmc_util::MetropolisHastings;
use rand::rngs::SmallRng;
use rand::SeedableRng;

const ALL_PROPOSERS: [GraphProposerKind; 5] = [
    GraphProposerKind::SingleEdgeUniform,
    GraphProposerKind::SingleEdgeDegree,
    GraphProposerKind::HingeFlipUniform,
    GraphProposerKind::HingeFlipDegree,
    GraphProposerKind::DoubleEdgeSwap,
];

fn sampled_models(seed: u64) -> (Vec<Box<dyn RandomGraph>>, SmallRng) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut models: Vec<Box<dyn RandomGraph>> = vec![
        Box::new(
            StochasticBlockModel::uniform(
                15,
                PoissonCount::new(25.0).unwrap(),
                ZeroTruncatedPoissonCount::new(3.0).unwrap(),
                SbmOptions::default(),
            )
            .unwrap(),
        ),
        Box::new(
            StochasticBlockModel::erdos_renyi(
                10,
                PoissonCount::new(15.0).unwrap(),
                SbmOptions::default(),
            )
            .unwrap(),
        ),
        Box::new(
            DegreeCorrectedSbm::uniform(
                15,
                PoissonCount::new(25.0).unwrap(),
                UniformCount::new(1, 4).unwrap(),
            )
            .unwrap(),
        ),
        Box::new(DegreeCorrectedSbm::configuration(10, PoissonCount::new(15.0).unwrap()).unwrap()),
    ];
    for model in models.iter_mut() {
        model.sample(&mut rng).unwrap();
        model.check_self_consistency().unwrap();
    }
    (models, rng)
}

fn random_multigraph(size: usize, num_edges: usize, rng: &mut SmallRng) -> MultiGraph {
    use rand::Rng;
    let edges: Vec<_> = (0..num_edges)
        .map(|_| (rng.random_range(0..size), rng.random_range(0..size)))
        .collect();
    MultiGraph::from_edges(size, &edges).unwrap()
}

#[test]
fn test_graph_move_ratios_match_recomputed_joint() {
    let (mut models, mut rng) = sampled_models(42);
    for model in models.iter_mut() {
        for &kind in ALL_PROPOSERS.iter() {
            let mut proposer = build_graph_proposer(kind, 1.0, true, true).unwrap();
            proposer.set_up(model.graph());
            for _ in 0..40 {
                let mv = proposer.propose_move(model.graph(), &mut rng).unwrap();
                let ratio = model.log_joint_ratio_from_graph_move(&mv).unwrap();
                if !ratio.is_finite() {
                    continue;
                }
                let before = model.log_joint();
                model.apply_graph_move(&mv).unwrap();
                proposer.apply_graph_move(&mv).unwrap();
                assert_abs_diff_eq!(model.log_joint() - before, ratio, epsilon = 1e-6);
            }
            model.check_self_consistency().unwrap();
        }
    }
}

#[test]
fn test_label_move_ratios_match_recomputed_joint() {
    let (mut models, mut rng) = sampled_models(7);
    let proposer = UniformLabelProposer::new(0.2).unwrap();
    for model in models.iter_mut() {
        for _ in 0..200 {
            let mv = proposer
                .propose_move(&model.block_prior().borrow(), &mut rng)
                .unwrap();
            let ratio = model.log_joint_ratio_from_label_move(&mv).unwrap();
            if !ratio.is_finite() {
                continue;
            }
            let before = model.log_joint();
            model.apply_label_move(&mv).unwrap();
            assert_abs_diff_eq!(model.log_joint() - before, ratio, epsilon = 1e-6);
        }
        model.check_self_consistency().unwrap();
        let labels = model.labels();
        let b = model.block_count();
        assert!(labels.iter().all(|&r| r < b));
        assert!(model.vertex_counts().iter().all(|&n| n > 0));
    }
}

#[test]
fn test_every_proposer_satisfies_detailed_balance() {
    let mut rng = SmallRng::seed_from_u64(99);
    for &kind in ALL_PROPOSERS.iter() {
        let mut graph = random_multigraph(8, 14, &mut rng);
        let mut proposer = build_graph_proposer(kind, 0.5, true, true).unwrap();
        proposer.set_up(&graph);
        for _ in 0..400 {
            let mv = proposer.propose_move(&graph, &mut rng).unwrap();
            let forward = proposer.log_proposal_prob_ratio(&mv, &graph);
            graph.apply_graph_move(&mv).unwrap();
            proposer.apply_graph_move(&mv).unwrap();
            let backward = proposer.log_proposal_prob_ratio(&mv.reversed(), &graph);
            if forward.is_finite() {
                assert_abs_diff_eq!(forward, -backward, epsilon = 1e-9);
            } else {
                assert_eq!(backward, f64::INFINITY);
            }
        }
    }
}

#[test]
fn test_empty_moves_change_nothing() {
    let (mut models, _) = sampled_models(3);
    for model in models.iter_mut() {
        let before = model.log_joint();
        let graph = model.graph().clone();
        let labels = model.labels();

        let empty = GraphMove::empty();
        assert_eq!(model.log_joint_ratio_from_graph_move(&empty).unwrap(), 0.0);
        model.apply_graph_move(&empty).unwrap();

        let stay = LabelMove::stay(0, model.label_of(0));
        assert_eq!(model.log_joint_ratio_from_label_move(&stay).unwrap(), 0.0);
        model.apply_label_move(&stay).unwrap();

        assert_eq!(model.log_joint(), before);
        assert_eq!(model.graph(), &graph);
        assert_eq!(model.labels(), labels);
    }
}

#[test]
fn test_invalid_removal_leaves_model_unchanged() {
    let (mut models, _) = sampled_models(5);
    for model in models.iter_mut() {
        let before = model.log_joint();
        let graph = model.graph().clone();
        let absent = (0..model.size())
            .flat_map(|u| (u..model.size()).map(move |v| (u, v)))
            .find(|&(u, v)| !graph.has_edge(u, v));
        let Some(absent) = absent else {
            continue;
        };
        let mv = GraphMove::new(vec![absent], vec![]);
        assert!(!model.is_valid_graph_move(&mv));
        assert!(model.apply_graph_move(&mv).is_err());
        assert_eq!(model.graph(), &graph);
        assert_eq!(model.log_joint(), before);
        model.check_self_consistency().unwrap();
    }
}

fn graph_key(graph: &MultiGraph) -> Vec<((usize, usize), usize)> {
    let mut edges: Vec<_> = graph.edges().collect();
    edges.sort_unstable();
    edges
}

/// Fixed-size Erdős–Rényi multigraphs are uniformly distributed, so a
/// correct chain visits all 21 multigraphs with 2 edges on 3 vertices
/// equally often.
fn assert_uniform_over_small_multigraphs(kind: GraphProposerKind, seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut model =
        StochasticBlockModel::erdos_renyi(3, DeltaCount::new(2), SbmOptions::default()).unwrap();
    model.sample(&mut rng).unwrap();
    let options = GraphMcmcOptions {
        graph_move_prob: 1.0,
        graph_proposer: kind,
        ..GraphMcmcOptions::default()
    };
    let mut mh = MetropolisHastings::new(GraphMcmc::new(model, options).unwrap());

    let mut visits: FnvHashMap<_, usize> = FnvHashMap::default();
    let n = 210_000;
    for _ in 0..n {
        mh.step(&mut rng).unwrap();
        *visits.entry(graph_key(mh.target().model().graph())).or_insert(0) += 1;
    }
    assert_eq!(visits.len(), 21);
    for &count in visits.values() {
        assert_abs_diff_eq!(count as f64 / n as f64, 1.0 / 21.0, epsilon = 0.01);
    }
}

#[test]
fn test_hinge_flip_chain_is_uniform_on_multigraphs() {
    assert_uniform_over_small_multigraphs(GraphProposerKind::HingeFlipUniform, 1);
}

#[test]
fn test_degree_hinge_flip_chain_is_uniform_on_multigraphs() {
    assert_uniform_over_small_multigraphs(GraphProposerKind::HingeFlipDegree, 2);
}

/// With no edges the posterior over labelings of 3 vertices is the block
/// prior alone: `B` uniform on `1..=3`, so the single-block labeling has
/// mass 1/3 and each of the 12 others 1/18.
fn assert_label_chain_matches_partition_prior<G: RandomGraph + 'static>(mut model: G, seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    model.sample(&mut rng).unwrap();
    assert_eq!(model.graph().total_edge_number(), 0);
    let options = GraphMcmcOptions {
        graph_move_prob: 0.0,
        p_create: 0.3,
        ..GraphMcmcOptions::default()
    };
    let mut mh = MetropolisHastings::new(GraphMcmc::new(model, options).unwrap());

    let mut visits: FnvHashMap<Vec<usize>, usize> = FnvHashMap::default();
    let n = 400_000;
    for _ in 0..n {
        mh.step(&mut rng).unwrap();
        *visits.entry(mh.target().model().labels()).or_insert(0) += 1;
    }
    mh.target().model().check_self_consistency().unwrap();
    assert_eq!(visits.len(), 13);
    for (labels, &count) in visits.iter() {
        let expected = if labels == &vec![0, 0, 0] { 1.0 / 3.0 } else { 1.0 / 18.0 };
        assert_abs_diff_eq!(count as f64 / n as f64, expected, epsilon = 0.01);
    }
}

#[test]
fn test_label_chain_matches_partition_prior() {
    let sbm = StochasticBlockModel::uniform(
        3,
        DeltaCount::new(0),
        UniformCount::new(1, 3).unwrap(),
        SbmOptions::default(),
    )
    .unwrap();
    assert_label_chain_matches_partition_prior(sbm, 21);

    let dcsbm =
        DegreeCorrectedSbm::uniform(3, DeltaCount::new(0), UniformCount::new(1, 3).unwrap())
            .unwrap();
    assert_label_chain_matches_partition_prior(dcsbm, 22);
}

#[test]
fn test_single_edge_chain_recovers_edge_count_prior() {
    // with a flat likelihood over multigraphs of a given size, the edge
    // count follows its prior
    let mut rng = SmallRng::seed_from_u64(11);
    let mean = 1.5;
    for kind in [
        GraphProposerKind::SingleEdgeUniform,
        GraphProposerKind::SingleEdgeDegree,
    ] {
        let mut model =
            StochasticBlockModel::erdos_renyi(1, PoissonCount::new(mean).unwrap(), SbmOptions::default())
                .unwrap();
        model.sample(&mut rng).unwrap();
        let options = GraphMcmcOptions {
            graph_move_prob: 1.0,
            graph_proposer: kind,
            ..GraphMcmcOptions::default()
        };
        let mut mh = MetropolisHastings::new(GraphMcmc::new(model, options).unwrap());
        let mut counts = vec![0usize; 64];
        let n = 200_000;
        for _ in 0..n {
            mh.step(&mut rng).unwrap();
            counts[mh.target().model().graph().total_edge_number().min(63)] += 1;
        }
        for (k, &c) in counts.iter().enumerate().take(4) {
            assert_abs_diff_eq!(
                c as f64 / n as f64,
                log_poisson_pmf(k, mean).exp(),
                epsilon = 0.015
            );
        }
    }
}

#[test]
fn test_parallel_chains_are_independent_stacks() {
    use rayon::prelude::*;
    let summaries: Vec<(usize, f64)> = (0..4u64)
        .into_par_iter()
        .map(|chain| {
            let mut rng = SmallRng::seed_from_u64(1000 + chain);
            let mut model = StochasticBlockModel::uniform(
                10,
                PoissonCount::new(12.0).unwrap(),
                UniformCount::new(1, 3).unwrap(),
                SbmOptions::default(),
            )
            .unwrap();
            model.sample(&mut rng).unwrap();
            let mut mh =
                MetropolisHastings::new(GraphMcmc::new(model, GraphMcmcOptions::default()).unwrap());
            mh.run(3, 30, &mut rng).unwrap();
            let target = mh.into_target();
            target.model().check_self_consistency().unwrap();
            (target.model().block_count(), target.model().log_joint())
        })
        .collect();
    assert_eq!(summaries.len(), 4);
    assert!(summaries.iter().all(|(b, lj)| *b >= 1 && lj.is_finite()));
}
