//! Log-combinatorics and uniform combinatorial samplers.
//!
//! Every log-probability in the prior hierarchy reduces to these
//! functions, so they take integer counts and return `-∞` outside the
//! support instead of failing.

use crate::error::{LupinError, Result};
use rand::seq::index;
use rand::RngCore;
use special::Gamma as SpecialGamma;

/// `ln n!`
#[inline]
pub fn log_factorial(n: usize) -> f64 {
    SpecialGamma::ln_gamma(n as f64 + 1.0).0
}

/// `ln (2l)!!`, the number of stub pairings of `l` self-loops.
#[inline]
pub fn log_double_factorial_loops(l: usize) -> f64 {
    l as f64 * std::f64::consts::LN_2 + log_factorial(l)
}

/// `ln C(n, k)`; `-∞` if `k > n`.
#[inline]
pub fn log_binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    log_factorial(n) - log_factorial(k) - log_factorial(n - k)
}

/// `ln ((n k))`, the number of multisets of size `k` drawn from `n` items.
#[inline]
pub fn log_multiset(n: usize, k: usize) -> f64 {
    if n == 0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    log_binomial(n + k - 1, k)
}

/// `ln (n! / ∏ cᵢ!)`
pub fn log_multinomial(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    log_factorial(n) - counts.iter().map(|&c| log_factorial(c)).sum::<f64>()
}

/// Poisson log-pmf.
pub fn log_poisson_pmf(k: usize, mean: f64) -> f64 {
    if mean == 0.0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    k as f64 * mean.ln() - mean - log_factorial(k)
}

/// Poisson log-pmf conditioned on `k > 0`.
pub fn log_zero_truncated_poisson_pmf(k: usize, mean: f64) -> f64 {
    if k == 0 {
        return f64::NEG_INFINITY;
    }
    // ln(1 - e^{-μ})
    log_poisson_pmf(k, mean) - (-(-mean).exp_m1()).ln()
}

/// Geometric log-pmf over `{0, 1, ...}` parameterized by its mean.
pub fn log_geometric_pmf(k: usize, mean: f64) -> f64 {
    if mean == 0.0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    k as f64 * (mean / (mean + 1.0)).ln() - (mean + 1.0).ln()
}

/// Uniform log-pmf over `min..=max`.
pub fn log_uniform_count(k: usize, min: usize, max: usize) -> f64 {
    if k < min || k > max {
        f64::NEG_INFINITY
    } else {
        -((max - min + 1) as f64).ln()
    }
}

/// Uniformly random weak composition of `total` into `parts` non-negative parts.
pub fn sample_weak_composition(
    total: usize,
    parts: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<usize>> {
    if parts == 0 {
        if total == 0 {
            return Ok(vec![]);
        }
        return Err(LupinError::InvalidParameter(format!(
            "cannot split {} into zero parts",
            total
        )));
    }

    let mut bars = index::sample(rng, total + parts - 1, parts - 1).into_vec();
    bars.sort_unstable();

    let mut counts = Vec::with_capacity(parts);
    let mut prev = 0;
    for b in bars {
        counts.push(b - prev);
        prev = b + 1;
    }
    counts.push(total + parts - 1 - prev);
    Ok(counts)
}

/// Uniformly random composition of `total` into `parts` positive parts.
pub fn sample_strong_composition(
    total: usize,
    parts: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<usize>> {
    if parts > total || (parts == 0 && total > 0) {
        return Err(LupinError::InvalidParameter(format!(
            "cannot split {} into {} positive parts",
            total, parts
        )));
    }
    let mut counts = sample_weak_composition(total - parts, parts, rng)?;
    counts.iter_mut().for_each(|c| *c += 1);
    Ok(counts)
}

/// Uniformly random multiset of `size` items drawn from `0..num_items`,
/// returned sorted.
pub fn sample_multiset(num_items: usize, size: usize, rng: &mut dyn RngCore) -> Result<Vec<usize>> {
    if size == 0 {
        return Ok(vec![]);
    }
    if num_items == 0 {
        return Err(LupinError::InvalidParameter(format!(
            "cannot draw {} items from an empty set",
            size
        )));
    }
    let mut picks = index::sample(rng, num_items + size - 1, size).into_vec();
    picks.sort_unstable();
    Ok(picks.into_iter().enumerate().map(|(i, c)| c - i).collect())
}

/// Uniformly random subset of `size` distinct items from `0..num_items`.
pub fn sample_subset(num_items: usize, size: usize, rng: &mut dyn RngCore) -> Result<Vec<usize>> {
    if size > num_items {
        return Err(LupinError::InvalidParameter(format!(
            "cannot draw {} distinct items from {}",
            size, num_items
        )));
    }
    let mut picks = index::sample(rng, num_items, size).into_vec();
    picks.sort_unstable();
    Ok(picks)
}

/// Pair at position `index` when the pairs `(a, b)` with `a <= b < n`
/// (or `a < b` without the diagonal) are listed row by row.
pub fn triangle_pair(index: usize, n: usize, with_diagonal: bool) -> (usize, usize) {
    let mut rest = index;
    for a in 0..n {
        let first = if with_diagonal { a } else { a + 1 };
        let row_len = n.saturating_sub(first);
        if rest < row_len {
            return (a, first + rest);
        }
        rest -= row_len;
    }
    (n, n)
}

/// Number of pairs enumerated by [`triangle_pair`].
pub fn num_triangle_pairs(n: usize, with_diagonal: bool) -> usize {
    if with_diagonal {
        n * (n + 1) / 2
    } else {
        n * n.saturating_sub(1) / 2
    }
}
