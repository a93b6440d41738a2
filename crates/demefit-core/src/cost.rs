//! Divergence between observed and simulated pattern frequencies.

use crate::pattern::PatternTable;

/// Which divergence the evaluator scores with. Selected per run; the sums
/// below run over the keys of the observed table, and any expected mass of
/// zero under positive observed mass yields `+inf`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CostKind {
    /// Kullback-Leibler divergence of expected from observed frequencies.
    #[default]
    Kl,
    /// Pearson chi-squared statistic on expected counts.
    ChiSq,
    /// Poisson negative log-likelihood on expected counts.
    Poisson,
}

/// Score normalized expected frequencies `expected` against normalized
/// observed frequencies `observed`. `n_sites` is the effective number of
/// sites behind the observed spectrum; it scales the count-based kinds.
pub fn divergence(
    kind: CostKind,
    observed: &PatternTable,
    expected: &PatternTable,
    n_sites: f64,
) -> f64 {
    match kind {
        CostKind::Kl => kl_divergence(observed, expected),
        CostKind::ChiSq => chi_sq(observed, expected, n_sites),
        CostKind::Poisson => poisson_nll(observed, expected, n_sites),
    }
}

fn kl_divergence(observed: &PatternTable, expected: &PatternTable) -> f64 {
    let mut sum = 0.0;
    for (tid, o) in observed.iter() {
        if o <= 0.0 {
            continue;
        }
        let e = expected.get(tid);
        if e <= 0.0 {
            return f64::INFINITY;
        }
        sum += o * (o / e).ln();
    }
    sum
}

fn chi_sq(observed: &PatternTable, expected: &PatternTable, n_sites: f64) -> f64 {
    let mut sum = 0.0;
    for (tid, o) in observed.iter() {
        let e = expected.get(tid);
        if e <= 0.0 {
            if o > 0.0 {
                return f64::INFINITY;
            }
            continue;
        }
        let diff = o - e;
        sum += diff * diff * n_sites / e;
    }
    sum
}

fn poisson_nll(observed: &PatternTable, expected: &PatternTable, n_sites: f64) -> f64 {
    let mut sum = 0.0;
    for (tid, o) in observed.iter() {
        let lambda = expected.get(tid) * n_sites;
        let count = o * n_sites;
        if lambda <= 0.0 {
            if count > 0.0 {
                return f64::INFINITY;
            }
            continue;
        }
        sum += lambda - count * lambda.ln();
    }
    sum
}
