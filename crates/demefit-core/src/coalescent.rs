//! Backward-in-time coalescent simulation through a population network.
//!
//! One replicate walks the network leaves-first. Within a segment, waiting
//! times between coalescent events are exponential with mean
//! `2*twoN / (k*(k-1))` for `k` active lineages; every finite interval a
//! lineage survives is credited to the pattern-table entry for that
//! lineage's tip set, subject to the informativeness filter. At a segment
//! boundary the surviving lineages move to the parent, or are routed
//! randomly between two parents at an admixture. The root epoch runs until a
//! single lineage remains; its residual interval toward infinity carries no
//! information about site patterns and is never credited.

use crate::TipId;
use crate::domain::SimRng;
use crate::network::PopNetwork;
use crate::params::ParamStore;
use crate::pattern::PatternTable;

/// Run one coalescent replicate, accumulating branch lengths into `table`.
///
/// Samples must already be injected; the network's lineage lists are
/// consumed. Simulation cannot fail: every draw is well-defined for any
/// feasible parameter values.
pub fn simulate_replicate(
    net: &mut PopNetwork,
    store: &ParamStore,
    universe: TipId,
    do_singletons: bool,
    rng: &mut SimRng,
    table: &mut PatternTable,
) {
    for k in 0..net.topo_order().len() {
        let idx = net.topo_order()[k];
        let seg = net.segment(idx);

        let two_n = store.value(seg.two_n);
        let start = store.value(seg.start);
        let end = seg.end.map(|id| store.value(id));
        let parents: [Option<usize>; 2] = [
            seg.parents.first().copied(),
            seg.parents.get(1).copied(),
        ];
        let mix = seg.mix.map(|id| store.value(id));

        let mut lineages = std::mem::take(&mut net.segment_mut(idx).lineages);
        let mut t = start;

        while lineages.len() >= 2 {
            let n = lineages.len();
            let mean = 2.0 * two_n / (n * (n - 1)) as f64;
            let dt = rng.exponential(mean);

            match end {
                Some(e) if t + dt >= e => {
                    // no further event inside this epoch
                    credit(table, &lineages, e - t, universe, do_singletons);
                    t = e;
                    break;
                }
                _ => {
                    t += dt;
                    credit(table, &lineages, dt, universe, do_singletons);

                    let (i, j) = rng.distinct_pair(n);
                    let joined = lineages[i].union(lineages[j]);
                    lineages[i] = joined;
                    lineages.swap_remove(j);
                }
            }
        }

        // carry a lone lineage to the end of a bounded epoch; the root's
        // residual toward infinity is never credited
        if let Some(e) = end {
            if t < e {
                credit(table, &lineages, e - t, universe, do_singletons);
            }
        }

        match (parents[0], parents[1]) {
            (None, _) => lineages.clear(),
            (Some(p), None) => {
                net.segment_mut(p).lineages.extend_from_slice(&lineages);
            }
            (Some(native), Some(introgressor)) => {
                let m = mix.unwrap_or(0.0);
                for &tid in &lineages {
                    let dst = if rng.bernoulli(m) { introgressor } else { native };
                    net.segment_mut(dst).lineages.push(tid);
                }
            }
        }
    }
}

#[inline]
fn credit(
    table: &mut PatternTable,
    lineages: &[TipId],
    dt: f64,
    universe: TipId,
    do_singletons: bool,
) {
    for &tid in lineages {
        if tid.is_informative(universe, do_singletons) {
            table.add(tid, dt);
        }
    }
}
