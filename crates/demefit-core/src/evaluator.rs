//! The stochastic cost-function evaluator.
//!
//! [SpectrumEvaluator] glues the pieces together: for a candidate parameter
//! vector it updates the [ParamStore], checks feasibility, fans simulation
//! replicates out across the worker pool, merges the per-task pattern
//! tables, and scores the expected spectrum against the observed one.
//!
//! Workers only ever touch their own clones of the network and store; the
//! evaluator's originals are written exclusively between evaluations. Each
//! task draws from an RNG stream keyed on `(seed, task index)`, so the cost
//! is a pure function of the candidate vector, the seed, the replicate
//! count and the task count, up to float summation order.

use crate::coalescent::simulate_replicate;
use crate::cost::{CostKind, divergence};
use crate::domain::{SimRng, WorkerPool};
use crate::network::{PopNetwork, SampleIndex};
use crate::params::{Bounds, ParamStore};
use crate::pattern::PatternTable;
use crate::problem::CostModel;
use demefit_error::{DemefitResult, demefit_bail, ensure};
use std::sync::{Arc, Mutex};

/// Knobs for one evaluator.
#[derive(Clone, Debug)]
pub struct EvalConfig {
    pub cost: CostKind,
    /// Coalescent replicates per cost evaluation.
    pub replicates: u64,
    /// Number of tasks one evaluation is split into; also the worker count.
    pub tasks: usize,
    /// Tabulate singleton site patterns.
    pub do_singletons: bool,
    /// Effective number of sites behind the observed spectrum.
    pub n_sites: f64,
    pub seed: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            cost: CostKind::Kl,
            replicates: 1000,
            tasks: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            do_singletons: false,
            n_sites: 1e6,
            seed: 0,
        }
    }
}

/// Per-worker scratch: an RNG engine that is allocated once per thread and
/// reseeded at the start of each task from that task's stream.
pub struct SimState {
    rng: SimRng,
}

struct TaskSlot {
    table: PatternTable,
    done: bool,
}

pub struct SpectrumEvaluator {
    network: PopNetwork,
    store: ParamStore,
    samples: SampleIndex,
    observed: PatternTable,
    bounds: Bounds,
    config: EvalConfig,
    pool: WorkerPool<SimState>,
    evaluations: u64,
    jobs_submitted: u64,
}

impl SpectrumEvaluator {
    /// `observed` is renormalized on construction; it must carry mass.
    pub fn new(
        network: PopNetwork,
        store: ParamStore,
        samples: SampleIndex,
        mut observed: PatternTable,
        bounds: Bounds,
        config: EvalConfig,
    ) -> DemefitResult<Self> {
        ensure!(config.replicates > 0, InvalidConfig: "replicates must be positive");
        ensure!(config.tasks > 0, InvalidConfig: "need at least one task");
        ensure!(!samples.is_empty(), InvalidConfig: "no samples registered");
        observed.normalize()?;

        let pool = WorkerPool::new(config.tasks, |_| SimState {
            rng: SimRng::seed_from(0),
        })?;

        Ok(SpectrumEvaluator {
            network,
            store,
            samples,
            observed,
            bounds,
            config,
            pool,
            evaluations: 0,
            jobs_submitted: 0,
        })
    }

    pub fn observed(&self) -> &PatternTable {
        &self.observed
    }

    pub fn sample_index(&self) -> &SampleIndex {
        &self.samples
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Cost evaluations since construction.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Simulation jobs dispatched since construction. Stays flat across
    /// evaluations that are rejected before simulation.
    pub fn jobs_submitted(&self) -> u64 {
        self.jobs_submitted
    }

    /// The expected spectrum at `x`, normalized. Unlike [CostModel::cost],
    /// bad inputs surface as errors here; used by residual reporting and
    /// model averaging.
    pub fn sample_spectrum(&mut self, x: &[f64], replicates: u64) -> DemefitResult<PatternTable> {
        self.store.set_free_vector(x)?;
        if !self.network.feasible(&self.store, &self.bounds) {
            demefit_bail!(InfeasibleNetwork: "parameter vector fails network feasibility");
        }
        self.expected_spectrum(replicates)
    }

    /// Observed minus expected frequencies at `x`, keyed by the observed
    /// patterns.
    pub fn residuals(&mut self, x: &[f64], replicates: u64) -> DemefitResult<PatternTable> {
        let expected = self.sample_spectrum(x, replicates)?;
        let mut residuals = self.observed.clone();
        residuals.subtract(&expected);
        Ok(residuals)
    }

    /// Split `replicates` across the pool, run them, and merge the result.
    fn expected_spectrum(&mut self, replicates: u64) -> DemefitResult<PatternTable> {
        ensure!(replicates > 0, InvalidConfig: "replicates must be positive");
        let tasks = (self.config.tasks as u64).min(replicates) as usize;
        let base = replicates / tasks as u64;
        let extra = (replicates % tasks as u64) as usize;
        let universe = self.samples.universe();
        let do_singletons = self.config.do_singletons;
        let seed = self.config.seed;

        let slots: Vec<Arc<Mutex<TaskSlot>>> = (0..tasks)
            .map(|_| {
                Arc::new(Mutex::new(TaskSlot {
                    table: PatternTable::new(),
                    done: false,
                }))
            })
            .collect();

        for task in 0..tasks {
            let reps = base + if task < extra { 1 } else { 0 };
            let mut net = self.network.clone();
            let store = self.store.clone();
            let samples = self.samples.clone();
            let slot = Arc::clone(&slots[task]);

            self.jobs_submitted += 1;
            self.pool.submit(move |state: &mut SimState| {
                state.rng = SimRng::from_stream(seed, task as u64);
                let mut table = PatternTable::new();
                for _ in 0..reps {
                    net.clear_samples();
                    net.inject_samples(&samples);
                    simulate_replicate(
                        &mut net,
                        &store,
                        universe,
                        do_singletons,
                        &mut state.rng,
                        &mut table,
                    );
                }
                let mut slot = slot.lock().unwrap();
                slot.table = table;
                slot.done = true;
            });
        }

        self.pool.wait_idle();

        let mut merged = PatternTable::new();
        for slot in &slots {
            let slot = slot.lock().unwrap();
            if !slot.done {
                demefit_bail!(ThreadPool: "a simulation task did not complete");
            }
            merged.merge(&slot.table);
        }

        merged.divide_by(replicates as f64);
        merged.normalize()?;
        Ok(merged)
    }
}

impl CostModel for SpectrumEvaluator {
    fn n_free(&self) -> usize {
        self.store.n_free()
    }

    fn names(&self) -> Vec<String> {
        self.store.free_names()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.store.free_bounds()
    }

    /// Evaluate the divergence at `x`. Out-of-bounds vectors, infeasible
    /// networks and empty simulated spectra all read as `+inf`; nothing is
    /// dispatched to the pool for a rejected vector.
    fn cost(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;

        if self.store.set_free_vector(x).is_err() {
            return f64::INFINITY;
        }
        if !self.network.feasible(&self.store, &self.bounds) {
            return f64::INFINITY;
        }

        match self.expected_spectrum(self.config.replicates) {
            Ok(expected) => divergence(self.config.cost, &self.observed, &expected, self.config.n_sites),
            Err(_) => f64::INFINITY,
        }
    }

    fn set_replicates(&mut self, replicates: u64) {
        self.config.replicates = replicates;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TipId;
    use crate::params::{ParamKind, ParamStoreBuilder};

    fn two_leaf_eval(config: EvalConfig) -> SpectrumEvaluator {
        let mut b = ParamStoreBuilder::new();
        let t0 = b.fixed("T0", ParamKind::Time, 0.0);
        let t1 = b.free("T1", ParamKind::Time, 1.0, 0.0, 10.0);
        let n = b.free("2N", ParamKind::TwoN, 1.0, 0.01, 100.0);
        let store = b.build().unwrap();

        let (net, samples) = PopNetwork::builder()
            .segment("a", n, t0)
            .segment("b", n, t0)
            .segment("ab", n, t1)
            .samples("a", 1)
            .samples("b", 1)
            .derive("a", "ab")
            .derive("b", "ab")
            .build(&store)
            .unwrap();

        let observed: PatternTable =
            [(TipId(0b01), 0.5), (TipId(0b10), 0.5)].into_iter().collect();

        SpectrumEvaluator::new(net, store, samples, observed, Bounds::default(), config).unwrap()
    }

    #[test]
    fn test_out_of_bounds_costs_infinity_without_jobs() {
        let mut eval = two_leaf_eval(EvalConfig {
            do_singletons: true,
            replicates: 10,
            tasks: 2,
            ..EvalConfig::default()
        });

        let cost = eval.cost(&[20.0, 1.0]);
        assert_eq!(cost, f64::INFINITY);
        assert_eq!(eval.jobs_submitted(), 0);
        assert_eq!(eval.evaluations(), 1);
    }

    #[test]
    fn test_cost_is_finite_at_feasible_point() {
        let mut eval = two_leaf_eval(EvalConfig {
            do_singletons: true,
            replicates: 200,
            tasks: 2,
            seed: 42,
            ..EvalConfig::default()
        });

        let cost = eval.cost(&[1.0, 1.0]);
        assert!(cost.is_finite());
        assert!(eval.jobs_submitted() >= 2);
    }

    #[test]
    fn test_cost_is_deterministic_for_fixed_seed() {
        let config = EvalConfig {
            do_singletons: true,
            replicates: 100,
            tasks: 3,
            seed: 7,
            ..EvalConfig::default()
        };

        let mut a = two_leaf_eval(config.clone());
        let mut b = two_leaf_eval(config);

        let x = [1.0, 1.0];
        assert_eq!(a.cost(&x), b.cost(&x));
        // and stable across repeated calls on the same evaluator
        assert_eq!(a.cost(&x), b.cost(&x));
    }

    #[test]
    fn test_empty_spectrum_costs_infinity() {
        // singletons filtered and only the universe pattern remains: the
        // simulated table is empty, which must surface as +inf
        let mut eval = two_leaf_eval(EvalConfig {
            do_singletons: false,
            replicates: 50,
            tasks: 1,
            ..EvalConfig::default()
        });

        assert_eq!(eval.cost(&[1.0, 1.0]), f64::INFINITY);
    }

    #[test]
    fn test_sample_spectrum_reports_errors() {
        let mut eval = two_leaf_eval(EvalConfig {
            do_singletons: true,
            replicates: 10,
            tasks: 1,
            ..EvalConfig::default()
        });

        assert!(eval.sample_spectrum(&[20.0, 1.0], 10).is_err());

        let spectrum = eval.sample_spectrum(&[1.0, 1.0], 100).unwrap();
        assert!((spectrum.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_residuals_keyed_by_observed() {
        let mut eval = two_leaf_eval(EvalConfig {
            do_singletons: true,
            replicates: 10,
            tasks: 1,
            seed: 3,
            ..EvalConfig::default()
        });

        let residuals = eval.residuals(&[1.0, 1.0], 1_000).unwrap();
        assert!(residuals.same_keys(eval.observed()));
        // frequencies on both sides sum to one, so residuals sum to zero
        assert!(residuals.total().abs() < 1e-9);
    }

    #[test]
    fn test_replicates_split_across_tasks() {
        let mut eval = two_leaf_eval(EvalConfig {
            do_singletons: true,
            replicates: 5,
            tasks: 8,
            seed: 1,
            ..EvalConfig::default()
        });

        // only as many tasks as replicates are dispatched
        let cost = eval.cost(&[1.0, 1.0]);
        assert!(cost.is_finite());
        assert_eq!(eval.jobs_submitted(), 5);
    }

    #[test]
    fn test_cost_model_surface() {
        let eval = two_leaf_eval(EvalConfig {
            do_singletons: true,
            ..EvalConfig::default()
        });

        assert_eq!(eval.n_free(), 2);
        assert_eq!(eval.names(), vec!["T1", "2N"]);
        assert_eq!(eval.bounds(), vec![(0.0, 10.0), (0.01, 100.0)]);
    }
}
