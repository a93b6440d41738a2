//! Differential-evolution minimizer.
//!
//! A population of candidate parameter vectors evolves by mutation against
//! scaled difference vectors and binomial crossover, with greedy selection.
//! The driver walks a [StageSchedule]: each stage fixes how many generations
//! to run and how many simulation replicates back each cost evaluation, so
//! the search starts cheap and noisy and finishes slow and precise. A point
//! whose cost reads `+inf` (out of bounds, infeasible, degenerate spectrum)
//! simply loses every selection it enters.

use crate::schedule::{Stage, StageSchedule};
use crate::state::{OptState, StatePoint};
use demefit_core::{CostModel, Engine, SimRng};
use demefit_error::{DemefitError, DemefitResult, demefit_bail, demefit_err};
use tracing::info;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Mutate around the current best point.
    #[default]
    Best1Bin,
    /// Mutate around a random point; slower but more explorative.
    Rand1Bin,
}

/// One epoch of the search: the state after a full generation.
#[derive(Clone, Debug)]
pub struct Generation {
    index: usize,
    stage: usize,
    replicates: u64,
    best_x: Vec<f64>,
    best_cost: f64,
    complete: bool,
}

impl Generation {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Zero-based index of the schedule stage this generation ran under.
    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn replicates(&self) -> u64 {
        self.replicates
    }

    pub fn best_x(&self) -> &[f64] {
        &self.best_x
    }

    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    /// True once the stage schedule is exhausted.
    pub fn complete(&self) -> bool {
        self.complete
    }
}

/// The result of a completed run.
#[derive(Clone, Debug)]
pub struct Fit {
    pub names: Vec<String>,
    pub x: Vec<f64>,
    pub cost: f64,
    pub generations: usize,
}

#[derive(Clone, Debug)]
struct Point {
    x: Vec<f64>,
    cost: f64,
}

pub struct DiffEvBuilder<M> {
    model: M,
    points: Option<usize>,
    f: f64,
    cr: f64,
    strategy: Strategy,
    seed: u64,
    x0: Option<Vec<f64>>,
    resume: Option<OptState>,
    stages: Vec<Stage>,
    errors: Vec<DemefitError>,
}

impl<M: CostModel> DiffEvBuilder<M> {
    fn new(model: M) -> Self {
        DiffEvBuilder {
            model,
            points: None,
            f: 0.7,
            cr: 0.9,
            strategy: Strategy::default(),
            seed: 0,
            x0: None,
            resume: None,
            stages: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Population size. Defaults to `10 * dim`, at least 4.
    pub fn points(mut self, n: usize) -> Self {
        if n < 4 {
            self.errors
                .push(demefit_err!(InvalidConfig: "population needs at least 4 points, got {}", n));
        }
        self.points = Some(n);
        self
    }

    /// Differential weight F. Default 0.7.
    pub fn mutate(mut self, f: f64) -> Self {
        if f <= 0.0 || f >= 2.0 {
            self.errors
                .push(demefit_err!(InvalidConfig: "mutation factor {} is outside (0, 2)", f));
        }
        self.f = f;
        self
    }

    /// Crossover probability CR. Default 0.9.
    pub fn crossover(mut self, cr: f64) -> Self {
        if !(0.0..=1.0).contains(&cr) {
            self.errors
                .push(demefit_err!(InvalidConfig: "crossover probability {} is outside [0, 1]", cr));
        }
        self.cr = cr;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Seed the population with a known starting point.
    pub fn x0(mut self, x0: Vec<f64>) -> Self {
        self.x0 = Some(x0);
        self
    }

    /// Seed the population from a checkpointed state. Costs in the state are
    /// discarded and re-evaluated at the first stage's precision.
    pub fn resume(mut self, state: OptState) -> Self {
        self.resume = Some(state);
        self
    }

    /// Append a stage: `opt_iterations` generations at `replicates`
    /// replicates per evaluation.
    pub fn stage(mut self, opt_iterations: u64, replicates: u64) -> Self {
        if opt_iterations == 0 || replicates == 0 {
            self.errors
                .push(demefit_err!(InvalidConfig: "stages need positive iterations and replicates"));
        }
        self.stages.push(Stage::new(opt_iterations, replicates));
        self
    }

    pub fn build(mut self) -> DemefitResult<DiffEv<M>> {
        if let Some(err) = self.errors.drain(..).next() {
            return Err(err);
        }
        if self.stages.is_empty() {
            demefit_bail!(InvalidConfig: "stage schedule must have at least one stage");
        }

        let dim = self.model.n_free();
        if dim == 0 {
            demefit_bail!(InvalidConfig: "model has no free parameters");
        }
        if let Some(x0) = &self.x0 {
            if x0.len() != dim {
                demefit_bail!(InvalidConfig: "x0 has {} components, model has {}", x0.len(), dim);
            }
        }

        let mut seeds: Vec<Vec<f64>> = self.x0.into_iter().collect();
        if let Some(state) = self.resume {
            if state.names() != self.model.names().as_slice() {
                demefit_bail!(
                    InvalidConfig: "state parameters {:?} do not match the model's {:?}",
                    state.names(), self.model.names()
                );
            }
            seeds.extend(state.points().iter().map(|p| p.x.clone()));
        }

        let (lo, hi): (Vec<f64>, Vec<f64>) = self.model.bounds().into_iter().unzip();
        let np = self.points.unwrap_or_else(|| (10 * dim).max(4));

        Ok(DiffEv {
            model: self.model,
            schedule: self.stages.into_iter().collect(),
            points: Vec::with_capacity(np),
            np,
            best: 0,
            f: self.f,
            cr: self.cr,
            strategy: self.strategy,
            rng: SimRng::seed_from(self.seed),
            seeds,
            dim,
            lo,
            hi,
            index: 0,
            stage_index: 0,
            iters_left: 0,
            started: false,
            complete: false,
        })
    }
}

pub struct DiffEv<M: CostModel> {
    model: M,
    schedule: StageSchedule,
    points: Vec<Point>,
    np: usize,
    best: usize,
    f: f64,
    cr: f64,
    strategy: Strategy,
    rng: SimRng,
    seeds: Vec<Vec<f64>>,
    dim: usize,
    lo: Vec<f64>,
    hi: Vec<f64>,
    index: usize,
    stage_index: usize,
    iters_left: u64,
    started: bool,
    complete: bool,
}

impl<M: CostModel> DiffEv<M> {
    pub fn builder(model: M) -> DiffEvBuilder<M> {
        DiffEvBuilder::new(model)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Snapshot the current population for checkpointing.
    pub fn state(&self) -> DemefitResult<OptState> {
        OptState::new(
            self.model.names(),
            self.points
                .iter()
                .map(|p| StatePoint {
                    cost: p.cost,
                    x: p.x.clone(),
                })
                .collect(),
        )
    }

    /// Run the whole schedule and return the best point found.
    pub fn minimize(&mut self) -> DemefitResult<Fit> {
        loop {
            let generation = self.next()?;
            info!(
                "gen {:<5} | stage {} | reps {:>8} | best {:.6e}",
                generation.index(),
                generation.stage(),
                generation.replicates(),
                generation.best_cost(),
            );
            if generation.complete() {
                return Ok(Fit {
                    names: self.model.names(),
                    x: generation.best_x,
                    cost: generation.best_cost,
                    generations: generation.index,
                });
            }
        }
    }

    fn start(&mut self) -> DemefitResult<Stage> {
        let stage = self
            .schedule
            .current()
            .ok_or_else(|| demefit_err!(Engine: "stage schedule is empty"))?;
        self.model.set_replicates(stage.replicates);

        self.points.clear();
        for i in 0..self.np {
            let x = match self.seeds.get(i) {
                Some(seed) => {
                    let mut x = seed.clone();
                    for j in 0..self.dim {
                        x[j] = x[j].clamp(self.lo[j], self.hi[j]);
                    }
                    x
                }
                None => (0..self.dim)
                    .map(|j| self.lo[j] + self.rng.uniform() * (self.hi[j] - self.lo[j]))
                    .collect(),
            };
            let cost = self.model.cost(&x);
            self.points.push(Point { x, cost });
        }
        self.best = self.argmin();
        self.iters_left = stage.opt_iterations;
        self.started = true;
        Ok(stage)
    }

    fn argmin(&self) -> usize {
        let mut best = 0;
        for (i, p) in self.points.iter().enumerate() {
            if p.cost < self.points[best].cost {
                best = i;
            }
        }
        best
    }

    fn enter_stage(&mut self, stage: Stage) {
        self.stage_index += 1;
        self.model.set_replicates(stage.replicates);
        // scores from the previous stage were measured at a different
        // precision; refresh them so selection stays fair
        for i in 0..self.points.len() {
            let cost = self.model.cost(&self.points[i].x);
            self.points[i].cost = cost;
        }
        self.best = self.argmin();
        self.iters_left = stage.opt_iterations;
    }

    fn trial(&mut self, i: usize) -> Vec<f64> {
        let needed = match self.strategy {
            Strategy::Best1Bin => 2,
            Strategy::Rand1Bin => 3,
        };
        let mut picks: Vec<usize> = Vec::with_capacity(needed);
        while picks.len() < needed {
            let r = self.rng.below(self.np);
            if r != i && !picks.contains(&r) {
                picks.push(r);
            }
        }

        let base = match self.strategy {
            Strategy::Best1Bin => self.points[self.best].x.clone(),
            Strategy::Rand1Bin => self.points[picks[2]].x.clone(),
        };

        let mut trial = self.points[i].x.clone();
        let jrand = self.rng.below(self.dim);
        for j in 0..self.dim {
            if j == jrand || self.rng.uniform() < self.cr {
                let a = self.points[picks[0]].x[j];
                let b = self.points[picks[1]].x[j];
                let v = base[j] + self.f * (a - b);
                trial[j] = v.clamp(self.lo[j], self.hi[j]);
            }
        }
        trial
    }
}

impl<M: CostModel> Engine for DiffEv<M> {
    type Epoch = Generation;

    fn next(&mut self) -> DemefitResult<Generation> {
        if self.complete {
            demefit_bail!(Engine: "stage schedule exhausted");
        }

        let stage = match self.started {
            true => self
                .schedule
                .current()
                .ok_or_else(|| demefit_err!(Engine: "stage schedule is empty"))?,
            false => self.start()?,
        };
        let ran_stage = self.stage_index;

        for i in 0..self.np {
            let trial = self.trial(i);
            let cost = self.model.cost(&trial);
            if cost <= self.points[i].cost {
                self.points[i] = Point { x: trial, cost };
                if cost <= self.points[self.best].cost {
                    self.best = i;
                }
            }
        }

        self.index += 1;
        self.iters_left -= 1;
        if self.iters_left == 0 {
            self.schedule.advance();
            match self.schedule.current() {
                Some(next_stage) => self.enter_stage(next_stage),
                None => self.complete = true,
            }
        }

        let best = &self.points[self.best];
        Ok(Generation {
            index: self.index,
            stage: ran_stage,
            replicates: stage.replicates,
            best_x: best.x.clone(),
            best_cost: best.cost,
            complete: self.complete,
        })
    }
}
