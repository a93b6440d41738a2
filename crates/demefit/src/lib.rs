//! Estimate parameters of a population-history model from the joint
//! site-frequency spectrum of several populations.
//!
//! Describe a network of populations — splits, admixtures, effective sizes,
//! epoch boundaries — with some parameters free, then search for the free
//! values whose simulated spectrum of polarized site patterns best matches
//! the observed one:
//!
//! ```no_run
//! use demefit::*;
//!
//! let mut params = ParamStore::builder();
//! let t0 = params.fixed("T0", ParamKind::Time, 0.0);
//! let tab = params.free("Tab", ParamKind::Time, 1.0, 0.0, 10.0);
//! let n = params.free("2N", ParamKind::TwoN, 100.0, 1.0, 1e5);
//! let store = params.build().unwrap();
//!
//! let (net, samples) = PopNetwork::builder()
//!     .segment("a", n, t0)
//!     .segment("b", n, t0)
//!     .segment("ab", n, tab)
//!     .samples("a", 1)
//!     .samples("b", 1)
//!     .derive("a", "ab")
//!     .derive("b", "ab")
//!     .build(&store)
//!     .unwrap();
//!
//! // normally loaded by the site-pattern reader
//! let observed: PatternTable = [(TipId(0b01), 0.5), (TipId(0b10), 0.5)]
//!     .into_iter()
//!     .collect();
//!
//! let config = EvalConfig {
//!     do_singletons: true, // two samples have no informative non-singletons
//!     ..EvalConfig::default()
//! };
//! let evaluator = SpectrumEvaluator::new(
//!     net, store, samples, observed,
//!     Bounds::default(), config,
//! ).unwrap();
//!
//! let mut engine = DiffEv::builder(evaluator)
//!     .stage(1000, 1_000)
//!     .stage(100, 100_000)
//!     .build()
//!     .unwrap();
//!
//! let fit = engine.minimize().unwrap();
//! println!("{:?} -> {}", fit.x, fit.cost);
//! ```

pub use demefit_core::*;
pub use demefit_engines::{
    DiffEv, DiffEvBuilder, Fit, Generation, OptState, Stage, StageSchedule, StatePoint, Strategy,
    init_logging,
};
pub use demefit_error::{DemefitError, DemefitResult, demefit_err, ensure};

pub mod prelude {
    pub use demefit_core::prelude::*;
    pub use demefit_engines::{DiffEv, Fit, Stage, StageSchedule, Strategy};
}
