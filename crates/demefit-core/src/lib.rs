pub mod coalescent;
pub mod cost;
pub mod domain;
pub mod engine;
pub mod evaluator;
pub mod network;
pub mod params;
pub mod pattern;
pub mod problem;
pub mod tipid;

pub use coalescent::simulate_replicate;
pub use cost::{CostKind, divergence};
pub use domain::{SimRng, WorkerPool};
pub use engine::{Engine, EngineExt};
pub use evaluator::{EvalConfig, SimState, SpectrumEvaluator};
pub use network::{NetworkBuilder, PopNetwork, SampleIndex, Segment};
pub use params::{Bounds, ParamId, ParamKind, ParamStore, ParamStoreBuilder};
pub use pattern::PatternTable;
pub use problem::CostModel;
pub use tipid::TipId;

pub use demefit_error::{DemefitError, DemefitResult, ErrorCode};

pub mod prelude {
    pub use super::cost::{CostKind, divergence};
    pub use super::domain::{SimRng, WorkerPool};
    pub use super::engine::{Engine, EngineExt};
    pub use super::evaluator::{EvalConfig, SpectrumEvaluator};
    pub use super::network::{NetworkBuilder, PopNetwork, SampleIndex, Segment};
    pub use super::params::{Bounds, ParamId, ParamKind, ParamStore, ParamStoreBuilder};
    pub use super::pattern::PatternTable;
    pub use super::problem::CostModel;
    pub use super::tipid::TipId;
    pub use demefit_error::{DemefitError, DemefitResult};
}
