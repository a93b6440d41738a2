//! The minimal engine abstraction the optimizer drivers implement.

use demefit_error::DemefitResult;

/// An iterative optimization engine.
///
/// Implementors define how one step of the search advances; `Epoch` carries
/// whatever the caller needs to monitor progress and decide termination.
pub trait Engine {
    type Epoch;

    /// Advance the engine by one step.
    fn next(&mut self) -> DemefitResult<Self::Epoch>;
}

/// Convenience runner for any [Engine].
pub trait EngineExt<E: Engine> {
    /// Step the engine until `limit` returns true, yielding the final epoch.
    fn run<F>(&mut self, limit: F) -> DemefitResult<E::Epoch>
    where
        F: Fn(&E::Epoch) -> bool;
}

impl<E> EngineExt<E> for E
where
    E: Engine,
{
    fn run<F>(&mut self, limit: F) -> DemefitResult<E::Epoch>
    where
        F: Fn(&E::Epoch) -> bool,
    {
        loop {
            let epoch = self.next()?;
            if limit(&epoch) {
                return Ok(epoch);
            }
        }
    }
}
