pub mod diffev;
pub mod schedule;
pub mod state;

pub use diffev::{DiffEv, DiffEvBuilder, Fit, Generation, Strategy};
pub use schedule::{Stage, StageSchedule};
pub use state::{OptState, StatePoint};

pub use demefit_core::*;
pub use demefit_error::{DemefitError, demefit_err, ensure};

pub fn init_logging() {
    pub use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .compact(),
            )
            .init();
    });
}
