pub mod random_provider;
pub mod thread_pool;

pub use random_provider::SimRng;
pub use thread_pool::WorkerPool;
