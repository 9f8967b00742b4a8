pub use messages::WorkerEnvelope;
pub use messages::WorkerRequest;
pub use messages::WorkerResponse;
pub use messages::WorkerStatus;
pub use pool::WorkerPool;

mod messages;
mod pool;
mod worker;
