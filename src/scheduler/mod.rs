pub mod job;
pub mod liveness;
pub mod queue;
pub mod results;

pub use job::{Credentials, Job, JobId, JobResult, JobStatus, LoginRequest, ResultReport};
pub use liveness::LivenessTracker;
pub use queue::JobQueue;
pub use results::ResultStore;
