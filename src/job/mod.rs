pub mod ingest;
pub mod latency;
pub mod scheduler;
pub mod status;
pub mod strategy;

pub use scheduler::{StartRequest, WindowScheduler};
pub use status::JobStatus;
pub use strategy::{CredentialStrategy, FailurePolicy};
