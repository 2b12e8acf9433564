//! Page acquisition: backend fallback, challenge handling and retries.

mod orchestrator;
mod policy;

pub use orchestrator::Orchestrator;
pub use policy::AcquisitionPolicy;
