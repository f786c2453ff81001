// Process module - Launching, monitoring, and restarting supervised processes

pub mod monitor;
pub mod restart;
pub mod spawner;
pub mod stats;
pub mod store;
pub mod supervisor;
mod types;

pub use monitor::{watch, ExitWatch};
pub use restart::{decide, BackoffStrategy, GiveUpReason, RestartDecision, RestartPolicy};
pub use spawner::launch;
pub use stats::{ResourceSampler, ResourceUsage};
pub use store::SpecStore;
pub use supervisor::{ProcessSnapshot, Supervisor};
pub use types::{ExitEvent, ExitStatus, ProcessHandle, ProcessSpec, ProcessState};
