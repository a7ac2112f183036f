pub mod clock;
pub mod job;
pub mod orchestrator;
pub mod runtime;
pub mod status;

pub use clock::{Clock, ManualClock};
pub use job::{JobCommand, JobContext, JobDefinition, JobStatus};
pub use orchestrator::{Orchestrator, OrchestratorOptions, TickReport};
pub use runtime::{JobLogger, RecurringJob, RuntimeState};
