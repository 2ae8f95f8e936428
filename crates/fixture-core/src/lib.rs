//! fixture-core: motor determinista de programación de jornadas.
pub mod checkpoint;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod phase;
pub mod resolver;
pub mod store;

pub use engine::{EngineSettings, RunCtx, SchedulerEngine, SubmitOutcome, SubmitRequest};
pub use errors::{codes, EngineError, ErrorCode};
pub use event::{EventStore, InMemoryEventStore, Recorder, RunEvent, RunStage, Severity};
pub use model::{ByeReason, ConstraintSet, FinalByeEntry, FinalGameEntry, NewRun, ProcessType, ResumeCheckpoint,
                RunMetrics, RunStatus, RunType, SchedulingRun};
pub use store::memory::{InMemoryRunStore, InMemoryStagingStore};
pub use store::{RunOutcome, RunStore, StagingStore, Submission};
