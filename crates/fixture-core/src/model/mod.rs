//! Modelo de estado propiedad del motor: corridas, staging y restricciones
//! resueltas. Los datos del mundo (taxonomía, sedes, plan temporal) viven en
//! `fixture-domain`; aquí sólo está lo que una corrida produce o necesita
//! para reanudarse.

pub mod constraints;
pub mod run;
pub mod staging;

pub use constraints::{ConstraintSet, PairRule, SlotInfo, SnapshotPhase};
pub use run::{ErrorDetails, NewRun, ProcessType, ResumeCheckpoint, RunMetrics, RunStatus, RunType, SchedulingLock,
              SchedulingRun};
pub use staging::{ByeReason, DiffChange, DiffEntity, FinalByeEntry, FinalGameEntry, FinalStatus, P2Allocation,
                  P3ByeAllocation, P3GameAllocation, SavedBye, SavedGame, SavedStatus, StagingDiff};
