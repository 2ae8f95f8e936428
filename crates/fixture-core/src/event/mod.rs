//! Eventos de corrida: tipos, almacenamiento append-only y grabador.

pub mod recorder;
pub mod store;
pub mod types;

pub use recorder::Recorder;
pub use store::{EventStore, InMemoryEventStore};
pub use types::{RunEvent, RunStage, Severity};
