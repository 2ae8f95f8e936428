//! Orquestación de corridas: el motor [`SchedulerEngine`] y su contexto
//! fluido [`RunCtx`].

pub mod core;
pub mod ctx;

pub use self::core::{EngineSettings, SchedulerEngine, SubmitOutcome, SubmitRequest};
pub use self::ctx::RunCtx;
