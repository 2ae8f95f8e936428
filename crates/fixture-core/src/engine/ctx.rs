//! Contexto fluido de una corrida: fija el plan y el id de corrida para
//! encadenar operaciones sin repetirlos en cada llamada.

use uuid::Uuid;

use fixture_domain::DayPlan;

use super::core::SchedulerEngine;
use crate::errors::EngineError;
use crate::event::RunEvent;
use crate::model::SchedulingRun;
use crate::store::{RunStore, StagingStore};

/// Vista de conveniencia sobre una corrida ya aceptada.
pub struct RunCtx<'a, R, S>
    where R: RunStore,
          S: StagingStore
{
    engine: &'a SchedulerEngine<R, S>,
    plan: &'a DayPlan,
    run_id: Uuid,
}

impl<'a, R, S> RunCtx<'a, R, S>
    where R: RunStore,
          S: StagingStore
{
    pub fn new(engine: &'a SchedulerEngine<R, S>, plan: &'a DayPlan, run_id: Uuid) -> Self {
        RunCtx { engine, plan, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Avanza la corrida hasta su cierre (o hasta su próxima falla
    /// recuperable).
    pub fn execute(&self) -> Result<SchedulingRun, EngineError> {
        self.engine.execute(self.plan, self.run_id)
    }

    pub fn status(&self) -> Result<SchedulingRun, EngineError> {
        self.engine.status(self.run_id)
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.engine.events(self.run_id)
    }

    pub fn abandon(&self) -> Result<SchedulingRun, EngineError> {
        self.engine.abandon(self.run_id)
    }
}
