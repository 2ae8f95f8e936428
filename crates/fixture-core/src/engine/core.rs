//! Orquestador de corridas.
//!
//! [`SchedulerEngine`] es la máquina de estados que lleva una corrida desde
//! la solicitud hasta el programa final publicado. El ciclo completo:
//!
//! 1. `submit` valida la solicitud contra el plan de jornada, toma el
//!    fingerprint de configuración y delega en [`RunStore::begin`] la
//!    creación atómica (idempotencia + candado de jornada).
//! 2. `execute` marca la corrida `RUNNING` y la conduce por sus fases en
//!    orden de checkpoint: fase 2 (franjas), fase 3 (emparejamiento y
//!    byes) y finalización. Cada fase cierra con snapshot + avance de
//!    checkpoint, de modo que un corte en cualquier punto deja la corrida
//!    reanudable desde la última frontera durable.
//! 3. Los errores de negocio cierran la corrida como `FAILED` con su
//!    entrada de catálogo; los de infraestructura la dejan `RUNNING` con el
//!    candado retenido para que un reintento reanude donde quedó.
//!
//! Las fases mismas son funciones puras en [`crate::phase`]; este módulo es
//! el único que genera ids, toma timestamps y habla con los stores.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

use fixture_domain::{DayPlan, Round};

use crate::checkpoint;
use crate::constants::{DEFAULT_CONSTRAINT_ERROR_THRESHOLD, DEFAULT_PROGRESS_GUARD_FACTOR, SCHEMA_VERSION};
use crate::errors::EngineError;
use crate::event::{EventStore, InMemoryEventStore, Recorder, RunEvent, RunStage};
use crate::model::{ConstraintSet, DiffEntity, NewRun, P2Allocation, P3ByeAllocation, P3GameAllocation, ProcessType,
                   ResumeCheckpoint, RunMetrics, RunStatus, RunType, SavedStatus, SchedulingRun, SnapshotPhase,
                   StagingDiff};
use crate::phase::{finalise, p2, p3};
use crate::resolver::{composite_fingerprint, resolve, scoped_rounds, settings_for_rounds};
use crate::store::memory::{InMemoryRunStore, InMemoryStagingStore};
use crate::store::{byes_by_reason, RunOutcome, RunStore, StagingStore, Submission};

use super::ctx::RunCtx;

/// Parámetros operativos del motor. `Default` toma los valores del catálogo
/// de constantes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Fracción máxima de demanda con errores de restricción tolerada al
    /// cierre de cada fase.
    pub constraint_error_threshold: f64,
    /// Factor del guardián de progreso del emparejamiento.
    pub progress_guard_factor: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings { constraint_error_threshold: DEFAULT_CONSTRAINT_ERROR_THRESHOLD,
                         progress_guard_factor: DEFAULT_PROGRESS_GUARD_FACTOR }
    }
}

/// Solicitud de corrida. `round_ids` vacío significa "todas las rondas del
/// plan, en orden de juego".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub season_id: i32,
    pub season_day_id: i32,
    pub process_type: ProcessType,
    pub run_type: Option<RunType>,
    pub round_ids: Vec<i32>,
    pub seed_master: String,
    pub idempotency_key: String,
}

/// Salida de [`SchedulerEngine::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Corrida nueva, candado adquirido.
    Created(SchedulingRun),
    /// La clave de idempotencia ya tenía corrida no abandonada; se devuelve
    /// sin mutar nada.
    Replayed(SchedulingRun),
    /// Otra corrida activa sostiene el candado de la jornada.
    LockConflict { season_day_id: i32, holder: Uuid },
}

impl SubmitOutcome {
    /// Corrida aceptada (nueva o reproducida), si la hay.
    pub fn run(&self) -> Option<&SchedulingRun> {
        match self {
            SubmitOutcome::Created(run) | SubmitOutcome::Replayed(run) => Some(run),
            SubmitOutcome::LockConflict { .. } => None,
        }
    }
}

/// Política de fallas: los errores de negocio cierran la corrida como
/// `FAILED`; los de almacenamiento o defecto interno la dejan `RUNNING`
/// (candado retenido) para reintentar desde el último checkpoint.
fn fails_run(err: &EngineError) -> bool {
    !matches!(err,
              EngineError::Storage(_) | EngineError::Internal(_) | EngineError::RunNotFound(_)
              | EngineError::NotActive(_))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Internal(format!("staging serialize: {e}")))
}

/// Motor de programación sobre un par de stores y un log de eventos.
pub struct SchedulerEngine<R, S>
    where R: RunStore,
          S: StagingStore
{
    runs: R,
    staging: S,
    events: Arc<dyn EventStore + Send + Sync>,
    recorder: Recorder,
    settings: EngineSettings,
}

impl SchedulerEngine<InMemoryRunStore, InMemoryStagingStore> {
    /// Motor completo en memoria, para pruebas y demos.
    pub fn in_memory() -> Self {
        Self::new_with_stores(InMemoryRunStore::new(),
                              InMemoryStagingStore::new(),
                              Arc::new(InMemoryEventStore::new()))
    }
}

impl<R, S> SchedulerEngine<R, S>
    where R: RunStore,
          S: StagingStore
{
    pub fn new_with_stores(runs: R, staging: S, events: Arc<dyn EventStore + Send + Sync>) -> Self {
        let recorder = Recorder::new(events.clone());
        SchedulerEngine { runs, staging, events, recorder, settings: EngineSettings::default() }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Acceso de sólo lectura al store de corridas.
    pub fn runs(&self) -> &R {
        &self.runs
    }

    /// Acceso de sólo lectura al área de staging y programa final.
    pub fn staging(&self) -> &S {
        &self.staging
    }

    /// Contexto fluido sobre una corrida ya aceptada.
    pub fn ctx<'a>(&'a self, plan: &'a DayPlan, run_id: Uuid) -> RunCtx<'a, R, S> {
        RunCtx::new(self, plan, run_id)
    }

    pub fn status(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        self.runs.get(run_id)
    }

    pub fn events(&self, run_id: Uuid) -> Vec<RunEvent> {
        self.events.list(run_id)
    }

    /// Acepta una solicitud de corrida. No ejecuta nada: la corrida queda
    /// `PENDING` con checkpoint `BEFORE_P2`.
    pub fn submit(&self, plan: &DayPlan, req: SubmitRequest) -> Result<SubmitOutcome, EngineError> {
        let day = plan.season_day();
        if req.season_id != day.season_id {
            return Err(EngineError::Validation(format!("la temporada {} no corresponde al plan (temporada {})",
                                                       req.season_id, day.season_id)));
        }
        if req.season_day_id != day.season_day_id {
            return Err(EngineError::Validation(format!("la jornada {} no corresponde al plan (jornada {})",
                                                       req.season_day_id, day.season_day_id)));
        }
        if req.seed_master.trim().is_empty() {
            return Err(EngineError::Validation("seed_master vacío".to_string()));
        }
        if req.idempotency_key.trim().is_empty() {
            return Err(EngineError::Validation("idempotency_key vacía".to_string()));
        }
        let round_ids: Vec<i32> = if req.round_ids.is_empty() {
            plan.rounds_ordered().iter().map(|r| r.round_id).collect()
        } else {
            req.round_ids.clone()
        };
        scoped_rounds(plan, &round_ids)?;
        let config_hash = composite_fingerprint(plan, &round_ids)?;

        let submission = self.runs.begin(NewRun { season_id: req.season_id,
                                                  season_day_id: req.season_day_id,
                                                  process_type: req.process_type,
                                                  run_type: req.run_type,
                                                  round_ids,
                                                  seed_master: req.seed_master,
                                                  config_hash,
                                                  idempotency_key: req.idempotency_key })?;
        Ok(match submission {
            Submission::Created(run) => {
                self.recorder.info(run.run_id,
                                   RunStage::Step1,
                                   "corrida aceptada",
                                   Some(json!({ "season_day_id": run.season_day_id,
                                                "process_type": run.process_type.as_str(),
                                                "rounds": run.round_ids })));
                SubmitOutcome::Created(run)
            }
            Submission::Replayed(run) => SubmitOutcome::Replayed(run),
            Submission::LockHeld { season_day_id, holder } => SubmitOutcome::LockConflict { season_day_id, holder },
        })
    }

    /// Conduce una corrida hasta su cierre. Idempotente sobre corridas
    /// terminales (devuelve el estado tal cual); sobre una corrida con
    /// checkpoint avanzado reanuda desde la fase pendiente.
    pub fn execute(&self, plan: &DayPlan, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let run = self.runs.get(run_id)?;
        if run.run_status.is_terminal() {
            return Ok(run);
        }
        let run = match self.runs.mark_running(run_id) {
            Ok(run) => run,
            Err(EngineError::NotActive(_)) => {
                // Carrera con un abandono concurrente.
                let current = self.runs.get(run_id)?;
                if current.run_status == RunStatus::Abandoned {
                    return Ok(current);
                }
                return Err(EngineError::NotActive(run_id));
            }
            Err(e) => return Err(e),
        };

        match self.drive(plan, run) {
            Ok(run) => Ok(run),
            Err((stage, err)) if fails_run(&err) => {
                self.recorder.error(run_id, stage, &err.to_string(), Some(json!({ "code": err.code().code })));
                let metrics = self.try_metrics(plan, run_id);
                let outcome = RunOutcome::failed(metrics, &err, json!({ "stage": stage.as_str() }));
                match self.runs.finish(run_id, outcome) {
                    Ok(failed) => Ok(failed),
                    // Un abandono ganó la carrera; el estado vigente manda.
                    Err(EngineError::NotActive(_)) => self.runs.get(run_id),
                    Err(e) => Err(e),
                }
            }
            Err((stage, err)) => {
                self.recorder.error(run_id,
                                    stage,
                                    &err.to_string(),
                                    Some(json!({ "code": err.code().code, "recoverable": true })));
                Err(err)
            }
        }
    }

    /// `PENDING|RUNNING -> ABANDONED`: detiene la corrida en su próxima
    /// frontera de fase y libera el candado de la jornada.
    pub fn abandon(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let run = self.runs.abandon(run_id)?;
        self.recorder.info(run_id,
                           stage_after(run.resume_checkpoint),
                           "corrida abandonada",
                           Some(json!({ "resume_checkpoint": run.resume_checkpoint.as_str() })));
        Ok(run)
    }

    fn drive(&self, plan: &DayPlan, run: SchedulingRun) -> Result<SchedulingRun, (RunStage, EngineError)> {
        let run_id = run.run_id;
        let e1 = |e: EngineError| (RunStage::Step1, e);

        if run.resume_checkpoint > ResumeCheckpoint::BeforeP2 {
            self.recorder.info(run_id,
                               stage_after(run.resume_checkpoint),
                               "corrida reanudada",
                               Some(json!({ "resume_checkpoint": run.resume_checkpoint.as_str() })));
        }

        // Paso 1: el plan vigente debe producir el mismo fingerprint que al
        // aceptar la corrida; si la configuración cambió bajo nuestros pies
        // la corrida no puede seguir siendo determinista.
        let actual = composite_fingerprint(plan, &run.round_ids).map_err(e1)?;
        if actual != run.config_hash {
            return Err(e1(EngineError::FingerprintMismatch { expected: run.config_hash.clone(), actual }));
        }
        let rounds = scoped_rounds(plan, &run.round_ids).map_err(e1)?;
        let mut cs_by_setting: BTreeMap<i32, ConstraintSet> = BTreeMap::new();
        let mut warning_count = 0usize;
        for number in settings_for_rounds(plan, &run.round_ids).map_err(e1)? {
            let cs = resolve(plan, number).map_err(e1)?;
            for warning in &cs.warnings {
                self.recorder.warn(run_id,
                                   RunStage::Step1,
                                   warning,
                                   Some(json!({ "round_settings_number": number })));
            }
            warning_count += cs.warnings.len();
            cs_by_setting.insert(number, cs);
        }
        let s1 = if warning_count == 0 { "PASSED" } else { "PASSED_WITH_WARNINGS" };
        self.runs.set_s1_results(run_id, s1).map_err(e1)?;
        self.staging
            .save_constraints(run_id, SnapshotPhase::Composite, constraints_doc(&cs_by_setting).map_err(e1)?)
            .map_err(e1)?;
        self.recorder.info(run_id,
                           RunStage::Step1,
                           "restricciones resueltas",
                           Some(json!({ "settings": cs_by_setting.len(),
                                        "warnings": warning_count,
                                        "results": s1 })));

        let mut run = run;
        if run.resume_checkpoint == ResumeCheckpoint::BeforeP2 {
            if let Some(stopped) = self.stop_if_abandoned(run_id).map_err(|e| (RunStage::Step2, e))? {
                return Ok(stopped);
            }
            run = self.run_p2(&run, &rounds, &cs_by_setting)?;
        }
        if run.resume_checkpoint == ResumeCheckpoint::AfterP2BeforeP3 {
            if let Some(stopped) = self.stop_if_abandoned(run_id).map_err(|e| (RunStage::Step3, e))? {
                return Ok(stopped);
            }
            run = self.run_p3(plan, &run, &rounds, &cs_by_setting)?;
        }
        if run.resume_checkpoint == ResumeCheckpoint::AfterP3BeforeFinalise {
            if let Some(stopped) = self.stop_if_abandoned(run_id).map_err(|e| (RunStage::Finalise, e))? {
                return Ok(stopped);
            }
            run = self.run_finalise(plan, &run)?;
        }

        let efin = |e: EngineError| (RunStage::Finalise, e);
        let metrics = self.collect_metrics(run_id, &rounds, &cs_by_setting).map_err(efin)?;
        match self.runs.finish(run_id, RunOutcome::succeeded(metrics)) {
            Ok(finished) => {
                self.recorder.info(run_id,
                                   RunStage::Finalise,
                                   "corrida cerrada",
                                   Some(json!({ "run_status": finished.run_status.as_str() })));
                Ok(finished)
            }
            Err(EngineError::NotActive(_)) => {
                let current = self.runs.get(run_id).map_err(efin)?;
                if current.run_status == RunStatus::Abandoned {
                    Ok(current)
                } else {
                    Err(efin(EngineError::NotActive(run_id)))
                }
            }
            Err(e) => Err(efin(e)),
        }
    }

    /// Fase 2: reclamo de franjas por ranking de cancha. Las rondas son
    /// independientes entre sí, así que se calculan en paralelo; la
    /// persistencia va después, en orden de ronda, para que el staging
    /// quede en orden de reclamo.
    fn run_p2(&self,
              run: &SchedulingRun,
              rounds: &[&Round],
              cs_by_setting: &BTreeMap<i32, ConstraintSet>)
              -> Result<SchedulingRun, (RunStage, EngineError)> {
        let run_id = run.run_id;
        let e2 = |e: EngineError| (RunStage::Step2, e);
        let e4 = |e: EngineError| (RunStage::Step4, e);

        // Una fase interrumpida se rehace desde cero; sus restos se
        // descartan dejando rastro en el diff.
        let stale = self.staging.list_p2(run_id).map_err(e2)?;
        if !stale.is_empty() {
            for row in &stale {
                let before = to_json(row).map_err(e2)?;
                self.staging
                    .record_diff(StagingDiff::remove(run_id,
                                                     DiffEntity::P2Allocation,
                                                     row.p2_allocation_id.to_string(),
                                                     before))
                    .map_err(e2)?;
            }
            self.staging.clear_p2(run_id).map_err(e2)?;
            self.recorder.info(run_id,
                               RunStage::Step2,
                               "staging de fase 2 anterior descartado",
                               Some(json!({ "rows": stale.len() })));
        }
        self.staging
            .save_constraints(run_id, SnapshotPhase::P2, constraints_doc(cs_by_setting).map_err(e2)?)
            .map_err(e2)?;

        let mut jobs: Vec<(&Round, &ConstraintSet)> = Vec::with_capacity(rounds.len());
        for &round in rounds {
            let cs = cs_by_setting.get(&round.round_settings_number)
                                  .ok_or_else(|| e2(EngineError::Internal(format!("configuración {} sin resolver",
                                                                                  round.round_settings_number))))?;
            jobs.push((round, cs));
        }
        let seed = run.seed_master.as_str();
        let reports: Vec<p2::P2RoundReport> =
            jobs.par_iter().map(|(round, cs)| p2::allocate_round(round, cs, seed)).collect();

        let mut staged: Vec<P2Allocation> = Vec::new();
        for report in &reports {
            for claim in &report.claims {
                let row = P2Allocation { p2_allocation_id: Uuid::new_v4(),
                                         run_id,
                                         round_id: claim.round_id,
                                         age_id: claim.age_id,
                                         grade_id: claim.grade_id,
                                         court_time_id: claim.court_time_id,
                                         created_at: Utc::now() };
                self.staging.add_p2(row.clone()).map_err(e2)?;
                let after = to_json(&row).map_err(e2)?;
                self.staging
                    .record_diff(StagingDiff::add(run_id,
                                                  DiffEntity::P2Allocation,
                                                  row.p2_allocation_id.to_string(),
                                                  after))
                    .map_err(e2)?;
                staged.push(row);
            }
            for note in report.notes() {
                self.recorder.constraint(run_id, RunStage::Step2, &note.message, note.context);
            }
        }

        let demand: u32 = reports.iter().map(|r| r.demand).sum();
        let allocated: u32 = reports.iter().map(p2::P2RoundReport::allocated).sum();
        let unmet: u32 = reports.iter().map(p2::P2RoundReport::unmet).sum();
        self.recorder.info(run_id,
                           RunStage::Step2,
                           "fase 2 completada",
                           Some(json!({ "demand": demand, "allocated": allocated, "unmet": unmet })));
        self.check_threshold("P2", unmet, demand).map_err(e2)?;

        self.verify_lock(run).map_err(e4)?;
        self.staging
            .save_snapshot(run_id, SavedStatus::AfterP2BeforeP3, checkpoint::saved_from_p2(&staged), Vec::new())
            .map_err(e4)?;
        self.runs.set_checkpoint(run_id, ResumeCheckpoint::AfterP2BeforeP3).map_err(e4)?;
        self.recorder.info(run_id,
                           RunStage::Step4,
                           "checkpoint AFTER_P2_BEFORE_P3 guardado",
                           Some(json!({ "slots": staged.len() })));
        self.runs.get(run_id).map_err(e4)
    }

    /// Fase 3: emparejamiento round-robin y byes sobre las franjas
    /// reclamadas, ronda por ronda en orden de juego.
    fn run_p3(&self,
              plan: &DayPlan,
              run: &SchedulingRun,
              rounds: &[&Round],
              cs_by_setting: &BTreeMap<i32, ConstraintSet>)
              -> Result<SchedulingRun, (RunStage, EngineError)> {
        let run_id = run.run_id;
        let e3 = |e: EngineError| (RunStage::Step3, e);
        let e4 = |e: EngineError| (RunStage::Step4, e);

        let stale_games = self.staging.list_games(run_id).map_err(e3)?;
        let stale_byes = self.staging.list_byes(run_id).map_err(e3)?;
        if !stale_games.is_empty() || !stale_byes.is_empty() {
            for row in &stale_games {
                let before = to_json(row).map_err(e3)?;
                self.staging
                    .record_diff(StagingDiff::remove(run_id,
                                                     DiffEntity::P3Allocation,
                                                     row.p3_game_allocation_id.to_string(),
                                                     before))
                    .map_err(e3)?;
            }
            for row in &stale_byes {
                let before = to_json(row).map_err(e3)?;
                self.staging
                    .record_diff(StagingDiff::remove(run_id,
                                                     DiffEntity::P3Allocation,
                                                     row.p3_bye_allocation_id.to_string(),
                                                     before))
                    .map_err(e3)?;
            }
            self.staging.clear_p3(run_id).map_err(e3)?;
            self.recorder.info(run_id,
                               RunStage::Step3,
                               "staging de fase 3 anterior descartado",
                               Some(json!({ "games": stale_games.len(), "byes": stale_byes.len() })));
        }
        self.staging
            .save_constraints(run_id, SnapshotPhase::P3, constraints_doc(cs_by_setting).map_err(e3)?)
            .map_err(e3)?;

        let p2_rows = self.staging.list_p2(run_id).map_err(e3)?;
        let mut staged_games: Vec<P3GameAllocation> = Vec::new();
        let mut staged_byes: Vec<P3ByeAllocation> = Vec::new();
        let mut attempted = 0u32;
        let mut unplaced = 0u32;
        for &round in rounds {
            let cs = cs_by_setting.get(&round.round_settings_number)
                                  .ok_or_else(|| e3(EngineError::Internal(format!("configuración {} sin resolver",
                                                                                  round.round_settings_number))))?;
            let for_round: Vec<P2Allocation> =
                p2_rows.iter().filter(|r| r.round_id == round.round_id).cloned().collect();
            let outcome = p3::pair_round(plan,
                                         round,
                                         cs,
                                         &for_round,
                                         &run.seed_master,
                                         self.settings.progress_guard_factor);
            for game in &outcome.games {
                let row = P3GameAllocation { p3_game_allocation_id: Uuid::new_v4(),
                                             run_id,
                                             p2_allocation_id: game.from_p2,
                                             round_id: game.round_id,
                                             age_id: game.age_id,
                                             grade_id: game.grade_id,
                                             team_a_id: game.team_a_id,
                                             team_b_id: game.team_b_id,
                                             court_time_id: game.court_time_id,
                                             created_at: Utc::now() };
                self.staging.add_game(row.clone()).map_err(e3)?;
                let after = to_json(&row).map_err(e3)?;
                self.staging
                    .record_diff(StagingDiff::add(run_id,
                                                  DiffEntity::P3Allocation,
                                                  row.p3_game_allocation_id.to_string(),
                                                  after))
                    .map_err(e3)?;
                staged_games.push(row);
            }
            for bye in &outcome.byes {
                let row = P3ByeAllocation { p3_bye_allocation_id: Uuid::new_v4(),
                                            run_id,
                                            round_id: bye.round_id,
                                            age_id: bye.age_id,
                                            grade_id: bye.grade_id,
                                            team_id: bye.team_id,
                                            bye_reason: bye.reason,
                                            created_at: Utc::now() };
                self.staging.add_bye(row.clone()).map_err(e3)?;
                let after = to_json(&row).map_err(e3)?;
                self.staging
                    .record_diff(StagingDiff::add(run_id,
                                                  DiffEntity::P3Allocation,
                                                  row.p3_bye_allocation_id.to_string(),
                                                  after))
                    .map_err(e3)?;
                staged_byes.push(row);
            }
            for note in outcome.notes {
                self.recorder.constraint(run_id, RunStage::Step3, &note.message, note.context);
            }
            attempted += outcome.pairings_attempted;
            unplaced += outcome.pairs_unplaced;
            if let Some(fatal) = outcome.fatal {
                // El bye ERROR_LOOP ya quedó asentado arriba; la evidencia
                // sobrevive al cierre de la corrida.
                return Err(e3(fatal));
            }
        }
        self.check_threshold("P3", unplaced, attempted).map_err(e3)?;
        self.recorder.info(run_id,
                           RunStage::Step3,
                           "fase 3 completada",
                           Some(json!({ "games": staged_games.len(),
                                        "byes": staged_byes.len(),
                                        "pairings_attempted": attempted,
                                        "pairs_unplaced": unplaced })));

        self.verify_lock(run).map_err(e4)?;
        let (games, byes) = checkpoint::saved_from_p3(SavedStatus::AfterP3BeforeFinalise, &staged_games, &staged_byes);
        self.staging.save_snapshot(run_id, SavedStatus::AfterP3BeforeFinalise, games, byes).map_err(e4)?;
        self.runs.set_checkpoint(run_id, ResumeCheckpoint::AfterP3BeforeFinalise).map_err(e4)?;
        self.recorder.info(run_id,
                           RunStage::Step4,
                           "checkpoint AFTER_P3_BEFORE_FINALISE guardado",
                           Some(json!({ "games": staged_games.len(), "byes": staged_byes.len() })));
        self.runs.get(run_id).map_err(e4)
    }

    /// Finalización: denormaliza el staging al programa final y lo publica
    /// de una pieza para las rondas de la corrida.
    fn run_finalise(&self, plan: &DayPlan, run: &SchedulingRun) -> Result<SchedulingRun, (RunStage, EngineError)> {
        let run_id = run.run_id;
        let ef = |e: EngineError| (RunStage::Finalise, e);
        let e4 = |e: EngineError| (RunStage::Step4, e);

        // La publicación es el único efecto fuera del área de staging; el
        // candado se verifica antes de tocarla.
        self.verify_lock(run).map_err(ef)?;
        let staged_games = self.staging.list_games(run_id).map_err(ef)?;
        let staged_byes = self.staging.list_byes(run_id).map_err(ef)?;
        let batch =
            finalise::build_final_batch(plan, run_id, &run.round_ids, &staged_games, &staged_byes).map_err(ef)?;
        let (old_games, old_byes) = self.staging.final_schedule(&batch.round_ids).map_err(ef)?;
        let diffs = finalise::diff_against_existing(run_id, &batch, &old_games, &old_byes);
        let diff_count = diffs.len();
        for diff in diffs {
            self.staging.record_diff(diff).map_err(ef)?;
        }
        let finalise::FinalBatch { round_ids, games, byes } = batch;
        let (game_count, bye_count) = (games.len(), byes.len());
        self.staging.publish_final(run_id, &round_ids, games, byes).map_err(ef)?;
        self.recorder.info(run_id,
                           RunStage::Finalise,
                           "programa final publicado",
                           Some(json!({ "rounds": round_ids,
                                        "games": game_count,
                                        "byes": bye_count,
                                        "diffs": diff_count })));

        let (games, byes) = checkpoint::saved_from_p3(SavedStatus::Finalised, &staged_games, &staged_byes);
        self.staging.save_snapshot(run_id, SavedStatus::Finalised, games, byes).map_err(e4)?;
        self.runs.set_checkpoint(run_id, ResumeCheckpoint::Finalised).map_err(e4)?;
        self.recorder.info(run_id, RunStage::Step4, "checkpoint FINALISED guardado", None);
        self.runs.get(run_id).map_err(e4)
    }

    /// La corrida debe seguir sosteniendo el candado de su jornada antes de
    /// cada escritura de checkpoint.
    fn verify_lock(&self, run: &SchedulingRun) -> Result<(), EngineError> {
        match self.runs.lock_holder(run.season_day_id)? {
            Some(lock) if lock.run_id == run.run_id => Ok(()),
            Some(lock) => Err(EngineError::Conflict(format!("el candado de la jornada {} pasó a la corrida {}",
                                                            run.season_day_id, lock.run_id))),
            None => Err(EngineError::Conflict(format!("la corrida perdió el candado de la jornada {}",
                                                      run.season_day_id))),
        }
    }

    /// Umbral de errores de restricción al cierre de fase. El umbral es
    /// inclusivo: exactamente la fracción configurada todavía pasa.
    fn check_threshold(&self, phase: &str, errors: u32, demand: u32) -> Result<(), EngineError> {
        if demand == 0 || errors == 0 {
            return Ok(());
        }
        if f64::from(errors) / f64::from(demand) > self.settings.constraint_error_threshold {
            return Err(EngineError::ThresholdExceeded { phase: phase.to_string(), errors, demand });
        }
        Ok(())
    }

    /// Frontera de fase: un abandono concurrente detiene el avance sin
    /// marcar falla.
    fn stop_if_abandoned(&self, run_id: Uuid) -> Result<Option<SchedulingRun>, EngineError> {
        let run = self.runs.get(run_id)?;
        if run.run_status == RunStatus::Abandoned {
            Ok(Some(run))
        } else {
            Ok(None)
        }
    }

    fn collect_metrics(&self,
                       run_id: Uuid,
                       rounds: &[&Round],
                       cs_by_setting: &BTreeMap<i32, ConstraintSet>)
                       -> Result<RunMetrics, EngineError> {
        let p2_rows = self.staging.list_p2(run_id)?;
        let games = self.staging.list_games(run_id)?;
        let byes = self.staging.list_byes(run_id)?;
        let p2_demand: u32 = rounds.iter()
                                   .map(|r| {
                                       cs_by_setting.get(&r.round_settings_number)
                                                    .map_or(0, ConstraintSet::total_demand)
                                   })
                                   .sum();
        let p2_allocated = p2_rows.len() as u32;
        // Una fase repetida tras un corte re-emite sus mismos mensajes; el
        // conteo es sobre (etapa, mensaje) distintos.
        let constraint_errors = self.events
                                    .list(run_id)
                                    .iter()
                                    .filter(|e| e.is_constraint_error())
                                    .map(|e| (e.stage.as_str(), e.event_message.clone()))
                                    .collect::<BTreeSet<_>>()
                                    .len() as u32;
        Ok(RunMetrics { schema_version: SCHEMA_VERSION,
                        p2_demand,
                        p2_allocated,
                        p2_unmet: p2_demand.saturating_sub(p2_allocated),
                        games_scheduled: games.len() as u32,
                        byes_total: byes.len() as u32,
                        byes_by_reason: byes_by_reason(&byes),
                        constraint_errors })
    }

    /// Métricas de mejor esfuerzo para el cierre de una corrida fallida. Si
    /// el plan ya no resuelve, la corrida cierra sin métricas.
    fn try_metrics(&self, plan: &DayPlan, run_id: Uuid) -> Option<RunMetrics> {
        let run = self.runs.get(run_id).ok()?;
        let rounds = scoped_rounds(plan, &run.round_ids).ok()?;
        let mut cs_by_setting = BTreeMap::new();
        for number in settings_for_rounds(plan, &run.round_ids).ok()? {
            cs_by_setting.insert(number, resolve(plan, number).ok()?);
        }
        self.collect_metrics(run_id, &rounds, &cs_by_setting).ok()
    }
}

/// Etapa que ejecutaría a continuación una corrida parada en `checkpoint`.
fn stage_after(checkpoint: ResumeCheckpoint) -> RunStage {
    match checkpoint {
        ResumeCheckpoint::BeforeP2 => RunStage::Step2,
        ResumeCheckpoint::AfterP2BeforeP3 => RunStage::Step3,
        ResumeCheckpoint::AfterP3BeforeFinalise | ResumeCheckpoint::Finalised => RunStage::Finalise,
    }
}

fn constraints_doc(cs_by_setting: &BTreeMap<i32, ConstraintSet>) -> Result<Value, EngineError> {
    let mut settings = Vec::with_capacity(cs_by_setting.len());
    for cs in cs_by_setting.values() {
        settings.push(cs.to_snapshot()?);
    }
    Ok(json!({ "schema_version": SCHEMA_VERSION, "settings": settings }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_come_from_the_catalog() {
        let settings = EngineSettings::default();
        assert_eq!(settings.constraint_error_threshold, DEFAULT_CONSTRAINT_ERROR_THRESHOLD);
        assert_eq!(settings.progress_guard_factor, DEFAULT_PROGRESS_GUARD_FACTOR);
    }

    #[test]
    fn threshold_is_inclusive() {
        let engine = SchedulerEngine::in_memory();
        assert!(engine.check_threshold("P2", 25, 100).is_ok());
        assert!(engine.check_threshold("P2", 26, 100).is_err());
        assert!(engine.check_threshold("P2", 0, 0).is_ok());
        assert!(engine.check_threshold("P3", 3, 0).is_ok());
    }

    #[test]
    fn business_errors_close_the_run_and_infrastructure_does_not() {
        assert!(fails_run(&EngineError::ThresholdExceeded { phase: "P2".to_string(), errors: 9, demand: 10 }));
        assert!(fails_run(&EngineError::ProgressLoop { round_id: 1, grade_id: 2 }));
        assert!(fails_run(&EngineError::FingerprintMismatch { expected: "a".to_string(), actual: "b".to_string() }));
        assert!(fails_run(&EngineError::Conflict("candado perdido".to_string())));
        assert!(!fails_run(&EngineError::Storage("conexión caída".to_string())));
        assert!(!fails_run(&EngineError::Internal("defecto".to_string())));
    }

    #[test]
    fn next_stage_follows_the_checkpoint_order() {
        assert_eq!(stage_after(ResumeCheckpoint::BeforeP2), RunStage::Step2);
        assert_eq!(stage_after(ResumeCheckpoint::AfterP2BeforeP3), RunStage::Step3);
        assert_eq!(stage_after(ResumeCheckpoint::AfterP3BeforeFinalise), RunStage::Finalise);
    }
}
