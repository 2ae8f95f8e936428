//! `RunStore` sobre Postgres.
//!
//! `begin` es una transacción única: replay por clave de idempotencia,
//! chequeo del candado de jornada y alta de corrida + candado. Las
//! transiciones (`mark_running`, `finish`, `abandon`) releen la fila con
//! `FOR UPDATE` y aplican el mismo gating que el backend en memoria.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::debug;
use serde_json::Value;
use uuid::Uuid;

use fixture_core::errors::EngineError;
use fixture_core::model::{ErrorDetails, NewRun, ProcessType, ResumeCheckpoint, RunMetrics, RunStatus, RunType,
                          SchedulingLock, SchedulingRun};
use fixture_core::store::{RunOutcome, RunStore, Submission};

use super::{bad_enum, with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{scheduling_day_locks, scheduling_runs};

/// Fila de `scheduling_runs` para lecturas. Los enums viajan como texto
/// (el mismo que validan los CHECK del esquema).
#[derive(Queryable, Debug)]
struct RunRow {
    run_id: Uuid,
    season_id: i32,
    season_day_id: i32,
    process_type: String,
    run_type: Option<String>,
    run_status: String,
    s1_check_results: String,
    round_ids: Vec<i32>,
    seed_master: String,
    resume_checkpoint: String,
    config_hash: String,
    idempotency_key: String,
    metrics: Option<Value>,
    error_code: Option<String>,
    error_details: Option<Value>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunRow {
    fn into_run(self) -> Result<SchedulingRun, EngineError> {
        let process_type =
            ProcessType::parse(&self.process_type).ok_or_else(|| bad_enum("process_type", &self.process_type))?;
        let run_type = match self.run_type.as_deref() {
            Some(raw) => Some(RunType::parse(raw).ok_or_else(|| bad_enum("run_type", raw))?),
            None => None,
        };
        let run_status =
            RunStatus::parse(&self.run_status).ok_or_else(|| bad_enum("run_status", &self.run_status))?;
        let resume_checkpoint = ResumeCheckpoint::parse(&self.resume_checkpoint)
            .ok_or_else(|| bad_enum("resume_checkpoint", &self.resume_checkpoint))?;
        let metrics: Option<RunMetrics> =
            self.metrics
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| EngineError::Internal(format!("metrics corruptas en DB: {e}")))?;
        let error_details: Option<ErrorDetails> =
            self.error_details
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| EngineError::Internal(format!("error_details corruptos en DB: {e}")))?;
        Ok(SchedulingRun { run_id: self.run_id,
                           season_id: self.season_id,
                           season_day_id: self.season_day_id,
                           process_type,
                           run_type,
                           run_status,
                           s1_check_results: self.s1_check_results,
                           round_ids: self.round_ids,
                           seed_master: self.seed_master,
                           resume_checkpoint,
                           config_hash: self.config_hash,
                           idempotency_key: self.idempotency_key,
                           metrics,
                           error_code: self.error_code,
                           error_details,
                           created_at: self.created_at,
                           started_at: self.started_at,
                           finished_at: self.finished_at })
    }
}

/// Fila de `scheduling_day_locks`.
#[derive(Queryable, Debug)]
struct LockRow {
    season_day_id: i32,
    run_id: Uuid,
    locked_at: DateTime<Utc>,
}

/// Valores de inserción para una corrida recién creada (`PENDING`).
#[derive(Insertable, Debug)]
#[diesel(table_name = scheduling_runs)]
struct NewRunRow<'a> {
    run_id: Uuid,
    season_id: i32,
    season_day_id: i32,
    process_type: &'a str,
    run_type: Option<&'a str>,
    run_status: &'a str,
    s1_check_results: &'a str,
    round_ids: &'a [i32],
    seed_master: &'a str,
    resume_checkpoint: &'a str,
    config_hash: &'a str,
    idempotency_key: &'a str,
    metrics: Option<Value>,
    error_code: Option<&'a str>,
    error_details: Option<Value>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

fn insert_values(run: &SchedulingRun) -> NewRunRow<'_> {
    NewRunRow { run_id: run.run_id,
                season_id: run.season_id,
                season_day_id: run.season_day_id,
                process_type: run.process_type.as_str(),
                run_type: run.run_type.map(|t| t.as_str()),
                run_status: run.run_status.as_str(),
                s1_check_results: &run.s1_check_results,
                round_ids: &run.round_ids,
                seed_master: &run.seed_master,
                resume_checkpoint: run.resume_checkpoint.as_str(),
                config_hash: &run.config_hash,
                idempotency_key: &run.idempotency_key,
                metrics: None,
                error_code: None,
                error_details: None,
                created_at: run.created_at,
                started_at: run.started_at,
                finished_at: run.finished_at }
}

/// `true` si el texto corresponde a un estado no terminal conocido. Un
/// texto fuera de catálogo se trata como intocable.
fn is_active_text(status: &str) -> bool {
    matches!(RunStatus::parse(status), Some(s) if !s.is_terminal())
}

enum SubmitTx {
    Created(SchedulingRun),
    Replayed(RunRow),
    LockHeld { season_day_id: i32, holder: Uuid },
}

enum Guarded {
    Missing,
    Inactive,
    Row(RunRow),
}

fn resolve_gate(gate: Guarded, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
    match gate {
        Guarded::Missing => Err(EngineError::RunNotFound(run_id)),
        Guarded::Inactive => Err(EngineError::NotActive(run_id)),
        Guarded::Row(row) => row.into_run(),
    }
}

enum CheckpointTx {
    Missing,
    /// Sin update: el texto actual decide afuera si fue regresión o fila
    /// corrupta.
    Kept { current: String },
    Updated,
}

/// Implementación Postgres de `RunStore`.
pub struct PgRunStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgRunStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> RunStore for PgRunStore<P> {
    fn begin(&self, new_run: NewRun) -> Result<Submission, EngineError> {
        let outcome = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<SubmitTx, diesel::result::Error> {
                    let existing: Option<RunRow> =
                        scheduling_runs::table.filter(scheduling_runs::idempotency_key.eq(&new_run.idempotency_key))
                                              .filter(scheduling_runs::run_status.ne(RunStatus::Abandoned.as_str()))
                                              .order(scheduling_runs::created_at.desc())
                                              .first(tx)
                                              .optional()?;
                    if let Some(row) = existing {
                        return Ok(SubmitTx::Replayed(row));
                    }
                    let lock: Option<LockRow> =
                        scheduling_day_locks::table.find(new_run.season_day_id).first(tx).optional()?;
                    if let Some(lock) = lock {
                        return Ok(SubmitTx::LockHeld { season_day_id: lock.season_day_id,
                                                      holder: lock.run_id });
                    }
                    let run = new_run.clone().into_run(Uuid::new_v4(), Utc::now());
                    diesel::insert_into(scheduling_runs::table).values(insert_values(&run))
                                                               .execute(tx)?;
                    diesel::insert_into(scheduling_day_locks::table)
                        .values((scheduling_day_locks::season_day_id.eq(run.season_day_id),
                                 scheduling_day_locks::run_id.eq(run.run_id),
                                 scheduling_day_locks::locked_at.eq(run.created_at)))
                        .execute(tx)?;
                    Ok(SubmitTx::Created(run))
                })
                .map_err(PersistenceError::from)
        })?;
        match outcome {
            SubmitTx::Created(run) => {
                debug!("begin: corrida {} creada para la jornada {}", run.run_id, run.season_day_id);
                Ok(Submission::Created(run))
            }
            SubmitTx::Replayed(row) => {
                let run = row.into_run()?;
                debug!("begin: replay de la corrida {} por clave", run.run_id);
                Ok(Submission::Replayed(run))
            }
            SubmitTx::LockHeld { season_day_id, holder } => {
                debug!("begin: jornada {season_day_id} bloqueada por la corrida {holder}");
                Ok(Submission::LockHeld { season_day_id, holder })
            }
        }
    }

    fn get(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let row: Option<RunRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            scheduling_runs::table.find(run_id)
                                  .first(&mut conn)
                                  .optional()
                                  .map_err(PersistenceError::from)
        })?;
        row.ok_or(EngineError::RunNotFound(run_id))?.into_run()
    }

    fn find_by_key(&self, idempotency_key: &str) -> Result<Option<SchedulingRun>, EngineError> {
        let row: Option<RunRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            scheduling_runs::table.filter(scheduling_runs::idempotency_key.eq(idempotency_key))
                                  .order(scheduling_runs::created_at.desc())
                                  .first(&mut conn)
                                  .optional()
                                  .map_err(PersistenceError::from)
        })?;
        row.map(|r| r.into_run()).transpose()
    }

    fn mark_running(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let gate = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<Guarded, diesel::result::Error> {
                    let row: Option<RunRow> =
                        scheduling_runs::table.find(run_id).for_update().first(tx).optional()?;
                    let Some(row) = row else {
                        return Ok(Guarded::Missing);
                    };
                    if row.run_status == RunStatus::Pending.as_str() {
                        let updated: RunRow =
                            diesel::update(scheduling_runs::table.find(run_id))
                                .set((scheduling_runs::run_status.eq(RunStatus::Running.as_str()),
                                      scheduling_runs::started_at.eq(Some(Utc::now()))))
                                .get_result(tx)?;
                        Ok(Guarded::Row(updated))
                    } else if row.run_status == RunStatus::Running.as_str() {
                        Ok(Guarded::Row(row))
                    } else {
                        Ok(Guarded::Inactive)
                    }
                })
                .map_err(PersistenceError::from)
        })?;
        resolve_gate(gate, run_id)
    }

    fn set_s1_results(&self, run_id: Uuid, results: &str) -> Result<(), EngineError> {
        let gate = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<Guarded, diesel::result::Error> {
                    let row: Option<RunRow> =
                        scheduling_runs::table.find(run_id).for_update().first(tx).optional()?;
                    let Some(row) = row else {
                        return Ok(Guarded::Missing);
                    };
                    if !is_active_text(&row.run_status) {
                        return Ok(Guarded::Inactive);
                    }
                    let updated: RunRow = diesel::update(scheduling_runs::table.find(run_id))
                        .set(scheduling_runs::s1_check_results.eq(results))
                        .get_result(tx)?;
                    Ok(Guarded::Row(updated))
                })
                .map_err(PersistenceError::from)
        })?;
        resolve_gate(gate, run_id).map(|_| ())
    }

    fn set_checkpoint(&self, run_id: Uuid, checkpoint: ResumeCheckpoint) -> Result<(), EngineError> {
        let outcome = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<CheckpointTx, diesel::result::Error> {
                    let row: Option<RunRow> =
                        scheduling_runs::table.find(run_id).for_update().first(tx).optional()?;
                    let Some(row) = row else {
                        return Ok(CheckpointTx::Missing);
                    };
                    match ResumeCheckpoint::parse(&row.resume_checkpoint) {
                        Some(current) if checkpoint < current => {
                            Ok(CheckpointTx::Kept { current: row.resume_checkpoint })
                        }
                        Some(_) => {
                            diesel::update(scheduling_runs::table.find(run_id))
                                .set(scheduling_runs::resume_checkpoint.eq(checkpoint.as_str()))
                                .execute(tx)?;
                            Ok(CheckpointTx::Updated)
                        }
                        None => Ok(CheckpointTx::Kept { current: row.resume_checkpoint }),
                    }
                })
                .map_err(PersistenceError::from)
        })?;
        match outcome {
            CheckpointTx::Updated => Ok(()),
            CheckpointTx::Missing => Err(EngineError::RunNotFound(run_id)),
            CheckpointTx::Kept { current } => match ResumeCheckpoint::parse(&current) {
                Some(cur) => Err(EngineError::Internal(format!("checkpoint would regress: {} -> {}",
                                                               cur.as_str(),
                                                               checkpoint.as_str()))),
                None => Err(bad_enum("resume_checkpoint", &current)),
            },
        }
    }

    fn finish(&self, run_id: Uuid, outcome: RunOutcome) -> Result<SchedulingRun, EngineError> {
        if !matches!(outcome.run_status, RunStatus::Succeeded | RunStatus::Failed) {
            return Err(EngineError::Internal(format!("finish requires a terminal outcome, got {}",
                                                     outcome.run_status.as_str())));
        }
        let metrics_json: Option<Value> =
            outcome.metrics
                   .as_ref()
                   .map(serde_json::to_value)
                   .transpose()
                   .map_err(|e| EngineError::Internal(format!("metrics serialize: {e}")))?;
        let details_json: Option<Value> =
            outcome.error_details
                   .as_ref()
                   .map(serde_json::to_value)
                   .transpose()
                   .map_err(|e| EngineError::Internal(format!("error_details serialize: {e}")))?;
        let gate = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<Guarded, diesel::result::Error> {
                    let row: Option<RunRow> =
                        scheduling_runs::table.find(run_id).for_update().first(tx).optional()?;
                    let Some(row) = row else {
                        return Ok(Guarded::Missing);
                    };
                    if !is_active_text(&row.run_status) {
                        return Ok(Guarded::Inactive);
                    }
                    let updated: RunRow =
                        diesel::update(scheduling_runs::table.find(run_id))
                            .set((scheduling_runs::run_status.eq(outcome.run_status.as_str()),
                                  scheduling_runs::metrics.eq(metrics_json.clone()),
                                  scheduling_runs::error_code.eq(outcome.error_code.as_deref()),
                                  scheduling_runs::error_details.eq(details_json.clone()),
                                  scheduling_runs::finished_at.eq(Some(Utc::now()))))
                            .get_result(tx)?;
                    // Suelta el candado de la jornada si lo sostiene esta corrida.
                    diesel::delete(scheduling_day_locks::table.find(row.season_day_id)
                                                              .filter(scheduling_day_locks::run_id.eq(run_id)))
                        .execute(tx)?;
                    Ok(Guarded::Row(updated))
                })
                .map_err(PersistenceError::from)
        })?;
        let run = resolve_gate(gate, run_id)?;
        debug!("finish: corrida {} cerrada como {}", run.run_id, run.run_status.as_str());
        Ok(run)
    }

    fn abandon(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let gate = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<Guarded, diesel::result::Error> {
                    let row: Option<RunRow> =
                        scheduling_runs::table.find(run_id).for_update().first(tx).optional()?;
                    let Some(row) = row else {
                        return Ok(Guarded::Missing);
                    };
                    if !is_active_text(&row.run_status) {
                        return Ok(Guarded::Inactive);
                    }
                    let updated: RunRow =
                        diesel::update(scheduling_runs::table.find(run_id))
                            .set((scheduling_runs::run_status.eq(RunStatus::Abandoned.as_str()),
                                  scheduling_runs::finished_at.eq(Some(Utc::now()))))
                            .get_result(tx)?;
                    diesel::delete(scheduling_day_locks::table.find(row.season_day_id)
                                                              .filter(scheduling_day_locks::run_id.eq(run_id)))
                        .execute(tx)?;
                    Ok(Guarded::Row(updated))
                })
                .map_err(PersistenceError::from)
        })?;
        let run = resolve_gate(gate, run_id)?;
        debug!("abandon: corrida {} abandonada en {}", run.run_id, run.resume_checkpoint.as_str());
        Ok(run)
    }

    fn lock_holder(&self, season_day_id: i32) -> Result<Option<SchedulingLock>, EngineError> {
        let row: Option<LockRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            scheduling_day_locks::table.find(season_day_id)
                                       .first(&mut conn)
                                       .optional()
                                       .map_err(PersistenceError::from)
        })?;
        Ok(row.map(|l| SchedulingLock { season_day_id: l.season_day_id,
                                        run_id: l.run_id,
                                        locked_at: l.locked_at }))
    }

    fn release_lock(&self, season_day_id: i32, run_id: Uuid) -> Result<(), EngineError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(scheduling_day_locks::table.find(season_day_id)
                                                      .filter(scheduling_day_locks::run_id.eq(run_id)))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(PersistenceError::from)
        })?;
        Ok(())
    }
}
