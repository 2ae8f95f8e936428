//! Backends en memoria. Referencia de semántica para la capa Postgres:
//! misma atomicidad de `begin`, mismas unicidades, mismos errores.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::model::{FinalByeEntry, FinalGameEntry, NewRun, P2Allocation, P3ByeAllocation, P3GameAllocation,
                   ResumeCheckpoint, RunStatus, SavedBye, SavedGame, SavedStatus, SchedulingLock, SchedulingRun,
                   SnapshotPhase, StagingDiff};
use super::{RunOutcome, RunStore, SnapshotBundle, StagingStore, Submission};

#[derive(Default)]
struct RunInner {
    runs: HashMap<Uuid, SchedulingRun>,
    by_key: HashMap<String, Uuid>,
    locks: HashMap<i32, SchedulingLock>,
}

/// `RunStore` en memoria. Un único `Mutex` cubre corridas, índice de
/// idempotencia y candados, de modo que `begin` es atómico por construcción.
#[derive(Default)]
pub struct InMemoryRunStore {
    inner: Mutex<RunInner>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, RunInner>, EngineError> {
        self.inner
            .lock()
            .map_err(|_| EngineError::Internal("run store mutex poisoned".to_string()))
    }
}

impl RunStore for InMemoryRunStore {
    fn begin(&self, new_run: NewRun) -> Result<Submission, EngineError> {
        let mut inner = self.guard()?;
        if let Some(existing_id) = inner.by_key.get(&new_run.idempotency_key).copied() {
            if let Some(existing) = inner.runs.get(&existing_id) {
                if existing.run_status != RunStatus::Abandoned {
                    return Ok(Submission::Replayed(existing.clone()));
                }
            }
        }
        if let Some(lock) = inner.locks.get(&new_run.season_day_id) {
            return Ok(Submission::LockHeld { season_day_id: new_run.season_day_id,
                                            holder: lock.run_id });
        }
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        let key = new_run.idempotency_key.clone();
        let run = new_run.into_run(run_id, now);
        inner.locks.insert(run.season_day_id,
                           SchedulingLock { season_day_id: run.season_day_id,
                                            run_id,
                                            locked_at: now });
        inner.by_key.insert(key, run_id);
        inner.runs.insert(run_id, run.clone());
        Ok(Submission::Created(run))
    }

    fn get(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let inner = self.guard()?;
        inner.runs.get(&run_id).cloned().ok_or(EngineError::RunNotFound(run_id))
    }

    fn find_by_key(&self, idempotency_key: &str) -> Result<Option<SchedulingRun>, EngineError> {
        let inner = self.guard()?;
        Ok(inner.by_key
                .get(idempotency_key)
                .and_then(|id| inner.runs.get(id))
                .cloned())
    }

    fn mark_running(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let mut inner = self.guard()?;
        let run = inner.runs.get_mut(&run_id).ok_or(EngineError::RunNotFound(run_id))?;
        match run.run_status {
            RunStatus::Pending => {
                run.run_status = RunStatus::Running;
                run.started_at = Some(Utc::now());
            }
            RunStatus::Running => {}
            _ => return Err(EngineError::NotActive(run_id)),
        }
        Ok(run.clone())
    }

    fn set_s1_results(&self, run_id: Uuid, results: &str) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        let run = inner.runs.get_mut(&run_id).ok_or(EngineError::RunNotFound(run_id))?;
        if run.run_status.is_terminal() {
            return Err(EngineError::NotActive(run_id));
        }
        run.s1_check_results = results.to_string();
        Ok(())
    }

    fn set_checkpoint(&self, run_id: Uuid, checkpoint: ResumeCheckpoint) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        let run = inner.runs.get_mut(&run_id).ok_or(EngineError::RunNotFound(run_id))?;
        if checkpoint < run.resume_checkpoint {
            return Err(EngineError::Internal(format!("checkpoint would regress: {} -> {}",
                                                     run.resume_checkpoint.as_str(),
                                                     checkpoint.as_str())));
        }
        run.resume_checkpoint = checkpoint;
        Ok(())
    }

    fn finish(&self, run_id: Uuid, outcome: RunOutcome) -> Result<SchedulingRun, EngineError> {
        if !matches!(outcome.run_status, RunStatus::Succeeded | RunStatus::Failed) {
            return Err(EngineError::Internal(format!("finish requires a terminal outcome, got {}",
                                                     outcome.run_status.as_str())));
        }
        let mut inner = self.guard()?;
        let run = inner.runs.get_mut(&run_id).ok_or(EngineError::RunNotFound(run_id))?;
        if run.run_status.is_terminal() {
            return Err(EngineError::NotActive(run_id));
        }
        run.run_status = outcome.run_status;
        run.metrics = outcome.metrics;
        run.error_code = outcome.error_code;
        run.error_details = outcome.error_details;
        run.finished_at = Some(Utc::now());
        let done = run.clone();
        release_if_holder(&mut inner, done.season_day_id, run_id);
        Ok(done)
    }

    fn abandon(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError> {
        let mut inner = self.guard()?;
        let run = inner.runs.get_mut(&run_id).ok_or(EngineError::RunNotFound(run_id))?;
        if run.run_status.is_terminal() {
            return Err(EngineError::NotActive(run_id));
        }
        run.run_status = RunStatus::Abandoned;
        run.finished_at = Some(Utc::now());
        let done = run.clone();
        release_if_holder(&mut inner, done.season_day_id, run_id);
        Ok(done)
    }

    fn lock_holder(&self, season_day_id: i32) -> Result<Option<SchedulingLock>, EngineError> {
        let inner = self.guard()?;
        Ok(inner.locks.get(&season_day_id).cloned())
    }

    fn release_lock(&self, season_day_id: i32, run_id: Uuid) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        release_if_holder(&mut inner, season_day_id, run_id);
        Ok(())
    }
}

fn release_if_holder(inner: &mut RunInner, season_day_id: i32, run_id: Uuid) {
    if inner.locks.get(&season_day_id).map(|l| l.run_id) == Some(run_id) {
        inner.locks.remove(&season_day_id);
    }
}

#[derive(Default)]
struct StagingInner {
    p2: Vec<P2Allocation>,
    games: Vec<P3GameAllocation>,
    byes: Vec<P3ByeAllocation>,
    diffs: Vec<StagingDiff>,
    saved_games: Vec<SavedGame>,
    saved_byes: Vec<SavedBye>,
    constraint_snapshots: Vec<(Uuid, SnapshotPhase, Value)>,
    final_games: Vec<FinalGameEntry>,
    final_byes: Vec<FinalByeEntry>,
}

/// `StagingStore` en memoria: vectores con verificación de unicidad al
/// insertar, espejo de los índices únicos del esquema Postgres.
#[derive(Default)]
pub struct InMemoryStagingStore {
    inner: Mutex<StagingInner>,
}

impl InMemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, StagingInner>, EngineError> {
        self.inner
            .lock()
            .map_err(|_| EngineError::Internal("staging store mutex poisoned".to_string()))
    }
}

impl StagingStore for InMemoryStagingStore {
    fn add_p2(&self, row: P2Allocation) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        let clash = inner.p2
                         .iter()
                         .any(|r| r.run_id == row.run_id && r.round_id == row.round_id
                                  && r.court_time_id == row.court_time_id);
        if clash {
            return Err(EngineError::DuplicateClaim { round_id: row.round_id,
                                                     court_time_id: row.court_time_id });
        }
        inner.p2.push(row);
        Ok(())
    }

    fn list_p2(&self, run_id: Uuid) -> Result<Vec<P2Allocation>, EngineError> {
        let inner = self.guard()?;
        Ok(inner.p2.iter().filter(|r| r.run_id == run_id).cloned().collect())
    }

    fn clear_p2(&self, run_id: Uuid) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        inner.p2.retain(|r| r.run_id != run_id);
        Ok(())
    }

    fn add_game(&self, row: P3GameAllocation) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        let clash = inner.games
                         .iter()
                         .any(|r| r.run_id == row.run_id && r.round_id == row.round_id
                                  && r.court_time_id == row.court_time_id);
        if clash {
            return Err(EngineError::DuplicateClaim { round_id: row.round_id,
                                                     court_time_id: row.court_time_id });
        }
        inner.games.push(row);
        Ok(())
    }

    fn list_games(&self, run_id: Uuid) -> Result<Vec<P3GameAllocation>, EngineError> {
        let inner = self.guard()?;
        Ok(inner.games.iter().filter(|r| r.run_id == run_id).cloned().collect())
    }

    fn add_bye(&self, row: P3ByeAllocation) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        let clash = inner.byes
                         .iter()
                         .any(|r| r.run_id == row.run_id && r.round_id == row.round_id && r.team_id == row.team_id);
        if clash {
            return Err(EngineError::DuplicateBye { round_id: row.round_id,
                                                   team_id: row.team_id });
        }
        inner.byes.push(row);
        Ok(())
    }

    fn list_byes(&self, run_id: Uuid) -> Result<Vec<P3ByeAllocation>, EngineError> {
        let inner = self.guard()?;
        Ok(inner.byes.iter().filter(|r| r.run_id == run_id).cloned().collect())
    }

    fn clear_p3(&self, run_id: Uuid) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        inner.games.retain(|r| r.run_id != run_id);
        inner.byes.retain(|r| r.run_id != run_id);
        Ok(())
    }

    fn record_diff(&self, diff: StagingDiff) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        inner.diffs.push(diff);
        Ok(())
    }

    fn list_diffs(&self, run_id: Uuid) -> Result<Vec<StagingDiff>, EngineError> {
        let inner = self.guard()?;
        Ok(inner.diffs.iter().filter(|d| d.run_id == run_id).cloned().collect())
    }

    fn save_snapshot(&self,
                     run_id: Uuid,
                     stage: SavedStatus,
                     games: Vec<SavedGame>,
                     byes: Vec<SavedBye>)
                     -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        inner.saved_games.retain(|g| !(g.run_id == run_id && g.game_status == stage));
        inner.saved_byes.retain(|b| !(b.run_id == run_id && b.game_status == stage));
        inner.saved_games.extend(games);
        inner.saved_byes.extend(byes);
        Ok(())
    }

    fn latest_snapshot(&self, run_id: Uuid) -> Result<Option<SnapshotBundle>, EngineError> {
        let inner = self.guard()?;
        let top = inner.saved_games
                       .iter()
                       .filter(|g| g.run_id == run_id)
                       .map(|g| g.game_status)
                       .chain(inner.saved_byes.iter().filter(|b| b.run_id == run_id).map(|b| b.game_status))
                       .max();
        Ok(top.map(|stage| SnapshotBundle { stage,
                                            games: inner.saved_games
                                                        .iter()
                                                        .filter(|g| g.run_id == run_id && g.game_status == stage)
                                                        .cloned()
                                                        .collect(),
                                            byes: inner.saved_byes
                                                       .iter()
                                                       .filter(|b| b.run_id == run_id && b.game_status == stage)
                                                       .cloned()
                                                       .collect() }))
    }

    fn save_constraints(&self, run_id: Uuid, phase: SnapshotPhase, snapshot: Value) -> Result<(), EngineError> {
        let mut inner = self.guard()?;
        inner.constraint_snapshots.push((run_id, phase, snapshot));
        Ok(())
    }

    fn constraint_snapshot(&self, run_id: Uuid, phase: SnapshotPhase) -> Result<Option<Value>, EngineError> {
        let inner = self.guard()?;
        Ok(inner.constraint_snapshots
                .iter()
                .rev()
                .find(|(r, p, _)| *r == run_id && *p == phase)
                .map(|(_, _, v)| v.clone()))
    }

    fn publish_final(&self,
                     run_id: Uuid,
                     round_ids: &[i32],
                     games: Vec<FinalGameEntry>,
                     byes: Vec<FinalByeEntry>)
                     -> Result<(), EngineError> {
        let _ = run_id;
        let mut seen_slots = std::collections::HashSet::new();
        for game in &games {
            if !seen_slots.insert((game.round_id, game.court_time_id)) {
                return Err(EngineError::FinaliseConflict(format!("franja repetida en el lote: round={} court_time={}",
                                                                 game.round_id, game.court_time_id)));
            }
        }
        let mut seen_byes = std::collections::HashSet::new();
        for bye in &byes {
            if !seen_byes.insert((bye.round_id, bye.team_id)) {
                return Err(EngineError::FinaliseConflict(format!("bye repetido en el lote: round={} team={}",
                                                                 bye.round_id, bye.team_id)));
            }
        }
        let mut inner = self.guard()?;
        inner.final_games.retain(|g| !round_ids.contains(&g.round_id));
        inner.final_byes.retain(|b| !round_ids.contains(&b.round_id));
        inner.final_games.extend(games);
        inner.final_byes.extend(byes);
        Ok(())
    }

    fn final_schedule(&self, round_ids: &[i32]) -> Result<(Vec<FinalGameEntry>, Vec<FinalByeEntry>), EngineError> {
        let inner = self.guard()?;
        let mut games: Vec<FinalGameEntry> = inner.final_games
                                                  .iter()
                                                  .filter(|g| round_ids.contains(&g.round_id))
                                                  .cloned()
                                                  .collect();
        let mut byes: Vec<FinalByeEntry> = inner.final_byes
                                                .iter()
                                                .filter(|b| round_ids.contains(&b.round_id))
                                                .cloned()
                                                .collect();
        games.sort_by_key(|g| (g.round_id, g.court_time_id));
        byes.sort_by_key(|b| (b.round_id, b.team_id));
        Ok((games, byes))
    }
}
