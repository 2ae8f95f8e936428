//! `StagingStore` sobre Postgres.
//!
//! Orden garantizado por el esquema: `claim_seq` (fase 2) e `insert_seq`
//! (fase 3) son BIGSERIAL, de modo que las lecturas devuelven las filas
//! en el orden en que se reclamaron/insertaron, igual que el backend en
//! memoria. La unicidad de staging la imponen los índices; una violación
//! vuelve como `DuplicateClaim`/`DuplicateBye`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde_json::Value;
use uuid::Uuid;

use fixture_core::errors::EngineError;
use fixture_core::model::{ByeReason, DiffChange, DiffEntity, FinalByeEntry, FinalGameEntry, FinalStatus,
                          P2Allocation, P3ByeAllocation, P3GameAllocation, SavedBye, SavedGame, SavedStatus,
                          SnapshotPhase, StagingDiff};
use fixture_core::store::{SnapshotBundle, StagingStore};

use super::{bad_enum, with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{constraint_snapshots, final_byes, final_games, p2_slot_allocations, p3_bye_allocations,
                    p3_game_allocations, snapshot_byes, snapshot_games, staging_diffs};

#[derive(Queryable, Debug)]
struct P2Row {
    claim_seq: i64,
    p2_allocation_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    court_time_id: i32,
    created_at: DateTime<Utc>,
}

impl P2Row {
    fn into_alloc(self) -> P2Allocation {
        let _ = self.claim_seq;
        P2Allocation { p2_allocation_id: self.p2_allocation_id,
                       run_id: self.run_id,
                       round_id: self.round_id,
                       age_id: self.age_id,
                       grade_id: self.grade_id,
                       court_time_id: self.court_time_id,
                       created_at: self.created_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = p2_slot_allocations)]
struct NewP2Row {
    p2_allocation_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    court_time_id: i32,
    created_at: DateTime<Utc>,
}

impl NewP2Row {
    fn from_alloc(row: &P2Allocation) -> Self {
        NewP2Row { p2_allocation_id: row.p2_allocation_id,
                   run_id: row.run_id,
                   round_id: row.round_id,
                   age_id: row.age_id,
                   grade_id: row.grade_id,
                   court_time_id: row.court_time_id,
                   created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
struct GameRow {
    insert_seq: i64,
    p3_allocation_id: Uuid,
    run_id: Uuid,
    p2_allocation_id: Option<Uuid>,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_a_id: i32,
    team_b_id: i32,
    court_time_id: i32,
    created_at: DateTime<Utc>,
}

impl GameRow {
    fn into_alloc(self) -> P3GameAllocation {
        let _ = self.insert_seq;
        P3GameAllocation { p3_game_allocation_id: self.p3_allocation_id,
                           run_id: self.run_id,
                           p2_allocation_id: self.p2_allocation_id,
                           round_id: self.round_id,
                           age_id: self.age_id,
                           grade_id: self.grade_id,
                           team_a_id: self.team_a_id,
                           team_b_id: self.team_b_id,
                           court_time_id: self.court_time_id,
                           created_at: self.created_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = p3_game_allocations)]
struct NewGameRow {
    p3_allocation_id: Uuid,
    run_id: Uuid,
    p2_allocation_id: Option<Uuid>,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_a_id: i32,
    team_b_id: i32,
    court_time_id: i32,
    created_at: DateTime<Utc>,
}

impl NewGameRow {
    fn from_alloc(row: &P3GameAllocation) -> Self {
        NewGameRow { p3_allocation_id: row.p3_game_allocation_id,
                     run_id: row.run_id,
                     p2_allocation_id: row.p2_allocation_id,
                     round_id: row.round_id,
                     age_id: row.age_id,
                     grade_id: row.grade_id,
                     team_a_id: row.team_a_id,
                     team_b_id: row.team_b_id,
                     court_time_id: row.court_time_id,
                     created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
struct ByeRow {
    insert_seq: i64,
    p3_bye_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_id: i32,
    bye_reason: String,
    created_at: DateTime<Utc>,
}

impl ByeRow {
    fn into_alloc(self) -> Result<P3ByeAllocation, EngineError> {
        let _ = self.insert_seq;
        let bye_reason = ByeReason::parse(&self.bye_reason).ok_or_else(|| bad_enum("bye_reason", &self.bye_reason))?;
        Ok(P3ByeAllocation { p3_bye_allocation_id: self.p3_bye_id,
                             run_id: self.run_id,
                             round_id: self.round_id,
                             age_id: self.age_id,
                             grade_id: self.grade_id,
                             team_id: self.team_id,
                             bye_reason,
                             created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = p3_bye_allocations)]
struct NewByeRow {
    p3_bye_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_id: i32,
    bye_reason: &'static str,
    created_at: DateTime<Utc>,
}

impl NewByeRow {
    fn from_alloc(row: &P3ByeAllocation) -> Self {
        NewByeRow { p3_bye_id: row.p3_bye_allocation_id,
                    run_id: row.run_id,
                    round_id: row.round_id,
                    age_id: row.age_id,
                    grade_id: row.grade_id,
                    team_id: row.team_id,
                    bye_reason: row.bye_reason.as_str(),
                    created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
struct DiffRow {
    diff_seq: i64,
    run_id: Uuid,
    entity_type: String,
    entity_id: String,
    change_type: String,
    before_state: Option<Value>,
    after_state: Option<Value>,
    created_at: DateTime<Utc>,
}

impl DiffRow {
    fn into_diff(self) -> Result<StagingDiff, EngineError> {
        let _ = self.diff_seq;
        let entity_type =
            DiffEntity::parse(&self.entity_type).ok_or_else(|| bad_enum("entity_type", &self.entity_type))?;
        let change_type =
            DiffChange::parse(&self.change_type).ok_or_else(|| bad_enum("change_type", &self.change_type))?;
        Ok(StagingDiff { run_id: self.run_id,
                         entity_type,
                         entity_id: self.entity_id,
                         change_type,
                         before_state: self.before_state,
                         after_state: self.after_state,
                         created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = staging_diffs)]
struct NewDiffRow<'a> {
    run_id: Uuid,
    entity_type: &'static str,
    entity_id: &'a str,
    change_type: &'static str,
    before_state: Option<&'a Value>,
    after_state: Option<&'a Value>,
    created_at: DateTime<Utc>,
}

impl<'a> NewDiffRow<'a> {
    fn from_diff(diff: &'a StagingDiff) -> Self {
        NewDiffRow { run_id: diff.run_id,
                     entity_type: diff.entity_type.as_str(),
                     entity_id: &diff.entity_id,
                     change_type: diff.change_type.as_str(),
                     before_state: diff.before_state.as_ref(),
                     after_state: diff.after_state.as_ref(),
                     created_at: diff.created_at }
    }
}

#[derive(Queryable, Debug)]
struct SnapGameRow {
    saved_game_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_a_id: Option<i32>,
    team_b_id: Option<i32>,
    court_time_id: i32,
    game_status: String,
    created_at: DateTime<Utc>,
}

impl SnapGameRow {
    fn into_saved(self) -> Result<SavedGame, EngineError> {
        let game_status =
            SavedStatus::parse(&self.game_status).ok_or_else(|| bad_enum("game_status", &self.game_status))?;
        Ok(SavedGame { saved_game_id: self.saved_game_id,
                       run_id: self.run_id,
                       round_id: self.round_id,
                       age_id: self.age_id,
                       grade_id: self.grade_id,
                       team_a_id: self.team_a_id,
                       team_b_id: self.team_b_id,
                       court_time_id: self.court_time_id,
                       game_status,
                       created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = snapshot_games)]
struct NewSnapGameRow {
    saved_game_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_a_id: Option<i32>,
    team_b_id: Option<i32>,
    court_time_id: i32,
    game_status: &'static str,
    created_at: DateTime<Utc>,
}

impl NewSnapGameRow {
    fn from_saved(row: &SavedGame) -> Self {
        NewSnapGameRow { saved_game_id: row.saved_game_id,
                         run_id: row.run_id,
                         round_id: row.round_id,
                         age_id: row.age_id,
                         grade_id: row.grade_id,
                         team_a_id: row.team_a_id,
                         team_b_id: row.team_b_id,
                         court_time_id: row.court_time_id,
                         game_status: row.game_status.as_str(),
                         created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
struct SnapByeRow {
    saved_bye_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_id: i32,
    bye_reason: String,
    game_status: String,
    created_at: DateTime<Utc>,
}

impl SnapByeRow {
    fn into_saved(self) -> Result<SavedBye, EngineError> {
        let bye_reason = ByeReason::parse(&self.bye_reason).ok_or_else(|| bad_enum("bye_reason", &self.bye_reason))?;
        let game_status =
            SavedStatus::parse(&self.game_status).ok_or_else(|| bad_enum("game_status", &self.game_status))?;
        Ok(SavedBye { saved_bye_id: self.saved_bye_id,
                      run_id: self.run_id,
                      round_id: self.round_id,
                      age_id: self.age_id,
                      grade_id: self.grade_id,
                      team_id: self.team_id,
                      bye_reason,
                      game_status,
                      created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = snapshot_byes)]
struct NewSnapByeRow {
    saved_bye_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_id: i32,
    bye_reason: &'static str,
    game_status: &'static str,
    created_at: DateTime<Utc>,
}

impl NewSnapByeRow {
    fn from_saved(row: &SavedBye) -> Self {
        NewSnapByeRow { saved_bye_id: row.saved_bye_id,
                        run_id: row.run_id,
                        round_id: row.round_id,
                        age_id: row.age_id,
                        grade_id: row.grade_id,
                        team_id: row.team_id,
                        bye_reason: row.bye_reason.as_str(),
                        game_status: row.game_status.as_str(),
                        created_at: row.created_at }
    }
}

#[derive(Queryable, Debug)]
struct FinalGameRow {
    final_game_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    court_time_id: i32,
    age_id: i32,
    grade_id: i32,
    team_a_id: i32,
    team_b_id: i32,
    game_date: chrono::NaiveDate,
    start_time: chrono::NaiveTime,
    game_name: String,
    organisation_name: String,
    competition_name: String,
    season_name: String,
    venue_name: String,
    court_name: String,
    age_name: String,
    grade_name: String,
    team_a_name: String,
    team_b_name: String,
    game_status: String,
    created_at: DateTime<Utc>,
}

impl FinalGameRow {
    fn into_entry(self) -> Result<FinalGameEntry, EngineError> {
        let game_status =
            FinalStatus::parse(&self.game_status).ok_or_else(|| bad_enum("game_status", &self.game_status))?;
        Ok(FinalGameEntry { final_game_id: self.final_game_id,
                            run_id: self.run_id,
                            round_id: self.round_id,
                            court_time_id: self.court_time_id,
                            age_id: self.age_id,
                            grade_id: self.grade_id,
                            team_a_id: self.team_a_id,
                            team_b_id: self.team_b_id,
                            game_date: self.game_date,
                            start_time: self.start_time,
                            game_name: self.game_name,
                            organisation_name: self.organisation_name,
                            competition_name: self.competition_name,
                            season_name: self.season_name,
                            venue_name: self.venue_name,
                            court_name: self.court_name,
                            age_name: self.age_name,
                            grade_name: self.grade_name,
                            team_a_name: self.team_a_name,
                            team_b_name: self.team_b_name,
                            game_status,
                            created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = final_games)]
struct NewFinalGameRow<'a> {
    final_game_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    court_time_id: i32,
    age_id: i32,
    grade_id: i32,
    team_a_id: i32,
    team_b_id: i32,
    game_date: chrono::NaiveDate,
    start_time: chrono::NaiveTime,
    game_name: &'a str,
    organisation_name: &'a str,
    competition_name: &'a str,
    season_name: &'a str,
    venue_name: &'a str,
    court_name: &'a str,
    age_name: &'a str,
    grade_name: &'a str,
    team_a_name: &'a str,
    team_b_name: &'a str,
    game_status: &'static str,
    created_at: DateTime<Utc>,
}

impl<'a> NewFinalGameRow<'a> {
    fn from_entry(entry: &'a FinalGameEntry) -> Self {
        NewFinalGameRow { final_game_id: entry.final_game_id,
                          run_id: entry.run_id,
                          round_id: entry.round_id,
                          court_time_id: entry.court_time_id,
                          age_id: entry.age_id,
                          grade_id: entry.grade_id,
                          team_a_id: entry.team_a_id,
                          team_b_id: entry.team_b_id,
                          game_date: entry.game_date,
                          start_time: entry.start_time,
                          game_name: &entry.game_name,
                          organisation_name: &entry.organisation_name,
                          competition_name: &entry.competition_name,
                          season_name: &entry.season_name,
                          venue_name: &entry.venue_name,
                          court_name: &entry.court_name,
                          age_name: &entry.age_name,
                          grade_name: &entry.grade_name,
                          team_a_name: &entry.team_a_name,
                          team_b_name: &entry.team_b_name,
                          game_status: entry.game_status.as_str(),
                          created_at: entry.created_at }
    }
}

#[derive(Queryable, Debug)]
struct FinalByeRow {
    final_bye_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_id: i32,
    bye_date: chrono::NaiveDate,
    bye_name: String,
    organisation_name: String,
    competition_name: String,
    season_name: String,
    age_name: String,
    grade_name: String,
    team_name: String,
    bye_reason: String,
    game_status: String,
    created_at: DateTime<Utc>,
}

impl FinalByeRow {
    fn into_entry(self) -> Result<FinalByeEntry, EngineError> {
        let bye_reason = ByeReason::parse(&self.bye_reason).ok_or_else(|| bad_enum("bye_reason", &self.bye_reason))?;
        let game_status =
            FinalStatus::parse(&self.game_status).ok_or_else(|| bad_enum("game_status", &self.game_status))?;
        Ok(FinalByeEntry { final_bye_id: self.final_bye_id,
                           run_id: self.run_id,
                           round_id: self.round_id,
                           age_id: self.age_id,
                           grade_id: self.grade_id,
                           team_id: self.team_id,
                           bye_date: self.bye_date,
                           bye_name: self.bye_name,
                           organisation_name: self.organisation_name,
                           competition_name: self.competition_name,
                           season_name: self.season_name,
                           age_name: self.age_name,
                           grade_name: self.grade_name,
                           team_name: self.team_name,
                           bye_reason,
                           game_status,
                           created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = final_byes)]
struct NewFinalByeRow<'a> {
    final_bye_id: Uuid,
    run_id: Uuid,
    round_id: i32,
    age_id: i32,
    grade_id: i32,
    team_id: i32,
    bye_date: chrono::NaiveDate,
    bye_name: &'a str,
    organisation_name: &'a str,
    competition_name: &'a str,
    season_name: &'a str,
    age_name: &'a str,
    grade_name: &'a str,
    team_name: &'a str,
    bye_reason: &'static str,
    game_status: &'static str,
    created_at: DateTime<Utc>,
}

impl<'a> NewFinalByeRow<'a> {
    fn from_entry(entry: &'a FinalByeEntry) -> Self {
        NewFinalByeRow { final_bye_id: entry.final_bye_id,
                         run_id: entry.run_id,
                         round_id: entry.round_id,
                         age_id: entry.age_id,
                         grade_id: entry.grade_id,
                         team_id: entry.team_id,
                         bye_date: entry.bye_date,
                         bye_name: &entry.bye_name,
                         organisation_name: &entry.organisation_name,
                         competition_name: &entry.competition_name,
                         season_name: &entry.season_name,
                         age_name: &entry.age_name,
                         grade_name: &entry.grade_name,
                         team_name: &entry.team_name,
                         bye_reason: entry.bye_reason.as_str(),
                         game_status: entry.game_status.as_str(),
                         created_at: entry.created_at }
    }
}

/// Implementación Postgres de `StagingStore`.
pub struct PgStagingStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgStagingStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> StagingStore for PgStagingStore<P> {
    fn add_p2(&self, row: P2Allocation) -> Result<(), EngineError> {
        let res = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(p2_slot_allocations::table).values(NewP2Row::from_alloc(&row))
                                                           .execute(&mut conn)
                                                           .map(|_| ())
                                                           .map_err(PersistenceError::from)
        });
        match res {
            Err(PersistenceError::UniqueViolation(_)) => Err(EngineError::DuplicateClaim { round_id: row.round_id,
                                                                                          court_time_id:
                                                                                              row.court_time_id }),
            other => Ok(other?),
        }
    }

    fn list_p2(&self, run_id: Uuid) -> Result<Vec<P2Allocation>, EngineError> {
        let rows: Vec<P2Row> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            p2_slot_allocations::table.filter(p2_slot_allocations::run_id.eq(run_id))
                                      .order(p2_slot_allocations::claim_seq.asc())
                                      .load(&mut conn)
                                      .map_err(PersistenceError::from)
        })?;
        Ok(rows.into_iter().map(P2Row::into_alloc).collect())
    }

    fn clear_p2(&self, run_id: Uuid) -> Result<(), EngineError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(p2_slot_allocations::table.filter(p2_slot_allocations::run_id.eq(run_id)))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(PersistenceError::from)
        })?;
        Ok(())
    }

    fn add_game(&self, row: P3GameAllocation) -> Result<(), EngineError> {
        let res = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(p3_game_allocations::table).values(NewGameRow::from_alloc(&row))
                                                           .execute(&mut conn)
                                                           .map(|_| ())
                                                           .map_err(PersistenceError::from)
        });
        match res {
            Err(PersistenceError::UniqueViolation(_)) => Err(EngineError::DuplicateClaim { round_id: row.round_id,
                                                                                          court_time_id:
                                                                                              row.court_time_id }),
            other => Ok(other?),
        }
    }

    fn list_games(&self, run_id: Uuid) -> Result<Vec<P3GameAllocation>, EngineError> {
        let rows: Vec<GameRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            p3_game_allocations::table.filter(p3_game_allocations::run_id.eq(run_id))
                                      .order(p3_game_allocations::insert_seq.asc())
                                      .load(&mut conn)
                                      .map_err(PersistenceError::from)
        })?;
        Ok(rows.into_iter().map(GameRow::into_alloc).collect())
    }

    fn add_bye(&self, row: P3ByeAllocation) -> Result<(), EngineError> {
        let res = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(p3_bye_allocations::table).values(NewByeRow::from_alloc(&row))
                                                          .execute(&mut conn)
                                                          .map(|_| ())
                                                          .map_err(PersistenceError::from)
        });
        match res {
            Err(PersistenceError::UniqueViolation(_)) => Err(EngineError::DuplicateBye { round_id: row.round_id,
                                                                                        team_id: row.team_id }),
            other => Ok(other?),
        }
    }

    fn list_byes(&self, run_id: Uuid) -> Result<Vec<P3ByeAllocation>, EngineError> {
        let rows: Vec<ByeRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            p3_bye_allocations::table.filter(p3_bye_allocations::run_id.eq(run_id))
                                     .order(p3_bye_allocations::insert_seq.asc())
                                     .load(&mut conn)
                                     .map_err(PersistenceError::from)
        })?;
        rows.into_iter().map(ByeRow::into_alloc).collect()
    }

    fn clear_p3(&self, run_id: Uuid) -> Result<(), EngineError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<(), diesel::result::Error> {
                    diesel::delete(p3_game_allocations::table.filter(p3_game_allocations::run_id.eq(run_id)))
                        .execute(tx)?;
                    diesel::delete(p3_bye_allocations::table.filter(p3_bye_allocations::run_id.eq(run_id)))
                        .execute(tx)?;
                    Ok(())
                })
                .map_err(PersistenceError::from)
        })?;
        Ok(())
    }

    fn record_diff(&self, diff: StagingDiff) -> Result<(), EngineError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(staging_diffs::table).values(NewDiffRow::from_diff(&diff))
                                                     .execute(&mut conn)
                                                     .map(|_| ())
                                                     .map_err(PersistenceError::from)
        })?;
        Ok(())
    }

    fn list_diffs(&self, run_id: Uuid) -> Result<Vec<StagingDiff>, EngineError> {
        let rows: Vec<DiffRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            staging_diffs::table.filter(staging_diffs::run_id.eq(run_id))
                                .order(staging_diffs::diff_seq.asc())
                                .load(&mut conn)
                                .map_err(PersistenceError::from)
        })?;
        rows.into_iter().map(DiffRow::into_diff).collect()
    }

    fn save_snapshot(&self,
                     run_id: Uuid,
                     stage: SavedStatus,
                     games: Vec<SavedGame>,
                     byes: Vec<SavedBye>)
                     -> Result<(), EngineError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<(), diesel::result::Error> {
                    diesel::delete(snapshot_games::table.filter(snapshot_games::run_id.eq(run_id))
                                                        .filter(snapshot_games::game_status.eq(stage.as_str())))
                        .execute(tx)?;
                    diesel::delete(snapshot_byes::table.filter(snapshot_byes::run_id.eq(run_id))
                                                       .filter(snapshot_byes::game_status.eq(stage.as_str())))
                        .execute(tx)?;
                    let game_rows: Vec<NewSnapGameRow> = games.iter().map(NewSnapGameRow::from_saved).collect();
                    if !game_rows.is_empty() {
                        diesel::insert_into(snapshot_games::table).values(&game_rows).execute(tx)?;
                    }
                    let bye_rows: Vec<NewSnapByeRow> = byes.iter().map(NewSnapByeRow::from_saved).collect();
                    if !bye_rows.is_empty() {
                        diesel::insert_into(snapshot_byes::table).values(&bye_rows).execute(tx)?;
                    }
                    Ok(())
                })
                .map_err(PersistenceError::from)
        })?;
        Ok(())
    }

    fn latest_snapshot(&self, run_id: Uuid) -> Result<Option<SnapshotBundle>, EngineError> {
        let (game_rows, bye_rows) = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let games: Vec<SnapGameRow> =
                snapshot_games::table.filter(snapshot_games::run_id.eq(run_id))
                                     .order((snapshot_games::round_id.asc(), snapshot_games::court_time_id.asc()))
                                     .load(&mut conn)
                                     .map_err(PersistenceError::from)?;
            let byes: Vec<SnapByeRow> =
                snapshot_byes::table.filter(snapshot_byes::run_id.eq(run_id))
                                    .order((snapshot_byes::round_id.asc(), snapshot_byes::team_id.asc()))
                                    .load(&mut conn)
                                    .map_err(PersistenceError::from)?;
            Ok((games, byes))
        })?;
        let mut top: Option<SavedStatus> = None;
        for raw in game_rows.iter()
                            .map(|g| g.game_status.as_str())
                            .chain(bye_rows.iter().map(|b| b.game_status.as_str()))
        {
            let stage = SavedStatus::parse(raw).ok_or_else(|| bad_enum("game_status", raw))?;
            top = Some(top.map_or(stage, |t| t.max(stage)));
        }
        let Some(stage) = top else {
            return Ok(None);
        };
        let games = game_rows.into_iter()
                             .filter(|g| g.game_status == stage.as_str())
                             .map(SnapGameRow::into_saved)
                             .collect::<Result<Vec<_>, _>>()?;
        let byes = bye_rows.into_iter()
                           .filter(|b| b.game_status == stage.as_str())
                           .map(SnapByeRow::into_saved)
                           .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(SnapshotBundle { stage, games, byes }))
    }

    fn save_constraints(&self, run_id: Uuid, phase: SnapshotPhase, snapshot: Value) -> Result<(), EngineError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(constraint_snapshots::table)
                .values((constraint_snapshots::run_id.eq(run_id),
                         constraint_snapshots::phase.eq(phase.as_str()),
                         constraint_snapshots::snapshot.eq(snapshot.clone()),
                         constraint_snapshots::created_at.eq(Utc::now())))
                .on_conflict((constraint_snapshots::run_id, constraint_snapshots::phase))
                .do_update()
                .set(constraint_snapshots::snapshot.eq(excluded(constraint_snapshots::snapshot)))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(PersistenceError::from)
        })?;
        Ok(())
    }

    fn constraint_snapshot(&self, run_id: Uuid, phase: SnapshotPhase) -> Result<Option<Value>, EngineError> {
        let snapshot: Option<Value> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            constraint_snapshots::table.find((run_id, phase.as_str()))
                                       .select(constraint_snapshots::snapshot)
                                       .first(&mut conn)
                                       .optional()
                                       .map_err(PersistenceError::from)
        })?;
        Ok(snapshot)
    }

    fn publish_final(&self,
                     run_id: Uuid,
                     round_ids: &[i32],
                     games: Vec<FinalGameEntry>,
                     byes: Vec<FinalByeEntry>)
                     -> Result<(), EngineError> {
        let _ = run_id;
        let mut seen_slots = HashSet::new();
        for game in &games {
            if !seen_slots.insert((game.round_id, game.court_time_id)) {
                return Err(EngineError::FinaliseConflict(format!("franja repetida en el lote: round={} court_time={}",
                                                                 game.round_id, game.court_time_id)));
            }
        }
        let mut seen_byes = HashSet::new();
        for bye in &byes {
            if !seen_byes.insert((bye.round_id, bye.team_id)) {
                return Err(EngineError::FinaliseConflict(format!("bye repetido en el lote: round={} team={}",
                                                                 bye.round_id, bye.team_id)));
            }
        }
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| -> Result<(), diesel::result::Error> {
                    diesel::delete(final_games::table.filter(final_games::round_id.eq_any(round_ids))).execute(tx)?;
                    diesel::delete(final_byes::table.filter(final_byes::round_id.eq_any(round_ids))).execute(tx)?;
                    let game_rows: Vec<NewFinalGameRow> = games.iter().map(NewFinalGameRow::from_entry).collect();
                    if !game_rows.is_empty() {
                        diesel::insert_into(final_games::table).values(&game_rows).execute(tx)?;
                    }
                    let bye_rows: Vec<NewFinalByeRow> = byes.iter().map(NewFinalByeRow::from_entry).collect();
                    if !bye_rows.is_empty() {
                        diesel::insert_into(final_byes::table).values(&bye_rows).execute(tx)?;
                    }
                    Ok(())
                })
                .map_err(PersistenceError::from)
        })?;
        Ok(())
    }

    fn final_schedule(&self, round_ids: &[i32]) -> Result<(Vec<FinalGameEntry>, Vec<FinalByeEntry>), EngineError> {
        let (game_rows, bye_rows) = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let games: Vec<FinalGameRow> =
                final_games::table.filter(final_games::round_id.eq_any(round_ids))
                                  .order((final_games::round_id.asc(), final_games::court_time_id.asc()))
                                  .load(&mut conn)
                                  .map_err(PersistenceError::from)?;
            let byes: Vec<FinalByeRow> =
                final_byes::table.filter(final_byes::round_id.eq_any(round_ids))
                                 .order((final_byes::round_id.asc(), final_byes::team_id.asc()))
                                 .load(&mut conn)
                                 .map_err(PersistenceError::from)?;
            Ok((games, byes))
        })?;
        let games = game_rows.into_iter()
                             .map(FinalGameRow::into_entry)
                             .collect::<Result<Vec<_>, _>>()?;
        let byes = bye_rows.into_iter()
                           .map(FinalByeRow::into_entry)
                           .collect::<Result<Vec<_>, _>>()?;
        Ok((games, byes))
    }
}
