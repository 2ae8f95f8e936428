//! Piezas compartidas por las pruebas de integración: un armador de
//! jornadas sintéticas, proyecciones comparables del programa final y un
//! `StagingStore` que falla a pedido para simular cortes de proceso.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use fixture_core::model::{P2Allocation, P3ByeAllocation, P3GameAllocation, SavedBye, SavedGame, SavedStatus,
                          SnapshotPhase, StagingDiff};
use fixture_core::store::memory::{InMemoryRunStore, InMemoryStagingStore};
use fixture_core::store::{RunStore, SnapshotBundle, StagingStore};
use fixture_core::{EngineError, FinalByeEntry, FinalGameEntry, InMemoryEventStore, ProcessType, RunType,
                   SchedulerEngine, SchedulingRun, SubmitOutcome, SubmitRequest};
use fixture_domain::{Age, AgeRoundConstraint, AvailabilityStatus, Court, CourtRanking, CourtTime, DayPlan,
                     DayPlanData, Grade, GradeCourtRestriction, GradeRoundConstraint, LockState, NamingContext,
                     OverrideBye, OverrideGame, RequiredGames, Round, RoundDate, RoundRules, RoundSetting, SeasonDay,
                     Team, TimeSlot, Venue};

pub const SEASON_ID: i32 = 7;
pub const SEASON_DAY_ID: i32 = 70;
pub const SETTING: i32 = 1;

/// Id de cancha-franja bajo la convención del armador: cancha 2, franja 1
/// es `201`.
pub fn court_time(court: i32, slot: i32) -> i32 {
    court * 100 + slot
}

/// Id de la ronda `n` (desde 1) bajo la convención del armador.
pub fn round_id(n: i32) -> i32 {
    900 + (n - 1)
}

/// Arma jornadas de prueba con una sede, canchas rankeadas `1..=n`,
/// franjas consecutivas desde las 09:00 y una única configuración de
/// ronda. Los equipos del grado `g` llevan ids `g*10, g*10+1, ...`, así
/// que los grados de una misma prueba deben ir separados al menos en uno.
pub struct PlanBuilder {
    grades: Vec<(i32, i32, usize)>,
    courts: i32,
    slots: i32,
    rounds: i32,
    default_required: u32,
    required: Vec<RequiredGames>,
    grade_blocks: Vec<(i32, i32)>,
    override_games: Vec<OverrideGame>,
    override_byes: Vec<OverrideBye>,
    extra_team: Option<(i32, i32)>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        PlanBuilder { grades: Vec::new(),
                      courts: 2,
                      slots: 2,
                      rounds: 1,
                      default_required: 2,
                      required: Vec::new(),
                      grade_blocks: Vec::new(),
                      override_games: Vec::new(),
                      override_byes: Vec::new(),
                      extra_team: None }
    }

    /// Agrega un grado con sus equipos; da de alta la edad si hace falta.
    pub fn grade(mut self, age_id: i32, grade_id: i32, team_count: usize) -> Self {
        self.grades.push((age_id, grade_id, team_count));
        self
    }

    pub fn courts(mut self, n: i32) -> Self {
        self.courts = n;
        self
    }

    pub fn slots(mut self, n: i32) -> Self {
        self.slots = n;
        self
    }

    pub fn rounds(mut self, n: i32) -> Self {
        self.rounds = n;
        self
    }

    pub fn required_default(mut self, games: u32) -> Self {
        self.default_required = games;
        self
    }

    pub fn required_for(mut self, age_id: i32, grade_id: i32, games: u32) -> Self {
        self.required.push(RequiredGames { age_id, grade_id, games });
        self
    }

    /// Veta una cancha-franja para un grado.
    pub fn block_grade(mut self, grade_id: i32, court_time_id: i32) -> Self {
        self.grade_blocks.push((grade_id, court_time_id));
        self
    }

    pub fn fixed_game(mut self, round: i32, age_id: i32, grade_id: i32, a: i32, b: i32, court_time_id: i32) -> Self {
        self.override_games.push(OverrideGame { round_id: round,
                                                age_id,
                                                grade_id,
                                                team_a_id: a,
                                                team_b_id: b,
                                                court_time_id });
        self
    }

    pub fn fixed_bye(mut self, round: i32, age_id: i32, grade_id: i32, team_id: i32) -> Self {
        self.override_byes.push(OverrideBye { round_id: round, age_id, grade_id, team_id });
        self
    }

    /// Un equipo fuera de la numeración regular. Cambia el plantel y con
    /// él el fingerprint de configuración.
    pub fn extra_team(mut self, grade_id: i32, team_id: i32) -> Self {
        self.extra_team = Some((grade_id, team_id));
        self
    }

    pub fn build(self) -> DayPlan {
        let ranked_at = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
        let first_date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let mut data =
            DayPlanData { season_day: Some(SeasonDay { season_day_id: SEASON_DAY_ID,
                                                       season_id: SEASON_ID,
                                                       day_label: "Jornada de prueba".to_string() }),
                          naming: NamingContext { organisation_name: "Liga Norte".to_string(),
                                                  competition_name: "Torneo Apertura".to_string(),
                                                  season_name: "2025".to_string() },
                          ..DayPlanData::default() };

        for &(age_id, grade_id, team_count) in &self.grades {
            if !data.ages.iter().any(|a| a.age_id == age_id) {
                let label = format!("Sub {}", 10 + age_id);
                data.ages
                    .push(Age::new(age_id, &format!("U{}", 10 + age_id), &label, age_id).unwrap());
                data.age_round_constraints
                    .push(AgeRoundConstraint { round_settings_number: SETTING, age_id, active: true });
            }
            data.grades
                .push(Grade::new(grade_id, age_id, &format!("G{grade_id}"), &format!("División {grade_id}"), grade_id).unwrap());
            data.grade_round_constraints
                .push(GradeRoundConstraint { round_settings_number: SETTING, age_id, grade_id, active: true });
            for i in 0..team_count {
                let team_id = grade_id * 10 + i as i32;
                data.teams.push(Team::new(team_id, grade_id, &format!("Equipo {team_id}")).unwrap());
            }
        }
        if let Some((grade_id, team_id)) = self.extra_team {
            data.teams.push(Team::new(team_id, grade_id, &format!("Equipo {team_id}")).unwrap());
        }

        data.venues.push(Venue { venue_id: 1, venue_name: "Polideportivo Central".to_string() });
        for c in 1..=self.courts {
            data.courts.push(Court { court_id: c, venue_id: 1, court_name: format!("Cancha {c}") });
            data.court_rankings.push(CourtRanking { court_rank_id: c,
                                                    season_day_id: SEASON_DAY_ID,
                                                    round_settings_number: SETTING,
                                                    court_id: c,
                                                    court_rank: c,
                                                    overridden: false,
                                                    created_at: ranked_at });
        }
        for s in 1..=self.slots {
            data.time_slots.push(TimeSlot { time_slot_id: s,
                                            start_time: NaiveTime::from_hms_opt(8 + s as u32, 0, 0).unwrap(),
                                            duration_min: 60 });
        }
        for c in 1..=self.courts {
            for s in 1..=self.slots {
                data.court_times.push(CourtTime { court_time_id: court_time(c, s),
                                                  season_day_id: SEASON_DAY_ID,
                                                  round_settings_number: SETTING,
                                                  court_id: c,
                                                  time_slot_id: s,
                                                  availability_status: AvailabilityStatus::Available,
                                                  lock_state: LockState::Open,
                                                  block_reason: None });
            }
        }

        for n in 1..=self.rounds {
            data.rounds.push(Round { round_id: round_id(n),
                                     season_id: SEASON_ID,
                                     round_number: n,
                                     round_label: format!("Ronda {n}"),
                                     round_settings_number: SETTING });
            data.round_dates.push(RoundDate { round_id: round_id(n),
                                              season_day_id: SEASON_DAY_ID,
                                              game_date: first_date + Duration::days(7 * i64::from(n - 1)) });
        }
        data.round_settings.push(RoundSetting { round_setting_id: 1,
                                                season_day_id: SEASON_DAY_ID,
                                                round_settings_number: SETTING,
                                                rules: RoundRules { schema_version: 1,
                                                                    default_required_games: self.default_required,
                                                                    required_games: self.required } });

        for (grade_id, court_time_id) in self.grade_blocks {
            data.grade_court_restrictions
                .push(GradeCourtRestriction { round_settings_number: SETTING, grade_id, court_time_id });
        }
        data.overrides.games = self.override_games;
        data.overrides.byes = self.override_byes;

        DayPlan::from_data(data).expect("la jornada de prueba debe validar")
    }
}

pub fn request(key: &str, seed: &str) -> SubmitRequest {
    SubmitRequest { season_id: SEASON_ID,
                    season_day_id: SEASON_DAY_ID,
                    process_type: ProcessType::Initial,
                    run_type: Some(RunType::IRun1),
                    round_ids: Vec::new(),
                    seed_master: seed.to_string(),
                    idempotency_key: key.to_string() }
}

pub fn submit_created<R, S>(engine: &SchedulerEngine<R, S>, plan: &DayPlan, req: SubmitRequest) -> SchedulingRun
    where R: RunStore,
          S: StagingStore
{
    match engine.submit(plan, req) {
        Ok(SubmitOutcome::Created(run)) => run,
        other => panic!("se esperaba una corrida nueva, hubo {other:?}"),
    }
}

/// Proyección comparable de los juegos publicados: `(ronda, franja,
/// local, visita)` ordenado. Deja afuera ids generados y timestamps.
pub fn game_key(games: &[FinalGameEntry]) -> Vec<(i32, i32, i32, i32)> {
    let mut keys: Vec<(i32, i32, i32, i32)> = games.iter()
                                                   .map(|g| (g.round_id, g.court_time_id, g.team_a_id, g.team_b_id))
                                                   .collect();
    keys.sort_unstable();
    keys
}

/// Proyección comparable de los byes publicados: `(ronda, equipo, motivo)`
/// ordenado.
pub fn bye_key(byes: &[FinalByeEntry]) -> Vec<(i32, i32, &'static str)> {
    let mut keys: Vec<(i32, i32, &'static str)> = byes.iter()
                                                      .map(|b| (b.round_id, b.team_id, b.bye_reason.as_str()))
                                                      .collect();
    keys.sort_unstable();
    keys
}

/// `StagingStore` en memoria que devuelve un error de almacenamiento en la
/// n-ésima llamada armada y se desarma solo. Simula el corte de proceso a
/// mitad de fase que el protocolo de checkpoints debe sobrevivir.
pub struct FlakyStaging {
    inner: InMemoryStagingStore,
    p2_armed: AtomicUsize,
    p2_seen: AtomicUsize,
    game_armed: AtomicUsize,
    game_seen: AtomicUsize,
}

impl FlakyStaging {
    pub fn new() -> Self {
        FlakyStaging { inner: InMemoryStagingStore::new(),
                       p2_armed: AtomicUsize::new(0),
                       p2_seen: AtomicUsize::new(0),
                       game_armed: AtomicUsize::new(0),
                       game_seen: AtomicUsize::new(0) }
    }

    /// Falla la n-ésima escritura de fase 2 (desde 1).
    pub fn fail_nth_p2(&self, nth: usize) {
        self.p2_armed.store(nth, Ordering::SeqCst);
        self.p2_seen.store(0, Ordering::SeqCst);
    }

    /// Falla la n-ésima escritura de juego de fase 3 (desde 1).
    pub fn fail_nth_game(&self, nth: usize) {
        self.game_armed.store(nth, Ordering::SeqCst);
        self.game_seen.store(0, Ordering::SeqCst);
    }

    fn trip(armed: &AtomicUsize, seen: &AtomicUsize, what: &str) -> Result<(), EngineError> {
        let target = armed.load(Ordering::SeqCst);
        if target == 0 {
            return Ok(());
        }
        if seen.fetch_add(1, Ordering::SeqCst) + 1 == target {
            armed.store(0, Ordering::SeqCst);
            return Err(EngineError::Storage(format!("corte simulado en {what}")));
        }
        Ok(())
    }
}

impl StagingStore for FlakyStaging {
    fn add_p2(&self, row: P2Allocation) -> Result<(), EngineError> {
        Self::trip(&self.p2_armed, &self.p2_seen, "add_p2")?;
        self.inner.add_p2(row)
    }

    fn list_p2(&self, run_id: Uuid) -> Result<Vec<P2Allocation>, EngineError> {
        self.inner.list_p2(run_id)
    }

    fn clear_p2(&self, run_id: Uuid) -> Result<(), EngineError> {
        self.inner.clear_p2(run_id)
    }

    fn add_game(&self, row: P3GameAllocation) -> Result<(), EngineError> {
        Self::trip(&self.game_armed, &self.game_seen, "add_game")?;
        self.inner.add_game(row)
    }

    fn list_games(&self, run_id: Uuid) -> Result<Vec<P3GameAllocation>, EngineError> {
        self.inner.list_games(run_id)
    }

    fn add_bye(&self, row: P3ByeAllocation) -> Result<(), EngineError> {
        self.inner.add_bye(row)
    }

    fn list_byes(&self, run_id: Uuid) -> Result<Vec<P3ByeAllocation>, EngineError> {
        self.inner.list_byes(run_id)
    }

    fn clear_p3(&self, run_id: Uuid) -> Result<(), EngineError> {
        self.inner.clear_p3(run_id)
    }

    fn record_diff(&self, diff: StagingDiff) -> Result<(), EngineError> {
        self.inner.record_diff(diff)
    }

    fn list_diffs(&self, run_id: Uuid) -> Result<Vec<StagingDiff>, EngineError> {
        self.inner.list_diffs(run_id)
    }

    fn save_snapshot(&self,
                     run_id: Uuid,
                     stage: SavedStatus,
                     games: Vec<SavedGame>,
                     byes: Vec<SavedBye>)
                     -> Result<(), EngineError> {
        self.inner.save_snapshot(run_id, stage, games, byes)
    }

    fn latest_snapshot(&self, run_id: Uuid) -> Result<Option<SnapshotBundle>, EngineError> {
        self.inner.latest_snapshot(run_id)
    }

    fn save_constraints(&self, run_id: Uuid, phase: SnapshotPhase, snapshot: Value) -> Result<(), EngineError> {
        self.inner.save_constraints(run_id, phase, snapshot)
    }

    fn constraint_snapshot(&self, run_id: Uuid, phase: SnapshotPhase) -> Result<Option<Value>, EngineError> {
        self.inner.constraint_snapshot(run_id, phase)
    }

    fn publish_final(&self,
                     run_id: Uuid,
                     round_ids: &[i32],
                     games: Vec<FinalGameEntry>,
                     byes: Vec<FinalByeEntry>)
                     -> Result<(), EngineError> {
        self.inner.publish_final(run_id, round_ids, games, byes)
    }

    fn final_schedule(&self, round_ids: &[i32]) -> Result<(Vec<FinalGameEntry>, Vec<FinalByeEntry>), EngineError> {
        self.inner.final_schedule(round_ids)
    }
}

/// Motor con almacenes en memoria y el staging que falla a pedido.
pub fn flaky_engine() -> SchedulerEngine<InMemoryRunStore, FlakyStaging> {
    SchedulerEngine::new_with_stores(InMemoryRunStore::new(), FlakyStaging::new(), Arc::new(InMemoryEventStore::new()))
}
