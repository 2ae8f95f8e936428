//! Finalización: del último snapshot al programa publicado.
//!
//! `build_final_batch` denormaliza nombres, fechas y horarios del plan de
//! jornada sobre cada juego y bye, y valida las unicidades de publicación
//! antes de tocar el store. Cualquier duplicado hace fallar el lote entero:
//! nada se publica a medias.

use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use fixture_domain::DayPlan;

use crate::errors::EngineError;
use crate::model::{DiffEntity, FinalByeEntry, FinalGameEntry, FinalStatus, P3ByeAllocation, P3GameAllocation,
                   StagingDiff};

/// Lote de publicación validado: una corrida, sus rondas y todas las filas
/// listas para `publish_final`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalBatch {
    pub round_ids: Vec<i32>,
    pub games: Vec<FinalGameEntry>,
    pub byes: Vec<FinalByeEntry>,
}

fn lookup<'a, T>(item: Option<&'a T>, what: &str, id: i32) -> Result<&'a T, EngineError> {
    item.ok_or_else(|| EngineError::Internal(format!("{what} {id} ausente del plan al finalizar")))
}

/// Construye el lote final a partir de las filas staged de la fase 3.
///
/// Valida que ninguna cancha-franja lleve dos juegos en la misma ronda y
/// que ningún equipo quede comprometido dos veces (juego o bye) en una
/// ronda; la violación es `FinaliseConflict` y aborta el lote completo.
pub fn build_final_batch(plan: &DayPlan,
                         run_id: Uuid,
                         round_ids: &[i32],
                         games: &[P3GameAllocation],
                         byes: &[P3ByeAllocation])
                         -> Result<FinalBatch, EngineError> {
    let scope: HashSet<i32> = round_ids.iter().copied().collect();
    let naming = plan.naming();
    let mut used_slots: HashSet<(i32, i32)> = HashSet::new();
    let mut committed: HashSet<(i32, i32)> = HashSet::new();

    let mut out_games: Vec<FinalGameEntry> = Vec::with_capacity(games.len());
    for g in games {
        if !scope.contains(&g.round_id) {
            return Err(EngineError::Internal(format!("juego staged fuera de las rondas de la corrida: ronda {}",
                                                     g.round_id)));
        }
        if !used_slots.insert((g.round_id, g.court_time_id)) {
            return Err(EngineError::FinaliseConflict(format!("dos juegos sobre court_time {} en la ronda {}",
                                                             g.court_time_id, g.round_id)));
        }
        for team_id in [g.team_a_id, g.team_b_id] {
            if !committed.insert((g.round_id, team_id)) {
                return Err(EngineError::FinaliseConflict(format!("equipo {team_id} comprometido dos veces en la ronda {}",
                                                                 g.round_id)));
            }
        }

        let court_time = lookup(plan.court_time(g.court_time_id), "court_time", g.court_time_id)?;
        let court = lookup(plan.court(court_time.court_id), "court", court_time.court_id)?;
        let venue = lookup(plan.venue(court.venue_id), "venue", court.venue_id)?;
        let slot = lookup(plan.time_slot(court_time.time_slot_id), "time_slot", court_time.time_slot_id)?;
        let age = lookup(plan.age(g.age_id), "age", g.age_id)?;
        let grade = lookup(plan.grade(g.grade_id), "grade", g.grade_id)?;
        let team_a = lookup(plan.team(g.team_a_id), "team", g.team_a_id)?;
        let team_b = lookup(plan.team(g.team_b_id), "team", g.team_b_id)?;
        let game_date = plan.date_for_round(g.round_id)
                            .ok_or_else(|| EngineError::Internal(format!("ronda {} sin fecha al finalizar",
                                                                         g.round_id)))?;

        out_games.push(FinalGameEntry { final_game_id: Uuid::new_v4(),
                                        run_id,
                                        round_id: g.round_id,
                                        court_time_id: g.court_time_id,
                                        age_id: g.age_id,
                                        grade_id: g.grade_id,
                                        team_a_id: g.team_a_id,
                                        team_b_id: g.team_b_id,
                                        game_date,
                                        start_time: slot.start_time,
                                        game_name: format!("{} {}: {} v {}",
                                                           age.age_name,
                                                           grade.grade_name,
                                                           team_a.team_name,
                                                           team_b.team_name),
                                        organisation_name: naming.organisation_name.clone(),
                                        competition_name: naming.competition_name.clone(),
                                        season_name: naming.season_name.clone(),
                                        venue_name: venue.venue_name.clone(),
                                        court_name: court.court_name.clone(),
                                        age_name: age.age_name.clone(),
                                        grade_name: grade.grade_name.clone(),
                                        team_a_name: team_a.team_name.clone(),
                                        team_b_name: team_b.team_name.clone(),
                                        game_status: FinalStatus::Finalised,
                                        created_at: Utc::now() });
    }

    let mut out_byes: Vec<FinalByeEntry> = Vec::with_capacity(byes.len());
    for b in byes {
        if !scope.contains(&b.round_id) {
            return Err(EngineError::Internal(format!("bye staged fuera de las rondas de la corrida: ronda {}",
                                                     b.round_id)));
        }
        if !committed.insert((b.round_id, b.team_id)) {
            return Err(EngineError::FinaliseConflict(format!("equipo {} comprometido dos veces en la ronda {}",
                                                             b.team_id, b.round_id)));
        }

        let age = lookup(plan.age(b.age_id), "age", b.age_id)?;
        let grade = lookup(plan.grade(b.grade_id), "grade", b.grade_id)?;
        let team = lookup(plan.team(b.team_id), "team", b.team_id)?;
        let bye_date = plan.date_for_round(b.round_id)
                           .ok_or_else(|| EngineError::Internal(format!("ronda {} sin fecha al finalizar",
                                                                        b.round_id)))?;

        out_byes.push(FinalByeEntry { final_bye_id: Uuid::new_v4(),
                                      run_id,
                                      round_id: b.round_id,
                                      age_id: b.age_id,
                                      grade_id: b.grade_id,
                                      team_id: b.team_id,
                                      bye_date,
                                      bye_name: format!("{} {}: {} (bye)",
                                                        age.age_name,
                                                        grade.grade_name,
                                                        team.team_name),
                                      organisation_name: naming.organisation_name.clone(),
                                      competition_name: naming.competition_name.clone(),
                                      season_name: naming.season_name.clone(),
                                      age_name: age.age_name.clone(),
                                      grade_name: grade.grade_name.clone(),
                                      team_name: team.team_name.clone(),
                                      bye_reason: b.bye_reason,
                                      game_status: FinalStatus::Finalised,
                                      created_at: Utc::now() });
    }

    out_games.sort_by_key(|g| (g.round_id, g.court_time_id));
    out_byes.sort_by_key(|b| (b.round_id, b.team_id));
    let mut rounds: Vec<i32> = round_ids.to_vec();
    rounds.sort_unstable();
    rounds.dedup();

    Ok(FinalBatch { round_ids: rounds, games: out_games, byes: out_byes })
}

fn game_summary(g: &FinalGameEntry) -> serde_json::Value {
    json!({
        "round_id": g.round_id,
        "court_time_id": g.court_time_id,
        "age_id": g.age_id,
        "grade_id": g.grade_id,
        "team_a_id": g.team_a_id,
        "team_b_id": g.team_b_id,
    })
}

fn bye_summary(b: &FinalByeEntry) -> serde_json::Value {
    json!({
        "round_id": b.round_id,
        "team_id": b.team_id,
        "age_id": b.age_id,
        "grade_id": b.grade_id,
        "bye_reason": b.bye_reason.as_str(),
    })
}

/// Diffs de auditoría entre el lote nuevo y lo ya publicado para esas
/// rondas. En una corrida inicial `existing_*` viene vacío y todo es `ADD`;
/// en una corrida MID salen `CHANGE` y `REMOVE` contra la publicación
/// anterior. Se compara el resumen canónico, no los timestamps ni los ids
/// de fila.
pub fn diff_against_existing(run_id: Uuid,
                             batch: &FinalBatch,
                             existing_games: &[FinalGameEntry],
                             existing_byes: &[FinalByeEntry])
                             -> Vec<StagingDiff> {
    let mut diffs: Vec<StagingDiff> = Vec::new();

    let old_games: Vec<(&FinalGameEntry, serde_json::Value)> =
        existing_games.iter().map(|g| (g, game_summary(g))).collect();
    for g in &batch.games {
        let entity_id = format!("game:{}:{}", g.round_id, g.court_time_id);
        let after = game_summary(g);
        match old_games.iter()
                       .find(|(old, _)| old.round_id == g.round_id && old.court_time_id == g.court_time_id)
        {
            None => diffs.push(StagingDiff::add(run_id, DiffEntity::CompositeAllocation, entity_id, after)),
            Some((_, before)) if *before != after => {
                diffs.push(StagingDiff::change(run_id, DiffEntity::CompositeAllocation, entity_id, before.clone(),
                                               after));
            }
            Some(_) => {}
        }
    }
    for (old, before) in &old_games {
        if !batch.games.iter().any(|g| g.round_id == old.round_id && g.court_time_id == old.court_time_id) {
            let entity_id = format!("game:{}:{}", old.round_id, old.court_time_id);
            diffs.push(StagingDiff::remove(run_id, DiffEntity::CompositeAllocation, entity_id, before.clone()));
        }
    }

    let old_byes: Vec<(&FinalByeEntry, serde_json::Value)> = existing_byes.iter().map(|b| (b, bye_summary(b))).collect();
    for b in &batch.byes {
        let entity_id = format!("bye:{}:{}", b.round_id, b.team_id);
        let after = bye_summary(b);
        match old_byes.iter().find(|(old, _)| old.round_id == b.round_id && old.team_id == b.team_id) {
            None => diffs.push(StagingDiff::add(run_id, DiffEntity::CompositeAllocation, entity_id, after)),
            Some((_, before)) if *before != after => {
                diffs.push(StagingDiff::change(run_id, DiffEntity::CompositeAllocation, entity_id, before.clone(),
                                               after));
            }
            Some(_) => {}
        }
    }
    for (old, before) in &old_byes {
        if !batch.byes.iter().any(|b| b.round_id == old.round_id && b.team_id == old.team_id) {
            let entity_id = format!("bye:{}:{}", old.round_id, old.team_id);
            diffs.push(StagingDiff::remove(run_id, DiffEntity::CompositeAllocation, entity_id, before.clone()));
        }
    }

    diffs
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::model::{ByeReason, DiffChange};
    use super::*;

    fn game(round_id: i32, court_time_id: i32, team_a_id: i32, team_b_id: i32) -> FinalGameEntry {
        FinalGameEntry { final_game_id: Uuid::new_v4(),
                         run_id: Uuid::new_v4(),
                         round_id,
                         court_time_id,
                         age_id: 1,
                         grade_id: 10,
                         team_a_id,
                         team_b_id,
                         game_date: NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
                         start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                         game_name: "U12 A: x v y".to_string(),
                         organisation_name: "Org".to_string(),
                         competition_name: "Comp".to_string(),
                         season_name: "2025".to_string(),
                         venue_name: "Stadium".to_string(),
                         court_name: "Court 1".to_string(),
                         age_name: "U12".to_string(),
                         grade_name: "A".to_string(),
                         team_a_name: "x".to_string(),
                         team_b_name: "y".to_string(),
                         game_status: FinalStatus::Finalised,
                         created_at: Utc::now() }
    }

    fn bye(round_id: i32, team_id: i32, reason: ByeReason) -> FinalByeEntry {
        FinalByeEntry { final_bye_id: Uuid::new_v4(),
                        run_id: Uuid::new_v4(),
                        round_id,
                        age_id: 1,
                        grade_id: 10,
                        team_id,
                        bye_date: NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
                        bye_name: "U12 A: z (bye)".to_string(),
                        organisation_name: "Org".to_string(),
                        competition_name: "Comp".to_string(),
                        season_name: "2025".to_string(),
                        age_name: "U12".to_string(),
                        grade_name: "A".to_string(),
                        team_name: "z".to_string(),
                        bye_reason: reason,
                        game_status: FinalStatus::Finalised,
                        created_at: Utc::now() }
    }

    #[test]
    fn initial_publish_is_all_adds() {
        let batch = FinalBatch { round_ids: vec![1],
                                 games: vec![game(1, 100, 7, 8)],
                                 byes: vec![bye(1, 9, ByeReason::OddTeams)] };
        let diffs = diff_against_existing(Uuid::new_v4(), &batch, &[], &[]);
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| d.change_type == DiffChange::Add));
    }

    #[test]
    fn republish_reports_changes_and_removals() {
        let batch = FinalBatch { round_ids: vec![1],
                                 games: vec![game(1, 100, 7, 12)],
                                 byes: Vec::new() };
        let existing_games = vec![game(1, 100, 7, 8), game(1, 101, 3, 4)];
        let existing_byes = vec![bye(1, 9, ByeReason::OddTeams)];
        let diffs = diff_against_existing(Uuid::new_v4(), &batch, &existing_games, &existing_byes);

        let changed: Vec<&StagingDiff> = diffs.iter().filter(|d| d.change_type == DiffChange::Change).collect();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].entity_id, "game:1:100");
        let removed: Vec<&str> = diffs.iter()
                                      .filter(|d| d.change_type == DiffChange::Remove)
                                      .map(|d| d.entity_id.as_str())
                                      .collect();
        assert_eq!(removed, vec!["game:1:101", "bye:1:9"]);
    }

    #[test]
    fn unchanged_entries_produce_no_diff() {
        let g = game(1, 100, 7, 8);
        let batch = FinalBatch { round_ids: vec![1], games: vec![g.clone()], byes: Vec::new() };
        let diffs = diff_against_existing(Uuid::new_v4(), &batch, &[g], &[]);
        assert!(diffs.is_empty());
    }
}
