//! Armado de snapshots de checkpoint a partir de las filas staged.
//!
//! El snapshot es la copia durable que permite reanudar sin recomputar: se
//! guarda ANTES de avanzar el checkpoint de la corrida. Tras la fase 2 los
//! juegos aún no tienen equipos (van en `None`); tras la fase 3 y al
//! finalizar se copian completos junto con los byes.

use chrono::Utc;
use uuid::Uuid;

use crate::model::{P2Allocation, P3ByeAllocation, P3GameAllocation, ResumeCheckpoint, SavedBye, SavedGame,
                   SavedStatus};

/// Etiqueta de snapshot que corresponde a un checkpoint ya alcanzado.
/// `BeforeP2` no tiene snapshot: esa fase siempre recomputa.
pub fn stage_for(checkpoint: ResumeCheckpoint) -> Option<SavedStatus> {
    match checkpoint {
        ResumeCheckpoint::BeforeP2 => None,
        ResumeCheckpoint::AfterP2BeforeP3 => Some(SavedStatus::AfterP2BeforeP3),
        ResumeCheckpoint::AfterP3BeforeFinalise => Some(SavedStatus::AfterP3BeforeFinalise),
        ResumeCheckpoint::Finalised => Some(SavedStatus::Finalised),
    }
}

/// Copias de snapshot de los reclamos de la fase 2.
pub fn saved_from_p2(rows: &[P2Allocation]) -> Vec<SavedGame> {
    rows.iter()
        .map(|r| SavedGame { saved_game_id: Uuid::new_v4(),
                             run_id: r.run_id,
                             round_id: r.round_id,
                             age_id: r.age_id,
                             grade_id: r.grade_id,
                             team_a_id: None,
                             team_b_id: None,
                             court_time_id: r.court_time_id,
                             game_status: SavedStatus::AfterP2BeforeP3,
                             created_at: Utc::now() })
        .collect()
}

/// Copias de snapshot de los juegos y byes de la fase 3, etiquetadas con la
/// etapa indicada (`AFTER_P3_BEFORE_FINALISE` o `FINALISED`).
pub fn saved_from_p3(stage: SavedStatus,
                     games: &[P3GameAllocation],
                     byes: &[P3ByeAllocation])
                     -> (Vec<SavedGame>, Vec<SavedBye>) {
    let saved_games = games.iter()
                           .map(|g| SavedGame { saved_game_id: Uuid::new_v4(),
                                                run_id: g.run_id,
                                                round_id: g.round_id,
                                                age_id: g.age_id,
                                                grade_id: g.grade_id,
                                                team_a_id: Some(g.team_a_id),
                                                team_b_id: Some(g.team_b_id),
                                                court_time_id: g.court_time_id,
                                                game_status: stage,
                                                created_at: Utc::now() })
                           .collect();
    let saved_byes = byes.iter()
                         .map(|b| SavedBye { saved_bye_id: Uuid::new_v4(),
                                             run_id: b.run_id,
                                             round_id: b.round_id,
                                             age_id: b.age_id,
                                             grade_id: b.grade_id,
                                             team_id: b.team_id,
                                             bye_reason: b.bye_reason,
                                             game_status: stage,
                                             created_at: Utc::now() })
                         .collect();
    (saved_games, saved_byes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2_snapshot_has_no_teams_yet() {
        let row = P2Allocation { p2_allocation_id: Uuid::new_v4(),
                                 run_id: Uuid::new_v4(),
                                 round_id: 1,
                                 age_id: 2,
                                 grade_id: 3,
                                 court_time_id: 4,
                                 created_at: Utc::now() };
        let saved = saved_from_p2(&[row]);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].team_a_id, None);
        assert_eq!(saved[0].team_b_id, None);
        assert_eq!(saved[0].game_status, SavedStatus::AfterP2BeforeP3);
    }

    #[test]
    fn checkpoint_to_stage_mapping() {
        assert_eq!(stage_for(ResumeCheckpoint::BeforeP2), None);
        assert_eq!(stage_for(ResumeCheckpoint::AfterP2BeforeP3), Some(SavedStatus::AfterP2BeforeP3));
        assert_eq!(stage_for(ResumeCheckpoint::Finalised), Some(SavedStatus::Finalised));
    }
}
