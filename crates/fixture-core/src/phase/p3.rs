//! Fase 3: emparejamiento round-robin y asignación de byes por ronda.
//!
//! Por grado: método del círculo canónico sobre los equipos ordenados por
//! id, con rotación sembrada que avanza una posición por número de ronda.
//! Los overrides manuales entran primero y quedan fuera de la rotación. Cada
//! emparejamiento consume una franja de la fase 2 del mismo grado; sin
//! franja restante, ambos equipos reciben bye `CONSTRAINT`.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use fixture_domain::{DayPlan, Round};

use crate::errors::EngineError;
use crate::hashing::sub_seed;
use crate::model::{ByeReason, ConstraintSet, P2Allocation};
use super::ConstraintNote;

/// Juego decidido por la fase 3, pendiente de materializar como fila.
/// `from_p2` es `None` cuando la franja vino fijada a mano y no coincide
/// con ningún reclamo de fase 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGame {
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_a_id: i32,
    pub team_b_id: i32,
    pub court_time_id: i32,
    pub from_p2: Option<Uuid>,
}

/// Bye decidido por la fase 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBye {
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_id: i32,
    pub reason: ByeReason,
}

/// Salida de la fase 3 para una ronda. `fatal` viene cargado cuando el
/// guardián de progreso abortó la ronda; los byes ya decididos (incluido el
/// `ERROR_LOOP`) igual se devuelven para que queden persistidos.
#[derive(Debug, Clone, PartialEq)]
pub struct P3RoundOutcome {
    pub round_id: i32,
    pub games: Vec<PlannedGame>,
    pub byes: Vec<PlannedBye>,
    pub notes: Vec<ConstraintNote>,
    pub pairings_attempted: u32,
    pub pairs_unplaced: u32,
    pub fatal: Option<EngineError>,
}

/// Emparejamientos de una ronda de la rotación para un conjunto de equipos.
///
/// Método del círculo: el primer equipo queda fijo y el resto rota
/// `rotation` posiciones, donde `rotation = (sub_seed(semilla,
/// "p3-rotation", grado) + numero_de_ronda - 1) mod (n - 1)`. Con cantidad
/// impar se agrega un fantasma; su pareja de turno es el bye de la ronda.
/// Devuelve pares `(a, Some(b))` para juegos y `(a, None)` para el bye.
pub fn rotation_pairs(pool: &[i32], seed_master: &str, grade_id: i32, round_number: i32) -> Vec<(i32, Option<i32>)> {
    if pool.is_empty() {
        return Vec::new();
    }
    let mut ring: Vec<Option<i32>> = pool.iter().copied().map(Some).collect();
    if ring.len() % 2 == 1 {
        ring.push(None);
    }
    let n = ring.len();
    let cycle = (n - 1) as i64;
    let base = (sub_seed(seed_master, "p3-rotation", grade_id as i64) % cycle as u64) as i64;
    let rotation = (base + (round_number as i64 - 1)).rem_euclid(cycle) as usize;

    let mut rest: Vec<Option<i32>> = ring[1..].to_vec();
    rest.rotate_left(rotation);
    let arranged: Vec<Option<i32>> = std::iter::once(ring[0]).chain(rest).collect();

    let mut pairs = Vec::with_capacity(n / 2);
    for i in 0..n / 2 {
        match (arranged[i], arranged[n - 1 - i]) {
            (Some(a), Some(b)) => pairs.push((a, Some(b))),
            (Some(a), None) => pairs.push((a, None)),
            (None, Some(b)) => pairs.push((b, None)),
            (None, None) => {}
        }
    }
    pairs
}

/// Empareja una ronda completa sobre las franjas reclamadas por la fase 2.
///
/// `p2_rows` son las filas de staging de ESTA corrida y ronda, en su orden
/// de reclamo. `guard_factor` acota el lazo de colocación; al excederse se
/// registra un bye `ERROR_LOOP` para el equipo trabado y la ronda aborta
/// con `ProgressLoop`.
pub fn pair_round(plan: &DayPlan,
                  round: &Round,
                  cs: &ConstraintSet,
                  p2_rows: &[P2Allocation],
                  seed_master: &str,
                  guard_factor: usize)
                  -> P3RoundOutcome {
    let overrides = plan.overrides();
    let mut games: Vec<PlannedGame> = Vec::new();
    let mut byes: Vec<PlannedBye> = Vec::new();
    let mut notes: Vec<ConstraintNote> = Vec::new();
    let mut attempted = 0u32;
    let mut unplaced = 0u32;
    let mut fatal: Option<EngineError> = None;

    // Decisiones manuales primero: ya vienen validadas por el agregado.
    let mut consumed: HashSet<i32> = HashSet::new();
    for og in overrides.games.iter().filter(|g| g.round_id == round.round_id) {
        consumed.insert(og.court_time_id);
        let from_p2 = p2_rows.iter()
                             .find(|r| r.court_time_id == og.court_time_id)
                             .map(|r| r.p2_allocation_id);
        games.push(PlannedGame { round_id: round.round_id,
                                 age_id: og.age_id,
                                 grade_id: og.grade_id,
                                 team_a_id: og.team_a_id,
                                 team_b_id: og.team_b_id,
                                 court_time_id: og.court_time_id,
                                 from_p2 });
    }
    for ob in overrides.byes.iter().filter(|b| b.round_id == round.round_id) {
        byes.push(PlannedBye { round_id: round.round_id,
                               age_id: ob.age_id,
                               grade_id: ob.grade_id,
                               team_id: ob.team_id,
                               reason: ByeReason::ManualOverride });
    }

    'pairs: for pair in &cs.pairs {
        let committed = overrides.committed_teams(round.round_id, pair.grade_id);
        let pool: Vec<i32> = plan.teams_in_grade(pair.grade_id)
                                 .iter()
                                 .map(|t| t.team_id)
                                 .filter(|id| !committed.contains(id))
                                 .collect();
        if pool.is_empty() {
            continue;
        }
        let mut slot_queue: VecDeque<&P2Allocation> =
            p2_rows.iter()
                   .filter(|r| r.age_id == pair.age_id && r.grade_id == pair.grade_id
                               && !consumed.contains(&r.court_time_id))
                   .collect();

        let mut pending: VecDeque<(i32, i32)> = VecDeque::new();
        for (a, b) in rotation_pairs(&pool, seed_master, pair.grade_id, round.round_number) {
            match b {
                Some(b) => pending.push_back((a, b)),
                None => byes.push(PlannedBye { round_id: round.round_id,
                                               age_id: pair.age_id,
                                               grade_id: pair.grade_id,
                                               team_id: a,
                                               reason: ByeReason::OddTeams }),
            }
        }
        attempted += pending.len() as u32;

        let bound = guard_factor * (pool.len() + slot_queue.len());
        let mut iterations = 0usize;
        while let Some((a, b)) = pending.pop_front() {
            if iterations >= bound {
                // El bye ERROR_LOOP queda asentado antes de reportar el
                // error: la evidencia sobrevive a la falla de la corrida.
                byes.push(PlannedBye { round_id: round.round_id,
                                       age_id: pair.age_id,
                                       grade_id: pair.grade_id,
                                       team_id: a,
                                       reason: ByeReason::ErrorLoop });
                fatal = Some(EngineError::ProgressLoop { round_id: round.round_id,
                                                         grade_id: pair.grade_id });
                break 'pairs;
            }
            iterations += 1;
            match slot_queue.pop_front() {
                Some(slot) => {
                    games.push(PlannedGame { round_id: round.round_id,
                                             age_id: pair.age_id,
                                             grade_id: pair.grade_id,
                                             team_a_id: a,
                                             team_b_id: b,
                                             court_time_id: slot.court_time_id,
                                             from_p2: Some(slot.p2_allocation_id) });
                }
                None => {
                    unplaced += 1;
                    for team_id in [a, b] {
                        byes.push(PlannedBye { round_id: round.round_id,
                                               age_id: pair.age_id,
                                               grade_id: pair.grade_id,
                                               team_id,
                                               reason: ByeReason::Constraint });
                    }
                    notes.push(ConstraintNote { message: format!("sin franja para el par ({a}, {b}) en ronda {} grado {}",
                                                                 round.round_id, pair.grade_id),
                                                context: serde_json::json!({
                                                    "round_id": round.round_id,
                                                    "grade_id": pair.grade_id,
                                                    "team_a_id": a,
                                                    "team_b_id": b,
                                                }) });
                }
            }
        }
    }

    P3RoundOutcome { round_id: round.round_id,
                     games,
                     byes,
                     notes,
                     pairings_attempted: attempted,
                     pairs_unplaced: unplaced,
                     fatal }
}
