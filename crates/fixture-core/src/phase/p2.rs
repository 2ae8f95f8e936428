//! Fase 2: asignación de cancha-franjas a pares (edad, grado) por ronda.
//!
//! Reclamo voraz en orden fijo: los pares salen en su orden canónico y cada
//! uno toma sus franjas requeridas de la lista ordenada por (ranking de
//! cancha, hora de inicio, desempate sembrado). La escasez no es fatal: el
//! faltante queda como nota de restricción y la corrida sigue.

use std::collections::HashSet;

use fixture_domain::Round;

use crate::hashing::sub_seed;
use crate::model::ConstraintSet;
use super::ConstraintNote;

/// Reclamo de una franja para un par en una ronda. El motor lo materializa
/// como fila `P2Allocation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim {
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub court_time_id: i32,
}

/// Demanda no cubierta de un par.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub age_id: i32,
    pub grade_id: i32,
    pub requested: u32,
    pub allocated: u32,
}

/// Salida de la fase 2 para una ronda.
#[derive(Debug, Clone, PartialEq)]
pub struct P2RoundReport {
    pub round_id: i32,
    pub claims: Vec<SlotClaim>,
    pub shortfalls: Vec<Shortfall>,
    pub demand: u32,
}

impl P2RoundReport {
    pub fn allocated(&self) -> u32 {
        self.claims.len() as u32
    }

    pub fn unmet(&self) -> u32 {
        self.shortfalls.iter().map(|s| s.requested - s.allocated).sum()
    }

    /// Notas de restricción de la ronda (una por par con faltante).
    pub fn notes(&self) -> Vec<ConstraintNote> {
        self.shortfalls
            .iter()
            .map(|s| ConstraintNote { message: format!("demanda sin cubrir: ronda {} edad {} grado {} ({} de {})",
                                                       self.round_id, s.age_id, s.grade_id, s.allocated, s.requested),
                                      context: serde_json::json!({
                                          "round_id": self.round_id,
                                          "age_id": s.age_id,
                                          "grade_id": s.grade_id,
                                          "requested": s.requested,
                                          "allocated": s.allocated,
                                      }) })
            .collect()
    }
}

/// Asigna las franjas de una ronda. Determinista: misma ronda, mismo
/// conjunto y misma semilla producen exactamente los mismos reclamos.
pub fn allocate_round(round: &Round, cs: &ConstraintSet, seed_master: &str) -> P2RoundReport {
    // El desempate sembrado sólo reordena franjas con igual (ranking, hora),
    // y cambia por ronda para no favorecer siempre a la misma cancha.
    let mut ordered: Vec<usize> = (0..cs.slots.len()).collect();
    ordered.sort_by_key(|&i| {
               let s = &cs.slots[i];
               (s.rank_key(), s.start_time, sub_seed(seed_master, "p2-tie", tie_id(round.round_id, s.court_time_id)),
                s.court_time_id)
           });

    let mut claimed: HashSet<i32> = HashSet::new();
    let mut claims: Vec<SlotClaim> = Vec::new();
    let mut shortfalls: Vec<Shortfall> = Vec::new();
    let mut demand = 0u32;
    for pair in &cs.pairs {
        demand += pair.required_games;
        let mut got = 0u32;
        for &i in &ordered {
            if got == pair.required_games {
                break;
            }
            let slot = &cs.slots[i];
            if claimed.contains(&slot.court_time_id) || pair.forbidden.contains(&slot.court_time_id) {
                continue;
            }
            claimed.insert(slot.court_time_id);
            claims.push(SlotClaim { round_id: round.round_id,
                                    age_id: pair.age_id,
                                    grade_id: pair.grade_id,
                                    court_time_id: slot.court_time_id });
            got += 1;
        }
        if got < pair.required_games {
            shortfalls.push(Shortfall { age_id: pair.age_id,
                                        grade_id: pair.grade_id,
                                        requested: pair.required_games,
                                        allocated: got });
        }
    }
    P2RoundReport { round_id: round.round_id,
                    claims,
                    shortfalls,
                    demand }
}

fn tie_id(round_id: i32, court_time_id: i32) -> i64 {
    ((round_id as i64) << 32) | (court_time_id as i64 & 0xffff_ffff)
}
