//! Resolutor de restricciones: de `DayPlan` a `ConstraintSet` por
//! configuración de ronda.
//!
//! Lectura pura, sin efectos: se re-ejecuta completo en cada `execute` y su
//! hash participa del fingerprint de configuración. El orden de `pairs` y
//! `slots` que sale de aquí es EL orden determinista que las fases respetan.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use fixture_domain::{AllocationRestrictionType, DayPlan, Round};

use crate::errors::EngineError;
use crate::hashing::hash_value;
use crate::model::{ConstraintSet, PairRule, SlotInfo};

/// Resuelve el conjunto de restricciones de una configuración de ronda.
///
/// Alcance: edades con fila activa, y dentro de ellas grados con fila
/// activa. Un grado activo cuya edad no está en alcance no entra y deja
/// advertencia. Vetos: según `AllocationSetting` del par (sin fila se asume
/// `DUAL`; `restricted = false` anula todo veto).
pub fn resolve(plan: &DayPlan, round_settings_number: i32) -> Result<ConstraintSet, EngineError> {
    let setting = plan.setting(round_settings_number)
                      .ok_or_else(|| EngineError::Validation(format!("round_settings_number {round_settings_number} sin configuración")))?;
    let mut warnings: Vec<String> = Vec::new();

    let active_ages: Vec<i32> = plan.age_round_constraints(round_settings_number)
                                    .iter()
                                    .filter(|c| c.active)
                                    .map(|c| c.age_id)
                                    .collect();
    let mut pairs: Vec<PairRule> = Vec::new();
    for grc in plan.grade_round_constraints(round_settings_number) {
        if !grc.active {
            continue;
        }
        let grade = plan.grade(grc.grade_id)
                        .ok_or_else(|| EngineError::Validation(format!("grade_round_constraint referencia grado {} inexistente",
                                                                       grc.grade_id)))?;
        if grade.age_id != grc.age_id {
            return Err(EngineError::Validation(format!("grade_round_constraint del grado {} declara edad {} pero el grado pertenece a la edad {}",
                                                       grc.grade_id, grc.age_id, grade.age_id)));
        }
        if !active_ages.contains(&grc.age_id) {
            warnings.push(format!("grado {} activo pero su edad {} no está en alcance; se omite",
                                  grc.grade_id, grc.age_id));
            continue;
        }
        let restriction = match plan.allocation_setting(round_settings_number, grc.age_id, grc.grade_id) {
            Some(s) if !s.restricted => AllocationRestrictionType::None,
            Some(s) => s.restriction_type,
            None => AllocationRestrictionType::Dual,
        };
        let mut forbidden: Vec<i32> = Vec::new();
        if restriction.applies_age() {
            forbidden.extend(plan.age_restrictions(round_settings_number, grc.age_id));
        }
        if restriction.applies_grade() {
            forbidden.extend(plan.grade_restrictions(round_settings_number, grc.grade_id));
        }
        forbidden.sort_unstable();
        forbidden.dedup();
        pairs.push(PairRule { age_id: grc.age_id,
                              grade_id: grc.grade_id,
                              required_games: setting.rules.games_for(grc.age_id, grc.grade_id),
                              restriction,
                              forbidden: IndexSet::from_iter(forbidden) });
    }
    // Orden canónico de pares: edad por sort_order, grado por sort_order.
    let age_key = |age_id: i32| plan.age(age_id).map(|a| (a.sort_order, a.age_id)).unwrap_or((i32::MAX, age_id));
    let grade_key = |grade_id: i32| {
        plan.grade(grade_id).map(|g| (g.sort_order, g.grade_id)).unwrap_or((i32::MAX, grade_id))
    };
    pairs.sort_by_key(|p| (age_key(p.age_id), grade_key(p.grade_id)));

    let ranks = plan.active_court_ranks(round_settings_number);
    let mut slots: Vec<SlotInfo> = Vec::new();
    for ct in plan.court_times_for_setting(round_settings_number) {
        if !ct.is_eligible() {
            continue;
        }
        let slot = plan.time_slot(ct.time_slot_id)
                       .ok_or_else(|| EngineError::Internal(format!("court_time {} sin franja horaria",
                                                                    ct.court_time_id)))?;
        let court_rank = ranks.get(&ct.court_id).copied();
        if court_rank.is_none() {
            warnings.push(format!("cancha {} sin ranking activo; ordena al final", ct.court_id));
        }
        slots.push(SlotInfo { court_time_id: ct.court_time_id,
                              court_id: ct.court_id,
                              time_slot_id: ct.time_slot_id,
                              court_rank,
                              start_time: slot.start_time });
    }
    slots.sort_by_key(|s| (s.rank_key(), s.start_time, s.court_time_id));

    Ok(ConstraintSet { round_settings_number,
                       pairs,
                       slots,
                       warnings })
}

/// Rondas en alcance de una corrida, ordenadas por `round_number` (id en
/// empate). Falla si alguna ronda pedida no existe en la jornada.
pub fn scoped_rounds<'a>(plan: &'a DayPlan, round_ids: &[i32]) -> Result<Vec<&'a Round>, EngineError> {
    if round_ids.is_empty() {
        return Err(EngineError::Validation("la corrida no tiene rondas en alcance".to_string()));
    }
    let mut unique: Vec<i32> = round_ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    let mut rounds: Vec<&Round> = Vec::with_capacity(unique.len());
    for round_id in unique {
        let round = plan.round(round_id)
                        .ok_or_else(|| EngineError::Validation(format!("ronda {round_id} no existe en la jornada")))?;
        rounds.push(round);
    }
    rounds.sort_by_key(|r| (r.round_number, r.round_id));
    Ok(rounds)
}

/// Números de configuración de ronda que cubren las rondas dadas, únicos y
/// ordenados.
pub fn settings_for_rounds(plan: &DayPlan, round_ids: &[i32]) -> Result<Vec<i32>, EngineError> {
    let mut numbers: Vec<i32> = scoped_rounds(plan, round_ids)?.iter()
                                                               .map(|r| r.round_settings_number)
                                                               .collect();
    numbers.sort_unstable();
    numbers.dedup();
    Ok(numbers)
}

/// Fingerprint de configuración de una corrida: hash canónico de todo
/// insumo que altera el resultado (rondas en alcance con fecha,
/// restricciones resueltas por configuración, planteles por grado,
/// overrides y nombres denormalizados), junto con
/// [`ENGINE_VERSION`](crate::constants::ENGINE_VERSION) para invalidar
/// corridas entre versiones incompatibles del motor.
/// Misma entrada, mismo hash.
pub fn composite_fingerprint(plan: &DayPlan, round_ids: &[i32]) -> Result<String, EngineError> {
    let rounds = scoped_rounds(plan, round_ids)?;
    let round_docs: Vec<serde_json::Value> =
        rounds.iter()
              .map(|r| {
                  serde_json::json!({
                      "round_id": r.round_id,
                      "round_number": r.round_number,
                      "round_settings_number": r.round_settings_number,
                      "game_date": plan.date_for_round(r.round_id),
                  })
              })
              .collect();
    let mut constraint_hashes: BTreeMap<i32, String> = BTreeMap::new();
    for number in settings_for_rounds(plan, round_ids)? {
        constraint_hashes.insert(number, resolve(plan, number)?.fingerprint());
    }
    let mut teams = plan.data().teams.clone();
    teams.sort_by_key(|t| t.team_id);
    Ok(hash_value(&serde_json::json!({
        "engine_version": crate::constants::ENGINE_VERSION,
        "season_day_id": plan.season_day().season_day_id,
        "rounds": round_docs,
        "constraints": constraint_hashes,
        "teams": teams,
        "overrides": plan.overrides(),
        "naming": plan.naming(),
    })))
}
