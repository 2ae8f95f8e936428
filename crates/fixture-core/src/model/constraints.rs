//! Conjunto de restricciones resuelto: la vista materializada que consumen
//! las fases de asignación.
//!
//! Se construye de cero en cada `execute` (ver `resolver`), se serializa a
//! JSON para el snapshot de auditoría (`run_constraints_snapshot`) y su hash
//! canónico participa en el fingerprint de configuración de la corrida.

use chrono::NaiveTime;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::hashing::hash_value;
use fixture_domain::AllocationRestrictionType;

/// Fase a la que pertenece un snapshot de restricciones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotPhase {
    #[serde(rename = "P2")]
    P2,
    #[serde(rename = "P3")]
    P3,
    #[serde(rename = "COMPOSITE")]
    Composite,
}

impl SnapshotPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPhase::P2 => "P2",
            SnapshotPhase::P3 => "P3",
            SnapshotPhase::Composite => "COMPOSITE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "P2" => Some(SnapshotPhase::P2),
            "P3" => Some(SnapshotPhase::P3),
            "COMPOSITE" => Some(SnapshotPhase::Composite),
            _ => None,
        }
    }
}

/// Par (edad, grado) en alcance con su demanda y sus vetos ya resueltos.
/// `forbidden` conserva el orden de inserción (determinista) y responde
/// `contains` en O(1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRule {
    pub age_id: i32,
    pub grade_id: i32,
    pub required_games: u32,
    pub restriction: AllocationRestrictionType,
    pub forbidden: IndexSet<i32>,
}

/// Franja elegible con su contexto de ordenamiento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub court_time_id: i32,
    pub court_id: i32,
    pub time_slot_id: i32,
    pub court_rank: Option<i32>,
    pub start_time: NaiveTime,
}

impl SlotInfo {
    /// Clave de ranking: canchas sin fila activa de ranking van al final.
    pub fn rank_key(&self) -> i32 {
        self.court_rank.unwrap_or(i32::MAX)
    }
}

/// Restricciones resueltas de una configuración de ronda.
///
/// `pairs` ya viene en orden determinista (edad por `sort_order`, grado por
/// `sort_order`); `slots` ya viene ordenada por (ranking, hora de inicio,
/// id). Las fases no reordenan nada salvo el desempate sembrado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub round_settings_number: i32,
    pub pairs: Vec<PairRule>,
    pub slots: Vec<SlotInfo>,
    pub warnings: Vec<String>,
}

impl ConstraintSet {
    /// Demanda total de juegos de la configuración (suma de pares).
    pub fn total_demand(&self) -> u32 {
        self.pairs.iter().map(|p| p.required_games).sum()
    }

    /// Hash canónico del conjunto. Las advertencias no alteran el resultado
    /// de asignación, así que quedan fuera del hash.
    pub fn fingerprint(&self) -> String {
        hash_value(&serde_json::json!({
            "round_settings_number": self.round_settings_number,
            "pairs": self.pairs,
            "slots": self.slots,
        }))
    }

    /// Forma JSON para el snapshot de auditoría.
    pub fn to_snapshot(&self) -> Result<serde_json::Value, EngineError> {
        serde_json::to_value(self).map_err(|e| EngineError::Internal(format!("constraint set serialize: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: i32, rank: Option<i32>, hour: u32) -> SlotInfo {
        SlotInfo { court_time_id: id,
                   court_id: id,
                   time_slot_id: id,
                   court_rank: rank,
                   start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap() }
    }

    #[test]
    fn fingerprint_changes_with_slots_but_not_with_warnings() {
        let mut cs = ConstraintSet { round_settings_number: 1,
                                     pairs: vec![],
                                     slots: vec![slot(1, Some(1), 9)],
                                     warnings: vec![] };
        let base = cs.fingerprint();
        cs.warnings.push("court 3 has no active ranking".to_string());
        assert_eq!(cs.fingerprint(), base);
        cs.slots.push(slot(2, Some(2), 10));
        assert_ne!(cs.fingerprint(), base);
    }

    #[test]
    fn unranked_slots_sort_last_by_rank_key() {
        assert!(slot(1, Some(5), 9).rank_key() < slot(2, None, 9).rank_key());
    }
}
