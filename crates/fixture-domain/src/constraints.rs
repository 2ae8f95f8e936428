//! Restricciones de asignación por configuración de ronda.
//!
//! Tres familias de filas:
//! - alcance: qué edades y grados participan (`AgeRoundConstraint`,
//!   `GradeRoundConstraint`);
//! - matriz de vetos: qué cancha-franjas están prohibidas por edad o grado;
//! - overrides manuales: juegos y byes fijados por un operador, que el motor
//!   debe tratar como decididos.

use serde::{Deserialize, Serialize};

/// Dimensión de la matriz de vetos que aplica a un par (edad, grado).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationRestrictionType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "AGE")]
    Age,
    #[serde(rename = "GRADE")]
    Grade,
    #[serde(rename = "DUAL")]
    Dual,
}

impl AllocationRestrictionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationRestrictionType::None => "NONE",
            AllocationRestrictionType::Age => "AGE",
            AllocationRestrictionType::Grade => "GRADE",
            AllocationRestrictionType::Dual => "DUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(AllocationRestrictionType::None),
            "AGE" => Some(AllocationRestrictionType::Age),
            "GRADE" => Some(AllocationRestrictionType::Grade),
            "DUAL" => Some(AllocationRestrictionType::Dual),
            _ => None,
        }
    }

    pub fn applies_age(&self) -> bool {
        matches!(self, AllocationRestrictionType::Age | AllocationRestrictionType::Dual)
    }

    pub fn applies_grade(&self) -> bool {
        matches!(self, AllocationRestrictionType::Grade | AllocationRestrictionType::Dual)
    }
}

/// Edad en alcance para una configuración de ronda.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRoundConstraint {
    pub round_settings_number: i32,
    pub age_id: i32,
    pub active: bool,
}

/// Grado en alcance para una configuración de ronda.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRoundConstraint {
    pub round_settings_number: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub active: bool,
}

/// Selección de dimensiones de veto para un par (edad, grado).
/// Sin fila para un par, el resolutor asume `DUAL` (aplica todo veto conocido).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSetting {
    pub round_settings_number: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub restricted: bool,
    pub restriction_type: AllocationRestrictionType,
}

/// Cancha-franja vetada para una categoría de edad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeCourtRestriction {
    pub round_settings_number: i32,
    pub age_id: i32,
    pub court_time_id: i32,
}

/// Cancha-franja vetada para un grado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCourtRestriction {
    pub round_settings_number: i32,
    pub grade_id: i32,
    pub court_time_id: i32,
}

/// Juego fijado a mano por un operador: par de equipos y cancha-franja ya
/// decididos para una ronda.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideGame {
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_a_id: i32,
    pub team_b_id: i32,
    pub court_time_id: i32,
}

/// Bye fijado a mano por un operador.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideBye {
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_id: i32,
}

/// Conjunto de decisiones manuales de la jornada; entra al fingerprint de
/// configuración porque altera el resultado de la fase 3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverrides {
    pub games: Vec<OverrideGame>,
    pub byes: Vec<OverrideBye>,
}

impl ManualOverrides {
    pub fn is_empty(&self) -> bool {
        self.games.is_empty() && self.byes.is_empty()
    }

    /// Juegos fijados para una ronda y grado concretos.
    pub fn games_for(&self, round_id: i32, grade_id: i32) -> Vec<&OverrideGame> {
        self.games.iter().filter(|g| g.round_id == round_id && g.grade_id == grade_id).collect()
    }

    /// Byes fijados para una ronda y grado concretos.
    pub fn byes_for(&self, round_id: i32, grade_id: i32) -> Vec<&OverrideBye> {
        self.byes.iter().filter(|b| b.round_id == round_id && b.grade_id == grade_id).collect()
    }

    /// Equipos de un grado que ya quedaron comprometidos a mano en la ronda.
    pub fn committed_teams(&self, round_id: i32, grade_id: i32) -> Vec<i32> {
        let mut teams: Vec<i32> = Vec::new();
        for g in self.games_for(round_id, grade_id) {
            teams.push(g.team_a_id);
            teams.push(g.team_b_id);
        }
        for b in self.byes_for(round_id, grade_id) {
            teams.push(b.team_id);
        }
        teams.sort_unstable();
        teams.dedup();
        teams
    }
}
