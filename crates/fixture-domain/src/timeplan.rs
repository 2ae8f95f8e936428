//! Plan temporal de la temporada: jornadas, rondas y su reglamento.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Jornada de competición (el alcance de una corrida de programación).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonDay {
    pub season_day_id: i32,
    pub season_id: i32,
    pub day_label: String,
}

/// Ronda perteneciente a una temporada. `round_number` define el orden de
/// juego y ancla la rotación de byes de la fase 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: i32,
    pub season_id: i32,
    pub round_number: i32,
    pub round_label: String,
    pub round_settings_number: i32,
}

/// Fecha de juego de una ronda dentro de una jornada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDate {
    pub round_id: i32,
    pub season_day_id: i32,
    pub game_date: NaiveDate,
}

/// Reglamento de asignación de una configuración de ronda.
///
/// Documento estructurado con versión de esquema; antes vivía como JSON libre
/// en la columna `rules` y ahora tiene forma tipada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRules {
    pub schema_version: u32,
    pub default_required_games: u32,
    pub required_games: Vec<RequiredGames>,
}

/// Demanda de juegos requerida para un par (edad, grado) concreto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredGames {
    pub age_id: i32,
    pub grade_id: i32,
    pub games: u32,
}

impl RoundRules {
    /// Juegos requeridos para un par; cae al valor por defecto si no hay
    /// entrada específica.
    pub fn games_for(&self, age_id: i32, grade_id: i32) -> u32 {
        self.required_games
            .iter()
            .find(|rg| rg.age_id == age_id && rg.grade_id == grade_id)
            .map(|rg| rg.games)
            .unwrap_or(self.default_required_games)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, DomainError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Configuración de ronda de una jornada, identificada por su número.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSetting {
    pub round_setting_id: i32,
    pub season_day_id: i32,
    pub round_settings_number: i32,
    pub rules: RoundRules,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_lookup_falls_back_to_default() {
        let rules = RoundRules { schema_version: 1,
                                 default_required_games: 2,
                                 required_games: vec![RequiredGames { age_id: 1, grade_id: 10, games: 3 }] };
        assert_eq!(rules.games_for(1, 10), 3);
        assert_eq!(rules.games_for(1, 11), 2);
    }

    #[test]
    fn rules_round_trip_from_value() {
        let value = serde_json::json!({
            "schema_version": 1,
            "default_required_games": 1,
            "required_games": [{"age_id": 2, "grade_id": 20, "games": 4}]
        });
        let rules = RoundRules::from_value(&value).expect("rules should parse");
        assert_eq!(rules.games_for(2, 20), 4);
    }
}
