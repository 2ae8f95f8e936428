//! Taxonomía de la competición: categorías de edad, grados y equipos.
//!
//! Los identificadores son claves sustitutas opacas (enteros) asignadas por la
//! capa de datos; el dominio sólo exige que las referencias entre filas sean
//! consistentes. El orden determinista de recorrido se deriva de `sort_order`
//! y, en empate, del identificador.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DomainError;

/// Categoría de edad (p. ej. U12, U14, Seniors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Age {
    pub age_id: i32,
    pub age_code: String,
    pub age_name: String,
    pub sort_order: i32,
}

impl Age {
    pub fn new(age_id: i32, age_code: &str, age_name: &str, sort_order: i32) -> Result<Self, DomainError> {
        if age_code.trim().is_empty() {
            return Err(DomainError::ValidationError("age_code vacío".to_string()));
        }
        Ok(Age { age_id,
                 age_code: age_code.to_string(),
                 age_name: age_name.to_string(),
                 sort_order })
    }
}

/// Grado dentro de una categoría de edad (división por nivel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub grade_id: i32,
    pub age_id: i32,
    pub grade_code: String,
    pub grade_name: String,
    pub sort_order: i32,
}

impl Grade {
    pub fn new(grade_id: i32, age_id: i32, grade_code: &str, grade_name: &str, sort_order: i32) -> Result<Self, DomainError> {
        if grade_code.trim().is_empty() {
            return Err(DomainError::ValidationError("grade_code vacío".to_string()));
        }
        Ok(Grade { grade_id,
                   age_id,
                   grade_code: grade_code.to_string(),
                   grade_name: grade_name.to_string(),
                   sort_order })
    }
}

/// Equipo registrado en un grado concreto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: i32,
    pub grade_id: i32,
    pub team_name: String,
}

impl Team {
    pub fn new(team_id: i32, grade_id: i32, team_name: &str) -> Result<Self, DomainError> {
        if team_name.trim().is_empty() {
            return Err(DomainError::ValidationError("team_name vacío".to_string()));
        }
        Ok(Team { team_id,
                  grade_id,
                  team_name: team_name.to_string() })
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<team {} ({})>", self.team_name, self.team_id)
    }
}
