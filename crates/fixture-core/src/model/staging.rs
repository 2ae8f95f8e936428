//! Filas de staging, snapshots de checkpoint, diffs y programa final.
//!
//! Staging es el área de trabajo de la corrida: las fases escriben aquí y
//! sólo el finalizador copia al programa final. Los snapshots (`SavedGame`,
//! `SavedBye`) son copias inmutables etiquetadas por etapa: siempre se
//! agregan, nunca se reescriben.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Franja reclamada por la fase 2 para un par (edad, grado) en una ronda.
/// Invariante: `(run, round, court_time)` única.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2Allocation {
    pub p2_allocation_id: Uuid,
    pub run_id: Uuid,
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub court_time_id: i32,
    pub created_at: DateTime<Utc>,
}

/// Juego emparejado por la fase 3 sobre una franja reclamada.
/// `p2_allocation_id` queda en `None` cuando la franja vino fijada a mano.
/// Invariante: `(run, round, court_time)` única.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P3GameAllocation {
    pub p3_game_allocation_id: Uuid,
    pub run_id: Uuid,
    pub p2_allocation_id: Option<Uuid>,
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_a_id: i32,
    pub team_b_id: i32,
    pub court_time_id: i32,
    pub created_at: DateTime<Utc>,
}

/// Motivo de un bye. `ErrorLoop` sólo aparece junto a una corrida fallida
/// por guardián de progreso.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByeReason {
    #[serde(rename = "ODD_TEAMS")]
    OddTeams,
    #[serde(rename = "ERROR_LOOP")]
    ErrorLoop,
    #[serde(rename = "CONSTRAINT")]
    Constraint,
    #[serde(rename = "MANUAL_OVERRIDE")]
    ManualOverride,
}

impl ByeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ByeReason::OddTeams => "ODD_TEAMS",
            ByeReason::ErrorLoop => "ERROR_LOOP",
            ByeReason::Constraint => "CONSTRAINT",
            ByeReason::ManualOverride => "MANUAL_OVERRIDE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ODD_TEAMS" => Some(ByeReason::OddTeams),
            "ERROR_LOOP" => Some(ByeReason::ErrorLoop),
            "CONSTRAINT" => Some(ByeReason::Constraint),
            "MANUAL_OVERRIDE" => Some(ByeReason::ManualOverride),
            _ => None,
        }
    }
}

/// Bye asignado por la fase 3. Invariante: `(run, round, team)` única.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P3ByeAllocation {
    pub p3_bye_allocation_id: Uuid,
    pub run_id: Uuid,
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_id: i32,
    pub bye_reason: ByeReason,
    pub created_at: DateTime<Utc>,
}

/// Etapa a la que pertenece un snapshot de checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SavedStatus {
    #[serde(rename = "AFTER_P2_BEFORE_P3")]
    AfterP2BeforeP3,
    #[serde(rename = "AFTER_P3_BEFORE_FINALISE")]
    AfterP3BeforeFinalise,
    #[serde(rename = "FINALISED")]
    Finalised,
}

impl SavedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavedStatus::AfterP2BeforeP3 => "AFTER_P2_BEFORE_P3",
            SavedStatus::AfterP3BeforeFinalise => "AFTER_P3_BEFORE_FINALISE",
            SavedStatus::Finalised => "FINALISED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AFTER_P2_BEFORE_P3" => Some(SavedStatus::AfterP2BeforeP3),
            "AFTER_P3_BEFORE_FINALISE" => Some(SavedStatus::AfterP3BeforeFinalise),
            "FINALISED" => Some(SavedStatus::Finalised),
            _ => None,
        }
    }
}

/// Copia de checkpoint de un juego (o de una franja reclamada: tras la fase
/// 2 los equipos aún no existen y van en `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedGame {
    pub saved_game_id: Uuid,
    pub run_id: Uuid,
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_a_id: Option<i32>,
    pub team_b_id: Option<i32>,
    pub court_time_id: i32,
    pub game_status: SavedStatus,
    pub created_at: DateTime<Utc>,
}

/// Copia de checkpoint de un bye.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedBye {
    pub saved_bye_id: Uuid,
    pub run_id: Uuid,
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_id: i32,
    pub bye_reason: ByeReason,
    pub game_status: SavedStatus,
    pub created_at: DateTime<Utc>,
}

/// Entidad sobre la que se registró un diff de staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffEntity {
    #[serde(rename = "P2_ALLOCATION")]
    P2Allocation,
    #[serde(rename = "P3_ALLOCATION")]
    P3Allocation,
    #[serde(rename = "COMPOSITE_ALLOCATION")]
    CompositeAllocation,
}

impl DiffEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffEntity::P2Allocation => "P2_ALLOCATION",
            DiffEntity::P3Allocation => "P3_ALLOCATION",
            DiffEntity::CompositeAllocation => "COMPOSITE_ALLOCATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "P2_ALLOCATION" => Some(DiffEntity::P2Allocation),
            "P3_ALLOCATION" => Some(DiffEntity::P3Allocation),
            "COMPOSITE_ALLOCATION" => Some(DiffEntity::CompositeAllocation),
            _ => None,
        }
    }
}

/// Sentido de un diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffChange {
    #[serde(rename = "ADD")]
    Add,
    #[serde(rename = "CHANGE")]
    Change,
    #[serde(rename = "REMOVE")]
    Remove,
}

impl DiffChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffChange::Add => "ADD",
            DiffChange::Change => "CHANGE",
            DiffChange::Remove => "REMOVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADD" => Some(DiffChange::Add),
            "CHANGE" => Some(DiffChange::Change),
            "REMOVE" => Some(DiffChange::Remove),
            _ => None,
        }
    }
}

/// Registro de auditoría de un cambio de staging o de publicación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingDiff {
    pub run_id: Uuid,
    pub entity_type: DiffEntity,
    pub entity_id: String,
    pub change_type: DiffChange,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl StagingDiff {
    pub fn add(run_id: Uuid, entity_type: DiffEntity, entity_id: String, after: serde_json::Value) -> Self {
        StagingDiff { run_id,
                      entity_type,
                      entity_id,
                      change_type: DiffChange::Add,
                      before_state: None,
                      after_state: Some(after),
                      created_at: Utc::now() }
    }

    pub fn change(run_id: Uuid,
                  entity_type: DiffEntity,
                  entity_id: String,
                  before: serde_json::Value,
                  after: serde_json::Value)
                  -> Self {
        StagingDiff { run_id,
                      entity_type,
                      entity_id,
                      change_type: DiffChange::Change,
                      before_state: Some(before),
                      after_state: Some(after),
                      created_at: Utc::now() }
    }

    pub fn remove(run_id: Uuid, entity_type: DiffEntity, entity_id: String, before: serde_json::Value) -> Self {
        StagingDiff { run_id,
                      entity_type,
                      entity_id,
                      change_type: DiffChange::Remove,
                      before_state: Some(before),
                      after_state: None,
                      created_at: Utc::now() }
    }
}

/// Estado de una entrada publicada. El motor sólo escribe `Finalised`; los
/// demás estados pertenecen a la operación del día de juego.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalStatus {
    #[serde(rename = "FINALISED")]
    Finalised,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "FORFEITED")]
    Forfeited,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Finalised => "FINALISED",
            FinalStatus::Cancelled => "CANCELLED",
            FinalStatus::Forfeited => "FORFEITED",
            FinalStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FINALISED" => Some(FinalStatus::Finalised),
            "CANCELLED" => Some(FinalStatus::Cancelled),
            "FORFEITED" => Some(FinalStatus::Forfeited),
            "COMPLETED" => Some(FinalStatus::Completed),
            _ => None,
        }
    }
}

/// Juego publicado en el programa final, con nombres denormalizados listos
/// para imprimir. Invariante: `(round, court_time)` única.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalGameEntry {
    pub final_game_id: Uuid,
    pub run_id: Uuid,
    pub round_id: i32,
    pub court_time_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_a_id: i32,
    pub team_b_id: i32,
    pub game_date: chrono::NaiveDate,
    pub start_time: chrono::NaiveTime,
    pub game_name: String,
    pub organisation_name: String,
    pub competition_name: String,
    pub season_name: String,
    pub venue_name: String,
    pub court_name: String,
    pub age_name: String,
    pub grade_name: String,
    pub team_a_name: String,
    pub team_b_name: String,
    pub game_status: FinalStatus,
    pub created_at: DateTime<Utc>,
}

/// Bye publicado en el programa final. Invariante: `(round, team)` única.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalByeEntry {
    pub final_bye_id: Uuid,
    pub run_id: Uuid,
    pub round_id: i32,
    pub age_id: i32,
    pub grade_id: i32,
    pub team_id: i32,
    pub bye_date: chrono::NaiveDate,
    pub bye_name: String,
    pub organisation_name: String,
    pub competition_name: String,
    pub season_name: String,
    pub age_name: String,
    pub grade_name: String,
    pub team_name: String,
    pub bye_reason: ByeReason,
    pub game_status: FinalStatus,
    pub created_at: DateTime<Utc>,
}
