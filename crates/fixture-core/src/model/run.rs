//! Corrida de programación: fila de estado, candado de exclusividad y
//! documentos estructurados asociados (métricas, detalles de error).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::constants::SCHEMA_VERSION;

/// Estado de vida de una corrida. `Failed`, `Succeeded` y `Abandoned` son
/// terminales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "ABANDONED")]
    Abandoned,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Failed => "FAILED",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RunStatus::Pending),
            "RUNNING" => Some(RunStatus::Running),
            "FAILED" => Some(RunStatus::Failed),
            "SUCCEEDED" => Some(RunStatus::Succeeded),
            "ABANDONED" => Some(RunStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Succeeded | RunStatus::Abandoned)
    }
}

/// Tipo de proceso de la jornada: programación inicial o re-corrida de
/// mitad de temporada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessType {
    #[serde(rename = "INITIAL")]
    Initial,
    #[serde(rename = "MID")]
    Mid,
}

impl ProcessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Initial => "INITIAL",
            ProcessType::Mid => "MID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INITIAL" => Some(ProcessType::Initial),
            "MID" => Some(ProcessType::Mid),
            _ => None,
        }
    }
}

/// Clasificación fina de la corrida dentro de su proceso. El motor la
/// persiste tal cual llega; no ramifica sobre ella.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunType {
    #[serde(rename = "I_RUN_1")]
    IRun1,
    #[serde(rename = "I_RUN_2")]
    IRun2,
    #[serde(rename = "M_RUN_1")]
    MRun1,
    #[serde(rename = "M_RUN_2")]
    MRun2,
    #[serde(rename = "M_RUN_3")]
    MRun3,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::IRun1 => "I_RUN_1",
            RunType::IRun2 => "I_RUN_2",
            RunType::MRun1 => "M_RUN_1",
            RunType::MRun2 => "M_RUN_2",
            RunType::MRun3 => "M_RUN_3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "I_RUN_1" => Some(RunType::IRun1),
            "I_RUN_2" => Some(RunType::IRun2),
            "M_RUN_1" => Some(RunType::MRun1),
            "M_RUN_2" => Some(RunType::MRun2),
            "M_RUN_3" => Some(RunType::MRun3),
            _ => None,
        }
    }
}

/// Checkpoint de reanudación. El orden de las variantes ES el orden del
/// pipeline: un checkpoint nunca retrocede.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResumeCheckpoint {
    #[serde(rename = "BEFORE_P2")]
    BeforeP2,
    #[serde(rename = "AFTER_P2_BEFORE_P3")]
    AfterP2BeforeP3,
    #[serde(rename = "AFTER_P3_BEFORE_FINALISE")]
    AfterP3BeforeFinalise,
    #[serde(rename = "FINALISED")]
    Finalised,
}

impl ResumeCheckpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeCheckpoint::BeforeP2 => "BEFORE_P2",
            ResumeCheckpoint::AfterP2BeforeP3 => "AFTER_P2_BEFORE_P3",
            ResumeCheckpoint::AfterP3BeforeFinalise => "AFTER_P3_BEFORE_FINALISE",
            ResumeCheckpoint::Finalised => "FINALISED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BEFORE_P2" => Some(ResumeCheckpoint::BeforeP2),
            "AFTER_P2_BEFORE_P3" => Some(ResumeCheckpoint::AfterP2BeforeP3),
            "AFTER_P3_BEFORE_FINALISE" => Some(ResumeCheckpoint::AfterP3BeforeFinalise),
            "FINALISED" => Some(ResumeCheckpoint::Finalised),
            _ => None,
        }
    }
}

/// Métricas de corrida, documento estructurado versionado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub schema_version: u32,
    pub p2_demand: u32,
    pub p2_allocated: u32,
    pub p2_unmet: u32,
    pub games_scheduled: u32,
    pub byes_total: u32,
    pub byes_by_reason: BTreeMap<String, u32>,
    pub constraint_errors: u32,
}

impl Default for RunMetrics {
    fn default() -> Self {
        RunMetrics { schema_version: SCHEMA_VERSION,
                     p2_demand: 0,
                     p2_allocated: 0,
                     p2_unmet: 0,
                     games_scheduled: 0,
                     byes_total: 0,
                     byes_by_reason: BTreeMap::new(),
                     constraint_errors: 0 }
    }
}

/// Detalle estructurado del error que cerró una corrida fallida.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub schema_version: u32,
    pub code: String,
    pub message: String,
    pub context: serde_json::Value,
}

/// Fila de corrida tal como la persiste el `RunStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingRun {
    pub run_id: Uuid,
    pub season_id: i32,
    pub season_day_id: i32,
    pub process_type: ProcessType,
    pub run_type: Option<RunType>,
    pub run_status: RunStatus,
    pub s1_check_results: String,
    pub round_ids: Vec<i32>,
    pub seed_master: String,
    pub resume_checkpoint: ResumeCheckpoint,
    pub config_hash: String,
    pub idempotency_key: String,
    pub metrics: Option<RunMetrics>,
    pub error_code: Option<String>,
    pub error_details: Option<ErrorDetails>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Datos de una corrida nueva; el store asigna id, timestamps y defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRun {
    pub season_id: i32,
    pub season_day_id: i32,
    pub process_type: ProcessType,
    pub run_type: Option<RunType>,
    pub round_ids: Vec<i32>,
    pub seed_master: String,
    pub config_hash: String,
    pub idempotency_key: String,
}

impl NewRun {
    /// Materializa la fila inicial: `PENDING`, checkpoint `BEFORE_P2`.
    pub fn into_run(self, run_id: Uuid, created_at: DateTime<Utc>) -> SchedulingRun {
        SchedulingRun { run_id,
                        season_id: self.season_id,
                        season_day_id: self.season_day_id,
                        process_type: self.process_type,
                        run_type: self.run_type,
                        run_status: RunStatus::Pending,
                        s1_check_results: "PENDING".to_string(),
                        round_ids: self.round_ids,
                        seed_master: self.seed_master,
                        resume_checkpoint: ResumeCheckpoint::BeforeP2,
                        config_hash: self.config_hash,
                        idempotency_key: self.idempotency_key,
                        metrics: None,
                        error_code: None,
                        error_details: None,
                        created_at,
                        started_at: None,
                        finished_at: None }
    }
}

/// Candado de exclusividad por jornada: a lo sumo una corrida activa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingLock {
    pub season_day_id: i32,
    pub run_id: Uuid,
    pub locked_at: DateTime<Utc>,
}
