//! Tipos de evento de corrida.
//!
//! Rol en la corrida:
//! - El motor emite eventos a un `EventStore` append-only en cada etapa.
//! - Los eventos son el rastro de auditoría: de ellos se reconstruyen las
//!   métricas y el historial observable de la corrida.
//! - Registrar un evento jamás puede tumbar la corrida (ver `EventStore`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Etapa del pipeline que emitió el evento.
///
/// El catálogo conserva los cinco pasos históricos aunque el motor actual
/// sólo emite en cuatro: STEP1 (validación y resolución), STEP2 (fase 2),
/// STEP3 (fase 3), STEP4 (checkpoints) y FINALISE. STEP5 queda reservado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStage {
    #[serde(rename = "STEP1")]
    Step1,
    #[serde(rename = "STEP2")]
    Step2,
    #[serde(rename = "STEP3")]
    Step3,
    #[serde(rename = "STEP4")]
    Step4,
    #[serde(rename = "STEP5")]
    Step5,
    #[serde(rename = "FINALISE")]
    Finalise,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Step1 => "STEP1",
            RunStage::Step2 => "STEP2",
            RunStage::Step3 => "STEP3",
            RunStage::Step4 => "STEP4",
            RunStage::Step5 => "STEP5",
            RunStage::Finalise => "FINALISE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STEP1" => Some(RunStage::Step1),
            "STEP2" => Some(RunStage::Step2),
            "STEP3" => Some(RunStage::Step3),
            "STEP4" => Some(RunStage::Step4),
            "STEP5" => Some(RunStage::Step5),
            "FINALISE" => Some(RunStage::Finalise),
            _ => None,
        }
    }
}

/// Severidad de un evento. Los errores de restricción entran como `Warn`;
/// `Error` queda para fallos que cierran la corrida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Severity::Info),
            "WARN" => Some(Severity::Warn),
            "ERROR" => Some(Severity::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64, // asignado por el EventStore (orden de append por corrida)
    pub run_id: Uuid,
    pub stage: RunStage,
    pub severity: Severity,
    pub event_message: String,
    pub context: Option<serde_json::Value>,
    pub ts: DateTime<Utc>, // metadato (no participa en ningún fingerprint)
}

impl RunEvent {
    /// Marca que usa el grabador para los errores de restricción; las
    /// métricas cuentan eventos con esta marca.
    pub fn is_constraint_error(&self) -> bool {
        self.context
            .as_ref()
            .and_then(|c| c.get("constraint_error"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}
