//! Errores del motor y catálogo de códigos estables.
//!
//! Dos niveles conviven aquí:
//! - `EngineError`: el enum con el que el motor propaga fallos (errores de
//!   lógica, de validación, de almacenamiento).
//! - `ErrorCode`: el catálogo `SENG-*` heredado del sistema, con código
//!   estable, exit code de proceso y severidad. Cada variante de
//!   `EngineError` mapea a exactamente una entrada del catálogo.
//!
//! La fricción por restricciones (demanda sin franja, bye por falta de
//! cancha) NO es un error: se registra como evento y cuenta en métricas.
//! Sólo al superar el umbral configurado se convierte en
//! `ThresholdExceeded`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Entrada del catálogo de errores: código estable + exit code + severidad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: &'static str,
    pub exit_code: i32,
    pub severity: &'static str,
}

/// Catálogo completo. Los códigos son parte del contrato observable: nunca
/// se renumeran, sólo se agregan.
pub mod codes {
    use super::ErrorCode;

    pub const CONFIG_ERROR: ErrorCode = ErrorCode { code: "SENG-CONFIG-001", exit_code: 78, severity: "ERROR" };
    pub const DB_CONNECTION_ERROR: ErrorCode = ErrorCode { code: "SENG-DB-001", exit_code: 65, severity: "CRITICAL" };
    pub const DB_OPERATION_ERROR: ErrorCode = ErrorCode { code: "SENG-DB-003", exit_code: 65, severity: "ERROR" };
    pub const VALIDATION_ERROR: ErrorCode = ErrorCode { code: "SENG-VALIDATION-001", exit_code: 64, severity: "ERROR" };
    pub const NOT_FOUND_ERROR: ErrorCode = ErrorCode { code: "SENG-DOMAIN-001", exit_code: 66, severity: "ERROR" };
    pub const CONFLICT_ERROR: ErrorCode = ErrorCode { code: "SENG-DOMAIN-002", exit_code: 69, severity: "ERROR" };
    pub const DUPLICATE_CLAIM: ErrorCode = ErrorCode { code: "SENG-ENGINE-001", exit_code: 70, severity: "ERROR" };
    pub const PROGRESS_LOOP: ErrorCode = ErrorCode { code: "SENG-ENGINE-002", exit_code: 70, severity: "ERROR" };
    pub const FINGERPRINT_MISMATCH: ErrorCode = ErrorCode { code: "SENG-ENGINE-003", exit_code: 70, severity: "ERROR" };
    pub const FINALISE_CONFLICT: ErrorCode = ErrorCode { code: "SENG-ENGINE-004", exit_code: 70, severity: "ERROR" };
    pub const THRESHOLD_EXCEEDED: ErrorCode = ErrorCode { code: "SENG-ENGINE-005", exit_code: 70, severity: "ERROR" };
    pub const UNKNOWN_ERROR: ErrorCode = ErrorCode { code: "SENG-UNKNOWN-000", exit_code: 1, severity: "CRITICAL" };
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum EngineError {
    #[error("run not found: {0}")]
    RunNotFound(Uuid),
    #[error("run is not active: {0}")]
    NotActive(Uuid),
    #[error("validation: {0}")]
    Validation(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("duplicate slot claim: round={round_id} court_time={court_time_id}")]
    DuplicateClaim { round_id: i32, court_time_id: i32 },
    #[error("duplicate bye: round={round_id} team={team_id}")]
    DuplicateBye { round_id: i32, team_id: i32 },
    #[error("pairing made no progress: round={round_id} grade={grade_id}")]
    ProgressLoop { round_id: i32, grade_id: i32 },
    #[error("configuration fingerprint changed since submission (expected {expected}, got {actual})")]
    FingerprintMismatch { expected: String, actual: String },
    #[error("finalise uniqueness violated: {0}")]
    FinaliseConflict(String),
    #[error("constraint error threshold exceeded in {phase}: {errors} errors over {demand} demanded")]
    ThresholdExceeded { phase: String, errors: u32, demand: u32 },
    #[error("storage: {0}")]
    Storage(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl EngineError {
    /// Entrada del catálogo correspondiente a la variante.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::RunNotFound(_) => codes::NOT_FOUND_ERROR,
            EngineError::NotActive(_) => codes::CONFLICT_ERROR,
            EngineError::Validation(_) => codes::VALIDATION_ERROR,
            EngineError::Config(_) => codes::CONFIG_ERROR,
            EngineError::Conflict(_) => codes::CONFLICT_ERROR,
            EngineError::DuplicateClaim { .. } => codes::DUPLICATE_CLAIM,
            EngineError::DuplicateBye { .. } => codes::DUPLICATE_CLAIM,
            EngineError::ProgressLoop { .. } => codes::PROGRESS_LOOP,
            EngineError::FingerprintMismatch { .. } => codes::FINGERPRINT_MISMATCH,
            EngineError::FinaliseConflict(_) => codes::FINALISE_CONFLICT,
            EngineError::ThresholdExceeded { .. } => codes::THRESHOLD_EXCEEDED,
            EngineError::Storage(_) => codes::DB_OPERATION_ERROR,
            EngineError::Internal(_) => codes::UNKNOWN_ERROR,
        }
    }

    /// Los errores de lógica marcan un defecto del motor o de la
    /// configuración y nunca se reintentan.
    pub fn is_logic_error(&self) -> bool {
        matches!(self,
                 EngineError::DuplicateClaim { .. }
                 | EngineError::DuplicateBye { .. }
                 | EngineError::ProgressLoop { .. }
                 | EngineError::FingerprintMismatch { .. }
                 | EngineError::FinaliseConflict(_)
                 | EngineError::ThresholdExceeded { .. })
    }
}

impl From<fixture_domain::DomainError> for EngineError {
    fn from(e: fixture_domain::DomainError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logic_errors_map_to_engine_codes() {
        let err = EngineError::DuplicateClaim { round_id: 1, court_time_id: 9 };
        assert_eq!(err.code().code, "SENG-ENGINE-001");
        assert!(err.is_logic_error());
        let err = EngineError::ThresholdExceeded { phase: "P2".to_string(), errors: 5, demand: 10 };
        assert_eq!(err.code().code, "SENG-ENGINE-005");
        assert!(err.is_logic_error());
    }

    #[test]
    fn ambient_errors_are_not_logic_errors() {
        assert!(!EngineError::Storage("boom".to_string()).is_logic_error());
        assert!(!EngineError::Validation("bad".to_string()).is_logic_error());
        assert_eq!(EngineError::Internal("x".to_string()).code().exit_code, 1);
    }
}
