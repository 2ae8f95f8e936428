//! Fases de asignación del pipeline: fase 2 (franjas), fase 3
//! (emparejamiento y byes) y finalización.
//!
//! Las fases son funciones puras sobre datos ya resueltos: no tocan stores,
//! no generan ids ni timestamps. El motor materializa sus salidas en filas
//! y registra las notas de restricción como eventos.

pub mod finalise;
pub mod p2;
pub mod p3;

pub use finalise::{build_final_batch, diff_against_existing, FinalBatch};
pub use p2::{allocate_round, P2RoundReport, Shortfall, SlotClaim};
pub use p3::{pair_round, rotation_pairs, P3RoundOutcome, PlannedBye, PlannedGame};

/// Fricción de restricciones detectada por una fase, lista para registrarse
/// como evento WARN con la marca de conteo.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintNote {
    pub message: String,
    pub context: serde_json::Value,
}
