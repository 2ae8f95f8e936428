//! Frontera de almacenamiento del motor: corridas, staging y programa final.
//!
//! Tres traits separan el motor de su backend. Las implementaciones en
//! memoria viven en [`memory`]; las de Postgres en el crate de persistencia,
//! con paridad 1:1 de semántica (mismas unicidades, mismos errores).
//!
//! Contratos transversales:
//! - Todo es `&self`: las implementaciones usan mutabilidad interior o un
//!   pool de conexiones.
//! - Las unicidades de staging se verifican en el store, no sólo en la fase:
//!   una violación es un error de lógica (`DuplicateClaim`/`DuplicateBye`),
//!   nunca se silencia.
//! - Los snapshots de checkpoint son aditivos: se etiquetan por etapa y no
//!   se reescriben.

pub mod memory;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::model::{ByeReason, FinalByeEntry, FinalGameEntry, NewRun, P2Allocation, P3ByeAllocation,
                   P3GameAllocation, ResumeCheckpoint, RunMetrics, RunStatus, SavedBye, SavedGame, SavedStatus,
                   SchedulingLock, SchedulingRun, SnapshotPhase, StagingDiff};
use crate::model::ErrorDetails;

/// Resultado de `RunStore::begin`: las tres salidas posibles de una
/// solicitud de corrida. `Replayed` y `LockHeld` no mutan estado.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Corrida nueva creada y candado de jornada adquirido.
    Created(SchedulingRun),
    /// Ya existe una corrida no abandonada con la misma clave de
    /// idempotencia; se devuelve tal cual.
    Replayed(SchedulingRun),
    /// Otra corrida activa sostiene el candado de la jornada.
    LockHeld { season_day_id: i32, holder: Uuid },
}

/// Cierre terminal de una corrida (`SUCCEEDED` o `FAILED`). `ABANDONED`
/// pasa por `abandon`, no por aquí.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_status: RunStatus,
    pub metrics: Option<RunMetrics>,
    pub error_code: Option<String>,
    pub error_details: Option<ErrorDetails>,
}

impl RunOutcome {
    pub fn succeeded(metrics: RunMetrics) -> Self {
        RunOutcome { run_status: RunStatus::Succeeded,
                     metrics: Some(metrics),
                     error_code: None,
                     error_details: None }
    }

    pub fn failed(metrics: Option<RunMetrics>, error: &EngineError, context: Value) -> Self {
        let code = error.code();
        RunOutcome { run_status: RunStatus::Failed,
                     metrics,
                     error_code: Some(code.code.to_string()),
                     error_details: Some(ErrorDetails { schema_version: crate::constants::SCHEMA_VERSION,
                                                        code: code.code.to_string(),
                                                        message: error.to_string(),
                                                        context }) }
    }
}

/// Snapshot de checkpoint más avanzado de una corrida.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotBundle {
    pub stage: SavedStatus,
    pub games: Vec<SavedGame>,
    pub byes: Vec<SavedBye>,
}

/// Estado de corridas y candado de exclusividad por jornada.
pub trait RunStore {
    /// Operación atómica de entrada: verifica la clave de idempotencia,
    /// verifica/adquiere el candado de la jornada y crea la fila. Ninguna
    /// salida parcial es observable.
    fn begin(&self, new_run: NewRun) -> Result<Submission, EngineError>;
    fn get(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError>;
    fn find_by_key(&self, idempotency_key: &str) -> Result<Option<SchedulingRun>, EngineError>;
    /// `PENDING -> RUNNING` (fija `started_at`). Idempotente si ya corre;
    /// `NotActive` si la corrida es terminal.
    fn mark_running(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError>;
    fn set_s1_results(&self, run_id: Uuid, results: &str) -> Result<(), EngineError>;
    /// Avanza el checkpoint. Un retroceso es un defecto del motor y se
    /// rechaza con `Internal`.
    fn set_checkpoint(&self, run_id: Uuid, checkpoint: ResumeCheckpoint) -> Result<(), EngineError>;
    /// Cierra la corrida con su salida terminal y libera el candado si esta
    /// corrida lo sostiene.
    fn finish(&self, run_id: Uuid, outcome: RunOutcome) -> Result<SchedulingRun, EngineError>;
    /// `PENDING|RUNNING -> ABANDONED` + liberación de candado.
    fn abandon(&self, run_id: Uuid) -> Result<SchedulingRun, EngineError>;
    fn lock_holder(&self, season_day_id: i32) -> Result<Option<SchedulingLock>, EngineError>;
    /// Libera el candado sólo si lo sostiene `run_id`; en otro caso no hace
    /// nada.
    fn release_lock(&self, season_day_id: i32, run_id: Uuid) -> Result<(), EngineError>;
}

/// Área de staging, snapshots, diffs y programa final.
pub trait StagingStore {
    /// Inserta una franja reclamada. `(run, round, court_time)` duplicada
    /// devuelve `DuplicateClaim`.
    fn add_p2(&self, row: P2Allocation) -> Result<(), EngineError>;
    /// Devuelve las franjas en orden de reclamo (orden de inserción). La
    /// fase 3 consume la cola en ese orden; un backend que no lo preserve
    /// rompe el determinismo.
    fn list_p2(&self, run_id: Uuid) -> Result<Vec<P2Allocation>, EngineError>;
    /// Borra el staging de fase 2 de la corrida. Una fase interrumpida se
    /// rehace desde cero al reanudar; sus restos se descartan antes.
    fn clear_p2(&self, run_id: Uuid) -> Result<(), EngineError>;
    /// Inserta un juego emparejado. `(run, round, court_time)` duplicada
    /// devuelve `DuplicateClaim`.
    fn add_game(&self, row: P3GameAllocation) -> Result<(), EngineError>;
    fn list_games(&self, run_id: Uuid) -> Result<Vec<P3GameAllocation>, EngineError>;
    /// Inserta un bye. `(run, round, team)` duplicada devuelve
    /// `DuplicateBye`.
    fn add_bye(&self, row: P3ByeAllocation) -> Result<(), EngineError>;
    fn list_byes(&self, run_id: Uuid) -> Result<Vec<P3ByeAllocation>, EngineError>;
    /// Borra juegos y byes de fase 3 de la corrida (la fase 3 es dueña de
    /// ambos).
    fn clear_p3(&self, run_id: Uuid) -> Result<(), EngineError>;

    fn record_diff(&self, diff: StagingDiff) -> Result<(), EngineError>;
    fn list_diffs(&self, run_id: Uuid) -> Result<Vec<StagingDiff>, EngineError>;

    /// Guarda la copia de checkpoint de una etapa. Reemplaza filas previas
    /// de la MISMA etapa (re-guardado tras un corte a mitad de avance);
    /// nunca toca etapas anteriores.
    fn save_snapshot(&self,
                     run_id: Uuid,
                     stage: SavedStatus,
                     games: Vec<SavedGame>,
                     byes: Vec<SavedBye>)
                     -> Result<(), EngineError>;
    /// Devuelve el snapshot de etapa más avanzada, o `None` si la corrida
    /// aún no guardó ninguno.
    fn latest_snapshot(&self, run_id: Uuid) -> Result<Option<SnapshotBundle>, EngineError>;

    fn save_constraints(&self, run_id: Uuid, phase: SnapshotPhase, snapshot: Value) -> Result<(), EngineError>;
    fn constraint_snapshot(&self, run_id: Uuid, phase: SnapshotPhase) -> Result<Option<Value>, EngineError>;

    /// Publica el lote final para las rondas dadas: reemplaza todas las
    /// filas existentes de esas rondas o no toca nada. La unicidad
    /// `(round, court_time)` / `(round, team)` dentro del lote se verifica
    /// aquí además de en el finalizador.
    fn publish_final(&self,
                     run_id: Uuid,
                     round_ids: &[i32],
                     games: Vec<FinalGameEntry>,
                     byes: Vec<FinalByeEntry>)
                     -> Result<(), EngineError>;
    fn final_schedule(&self, round_ids: &[i32]) -> Result<(Vec<FinalGameEntry>, Vec<FinalByeEntry>), EngineError>;
}

/// Conteo de byes por motivo a partir de filas de staging, para métricas.
pub fn byes_by_reason(byes: &[P3ByeAllocation]) -> std::collections::BTreeMap<String, u32> {
    let mut acc = std::collections::BTreeMap::new();
    for bye in byes {
        *acc.entry(bye.bye_reason.as_str().to_string()).or_insert(0u32) += 1;
    }
    acc
}

/// Suma de byes de un motivo dado (azúcar para asserts y métricas).
pub fn count_reason(byes: &[P3ByeAllocation], reason: ByeReason) -> u32 {
    byes.iter().filter(|b| b.bye_reason == reason).count() as u32
}
