//! Constantes del motor de programación.
//!
//! Este módulo agrupa valores estáticos que participan en el cálculo de
//! fingerprints y en la compatibilidad entre versiones del motor. Cambiar
//! `ENGINE_VERSION` invalida deliberadamente los fingerprints de
//! configuración aunque los datos de entrada no cambien.

/// Versión lógica del motor. Entra en el fingerprint compuesto de
/// configuración; mantener estable mientras no haya cambios incompatibles
/// en el algoritmo de asignación.
pub const ENGINE_VERSION: &str = "S1.0";

/// Versión de esquema de los documentos estructurados persistidos
/// (métricas, detalles de error, reglamento).
pub const SCHEMA_VERSION: u32 = 1;

/// Fracción máxima de demanda con errores de restricción antes de abortar
/// la corrida en la frontera de fase.
pub const DEFAULT_CONSTRAINT_ERROR_THRESHOLD: f64 = 0.25;

/// Factor del guardián de progreso de la fase 3: el lazo de emparejamiento
/// se acota a `factor * (equipos + franjas)` iteraciones por grado.
pub const DEFAULT_PROGRESS_GUARD_FACTOR: usize = 4;
