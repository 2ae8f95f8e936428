//! Implementaciones Postgres (Diesel) de los almacenes del motor.
//!
//! Objetivo del módulo:
//! - Paridad 1:1 con el backend en memoria: las mismas llamadas producen
//!   los mismos resultados, incluido el orden de reclamo de fase 2
//!   (`claim_seq` BIGSERIAL) y el orden de inserción de fase 3
//!   (`insert_seq`).
//! - Aislar el mapeo dominio ↔ filas de DB: `fixture-core` no conoce
//!   Diesel ni el esquema.
//! - Errores transitorios (pool, conflictos de serialización) se
//!   reintentan con backoff corto; las violaciones de integridad suben
//!   como `EngineError::Internal` y cierran la corrida.

mod events;
mod runs;
mod staging;

pub use events::PgEventStore;
pub use runs::PgRunStore;
pub use staging::PgStagingStore;

use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::warn;

use fixture_core::engine::SchedulerEngine;
use fixture_core::errors::EngineError;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

/// Alias del pool r2d2 de conexiones Postgres.
///
/// Notas operativas:
/// - Se construye con `min_idle` (mínimo de conexiones inactivas) y
///   `max_size` (límite superior total).
/// - `build_pool` corre el set de migraciones pendientes una sola vez al
///   construirlo.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción, tests de integración) o un
/// doble de prueba sin acoplar los stores a r2d2.
///
/// Contrato: devuelve una conexión válida o
/// `PersistenceError::TransientIo` en caso de error.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Obtiene una conexión lista para ejecutar consultas Diesel.
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un
/// `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Determina si un error es transitorio (conviene reintentar con backoff).
///
/// Cubre:
/// - Conflictos de serialización (deadlocks y nivel de aislamiento).
/// - Errores de IO transitorios de pool/conexión.
/// - Mensajes comunes de desconexión/timeout detectados por texto
///   (best-effort).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos mensajes de error (dependen de driver/pg) pueden llegar como Unknown
        // con texto. Hacemos best-effort string match sin acoplar a SQLSTATE.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff exponencial muy pequeño (hasta 3 intentos).
///
/// Política: 3 intentos con pausas de 15ms, 30ms y 45ms, `warn!` por
/// intento. No altera semántica de negocio; sólo repite la unidad de
/// trabajo provista por `f`.
pub(crate) fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Un texto fuera de catálogo en una columna de enum indica una fila
/// escrita por una versión incompatible del esquema; se trata como bug
/// del sistema, no como error recuperable.
pub(crate) fn bad_enum(what: &str, raw: &str) -> EngineError {
    EngineError::Internal(format!("{what} fuera de catálogo en DB: {raw}"))
}

/// Construye un pool Postgres r2d2 a partir de la URL.
///
/// Comportamiento:
/// - Valida y ajusta tamaños (si `min_size > max_size`, usa `min_size =
///   max_size`).
/// - Corre las migraciones pendientes tras el primer checkout.
/// - Devuelve `PersistenceError::TransientIo` ante errores del
///   pool/manager.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max",
              validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Alias explícito para semántica clara (igual a `build_pool` actualmente).
pub fn build_pool_with_migrations(database_url: &str, min: u32, max: u32) -> Result<PgPool, PersistenceError> {
    build_pool(database_url, min, max)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

/// Motor completo cableado a un pool ya migrado: corridas, staging y
/// eventos comparten el mismo pool.
pub fn engine_from_pool(pool: PgPool) -> SchedulerEngine<PgRunStore<PoolProvider>, PgStagingStore<PoolProvider>> {
    let runs = PgRunStore::new(PoolProvider { pool: pool.clone() });
    let staging = PgStagingStore::new(PoolProvider { pool: pool.clone() });
    let events = Arc::new(PgEventStore::new(PoolProvider { pool }));
    SchedulerEngine::new_with_stores(runs, staging, events)
}
