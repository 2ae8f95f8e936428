//! fixture-persistence
//!
//! Implementaciones Postgres (Diesel) de los almacenes del motor de
//! programación: corridas y candados, staging de fases, snapshots,
//! diffs, programa final y eventos de auditoría. La capa mantiene
//! paridad 1:1 con el backend en memoria de `fixture-core`, incluido el
//! orden de reclamo de fase 2 del que depende el determinismo.
//!
//! Módulos:
//! - `pg`: stores sobre Postgres (`PgRunStore`, `PgStagingStore`,
//!   `PgEventStore`) y utilidades de pool.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde `.env`.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::init_dotenv;
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, engine_from_pool, ConnectionProvider, PgEventStore, PgPool,
             PgRunStore, PgStagingStore, PoolProvider};
