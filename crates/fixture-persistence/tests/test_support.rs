#![allow(dead_code)]

use fixture_core::model::{NewRun, ProcessType, RunType, SchedulingRun};
use fixture_core::store::{RunStore, Submission};
use fixture_persistence::config::DbConfig;
use fixture_persistence::pg::{build_pool, PgPool, PgRunStore, PoolProvider};
use once_cell::sync::Lazy;
use uuid::Uuid;

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    if std::env::var("DATABASE_URL").is_err() {
        return None;
    }
    let cfg = match DbConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("No se pudo leer la configuración de test: {e}");
            return None;
        }
    };
    match build_pool(&cfg.url, 1, 1) {
        // usar 1x1 estable
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

pub fn with_pool<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgPool) -> R
{
    TEST_POOL.as_ref().map(|p| f(p))
}

/// Identificador numérico único para aislar cada test dentro de la misma
/// base compartida.
pub fn fresh_id() -> i32 {
    (Uuid::new_v4().as_u128() % 900_000_000) as i32 + 1_000_000
}

pub fn fresh_key() -> String {
    format!("clave-{}", Uuid::new_v4())
}

pub fn new_run_for(day: i32, key: &str) -> NewRun {
    NewRun { season_id: day + 1,
             season_day_id: day,
             process_type: ProcessType::Initial,
             run_type: Some(RunType::IRun1),
             round_ids: vec![day + 2],
             seed_master: "semilla-pg".to_string(),
             config_hash: "cfg-pg".to_string(),
             idempotency_key: key.to_string() }
}

/// Corrida real en la base (las tablas de staging la referencian por FK).
pub fn seeded_run(pool: &PgPool, day: i32, key: &str) -> SchedulingRun {
    let store = PgRunStore::new(PoolProvider { pool: pool.clone() });
    match store.begin(new_run_for(day, key)).expect("begin") {
        Submission::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    }
}
