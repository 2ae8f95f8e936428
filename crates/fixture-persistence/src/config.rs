//! Configuración de conexión desde variables de entorno, con carga
//! perezosa del archivo `.env`.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // sin .env también funciona
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    /// Lee `DATABASE_URL` (obligatoria) y los tamaños opcionales del pool
    /// (`DATABASE_MIN_CONNECTIONS`, `DATABASE_MAX_CONNECTIONS`).
    pub fn from_env() -> Result<Self, crate::PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL")
            .map_err(|_| crate::PersistenceError::Unknown("DATABASE_URL no definido".to_string()))?;
        let min_connections = env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(2);
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(16);
        Ok(DbConfig { url, min_connections, max_connections })
    }
}

/// Fuerza la carga temprana de `.env` desde binarios externos.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
