//! `EventStore` sobre Postgres, append-only.
//!
//! El contrato del trait manda: `record` nunca devuelve error. Si la
//! inserción falla tras los reintentos, el evento se registra en el log
//! local y se devuelve `None`; perder un evento de auditoría no puede
//! costar una corrida.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::error;
use serde_json::Value;
use uuid::Uuid;

use fixture_core::event::{EventStore, RunEvent, RunStage, Severity};

use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::run_events;

/// Fila de `run_events` para lecturas. `seq` es BIGSERIAL: orden total de
/// append por corrida.
#[derive(Queryable, Debug)]
struct EventRow {
    seq: i64,
    run_id: Uuid,
    stage: String,
    severity: String,
    event_message: String,
    context: Option<Value>,
    ts: DateTime<Utc>,
}

impl EventRow {
    /// Una fila con stage/severity fuera de catálogo se descarta con log
    /// local; la lectura de auditoría sigue con el resto.
    fn into_event(self) -> Option<RunEvent> {
        let stage = match RunStage::parse(&self.stage) {
            Some(s) => s,
            None => {
                error!("evento {} con stage fuera de catálogo: {}", self.seq, self.stage);
                return None;
            }
        };
        let severity = match Severity::parse(&self.severity) {
            Some(s) => s,
            None => {
                error!("evento {} con severity fuera de catálogo: {}", self.seq, self.severity);
                return None;
            }
        };
        Some(RunEvent { seq: self.seq as u64,
                        run_id: self.run_id,
                        stage,
                        severity,
                        event_message: self.event_message,
                        context: self.context,
                        ts: self.ts })
    }
}

/// Implementación Postgres de `EventStore`.
pub struct PgEventStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgEventStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> EventStore for PgEventStore<P> {
    fn record(&self,
              run_id: Uuid,
              stage: RunStage,
              severity: Severity,
              message: &str,
              context: Option<Value>)
              -> Option<RunEvent> {
        let inserted: Result<EventRow, PersistenceError> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(run_events::table)
                .values((run_events::run_id.eq(run_id),
                         run_events::stage.eq(stage.as_str()),
                         run_events::severity.eq(severity.as_str()),
                         run_events::event_message.eq(message),
                         run_events::context.eq(context.clone()),
                         run_events::ts.eq(Utc::now())))
                .get_result(&mut conn)
                .map_err(PersistenceError::from)
        });
        match inserted {
            Ok(row) => row.into_event(),
            Err(e) => {
                error!("no se pudo persistir el evento de la corrida {run_id}: {e}");
                None
            }
        }
    }

    fn list(&self, run_id: Uuid) -> Vec<RunEvent> {
        let rows: Result<Vec<EventRow>, PersistenceError> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            run_events::table.filter(run_events::run_id.eq(run_id))
                             .order(run_events::seq.asc())
                             .load(&mut conn)
                             .map_err(PersistenceError::from)
        });
        match rows {
            Ok(rows) => rows.into_iter().filter_map(EventRow::into_event).collect(),
            Err(e) => {
                error!("no se pudieron leer los eventos de la corrida {run_id}: {e}");
                Vec::new()
            }
        }
    }
}
