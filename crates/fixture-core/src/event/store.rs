use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{RunEvent, RunStage, Severity};

/// Almacenamiento de eventos de corrida, append-only.
///
/// Contrato: `record` NUNCA devuelve error. Una implementación que no pueda
/// persistir el evento lo registra en el log local y sigue; perder un evento
/// de auditoría no puede costar una corrida.
pub trait EventStore {
    /// Agrega un evento y devuelve la copia completa (con seq y ts), o
    /// `None` si el backend no pudo persistirlo.
    fn record(&self,
              run_id: Uuid,
              stage: RunStage,
              severity: Severity,
              message: &str,
              context: Option<serde_json::Value>)
              -> Option<RunEvent>;
    /// Lista eventos de una corrida (orden ascendente por seq).
    fn list(&self, run_id: Uuid) -> Vec<RunEvent>;
}

/// Backend en memoria: un vector por corrida dentro de un `DashMap`, de modo
/// que corridas distintas no contienden entre sí.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: DashMap<Uuid, Vec<RunEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self { inner: DashMap::new() }
    }
}

impl EventStore for InMemoryEventStore {
    fn record(&self,
              run_id: Uuid,
              stage: RunStage,
              severity: Severity,
              message: &str,
              context: Option<serde_json::Value>)
              -> Option<RunEvent> {
        let mut entry = self.inner.entry(run_id).or_default();
        let seq = entry.len() as u64;
        let ev = RunEvent { seq,
                            run_id,
                            stage,
                            severity,
                            event_message: message.to_string(),
                            context,
                            ts: Utc::now() };
        entry.push(ev.clone());
        Some(ev)
    }

    fn list(&self, run_id: Uuid) -> Vec<RunEvent> {
        self.inner.get(&run_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_assigns_monotonic_seq_per_run() {
        let store = InMemoryEventStore::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        store.record(run_a, RunStage::Step1, Severity::Info, "a0", None);
        store.record(run_b, RunStage::Step1, Severity::Info, "b0", None);
        store.record(run_a, RunStage::Step2, Severity::Warn, "a1", None);
        let events = store.list(run_a);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
        assert_eq!(store.list(run_b).len(), 1);
    }
}
