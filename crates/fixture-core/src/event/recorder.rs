use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use super::{EventStore, RunStage, Severity};

/// Fachada de auditoría: envuelve un `EventStore` y ofrece helpers por
/// severidad. Los componentes del motor escriben eventos a través de esta
/// fachada y nunca tocan el store directamente.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn EventStore + Send + Sync>,
}

impl Recorder {
    pub fn new(store: Arc<dyn EventStore + Send + Sync>) -> Self {
        Self { store }
    }

    pub fn info(&self, run_id: Uuid, stage: RunStage, message: &str, context: Option<Value>) {
        self.store.record(run_id, stage, Severity::Info, message, context);
    }

    pub fn warn(&self, run_id: Uuid, stage: RunStage, message: &str, context: Option<Value>) {
        self.store.record(run_id, stage, Severity::Warn, message, context);
    }

    pub fn error(&self, run_id: Uuid, stage: RunStage, message: &str, context: Option<Value>) {
        self.store.record(run_id, stage, Severity::Error, message, context);
    }

    /// Error de restricción: un WARN con la marca `constraint_error` en el
    /// contexto, para que el conteo contra el umbral sobreviva a un resume.
    pub fn constraint(&self, run_id: Uuid, stage: RunStage, message: &str, mut context: Value) {
        if let Some(obj) = context.as_object_mut() {
            obj.insert("constraint_error".to_string(), json!(true));
        }
        self.store.record(run_id, stage, Severity::Warn, message, Some(context));
    }
}
