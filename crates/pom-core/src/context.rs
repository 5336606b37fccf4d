//! Request Context: per-request identity carried through a workflow step
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub trace_id: String,
    /// Operation being served (e.g. "proof.start")
    pub operation: String,
    pub actor: Option<String>,
    pub received_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl RequestContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            actor: None,
            received_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Reuse a trace id supplied by the caller (e.g. an `x-request-id` header).
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            trace_id = %self.trace_id,
            operation = %self.operation,
        )
    }
}
