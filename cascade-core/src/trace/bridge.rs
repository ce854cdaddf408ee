//! Forwarding render spans to `tracing`.
//!
//! Each element span becomes an `element` span at INFO level, parented to
//! the span of its nearest traced ancestor. Root spans are parented to
//! whatever `tracing` span is current when they open. Memo followers
//! record a `follows_from` edge to the owner's span.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::field::Empty;

use super::{Span, SpanId, SpanRequest, SpanStatus, Tracer};

/// A tracer backed by the `tracing` crate.
#[derive(Debug, Clone, Default)]
pub struct TracingTracer {
    open: Arc<DashMap<SpanId, tracing::Span>>,
}

impl TracingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of element spans currently open.
    pub fn open_spans(&self) -> usize {
        self.open.len()
    }
}

impl Tracer for TracingTracer {
    fn start_span(&self, request: SpanRequest<'_>) -> Box<dyn Span> {
        let id = SpanId::next();
        let component = request.element.tag().name();
        let parent = request
            .parent
            .and_then(|parent| self.open.get(&parent).map(|span| span.clone()));

        let span = match parent {
            Some(parent) => tracing::info_span!(
                parent: &parent,
                "element",
                component,
                element.id = Empty,
                memo.id = Empty,
                memo.role = Empty,
                status = Empty,
                output_len = Empty,
            ),
            None => tracing::info_span!(
                "element",
                component,
                element.id = Empty,
                memo.id = Empty,
                memo.role = Empty,
                status = Empty,
                output_len = Empty,
            ),
        };
        if let Some(owner) = request.link.and_then(|link| self.open.get(&link)) {
            span.follows_from(&*owner);
        }

        self.open.insert(id, span.clone());
        Box::new(BridgedSpan {
            id,
            span,
            open: Arc::clone(&self.open),
        })
    }
}

struct BridgedSpan {
    id: SpanId,
    span: tracing::Span,
    open: Arc<DashMap<SpanId, tracing::Span>>,
}

impl Span for BridgedSpan {
    fn id(&self) -> SpanId {
        self.id
    }

    fn set_attribute(&mut self, key: &str, value: String) {
        // "component" is recorded when the span is created.
        if key != "component" {
            self.span.record(key, value.as_str());
        }
    }

    fn end(self: Box<Self>, status: SpanStatus) {
        match &status {
            SpanStatus::Ok { output } => {
                self.span.record("status", "ok");
                self.span.record("output_len", output.len());
            }
            SpanStatus::Error { error } => {
                self.span.record("status", "error");
                tracing::warn!(parent: &self.span, %error, kind = %error.kind(), "element failed");
            }
            SpanStatus::Abandoned => {
                self.span.record("status", "abandoned");
            }
        }
        self.open.remove(&self.id);
    }
}
